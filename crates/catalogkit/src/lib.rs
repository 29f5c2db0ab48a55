//! # catalogkit
//!
//! Library for provisioning deployments through a self-service catalog's
//! request API.
//!
//! This crate provides functionality for:
//! - Resolving catalog item and business group names to ids
//! - Merging `<component>.<property>` configuration into request templates
//! - Submitting requests and polling them to a terminal phase
//! - Reconciling provisioned machine data into configuration-shaped state
//! - Running day-two actions (reconfigure, destroy) on deployments
//!
//! ## Example
//!
//! ```no_run
//! use catalogkit::{Credentials, HttpTransport, Provisioner, RequestRecord, ResourceSpec};
//! use std::time::Duration;
//!
//! let transport = HttpTransport::new(
//!     "https://catalog.example.com",
//!     Credentials {
//!         username: "user@vsphere.local".to_string(),
//!         password: "secret".to_string(),
//!         tenant: "vsphere.local".to_string(),
//!     },
//!     Duration::from_secs(60),
//! );
//! let provisioner = Provisioner::new(Box::new(transport), "vsphere.local");
//!
//! let spec = ResourceSpec {
//!     catalog_item_name: Some("CentOS 7".to_string()),
//!     ..Default::default()
//! };
//! let mut record = RequestRecord::default();
//! provisioner.create(&spec, &mut record).expect("provisioning failed");
//! println!("Request {:?} is {:?}", record.request_id, record.request_status);
//! ```
//!
//! ## Configuration keys
//!
//! Component names may contain dots, so `web.db.cpu` is routed to a
//! component called `web.db` when one exists, and to `web` otherwise:
//!
//! ```
//! use catalogkit::template::merge;
//! use catalogkit::{Scalar, TemplateValue};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! let TemplateValue::Mapping(mut data) = TemplateValue::from(json!({
//!     "web": {"data": {"cpu": 1}},
//!     "web.db": {"data": {"cpu": 1}}
//! })) else { unreachable!() };
//!
//! let config = BTreeMap::from([("web.db.cpu".to_string(), Scalar::from("4"))]);
//! let outcome = merge(&mut data, &config).unwrap();
//!
//! assert!(outcome.changed);
//! assert_eq!(data["web.db"].get("data").and_then(|d| d.get("cpu")),
//!            Some(&TemplateValue::Scalar(Scalar::from(4))));
//! ```

#![warn(clippy::all)]

pub mod actions;
pub mod error;
pub mod lifecycle;
pub mod provision;
pub mod reconcile;
pub mod resolver;
pub mod template;
pub mod transport;
pub mod types;
pub mod value;

pub use actions::{ActionDispatcher, ActionTarget, PostedAction, Reconfiguration, find_operation};
pub use error::{Error, ErrorCategory, Result};
pub use lifecycle::{Flow, PollObserver, PollPolicy, RequestLifecycle, Sleeper, ThreadSleeper};
pub use provision::{PreparedRequest, Provisioner, ResolvedIds};
pub use reconcile::{Reconciliation, reconcile};
pub use resolver::CatalogResolver;
pub use template::MergeOutcome;
pub use transport::http::{Credentials, HttpTransport};
pub use transport::{MockTransport, Transport};
pub use types::{
    ActionTemplate, CatalogRequest, Operation, Phase, ProvisionedResource, RequestHandle,
    RequestRecord, RequestTemplate, ResourceConfiguration, ResourceKind, ResourceSpec,
    ResourceView,
};
pub use value::{PropertyMap, Scalar, TemplateValue};
