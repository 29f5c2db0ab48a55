//! Core types for catalog operations.
//!
//! Most of these mirror the catalog service's JSON payloads. Field names use
//! the remote camelCase through serde renames.

use crate::error::{Error, Result};
use crate::value::{PropertyMap, Scalar, TemplateValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default wait budget for a request, in minutes.
pub const DEFAULT_WAIT_TIMEOUT_MINUTES: u64 = 15;

// =============================================================================
// Templates
// =============================================================================

/// Request template of a catalog item.
///
/// Components live under `data`: every key there whose value is a mapping is
/// a component. Other keys of `data` (such as `_leaseDays`) are plain request
/// properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_group_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reasons: Option<String>,
    #[serde(default)]
    pub data: PropertyMap,
    /// Root metadata this crate does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, TemplateValue>,
}

impl RequestTemplate {
    /// Names of the components in this template, sorted.
    pub fn component_names(&self) -> Vec<String> {
        crate::template::component_names(&self.data)
    }

    /// Apply deployment-level settings (`description`, `reasons`, anything
    /// else lands in the extra root metadata).
    pub fn apply_deployment_configuration(&mut self, config: &BTreeMap<String, Scalar>) {
        for (key, value) in config {
            match key.as_str() {
                "description" => self.description = Some(value.to_string()),
                "reasons" => self.reasons = Some(value.to_string()),
                _ => {
                    self.extra
                        .insert(key.clone(), TemplateValue::Scalar(value.clone()));
                }
            }
        }
    }

    /// Insert catalog-level properties directly under `data`.
    pub fn apply_catalog_configuration(&mut self, config: &BTreeMap<String, Scalar>) {
        for (key, value) in config {
            self.data
                .insert(key.clone(), TemplateValue::Scalar(value.clone()));
        }
    }
}

/// Template of a day-two action on a provisioned resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reasons: Option<String>,
    #[serde(default)]
    pub data: PropertyMap,
    #[serde(flatten)]
    pub extra: BTreeMap<String, TemplateValue>,
}

// =============================================================================
// Requests
// =============================================================================

/// Identifier of a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHandle(String);

impl RequestHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle phase of a remote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    Unsubmitted,
    Submitted,
    PendingPreApproval,
    PendingPostApproval,
    InProgress,
    Successful,
    Failed,
    Rejected,
    /// A phase string this crate does not recognise.
    Unknown(String),
}

impl Phase {
    /// Whether the request can no longer change phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Rejected)
    }

    /// Whether the request ended without provisioning anything.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected)
    }

    /// The remote spelling of this phase.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unsubmitted => "UNSUBMITTED",
            Self::Submitted => "SUBMITTED",
            Self::PendingPreApproval => "PENDING_PRE_APPROVAL",
            Self::PendingPostApproval => "PENDING_POST_APPROVAL",
            Self::InProgress => "IN_PROGRESS",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for Phase {
    fn from(raw: &str) -> Self {
        match raw {
            "UNSUBMITTED" => Self::Unsubmitted,
            "SUBMITTED" => Self::Submitted,
            "PENDING_PRE_APPROVAL" => Self::PendingPreApproval,
            "PENDING_POST_APPROVAL" => Self::PendingPostApproval,
            "IN_PROGRESS" => Self::InProgress,
            "SUCCESSFUL" => Self::Successful,
            "FAILED" => Self::Failed,
            "REJECTED" => Self::Rejected,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for Phase {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion block of a finished request.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCompletion {
    #[serde(default)]
    pub request_completion_state: Option<String>,
    #[serde(default)]
    pub completion_details: Option<String>,
}

/// A catalog request as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRequest {
    pub id: String,
    pub phase: Phase,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub request_completion: Option<RequestCompletion>,
}

impl CatalogRequest {
    /// Completion details, if the remote system provided any.
    pub fn completion_details(&self) -> Option<&str> {
        self.request_completion
            .as_ref()
            .and_then(|c| c.completion_details.as_deref())
    }
}

// =============================================================================
// Catalog listings
// =============================================================================

/// Pagination metadata of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u64,
    #[serde(default)]
    pub number: u64,
}

/// One page of a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

/// Entry of the entitled catalog item listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItemView {
    pub catalog_item_id: String,
    pub name: String,
}

/// A single catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
}

/// A business group (subtenant).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusinessGroup {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Resources
// =============================================================================

/// Type of resource a request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Machine,
    Network,
    Deployment,
    Other(String),
}

impl ResourceKind {
    pub fn from_type_id(type_id: &str) -> Self {
        match type_id {
            "Infrastructure.Virtual" | "Infrastructure.Cloud" | "Infrastructure.Physical" => {
                Self::Machine
            }
            "composition.resource.type.deployment" => Self::Deployment,
            t if t.starts_with("Infrastructure.Network") => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Entry of a request's resource-view listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    #[serde(default)]
    pub resource_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub data: PropertyMap,
}

impl ResourceView {
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_type_id(&self.resource_type)
    }

    /// Logical component name: the `Component` property, else the view name.
    pub fn component_name(&self) -> &str {
        match self.data.get("Component") {
            Some(TemplateValue::Scalar(Scalar::String(name))) if !name.is_empty() => name,
            _ => &self.name,
        }
    }
}

/// Reference to a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ResourceTypeRef {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// A day-two operation offered on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceOperation {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A provisioned resource with the operations it is entitled to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub resource_type_ref: ResourceTypeRef,
    #[serde(default)]
    pub operations: Vec<ResourceOperation>,
    #[serde(default)]
    pub data: PropertyMap,
}

impl ProvisionedResource {
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_type_id(&self.resource_type_ref.id)
    }

    /// Logical component name: the `Component` property, else the name.
    pub fn component_name(&self) -> &str {
        match self.data.get("Component") {
            Some(TemplateValue::Scalar(Scalar::String(name))) if !name.is_empty() => name,
            _ => &self.name,
        }
    }
}

/// Day-two operations this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reconfigure,
    Destroy,
    PowerOff,
    PowerOn,
    Reboot,
}

impl Operation {
    /// Remote operation name, matched case-sensitively.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reconfigure => "Reconfigure",
            Self::Destroy => "Destroy",
            Self::PowerOff => "Power Off",
            Self::PowerOn => "Power On",
            Self::Reboot => "Reboot",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Configuration and state
// =============================================================================

/// Per-component properties: component name → property name → value.
pub type ResourceConfiguration = BTreeMap<String, BTreeMap<String, Scalar>>;

/// Flatten per-component properties into `<component>.<property>` keys.
pub fn flatten_configuration(config: &ResourceConfiguration) -> BTreeMap<String, Scalar> {
    config
        .iter()
        .flat_map(|(component, props)| {
            props
                .iter()
                .map(move |(prop, value)| (format!("{component}.{prop}"), value.clone()))
        })
        .collect()
}

/// Declarative description of one catalog deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub catalog_item_name: Option<String>,
    #[serde(default)]
    pub catalog_item_id: Option<String>,
    #[serde(default)]
    pub business_group_name: Option<String>,
    #[serde(default)]
    pub business_group_id: Option<String>,
    /// Minutes to wait for a request to finish.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: u64,
    /// `<component>.<property>` → value.
    #[serde(default)]
    pub resource_configuration: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub deployment_configuration: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub catalog_configuration: BTreeMap<String, Scalar>,
}

fn default_wait_timeout() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MINUTES
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            catalog_item_name: None,
            catalog_item_id: None,
            business_group_name: None,
            business_group_id: None,
            wait_timeout: DEFAULT_WAIT_TIMEOUT_MINUTES,
            resource_configuration: BTreeMap::new(),
            deployment_configuration: BTreeMap::new(),
            catalog_configuration: BTreeMap::new(),
        }
    }
}

impl ResourceSpec {
    /// Check the definition before talking to the remote system.
    pub fn validate(&self) -> Result<()> {
        if self.catalog_item_name.is_none() && self.catalog_item_id.is_none() {
            return Err(Error::InvalidConfig(
                "one of catalog_item_name or catalog_item_id is required".to_string(),
            ));
        }
        if self.wait_timeout == 0 {
            return Err(Error::InvalidConfig(
                "wait_timeout must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable state of a managed deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request that created the deployment; `None` once it no longer exists.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Last observed phase.
    #[serde(default)]
    pub request_status: Option<Phase>,
    #[serde(default)]
    pub failed_message: Option<String>,
    #[serde(default)]
    pub resource_configuration: ResourceConfiguration,
}

impl RequestRecord {
    pub fn handle(&self) -> Option<RequestHandle> {
        self.request_id.as_deref().map(RequestHandle::new)
    }

    /// Forget the deployment, as if it had never been created.
    pub fn clear_identity(&mut self) {
        self.request_id = None;
    }
}
