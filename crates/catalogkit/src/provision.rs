//! Create, read, update and delete flows for one catalog deployment.
//!
//! Every flow takes the deployment's [`RequestRecord`] by mutable reference
//! and keeps it current as it goes, so a caller can persist the record even
//! when the flow returns an error.

use crate::actions::{ActionDispatcher, Reconfiguration, machine_components};
use crate::error::{Error, Result};
use crate::lifecycle::{Flow, PollObserver, PollPolicy, RequestLifecycle, Sleeper, ThreadSleeper};
use crate::reconcile::{Reconciliation, reconcile};
use crate::resolver::{CatalogResolver, DEFAULT_PAGE_SIZE};
use crate::template::{MergeOutcome, group_by_component};
use crate::transport::{Transport, get_json, segment};
use crate::types::{
    CatalogRequest, Phase, RequestHandle, RequestRecord, RequestTemplate, ResourceConfiguration,
    ResourceSpec,
};
use std::time::Duration;

/// Ids a [`ResourceSpec`] resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIds {
    pub catalog_item_id: String,
    pub business_group_id: Option<String>,
}

/// A request template ready to submit.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub ids: ResolvedIds,
    pub template: RequestTemplate,
    pub merge: MergeOutcome,
}

/// Drives catalog deployments through their lifecycle.
pub struct Provisioner {
    transport: Box<dyn Transport>,
    tenant: String,
    page_size: u32,
    poll: PollPolicy,
    sleeper: Box<dyn Sleeper>,
    observer: Option<Box<dyn PollObserver>>,
}

impl Provisioner {
    /// Create a provisioner for `tenant` on top of `transport`.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, tenant: impl Into<String>) -> Self {
        Self {
            transport,
            tenant: tenant.into(),
            page_size: DEFAULT_PAGE_SIZE,
            poll: PollPolicy::default(),
            sleeper: Box::new(ThreadSleeper),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_poll_errors(mut self, max: u32) -> Self {
        self.poll.max_consecutive_errors = max;
        self
    }

    /// Let `create` return once the request is in progress.
    #[must_use]
    pub fn with_return_on_in_progress(mut self, enabled: bool) -> Self {
        self.poll.return_on_in_progress = enabled;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn PollObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    fn resolver(&self) -> CatalogResolver<'_> {
        CatalogResolver::new(self.transport.as_ref()).with_page_size(self.page_size)
    }

    fn dispatcher(&self) -> ActionDispatcher<'_> {
        ActionDispatcher::new(self.transport.as_ref())
    }

    fn lifecycle(&self, policy: PollPolicy) -> RequestLifecycle<'_> {
        let lifecycle = RequestLifecycle::new(self.transport.as_ref(), policy)
            .with_sleeper(self.sleeper.as_ref());
        match &self.observer {
            Some(observer) => lifecycle.with_observer(observer.as_ref()),
            None => lifecycle,
        }
    }

    fn policy_for(&self, spec: &ResourceSpec) -> PollPolicy {
        self.poll.with_timeout_minutes(spec.wait_timeout)
    }

    /// Policy for flows that must see a terminal phase. Returning early on
    /// `IN_PROGRESS` only applies to `create`.
    fn waiting_policy(&self, minutes: u64) -> PollPolicy {
        PollPolicy {
            return_on_in_progress: false,
            ..self.poll.with_timeout_minutes(minutes)
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve and cross-check the catalog item and business group of `spec`.
    ///
    /// When a name and an id are both given, the id the name resolves to
    /// must equal the given id.
    pub fn resolve(&self, spec: &ResourceSpec) -> Result<ResolvedIds> {
        let resolver = self.resolver();

        let catalog_item_id = match (&spec.catalog_item_name, &spec.catalog_item_id) {
            (Some(name), Some(id)) => {
                let resolved = resolver.resolve_catalog_item_id(name)?;
                ensure_same("catalog item", name, id, resolved)?
            }
            (Some(name), None) => resolver.resolve_catalog_item_id(name)?,
            (None, Some(id)) => {
                let name = resolver.resolve_catalog_item_name(id)?;
                log::debug!("Catalog item {id} is '{name}'");
                id.clone()
            }
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "one of catalog_item_name or catalog_item_id is required".to_string(),
                ));
            }
        };

        let business_group_id = match (&spec.business_group_name, &spec.business_group_id) {
            (Some(name), Some(id)) => {
                let resolved = resolver.resolve_business_group_id(name, &self.tenant)?;
                Some(ensure_same("business group", name, id, resolved)?)
            }
            (Some(name), None) => Some(resolver.resolve_business_group_id(name, &self.tenant)?),
            (None, Some(id)) => {
                let name = resolver.resolve_business_group_name(id, &self.tenant)?;
                log::debug!("Business group {id} is '{name}'");
                Some(id.clone())
            }
            (None, None) => None,
        };

        Ok(ResolvedIds {
            catalog_item_id,
            business_group_id,
        })
    }

    /// Fetch the request template of a catalog item.
    pub fn request_template(&self, catalog_item_id: &str) -> Result<RequestTemplate> {
        get_json(
            self.transport.as_ref(),
            &format!(
                "catalog-service/api/consumer/entitledCatalogItems/{}/requests/template",
                segment(catalog_item_id)
            ),
        )
    }

    /// Resolve ids, fetch the template and merge the configuration of `spec`
    /// into it. Nothing is submitted.
    pub fn prepare(&self, spec: &ResourceSpec) -> Result<PreparedRequest> {
        spec.validate()?;
        let ids = self.resolve(spec)?;

        let mut template = self.request_template(&ids.catalog_item_id)?;
        template.apply_catalog_configuration(&spec.catalog_configuration);
        template.apply_deployment_configuration(&spec.deployment_configuration);
        if let Some(group) = &ids.business_group_id {
            template.business_group_id = Some(group.clone());
        }
        let merge = template.merge(&spec.resource_configuration)?;
        log::debug!(
            "Merged configuration: {} replaced, {} appended",
            merge.replaced.len(),
            merge.appended.len()
        );

        Ok(PreparedRequest {
            ids,
            template,
            merge,
        })
    }

    // =========================================================================
    // Lifecycle flows
    // =========================================================================

    /// Request a new deployment and wait for it.
    ///
    /// The record gets the request id as soon as the request is submitted. A
    /// failed or rejected request clears it again.
    pub fn create(&self, spec: &ResourceSpec, record: &mut RequestRecord) -> Result<CatalogRequest> {
        let prepared = self.prepare(spec)?;
        let components = prepared.template.component_names();

        let lifecycle = self.lifecycle(self.policy_for(spec));
        let handle = lifecycle.submit(&prepared.ids.catalog_item_id, &prepared.template)?;
        record.request_id = Some(handle.id().to_string());
        record.request_status = Some(Phase::Submitted);
        record.failed_message = None;
        record.resource_configuration = group_by_component(&spec.resource_configuration, &components);

        let request = lifecycle.await_completion(&handle, record, Flow::Create)?;
        if request.phase == Phase::Successful {
            self.refresh(&handle, record)?;
        }
        Ok(request)
    }

    /// Refresh the record from the remote request.
    ///
    /// Returns `None` when the record holds no request.
    pub fn read(&self, record: &mut RequestRecord) -> Result<Option<Reconciliation>> {
        let Some(handle) = record.handle() else {
            return Ok(None);
        };

        let request = self.lifecycle(self.poll).status(&handle)?;
        record.request_status = Some(request.phase.clone());
        if request.phase.is_failure() {
            record.failed_message = request.completion_details().map(ToString::to_string);
        }

        if request.phase != Phase::Successful {
            log::info!("Request {handle} is {}; resources not available yet", request.phase);
            return Ok(None);
        }

        self.refresh(&handle, record).map(Some)
    }

    /// Reconfigure the machines of a deployment to match `spec`.
    ///
    /// Every posted request is awaited, even when a later machine could not
    /// be reconfigured. The configured properties of the components that
    /// settled are written into the record before it is refreshed, so
    /// properties the resource views never report stay current.
    ///
    /// Returns the handles of the reconfigure requests that were posted, or
    /// the first error once the posted requests have been awaited.
    pub fn update(
        &self,
        spec: &ResourceSpec,
        record: &mut RequestRecord,
    ) -> Result<Vec<RequestHandle>> {
        let handle = require_handle(record)?;
        let dispatcher = self.dispatcher();

        let resources = dispatcher.list_resources(&handle)?;
        let Reconfiguration {
            posted,
            mut failure,
        } = dispatcher.reconfigure(&resources, &spec.resource_configuration)?;

        let lifecycle = self.lifecycle(self.waiting_policy(spec.wait_timeout));
        let mut settled: Vec<&str> = Vec::new();
        for action in &posted {
            match lifecycle.await_completion(&action.handle, record, Flow::Update) {
                Ok(_) => settled.push(&action.component),
                Err(err) => {
                    log::warn!("Reconfigure request {} did not complete: {err}", action.handle);
                    failure.get_or_insert(err);
                }
            }
        }

        let grouped = group_by_component(
            &spec.resource_configuration,
            &machine_components(&resources),
        );
        for (component, properties) in grouped {
            if failure.is_none() || settled.contains(&component.as_str()) {
                record
                    .resource_configuration
                    .entry(component)
                    .or_default()
                    .extend(properties);
            }
        }

        if !settled.is_empty()
            && let Err(err) = self.refresh(&handle, record)
        {
            log::warn!("Could not refresh {handle} after reconfigure: {err}");
            failure.get_or_insert(err);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(posted.into_iter().map(|action| action.handle).collect()),
        }
    }

    /// Destroy a deployment and wait for it to go away.
    ///
    /// A deployment without resources is treated as already gone.
    pub fn delete(&self, wait_timeout: u64, record: &mut RequestRecord) -> Result<()> {
        let Some(handle) = record.handle() else {
            log::info!("Nothing to delete");
            return Ok(());
        };
        let dispatcher = self.dispatcher();

        let resources = dispatcher.list_resources(&handle)?;
        if resources.is_empty() {
            log::info!("Request {handle} has no resources left");
            record.clear_identity();
            record.resource_configuration.clear();
            return Ok(());
        }

        let destroy = dispatcher.destroy(&resources)?;
        self.lifecycle(self.waiting_policy(wait_timeout))
            .await_completion(&destroy, record, Flow::Delete)?;

        record.resource_configuration = ResourceConfiguration::new();
        Ok(())
    }

    fn refresh(&self, handle: &RequestHandle, record: &mut RequestRecord) -> Result<Reconciliation> {
        let views = self.dispatcher().resource_views(handle)?;
        let reconciliation = reconcile(&record.resource_configuration, &views);
        if reconciliation.changed {
            record.resource_configuration = reconciliation.configuration.clone();
        }
        Ok(reconciliation)
    }
}

fn ensure_same(kind: &'static str, name: &str, id: &str, resolved: String) -> Result<String> {
    if resolved == id {
        Ok(resolved)
    } else {
        Err(Error::Conflict {
            kind,
            name: name.to_string(),
            id: id.to_string(),
            resolved,
        })
    }
}

fn require_handle(record: &RequestRecord) -> Result<RequestHandle> {
    record.handle().ok_or_else(|| {
        Error::InvalidConfig("the resource has no request id; create it first".to_string())
    })
}
