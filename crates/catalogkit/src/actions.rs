//! Day-two actions on provisioned resources.
//!
//! The catalog exposes actions as entitlements: a resource lists the
//! operations the current user may run on it. A missing operation is a
//! configuration problem on the remote side, reported as
//! [`Error::Entitlement`].

use crate::error::{Error, Result};
use crate::lifecycle::created_request;
use crate::template::{group_by_component, merge_properties, validate_keys};
use crate::transport::{Transport, get_json, segment};
use crate::types::{
    ActionTemplate, Operation, Page, ProvisionedResource, RequestHandle, ResourceKind,
    ResourceView,
};
use crate::value::Scalar;
use std::collections::BTreeMap;

/// An operation located on a specific resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    pub resource_id: String,
    pub resource_name: String,
    pub action_id: String,
    /// Logical component of the resource.
    pub component: String,
}

impl ActionTarget {
    /// Locate `operation` on one resource.
    pub fn on(resource: &ProvisionedResource, operation: Operation) -> Option<Self> {
        resource
            .operations
            .iter()
            .find(|op| op.name == operation.name())
            .map(|op| Self {
                resource_id: resource.id.clone(),
                resource_name: resource.name.clone(),
                action_id: op.id.clone(),
                component: resource.component_name().to_string(),
            })
    }

    fn path(&self) -> String {
        format!(
            "catalog-service/api/consumer/resources/{}/actions/{}/requests",
            segment(&self.resource_id),
            segment(&self.action_id)
        )
    }
}

/// First resource of kind `kind` that offers `operation`.
pub fn find_operation(
    resources: &[ProvisionedResource],
    kind: &ResourceKind,
    operation: Operation,
) -> Option<ActionTarget> {
    resources
        .iter()
        .filter(|resource| resource.kind() == *kind)
        .find_map(|resource| ActionTarget::on(resource, operation))
}

fn machine_resources(
    resources: &[ProvisionedResource],
) -> impl Iterator<Item = &ProvisionedResource> {
    resources
        .iter()
        .filter(|resource| resource.kind() == ResourceKind::Machine)
}

/// Component names of the machines among `resources`.
pub fn machine_components(resources: &[ProvisionedResource]) -> Vec<String> {
    machine_resources(resources)
        .map(|machine| machine.component_name().to_string())
        .collect()
}

/// A reconfigure request posted for one machine component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedAction {
    pub component: String,
    pub handle: RequestHandle,
}

/// Outcome of [`ActionDispatcher::reconfigure`].
#[derive(Debug, Default)]
pub struct Reconfiguration {
    /// Actions posted, in order.
    pub posted: Vec<PostedAction>,
    /// Error that stopped the run after `posted` went out.
    pub failure: Option<Error>,
}

impl Reconfiguration {
    pub fn handles(&self) -> Vec<RequestHandle> {
        self.posted.iter().map(|action| action.handle.clone()).collect()
    }
}

/// Looks up and runs day-two actions.
pub struct ActionDispatcher<'a> {
    transport: &'a dyn Transport,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Resources a request produced, with their entitled operations.
    pub fn list_resources(&self, handle: &RequestHandle) -> Result<Vec<ProvisionedResource>> {
        let page: Page<ProvisionedResource> = get_json(
            self.transport,
            &format!(
                "catalog-service/api/consumer/requests/{}/resources",
                segment(handle.id())
            ),
        )?;
        Ok(page.content)
    }

    /// Resource views of a request, carrying the observed machine data.
    pub fn resource_views(&self, handle: &RequestHandle) -> Result<Vec<ResourceView>> {
        let page: Page<ResourceView> = get_json(
            self.transport,
            &format!(
                "catalog-service/api/consumer/requests/{}/resourceViews",
                segment(handle.id())
            ),
        )?;
        Ok(page.content)
    }

    /// Fetch the template of an action.
    pub fn action_template(&self, target: &ActionTarget) -> Result<ActionTemplate> {
        get_json(self.transport, &format!("{}/template", target.path()))
    }

    /// Run an action with `template` as its payload.
    pub fn post_action(
        &self,
        target: &ActionTarget,
        template: &ActionTemplate,
    ) -> Result<RequestHandle> {
        let body = serde_json::to_value(template)?;
        let handle = created_request(self.transport.post(&target.path(), &body)?)?;
        log::info!(
            "Started action {} on {} as request {handle}",
            target.action_id,
            target.resource_name
        );
        Ok(handle)
    }

    /// Run `operation` on the first resource of `kind` offering it, with the
    /// action's template unchanged.
    pub fn perform(
        &self,
        resources: &[ProvisionedResource],
        kind: &ResourceKind,
        operation: Operation,
    ) -> Result<RequestHandle> {
        let target = find_operation(resources, kind, operation).ok_or_else(|| {
            let resource = resources
                .iter()
                .find(|resource| resource.kind() == *kind)
                .map_or_else(|| format!("{kind:?}").to_lowercase(), |r| r.name.clone());
            Error::Entitlement {
                resource,
                operation: operation.to_string(),
            }
        })?;
        let template = self.action_template(&target)?;
        self.post_action(&target, &template)
    }

    /// Reconfigure every machine with its share of `configuration`.
    ///
    /// Keys must route to a machine component and every machine must be
    /// entitled to `Reconfigure`; both are checked before anything is
    /// fetched. An action is posted only for machines whose template
    /// actually changes. A failure part way is returned in the
    /// [`Reconfiguration`] next to the actions already posted.
    pub fn reconfigure(
        &self,
        resources: &[ProvisionedResource],
        configuration: &BTreeMap<String, Scalar>,
    ) -> Result<Reconfiguration> {
        let machines: Vec<&ProvisionedResource> = machine_resources(resources).collect();
        let components = machine_components(resources);
        validate_keys(&components, configuration.keys())?;
        let grouped = group_by_component(configuration, &components);

        let targets = machines
            .iter()
            .map(|machine| {
                ActionTarget::on(machine, Operation::Reconfigure).ok_or_else(|| {
                    Error::Entitlement {
                        resource: machine.name.clone(),
                        operation: Operation::Reconfigure.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut run = Reconfiguration::default();
        for target in targets {
            let Some(properties) = grouped.get(&target.component) else {
                log::debug!("No configuration for component {}", target.component);
                continue;
            };

            match self.reconfigure_one(&target, properties) {
                Ok(Some(handle)) => run.posted.push(PostedAction {
                    component: target.component,
                    handle,
                }),
                Ok(None) => {}
                Err(err) => {
                    log::warn!(
                        "Reconfigure of {} failed after {} posted action(s): {err}",
                        target.resource_name,
                        run.posted.len()
                    );
                    run.failure = Some(err);
                    break;
                }
            }
        }

        Ok(run)
    }

    fn reconfigure_one(
        &self,
        target: &ActionTarget,
        properties: &BTreeMap<String, Scalar>,
    ) -> Result<Option<RequestHandle>> {
        let mut template = self.action_template(target)?;
        let outcome = merge_properties(&mut template.data, properties);
        if !outcome.changed {
            log::info!("{} already matches its configuration", target.resource_name);
            return Ok(None);
        }
        self.post_action(target, &template).map(Some)
    }

    /// Destroy the deployment.
    pub fn destroy(&self, resources: &[ProvisionedResource]) -> Result<RequestHandle> {
        self.perform(resources, &ResourceKind::Deployment, Operation::Destroy)
    }
}
