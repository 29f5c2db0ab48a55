//! Command implementations.
//!
//! Every command loads a resource definition and its persisted state, talks
//! to the catalog through a [`Provisioner`] and writes the state back, also
//! when the remote call failed part way.

pub mod create;
pub mod delete;
pub mod plan;
pub mod read;
pub mod show;
pub mod update;

use crate::Context;
use crate::cli::ResourceArgs;
use crate::config::{ConnectionConfig, ResourceDefinition};
use crate::paths;
use crate::progress::{self, PollSpinner};
use crate::state::ResourceState;
use anyhow::Result;
use catalogkit::Provisioner;
use indicatif::ProgressBar;
use std::path::PathBuf;

/// A resource definition together with its persisted state
pub struct Resource {
    pub definition: ResourceDefinition,
    pub state: ResourceState,
    pub state_path: PathBuf,
}

impl Resource {
    /// Load the definition named on the command line and its state
    pub fn load(args: &ResourceArgs) -> Result<Self> {
        let definition_path = paths::expand(&args.definition.to_string_lossy());
        let definition = ResourceDefinition::load(&definition_path)?;
        let state_path = ResourceState::path_for(definition.name())?;
        let mut state = ResourceState::load_from(&state_path, definition.name())?;
        state.definition = Some(definition_path);
        Ok(Self {
            definition,
            state,
            state_path,
        })
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Save state, then hand back `result`
    ///
    /// A save failure is reported but does not mask an earlier error.
    pub fn persist<T>(&mut self, result: catalogkit::Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.state.save_to(&self.state_path)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(save_err) = self.state.save_to(&self.state_path) {
                    log::warn!("Could not save state for '{}': {save_err:#}", self.name());
                }
                Err(err.into())
            }
        }
    }

    /// Forget the resource entirely
    pub fn forget(&self) -> Result<()> {
        ResourceState::remove_at(&self.state_path)
    }
}

/// Connect to the catalog with a spinner fed by request polling
pub fn connect(ctx: &Context, label: &str) -> Result<(Provisioner, ProgressBar)> {
    let config = ConnectionConfig::load()?;
    let provisioner = config.connect()?;
    let pb = progress::spinner(label, ctx.quiet);
    let provisioner = provisioner.with_observer(Box::new(PollSpinner::new(pb.clone(), label)));
    Ok((provisioner, pb))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use catalogkit::{MockTransport, ResourceSpec, Sleeper};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    pub const CATALOG_PATH: &str =
        "catalog-service/api/consumer/entitledCatalogItemViews?page=1&limit=100";
    pub const TEMPLATE_PATH: &str =
        "catalog-service/api/consumer/entitledCatalogItems/c-1/requests/template";
    pub const SUBMIT_PATH: &str = "catalog-service/api/consumer/entitledCatalogItems/c-1/requests";
    pub const STATUS_PATH: &str = "catalog-service/api/consumer/requests/r-1";
    pub const VIEWS_PATH: &str = "catalog-service/api/consumer/requests/r-1/resourceViews";
    pub const RESOURCES_PATH: &str = "catalog-service/api/consumer/requests/r-1/resources";

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    pub fn provisioner(mock: &MockTransport) -> Provisioner {
        Provisioner::new(Box::new(mock.clone()), "vsphere.local").with_sleeper(Box::new(NoSleep))
    }

    pub fn resource(dir: &TempDir, spec: ResourceSpec) -> Resource {
        let definition = ResourceDefinition {
            name: Some("web".to_string()),
            spec,
        };
        Resource {
            definition,
            state: ResourceState::new("web"),
            state_path: dir.path().join("web.json"),
        }
    }

    pub fn mock_catalog(mock: &MockTransport) {
        mock.on_get(
            CATALOG_PATH,
            json!({
                "content": [{"catalogItemId": "c-1", "name": "CentOS 7"}],
                "metadata": {"size": 1, "totalElements": 1, "totalPages": 1, "number": 1}
            }),
        );
        mock.on_get(
            TEMPLATE_PATH,
            json!({
                "type": "com.vmware.vcac.catalog.domain.request.CatalogItemProvisioningRequest",
                "catalogItemId": "c-1",
                "data": {"web": {"data": {"cpu": 1}}}
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::testing::resource;
    use catalogkit::{Error, ResourceSpec};
    use tempfile::TempDir;

    #[test]
    fn test_persist_saves_on_error() {
        let dir = TempDir::new().unwrap();
        let mut resource = resource(&dir, ResourceSpec::default());
        resource.state.record.request_id = Some("r-1".to_string());

        let result: anyhow::Result<()> =
            resource.persist(Err(Error::InvalidConfig("boom".to_string())));

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
        assert!(resource.state_path.exists());
    }

    #[test]
    fn test_forget_removes_state() {
        let dir = TempDir::new().unwrap();
        let mut resource = resource(&dir, ResourceSpec::default());
        resource.persist(Ok(())).unwrap();

        resource.forget().unwrap();
        assert!(!resource.state_path.exists());
    }
}
