use super::{Resource, connect};
use crate::Context;
use crate::cli::DeleteArgs;
use crate::{progress, ui};
use anyhow::{Context as _, Result, bail};
use catalogkit::Provisioner;
use dialoguer::Confirm;

pub fn run(ctx: &Context, args: &DeleteArgs) -> Result<()> {
    let mut resource = Resource::load(&args.resource)?;
    let Some(request_id) = resource.state.record.request_id.clone() else {
        ui::info(&format!("'{}' is not provisioned; nothing to delete", resource.name()));
        return resource.forget();
    };

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Destroy '{}' (request {request_id})?",
                resource.name()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            bail!("Aborted");
        }
    }

    let (provisioner, pb) = connect(ctx, &format!("Destroying {}", resource.name()))?;
    match execute(&provisioner, &mut resource) {
        Ok(true) => {
            progress::finish_success(&pb, &format!("Destroyed {}", resource.name()));
            Ok(())
        }
        Ok(false) => {
            progress::finish_clear(&pb);
            ui::warn(&format!(
                "Destroy of '{}' finished but the request is still tracked",
                resource.name()
            ));
            Ok(())
        }
        Err(err) => {
            progress::finish_error(&pb, &format!("Failed to destroy {}", resource.name()));
            Err(err)
        }
    }
}

/// Destroy the deployment; returns whether it is gone
pub fn execute(provisioner: &Provisioner, resource: &mut Resource) -> Result<bool> {
    let wait_timeout = resource.definition.spec.wait_timeout;
    let result = provisioner.delete(wait_timeout, &mut resource.state.record);
    resource.persist(result)?;

    if resource.state.is_tracked() {
        return Ok(false);
    }
    resource.forget()?;
    Ok(true)
}
