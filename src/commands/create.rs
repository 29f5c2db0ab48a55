use super::{Resource, connect};
use crate::Context;
use crate::cli::ResourceArgs;
use crate::{progress, ui};
use anyhow::{Result, bail};
use catalogkit::{CatalogRequest, Phase, Provisioner};

pub fn run(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let mut resource = Resource::load(args)?;
    ensure_untracked(&resource)?;

    let (provisioner, pb) = connect(ctx, &format!("Creating {}", resource.name()))?;
    let result = execute(&provisioner, &mut resource);

    match &result {
        Ok(request) if request.phase == Phase::Successful => {
            progress::finish_success(&pb, &format!("Created {}", resource.name()));
        }
        Ok(request) => {
            progress::finish_clear(&pb);
            ui::warn(&format!(
                "Request {} is {}; run `catalogctl read` later to pick up its resources",
                request.id,
                ui::phase(&request.phase)
            ));
        }
        Err(_) => progress::finish_error(&pb, &format!("Failed to create {}", resource.name())),
    }
    result?;

    if !ctx.quiet {
        super::show::print_state(&resource.state, ctx.verbose > 0);
    }
    Ok(())
}

/// Submit the request and record what was observed
pub fn execute(provisioner: &Provisioner, resource: &mut Resource) -> Result<CatalogRequest> {
    let result = provisioner.create(&resource.definition.spec, &mut resource.state.record);
    resource.persist(result)
}

fn ensure_untracked(resource: &Resource) -> Result<()> {
    if let Some(id) = &resource.state.record.request_id {
        bail!(
            "'{}' already exists (request {id}); use `update` or `delete`",
            resource.name()
        );
    }
    Ok(())
}
