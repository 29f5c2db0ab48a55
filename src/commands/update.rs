use super::{Resource, connect};
use crate::Context;
use crate::cli::ResourceArgs;
use crate::{progress, ui};
use anyhow::{Result, bail};
use catalogkit::{Provisioner, RequestHandle};

pub fn run(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let mut resource = Resource::load(args)?;
    if !resource.state.is_tracked() {
        bail!("'{}' is not provisioned; run `catalogctl create` first", resource.name());
    }

    let (provisioner, pb) = connect(ctx, &format!("Updating {}", resource.name()))?;
    let result = execute(&provisioner, &mut resource);

    match &result {
        Ok(posted) if posted.is_empty() => {
            progress::finish_clear(&pb);
            ui::success(&format!("{} already matches its definition", resource.name()));
        }
        Ok(posted) => {
            progress::finish_success(
                &pb,
                &format!("Reconfigured {} machine(s) of {}", posted.len(), resource.name()),
            );
            for handle in posted {
                ui::kv("request", handle.id());
            }
        }
        Err(_) => progress::finish_error(&pb, &format!("Failed to update {}", resource.name())),
    }
    result.map(|_| ())
}

/// Reconfigure machines whose settings differ from the definition
pub fn execute(provisioner: &Provisioner, resource: &mut Resource) -> Result<Vec<RequestHandle>> {
    let result = provisioner.update(&resource.definition.spec, &mut resource.state.record);
    resource.persist(result)
}
