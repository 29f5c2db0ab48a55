use super::{Resource, connect};
use crate::Context;
use crate::cli::ResourceArgs;
use crate::{progress, ui};
use anyhow::Result;
use catalogkit::{Provisioner, Reconciliation};

pub fn run(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let mut resource = Resource::load(args)?;
    if !resource.state.is_tracked() {
        ui::info(&format!("'{}' is not provisioned", resource.name()));
        return Ok(());
    }

    let (provisioner, pb) = connect(ctx, &format!("Reading {}", resource.name()))?;
    let result = execute(&provisioner, &mut resource);
    progress::finish_clear(&pb);

    match result? {
        Some(reconciliation) if reconciliation.changed => {
            ui::success(&format!("Refreshed {}", resource.name()));
            print_drift(&reconciliation);
        }
        Some(_) => ui::success(&format!("{} is up to date", resource.name())),
        None => {
            if let Some(phase) = &resource.state.record.request_status {
                ui::info(&format!(
                    "Request for '{}' is {}; no resources to read",
                    resource.name(),
                    ui::phase(phase)
                ));
            }
        }
    }
    Ok(())
}

/// Refresh the record from the remote request
pub fn execute(
    provisioner: &Provisioner,
    resource: &mut Resource,
) -> Result<Option<Reconciliation>> {
    let result = provisioner.read(&mut resource.state.record);
    resource.persist(result)
}

fn print_drift(reconciliation: &Reconciliation) {
    for component in &reconciliation.added {
        ui::kv("added", component);
    }
    for component in &reconciliation.removed {
        ui::kv("removed", component);
    }
    for key in &reconciliation.modified {
        ui::kv("modified", key);
    }
}
