use super::Resource;
use crate::Context;
use crate::cli::ResourceArgs;
use crate::config::ConnectionConfig;
use crate::ui;
use anyhow::{Context as _, Result};
use catalogkit::{PreparedRequest, Provisioner};

pub fn run(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let resource = Resource::load(args)?;
    let provisioner = ConnectionConfig::load()?.connect()?;

    let prepared = execute(&provisioner, &resource)?;
    if !ctx.quiet {
        ui::header(&format!("Plan for {}", resource.name()));
        ui::kv("catalog item", &prepared.ids.catalog_item_id);
        ui::kv(
            "business group",
            &ui::or_dash(prepared.ids.business_group_id.as_deref()),
        );
        for key in &prepared.merge.replaced {
            ui::kv("replace", key);
        }
        for key in &prepared.merge.appended {
            ui::kv("append", key);
        }
        println!();
    }
    println!("{}", render(&prepared)?);
    Ok(())
}

/// Resolve ids and merge the definition into the request template
pub fn execute(provisioner: &Provisioner, resource: &Resource) -> Result<PreparedRequest> {
    Ok(provisioner.prepare(&resource.definition.spec)?)
}

/// The request body `create` would submit
pub fn render(prepared: &PreparedRequest) -> Result<String> {
    serde_json::to_string_pretty(&prepared.template).context("Failed to render request template")
}
