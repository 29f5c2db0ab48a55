use super::Resource;
use crate::Context;
use crate::cli::ResourceArgs;
use crate::state::ResourceState;
use crate::ui;
use anyhow::Result;
use catalogkit::types::flatten_configuration;

pub fn run(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let resource = Resource::load(args)?;
    if !resource.state_path.exists() {
        ui::info(&format!("No state recorded for '{}'", resource.name()));
        return Ok(());
    }
    print_state(&resource.state, ctx.verbose > 0);
    Ok(())
}

/// Print persisted state; `detailed` adds every recorded property
pub fn print_state(state: &ResourceState, detailed: bool) {
    ui::header(&state.name);
    let record = &state.record;
    ui::kv("request", &ui::or_dash(record.request_id.as_deref()));
    match &record.request_status {
        Some(phase) => ui::kv("status", &ui::phase(phase).to_string()),
        None => ui::kv("status", "-"),
    }
    if let Some(message) = &record.failed_message {
        ui::kv("failure", message);
    }
    if let Some(definition) = &state.definition {
        ui::kv("definition", &definition.display().to_string());
    }
    ui::kv(
        "updated",
        &state.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    if record.resource_configuration.is_empty() {
        return;
    }
    ui::section("Components");
    if detailed {
        for (key, value) in flatten_configuration(&record.resource_configuration) {
            ui::kv(&key, &value.to_string());
        }
    } else {
        for (component, properties) in &record.resource_configuration {
            ui::kv(component, &summary(properties.len()));
        }
    }
}

fn summary(count: usize) -> String {
    match count {
        1 => "1 property".to_string(),
        n => format!("{n} properties"),
    }
}
