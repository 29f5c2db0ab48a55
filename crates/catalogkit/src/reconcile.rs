//! Folding observed machine data back into configuration-shaped state.

use crate::types::{ResourceConfiguration, ResourceKind, ResourceView};
use crate::value::{Scalar, TemplateValue};
use std::collections::BTreeMap;

/// Configuration property name and the machine view field it is read from.
pub const MACHINE_FIELDS: &[(&str, &str)] = &[
    ("cpu", "MachineCPU"),
    ("memory", "MachineMemory"),
    ("storage", "MachineStorage"),
    ("ip_address", "ip_address"),
    ("name", "MachineName"),
    ("guest_os", "MachineGuestOperatingSystem"),
    ("blueprint_name", "MachineBlueprintName"),
    ("reservation_name", "MachineReservationName"),
    ("interface_type", "MachineInterfaceType"),
    ("machine_id", "machineId"),
    ("group_name", "MachineGroupName"),
    ("destruction_date", "MachineDestructionDate"),
];

/// Result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    /// The new per-component state.
    pub configuration: ResourceConfiguration,
    /// Whether `configuration` differs from the prior state.
    pub changed: bool,
    /// Components present now but not before.
    pub added: Vec<String>,
    /// Components present before but not now.
    pub removed: Vec<String>,
    /// Components present in both with different properties.
    pub modified: Vec<String>,
}

/// Observed properties of one machine view. Null and missing fields are
/// left out.
pub fn observed_properties(view: &ResourceView) -> BTreeMap<String, Scalar> {
    MACHINE_FIELDS
        .iter()
        .filter_map(|(property, field)| match view.data.get(*field) {
            Some(TemplateValue::Scalar(value)) if !value.is_null() => {
                Some(((*property).to_string(), value.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Overlay the machine data in `views` onto `prior`.
///
/// Only machine views count. Observed fields replace the prior values of
/// their component; properties the views do not report are kept. Components
/// without a machine view are dropped.
pub fn reconcile(prior: &ResourceConfiguration, views: &[ResourceView]) -> Reconciliation {
    let mut configuration = ResourceConfiguration::new();

    for view in views.iter().filter(|v| v.kind() == ResourceKind::Machine) {
        let component = view.component_name();
        let properties = configuration
            .entry(component.to_string())
            .or_insert_with(|| prior.get(component).cloned().unwrap_or_default());
        properties.extend(observed_properties(view));
    }

    let added = configuration
        .keys()
        .filter(|name| !prior.contains_key(*name))
        .cloned()
        .collect();
    let removed = prior
        .keys()
        .filter(|name| !configuration.contains_key(*name))
        .cloned()
        .collect();
    let modified: Vec<String> = configuration
        .iter()
        .filter(|(name, props)| prior.get(*name).is_some_and(|before| before != *props))
        .map(|(name, _)| name.clone())
        .collect();

    let changed = configuration != *prior;
    if changed {
        log::debug!("Observed state differs for {} component(s)", configuration.len());
    }

    Reconciliation {
        configuration,
        changed,
        added,
        removed,
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine(name: &str, component: &str, ip: &str) -> ResourceView {
        serde_json::from_value(json!({
            "resourceId": format!("res-{name}"),
            "name": name,
            "resourceType": "Infrastructure.Virtual",
            "data": {
                "Component": component,
                "MachineCPU": 2,
                "MachineMemory": 4096,
                "MachineStorage": 40,
                "ip_address": ip,
                "MachineName": name,
                "MachineGuestOperatingSystem": "CentOS 7",
                "MachineDestructionDate": null,
                "NETWORK_LIST": [{"data": {"NETWORK_NAME": "vlan-10"}}]
            }
        }))
        .unwrap()
    }

    fn network() -> ResourceView {
        serde_json::from_value(json!({
            "resourceId": "net-1",
            "name": "vlan-10",
            "resourceType": "Infrastructure.Network.Network.Existing",
            "data": {"Component": "net", "ip_address": "10.0.0.0"}
        }))
        .unwrap()
    }

    #[test]
    fn test_observed_properties_skip_nulls() {
        let props = observed_properties(&machine("dev-1", "web", "10.0.0.5"));
        assert_eq!(props.get("cpu"), Some(&Scalar::from(2)));
        assert_eq!(props.get("ip_address"), Some(&Scalar::from("10.0.0.5")));
        assert_eq!(props.get("guest_os"), Some(&Scalar::from("CentOS 7")));
        assert!(!props.contains_key("destruction_date"));
        assert!(!props.contains_key("blueprint_name"));
    }

    #[test]
    fn test_identical_data_is_unchanged() {
        let views = vec![machine("dev-1", "web", "10.0.0.5"), network()];
        let first = reconcile(&ResourceConfiguration::new(), &views);
        assert!(first.changed);
        assert_eq!(first.added, vec!["web".to_string()]);

        let second = reconcile(&first.configuration, &views);
        assert!(!second.changed);
        assert_eq!(second.configuration, first.configuration);
        assert!(second.added.is_empty() && second.removed.is_empty() && second.modified.is_empty());
    }

    #[test]
    fn test_single_field_change_is_detected() {
        let before = reconcile(
            &ResourceConfiguration::new(),
            &[machine("dev-1", "web", "10.0.0.5")],
        );

        let after = reconcile(&before.configuration, &[machine("dev-1", "web", "10.0.0.6")]);

        assert!(after.changed);
        assert_eq!(after.modified, vec!["web".to_string()]);
        assert_eq!(
            after.configuration["web"].get("ip_address"),
            Some(&Scalar::from("10.0.0.6"))
        );
        assert_eq!(after.configuration["web"].get("cpu"), Some(&Scalar::from(2)));
    }

    #[test]
    fn test_user_properties_survive_and_absent_components_drop() {
        let mut prior = ResourceConfiguration::new();
        prior
            .entry("web".to_string())
            .or_default()
            .insert("Vrm.DataCenter.Location".to_string(), Scalar::from("east"));
        prior
            .entry("db".to_string())
            .or_default()
            .insert("cpu".to_string(), Scalar::from(4));

        let result = reconcile(&prior, &[machine("dev-1", "web", "10.0.0.5")]);

        assert!(result.changed);
        assert_eq!(result.removed, vec!["db".to_string()]);
        assert_eq!(
            result.configuration["web"].get("Vrm.DataCenter.Location"),
            Some(&Scalar::from("east"))
        );
        assert!(!result.configuration.contains_key("db"));
        assert!(!result.configuration.contains_key("net"));
    }

    #[test]
    fn test_component_falls_back_to_view_name() {
        let view: ResourceView = serde_json::from_value(json!({
            "name": "dev-7",
            "resourceType": "Infrastructure.Cloud",
            "data": {"MachineCPU": 1}
        }))
        .unwrap();

        let result = reconcile(&ResourceConfiguration::new(), &[view]);
        assert_eq!(result.configuration["dev-7"].get("cpu"), Some(&Scalar::from(1)));
    }
}
