//! Merging user configuration into request and action templates.
//!
//! Configuration keys have the form `<component>.<property>`. Component names
//! may contain dots themselves (`mock.test.machine1`), so a key is routed to
//! the longest component name that is a dot-prefix of it. The property part
//! is a literal key (custom properties such as `Vrm.DataCenter.Location`
//! contain dots too) that is searched for anywhere inside the component; when
//! it is not found it is added to the component's `data` map.

use crate::error::{Error, Result};
use crate::types::{RequestTemplate, ResourceConfiguration};
use crate::value::{PropertyMap, Scalar, TemplateValue};
use std::collections::BTreeMap;

/// Key of the nested property map inside a component.
const COMPONENT_DATA_KEY: &str = "data";

/// What a merge did to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Keys that overwrote an existing property.
    pub replaced: Vec<String>,
    /// Keys that were added as new properties.
    pub appended: Vec<String>,
    /// Whether any stored value differs from before the merge.
    pub changed: bool,
}

impl MergeOutcome {
    fn record(&mut self, key: &str, applied: Applied) {
        match applied {
            Applied::Replaced { changed } => {
                self.replaced.push(key.to_string());
                self.changed |= changed;
            }
            Applied::Appended => {
                self.appended.push(key.to_string());
                self.changed = true;
            }
        }
    }
}

enum Applied {
    Replaced { changed: bool },
    Appended,
}

/// Names of the components in `data`: keys whose value is a mapping.
pub fn component_names(data: &PropertyMap) -> Vec<String> {
    data.iter()
        .filter(|(_, value)| value.is_mapping())
        .map(|(name, _)| name.clone())
        .collect()
}

/// Check that every key routes to a component, reporting all bad keys at once.
pub fn validate_keys<'a>(
    components: &[String],
    keys: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    let mut unknown = Vec::new();
    let mut malformed = Vec::new();

    for key in keys {
        match strip_to_component(key, components) {
            Some((_, "")) => malformed.push(key.clone()),
            Some(_) => {}
            None => unknown.push(key.clone()),
        }
    }

    if unknown.is_empty() && malformed.is_empty() {
        return Ok(());
    }

    Err(Error::InvalidConfigurationKeys {
        unknown,
        malformed,
        components: components.to_vec(),
    })
}

/// Drop trailing dotted segments until the remainder names a component.
fn strip_to_component<'k>(key: &'k str, components: &[String]) -> Option<(&'k str, &'k str)> {
    let mut end = key.len();
    while let Some(dot) = key[..end].rfind('.') {
        let prefix = &key[..dot];
        if components.iter().any(|c| c == prefix) {
            return Some((prefix, &key[dot + 1..]));
        }
        end = dot;
    }
    None
}

/// Order component names longest first, so `foo.bar` is tried before `foo`.
fn longest_first(components: &[String]) -> Vec<&str> {
    let mut ordered: Vec<&str> = components.iter().map(String::as_str).collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    ordered
}

/// Split `key` into the first matching component and its property.
fn route<'k>(key: &'k str, ordered: &[&str]) -> Option<(&'k str, &'k str)> {
    ordered.iter().find_map(|component| {
        key.strip_prefix(component)
            .and_then(|rest| rest.strip_prefix('.'))
            .map(|property| (&key[..component.len()], property))
    })
}

/// Group routable `<component>.<property>` keys by component.
///
/// Keys that match no component are skipped.
pub fn group_by_component(
    configuration: &BTreeMap<String, Scalar>,
    components: &[String],
) -> ResourceConfiguration {
    let ordered = longest_first(components);
    let mut grouped = ResourceConfiguration::new();
    for (key, value) in configuration {
        if let Some((component, property)) = route(key, &ordered) {
            if property.is_empty() {
                continue;
            }
            grouped
                .entry(component.to_string())
                .or_default()
                .insert(property.to_string(), value.clone());
        }
    }
    grouped
}

/// Merge dotted configuration keys into the components of `data`.
///
/// All keys are validated before anything is written. `data` is modified in
/// place.
pub fn merge(
    data: &mut PropertyMap,
    configuration: &BTreeMap<String, Scalar>,
) -> Result<MergeOutcome> {
    let components = component_names(data);
    validate_keys(&components, configuration.keys())?;

    let ordered = longest_first(&components);
    let mut outcome = MergeOutcome::default();

    for (key, value) in configuration {
        let Some((component, property)) = route(key, &ordered) else {
            continue;
        };
        let Some(TemplateValue::Mapping(target)) = data.get_mut(component) else {
            continue;
        };

        log::debug!("Setting {property} on component {component}");
        let applied = apply_to_component(target, property, value);
        outcome.record(key, applied);
    }

    Ok(outcome)
}

/// Merge plain property names into a single property map, such as the
/// `data` of an action template. New properties are added at the top level.
pub fn merge_properties(
    target: &mut PropertyMap,
    properties: &BTreeMap<String, Scalar>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    for (property, value) in properties {
        let applied = match replace_property(target, property, value) {
            Some(changed) => Applied::Replaced { changed },
            None => {
                target.insert(property.clone(), TemplateValue::Scalar(value.clone()));
                Applied::Appended
            }
        };
        outcome.record(property, applied);
    }
    outcome
}

fn apply_to_component(component: &mut PropertyMap, property: &str, value: &Scalar) -> Applied {
    if let Some(changed) = replace_property(component, property, value) {
        return Applied::Replaced { changed };
    }

    let leaf = TemplateValue::Scalar(value.clone());
    match component.get_mut(COMPONENT_DATA_KEY) {
        Some(TemplateValue::Mapping(map)) => {
            map.insert(property.to_string(), leaf);
        }
        // `data` holds a scalar here; keep it and set the property alongside.
        Some(_) => {
            component.insert(property.to_string(), leaf);
        }
        None => {
            let map = PropertyMap::from([(property.to_string(), leaf)]);
            component.insert(COMPONENT_DATA_KEY.to_string(), TemplateValue::Mapping(map));
        }
    }
    Applied::Appended
}

/// Replace the first occurrence of `key` in `map`, searching this level
/// before descending into nested mappings (and mappings inside sequences)
/// in key order.
///
/// Returns `None` when the key does not occur, otherwise whether the stored
/// value changed.
fn replace_property(map: &mut PropertyMap, key: &str, value: &Scalar) -> Option<bool> {
    if let Some(existing) = map.get_mut(key) {
        return Some(overwrite(existing, value));
    }

    map.values_mut().find_map(|child| replace_in_value(child, key, value))
}

fn replace_in_value(node: &mut TemplateValue, key: &str, value: &Scalar) -> Option<bool> {
    match node {
        TemplateValue::Mapping(map) => replace_property(map, key, value),
        TemplateValue::Sequence(items) => items
            .iter_mut()
            .find_map(|item| replace_in_value(item, key, value)),
        TemplateValue::Scalar(_) => None,
    }
}

fn overwrite(existing: &mut TemplateValue, value: &Scalar) -> bool {
    let next = match existing {
        TemplateValue::Scalar(current) => value.coerce_like(current),
        _ => value.clone(),
    };
    let next = TemplateValue::Scalar(next);
    if *existing == next {
        false
    } else {
        *existing = next;
        true
    }
}

impl RequestTemplate {
    /// Merge `<component>.<property>` configuration into this template.
    pub fn merge(&mut self, configuration: &BTreeMap<String, Scalar>) -> Result<MergeOutcome> {
        merge(&mut self.data, configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> PropertyMap {
        match TemplateValue::from(value) {
            TemplateValue::Mapping(map) => map,
            _ => panic!("expected a mapping"),
        }
    }

    fn config(entries: &[(&str, Scalar)]) -> BTreeMap<String, Scalar> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn lookup<'a>(map: &'a PropertyMap, path: &[&str]) -> Option<&'a TemplateValue> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(map.get(*first)?, |node, key| node.get(key))
    }

    #[test]
    fn test_component_names_are_structural() {
        let d = data(json!({
            "machine": {"data": {}},
            "_leaseDays": 3,
            "tags": ["a"],
            "oddly.named": {}
        }));
        assert_eq!(
            component_names(&d),
            vec!["machine".to_string(), "oddly.named".to_string()]
        );
    }

    #[test]
    fn test_longest_component_wins() {
        let mut d = data(json!({
            "foo": {"data": {"cpu": 1}},
            "foo.bar": {"data": {"cpu": 1}}
        }));

        let outcome = merge(&mut d, &config(&[("foo.bar.cpu", Scalar::from(4))])).unwrap();

        assert!(outcome.changed);
        assert_eq!(
            lookup(&d, &["foo.bar", "data", "cpu"]),
            Some(&TemplateValue::Scalar(Scalar::from(4)))
        );
        assert_eq!(
            lookup(&d, &["foo", "data", "cpu"]),
            Some(&TemplateValue::Scalar(Scalar::from(1)))
        );
    }

    #[test]
    fn test_shorter_component_still_routes() {
        let mut d = data(json!({
            "foo": {"data": {"cpu": 1}},
            "foo.bar": {"data": {"cpu": 1}}
        }));

        merge(&mut d, &config(&[("foo.cpu", Scalar::from(2))])).unwrap();

        assert_eq!(
            lookup(&d, &["foo", "data", "cpu"]),
            Some(&TemplateValue::Scalar(Scalar::from(2)))
        );
        assert_eq!(
            lookup(&d, &["foo.bar", "data", "cpu"]),
            Some(&TemplateValue::Scalar(Scalar::from(1)))
        );
    }

    #[test]
    fn test_invalid_keys_reported_together() {
        let mut d = data(json!({
            "mock.test.machine1": {"data": {"cpu": 1}},
            "machine2": {"data": {"cpu": 1}}
        }));
        let before = d.clone();

        let err = merge(
            &mut d,
            &config(&[
                ("mock.test.machine1.cpu", Scalar::from(2)),
                ("mock.machine3.vSphere.mock.cpu", Scalar::from(2)),
                ("machine2.memory", Scalar::from(1024)),
            ]),
        )
        .unwrap_err();

        match err {
            Error::InvalidConfigurationKeys {
                unknown, malformed, ..
            } => {
                assert_eq!(unknown, vec!["mock.machine3.vSphere.mock.cpu".to_string()]);
                assert!(malformed.is_empty());
            }
            other => panic!("Expected InvalidConfigurationKeys, got {other:?}"),
        }
        // Nothing is written when validation fails.
        assert_eq!(d, before);
    }

    #[test]
    fn test_multiple_invalid_keys_in_one_error() {
        let mut d = data(json!({"web": {"data": {}}}));
        let err = merge(
            &mut d,
            &config(&[
                ("db.cpu", Scalar::from(1)),
                ("cache.memory", Scalar::from(1)),
                ("nodot", Scalar::from(1)),
                ("web.", Scalar::from(1)),
            ]),
        )
        .unwrap_err();

        match err {
            Error::InvalidConfigurationKeys {
                unknown,
                malformed,
                components,
            } => {
                assert_eq!(
                    unknown,
                    vec![
                        "cache.memory".to_string(),
                        "db.cpu".to_string(),
                        "nodot".to_string()
                    ]
                );
                assert_eq!(malformed, vec!["web.".to_string()]);
                assert_eq!(components, vec!["web".to_string()]);
            }
            other => panic!("Expected InvalidConfigurationKeys, got {other:?}"),
        }
    }

    #[test]
    fn test_replace_nested_property() {
        let mut d = data(json!({
            "web": {
                "componentTypeId": "com.vmware.csp.component.cafe.composition",
                "data": {
                    "cpu": 1,
                    "disks": [{"data": {"capacity": 10}}]
                }
            }
        }));

        let outcome = merge(&mut d, &config(&[("web.capacity", Scalar::from("40"))])).unwrap();

        assert_eq!(outcome.replaced, vec!["web.capacity".to_string()]);
        let disks = lookup(&d, &["web", "data", "disks"]).unwrap();
        let TemplateValue::Sequence(items) = disks else {
            panic!("expected a sequence");
        };
        assert_eq!(
            items[0].get("data").and_then(|m| m.get("capacity")),
            Some(&TemplateValue::Scalar(Scalar::from(40)))
        );
    }

    #[test]
    fn test_append_when_missing() {
        let mut d = data(json!({"web": {"data": {"cpu": 1}}, "db": {}}));

        let outcome = merge(
            &mut d,
            &config(&[
                ("web.Vrm.DataCenter.Location", Scalar::from("east")),
                ("db.memory", Scalar::from(2048)),
            ]),
        )
        .unwrap();

        assert_eq!(outcome.appended.len(), 2);
        assert!(outcome.changed);
        assert_eq!(
            lookup(&d, &["web", "data", "Vrm.DataCenter.Location"]),
            Some(&TemplateValue::Scalar(Scalar::from("east")))
        );
        assert_eq!(
            lookup(&d, &["db", "data", "memory"]),
            Some(&TemplateValue::Scalar(Scalar::from(2048)))
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut d = data(json!({"web": {"data": {"cpu": 1}}}));
        let cfg = config(&[
            ("web.cpu", Scalar::from("2")),
            ("web.description", Scalar::from("frontend")),
        ]);

        let first = merge(&mut d, &cfg).unwrap();
        assert!(first.changed);
        let after_first = d.clone();

        let second = merge(&mut d, &cfg).unwrap();
        assert!(!second.changed);
        assert!(second.appended.is_empty());
        assert_eq!(second.replaced.len(), 2);
        assert_eq!(d, after_first);
    }

    #[test]
    fn test_same_value_is_not_a_change() {
        let mut d = data(json!({"web": {"data": {"cpu": 2}}}));
        let outcome = merge(&mut d, &config(&[("web.cpu", Scalar::from("2"))])).unwrap();
        assert!(!outcome.changed);
    }

    #[test]
    fn test_merge_properties_on_action_data() {
        let mut d = data(json!({"cpu": 1, "memory": 1024, "disks": [{"data": {"capacity": 10}}]}));

        let outcome = merge_properties(
            &mut d,
            &config(&[("cpu", Scalar::from("2")), ("owner", Scalar::from("ops"))]),
        );

        assert!(outcome.changed);
        assert_eq!(d.get("cpu"), Some(&TemplateValue::Scalar(Scalar::from(2))));
        assert_eq!(d.get("owner"), Some(&TemplateValue::Scalar(Scalar::from("ops"))));

        let again = merge_properties(&mut d, &config(&[("cpu", Scalar::from(2))]));
        assert!(!again.changed);
    }

    #[test]
    fn test_request_template_merge() {
        let mut template = RequestTemplate {
            data: data(json!({"web": {"data": {"cpu": 1}}})),
            ..Default::default()
        };
        let outcome = template
            .merge(&config(&[("web.cpu", Scalar::from(3))]))
            .unwrap();
        assert!(outcome.changed);
    }

    #[test]
    fn test_group_by_component() {
        let components = vec!["web".to_string(), "web.db".to_string()];
        let grouped = group_by_component(
            &config(&[
                ("web.cpu", Scalar::from(2)),
                ("web.db.memory", Scalar::from(4096)),
                ("cache.cpu", Scalar::from(1)),
            ]),
            &components,
        );

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["web"].get("cpu"), Some(&Scalar::from(2)));
        assert_eq!(grouped["web.db"].get("memory"), Some(&Scalar::from(4096)));
    }

    #[test]
    fn test_route_prefers_longest() {
        let components = vec!["foo".to_string(), "foo.bar".to_string()];
        let ordered = longest_first(&components);
        assert_eq!(ordered, vec!["foo.bar", "foo"]);
        assert_eq!(route("foo.bar.cpu", &ordered), Some(("foo.bar", "cpu")));
        assert_eq!(route("foo.baz", &ordered), Some(("foo", "baz")));
        assert_eq!(route("foobar.cpu", &ordered), None);
    }
}
