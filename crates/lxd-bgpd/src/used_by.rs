//! Parsing of LXD `used_by` resource locators
//!
//! Entries look like `/1.0/instances/c1?project=web`. The project qualifier is
//! optional and defaults to [`DEFAULT_PROJECT`].

use crate::topology::DEFAULT_PROJECT;
use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Resource kind of downstream networks
pub const KIND_NETWORKS: &str = "networks";
/// Resource kind of instances
pub const KIND_INSTANCES: &str = "instances";

/// Groups the names of `kind` resources in `entries` by project.
///
/// Entries that do not parse, have fewer than three path segments or refer
/// to another resource kind are skipped. Order of names within a project
/// follows the input.
pub fn parse_used_by(entries: &[String], kind: &str) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let Ok(base) = Url::parse("http://lxd/") else {
        return grouped;
    };

    for entry in entries {
        let locator = match base.join(entry) {
            Ok(locator) => locator,
            Err(e) => {
                debug!(entry = %entry, error = %e, "Skipping unparseable used_by entry");
                continue;
            }
        };

        let Some(segments) = locator.path_segments() else {
            continue;
        };
        let segments: Vec<&str> = segments.collect();
        if segments.len() < 3 || segments[1] != kind || segments[2].is_empty() {
            continue;
        }
        let name = match percent_decode_str(segments[2]).decode_utf8() {
            Ok(name) => name.into_owned(),
            Err(e) => {
                debug!(entry = %entry, error = %e, "Skipping used_by entry with invalid name");
                continue;
            }
        };

        let project = locator
            .query_pairs()
            .find(|(key, _)| key == "project")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());

        grouped
            .entry(project)
            .or_default()
            .push(name);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entries(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_groups_by_project() {
        let used_by = entries(&[
            "/1.0/networks/lxdbr1",
            "/1.0/networks/web-net?project=web",
            "/1.0/networks/lxdbr2?project=default",
            "/1.0/instances/c1",
        ]);

        let parsed = parse_used_by(&used_by, KIND_NETWORKS);
        let expected: BTreeMap<String, Vec<String>> = [
            (
                "default".to_string(),
                vec!["lxdbr1".to_string(), "lxdbr2".to_string()],
            ),
            ("web".to_string(), vec!["web-net".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_filters_by_kind() {
        let used_by = entries(&[
            "/1.0/networks/lxdbr1",
            "/1.0/instances/c1?project=web",
            "/1.0/profiles/default",
        ]);

        let parsed = parse_used_by(&used_by, KIND_INSTANCES);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["web"], vec!["c1".to_string()]);
    }

    #[test]
    fn test_skips_short_and_malformed_entries() {
        let used_by = entries(&["/1.0/networks", "", "not a locator", "/1.0/networks/"]);
        assert!(parse_used_by(&used_by, KIND_NETWORKS).is_empty());
    }

    #[test]
    fn test_names_are_percent_decoded() {
        let used_by = entries(&["/1.0/instances/my%20box?project=dev%20team"]);
        let parsed = parse_used_by(&used_by, KIND_INSTANCES);
        assert_eq!(parsed["dev team"], vec!["my box".to_string()]);
    }

    #[test]
    fn test_empty_project_uses_default() {
        let used_by = entries(&["/1.0/instances/c1?project="]);
        let parsed = parse_used_by(&used_by, KIND_INSTANCES);
        assert_eq!(parsed["default"], vec!["c1".to_string()]);
    }
}
