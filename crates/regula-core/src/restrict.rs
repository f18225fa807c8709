//! Namespace restricts used to scope vector-index entries by tenant.
//!
//! An index entry carries one [`Restrict`] per namespace. A query matches an
//! entry when, for every namespace the query restricts, the entry's allow-list
//! shares at least one token with the query's allow-list.

use serde::{Deserialize, Serialize};

use crate::Framework;

pub const TENANT_NAMESPACE: &str = "tenant_id";
pub const SCOPE_NAMESPACE: &str = "scope";
pub const FRAMEWORK_NAMESPACE: &str = "framework";

pub const GLOBAL: &str = "global";
pub const PRIVATE: &str = "private";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restrict {
    pub namespace: String,
    pub allow_list: Vec<String>,
}

impl Restrict {
    pub fn new(namespace: &str, allow: &[&str]) -> Self {
        Self {
            namespace: namespace.to_string(),
            allow_list: allow.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Restricts attached to the index entry of a requirement.
pub fn entry_restricts(tenant_id: Option<&str>, framework: Framework) -> Vec<Restrict> {
    vec![
        Restrict::new(TENANT_NAMESPACE, &[tenant_id.unwrap_or(GLOBAL)]),
        Restrict::new(SCOPE_NAMESPACE, &[if tenant_id.is_some() { PRIVATE } else { GLOBAL }]),
        Restrict::new(FRAMEWORK_NAMESPACE, &[framework.as_str()]),
    ]
}

/// Restricts for a query: a tenant sees its own entries plus the global corpus,
/// an anonymous query sees the global corpus only.
pub fn query_restricts(tenant_id: Option<&str>, framework: Option<Framework>) -> Vec<Restrict> {
    let mut restricts = match tenant_id {
        Some(tenant) => vec![Restrict::new(TENANT_NAMESPACE, &[tenant, GLOBAL])],
        None => vec![Restrict::new(SCOPE_NAMESPACE, &[GLOBAL])],
    };
    if let Some(f) = framework {
        restricts.push(Restrict::new(FRAMEWORK_NAMESPACE, &[f.as_str()]));
    }
    restricts
}

/// Whether an entry tagged with `entry` is visible to a query restricted by `query`.
pub fn matches(entry: &[Restrict], query: &[Restrict]) -> bool {
    query.iter().all(|q| {
        entry
            .iter()
            .filter(|e| e.namespace == q.namespace)
            .any(|e| e.allow_list.iter().any(|tok| q.allow_list.contains(tok)))
    })
}

/// A datapoint to upsert into a secondary vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub restricts: Vec<Restrict>,
}

impl IndexEntry {
    /// Allow-list of the first restrict in `namespace`, if present.
    pub fn allow_list(&self, namespace: &str) -> Option<&[String]> {
        self.restricts
            .iter()
            .find(|r| r.namespace == namespace)
            .map(|r| r.allow_list.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_entry_restricts() {
        let r = entry_restricts(None, Framework::Aneel);
        assert_eq!(r[0], Restrict::new(TENANT_NAMESPACE, &[GLOBAL]));
        assert_eq!(r[1], Restrict::new(SCOPE_NAMESPACE, &[GLOBAL]));
        assert_eq!(r[2], Restrict::new(FRAMEWORK_NAMESPACE, &["ANEEL"]));
    }

    #[test]
    fn private_entry_restricts() {
        let r = entry_restricts(Some("acme"), Framework::Ons);
        assert_eq!(r[0], Restrict::new(TENANT_NAMESPACE, &["acme"]));
        assert_eq!(r[1], Restrict::new(SCOPE_NAMESPACE, &[PRIVATE]));
    }

    #[test]
    fn tenant_query_sees_own_and_global() {
        let q = query_restricts(Some("acme"), None);
        assert!(matches(&entry_restricts(Some("acme"), Framework::Ons), &q));
        assert!(matches(&entry_restricts(None, Framework::Ons), &q));
        assert!(!matches(&entry_restricts(Some("other"), Framework::Ons), &q));
    }

    #[test]
    fn anonymous_query_sees_global_only() {
        let q = query_restricts(None, None);
        assert!(matches(&entry_restricts(None, Framework::Bpmn), &q));
        assert!(!matches(&entry_restricts(Some("acme"), Framework::Bpmn), &q));
    }

    #[test]
    fn framework_restrict_filters() {
        let q = query_restricts(None, Some(Framework::Bpmn));
        assert!(matches(&entry_restricts(None, Framework::Bpmn), &q));
        assert!(!matches(&entry_restricts(None, Framework::Aneel), &q));
    }

    #[test]
    fn restrict_serializes_camel_case() {
        let json = serde_json::to_value(Restrict::new(SCOPE_NAMESPACE, &[GLOBAL])).unwrap();
        assert_eq!(json["namespace"], "scope");
        assert_eq!(json["allowList"][0], "global");
    }
}
