//! Field protection filter.
//!
//! Decides, field by field, whether an update takes the incoming value or
//! keeps what the remote record already has.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::record::{has_value, set_at, value_at, CanonicalRecord};

/// Field paths whose existing remote value must survive an update.
///
/// Protecting a path protects its whole subtree as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionSet {
    paths: BTreeSet<String>,
}

impl ProtectionSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| p.as_ref().trim().trim_matches('.').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list, e.g. `personal.email,barcode`.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Add more paths.
    pub fn extend<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.paths.extend(Self::new(paths).paths);
    }

    /// The protected path covering `path` (itself or an ancestor), if any.
    #[must_use]
    pub fn covering(&self, path: &str) -> Option<&str> {
        self.paths
            .iter()
            .find(|p| path == p.as_str() || is_ancestor(p, path))
            .map(String::as_str)
    }

    /// Protection re-rooted at `prefix`, for records stored apart from their
    /// parent (e.g. `servicePointsUser`). A protected `prefix` itself becomes
    /// the empty path, which protects the whole record.
    #[must_use]
    pub fn scoped(&self, prefix: &str) -> Self {
        let nested = format!("{prefix}.");
        let mut scoped = BTreeSet::new();
        for path in &self.paths {
            if path == prefix || is_ancestor(path, prefix) {
                scoped.insert(String::new());
            } else if let Some(rest) = path.strip_prefix(&nested) {
                scoped.insert(rest.to_string());
            }
        }
        Self { paths: scoped }
    }
}

impl fmt::Display for ProtectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    ancestor.is_empty()
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Build the record to write back for a matched remote record.
///
/// Starts from `existing` (so fields the input does not mention survive),
/// applies every candidate field, then restores each protected path that has
/// a value in `existing`.
#[must_use]
pub fn merge(candidate: &CanonicalRecord, existing: &Value, protection: &ProtectionSet) -> Value {
    let mut merged = existing.clone();
    for (path, value) in candidate.iter() {
        set_at(&mut merged, path, value.clone());
    }

    for path in protection.iter() {
        if let Some(kept) = value_at(existing, path).filter(|v| has_value(Some(*v))) {
            set_at(&mut merged, path, kept.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn existing() -> Value {
        json!({
            "id": "u-1",
            "username": "jdoe",
            "barcode": "111",
            "personal": {
                "lastName": "Doe",
                "email": "a@x.com",
                "phone": "",
                "addresses": [{"city": "Springfield", "addressTypeId": "home-id"}]
            },
            "metadata": {"createdDate": "2024-01-01"}
        })
    }

    #[test]
    fn test_unprotected_fields_take_candidate() {
        let candidate = CanonicalRecord::flatten(&json!({
            "username": "jdoe",
            "personal": {"lastName": "Smith", "email": "b@y.com"}
        }));
        let merged = merge(&candidate, &existing(), &ProtectionSet::default());

        assert_eq!(merged["personal"]["lastName"], "Smith");
        assert_eq!(merged["personal"]["email"], "b@y.com");
        assert_eq!(merged["id"], "u-1");
        assert_eq!(merged["metadata"]["createdDate"], "2024-01-01");
        assert_eq!(merged["barcode"], "111");
    }

    #[test]
    fn test_protected_field_keeps_existing_value() {
        let candidate = CanonicalRecord::flatten(&json!({
            "barcode": "999",
            "personal": {"email": "b@y.com", "phone": "555", "lastName": "Smith"}
        }));
        let protection = ProtectionSet::parse("barcode, personal.email,personal.phone");
        let merged = merge(&candidate, &existing(), &protection);

        assert_eq!(merged["barcode"], "111");
        assert_eq!(merged["personal"]["email"], "a@x.com");
        // Existing phone is empty, so the candidate fills it.
        assert_eq!(merged["personal"]["phone"], "555");
        assert_eq!(merged["personal"]["lastName"], "Smith");
    }

    #[test]
    fn test_subtree_protection_is_atomic() {
        let candidate = CanonicalRecord::flatten(&json!({
            "personal": {"addresses": [{"city": "Shelbyville"}, {"city": "Ogdenville"}]}
        }));
        let merged = merge(
            &candidate,
            &existing(),
            &ProtectionSet::parse("personal.addresses"),
        );
        assert_eq!(
            merged["personal"]["addresses"],
            json!([{"city": "Springfield", "addressTypeId": "home-id"}])
        );

        let merged = merge(
            &candidate,
            &json!({"id": "u-2", "personal": {"addresses": []}}),
            &ProtectionSet::parse("personal.addresses"),
        );
        assert_eq!(
            merged["personal"]["addresses"],
            json!([{"city": "Shelbyville"}, {"city": "Ogdenville"}])
        );
    }

    #[test]
    fn test_ancestor_protection_covers_children() {
        let candidate = CanonicalRecord::flatten(&json!({
            "personal": {"lastName": "Smith", "middleName": "Q"}
        }));
        let protection = ProtectionSet::parse("personal");
        assert_eq!(protection.covering("personal.lastName"), Some("personal"));
        assert_eq!(protection.covering("personalNote"), None);

        let merged = merge(&candidate, &existing(), &protection);
        assert_eq!(merged["personal"], existing()["personal"]);
    }

    #[test]
    fn test_scoped_protection() {
        let protection = ProtectionSet::parse(
            "servicePointsUser.defaultServicePointId,requestPreference,barcode",
        );
        let sp = protection.scoped("servicePointsUser");
        assert_eq!(sp.iter().collect::<Vec<_>>(), vec!["defaultServicePointId"]);

        let rp = protection.scoped("requestPreference");
        assert_eq!(rp.iter().collect::<Vec<_>>(), vec![""]);

        let merged = merge(
            &CanonicalRecord::flatten(&json!({"holdShelf": false})),
            &json!({"id": "rp-1", "holdShelf": true, "userId": "u-1"}),
            &rp,
        );
        assert_eq!(merged["holdShelf"], true);
    }

    #[test]
    fn test_parse_ignores_blanks() {
        let protection = ProtectionSet::parse(" , barcode,, personal.email ,");
        assert_eq!(protection.len(), 2);
        assert_eq!(protection.to_string(), "barcode,personal.email");
    }
}
