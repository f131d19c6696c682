//! Resource profiles.
//!
//! A profile bundles everything the engine needs to reconcile one kind of
//! FOLIO record: the collection, how rows are normalized, the default match
//! key and protection, reference fields and sidecar records.

use folio_client::Collection;

use crate::matcher::MatchKey;
use crate::normalize::SchemaRules;
use crate::reference::ReferenceRule;

/// A subtree of the input record that FOLIO stores in its own collection,
/// linked back to the primary record by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    /// Dotted path of the subtree in the canonical record.
    pub path: String,
    pub collection: Collection,
    /// Field of the sidecar record holding the primary record's id.
    pub link_field: String,
}

impl Sidecar {
    pub fn new(path: impl Into<String>, collection: Collection, link_field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection,
            link_field: link_field.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceProfile {
    /// Profile name as given on the command line.
    pub name: String,
    /// Plural label for logs, e.g. "Users".
    pub label: String,
    pub collection: Collection,
    pub rules: SchemaRules,
    pub default_match_key: MatchKey,
    pub default_protection: Vec<String>,
    pub references: Vec<ReferenceRule>,
    pub sidecars: Vec<Sidecar>,
}

/// Names accepted by [`ResourceProfile::by_name`].
pub const PROFILE_NAMES: &[&str] = &["users", "departments", "patron-groups"];

impl ResourceProfile {
    #[must_use]
    pub fn users() -> Self {
        Self {
            name: "users".to_string(),
            label: "Users".to_string(),
            collection: Collection::users(),
            rules: SchemaRules::users(),
            default_match_key: MatchKey::ExternalSystemId,
            default_protection: [
                "personal.preferredFirstName",
                "personal.email",
                "personal.phone",
                "personal.addresses",
                "barcode",
            ]
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
            references: ReferenceRule::users(),
            sidecars: vec![
                Sidecar::new(
                    "servicePointsUser",
                    Collection::service_points_users(),
                    "userId",
                ),
                Sidecar::new(
                    "requestPreference",
                    Collection::request_preferences(),
                    "userId",
                ),
            ],
        }
    }

    #[must_use]
    pub fn departments() -> Self {
        Self {
            name: "departments".to_string(),
            label: "Departments".to_string(),
            collection: Collection::departments(),
            rules: SchemaRules::departments(),
            default_match_key: MatchKey::custom("code"),
            default_protection: Vec::new(),
            references: Vec::new(),
            sidecars: Vec::new(),
        }
    }

    #[must_use]
    pub fn patron_groups() -> Self {
        Self {
            name: "patron-groups".to_string(),
            label: "Patron groups".to_string(),
            collection: Collection::patron_groups(),
            rules: SchemaRules::patron_groups(),
            default_match_key: MatchKey::custom("group"),
            default_protection: Vec::new(),
            references: Vec::new(),
            sidecars: Vec::new(),
        }
    }

    /// Look a preset up by name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "users" | "user" => Some(Self::users()),
            "departments" | "department" => Some(Self::departments()),
            "patron-groups" | "patron_groups" | "groups" => Some(Self::patron_groups()),
            _ => None,
        }
    }

    /// Replace the normalization rules, e.g. with a passthrough schema.
    #[must_use]
    pub fn with_rules(mut self, rules: SchemaRules) -> Self {
        self.rules = rules;
        self
    }
}
