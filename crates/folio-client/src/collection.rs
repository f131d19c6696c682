//! Okapi collection endpoints.
//!
//! FOLIO list responses wrap their records in an array whose name differs per
//! module (`users`, `usergroups`, `servicepoints`, ...), so a collection is
//! the pair of its path and that array key.

use serde::{Deserialize, Serialize};

/// A remote collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collection {
    /// Path relative to the Okapi base URL, without leading or trailing slash.
    pub path: String,
    /// Name of the array holding records in list responses.
    pub records_key: String,
}

impl Collection {
    pub fn new(path: impl Into<String>, records_key: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: path.trim_matches('/').to_string(),
            records_key: records_key.into(),
        }
    }

    #[must_use]
    pub fn users() -> Self {
        Self::new("users", "users")
    }

    #[must_use]
    pub fn patron_groups() -> Self {
        Self::new("groups", "usergroups")
    }

    #[must_use]
    pub fn departments() -> Self {
        Self::new("departments", "departments")
    }

    #[must_use]
    pub fn address_types() -> Self {
        Self::new("addresstypes", "addressTypes")
    }

    #[must_use]
    pub fn service_points() -> Self {
        Self::new("service-points", "servicepoints")
    }

    #[must_use]
    pub fn service_points_users() -> Self {
        Self::new("service-points-users", "servicePointsUsers")
    }

    #[must_use]
    pub fn request_preferences() -> Self {
        Self::new(
            "request-preference-storage/request-preference",
            "requestPreferences",
        )
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.path)
    }
}
