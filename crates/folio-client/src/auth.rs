//! Tenant authentication headers for Okapi.
//!
//! Okapi identifies the tenant with `x-okapi-tenant` and authorizes the call
//! with `x-okapi-token`. Obtaining the token (the `/authn/login` flow) is the
//! caller's business; this module only carries and applies it.

use crate::error::{FolioClientError, FolioClientResult};
use reqwest::RequestBuilder;

/// Header carrying the tenant identifier.
pub const TENANT_HEADER: &str = "x-okapi-tenant";

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "x-okapi-token";

/// Tenant credentials applied to every Okapi request.
#[derive(Clone)]
pub struct OkapiAuth {
    tenant: String,
    token: String,
}

impl std::fmt::Debug for OkapiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkapiAuth")
            .field("tenant", &self.tenant)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl OkapiAuth {
    /// Build credentials, rejecting blank tenant or token up front.
    pub fn new(tenant: impl Into<String>, token: impl Into<String>) -> FolioClientResult<Self> {
        let tenant = tenant.into().trim().to_string();
        let token = token.into().trim().to_string();
        if tenant.is_empty() {
            return Err(FolioClientError::InvalidConfig(
                "tenant identifier is required".to_string(),
            ));
        }
        if token.is_empty() {
            return Err(FolioClientError::InvalidConfig(
                "Okapi token is required".to_string(),
            ));
        }
        Ok(Self { tenant, token })
    }

    /// The tenant identifier.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Apply the tenant and token headers to a request builder.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(TENANT_HEADER, &self.tenant)
            .header(TOKEN_HEADER, &self.token)
    }
}
