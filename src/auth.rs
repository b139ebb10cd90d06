//! API-key authentication.
//!
//! Credential *issuance* happens elsewhere; this module only consumes
//! a registry of provisioned keys. `SMRITI_AGENT_KEYS` holds
//! comma-separated `key:agent_id:access` triples, e.g.
//!
//! ```text
//! SMRITI_AGENT_KEYS=k1:crm-agent:shared,k2:ops-agent:private
//! ```
//!
//! The middleware resolves the `X-API-Key` header to an
//! [`AgentIdentity`] (agent id + access level) and attaches it to the
//! request. Handlers never see raw keys.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::env;

use crate::memory::{AccessLevel, AgentIdentity};

/// API key authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
    NotConfigured,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingApiKey => (StatusCode::UNAUTHORIZED, "Missing X-API-Key header"),
            AuthError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "Invalid API key"),
            AuthError::NotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Agent keys not configured. Set SMRITI_AGENT_KEYS environment variable.",
            ),
        };
        (status, message).into_response()
    }
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Leaks the length of the shorter string, which is acceptable for API
/// keys where lengths are not secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let mut result = (a.len() ^ b.len()) as u8;
    let min_len = std::cmp::min(a.len(), b.len());
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    for i in 0..min_len {
        result |= a_bytes[i] ^ b_bytes[i];
    }
    result == 0
}

#[derive(Debug, Clone)]
struct KeyEntry {
    key: String,
    identity: AgentIdentity,
}

fn parse_registry(raw: &str) -> Vec<KeyEntry> {
    raw.split(',')
        .filter_map(|item| {
            let mut parts = item.trim().splitn(3, ':');
            let key = parts.next()?.trim();
            let agent_id = parts.next()?.trim();
            if key.is_empty() || agent_id.is_empty() {
                return None;
            }
            let access = parts
                .next()
                .and_then(AccessLevel::parse)
                .unwrap_or(AccessLevel::Private);
            Some(KeyEntry {
                key: key.to_string(),
                identity: AgentIdentity {
                    agent_id: agent_id.to_string(),
                    access,
                },
            })
        })
        .collect()
}

fn load_registry() -> Result<Vec<KeyEntry>, AuthError> {
    match env::var("SMRITI_AGENT_KEYS") {
        Ok(raw) if !raw.trim().is_empty() => Ok(parse_registry(&raw)),
        _ => {
            let is_production = env::var("SMRITI_ENV")
                .map(|v| {
                    let v = v.to_lowercase();
                    v == "production" || v == "prod"
                })
                .unwrap_or(false);
            if is_production {
                tracing::error!("SMRITI_AGENT_KEYS not set in production mode");
                return Err(AuthError::NotConfigured);
            }
            tracing::warn!(
                "SMRITI_AGENT_KEYS not set - using development key (not for production!)"
            );
            Ok(parse_registry("smriti-dev-key:dev-agent:shared"))
        }
    }
}

/// Fail fast at startup when no usable key registry exists, instead of
/// rejecting every request later.
pub fn check_registry() -> anyhow::Result<usize> {
    match load_registry() {
        Ok(entries) if !entries.is_empty() => Ok(entries.len()),
        Ok(_) => anyhow::bail!("SMRITI_AGENT_KEYS contains no valid key entries"),
        Err(_) => anyhow::bail!("SMRITI_AGENT_KEYS must be set in production mode"),
    }
}

/// Resolve an API key to an agent identity using constant-time
/// comparison against every registered key.
pub fn authenticate(provided_key: &str) -> Result<AgentIdentity, AuthError> {
    let registry = load_registry()?;
    let mut found: Option<AgentIdentity> = None;
    for entry in &registry {
        // Check every key to keep timing independent of match position.
        if constant_time_compare(&entry.key, provided_key) && found.is_none() {
            found = Some(entry.identity.clone());
        }
    }
    found.ok_or(AuthError::InvalidApiKey)
}

/// Authentication middleware for protected routes.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, AuthError> {
    let key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingApiKey)?;

    let identity = authenticate(key)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_parsing() {
        let entries = parse_registry("k1:crm-agent:shared, k2:ops-agent:private, k3:plain-agent");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].identity.agent_id, "crm-agent");
        assert_eq!(entries[0].identity.access, AccessLevel::Shared);
        assert_eq!(entries[1].identity.access, AccessLevel::Private);
        // Missing access level defaults to private.
        assert_eq!(entries[2].identity.access, AccessLevel::Private);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let entries = parse_registry(":missing-key,keyonly,k:a:shared");
        // ":missing-key" has an empty key, "keyonly" lacks an agent id.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity.agent_id, "a");
    }

    #[test]
    fn constant_time_compare_basics() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
