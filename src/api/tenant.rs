//! Tenant header binding (SPEC_FULL.md §6 "Tenant routing").
//!
//! When `TENANT_HEADER_ENABLED=1`, `X-Team-Id`/`X-Manager-Id` select the
//! per-tenant state file for the request lifetime; otherwise the configured
//! default team id is used. This is pure header extraction — the actual
//! per-tenant file selection happens in `persistence`, keyed off the
//! resolved team id we hand `TurnRunner::run_turn`.

use axum::http::HeaderMap;

use crate::config::KernelConfig;

#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    pub team_id: Option<String>,
    pub manager_id: Option<String>,
}

/// Resolve the ambient tenant context for one request from its headers,
/// honoring `tenant_header_enabled`.
pub fn resolve(config: &KernelConfig, headers: &HeaderMap) -> TenantContext {
    if !config.tenant_header_enabled {
        return TenantContext::default();
    }
    TenantContext {
        team_id: header_str(headers, "X-Team-Id"),
        manager_id: header_str(headers, "X-Manager-Id"),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}
