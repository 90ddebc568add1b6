//! Process-wide configuration, assembled once at boot from the environment.
//!
//! Mirrors the reference backend's `state::load_config` shape: a fallible
//! loader that fails fast with a descriptive string rather than panicking
//! deep inside a turn.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Bearer,
    ApiKeyHeader,
}

impl std::str::FromStr for AuthMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bearer" => Ok(AuthMode::Bearer),
            "api_key" => Ok(AuthMode::ApiKeyHeader),
            other => Err(format!(
                "invalid AUTH_MODE {other:?}: expected \"bearer\" or \"api_key\""
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub env: String,
    pub auth_enabled: bool,
    pub auth_mode: AuthMode,
    pub api_key: Option<String>,
    pub tenant_header_enabled: bool,
    pub allowed_origins: Vec<String>,
    pub debug: bool,
    pub state_dir: PathBuf,
    pub default_team_id: String,
}

impl KernelConfig {
    /// Load configuration from the process environment. Fails fast on a
    /// malformed `AUTH_MODE` or an `AUTH_ENABLED=1` with no `API_KEY` set —
    /// both are boot-time errors, never per-request failures.
    pub fn from_env() -> Result<Self, String> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "development".to_string());
        let auth_enabled = env_flag("AUTH_ENABLED");
        let auth_mode: AuthMode = std::env::var("AUTH_MODE")
            .unwrap_or_else(|_| "bearer".to_string())
            .parse()?;
        let api_key = std::env::var("API_KEY").ok();
        if auth_enabled && api_key.as_deref().unwrap_or("").is_empty() {
            return Err("AUTH_ENABLED=1 requires API_KEY to be set".to_string());
        }
        let tenant_header_enabled = env_flag("TENANT_HEADER_ENABLED");
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let debug = env_flag("OE_DEBUG");
        let state_dir = std::env::var("OE_STATE_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("offer-engine")
        });
        let default_team_id =
            std::env::var("OE_DEFAULT_TEAM_ID").unwrap_or_else(|_| "default".to_string());

        Ok(KernelConfig {
            env,
            auth_enabled,
            auth_mode,
            api_key,
            tenant_header_enabled,
            allowed_origins,
            debug,
            state_dir,
            default_team_id,
        })
    }
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}
