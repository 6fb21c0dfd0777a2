//! Candidate endpoint ordering
//!
//! The resolver never hardcodes which physical host answers requests.
//! Instead, a deployment probe reports where the client is running and this
//! module turns those observations plus the configured base URLs into an
//! ordered candidate list. The ordering is a pure function so the rules are
//! testable without touching the process environment.

use crate::config::ApiConfig;

/// Observations about the runtime environment used for endpoint ordering
#[cfg_attr(test, mockall::automock)]
pub trait DeploymentEnv: Send + Sync {
    /// Host name the client is running on, if known
    fn host_name(&self) -> Option<String>;

    /// Whether a production/deployed build mode flag is set
    fn production_mode(&self) -> bool;

    /// Explicit override for the deployed base URL
    fn deployed_override(&self) -> Option<String>;

    /// Explicit override for the local base URL
    fn local_override(&self) -> Option<String>;
}

/// Production probe backed by process environment variables
///
/// Reads `HOSTNAME` for the host name, `TMS_ENV=production` for the
/// production flag, and `TMS_API_URL` / `TMS_DEPLOYED_API_URL` for the base
/// URL overrides.
#[derive(Debug, Default, Clone)]
pub struct SystemEnv;

impl SystemEnv {
    pub fn new() -> Self {
        Self
    }

    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl DeploymentEnv for SystemEnv {
    fn host_name(&self) -> Option<String> {
        Self::var("HOSTNAME")
    }

    fn production_mode(&self) -> bool {
        Self::var("TMS_ENV").is_some_and(|v| v == "production")
    }

    fn deployed_override(&self) -> Option<String> {
        Self::var("TMS_DEPLOYED_API_URL")
    }

    fn local_override(&self) -> Option<String> {
        Self::var("TMS_API_URL")
    }
}

/// Compute the ordered candidate base URLs for one call
///
/// The list is never empty and never repeats a URL, so one pass through it
/// attempts every distinct endpoint exactly once:
/// 1. running on a host other than the local-development host: deployed
///    first, local as fallback
/// 2. production mode, or a deployed override explicitly configured:
///    deployed first, local as fallback
/// 3. otherwise (local development): local first, deployed as fallback
pub fn candidate_urls(env: &dyn DeploymentEnv, config: &ApiConfig) -> Vec<String> {
    let local = env
        .local_override()
        .unwrap_or_else(|| config.local_url.clone());
    let deployed_override = env.deployed_override();
    let has_deployed_override = deployed_override.is_some();
    let deployed = deployed_override.unwrap_or_else(|| config.deployed_url.clone());

    let deployed_first = match env.host_name() {
        Some(host) if host != config.local_host => {
            tracing::debug!("Host {} is not {}, preferring deployed endpoint", host, config.local_host);
            true
        }
        _ if env.production_mode() || has_deployed_override => {
            tracing::debug!("Production mode or deployed override set, preferring deployed endpoint");
            true
        }
        _ => {
            tracing::debug!("Local development, preferring local endpoint");
            false
        }
    };

    let ordered = if deployed_first {
        vec![deployed, local]
    } else {
        vec![local, deployed]
    };

    let mut candidates: Vec<String> = Vec::with_capacity(ordered.len());
    for url in ordered {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    }
    candidates
}
