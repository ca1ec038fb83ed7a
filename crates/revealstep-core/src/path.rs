#![forbid(unsafe_code)]

//! Resource path resolution.

use crate::config::EngineConfig;

/// How the final resource path of a surface is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPlan {
    /// Embed this path without checking it.
    Direct(String),
    /// Check `primary` first; embed `fallback` if it does not exist.
    Probe { primary: String, fallback: String },
}

impl PathPlan {
    /// The path to embed once the probe (if any) has answered.
    #[must_use]
    pub fn resolve(self, primary_exists: bool) -> String {
        match self {
            Self::Direct(path) => path,
            Self::Probe { primary, .. } if primary_exists => primary,
            Self::Probe { primary, fallback } => {
                tracing::warn!(%primary, %fallback, "resource not found, falling back to unprefixed path");
                fallback
            }
        }
    }
}

/// Choose the path plan for an authored resource path.
#[must_use]
pub fn plan_path(file: &str, config: &EngineConfig) -> PathPlan {
    if config.map_path.is_empty() {
        return PathPlan::Direct(file.to_owned());
    }
    let prefixed = join_prefix(&config.map_path, file);
    if config.probe_resources {
        PathPlan::Probe {
            primary: prefixed,
            fallback: file.to_owned(),
        }
    } else {
        PathPlan::Direct(prefixed)
    }
}

/// Join a prefix and a relative path with exactly one separator.
#[must_use]
pub fn join_prefix(prefix: &str, file: &str) -> String {
    if prefix.is_empty() {
        return file.to_owned();
    }
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        file.trim_start_matches('/')
    )
}
