//! Typed configuration record (spec §6): loaded from a JSON file, with a
//! minimal environment override for the file's own location. Unknown
//! keys are rejected so a typo in the file fails loudly at startup
//! rather than silently doing nothing.

use std::path::PathBuf;

use serde::Deserialize;

const CONFIG_PATH_ENV: &str = "CANTINA_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Track library the DJ coordinator selects from, in play order.
    pub track_library: Vec<String>,
    /// Where the memory store snapshots at shutdown / reloads at startup.
    /// `None` means no persistence (spec §6: "only the memory store
    /// optionally snapshots").
    pub memory_snapshot_path: Option<PathBuf>,
    /// `tracing_subscriber` env-filter directive used when `RUST_LOG` is
    /// unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self { track_library: Vec::new(), memory_snapshot_path: None, log_filter: "info".to_string() }
    }
}

impl Config {
    /// Load from the file named by `CANTINA_CONFIG_PATH`, or fall back to
    /// defaults if that variable is unset. A present-but-unreadable or
    /// invalid file is a startup error (unlike the memory snapshot, which
    /// only loses transient state on failure).
    pub fn load() -> anyhow::Result<Self> {
        let Some(path) = std::env::var_os(CONFIG_PATH_ENV) else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(&path)
            .map_err(|err| anyhow::anyhow!("failed to read config file {:?}: {err}", path))?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|err| anyhow::anyhow!("config file {:?} is not valid: {err}", path))?;
        Ok(config)
    }
}
