//! Process configuration: an optional TOML file layered under CLI flags
//! (spec.md §2 ADD-10/11). Neither the file nor the flags are part of the
//! core's protocol surface; `Config` only feeds `Core::new`/the binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// A fully-resolved configuration, after merging file defaults with CLI
/// overrides (`sockproxy-serverd`'s `Cli` does the merge; the library only
/// consumes the result).
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem path of the root `UnixListener` clients first connect to.
    pub listen_path: PathBuf,
    /// Buffers pre-warmed into the pool at startup.
    pub buffer_pool_prewarm: usize,
    /// Max `RunnerJob`s drained per wakeup before re-polling, bounding how
    /// long one busy fd can starve the others.
    pub jobs_per_tick: usize,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> LogConfig {
        LogConfig { level: "info".to_string(), json: false }
    }
}

/// On-disk shape of the optional config file; every field is optional so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub listen_path: Option<PathBuf>,
    pub buffer_pool_prewarm: Option<usize>,
    pub jobs_per_tick: Option<usize>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen_path: PathBuf::from("/tmp/sockproxy.sock"),
            buffer_pool_prewarm: 0,
            jobs_per_tick: 256,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file, falling back to `Config::default`
    /// field-by-field for anything the file omits.
    pub fn load_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })
    }

    pub fn merge_file(mut self, file: ConfigFile) -> Config {
        if let Some(p) = file.listen_path {
            self.listen_path = p;
        }
        if let Some(n) = file.buffer_pool_prewarm {
            self.buffer_pool_prewarm = n;
        }
        if let Some(n) = file.jobs_per_tick {
            self.jobs_per_tick = n;
        }
        self.log = file.log;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("parsing config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_apply_field_by_field() {
        let file = ConfigFile {
            listen_path: Some(PathBuf::from("/run/sockproxy.sock")),
            buffer_pool_prewarm: None,
            jobs_per_tick: Some(64),
            log: LogConfig::default(),
        };
        let cfg = Config::default().merge_file(file);
        assert_eq!(cfg.listen_path, PathBuf::from("/run/sockproxy.sock"));
        assert_eq!(cfg.buffer_pool_prewarm, 0);
        assert_eq!(cfg.jobs_per_tick, 64);
    }
}
