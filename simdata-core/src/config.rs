//! Configuration files for simdata.
//!
//! - `port.txt`: a single integer 1-65535, anything else means 8989.
//! - `simdata.yaml` (optional): bind host, static asset dir, file
//!   locations, and poller cadence.

use std::path::Path;
use std::time::Duration;

use crate::types::{Result, SimDataError};

/// Port used when the port file is missing or invalid.
pub const DEFAULT_PORT: u16 = 8989;

pub const DEFAULT_PORT_FILE: &str = "port.txt";
pub const DEFAULT_CONFIG_FILE: &str = "simdata.yaml";

// ---------------------------------------------------------------------------
// Port file
// ---------------------------------------------------------------------------

/// Parse port file contents. Surrounding whitespace is ignored.
pub fn parse_port(text: &str) -> u16 {
    match text.trim().parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => p as u16,
        _ => DEFAULT_PORT,
    }
}

pub fn load_port(path: &Path) -> u16 {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let port = parse_port(&text);
            if port == DEFAULT_PORT && text.trim() != DEFAULT_PORT.to_string() {
                tracing::warn!(path = %path.display(), "Invalid port file, using {DEFAULT_PORT}");
            }
            port
        }
        Err(_) => DEFAULT_PORT,
    }
}

/// Port for this run: an explicit override, else the port file.
pub fn effective_port(override_port: Option<u16>, port_file: &Path) -> u16 {
    override_port.unwrap_or_else(|| load_port(port_file))
}

pub fn save_port(path: &Path, port: u16) -> Result<()> {
    if port == 0 {
        return Err(SimDataError::Config("port must be 1-65535".into()));
    }
    std::fs::write(path, format!("{port}\n"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub static_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilesConfig {
    pub port_file: String,
    pub offsets_file: String,
}

/// Poller cadence and source selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Sleep after a cycle that published a reading.
    pub interval_ms: u64,
    /// Sleep between checks while armed but not running.
    pub idle_tick_ms: u64,
    /// Sleep after a cycle where no source produced a reading.
    pub backoff_ms: u64,
    /// Rank the synthetic source last in the priority list.
    pub mock: bool,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            interval_ms: 1000,
            idle_tick_ms: 200,
            backoff_ms: 1000,
            mock: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                static_dir: "static".into(),
            },
            files: FilesConfig {
                port_file: DEFAULT_PORT_FILE.into(),
                offsets_file: crate::catalog::DEFAULT_OFFSETS_FILE.into(),
            },
            poller: PollerConfig::default(),
        }
    }
}

/// Load settings from `path`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read config, using defaults");
            Config::default()
        }
    }
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Parse simple YAML-like config text. Unknown keys and bad values are ignored.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        match (section, key) {
            ("server", "host") => set_string(&mut config.server.host, val),
            ("server", "static_dir") => set_string(&mut config.server.static_dir, val),
            ("files", "port_file") => set_string(&mut config.files.port_file, val),
            ("files", "offsets_file") => set_string(&mut config.files.offsets_file, val),
            ("poller", "interval_ms") => set_millis(&mut config.poller.interval_ms, val),
            ("poller", "idle_tick_ms") => set_millis(&mut config.poller.idle_tick_ms, val),
            ("poller", "backoff_ms") => set_millis(&mut config.poller.backoff_ms, val),
            ("poller", "mock") => {
                if let Some(v) = parse_bool_value(val) {
                    config.poller.mock = v;
                }
            }
            _ => tracing::debug!(section, key, "Ignoring unknown config key"),
        }
    }

    config
}

fn set_string(slot: &mut String, val: &str) {
    if let Some(v) = parse_string_value(val) {
        *slot = v;
    }
}

fn set_millis(slot: &mut u64, val: &str) {
    match val.parse::<u64>() {
        Ok(v) if v > 0 => *slot = v,
        _ => {}
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_bool_value(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let lines = [
        "# simdata configuration".to_string(),
        String::new(),
        "server:".into(),
        format!("  host: \"{}\"", config.server.host),
        format!("  static_dir: \"{}\"", config.server.static_dir),
        String::new(),
        "files:".into(),
        format!("  port_file: \"{}\"", config.files.port_file),
        format!("  offsets_file: \"{}\"", config.files.offsets_file),
        String::new(),
        "poller:".into(),
        format!("  interval_ms: {}", config.poller.interval_ms),
        format!("  idle_tick_ms: {}", config.poller.idle_tick_ms),
        format!("  backoff_ms: {}", config.poller.backoff_ms),
        format!("  mock: {}", config.poller.mock),
    ];
    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("9999"), 9999);
        assert_eq!(parse_port("  8080\n"), 8080);
        assert_eq!(parse_port("abc"), DEFAULT_PORT);
        assert_eq!(parse_port("0"), DEFAULT_PORT);
        assert_eq!(parse_port("65536"), DEFAULT_PORT);
        assert_eq!(parse_port("-1"), DEFAULT_PORT);
        assert_eq!(parse_port(""), DEFAULT_PORT);
    }

    #[test]
    fn test_load_port_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_PORT_FILE);
        assert_eq!(load_port(&path), DEFAULT_PORT);

        std::fs::write(&path, "9999").unwrap();
        assert_eq!(load_port(&path), 9999);

        std::fs::write(&path, "abc").unwrap();
        assert_eq!(load_port(&path), DEFAULT_PORT);

        save_port(&path, 12345).unwrap();
        assert_eq!(load_port(&path), 12345);
        assert!(save_port(&path, 0).is_err());
    }

    #[test]
    fn test_effective_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.txt");
        assert_eq!(effective_port(None, &path), DEFAULT_PORT);

        std::fs::write(&path, "9999").unwrap();
        assert_eq!(effective_port(None, &path), 9999);
        assert_eq!(effective_port(Some(8080), &path), 8080);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.files.port_file, "port.txt");
        assert_eq!(config.files.offsets_file, "fsuipc_offsets.json");
        assert_eq!(config.poller.interval(), Duration::from_secs(1));
        assert_eq!(config.poller.idle_tick(), Duration::from_millis(200));
        assert!(!config.poller.mock);
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
server:
  host: "127.0.0.1"
  static_dir: '/srv/simdata'

files:
  offsets_file: offsets.json

poller:
  interval_ms: 500
  backoff_ms: 0
  mock: yes
  colour: blue
"#;
        let config = parse_config(text);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.static_dir, "/srv/simdata");
        assert_eq!(config.files.offsets_file, "offsets.json");
        assert_eq!(config.files.port_file, "port.txt");
        assert_eq!(config.poller.interval_ms, 500);
        assert_eq!(config.poller.backoff_ms, 1000);
        assert!(config.poller.mock);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE);
        let mut config = Config::default();
        config.server.host = "192.168.1.20".into();
        config.poller.idle_tick_ms = 50;
        config.poller.mock = true;

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path), config);
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(&dir.path().join("nope.yaml")), Config::default());
    }
}
