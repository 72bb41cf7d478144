use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    schema::InspectorConfig,
};

/// Candidate file names, in lookup order.
pub const CONFIG_FILENAMES: &[&str] = &[
    "a2a-inspector.toml",
    "a2a-inspector.yaml",
    "a2a-inspector.yml",
    "a2a-inspector.json",
];

pub const ENV_BIND: &str = "A2A_INSPECTOR_BIND";
pub const ENV_PORT: &str = "A2A_INSPECTOR_PORT";

/// Load and parse a config file, picking the format from its extension.
pub fn load_from(path: &Path) -> Result<InspectorConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml")
        .to_lowercase();
    let config = match ext.as_str() {
        "yaml" | "yml" => {
            if raw.trim().is_empty() {
                InspectorConfig::default()
            } else {
                serde_yaml::from_str(&raw).map_err(|source| Error::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        },
        "json" => serde_json::from_str(&raw).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?,
        _ => toml::from_str(&raw).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?,
    };
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// First known config file name present in `dir`.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "a2a-inspector").map(|d| d.config_dir().to_path_buf())
}

/// Resolve the effective configuration.
///
/// An explicit path must exist. Otherwise the working directory and then the
/// user config directory are searched, falling back to defaults. Environment
/// overrides are applied last.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<InspectorConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_config_file(&cwd))
            .or_else(|| user_config_dir().and_then(|dir| find_config_file(&dir))),
    };

    let mut config = match &path {
        Some(path) => {
            info!(path = %path.display(), "using config file");
            load_from(path)?
        },
        None => {
            debug!("no config file found, using defaults");
            InspectorConfig::default()
        },
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Apply `A2A_INSPECTOR_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    config: &mut InspectorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
        config.server.bind = bind.trim().to_string();
    }
    if let Some(port) = lookup(ENV_PORT).filter(|v| !v.trim().is_empty()) {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|_| Error::message(format!("{ENV_PORT} must be a port number, got '{port}'")))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, crate::schema::StreamingMode, std::collections::HashMap};

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2a-inspector.toml");
        std::fs::write(&path, "[server]\nport = 7000\n\n[agent]\nstreaming = \"always\"\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.agent.streaming, StreamingMode::Always);
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2a-inspector.yaml");
        std::fs::write(&path, "session:\n  debug_log_limit: 10\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.session.debug_log_limit, 10);
        assert_eq!(config.session.outbound_buffer, 512);
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2a-inspector.json");
        std::fs::write(&path, r#"{"agent": {"accepted_output_modes": ["text/plain"]}}"#).unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.agent.accepted_output_modes, vec!["text/plain"]);
    }

    #[test]
    fn empty_yaml_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2a-inspector.yml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(load_from(&path).unwrap(), InspectorConfig::default());
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2a-inspector.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Toml { .. }));
        assert!(err.to_string().contains("a2a-inspector.toml"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_and_load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn find_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a2a-inspector.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a2a-inspector.toml"), "").unwrap();
        let found = find_config_file(dir.path()).unwrap();
        assert!(found.ends_with("a2a-inspector.toml"));
        assert!(find_config_file(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([(ENV_BIND, "0.0.0.0"), (ENV_PORT, " 8080 ")]);
        let mut config = InspectorConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn bad_port_override() {
        let mut config = InspectorConfig::default();
        let err = apply_env_overrides(&mut config, |k| (k == ENV_PORT).then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }
}
