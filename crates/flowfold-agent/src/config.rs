use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub socket: String,
    pub topology: Option<PathBuf>,
    /// Pending transitions settle on their own after this long.
    pub settle_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            socket: default_socket_path(),
            topology: None,
            settle_ms: 800,
        }
    }
}

impl AgentConfig {
    pub fn settle_after(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    fn apply(&mut self, args: CliArgs) {
        if let Some(socket) = args.socket {
            self.socket = socket;
        }
        if let Some(topology) = args.topology {
            self.topology = Some(topology);
        }
        if let Some(settle_ms) = args.settle_ms {
            self.settle_ms = settle_ms;
        }
    }
}

/// Command-line overrides; unset flags fall back to the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub topology: Option<PathBuf>,
    pub socket: Option<String>,
    pub settle_ms: Option<u64>,
    pub save_config: bool,
}

pub fn default_socket_path() -> String {
    // Wayland-friendly: prefer XDG_RUNTIME_DIR
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        format!("{dir}/flowfold.sock")
    } else {
        "/tmp/flowfold.sock".to_string()
    }
}

fn config_file_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "flowfold")?;
    Some(proj.config_dir().join("agent.toml"))
}

/// Config file (explicit `--config` or the per-user default) with flags
/// applied on top. `--save-config` writes the merged result back.
pub fn load() -> Result<AgentConfig> {
    let args = parse_args_from(std::env::args_os().skip(1))?;
    let path = args.config.clone().or_else(config_file_path);
    let mut cfg = match &path {
        Some(path) => load_or_default_from_path(path),
        None => AgentConfig::default(),
    };
    let save = args.save_config;
    cfg.apply(args);

    if save {
        let Some(path) = path else {
            anyhow::bail!("no config directory available");
        };
        save_to_path(&cfg, &path)?;
        tracing::info!(path = %path.display(), "agent config saved");
    }
    Ok(cfg)
}

fn load_or_default_from_path(path: &Path) -> AgentConfig {
    let Ok(contents) = fs::read_to_string(path) else {
        return AgentConfig::default();
    };
    toml::from_str(&contents).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable agent config");
        AgentConfig::default()
    })
}

fn save_to_path(cfg: &AgentConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(cfg).context("failed to serialize agent config")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write agent config {}", path.display()))?;
    Ok(())
}

fn parse_args_from<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--topology" {
            let Some(path) = args.next() else {
                anyhow::bail!("--topology expects a path");
            };
            out.topology = Some(PathBuf::from(path));
        } else if arg == "--socket" {
            let Some(path) = args.next() else {
                anyhow::bail!("--socket expects a path");
            };
            out.socket = Some(path.to_string_lossy().into_owned());
        } else if arg == "--settle-ms" {
            let Some(value) = args.next() else {
                anyhow::bail!("--settle-ms expects milliseconds");
            };
            let value = value.to_string_lossy();
            let ms = value
                .parse::<u64>()
                .with_context(|| format!("invalid --settle-ms value: {value}"))?;
            out.settle_ms = Some(ms);
        } else if arg == "--config" {
            let Some(path) = args.next() else {
                anyhow::bail!("--config expects a path");
            };
            out.config = Some(PathBuf::from(path));
        } else if arg == "--save-config" {
            out.save_config = true;
        } else {
            anyhow::bail!("unknown argument: {:?}", arg);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn parses_all_flags() {
        let parsed = parse_args_from(args(&[
            "--topology",
            "data.json",
            "--socket",
            "/tmp/x.sock",
            "--settle-ms",
            "250",
            "--config",
            "agent.toml",
            "--save-config",
        ]))
        .expect("args parsed");

        assert_eq!(parsed.topology, Some(PathBuf::from("data.json")));
        assert_eq!(parsed.socket.as_deref(), Some("/tmp/x.sock"));
        assert_eq!(parsed.settle_ms, Some(250));
        assert_eq!(parsed.config, Some(PathBuf::from("agent.toml")));
        assert!(parsed.save_config);
    }

    #[test]
    fn rejects_bad_flags() {
        assert!(parse_args_from(args(&["--settle-ms", "soon"])).is_err());
        assert!(parse_args_from(args(&["--topology"])).is_err());
        assert!(parse_args_from(args(&["--verbose"])).is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let mut cfg = AgentConfig {
            socket: "/run/a.sock".to_string(),
            topology: Some(PathBuf::from("old.json")),
            settle_ms: 800,
        };
        cfg.apply(CliArgs {
            settle_ms: Some(100),
            ..CliArgs::default()
        });

        assert_eq!(cfg.socket, "/run/a.sock");
        assert_eq!(cfg.topology, Some(PathBuf::from("old.json")));
        assert_eq!(cfg.settle_after(), Duration::from_millis(100));
    }

    #[test]
    fn agent_config_roundtrip_save_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("agent.toml");
        let cfg = AgentConfig {
            socket: "/tmp/flowfold-test.sock".to_string(),
            topology: Some(PathBuf::from("/srv/flows.json")),
            settle_ms: 1200,
        };

        save_to_path(&cfg, &path).expect("save config");
        assert_eq!(load_or_default_from_path(&path), cfg);
    }

    #[test]
    fn missing_or_partial_file_uses_defaults() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert_eq!(load_or_default_from_path(&missing), AgentConfig::default());

        let partial = dir.path().join("partial.toml");
        fs::write(&partial, "settle_ms = 50\n").expect("write");
        let cfg = load_or_default_from_path(&partial);
        assert_eq!(cfg.settle_ms, 50);
        assert_eq!(cfg.topology, None);
    }
}
