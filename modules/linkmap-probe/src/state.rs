//! Per-user state directory: `~/.linkmap/` holding `config.json`,
//! `probe.pid`, and `probe.log`. The PID file is the daemon lock.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().context("cannot locate home directory")?;
        Ok(Self {
            root: home.join(".linkmap"),
        })
    }

    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join("probe.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("probe.log")
    }

    pub fn load_config(&self) -> Result<Option<ProbeConfig>> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(config))
    }

    pub fn save_config(&self, config: &ProbeConfig) -> Result<()> {
        self.ensure()?;
        let raw = serde_json::to_string_pretty(config)?;
        fs::write(self.config_path(), raw)
            .with_context(|| format!("writing {}", self.config_path().display()))?;
        Ok(())
    }

    /// Drop the credentials, keeping the api base for the next login.
    pub fn clear_token(&self) -> Result<bool> {
        let Some(mut config) = self.load_config()? else {
            return Ok(false);
        };
        let had_token = config.access_token.is_some();
        config.access_token = None;
        config.user_id = None;
        self.save_config(&config)?;
        Ok(had_token)
    }

    pub fn read_pid(&self) -> Option<i32> {
        let raw = fs::read_to_string(self.pid_path()).ok()?;
        raw.trim().parse().ok()
    }

    pub fn write_pid(&self, pid: i32) -> Result<()> {
        self.ensure()?;
        fs::write(self.pid_path(), pid.to_string())
            .with_context(|| format!("writing {}", self.pid_path().display()))?;
        Ok(())
    }

    pub fn remove_pid(&self) {
        let _ = fs::remove_file(self.pid_path());
    }
}
