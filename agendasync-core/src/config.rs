//! Global agendasync configuration at ~/.config/agendasync/config.toml

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::backend::RetryPolicy;
use crate::backend::provider::DEFAULT_PROVIDER_TIMEOUT;
use crate::entry::SyncType;
use crate::error::{SyncError, SyncResult};
use crate::snapshot::Roster;

static DEFAULT_DATA_DIR: &str = "~/agendasync";
static DEFAULT_PROVIDER: &str = "outlook";
static DEFAULT_TIMEZONE: &str = "Europe/Zurich";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "AGENDASYNC_CONFIG";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_provider_timeout() -> Duration {
    DEFAULT_PROVIDER_TIMEOUT
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgendasyncConfig {
    /// State files live in `data_dir/state`, run reports in `data_dir/reports`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub provider_timeout: Duration,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub agendas: BTreeMap<String, AgendaConfig>,

    /// Raw schedule name -> teacher id.
    #[serde(default)]
    pub roster: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgendaConfig {
    pub sync_type: SyncType,

    /// Snapshot files, merged in order. Relative paths are under `data_dir`.
    pub snapshots: Vec<PathBuf>,

    /// Fixed subject for recurring agendas, subject prefix for dated ones.
    pub subject: Option<String>,
}

impl AgendaConfig {
    pub fn subject(&self) -> &str {
        match (&self.subject, self.sync_type) {
            (Some(subject), _) => subject,
            (None, SyncType::Recurring) => "Teaching",
            (None, SyncType::Dated) => "Private:",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "RetryConfig::default_attempts")]
    pub attempts: u32,

    #[serde(default = "RetryConfig::default_backoff", with = "humantime_serde")]
    pub backoff: Duration,
}

impl RetryConfig {
    fn default_attempts() -> u32 {
        RetryPolicy::default().attempts
    }

    fn default_backoff() -> Duration {
        RetryPolicy::default().backoff
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempts: Self::default_attempts(),
            backoff: Self::default_backoff(),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy {
            attempts: config.attempts,
            backoff: config.backoff,
        }
    }
}

impl AgendasyncConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(shellexpand::tilde(&path).into_owned()));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("agendasync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config file, creating a commented default on first use.
    pub fn load() -> SyncResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> SyncResult<Self> {
        let config: AgendasyncConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("AGENDASYNC").separator("__"))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        config.tz()?;
        for (name, agenda) in &config.agendas {
            if agenda.snapshots.is_empty() {
                return Err(SyncError::Config(format!(
                    "Agenda '{name}' has no snapshot files"
                )));
            }
        }

        Ok(config)
    }

    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_path().join("state")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_path().join("reports")
    }

    pub fn tz(&self) -> SyncResult<Tz> {
        self.timezone
            .parse()
            .map_err(|_| SyncError::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    pub fn agenda(&self, name: &str) -> SyncResult<&AgendaConfig> {
        self.agendas
            .get(name)
            .ok_or_else(|| SyncError::AgendaNotFound(name.to_string()))
    }

    pub fn agenda_names(&self) -> impl Iterator<Item = &str> {
        self.agendas.keys().map(String::as_str)
    }

    /// Snapshot files of an agenda, expanded and anchored at `data_dir`.
    pub fn snapshot_paths(&self, agenda: &AgendaConfig) -> Vec<PathBuf> {
        let data_path = self.data_path();
        agenda
            .snapshots
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned()))
            .map(|p| if p.is_absolute() { p } else { data_path.join(p) })
            .collect()
    }

    pub fn roster(&self) -> Roster {
        Roster::new(self.roster.clone())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# agendasync configuration

# Where state files and run reports are kept:
# data_dir = \"{DEFAULT_DATA_DIR}\"

# Calendar provider (binary agendasync-provider-<name> in PATH):
# provider = \"{DEFAULT_PROVIDER}\"

# Time zone of all schedules:
# timezone = \"{DEFAULT_TIMEZONE}\"

# provider_timeout = \"30s\"

# [retry]
# attempts = 3
# backoff = \"500ms\"

# [agendas.method]
# sync_type = \"recurring\"
# snapshots = [\"snapshots/school_a.json\", \"snapshots/school_b.json\"]
# subject = \"Teaching\"

# [agendas.private]
# sync_type = \"dated\"
# snapshots = [\"snapshots/private.json\"]
# subject = \"Private:\"

# [roster]
# \"Anna SMITH\" = \"anna.smith@school.ch\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
