//! Configuration model for the diskcipher framework.

use crate::error::{ConfigError, DiskcipherResult};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/diskcipher.toml";
const CONFIG_PATH_ENV: &str = "DISKCIPHER_CONFIG";

/// Longest algorithm name the registry accepts, terminator included.
pub const CRYPTO_MAX_ALG_NAME: usize = 128;
pub const DEFAULT_DISK_SUFFIX: &str = "-disk";
pub const DEFAULT_DATA_UNIT_SIZE: u32 = 4096;
const SECTOR_SIZE: u32 = 512;

/// Algorithm naming rules applied by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NamingCfg {
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    #[serde(default = "default_disk_suffix")]
    pub disk_suffix: String,
}

fn default_max_name_len() -> usize {
    CRYPTO_MAX_ALG_NAME
}

fn default_disk_suffix() -> String {
    DEFAULT_DISK_SUFFIX.to_string()
}

impl Default for NamingCfg {
    fn default() -> Self {
        Self {
            max_name_len: default_max_name_len(),
            disk_suffix: default_disk_suffix(),
        }
    }
}

/// IV policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IvCfg {
    /// Filesystem types that number data units sequentially (DUN IV mode).
    #[serde(default = "default_dun_filesystems")]
    pub dun_filesystems: Vec<String>,

    /// Bytes covered by one DUN step.
    #[serde(default = "default_data_unit_size")]
    pub data_unit_size: u32,
}

fn default_dun_filesystems() -> Vec<String> {
    vec!["f2fs".to_string()]
}

fn default_data_unit_size() -> u32 {
    DEFAULT_DATA_UNIT_SIZE
}

impl Default for IvCfg {
    fn default() -> Self {
        Self {
            dun_filesystems: default_dun_filesystems(),
            data_unit_size: default_data_unit_size(),
        }
    }
}

/// Hardware dispatch knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DispatchCfg {
    /// Tell the engine the host controller runs in command-queue mode.
    #[serde(default)]
    pub cmdq_enabled: bool,
}

/// Diagnostics counters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticsCfg {
    #[serde(default = "default_diagnostics_enabled")]
    pub enabled: bool,
}

fn default_diagnostics_enabled() -> bool {
    true
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        Self {
            enabled: default_diagnostics_enabled(),
        }
    }
}

/// Top-level configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DiskcipherConfig {
    #[serde(default)]
    pub naming: NamingCfg,

    #[serde(default)]
    pub iv: IvCfg,

    #[serde(default)]
    pub dispatch: DispatchCfg,

    #[serde(default)]
    pub diagnostics: DiagnosticsCfg,

    #[serde(skip)]
    pub path: PathBuf,

    #[serde(skip)]
    pub format: ConfigFormat,
}

/// Tracks whether we parsed TOML or YAML so writes preserve format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Yaml,
}

impl DiskcipherConfig {
    /// Configuration path, honouring `DISKCIPHER_CONFIG` when set.
    pub fn default_path() -> PathBuf {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Load from `path` when it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> DiskcipherResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        debug!(
            "diskcipher config missing at {}; using defaults",
            path.display()
        );
        Ok(Self::default())
    }

    /// Read a config file, detect its format, and reject unusable values.
    pub fn load<P: AsRef<Path>>(path: P) -> DiskcipherResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_toml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("toml")
        );
        let mut cfg = if is_toml {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        cfg.path = path.to_path_buf();
        cfg.format = if is_toml {
            ConfigFormat::Toml
        } else {
            ConfigFormat::Yaml
        };

        let issues = cfg.validate();
        if !issues.is_empty() {
            for issue in &issues {
                warn!("{}: {issue}", path.display());
            }
            return Err(ConfigError::Invalid(issues.join("; ")).into());
        }

        Ok(cfg)
    }

    /// Return human-readable problems with this configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.naming.max_name_len == 0 {
            issues.push("naming.max_name_len must be greater than 0".to_string());
        }
        if self.naming.disk_suffix.is_empty() {
            issues.push("naming.disk_suffix must not be empty".to_string());
        } else if self.naming.disk_suffix.len() >= self.naming.max_name_len {
            issues.push("naming.disk_suffix must be shorter than naming.max_name_len".to_string());
        }

        let unit = self.iv.data_unit_size;
        if unit < SECTOR_SIZE || !unit.is_power_of_two() {
            issues.push(format!(
                "iv.data_unit_size must be a power of two >= {SECTOR_SIZE} bytes, got {unit}"
            ));
        }
        if self
            .iv
            .dun_filesystems
            .iter()
            .any(|name| name.trim().is_empty())
        {
            issues.push("iv.dun_filesystems contains an empty entry".to_string());
        }

        issues
    }

    /// True when `fs_type` numbers data units sequentially.
    pub fn is_dun_filesystem(&self, fs_type: &str) -> bool {
        self.iv.dun_filesystems.iter().any(|name| name == fs_type)
    }

    /// `log2` of the data-unit size.
    pub fn data_unit_shift(&self) -> u32 {
        self.iv.data_unit_size.trailing_zeros()
    }

    /// Persist the configuration back to its on-disk format.
    pub fn save(&self) -> DiskcipherResult<()> {
        let payload = match self.format {
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        };
        fs::write(&self.path, payload)?;
        Ok(())
    }

    /// JSON schema describing the configuration file.
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DiskcipherConfig)
    }
}
