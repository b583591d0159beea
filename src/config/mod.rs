use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search/metadata provider settings
    pub search: SearchConfig,

    /// Downloader and converter settings
    pub audio: AudioConfig,

    /// Storage gateway settings
    pub storage: StorageConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// API key for the video search provider; without one the acquisition
    /// pipeline is effectively disabled
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target audio format (container/codec extension)
    pub format: String,

    /// Downloader command override; either a token list or a single
    /// whitespace-split string
    pub command: Option<CommandSpec>,

    /// Wall-clock limit for the download process
    pub download_timeout_secs: u64,

    /// Wall-clock limit for the conversion process
    pub convert_timeout_secs: u64,
}

/// External command specified either as explicit tokens or as one string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Tokens(Vec<String>),
    Line(String),
}

impl CommandSpec {
    pub fn tokens(&self) -> Vec<String> {
        match self {
            CommandSpec::Tokens(tokens) => tokens.clone(),
            CommandSpec::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which gateway implementation to use
    pub backend: StorageBackend,

    /// Root directory for the local backend (platform data dir if unset)
    pub local_root: Option<PathBuf>,

    /// S3 backend settings
    pub s3: S3Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for per-invocation working files (system temp dir if unset)
    pub work_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig { api_key: None },
            audio: AudioConfig {
                format: "m4a".to_string(),
                command: None,
                download_timeout_secs: 90,
                convert_timeout_secs: 300,
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_root: None,
                s3: S3Config {
                    region: "us-east-1".to_string(),
                    bucket: String::new(),
                    key_prefix: Some("songfetch/".to_string()),
                },
            },
            app: AppConfig { work_dir: None },
        }
    }
}

impl AudioConfig {
    /// Resolved downloader command tokens; the default wrapper script is
    /// OS-dependent (a batch file on Windows, a shell script elsewhere).
    pub fn downloader_command(&self) -> Vec<String> {
        match &self.command {
            Some(spec) => spec.tokens(),
            None if cfg!(windows) => vec!["yt.bat".to_string()],
            None => vec!["bash".to_string(), "yt.sh".to_string()],
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("songfetch").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::S3 && self.storage.s3.bucket.is_empty() {
            anyhow::bail!("S3 bucket must be configured for the s3 storage backend");
        }

        if self.audio.format.is_empty() {
            anyhow::bail!("Audio format must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  API Key: {}",
            if self.search.api_key.is_some() { "configured" } else { "not set" }
        );
        println!("  Audio Format: {}", self.audio.format);
        println!("  Downloader: {}", self.audio.downloader_command().join(" "));
        println!("  Download Timeout: {}s", self.audio.download_timeout_secs);
        match self.storage.backend {
            StorageBackend::Local => {
                println!("  Storage: local");
                if let Some(root) = &self.storage.local_root {
                    println!("  Storage Root: {}", root.display());
                }
            }
            StorageBackend::S3 => {
                println!("  Storage: s3://{}", self.storage.s3.bucket);
                if let Some(prefix) = &self.storage.s3.key_prefix {
                    println!("  S3 Prefix: {}", prefix);
                }
            }
        }
    }
}
