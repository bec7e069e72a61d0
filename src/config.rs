//! Configuration management for panemux.
//!
//! Supports layered configuration: defaults → project → user → env

use crate::error::ConfigError;
use crate::services::PollSchedule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub launch: LaunchConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            launch: LaunchConfig::default(),
        }
    }
}

impl CompositorConfig {
    /// Load configuration with hierarchy: defaults → project → user → env
    pub fn load(project_root: Option<&PathBuf>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            config::File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Project-specific config (.panemux.toml in project root)
        if let Some(root) = project_root {
            let project_config = root.join(".panemux.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }
        }

        // 3. User config (~/.config/panemux/config.toml)
        if let Some(config_dir) = directories::ProjectDirs::from("com", "panemux", "panemux") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        // 4. Environment variables (PANEMUX_*)
        builder = builder.add_source(
            Environment::with_prefix("PANEMUX")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration with default settings only
    pub fn load_defaults() -> Self {
        Self::default()
    }
}

/// Deadlines and poll pacing for the compositor's wait loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long a worker retries attaching to a table that is not there yet
    #[serde(default = "default_attach_deadline_ms")]
    pub attach_deadline_ms: u64,
    /// How long the coordinator waits for one pane to publish
    #[serde(default = "default_ready_deadline_ms")]
    pub ready_deadline_ms: u64,
    /// How long the coordinator waits for workers to exit after TERMINATE
    #[serde(default = "default_exit_deadline_ms")]
    pub exit_deadline_ms: u64,
    /// First poll interval; later intervals double up to the cap
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,
    /// Poll interval cap
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            attach_deadline_ms: default_attach_deadline_ms(),
            ready_deadline_ms: default_ready_deadline_ms(),
            exit_deadline_ms: default_exit_deadline_ms(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
        }
    }
}

impl TimingConfig {
    /// Poll pacing for a worker's attach loop
    pub fn attach_schedule(&self) -> PollSchedule {
        self.schedule(self.attach_deadline_ms)
    }

    /// Poll pacing for the coordinator's per-pane readiness wait
    pub fn ready_schedule(&self) -> PollSchedule {
        self.schedule(self.ready_deadline_ms)
    }

    /// Poll pacing for the coordinator's exit wait
    pub fn exit_schedule(&self) -> PollSchedule {
        self.schedule(self.exit_deadline_ms)
    }

    fn schedule(&self, deadline_ms: u64) -> PollSchedule {
        PollSchedule::new(
            Duration::from_millis(deadline_ms),
            Duration::from_millis(self.poll_initial_ms),
            Duration::from_millis(self.poll_max_ms),
        )
    }
}

fn default_attach_deadline_ms() -> u64 {
    5000
}

fn default_ready_deadline_ms() -> u64 {
    10_000
}

fn default_exit_deadline_ms() -> u64 {
    5000
}

fn default_poll_initial_ms() -> u64 {
    20
}

fn default_poll_max_ms() -> u64 {
    250
}

/// Worker launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Program to invoke in pane role; defaults to the current executable
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
    /// Give workers the coordinator's stdout, where dialog results print
    #[serde(default = "default_inherit_stdout")]
    pub inherit_stdout: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            worker_program: None,
            inherit_stdout: default_inherit_stdout(),
        }
    }
}

fn default_inherit_stdout() -> bool {
    true
}
