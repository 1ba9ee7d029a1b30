//! Islet configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IsletError, Result};
use crate::types::{InteractionEvent, Priority, PriorityDelayMode};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsletConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub host: HostConfig,
}

impl IsletConfig {
    /// Load config from the default path (~/.islet/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IsletError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| IsletError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| IsletError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot honour.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if !s.visible_threshold.is_finite() || !(0.0..=1.0).contains(&s.visible_threshold) {
            return Err(IsletError::Config(format!(
                "scheduler.visible_threshold must be within [0, 1], got {}",
                s.visible_threshold
            )));
        }
        if !s.visible_margin_px.is_finite() || s.visible_margin_px < 0.0 {
            return Err(IsletError::Config(format!(
                "scheduler.visible_margin_px must be non-negative, got {}",
                s.visible_margin_px
            )));
        }
        if s.interaction_events.is_empty() {
            return Err(IsletError::Config(
                "scheduler.interaction_events must name at least one event".into(),
            ));
        }
        if self.host.driver_tick_ms == 0 {
            return Err(IsletError::Config("host.driver_tick_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Islet home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".islet")
    }
}

/// Defaults applied to boundaries that do not configure their trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub default_priority: Priority,
    #[serde(default = "default_visible_threshold")]
    pub visible_threshold: f64,
    #[serde(default = "default_visible_margin")]
    pub visible_margin_px: f64,
    #[serde(default = "InteractionEvent::defaults")]
    pub interaction_events: Vec<InteractionEvent>,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
    #[serde(default)]
    pub priority_delay_mode: PriorityDelayMode,
    #[serde(default)]
    pub priority_delays: PriorityDelays,
}

fn default_visible_threshold() -> f64 { 0.1 }
fn default_visible_margin() -> f64 { 50.0 }
fn default_idle_timeout() -> u64 { 2000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_priority: Priority::default(),
            visible_threshold: default_visible_threshold(),
            visible_margin_px: default_visible_margin(),
            interaction_events: InteractionEvent::defaults(),
            idle_timeout_ms: default_idle_timeout(),
            priority_delay_mode: PriorityDelayMode::default(),
            priority_delays: PriorityDelays::default(),
        }
    }
}

/// Per-tier delay (ms) applied to `Immediate` boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityDelays {
    #[serde(default)]
    pub critical_ms: u64,
    #[serde(default = "default_high_delay")]
    pub high_ms: u64,
    #[serde(default = "default_normal_delay")]
    pub normal_ms: u64,
    #[serde(default = "default_low_delay")]
    pub low_ms: u64,
    #[serde(default)]
    pub manual_ms: u64,
}

fn default_high_delay() -> u64 { 50 }
fn default_normal_delay() -> u64 { 150 }
fn default_low_delay() -> u64 { 300 }

impl Default for PriorityDelays {
    fn default() -> Self {
        Self {
            critical_ms: 0,
            high_ms: default_high_delay(),
            normal_ms: default_normal_delay(),
            low_ms: default_low_delay(),
            manual_ms: 0,
        }
    }
}

impl PriorityDelays {
    pub fn for_priority(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Critical => self.critical_ms,
            Priority::High => self.high_ms,
            Priority::Normal => self.normal_ms,
            Priority::Low => self.low_ms,
            Priority::Manual => self.manual_ms,
        }
    }
}

/// Host environment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Whether the host offers an idle-time scheduling primitive.
    #[serde(default = "bool_true")]
    pub idle_supported: bool,
    /// Connectivity reported before the first change notification.
    #[serde(default = "bool_true")]
    pub start_online: bool,
    /// Real-time driver tick.
    #[serde(default = "default_driver_tick")]
    pub driver_tick_ms: u64,
}

fn bool_true() -> bool { true }
fn default_driver_tick() -> u64 { 16 }

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            idle_supported: true,
            start_online: true,
            driver_tick_ms: default_driver_tick(),
        }
    }
}
