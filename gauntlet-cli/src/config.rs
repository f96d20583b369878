//! Configuration loading from gauntlet.toml
//!
//! Configuration can be specified in a `gauntlet.toml` file, discovered
//! by walking up from the current directory. CLI flags override whatever
//! the file says.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which harness the executable under test implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// A language runtime invoked once per test file (default)
    #[default]
    Runtime,
    /// A type-checking service run against test fixtures
    Typechecker,
}

impl RunMode {
    /// The core-layer discovery mode for this harness kind.
    pub fn core(self) -> gauntlet_core::Mode {
        match self {
            RunMode::Runtime => gauntlet_core::Mode::Runtime,
            RunMode::Typechecker => gauntlet_core::Mode::Typechecker,
        }
    }
}

/// Gauntlet configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GauntletConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Runner configuration for test execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Timeout for a single test (e.g., "300s", "5m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Number of worker slots; defaults to the logical CPU count
    #[serde(default)]
    pub threads: Option<usize>,
    /// Route tests through long-lived server instances
    #[serde(default)]
    pub server: bool,
    /// Invocations per test against one persistent process
    #[serde(default)]
    pub repeat: u32,
    /// Harness kind: "runtime" or "typechecker"
    #[serde(default)]
    pub mode: RunMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            threads: None,
            server: false,
            repeat: 0,
            mode: RunMode::default(),
        }
    }
}

fn default_timeout() -> String {
    "300s".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON results artifact
    #[serde(default = "default_results_path")]
    pub results_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
        }
    }
}

fn default_results_path() -> String {
    "gauntlet-results.json".to_string()
}

impl GauntletConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from the
    /// current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("gauntlet.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Parse a duration string (e.g., "300s", "500ms", "5m")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;

        let multiplier: f64 = match unit_part.to_lowercase().as_str() {
            "ms" => 0.001,
            "s" | "" => 1.0,
            "m" | "min" => 60.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_secs_f64(value * multiplier))
    }
}
