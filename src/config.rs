//! Orchestrator Configuration
//!
//! Defines the single configuration context passed into every phase:
//! - Network endpoint (URL, chain id, request timeout, gas cap)
//! - Per-phase confirmation timeouts
//! - Retry policy for transient failures
//! - Sender credential source
//! - Artifact locations

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Complete orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Network endpoint
    pub network: NetworkConfig,
    /// Confirmation timeouts per phase
    pub timeouts: TimeoutConfig,
    /// Retry policy for deployment and wiring calls
    pub retry: RetryPolicy,
    /// Wiring phase behaviour
    pub wiring: WiringConfig,
    /// Sender credential source
    pub sender: SenderConfig,
    /// Artifact locations
    pub artifacts: ArtifactConfig,
}

/// Network endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    pub url: String,
    /// Expected chain id, also used for EIP-155 signing
    pub chain_id: u64,
    /// Timeout of a single HTTP request
    pub request_timeout_ms: u64,
    /// Upper bound for any transaction gas limit
    pub gas_limit: u64,
    /// Interval between receipt polls
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: "https://rpc.blaze.soniclabs.com".to_string(),
            chain_id: 57054,
            request_timeout_ms: 60_000,
            gas_limit: 3_000_000,
            poll_interval_ms: 1_000,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Confirmation timeouts, per phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deployment and wiring transactions
    pub deployment_secs: u64,
    /// Verification transactions
    pub verification_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            deployment_secs: 180,
            verification_secs: 120,
        }
    }
}

impl TimeoutConfig {
    pub fn deployment(&self) -> Duration {
        Duration::from_secs(self.deployment_secs)
    }

    pub fn verification(&self) -> Duration {
        Duration::from_secs(self.verification_secs)
    }
}

/// Wiring phase configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// How many times the whole phase is re-entered after a network failure.
    /// Bindings already applied are skipped on re-entry.
    pub phase_attempts: u32,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self { phase_attempts: 2 }
    }
}

/// Where the sender's private key comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Environment variable holding a hex private key
    pub key_env: String,
    /// File holding a hex private key, used when the variable is unset
    pub key_file: Option<PathBuf>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            key_env: "PRIVATE_KEY".to_string(),
            key_file: None,
        }
    }
}

impl SenderConfig {
    /// Resolve the credential. Absence is fatal for any state-changing command.
    pub fn resolve_key(&self) -> OrchestratorResult<String> {
        if let Ok(key) = std::env::var(&self.key_env) {
            if !key.trim().is_empty() {
                debug!(source = %self.key_env, "sender key resolved from environment");
                return Ok(key.trim().to_string());
            }
        }

        if let Some(path) = &self.key_file {
            let key = std::fs::read_to_string(path).map_err(|e| {
                OrchestratorError::Configuration(format!(
                    "failed to read sender key file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if !key.trim().is_empty() {
                debug!(source = %path.display(), "sender key resolved from file");
                return Ok(key.trim().to_string());
            }
        }

        Err(OrchestratorError::Configuration(format!(
            "no sender credential: set {} or sender.key_file",
            self.key_env
        )))
    }
}

/// Artifact locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Compiled contracts (`<dir>/<Name>.sol/<Name>.json`)
    pub contracts_dir: PathBuf,
    /// Output directory for addresses, interfaces and reports
    pub output_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            contracts_dir: PathBuf::from("artifacts/contracts"),
            output_dir: PathBuf::from("deployments"),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(contents: &str) -> OrchestratorResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        if !path.exists() {
            info!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.network.url.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "network.url must not be empty".to_string(),
            ));
        }
        if self.network.chain_id == 0 {
            return Err(OrchestratorError::Configuration(
                "network.chain_id must be non-zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(OrchestratorError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeouts.deployment_secs == 0 || self.timeouts.verification_secs == 0 {
            return Err(OrchestratorError::Configuration(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
