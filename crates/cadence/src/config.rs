//! # Kernel Configuration
//!
//! Loaded once at session start, from TOML or built in code.
//!
//! ```toml
//! crc_interval = 50
//! random_seed = 1234
//! desync_policy = "tolerant"
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::Path;

use cadence_core::{WorldSettings, DEFAULT_ID_TABLE_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::desync::{DesyncPolicy, StrictPolicy, TolerantPolicy};
use crate::error::{SessionError, SessionResult};

/// Which built-in desync policy a session uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesyncPolicyKind {
    /// Any mismatch ends the session.
    #[default]
    Strict,
    /// Mismatches are reported and logged, and the session continues.
    Tolerant,
}

impl DesyncPolicyKind {
    /// Builds the policy.
    #[must_use]
    pub fn build(self) -> Box<dyn DesyncPolicy> {
        match self {
            Self::Strict => Box::new(StrictPolicy),
            Self::Tolerant => Box::new(TolerantPolicy),
        }
    }
}

/// Session parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Checksum cadence in frames. 0 disables checksumming.
    pub crc_interval: u64,
    /// Local checksums retained for late remote comparisons.
    pub crc_history: usize,
    /// Seed of the logic random stream.
    pub random_seed: u64,
    /// Initial size of the id lookup table.
    pub id_table_capacity: usize,
    /// Check the heap invariant after every drain.
    pub validate_scheduler: bool,
    /// Sweeps removing more than `len / ratio` heap entries rebuild the heap.
    pub batch_rebuild_ratio: u32,
    /// What a checksum mismatch does to the session.
    pub desync_policy: DesyncPolicyKind,
    /// This peer's slot in the session.
    pub local_peer: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            crc_interval: 100,
            crc_history: 64,
            random_seed: 0,
            id_table_capacity: DEFAULT_ID_TABLE_CAPACITY,
            validate_scheduler: cfg!(debug_assertions),
            batch_rebuild_ratio: 2,
            desync_policy: DesyncPolicyKind::Strict,
            local_peer: 0,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] on syntax errors, unknown values or
    /// inconsistent settings.
    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file cannot be read, otherwise as
    /// [`KernelConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks settings that are individually valid but useless together.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] describing the first problem.
    pub fn validate(&self) -> SessionResult<()> {
        if self.crc_interval > 0 && self.crc_history == 0 {
            return Err(SessionError::Config(
                "crc_history must be at least 1 when crc_interval is set".to_owned(),
            ));
        }
        if self.id_table_capacity == 0 {
            return Err(SessionError::Config("id_table_capacity must be positive".to_owned()));
        }
        Ok(())
    }

    /// Returns the construction parameters of the session's world.
    #[must_use]
    pub const fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            id_table_capacity: self.id_table_capacity,
            random_seed: self.random_seed,
            batch_rebuild_ratio: self.batch_rebuild_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.crc_interval, 100);
        assert_eq!(config.crc_history, 64);
        assert_eq!(config.id_table_capacity, 8192);
        assert_eq!(config.batch_rebuild_ratio, 2);
        assert_eq!(config.desync_policy, DesyncPolicyKind::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = KernelConfig::from_toml_str(
            r#"
            crc_interval = 25
            random_seed = 99
            desync_policy = "tolerant"
            "#,
        )
        .unwrap();

        assert_eq!(config.crc_interval, 25);
        assert_eq!(config.random_seed, 99);
        assert_eq!(config.desync_policy, DesyncPolicyKind::Tolerant);
        assert_eq!(config.crc_history, 64);
        assert_eq!(config.world_settings().random_seed, 99);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = KernelConfig::from_toml_str(r#"desync_policy = "lenient""#);
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_checksums_need_history() {
        let result = KernelConfig::from_toml_str("crc_history = 0");
        assert!(matches!(result, Err(SessionError::Config(_))));

        let disabled = KernelConfig::from_toml_str("crc_interval = 0\ncrc_history = 0");
        assert!(disabled.is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = KernelConfig::from_file("/nonexistent/cadence.toml");
        assert!(matches!(result, Err(SessionError::Io(_))));
    }
}
