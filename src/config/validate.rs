// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskloomError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskloomError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.scheduler, raw.search))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.scheduler.max_attempts == 0 {
        return Err(TaskloomError::ConfigError(
            "[scheduler].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.scheduler.worker_deadline_secs == 0 {
        return Err(TaskloomError::ConfigError(
            "[scheduler].worker_deadline_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.scheduler.dispatch_buffer == 0 {
        return Err(TaskloomError::ConfigError(
            "[scheduler].dispatch_buffer must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.search.enabled && cfg.search.max_results == 0 {
        return Err(TaskloomError::ConfigError(
            "[search].max_results must be >= 1 when search is enabled".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let raw = RawConfigFile::default();
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.scheduler.max_attempts, 3);
        assert!(!cfg.search.enabled);
    }

    #[test]
    fn zero_attempts_rejected() {
        let raw: RawConfigFile = toml::from_str("[scheduler]\nmax_attempts = 0\n").unwrap();
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn policy_parses_from_toml() {
        let raw: RawConfigFile =
            toml::from_str("[scheduler]\nabandoned_branches = \"count\"\n").unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(
            cfg.scheduler.abandoned_branches,
            crate::types::AbandonedBranchPolicy::Count
        );
    }
}
