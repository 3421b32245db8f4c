use crate::types::{DriveFsConfig, MAX_PAGE_SIZE};
use crate::ConfigError;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl DriveFsConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Some(page_size) = self.sync.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                errors.push(ConfigError::InvalidValue(
                    "sync.page_size".to_string(),
                    format!("must be between 1 and {}, got {}", MAX_PAGE_SIZE, page_size),
                ));
            }
        }

        if let Some(ref interval) = self.sync.poll_interval {
            if interval.as_duration().is_zero() {
                errors.push(ConfigError::InvalidValue(
                    "sync.poll_interval".to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        if let Some(ref mountpoint) = self.mount.mountpoint {
            if mountpoint.trim().is_empty() {
                errors.push(ConfigError::InvalidValue(
                    "mount.mountpoint".to_string(),
                    "must not be empty".to_string(),
                ));
            }
        }

        if let Some(ref fs_name) = self.mount.fs_name {
            if fs_name.is_empty() || fs_name.contains(',') {
                errors.push(ConfigError::InvalidValue(
                    "mount.fs_name".to_string(),
                    "must be non-empty and must not contain ','".to_string(),
                ));
            }
        }

        // OAuth client credentials only make sense as a pair
        match (&self.account.client_id, &self.account.client_secret) {
            (Some(_), None) => errors.push(ConfigError::InvalidConfig(
                "account.client_id is set but account.client_secret is missing".to_string(),
            )),
            (None, Some(_)) => errors.push(ConfigError::InvalidConfig(
                "account.client_secret is set but account.client_id is missing".to_string(),
            )),
            _ => {}
        }

        if let Some(ref level) = self.logging.level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                errors.push(ConfigError::InvalidValue(
                    "logging.level".to_string(),
                    format!("unknown level '{}', expected one of {:?}", level, LOG_LEVELS),
                ));
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HumanDuration;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = DriveFsConfig::default();
        assert!(config.validate().is_empty());
        assert!(config.effective().validate().is_empty());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = DriveFsConfig::default();
        config.sync.page_size = Some(0);
        assert!(matches!(
            config.validate_or_err(),
            Err(ConfigError::InvalidValue(field, _)) if field == "sync.page_size"
        ));

        config.sync.page_size = Some(MAX_PAGE_SIZE + 1);
        assert_eq!(config.validate().len(), 1);

        config.sync.page_size = Some(MAX_PAGE_SIZE);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = DriveFsConfig::default();
        config.sync.poll_interval = Some(HumanDuration(Duration::ZERO));
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_client_credentials_must_be_paired() {
        let mut config = DriveFsConfig::default();
        config.account.client_id = Some("id".to_string());
        assert!(config
            .validate()
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidConfig(_))));

        config.account.client_secret = Some("secret".to_string());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_unknown_log_level() {
        let mut config = DriveFsConfig::default();
        config.logging.level = Some("chatty".to_string());
        assert_eq!(config.validate().len(), 1);

        config.logging.level = Some("DEBUG".to_string());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = DriveFsConfig::default();
        config.sync.page_size = Some(0);
        config.mount.fs_name = Some("a,b".to_string());
        config.logging.level = Some("loud".to_string());
        assert_eq!(config.validate().len(), 3);
    }
}
