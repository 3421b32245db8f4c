use crate::types::{
    DriveFsConfig, HumanDuration, DEFAULT_ATTR_TTL, DEFAULT_FS_NAME, DEFAULT_FULL_REFRESH_EVERY,
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL,
    DEFAULT_RETRY_BACKOFF,
};

impl DriveFsConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        // 1. Credentials file derived from the account email
        if self.account.credentials_file.is_none() {
            self.account.credentials_file =
                Some(derive_credentials_file(self.account.email.as_deref()));
        }

        // 2. Sync timings
        let sync = &mut self.sync;
        sync.poll_interval
            .get_or_insert_with(|| HumanDuration(DEFAULT_POLL_INTERVAL));
        sync.page_size.get_or_insert(DEFAULT_PAGE_SIZE);
        sync.max_retries.get_or_insert(DEFAULT_MAX_RETRIES);
        sync.retry_backoff
            .get_or_insert_with(|| HumanDuration(DEFAULT_RETRY_BACKOFF));
        sync.full_refresh_every.get_or_insert(DEFAULT_FULL_REFRESH_EVERY);

        // 3. Mount presentation
        if self.mount.fs_name.is_none() {
            self.mount.fs_name = Some(DEFAULT_FS_NAME.to_string());
        }
        self.mount
            .attr_ttl
            .get_or_insert_with(|| HumanDuration(DEFAULT_ATTR_TTL));

        // 4. Logging
        if self.logging.level.is_none() {
            self.logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> DriveFsConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}

/// Derive the credentials file name from the account email.
/// `someone@example.com` -> "drivefs-someone_at_example.com.json"
fn derive_credentials_file(email: Option<&str>) -> String {
    match email {
        Some(email) if !email.trim().is_empty() => {
            let sanitized: String = email
                .trim()
                .replace('@', "_at_")
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("drivefs-{}.json", sanitized)
        }
        _ => "drivefs-credentials.json".to_string(),
    }
}
