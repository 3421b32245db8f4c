//! Loading the account into a sync engine for one CLI invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use drivefs_config::DriveFsConfig;
use drivefs_remote::{DriveClient, MemoryRemote, SyncEngine, SyncSettings, TokenStore};

/// Apply defaults and make the credentials path absolute.
///
/// A relative `credentials_file` lives under `~/.config/drivefs/`.
pub fn prepare(config: DriveFsConfig) -> DriveFsConfig {
    let mut config = config.effective();
    if let Some(file) = config.account.credentials_file.take() {
        config.account.credentials_file = Some(
            credentials_path(&file, dirs_next::config_dir().as_deref())
                .to_string_lossy()
                .into_owned(),
        );
    }
    config
}

fn credentials_path(file: &str, config_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(file);
    match config_dir {
        Some(dir) if path.is_relative() => dir.join("drivefs").join(path),
        _ => path,
    }
}

/// Token store for the configured account.
pub async fn tokens(config: &DriveFsConfig) -> Result<TokenStore, Box<dyn std::error::Error>> {
    let path = config
        .account
        .credentials_file
        .as_deref()
        .ok_or("account.credentials_file is not set")?;
    let store = TokenStore::load(
        path,
        config.account.client_id.clone(),
        config.account.client_secret.clone(),
    )
    .await?;
    Ok(store)
}

/// Fetch the account and return an engine holding the first snapshot.
pub async fn open(
    config: &DriveFsConfig,
    demo: bool,
) -> Result<SyncEngine, Box<dyn std::error::Error>> {
    let settings = SyncSettings::from(&config.sync);

    if demo {
        let engine = SyncEngine::initial_load(Arc::new(demo_remote()), settings).await?;
        return Ok(engine);
    }

    let tokens = tokens(config).await?;
    if !tokens.is_authorized().await {
        return Err(format!(
            "No credentials in {}. Run `drivefs auth` first",
            tokens.path().display()
        )
        .into());
    }
    let client = DriveClient::from_config(config, Arc::new(tokens))?;
    let engine = SyncEngine::initial_load(Arc::new(client), settings).await?;
    Ok(engine)
}

/// A small account with a hard link, a name containing the separator, a
/// trashed file and an orphan.
pub fn demo_remote() -> MemoryRemote {
    let remote = MemoryRemote::new("root");
    remote.put_folder("f-docs", "Documents", &["root"]);
    remote.put_folder("f-photos", "Photos", &["root"]);
    remote.put_folder("f-2024", "2024", &["f-photos"]);
    remote.put_file("d-plan", "Q1/Q2 plan.txt", &["f-docs"], 2_310);
    remote.put_file("d-notes", "notes.md", &["f-docs"], 512);
    remote.put_file("d-shared", "budget.xlsx", &["root", "f-docs"], 48_000);
    remote.put_file("p-beach", "beach.jpg", &["f-2024"], 3_145_728);
    remote.put_file("p-old", "old.jpg", &["f-2024"], 1_024);
    remote.trash("p-old");
    remote.put_file("x-orphan", "lost.txt", &["f-missing"], 10);
    remote
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_path_relative() {
        let dir = Path::new("/home/me/.config");
        assert_eq!(
            credentials_path("drivefs-me.json", Some(dir)),
            PathBuf::from("/home/me/.config/drivefs/drivefs-me.json")
        );
    }

    #[test]
    fn test_credentials_path_absolute() {
        let dir = Path::new("/home/me/.config");
        assert_eq!(
            credentials_path("/tmp/creds.json", Some(dir)),
            PathBuf::from("/tmp/creds.json")
        );
        assert_eq!(credentials_path("creds.json", None), PathBuf::from("creds.json"));
    }

    #[test]
    fn test_prepare_applies_defaults() {
        let config = prepare(DriveFsConfig::default());
        assert!(config.account.credentials_file.is_some());
        assert_eq!(config.sync.page_size, Some(1000));
        assert_eq!(config.logging.level(), "info");
    }

    #[tokio::test]
    async fn test_demo_account_loads() {
        let engine = open(&prepare(DriveFsConfig::default()), true).await.unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.lookup("/Documents/Q1%2FQ2 plan.txt").unwrap().id(), "d-plan");
        assert_eq!(snap.canonical_path("d-shared"), Some("/budget.xlsx"));
        assert!(snap.lookup("/Photos/2024/old.jpg").is_err());
        assert!(snap.canonical_path("x-orphan").is_none());
    }
}
