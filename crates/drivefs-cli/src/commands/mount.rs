//! Mount command for the drivefs FUSE filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use drivefs_config::DriveFsConfig;
use drivefs_fuse::DriveFs;
use drivefs_remote::{SyncEngine, SyncSettings};

use crate::session::demo_remote;

/// Mount arguments.
pub struct MountArgs {
    /// Mount point path.
    pub mountpoint: PathBuf,
    /// Allow other users to access the mount.
    pub allow_other: bool,
    /// Mount the built-in sample account.
    pub demo: bool,
}

/// Run the mount command. Returns once the filesystem is unmounted.
pub async fn run(
    mut config: DriveFsConfig,
    args: MountArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    // Ensure mount point exists
    if !args.mountpoint.exists() {
        std::fs::create_dir_all(&args.mountpoint)?;
    }
    if args.allow_other {
        config.mount.allow_other = true;
    }

    let mountpoint = args.mountpoint;
    let result = if args.demo {
        let engine = Arc::new(
            SyncEngine::initial_load(
                Arc::new(demo_remote()),
                SyncSettings::from(&config.sync),
            )
            .await?,
        );
        engine.start().await;
        let fs = DriveFs::from_engine(engine, &config.mount);
        // The FUSE session loop blocks its thread until unmount
        tokio::task::spawn_blocking(move || fs.mount(&mountpoint).map_err(|e| e.to_string()))
            .await?
    } else {
        tokio::task::spawn_blocking(move || {
            let fs = DriveFs::from_config(config).map_err(|e| e.to_string())?;
            fs.mount(&mountpoint).map_err(|e| e.to_string())
        })
        .await?
    };

    result.map_err(Into::into)
}
