pub mod auth;
pub mod config;
pub mod find;
pub mod ls;
#[cfg(feature = "fuse")]
pub mod mount;
#[cfg(not(feature = "fuse"))]
pub mod mount {
    use std::path::PathBuf;

    use drivefs_config::DriveFsConfig;

    /// Mount arguments.
    #[allow(dead_code)]
    pub struct MountArgs {
        /// Mount point path.
        pub mountpoint: PathBuf,
        /// Allow other users to access the mount.
        pub allow_other: bool,
        /// Mount the built-in sample account.
        pub demo: bool,
    }

    /// Run the mount command when FUSE support is disabled.
    pub async fn run(
        _config: DriveFsConfig,
        _args: MountArgs,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Err("FUSE support is disabled in this build. Rebuild drivefs-cli with --features fuse.".into())
    }
}
pub mod stat;
pub mod status;
pub mod tree;
