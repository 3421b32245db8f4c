use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use drivefs_config::DriveFsConfig;
use log::LevelFilter;

mod commands;
mod session;

#[derive(Parser)]
#[command(name = "drivefs", version, about = "Read-only filesystem view of a remote drive")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve a built-in sample account instead of the configured one
    #[arg(long, global = true)]
    demo: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the account as a read-only filesystem
    Mount {
        /// Mount point (defaults to mount.mountpoint from the config)
        mountpoint: Option<PathBuf>,
        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },
    /// List directory contents
    Ls {
        /// Path to list (defaults to /)
        path: Option<String>,
    },
    /// Show file or directory metadata
    Stat {
        /// Path to inspect
        path: String,
    },
    /// Show directory tree
    Tree {
        /// Path to show tree for (defaults to /)
        path: Option<String>,
        /// Maximum depth to recurse
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Find files by name pattern (regex)
    Find {
        /// Regex pattern to match file names
        pattern: String,
        /// Path to search in (defaults to /)
        #[arg(short, long)]
        path: Option<String>,
        /// Filter by type: 'f' for files, 'd' for directories
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,
    },
    /// Show namespace and sync status
    Status,
    /// Authorize access to the account
    Auth {
        /// Authorization code from the consent page (prompted for if omitted)
        #[arg(long)]
        code: Option<String>,
    },
    /// Show effective configuration
    Config,
}

fn find_config() -> Option<PathBuf> {
    // 1. DRIVEFS_CONFIG environment variable
    if let Ok(path) = std::env::var("DRIVEFS_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. drivefs.yaml in current directory
    let cwd_config = PathBuf::from("drivefs.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. ~/.config/drivefs/config.yaml
    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/drivefs/config.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Log through `env_logger`; `RUST_LOG` wins over the config and `-v`.
fn init_logging(config_level: &str, verbose: u8) {
    let level = match verbose {
        0 => config_level.parse().unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str()),
    );
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Find and load config; demo mode runs on defaults
    let config_path = cli.config.or_else(find_config);
    let config = match (&config_path, cli.demo) {
        (Some(path), _) => DriveFsConfig::from_file(path)?,
        (None, true) => DriveFsConfig::default(),
        (None, false) => {
            return Err("No configuration file found. Use --config, set DRIVEFS_CONFIG, \
                        create drivefs.yaml, or pass --demo"
                .into())
        }
    };
    config.validate_or_err()?;
    let config = session::prepare(config);

    init_logging(config.logging.level(), cli.verbose);

    match cli.command {
        Commands::Mount {
            mountpoint,
            allow_other,
        } => {
            let mountpoint = mountpoint
                .or_else(|| config.mount.mountpoint.as_ref().map(PathBuf::from))
                .ok_or("No mount point given and mount.mountpoint is not set")?;
            let args = commands::mount::MountArgs {
                mountpoint,
                allow_other,
                demo: cli.demo,
            };
            commands::mount::run(config, args).await?;
        }
        Commands::Ls { path } => {
            let engine = session::open(&config, cli.demo).await?;
            commands::ls::run(&engine.snapshot(), path)?;
        }
        Commands::Stat { path } => {
            let engine = session::open(&config, cli.demo).await?;
            commands::stat::run(&engine.snapshot(), &path)?;
        }
        Commands::Tree { path, depth } => {
            let engine = session::open(&config, cli.demo).await?;
            commands::tree::run(&engine.snapshot(), path, depth)?;
        }
        Commands::Find {
            pattern,
            path,
            file_type,
        } => {
            let engine = session::open(&config, cli.demo).await?;
            commands::find::run(&engine.snapshot(), path, &pattern, file_type)?;
        }
        Commands::Status => {
            let engine = session::open(&config, cli.demo).await?;
            commands::status::run(&engine)?;
        }
        Commands::Auth { code } => {
            commands::auth::run(&config, code).await?;
        }
        Commands::Config => {
            commands::config::run(&config)?;
        }
    }

    Ok(())
}
