//! Runs sync-engine futures from FUSE threads.
//!
//! Kernel callbacks only read the published snapshot. Loading the account and
//! stopping the poll task are async, so they go through one lazily built
//! runtime that also hosts the poll task while the filesystem is mounted.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};

static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();

/// Drive `future` to completion on the shared runtime, building the runtime
/// on first use.
///
/// Must not be called from inside another tokio runtime's async context.
pub fn block_on<F, T>(future: F) -> Result<T, FuseError>
where
    F: Future<Output = T>,
{
    let runtime = RUNTIME
        .get_or_init(|| {
            Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("drivefs-sync")
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| FuseError::Runtime(e.clone()))?;
    Ok(runtime.block_on(future))
}

#[derive(Debug, thiserror::Error)]
pub enum FuseError {
    #[error("cannot start sync runtime: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_builds_runtime() {
        assert_eq!(block_on(async { 40 + 2 }).unwrap(), 42);
    }

    #[test]
    fn test_spawned_tasks_run_on_sync_workers() {
        let name = block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_string) })
                .await
                .unwrap()
        })
        .unwrap();
        assert_eq!(name.as_deref(), Some("drivefs-sync"));
        assert!(matches!(RUNTIME.get(), Some(Ok(_))));
    }
}
