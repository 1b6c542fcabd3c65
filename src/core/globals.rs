//! Process-wide runtime and platform constants.

use lazy_static::lazy_static;
use tokio::runtime::Runtime;

lazy_static! {
    /// Shared multi-thread runtime for async task coordination. CPU-heavy
    /// scan work runs inside `spawn_blocking` on top of rayon.
    pub static ref TOKIO_RUNTIME: Runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("procscan-task")
        .enable_all()
        .build()
        .unwrap_or_else(|e| panic!("failed to build tokio runtime: {e}"));

    pub static ref PAGE_SIZE: usize = {
        nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
            .ok()
            .flatten()
            .filter(|&size| size > 0)
            .map(|size| size as usize)
            .unwrap_or(4096)
    };

    pub static ref PAGE_MASK: usize = !(*PAGE_SIZE - 1);
}

/// Default read/scan chunk granularity in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;
