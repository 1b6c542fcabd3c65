//! Bulk re-read of a snapshot's memory into its read groups.
//!
//! Collection is the only writer of read group buffers. Groups are fetched
//! in parallel; a group whose read fails keeps its previous values but is
//! marked unread, so its regions sit out relative scans until the next
//! successful collection.

use crate::core::{MemoryAccess, ProcessContext};
use crate::snapshot::Snapshot;
use crate::task::TaskContext;
use anyhow::{Result, anyhow};
use log::{Level, debug, log_enabled};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

const PROGRESS_INTERVAL: usize = 32;

/// Read every read group of `snapshot` from target memory, rotating each
/// group's current bytes into its previous slot. Fails only on cancellation;
/// individual unreadable groups are skipped and logged.
pub fn collect_values(
    memory: &dyn MemoryAccess,
    process: &ProcessContext,
    snapshot: &Snapshot,
    task: &TaskContext,
) -> Result<()> {
    let groups = snapshot.read_groups();
    let total = groups.len().max(1);
    let completed = AtomicUsize::new(0);

    groups.par_iter().try_for_each(|group| -> Result<()> {
        task.checkpoint()?;

        let (base, size) = {
            let guard = group.read().map_err(|_| anyhow!("read group lock poisoned"))?;
            (guard.base(), guard.size())
        };

        let mut bytes = vec![0u8; size];
        let outcome = memory.read(process, base, &mut bytes);
        let mut guard = group.write().map_err(|_| anyhow!("read group lock poisoned"))?;
        match outcome {
            Ok(()) => guard.update(bytes),
            Err(e) => {
                if log_enabled!(Level::Debug) {
                    debug!("read group at {:#X} ({} bytes) unreadable: {}", base, size, e);
                }
                guard.mark_unread();
            },
        }
        drop(guard);

        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_INTERVAL == 0 {
            task.set_progress((done * 100 / total) as u32);
            task.tick_heartbeat();
        }
        Ok(())
    })?;

    task.set_progress(100);
    task.tick_heartbeat();
    Ok(())
}
