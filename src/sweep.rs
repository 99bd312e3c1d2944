use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use log::{error, warn};

use crate::compress::compress_archive;
use crate::layout::{EntryKind, LogLayout};
use crate::Result;

/// Background maintenance for rotated logfiles: compresses fresh
/// rotations into `.gz` archives and deletes the oldest archives once
/// the configured budget is spent.
pub(crate) struct Sweeper {
    signal: Option<SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Capacity two: one wake-up being handled plus one queued covers
    /// every rotation, because a single pass sweeps the whole directory.
    pub(crate) fn spawn(layout: LogLayout, budget_bytes: u64) -> Self {
        let (signal, wakeups) = mpsc::sync_channel(2);
        let handle = thread::spawn(move || run(wakeups, layout, budget_bytes));
        Self {
            signal: Some(signal),
            handle: Some(handle),
        }
    }

    /// Non-blocking; a full queue means a pass is already owed.
    pub(crate) fn signal(&self) {
        if let Some(signal) = &self.signal {
            let _ = signal.try_send(());
        }
    }

    /// Close the wake-up channel and wait for the worker. Queued
    /// wake-ups are still delivered before the receiver disconnects, so
    /// outstanding work finishes before this returns. Idempotent.
    pub(crate) fn stop(&mut self) {
        drop(self.signal.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(wakeups: Receiver<()>, layout: LogLayout, budget_bytes: u64) {
    while wakeups.recv().is_ok() {
        // Rotations that clustered behind this wake-up are all covered
        // by the single pass below.
        while wakeups.try_recv().is_ok() {}
        if let Err(err) = sweep_once(&layout, budget_bytes) {
            error!("archive sweep failed: {err}");
        }
    }
}

/// One full maintenance pass: gzip every uncompressed rotation, then
/// walk the archives newest-first and delete everything past the budget.
pub(crate) fn sweep_once(layout: &LogLayout, budget_bytes: u64) -> Result<()> {
    let mut archives: BTreeMap<i64, u64> = BTreeMap::new();
    let mut pending: Vec<i64> = Vec::new();

    for entry in std::fs::read_dir(layout.scan_dir())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        match layout.classify(&name) {
            EntryKind::Archive(ts) => {
                archives.insert(ts, entry.metadata()?.len());
            }
            EntryKind::Compressing(ts) => pending.push(ts),
            EntryKind::Other => {}
        }
    }

    // Oldest first, so a replay blocked on the earliest unready archive
    // is released as soon as possible. A partial `.gz` left next to its
    // source by an interrupted pass is redone from scratch; the fresh
    // stat replaces the stale size.
    pending.sort_unstable();
    for ts in pending {
        let source = layout.rotated_path(ts);
        let dest = layout.archive_path(ts);
        compress_archive(Path::new(&source), Path::new(&dest))?;
        archives.insert(ts, std::fs::metadata(&dest)?.len());
    }

    let mut total = 0u64;
    for (&ts, &size) in archives.iter().rev() {
        total += size;
        if total > budget_bytes {
            let path = layout.archive_path(ts);
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("failed to evict archive {path}: {err}");
            }
        }
    }

    Ok(())
}
