use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use flate2::read::GzDecoder;

use crate::layout::{EntryKind, LogLayout};
use crate::{Error, Result};

/// How long to wait before re-scanning while an archive is mid-compression.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const DEFAULT_OPEN_FILES_LIMIT: u64 = 1024;

/// A reader producing the full surviving history of a logfile: every
/// `.gz` archive, decompressed, oldest first, then the current file,
/// then EOF.
///
/// The reader tolerates a live writer rotating underneath it: archives
/// are classified by name alone, a mid-compression archive stalls the
/// stream until its `.gz` successor appears (so no bytes are skipped),
/// and a missing current file triggers a re-scan for the rotation that
/// just moved it. The number of concurrently open archives is bounded
/// by 75% of the process's soft open-files limit; with more archives
/// than that, only the newest are replayed.
pub struct ReplayReader {
    path: PathBuf,
    layout: LogLayout,
    /// Newest archive timestamp already chained.
    latest_ts: i64,
    /// Smallest timestamp currently seen mid-compression.
    unready_ts: Option<i64>,
    archives: Option<ArchiveChain>,
    current: Option<File>,
    done: bool,
}

/// Decompressed archive streams, oldest first. Each decoder owns its
/// file handle, so dropping the chain closes every archive.
struct ArchiveChain {
    readers: Vec<GzDecoder<File>>,
    index: usize,
}

impl ArchiveChain {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.index < self.readers.len() {
            let n = self.readers[self.index].read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.index += 1;
        }
        Ok(0)
    }
}

impl ReplayReader {
    /// Build a reader for the given logfile. Does not touch the
    /// filesystem until the first read.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let layout = LogLayout::new(path.as_ref())?;
        Ok(Self {
            path: PathBuf::from(layout.base_path()),
            layout,
            latest_ts: 0,
            unready_ts: None,
            archives: None,
            current: None,
            done: false,
        })
    }

    /// Drop every open archive and file handle. Subsequent reads
    /// return EOF. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.archives = None;
        self.current = None;
        self.done = true;
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_none() {
            // No chain on the very first read, and again right after a
            // chain is exhausted: both cases re-scan for archives that
            // appeared in the meantime.
            if self.archives.is_none() {
                self.load_archives()?;
            }

            if let Some(chain) = self.archives.as_mut() {
                match chain.read(buf) {
                    Ok(0) => {
                        self.archives = None;
                        continue;
                    }
                    Ok(n) => return Ok(n),
                    Err(err) => {
                        self.archives = None;
                        return Err(Error::Io(err));
                    }
                }
            }

            // Every ready archive is consumed, but an unready one means
            // a compression is mid-flight and its bytes come before the
            // current file. Wait for it rather than skip it.
            if self.unready_ts.is_some() {
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            match File::open(&self.path) {
                Ok(file) => self.current = Some(file),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    // The writer may have just renamed it; look for the
                    // archive instead.
                    self.load_archives()?;
                    if self.archives.is_some() {
                        continue;
                    }
                    if self.unready_ts.is_some() {
                        thread::sleep(POLL_INTERVAL);
                        continue;
                    }
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }

        let file = match self.current.as_mut() {
            Some(file) => file,
            None => return Ok(0),
        };
        let n = file.read(buf)?;
        if n == 0 {
            self.current = None;
            self.done = true;
        }
        Ok(n)
    }

    /// Scan the directory and chain every ready archive newer than the
    /// last one consumed.
    fn load_archives(&mut self) -> Result<()> {
        self.unready_ts = None;

        let mut ready: Vec<i64> = Vec::new();
        for entry in std::fs::read_dir(self.layout.scan_dir())? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            match self.layout.classify(&name) {
                EntryKind::Compressing(ts) => {
                    self.unready_ts = Some(self.unready_ts.map_or(ts, |cur| cur.min(ts)));
                }
                EntryKind::Archive(ts) if ts > self.latest_ts => ready.push(ts),
                _ => {}
            }
        }

        // Never chain past an in-flight compression; its bytes precede
        // everything rotated after it.
        if let Some(unready) = self.unready_ts {
            ready.retain(|&ts| ts < unready);
        }

        ready.sort_unstable_by(|a, b| b.cmp(a));
        ready.truncate(max_archive_lookback());

        if let Some(&newest) = ready.first() {
            self.latest_ts = newest;
        }

        // Open newest first: a NotFound means eviction beat us to an old
        // archive, and stopping there still leaves a contiguous newest
        // run. Reverse afterwards so the chain yields oldest first.
        let mut readers = Vec::with_capacity(ready.len());
        for &ts in &ready {
            let fpath = self.layout.archive_path(ts);
            let file = match File::open(&fpath) {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => break,
                Err(err) => return Err(err.into()),
            };
            readers.push(GzDecoder::new(file));
        }
        readers.reverse();

        if !readers.is_empty() {
            self.archives = Some(ArchiveChain { readers, index: 0 });
        }
        Ok(())
    }
}

impl Read for ReplayReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf).map_err(Into::into)
    }
}

/// Upper bound on concurrently open archives: 75% of the soft
/// open-files limit, so a replay can never starve the process of
/// descriptors.
fn max_archive_lookback() -> usize {
    (0.75 * open_files_limit() as f64) as usize
}

fn open_files_limit() -> u64 {
    #[cfg(unix)]
    {
        let mut rlimit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlimit) } == 0 {
            return rlimit.rlim_cur as u64;
        }
    }
    DEFAULT_OPEN_FILES_LIMIT
}
