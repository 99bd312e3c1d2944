use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::layout::LogLayout;
use crate::sweep::Sweeper;
use crate::{Error, Result};

/// Bytes per configured megabyte.
pub const MEGABYTE: u64 = 1024 * 1024;

/// Formats a message before it is written, typically to prepend a
/// timestamp. The function appends the full payload (prefix plus
/// message) into the cleared reusable buffer and returns the byte
/// offset at which the message begins, so short writes can be reported
/// in message bytes rather than payload bytes.
pub type FormatFn = Box<dyn FnMut(&[u8], &mut Vec<u8>) -> usize + Send>;

/// Configuration for a [`Roller`].
pub struct RollerConfig {
    /// Path to the logfile. Archives live in the same directory.
    pub path: PathBuf,
    /// Size of the logfile before it gets rotated, in megabytes.
    pub max_log_mb: u64,
    /// Total size of the logfile plus compressed archives, in
    /// megabytes. Must exceed `max_log_mb`; the difference is the
    /// archive budget. Approximate: during a rotation window the total
    /// may briefly reach `max_log_mb` past the budget.
    pub max_total_mb: u64,
    /// Optional message formatter.
    pub format: Option<FormatFn>,
    /// Bytes per configured megabyte. Tests shrink this so rotations
    /// trigger without writing mebibytes to disk.
    pub megabyte: u64,
    /// Timestamp source for archive names.
    pub clock: Arc<dyn Clock>,
}

impl RollerConfig {
    pub fn new(path: impl Into<PathBuf>, max_log_mb: u64, max_total_mb: u64) -> Self {
        Self {
            path: path.into(),
            max_log_mb,
            max_total_mb,
            format: None,
            megabyte: MEGABYTE,
            clock: Arc::new(SystemClock),
        }
    }
}

/// A writer to a size-rotated logfile.
///
/// The logfile is opened or created on first write. When a write would
/// push it past the configured size, the file is closed, renamed to an
/// archive name carrying the current UNIX second, and a fresh file is
/// started under the original name; a background sweeper then
/// compresses the rotation and evicts the oldest archives past the
/// budget. Exactly one process may write to a given path.
pub struct Roller {
    path: PathBuf,
    layout: LogLayout,
    max_bytes: u64,
    clock: Arc<dyn Clock>,
    format: Option<FormatFn>,
    fmtbuf: Vec<u8>,
    file: Option<File>,
    size: u64,
    sweeper: Sweeper,
}

impl Roller {
    /// Validate the configuration and start the background sweeper.
    /// Does not touch the filesystem.
    pub fn new(config: RollerConfig) -> Result<Self> {
        if config.max_log_mb == 0 {
            return Err(Error::Config("max_log_mb must be positive"));
        }
        if config.max_total_mb <= config.max_log_mb {
            return Err(Error::Config("max_total_mb must exceed max_log_mb"));
        }

        let layout = LogLayout::new(&config.path)?;
        let path = PathBuf::from(layout.base_path());
        let budget_bytes = (config.max_total_mb - config.max_log_mb) * config.megabyte;
        let sweeper = Sweeper::spawn(layout.clone(), budget_bytes);

        Ok(Self {
            path,
            layout,
            max_bytes: config.max_log_mb * config.megabyte,
            clock: config.clock,
            format: config.format,
            fmtbuf: Vec::new(),
            file: None,
            size: 0,
            sweeper,
        })
    }

    /// Append a message, rotating first if it would not fit.
    ///
    /// Returns the number of *input* bytes consumed: with a formatter
    /// configured, prefix bytes written do not count toward the return
    /// value.
    pub fn append(&mut self, p: &[u8]) -> Result<usize> {
        let write_len = p.len() as u64;

        if self.file.is_none() {
            self.open_existing_or_new(write_len)?;
        } else if self.size + write_len > self.max_bytes {
            self.rotate()?;
        }

        let msg_idx = match self.format.as_mut() {
            Some(format) => {
                self.fmtbuf.clear();
                Some(format(p, &mut self.fmtbuf))
            }
            None => None,
        };
        let payload: &[u8] = match msg_idx {
            Some(_) => &self.fmtbuf,
            None => p,
        };

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "logfile is not open",
                )))
            }
        };
        let n = file.write(payload)?;
        self.size += n as u64;

        Ok(match msg_idx {
            Some(idx) => {
                if n < idx {
                    0
                } else if n - idx > p.len() {
                    p.len()
                } else {
                    n - idx
                }
            }
            None => n,
        })
    }

    /// Flush the current logfile, if open.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Close the current logfile and stop the sweeper. Queued sweeps
    /// run to completion before this returns. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let result = self.close_file();
        self.sweeper.stop();
        result
    }

    /// Force the current logfile into an archive, then close.
    pub fn rotate_close(&mut self) -> Result<()> {
        // Archive names carry whole seconds; never rotate within the
        // same second as an earlier rotation or the rename would
        // clobber its archive.
        thread::sleep(Duration::from_secs(1));
        let rotated = self.rotate();
        let closed = self.close();
        rotated.and(closed)
    }

    /// Stop the background sweeper after it drains outstanding work.
    /// Idempotent; the current logfile stays open.
    pub fn stop_sweeper(&mut self) {
        self.sweeper.stop();
    }

    /// Close the current file, move it aside under an archive name if
    /// it exists, start a fresh file, and wake the sweeper.
    fn rotate(&mut self) -> Result<()> {
        self.close_file()?;
        self.open_new()?;
        self.sweeper.signal();
        Ok(())
    }

    fn close_file(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn open_new(&mut self) -> Result<()> {
        if std::fs::metadata(&self.path).is_ok() {
            let rotated = self.layout.rotated_path(self.clock.now_unix());
            std::fs::rename(&self.path, rotated)?;
        }

        // Truncate rather than append: the file was just renamed away by
        // us, so anything that reappears under the base name in the
        // meantime is not ours to keep.
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        self.file = Some(options.open(&self.path)?);
        self.size = 0;
        Ok(())
    }

    /// First-write open policy: append to an existing file when the
    /// write fits, rotate first when it does not, create otherwise.
    fn open_existing_or_new(&mut self, write_len: u64) -> Result<()> {
        // A previous run may have left an uncompressed rotation behind.
        self.sweeper.signal();

        let info = match std::fs::metadata(&self.path) {
            Ok(info) => info,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return self.open_new(),
            Err(err) => return Err(err.into()),
        };

        if info.len() + write_len >= self.max_bytes {
            return self.rotate();
        }

        let file = match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => file,
            // If the existing file cannot be appended to, give up on it
            // and start fresh.
            Err(_) => return self.open_new(),
        };
        self.file = Some(file);
        self.size = info.len();
        Ok(())
    }
}

impl io::Write for Roller {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Roller::flush(self).map_err(Into::into)
    }
}
