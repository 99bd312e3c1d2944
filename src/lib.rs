//! Size-rotated logfile engine.
//!
//! A [`Roller`] appends to a single "current" logfile. When a write
//! would push the file past the configured size, it is renamed to an
//! archive name carrying the rotation's UNIX second and a fresh file is
//! started under the original name. A background sweeper gzips rotated
//! files and deletes the oldest archives once the configured total
//! budget is spent. A [`ReplayReader`] streams the full surviving
//! history (archives oldest first, decompressed, then the current
//! file) as one contiguous byte stream, tolerating a live writer
//! rotating underneath it.
//!
//! Exactly one process may write to a given base path; running two
//! writers against the same path will clobber files.

pub mod clock;
mod compress;
mod error;
mod layout;
mod replay;
mod roller;
mod sweep;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use layout::{EntryKind, LogLayout};
pub use replay::ReplayReader;
pub use roller::{FormatFn, Roller, RollerConfig, MEGABYTE};
