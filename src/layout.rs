use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

pub const COMPRESS_SUFFIX: &str = ".gz";

// Ten decimal digits of UNIX seconds, good through the year 2286. The
// encoder and the decoder's length check must move together if this is
// ever widened.
const TIMESTAMP_LEN: usize = 10;

/// Naming scheme tying a logfile to its rotated archives.
///
/// For a base path `/var/log/app.log`, a rotation at UNIX second `t`
/// renames the file to `/var/log/app-<t>.log` and compression turns that
/// into `/var/log/app-<t>.log.gz`. The base path decomposes into a
/// directory (with trailing separator, possibly empty), a stem, and the
/// final dot-extension of the basename (possibly empty); the three parts
/// concatenate back to the base path.
#[derive(Debug, Clone)]
pub struct LogLayout {
    dir: String,
    stem: String,
    ext: String,
}

/// What a directory entry means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A finished `.gz` archive.
    Archive(i64),
    /// An uncompressed rotation whose `.gz` successor is still being
    /// produced (or owed).
    Compressing(i64),
    /// Not one of ours.
    Other,
}

impl LogLayout {
    pub fn new(path: &Path) -> Result<Self> {
        // Normalize away `.` components and doubled separators so the
        // reconstruction check in `parse` compares canonical strings.
        let cleaned: PathBuf = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let full = cleaned
            .to_str()
            .ok_or(Error::Config("log path must be valid UTF-8"))?;

        let (dir, base) = match full.rfind('/') {
            Some(idx) => (&full[..idx + 1], &full[idx + 1..]),
            None => ("", full),
        };
        let (stem, ext) = match base.rfind('.') {
            Some(idx) => (&base[..idx], &base[idx..]),
            None => (base, ""),
        };

        Ok(Self {
            dir: dir.to_string(),
            stem: stem.to_string(),
            ext: ext.to_string(),
        })
    }

    /// The cleaned base path: `dir + stem + ext`.
    pub fn base_path(&self) -> String {
        format!("{}{}{}", self.dir, self.stem, self.ext)
    }

    /// The directory to list when scanning for archives.
    pub fn scan_dir(&self) -> &str {
        if self.dir.is_empty() {
            "."
        } else {
            &self.dir
        }
    }

    /// Name of the uncompressed rotation for timestamp `ts`, the rename
    /// target during rotation and the compression source afterwards.
    pub fn rotated_path(&self, ts: i64) -> String {
        format!("{}{}-{}{}", self.dir, self.stem, ts, self.ext)
    }

    /// Canonical archive name for timestamp `ts`.
    pub fn archive_path(&self, ts: i64) -> String {
        format!("{}{}-{}{}{}", self.dir, self.stem, ts, self.ext, COMPRESS_SUFFIX)
    }

    /// Recover the timestamp from a full archive path.
    ///
    /// Succeeds only when the candidate has exactly the right length,
    /// carries `-` plus ten digits in the middle, and re-encoding the
    /// parsed timestamp reproduces the candidate. The last check rejects
    /// same-length lookalikes from a different stem.
    pub fn parse(&self, candidate: &str) -> Option<i64> {
        let expected = self.dir.len()
            + self.stem.len()
            + 1
            + TIMESTAMP_LEN
            + self.ext.len()
            + COMPRESS_SUFFIX.len();
        if candidate.len() != expected {
            return None;
        }

        let start = self.dir.len() + self.stem.len();
        let end = candidate.len() - self.ext.len() - COMPRESS_SUFFIX.len();
        let middle = candidate.get(start..end)?;

        let digits = middle.strip_prefix('-')?;
        let ts = parse_timestamp(digits)?;

        if candidate != self.archive_path(ts) {
            return None;
        }
        Some(ts)
    }

    /// Classify a bare entry name from `scan_dir`.
    ///
    /// The in-flight check runs first: an entry whose name plus `.gz`
    /// encodes a timestamp is an uncompressed rotation, whether or not
    /// its `.gz` twin exists yet.
    pub fn classify(&self, name: &str) -> EntryKind {
        let full = format!("{}{}", self.dir, name);
        if let Some(ts) = self.parse(&format!("{full}{COMPRESS_SUFFIX}")) {
            return EntryKind::Compressing(ts);
        }
        if let Some(ts) = self.parse(&full) {
            return EntryKind::Archive(ts);
        }
        EntryKind::Other
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if s.len() != TIMESTAMP_LEN {
        return None;
    }
    s.parse::<i64>().ok().filter(|ts| *ts >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_500_000_000;

    fn layout(path: &str) -> LogLayout {
        LogLayout::new(Path::new(path)).expect("layout")
    }

    #[test]
    fn decomposition_grid() {
        // (input, dir, stem, ext)
        let cases = [
            ("foo.log", "", "foo", ".log"),
            ("./foo.log", "", "foo", ".log"),
            ("tmp/foo.log", "tmp/", "foo", ".log"),
            ("./tmp/foo.log", "tmp/", "foo", ".log"),
            ("/path/to/foo.log", "/path/to/", "foo", ".log"),
            ("foolog", "", "foolog", ""),
            ("tmp/foolog", "tmp/", "foolog", ""),
            ("/path/to/foolog", "/path/to/", "foolog", ""),
            ("foo.bar.log", "", "foo.bar", ".log"),
            ("tmp/foo.bar.log", "tmp/", "foo.bar", ".log"),
            ("/path/to/foo.bar.log", "/path/to/", "foo.bar", ".log"),
            ("foo-bar.baz.log", "", "foo-bar.baz", ".log"),
            ("tmp/foo-bar.baz.log", "tmp/", "foo-bar.baz", ".log"),
            ("/path/to/foo-bar.baz.log", "/path/to/", "foo-bar.baz", ".log"),
        ];

        for (input, dir, stem, ext) in cases {
            let layout = layout(input);
            assert_eq!(layout.dir, dir, "dir of {input}");
            assert_eq!(layout.stem, stem, "stem of {input}");
            assert_eq!(layout.ext, ext, "ext of {input}");
            assert_eq!(
                layout.base_path(),
                format!("{dir}{stem}{ext}"),
                "reassembly of {input}"
            );

            let archive = layout.archive_path(TS);
            assert_eq!(archive, format!("{dir}{stem}-{TS}{ext}.gz"));
            assert_eq!(layout.parse(&archive), Some(TS), "round trip of {input}");
        }
    }

    #[test]
    fn parse_rejects_lookalikes() {
        let layout = layout("/var/log/myfoo/foo.log");

        assert_eq!(
            layout.parse("/var/log/myfoo/foo-1399214673.log.gz"),
            Some(1_399_214_673)
        );
        // Same length, different stem.
        assert_eq!(layout.parse("/var/log/myfoo/boo-1399214673.log.gz"), None);
        // Missing suffix, missing extension, missing stem, bare name.
        assert_eq!(layout.parse("/var/log/myfoo/foo-1399214673.log"), None);
        assert_eq!(layout.parse("/var/log/myfoo/foo-1399214673"), None);
        assert_eq!(layout.parse("/var/log/myfoo/1399214673.log"), None);
        assert_eq!(layout.parse("/var/log/myfoo/foo.log"), None);
        // Nine and eleven digit timestamps.
        assert_eq!(layout.parse("/var/log/myfoo/foo-139921467.log.gz"), None);
        assert_eq!(layout.parse("/var/log/myfoo/foo-13992146733.log.gz"), None);
        // Non-digit filler of the right length.
        assert_eq!(layout.parse("/var/log/myfoo/foo-139921467x.log.gz"), None);
    }

    #[test]
    fn classify_distinguishes_inflight_from_finished() {
        let layout = layout("tmp/foo.log");

        assert_eq!(
            layout.classify("foo-1500000000.log.gz"),
            EntryKind::Archive(TS)
        );
        assert_eq!(
            layout.classify("foo-1500000000.log"),
            EntryKind::Compressing(TS)
        );
        assert_eq!(layout.classify("foo.log"), EntryKind::Other);
        assert_eq!(layout.classify("bar-1500000000.log.gz"), EntryKind::Other);
        assert_eq!(layout.classify("foo-1500000000.txt.gz"), EntryKind::Other);
    }

    #[test]
    fn multibyte_candidate_does_not_split_chars() {
        let layout = layout("tmp/foo.log");
        // Same byte length as a valid archive name, multibyte filler.
        assert_eq!(layout.parse("tmp/foo-é50000000.log.gz"), None);
    }
}
