use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::{Error, Result};

/// Compress a rotated logfile into its `.gz` archive.
///
/// The source is removed only after the gzip stream is finished and the
/// output synced; on failure the partial `.gz` is removed and the source
/// is left in place for the next pass.
pub(crate) fn compress_archive(src: &Path, dst: &Path) -> Result<()> {
    match write_gzip(src, dst) {
        Ok(()) => {
            std::fs::remove_file(src)?;
            Ok(())
        }
        Err(err) => {
            let _ = std::fs::remove_file(dst);
            Err(Error::Io(err))
        }
    }
}

fn write_gzip(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;

    // An existing destination is presumed to be a partial file from an
    // earlier attempt; truncate and redo it.
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let output = options.open(dst)?;

    let mut encoder = GzEncoder::new(&output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    output.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    #[test]
    fn compresses_and_removes_source() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("app-1500000000.log");
        let dst = dir.path().join("app-1500000000.log.gz");
        std::fs::write(&src, b"hello archive").expect("write source");

        compress_archive(&src, &dst).expect("compress");

        assert!(!src.exists());
        let mut decoder = GzDecoder::new(File::open(&dst).expect("open gz"));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).expect("decompress");
        assert_eq!(out, b"hello archive");
    }

    #[test]
    fn overwrites_partial_destination() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("app-1500000000.log");
        let dst = dir.path().join("app-1500000000.log.gz");
        std::fs::write(&src, b"payload").expect("write source");
        std::fs::write(&dst, b"truncated junk").expect("write partial");

        compress_archive(&src, &dst).expect("compress");

        let mut decoder = GzDecoder::new(File::open(&dst).expect("open gz"));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).expect("decompress");
        assert_eq!(out, b"payload");
    }

    #[test]
    fn missing_source_leaves_no_partial_output() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("app-1500000000.log");
        let dst = dir.path().join("app-1500000000.log.gz");

        assert!(compress_archive(&src, &dst).is_err());
        assert!(!dst.exists());
    }
}
