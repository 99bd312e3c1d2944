#![allow(dead_code)]

use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use logroll::Clock;

/// A manually advanced clock so rotations land on known archive names
/// without real sleeps between them.
pub struct FakeClock(AtomicI64);

impl FakeClock {
    pub fn at(start: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(start)))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn now_unix(&self) -> i64 {
        self.now()
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

pub fn gunzip_file(path: &Path) -> Vec<u8> {
    let file = std::fs::File::open(path).expect("open archive");
    let mut decoder = GzDecoder::new(file);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).expect("decompress archive");
    out
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read dir").count()
}

/// Poll for a condition the background sweeper establishes, bounded so
/// a regression fails the test instead of hanging it.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..150 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("timed out waiting for {what}");
}
