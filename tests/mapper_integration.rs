use std::io;
use std::sync::{Arc, Mutex};

use oxisync::map::{ByteSource, MapError, MapEvent, MapLimits, WindowMapper};

/// Call log shared between a source and the test.
#[derive(Debug, Default)]
struct Calls {
    reads: Vec<(u64, usize)>,
    seeks: Vec<u64>,
}

/// Deterministic source of `len` bytes that records every call.
struct CountingSource {
    len: u64,
    pos: u64,
    seekable: bool,
    calls: Arc<Mutex<Calls>>,
}

impl CountingSource {
    fn new(len: u64, seekable: bool) -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let src = Self {
            len,
            pos: 0,
            seekable,
            calls: Arc::clone(&calls),
        };
        (src, calls)
    }
}

fn byte_at(i: u64) -> u8 {
    (i.wrapping_mul(2_654_435_761) >> 13) as u8
}

fn expected(offset: u64, len: usize) -> Vec<u8> {
    (offset..offset + len as u64).map(byte_at).collect()
}

impl ByteSource for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (buf.len() as u64).min(self.len.saturating_sub(self.pos)) as usize;
        for (i, b) in buf[..n].iter_mut().enumerate() {
            *b = byte_at(self.pos + i as u64);
        }
        self.calls.lock().unwrap().reads.push((self.pos, n));
        self.pos += n as u64;
        Ok(n)
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if !self.seekable {
            return Err(io::ErrorKind::Unsupported.into());
        }
        self.calls.lock().unwrap().seeks.push(offset);
        self.pos = offset;
        Ok(())
    }
}

#[test]
fn short_source_then_cached_view() {
    let (src, calls) = CountingSource::new(50, false);
    let mut map = WindowMapper::new(src);

    let w = map.map(0, 100).unwrap();
    assert_eq!(w.len(), 50);
    assert!(w.eof);
    assert_eq!(w.data, &expected(0, 50)[..]);
    let reads = calls.lock().unwrap().reads.len();

    let w = map.map(0, 50).unwrap();
    assert_eq!(w.len(), 50);
    assert_eq!(w.data, &expected(0, 50)[..]);
    assert_eq!(calls.lock().unwrap().reads.len(), reads);
}

#[test]
fn overlapping_windows_are_not_reread() {
    let (src, calls) = CountingSource::new(4 << 20, false);
    let limits = MapLimits::new(32_768, 262_144).unwrap();
    let mut map = WindowMapper::with_limits(src, limits);

    let w = map.map(0, 200_000).unwrap();
    assert_eq!(w.data, &expected(0, 200_000)[..]);
    let first_reads = calls.lock().unwrap().reads.len();

    let w = map.map(150_000, 200_000).unwrap();
    assert_eq!(w.len(), 200_000);
    assert_eq!(w.data, &expected(150_000, 200_000)[..]);

    let calls = calls.lock().unwrap();
    // Everything read by the second request lies past the first window.
    for &(at, _) in &calls.reads[first_reads..] {
        assert!(at >= 262_144, "re-read at {at}");
    }
    assert!(calls.seeks.is_empty());
    assert_eq!(map.stats().bytes_reused, 262_144 - 65_536);
}

#[test]
fn sliding_scan_reads_each_byte_once() {
    let total = 3 << 20;
    let (src, calls) = CountingSource::new(total, false);
    let mut map = WindowMapper::new(src);

    let mut offset = 0u64;
    loop {
        let w = map.map(offset, 40_000).unwrap();
        assert_eq!(w.data, &expected(offset, w.len())[..]);
        if w.eof {
            break;
        }
        // Slide forward by less than the view, like a rolling match.
        offset += 30_000;
    }

    let calls = calls.lock().unwrap();
    let bytes: u64 = calls.reads.iter().map(|&(_, n)| n as u64).sum();
    assert_eq!(bytes, total);
    let mut next = 0;
    for &(at, n) in &calls.reads {
        assert_eq!(at, next);
        next += n as u64;
    }
}

#[test]
fn seek_only_when_cursor_differs() {
    let (src, calls) = CountingSource::new(8 << 20, true);
    let mut map = WindowMapper::new(src);

    map.map(0, 10).unwrap();
    map.map(1 << 20, 10).unwrap();
    map.map((1 << 20) + 262_144, 10).unwrap();
    map.map(5 << 20, 10).unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.seeks, vec![(1 << 20) - 65_536, (5 << 20) - 65_536]);
}

#[test]
fn non_seekable_jump_fails_cleanly() {
    let (src, _) = CountingSource::new(8 << 20, false);
    let mut map = WindowMapper::new(src);
    map.map(0, 10).unwrap();
    match map.map(4 << 20, 10) {
        Err(MapError::Seek { offset, source }) => {
            assert_eq!(offset, (4 << 20) - 65_536);
            assert_eq!(source.kind(), io::ErrorKind::Unsupported);
        }
        other => panic!("expected seek error, got {other:?}"),
    }
}

#[test]
fn contract_violations() {
    let (src, _) = CountingSource::new(1 << 20, true);
    let mut map = WindowMapper::new(src);
    assert!(matches!(map.map(0, 0), Err(MapError::InvalidArgument(_))));
    assert!(matches!(
        map.map(u64::MAX, 2),
        Err(MapError::InvalidArgument(_))
    ));
    map.map(900_000, 10).unwrap();
    assert!(matches!(map.map(10, 10), Err(MapError::InvalidArgument(_))));
}

#[test]
fn event_sink_sees_reuse() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let (src, _) = CountingSource::new(1 << 20, false);
    let mut map = WindowMapper::new(src).with_events(move |ev: &MapEvent| {
        if let MapEvent::Refill { reused, .. } = *ev {
            sink.lock().unwrap().push(reused);
        }
    });

    map.map(0, 200_000).unwrap();
    map.map(150_000, 200_000).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![0, 262_144 - 65_536]);
}

#[test]
fn source_is_returned_unclosed() {
    let (src, calls) = CountingSource::new(100, false);
    let mut map = WindowMapper::new(src);
    map.map(0, 10).unwrap();
    let src = map.into_inner();
    assert_eq!(src.pos, 100);
    drop(src);
    assert!(!calls.lock().unwrap().reads.is_empty());
}
