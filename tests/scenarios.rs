//! Black-box concurrency scenarios exercising the file system end to
//! end.
//!
//! These only touch the public surface (`Tfs::init`/`open`/`read`/
//! `write`/`close`/`destroy*`), the way a real caller would.

use std::sync::Arc;
use std::thread;

use rand::Rng;

use tfs::config::BLOCK_SIZE;
use tfs::error::Error;
use tfs::{OpenFlags, Tfs};

fn init_logging() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Scenario 1: write then read back, then EOF.
#[test]
fn write_read_eof_roundtrip() {
    init_logging();
    let fs = Tfs::init().unwrap();

    let h = fs.open("/a", OpenFlags::CREATE).unwrap();
    let n = fs.write(h, b"hello").unwrap();
    assert_eq!(n, 5);
    fs.close(h).unwrap();

    let h = fs.open("/a", OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(h, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    assert_eq!(fs.read(h, &mut buf).unwrap(), 0);
    fs.close(h).unwrap();

    fs.destroy().unwrap();
}

/// Scenario 2: truncate invalidates another handle's offset.
#[test]
fn truncate_invalidates_other_handle() {
    init_logging();
    let fs = Tfs::init().unwrap();

    let old = fs.open("/a", OpenFlags::CREATE).unwrap();
    fs.write(old, b"x").unwrap();

    let new = fs.open("/a", OpenFlags::TRUNC).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(fs.read(old, &mut buf).unwrap_err(), Error::StaleCursor);

    fs.close(old).unwrap();
    fs.close(new).unwrap();
    fs.destroy().unwrap();
}

/// Scenario 3: a reader parked mid-file sees the truncate too.
#[test]
fn truncate_invalidates_reader_mid_file() {
    init_logging();
    let fs = Tfs::init().unwrap();

    let payload = vec![b'z'; 10];
    let w = fs.open("/a", OpenFlags::CREATE).unwrap();
    fs.write(w, &payload).unwrap();
    fs.close(w).unwrap();

    let reader = fs.open("/a", OpenFlags::empty()).unwrap();
    let mut one = [0u8; 1];
    assert_eq!(fs.read(reader, &mut one).unwrap(), 1);
    assert_eq!(one[0], b'z');

    let trunc = fs.open("/a", OpenFlags::TRUNC).unwrap();
    fs.close(trunc).unwrap();

    let mut rest = vec![0u8; payload.len() - 1];
    assert_eq!(
        fs.read(reader, &mut rest).unwrap_err(),
        Error::StaleCursor
    );

    fs.close(reader).unwrap();
    fs.destroy().unwrap();
}

/// Scenario 4: per-thread files, spanning direct and indirect blocks.
#[test]
fn per_thread_files_span_indirect_blocks() {
    init_logging();
    let fs = Arc::new(Tfs::init().unwrap());
    let thread_count = 20u8;
    let rounds = 100;
    let chunk = BLOCK_SIZE + 1;
    let chunks_per_round = 30;

    let mut joins = Vec::new();
    for id in 0..thread_count {
        let fs = Arc::clone(&fs);
        joins.push(thread::spawn(move || {
            let path = format!("/{}", (b'0' + id) as char);
            let payload = vec![id; chunk];
            for _ in 0..rounds {
                let h = fs
                    .open(&path, OpenFlags::CREATE | OpenFlags::TRUNC)
                    .unwrap();
                for _ in 0..chunks_per_round {
                    assert_eq!(fs.write(h, &payload).unwrap(), chunk);
                }
                fs.close(h).unwrap();

                let h = fs.open(&path, OpenFlags::empty()).unwrap();
                let mut buf = vec![0u8; chunk];
                for _ in 0..chunks_per_round {
                    assert_eq!(fs.read(h, &mut buf).unwrap(), chunk);
                    assert!(buf.iter().all(|&b| b == id));
                }
                fs.close(h).unwrap();
            }
        }));
    }
    for j in joins {
        j.join().unwrap();
    }

    Arc::try_unwrap(fs).unwrap().destroy().unwrap();
}

/// Scenario 5: many threads append-writing through one shared handle;
/// each 200-byte region must stay monochromatic even though the
/// regions' relative order is unspecified.
#[test]
fn shared_handle_concurrent_append_is_non_overlapping() {
    init_logging();
    let fs = Arc::new(Tfs::init().unwrap());
    fs.open("/f", OpenFlags::CREATE)
        .map(|h| fs.close(h))
        .unwrap()
        .unwrap();
    let handle = fs.open("/f", OpenFlags::APPEND).unwrap();

    let writer_count = 100usize;
    let region = 200usize;

    let mut joins = Vec::new();
    for id in 0..writer_count {
        let fs = Arc::clone(&fs);
        joins.push(thread::spawn(move || {
            let byte = (id % 256) as u8;
            let payload = vec![byte; region];
            assert_eq!(fs.write(handle, &payload).unwrap(), region);
        }));
    }
    for j in joins {
        j.join().unwrap();
    }

    let mut all = vec![0u8; writer_count * region];
    let reader = fs.open("/f", OpenFlags::empty()).unwrap();
    assert_eq!(fs.read(reader, &mut all).unwrap(), all.len());
    fs.close(reader).unwrap();

    for region_bytes in all.chunks(region) {
        assert!(
            region_bytes.iter().all(|&b| b == region_bytes[0]),
            "each 200-byte region must be monochromatic"
        );
    }

    fs.close(handle).unwrap();
    Arc::try_unwrap(fs).unwrap().destroy().unwrap();
}

/// Scenario 6: destroy_after_all_closed returns only after every
/// close has completed.
#[test]
fn destroy_barrier_waits_for_every_close() {
    init_logging();
    let fs = Arc::new(Tfs::init().unwrap());
    let n = 16;

    let mut handles = Vec::new();
    for i in 0..n {
        let path = format!("/h{i}");
        let h = fs.open(&path, OpenFlags::CREATE).unwrap();
        handles.push(h);
    }

    let mut joins = Vec::new();
    for h in handles {
        let fs = Arc::clone(&fs);
        joins.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            thread::sleep(std::time::Duration::from_millis(rng.gen_range(0..20)));
            fs.close(h).unwrap();
        }));
    }

    let barrier_fs = Arc::clone(&fs);
    let barrier = thread::spawn(move || {
        barrier_fs.wait_until_all_closed().unwrap();
    });

    for j in joins {
        j.join().unwrap();
    }
    barrier.join().unwrap();

    Arc::try_unwrap(fs).unwrap().destroy().unwrap();
}
