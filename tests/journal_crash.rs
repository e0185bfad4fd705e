use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread::sleep;
use std::time::Duration;
use txnjrnl::{recover, Journal, Rid, Setting, TxnMarker};

const ROUNDS: usize = 5;

fn main() {
    let is_worker = std::env::var("TXNJRNL_TEST_WORKER").unwrap_or_default();
    if is_worker == "1" {
        return worker();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal");
    println!("test started on {:?}", dir.path());

    let myself = std::env::args().next().expect("missing first arg");

    let t = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let mut rng = StdRng::seed_from_u64(t);

    let mut last_count = 0;
    for round in 0..ROUNDS {
        println!("restarting journal writer round={round}");

        let mut child = Command::new(&myself)
            .arg(&path)
            .env("TXNJRNL_TEST_WORKER", "1")
            .spawn()
            .expect("command failed to start");

        let ms = rng.gen_range(50..1000);
        sleep(Duration::from_millis(ms));
        if child.try_wait().unwrap().is_none() {
            child.kill().expect("cannot kill child");
        }
        let status = child.wait().unwrap();
        assert!(
            status.code().unwrap_or_default() == 0,
            "writer failed: {status:?}"
        );

        let count = verify(&path);
        assert!(
            count >= last_count,
            "recovery lost flushed markers: {count} < {last_count}"
        );
        println!("recovered {count} markers");
        last_count = count;
    }
}

/// Every marker the writer appends is derived from its position, so whatever
/// survives a crash must be an exact prefix of that sequence.
fn verify(path: &Path) -> usize {
    let mut count = 0u64;
    let result = recover(path, Setting::default(), |marker: &TxnMarker| {
        assert_eq!(Rid::new(count + 1), marker.rid);
        assert_eq!(count % 3 != 0, marker.commit);
        assert_eq!(expected_xid(count), marker.xid);
        count += 1;
        Ok(())
    })
    .unwrap();
    assert_eq!(Rid::new(count + 1), result.next_rid);
    assert!(result.corrupted.is_empty());
    result.journal.shutdown().unwrap();
    count as usize
}

fn expected_xid(i: u64) -> Vec<u8> {
    // a few markers span several disk blocks
    let len = if i % 7 == 0 { 300 } else { 16 };
    format!("xid{i:08}")
        .into_bytes()
        .into_iter()
        .cycle()
        .take(len)
        .collect()
}

fn worker() {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap();
    let journal = Journal::open(&PathBuf::from(path), Setting::default()).unwrap();

    let mut i = journal.next_rid().get() - 1;
    loop {
        journal.append_txn(i % 3 != 0, &expected_xid(i)).unwrap();
        i += 1;
    }
}
