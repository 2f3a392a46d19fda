use std::fs;
use std::time::Duration;

use crossbeam_channel::{Sender, unbounded};
use hub_search::feed::{self, FeedSource};
use hub_search::ingest::ResultSink;
use hub_search::record::{ContentHash, RecordKind, SearchRecord, UserId};

struct Collector {
    tx: Sender<SearchRecord>,
}

impl ResultSink for Collector {
    fn on_result(&self, record: SearchRecord) {
        let _ = self.tx.send(record);
    }
}

fn file(path: &str, user: &str, hash_tag: u8) -> SearchRecord {
    SearchRecord {
        kind: RecordKind::File,
        hash: Some(ContentHash([hash_tag; 24])),
        size: 512,
        path: path.to_string(),
        free_slots: 1,
        total_slots: 4,
        user: UserId(user.to_string()),
        nick: user.to_string(),
        hub_name: "Nexus".to_string(),
        hub_url: "adc://nexus.example:412".to_string(),
        address: "192.168.1.20".to_string(),
        token: String::new(),
    }
}

#[test]
fn file_feed_delivers_records_and_skips_bad_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("results.jsonl");

    let good_a = serde_json::to_string(&file("a/one.bin", "alice", 1)).expect("encode");
    let good_b = serde_json::to_string(&file("b/two.bin", "bob", 2)).expect("encode");
    let contents = format!("{good_a}\nnot json at all\n\n{good_b}\n");
    fs::write(&path, contents).expect("write feed file");

    let (tx, rx) = unbounded();
    let handle = feed::spawn(FeedSource::File(path), Collector { tx }).expect("spawn feed");

    let first = rx.recv_timeout(Duration::from_secs(5)).expect("first record");
    let second = rx.recv_timeout(Duration::from_secs(5)).expect("second record");
    assert_eq!(first.path, "a/one.bin");
    assert_eq!(second.path, "b/two.bin");
    assert_eq!(second.user, UserId("bob".to_string()));

    handle.stop();
    assert!(rx.try_recv().is_err());
}

#[test]
fn records_round_trip_through_the_wire_encoding() {
    let original = file("music/track.flac", "carol", 7);
    let json = serde_json::to_string(&original).expect("encode");

    // the digest travels as its base32 rendering
    assert!(json.contains(&ContentHash([7u8; 24]).to_base32()));

    let decoded: SearchRecord = serde_json::from_str(&json).expect("decode");
    assert_eq!(decoded.hash, original.hash);
    assert_eq!(decoded.path, original.path);
    assert_eq!(decoded.user, original.user);
    assert_eq!(decoded.free_slots, original.free_slots);
}
