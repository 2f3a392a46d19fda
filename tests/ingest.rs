use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use hub_search::ingest::{AcceptConfig, FilterStats, ResultInbox, ResultSink, SinkHandle};
use hub_search::query::{SearchMode, parse_input};
use hub_search::record::{ContentHash, RecordKind, SearchRecord, UserId};
use hub_search::transfer::ShareIndex;

fn hash(tag: u8) -> ContentHash {
    ContentHash([tag; 24])
}

fn file(path: &str, user: &str, hash_tag: u8, free: u32) -> SearchRecord {
    SearchRecord {
        kind: RecordKind::File,
        hash: Some(hash(hash_tag)),
        size: 1024,
        path: path.to_string(),
        free_slots: free,
        total_slots: 4,
        user: UserId(user.to_string()),
        nick: user.to_string(),
        hub_name: "Nexus".to_string(),
        hub_url: "adc://nexus.example:412".to_string(),
        address: "192.168.1.20".to_string(),
        token: "tok-1".to_string(),
    }
}

fn make_inbox(
    input: &str,
    hide_shared: bool,
    free_slots_only: bool,
    share: Option<HashSet<ContentHash>>,
) -> (
    ResultInbox,
    crossbeam_channel::Receiver<SearchRecord>,
    Arc<AtomicBool>,
    Arc<FilterStats>,
) {
    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(FilterStats::default());
    let share = share.map(|set| Arc::new(set) as Arc<dyn ShareIndex + Send + Sync>);
    let (inbox, rx) = ResultInbox::new(
        AcceptConfig {
            query: parse_input(input, SearchMode::Any),
            token: "tok-1".to_string(),
            hide_shared,
            free_slots_only,
        },
        share,
        stop.clone(),
        stats.clone(),
    );
    (inbox, rx, stop, stats)
}

#[test]
fn keyword_terms_filter_on_the_full_path() {
    let (inbox, rx, _stop, stats) = make_inbox("linux iso -beta", false, false, None);

    inbox.on_result(file("distros/Linux-2026.iso", "alice", 1, 2));
    inbox.on_result(file("distros/linux-beta.iso", "bob", 2, 2));
    inbox.on_result(file("music/track.flac", "carol", 3, 2));

    let delivered: Vec<SearchRecord> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].path, "distros/Linux-2026.iso");
    assert_eq!(stats.accepted(), 1);
    assert_eq!(stats.rejected(), 2);
}

#[test]
fn stale_session_tokens_are_rejected() {
    let (inbox, rx, _stop, stats) = make_inbox("iso", false, false, None);

    let mut stale = file("distros/old.iso", "alice", 1, 2);
    stale.token = "tok-0".to_string();
    inbox.on_result(stale);

    // records without a token predate token support and pass through
    let mut untagged = file("distros/new.iso", "bob", 2, 2);
    untagged.token = String::new();
    inbox.on_result(untagged);

    assert_eq!(rx.try_iter().count(), 1);
    assert_eq!(stats.rejected(), 1);
}

#[test]
fn stop_flag_rejects_everything() {
    let (inbox, rx, stop, stats) = make_inbox("iso", false, false, None);
    stop.store(true, Ordering::SeqCst);

    inbox.on_result(file("distros/a.iso", "alice", 1, 2));
    inbox.on_result(file("distros/b.iso", "bob", 2, 2));

    assert_eq!(rx.try_iter().count(), 0);
    assert_eq!(stats.rejected(), 2);
}

#[test]
fn exact_hash_queries_accept_only_that_content() {
    let digest = hash(9).to_base32();
    let (inbox, rx, _stop, _stats) = make_inbox(&format!("tth:{digest}"), false, false, None);

    inbox.on_result(file("anything/at/all.bin", "alice", 9, 2));
    inbox.on_result(file("anything/else.bin", "bob", 8, 2));

    let delivered: Vec<SearchRecord> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].hash, Some(hash(9)));
}

#[test]
fn hide_shared_consults_the_share_index() {
    let mut shared = HashSet::new();
    shared.insert(hash(5));
    let (inbox, rx, _stop, _stats) = make_inbox("iso", true, false, Some(shared));

    inbox.on_result(file("distros/owned.iso", "alice", 5, 2));
    inbox.on_result(file("distros/wanted.iso", "bob", 6, 2));

    let delivered: Vec<SearchRecord> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].hash, Some(hash(6)));
}

#[test]
fn free_slots_filter_drops_saturated_sources() {
    let (inbox, rx, _stop, _stats) = make_inbox("iso", false, true, None);

    inbox.on_result(file("distros/busy.iso", "alice", 1, 0));
    inbox.on_result(file("distros/open.iso", "bob", 2, 3));

    let delivered: Vec<SearchRecord> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].path, "distros/open.iso");
}

#[test]
fn stats_reset_starts_a_fresh_tally() {
    let (inbox, _rx, _stop, stats) = make_inbox("iso", false, false, None);

    inbox.on_result(file("distros/a.iso", "alice", 1, 2));
    inbox.on_result(file("music/track.flac", "bob", 2, 2));
    assert_eq!(stats.accepted(), 1);
    assert_eq!(stats.rejected(), 1);

    stats.reset();
    assert_eq!(stats.accepted(), 0);
    assert_eq!(stats.rejected(), 0);
}

#[test]
fn sink_handle_forwards_only_while_installed() {
    let handle = SinkHandle::new();

    // nothing installed: records vanish without panicking
    handle.on_result(file("distros/ignored.iso", "alice", 1, 2));

    let (inbox, rx, _stop, _stats) = make_inbox("iso", false, false, None);
    handle.install(inbox);
    handle.on_result(file("distros/kept.iso", "bob", 2, 2));

    handle.uninstall();
    handle.on_result(file("distros/late.iso", "carol", 3, 2));

    let delivered: Vec<SearchRecord> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].path, "distros/kept.iso");
}

#[test]
fn results_cross_threads_through_the_handle() {
    let handle = SinkHandle::new();
    let (inbox, rx, _stop, _stats) = make_inbox("iso", false, false, None);
    handle.install(inbox);

    let workers: Vec<thread::JoinHandle<()>> = (0..4u8)
        .map(|worker| {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..25u8 {
                    handle.on_result(file(
                        &format!("distros/w{worker}-{i}.iso"),
                        &format!("user{worker}"),
                        worker * 25 + i + 1,
                        1,
                    ));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("producer thread");
    }

    let mut delivered = 0;
    while rx.recv_timeout(Duration::from_millis(200)).is_ok() {
        delivered += 1;
        if delivered == 100 {
            break;
        }
    }
    assert_eq!(delivered, 100);
}
