use hub_search::filter::Blacklist;
use hub_search::model::{Outcome, Pump, SearchModel, ViewEvent};
use hub_search::query::SearchKind;
use hub_search::record::{ContentHash, RecordKind, SearchRecord, UserId};
use hub_search::sort::{SortColumn, SortConfig, SortOrder};
use hub_search::tree::NodeId;

fn hash(tag: u8) -> ContentHash {
    ContentHash([tag; 24])
}

fn file(name: &str, user: &str, hash_tag: u8, size: u64, free: u32) -> SearchRecord {
    SearchRecord {
        kind: RecordKind::File,
        hash: Some(hash(hash_tag)),
        size,
        path: format!("share/media/{name}"),
        free_slots: free,
        total_slots: 6,
        user: UserId(user.to_string()),
        nick: user.to_string(),
        hub_name: "Nexus".to_string(),
        hub_url: "adc://nexus.example:412".to_string(),
        address: "192.168.1.20".to_string(),
        token: String::new(),
    }
}

fn make_model() -> SearchModel {
    SearchModel::with_sort_config(Blacklist::default(), SortConfig { workers: 1 })
}

fn inserted(model: &mut SearchModel, record: SearchRecord) -> NodeId {
    match model.add_result(record) {
        Outcome::Inserted(id) => id,
        Outcome::Dropped => panic!("record unexpectedly dropped"),
    }
}

fn root_sizes(model: &SearchModel) -> Vec<u64> {
    let tree = model.tree();
    tree.children(tree.root())
        .iter()
        .map(|id| tree.record(*id).expect("record").size)
        .collect()
}

#[test]
fn same_hash_results_group_under_one_row() {
    let mut model = make_model();

    let first = inserted(&mut model, file("track.flac", "alice", 1, 900, 2));
    inserted(&mut model, file("music/track.flac", "bob", 1, 900, 5));

    let tree = model.tree();
    assert_eq!(tree.child_count(tree.root()), 1);
    assert_eq!(tree.child_count(first), 1);
    assert_eq!(tree.hit_count(first), 2);
    assert_eq!(tree.index_len(), 1);

    // the representative shows the best-available source
    let shown = tree.record(first).expect("representative record");
    assert_eq!(shown.free_slots, 5);
    assert_eq!(shown.user, UserId("bob".to_string()));

    let counters = model.counters();
    assert_eq!(counters.results, 2);
    assert_eq!(counters.unique, 1);
    assert_eq!(counters.dropped, 0);
}

#[test]
fn duplicate_path_and_user_is_dropped() {
    let mut model = make_model();

    inserted(&mut model, file("track.flac", "alice", 1, 900, 2));
    inserted(&mut model, file("other/track.flac", "bob", 1, 900, 5));

    // same path and user as the first result, despite the swap that moved
    // its record into the child slot
    let outcome = model.add_result(file("track.flac", "alice", 1, 900, 2));
    assert_eq!(outcome, Outcome::Dropped);

    let counters = model.counters();
    assert_eq!(counters.results, 2);
    assert_eq!(counters.dropped, 1);
    assert_eq!(counters.unique, 1);
}

#[test]
fn strict_dedup_distinguishes_source_addresses() {
    let mut model = make_model();
    model.set_strict_dedup(true);

    inserted(&mut model, file("iso/disc.iso", "carol", 3, 4096, 1));

    let mut same_user_new_address = file("iso/disc.iso", "carol", 3, 4096, 1);
    same_user_new_address.address = "10.1.2.3".to_string();
    let outcome = model.add_result(same_user_new_address);
    assert!(matches!(outcome, Outcome::Inserted(_)));
    assert_eq!(model.counters().results, 2);
}

#[test]
fn file_without_hash_counts_as_dropped() {
    let mut model = make_model();
    let mut record = file("nameless.bin", "dave", 0, 10, 1);
    record.hash = None;

    assert_eq!(model.add_result(record), Outcome::Dropped);
    assert_eq!(model.counters().dropped, 1);
    assert!(model.is_empty());
}

#[test]
fn directories_are_never_indexed() {
    let mut model = make_model();
    let mut record = file("shared/videos", "erin", 0, 0, 1);
    record.kind = RecordKind::Directory;
    record.hash = None;

    inserted(&mut model, record);
    let tree = model.tree();
    assert_eq!(tree.child_count(tree.root()), 1);
    assert_eq!(tree.index_len(), 0);
}

#[test]
fn incremental_insert_matches_bulk_resort() {
    let mut model = make_model();
    for i in 0..60u8 {
        let size = ((i as u64) * 37) % 17 + 1;
        inserted(&mut model, file(&format!("f{i}.dat"), "alice", i + 1, size, 1));
    }

    let before = root_sizes(&model);
    model.take_events();
    model.sort(SortColumn::FileSize, SortOrder::Descending);
    let after = root_sizes(&model);

    assert_eq!(before, after);

    // an order-preserving resort still reports a remap, and it must be
    // the identity permutation
    let events = model.take_events();
    let remap = events
        .iter()
        .find_map(|event| match event {
            ViewEvent::LayoutChanged { remap, .. } => Some(remap.clone()),
            _ => None,
        })
        .expect("layout change event");
    assert!(remap.iter().enumerate().all(|(row, mapped)| row == *mapped));
}

#[test]
fn resort_keeps_node_ids_valid_and_remaps_rows() {
    let mut model = make_model();
    let mut ids = Vec::new();
    for i in 0..100u8 {
        let size = ((i as u64) * 101) % 41;
        ids.push(inserted(
            &mut model,
            file(&format!("f{i}.dat"), "alice", i + 1, size, 1),
        ));
    }

    let old_rows: Vec<NodeId> = model.tree().children(model.root()).to_vec();
    model.take_events();
    model.sort(SortColumn::ExactSize, SortOrder::Ascending);

    let events = model.take_events();
    let remap = events
        .iter()
        .find_map(|event| match event {
            ViewEvent::LayoutChanged { remap, .. } => Some(remap.clone()),
            _ => None,
        })
        .expect("layout change event");

    let tree = model.tree();
    let sizes = root_sizes(&model);
    assert!(sizes.windows(2).all(|pair| pair[0] <= pair[1]));

    // every handle still resolves to the record it was issued for
    for (i, id) in ids.iter().enumerate() {
        let record = tree.record(*id).expect("record survives resort");
        assert_eq!(record.path, format!("share/media/f{i}.dat"));
    }

    let new_rows = tree.children(tree.root());
    for (old_row, node) in old_rows.iter().enumerate() {
        assert_eq!(new_rows[remap[old_row]], *node);
    }
}

#[test]
fn hit_count_sort_moves_growing_group_up() {
    let mut model = make_model();
    model.sort(SortColumn::HitCount, SortOrder::Descending);

    let single = inserted(&mut model, file("a.bin", "alice", 1, 10, 1));
    let group = inserted(&mut model, file("b.bin", "bob", 2, 5, 1));
    model.take_events();

    inserted(&mut model, file("other/b.bin", "carol", 2, 5, 2));

    let tree = model.tree();
    assert_eq!(tree.children(tree.root()), &[group, single]);

    let events = model.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        ViewEvent::RowMoved { from: 1, to: 0, .. }
    )));
}

#[test]
fn hit_count_sort_keeps_leading_group_in_place() {
    let mut model = make_model();
    model.sort(SortColumn::HitCount, SortOrder::Descending);

    let group = inserted(&mut model, file("b.bin", "bob", 2, 20, 1));
    let single = inserted(&mut model, file("a.bin", "alice", 1, 10, 1));
    model.take_events();

    inserted(&mut model, file("other/b.bin", "carol", 2, 20, 2));

    // already at the top: the row must not move, only refresh
    let tree = model.tree();
    assert_eq!(tree.children(tree.root()), &[group, single]);

    let events = model.take_events();
    assert!(!events.iter().any(|event| matches!(event, ViewEvent::RowMoved { .. })));
    assert!(events.contains(&ViewEvent::DataChanged { node: group }));
}

#[test]
fn exact_search_requests_expansion_of_new_groups() {
    let mut model = make_model();
    model.set_search_kind(SearchKind::ExactHash(hash(7)));

    let group = inserted(&mut model, file("x.bin", "alice", 7, 64, 0));
    model.take_events();
    inserted(&mut model, file("mirror/x.bin", "bob", 7, 64, 3));

    let events = model.take_events();
    assert!(events.contains(&ViewEvent::ExpandRequest { node: group }));

    model.expand(group);
    assert!(model.tree().is_expanded(group));
}

#[test]
fn expanded_group_orders_members_by_free_slots() {
    let mut model = make_model();

    let group = inserted(&mut model, file("x.bin", "alice", 7, 64, 0));
    inserted(&mut model, file("m1/x.bin", "bob", 7, 64, 3));
    inserted(&mut model, file("m2/x.bin", "carol", 7, 64, 1));
    model.expand(group);
    inserted(&mut model, file("m3/x.bin", "dave", 7, 64, 2));

    // default order is descending; size cannot discriminate inside a
    // group so members fall back to free slots
    let tree = model.tree();
    let frees: Vec<u32> = tree
        .children(group)
        .iter()
        .map(|id| tree.record(*id).expect("record").free_slots)
        .collect();
    assert!(frees.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn removing_a_group_accounts_for_nested_members() {
    let mut model = make_model();

    inserted(&mut model, file("x.bin", "alice", 9, 64, 1));
    inserted(&mut model, file("m1/x.bin", "bob", 9, 64, 2));
    inserted(&mut model, file("m2/x.bin", "carol", 9, 64, 3));
    inserted(&mut model, file("y.bin", "alice", 10, 32, 1));
    assert_eq!(model.counters().results, 4);

    let tree = model.tree();
    let group_row = tree
        .children(tree.root())
        .iter()
        .position(|id| tree.has_children(*id))
        .expect("group row");

    assert!(model.remove_rows(model.root(), group_row, 1));

    let counters = model.counters();
    assert_eq!(counters.results, 1);
    assert_eq!(counters.unique, 1);
    assert_eq!(model.tree().index_len(), 1);
}

#[test]
fn dropped_counter_resets_with_the_last_result() {
    let mut model = make_model();

    inserted(&mut model, file("x.bin", "alice", 9, 64, 1));
    assert_eq!(model.add_result(file("x.bin", "alice", 9, 64, 1)), Outcome::Dropped);
    assert_eq!(model.counters().dropped, 1);

    assert!(model.remove_rows(model.root(), 0, 1));
    assert_eq!(model.counters().results, 0);
    assert_eq!(model.counters().dropped, 0);
}

#[test]
fn remove_rows_rejects_out_of_bounds_spans() {
    let mut model = make_model();
    inserted(&mut model, file("x.bin", "alice", 9, 64, 1));

    assert!(!model.remove_rows(model.root(), 0, 2));
    assert!(!model.remove_rows(model.root(), 1, 1));
    assert!(!model.remove_rows(model.root(), 0, 0));
    assert_eq!(model.counters().results, 1);
}

#[test]
fn pump_drains_in_bounded_batches() {
    let mut model = make_model();

    // empty model: the second staged record crosses the threshold of one
    let mut wake = false;
    for i in 0..20u8 {
        wake |= model.append_task(file(&format!("f{i}.dat"), "alice", i + 1, 10, 1));
    }
    assert!(wake);
    assert_eq!(model.backlog(), 20);

    assert_eq!(model.process_tasks(), Pump::Backlog);
    assert_eq!(model.backlog(), 4);
    assert_eq!(model.counters().results, 16);

    assert_eq!(model.process_tasks(), Pump::Idle);
    assert_eq!(model.backlog(), 0);
    assert_eq!(model.counters().results, 20);
    assert!(model.take_events().contains(&ViewEvent::UpdateStatus));

    assert_eq!(model.process_tasks(), Pump::Idle);
}

#[test]
fn wake_threshold_grows_with_the_result_count() {
    let mut model = make_model();
    for i in 0..60u8 {
        inserted(&mut model, file(&format!("f{i}.dat"), "alice", i + 1, 10, 1));
    }

    // between 51 and 100 visible rows the wake threshold is three
    assert!(!model.append_task(file("s1.dat", "bob", 101, 1, 1)));
    assert!(!model.append_task(file("s2.dat", "bob", 102, 1, 1)));
    assert!(!model.append_task(file("s3.dat", "bob", 103, 1, 1)));
    assert!(model.append_task(file("s4.dat", "bob", 104, 1, 1)));
}

#[test]
fn blacklisted_records_never_reach_the_queue() {
    let blacklist =
        Blacklist::new(&["**/*.exe".to_string()], vec![hash(66)]).expect("blacklist");
    let mut model = SearchModel::with_sort_config(blacklist, SortConfig { workers: 1 });

    assert!(!model.append_task(file("setup.exe", "mallory", 1, 10, 1)));
    assert!(!model.append_task(file("fine.dat", "alice", 66, 10, 1)));
    assert_eq!(model.backlog(), 0);

    // allowed records stage; the wake fires once the backlog exceeds
    // the empty-model threshold of one
    assert!(!model.append_task(file("fine.dat", "alice", 2, 10, 1)));
    assert_eq!(model.backlog(), 1);
    assert!(model.append_task(file("also-fine.dat", "alice", 3, 10, 1)));
    assert_eq!(model.backlog(), 2);
}

#[test]
fn clear_discards_tree_queue_and_counters() {
    let mut model = make_model();
    inserted(&mut model, file("x.bin", "alice", 9, 64, 1));
    model.append_task(file("y.bin", "bob", 10, 32, 1));
    model.take_events();

    model.clear();

    assert!(model.is_empty());
    assert_eq!(model.backlog(), 0);
    let counters = model.counters();
    assert_eq!(counters.results, 0);
    assert_eq!(counters.dropped, 0);
    assert_eq!(model.tree().index_len(), 0);
    assert!(model.take_events().contains(&ViewEvent::Reset));
}

#[test]
fn count_column_is_blank_for_plain_rows() {
    let mut model = make_model();
    let plain = inserted(&mut model, file("a.bin", "alice", 1, 2048, 1));
    let group = inserted(&mut model, file("b.bin", "bob", 2, 1024, 1));
    inserted(&mut model, file("m/b.bin", "carol", 2, 1024, 1));

    assert_eq!(model.display_text(plain, SortColumn::HitCount), "");
    assert_eq!(model.display_text(group, SortColumn::HitCount), "2");
    assert_eq!(model.display_text(plain, SortColumn::FileSize), "2.0 KiB");
    assert_eq!(model.display_text(plain, SortColumn::ExactSize), "2048");
    assert_eq!(model.display_text(plain, SortColumn::FileExt), "BIN");
}
