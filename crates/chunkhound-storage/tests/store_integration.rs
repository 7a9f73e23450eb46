//! Integration tests against a real on-disk store
//!
//! These exercise regex search, explicit cascade deletes, pagination, and
//! durability across close/reopen. Semantic search requires the vss
//! extension and is covered by unit tests at the SQL-construction level.

use chunkhound_parsing::{Chunk, ChunkKind};
use chunkhound_storage::{
    ChunkStore, CheckpointPolicy, NewFile, RegexSearchRequest,
};
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> ChunkStore {
    let path = dir.path().join(".chunkhound.db");
    ChunkStore::open(&path, CheckpointPolicy::default()).expect("open store")
}

fn chunk(symbol: &str, code: &str, start_line: usize) -> Chunk {
    Chunk {
        kind: ChunkKind::Function,
        symbol: symbol.to_string(),
        code: code.to_string(),
        start_line,
        end_line: start_line + 1,
        language: "python".to_string(),
        qualified_name: None,
    }
}

fn new_file(path: &str, crc: u32) -> NewFile {
    NewFile {
        path: path.to_string(),
        size_bytes: 100,
        mtime: 1_700_000_000.5,
        content_crc32: crc,
        language: "python".to_string(),
    }
}

fn regex_request(pattern: &str) -> RegexSearchRequest {
    RegexSearchRequest {
        pattern: pattern.to_string(),
        path_filter: None,
        limit: 10,
        offset: 0,
        max_response_bytes: None,
    }
}

#[test]
fn upsert_is_idempotent_on_path() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let first = store.upsert_file(&new_file("/r/a/x.py", 1)).unwrap();
    let second = store.upsert_file(&new_file("/r/a/x.py", 2)).unwrap();
    assert_eq!(first, second);

    let record = store.get_file("/r/a/x.py").unwrap().unwrap();
    assert_eq!(record.content_crc32, 2);
    assert_eq!(store.list_files().unwrap().len(), 1);
}

#[test]
fn timestamps_track_discovery_and_indexing() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let file_id = store.upsert_file(&new_file("/r/a/x.py", 1)).unwrap();
    let record = store.get_file("/r/a/x.py").unwrap().unwrap();
    assert!(record.first_seen > 0.0);
    assert!(record.last_indexed.is_none());

    store.touch_last_indexed(file_id).unwrap();
    let record = store.get_file("/r/a/x.py").unwrap().unwrap();
    let indexed_at = record.last_indexed.expect("last_indexed set after touch");
    assert!(indexed_at >= record.first_seen);

    // Upserting again keeps the original discovery time
    let first_seen = record.first_seen;
    store.upsert_file(&new_file("/r/a/x.py", 2)).unwrap();
    let record = store.list_files().unwrap().remove(0);
    assert_eq!(record.first_seen, first_seen);
}

#[test]
fn regex_search_finds_stored_chunk() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let file_id = store.upsert_file(&new_file("/r/a/x.py", 1)).unwrap();
    store
        .replace_file_chunks(
            file_id,
            &[chunk(
                "compute_total",
                "def compute_total(items):\n    return sum(items)",
                1,
            )],
        )
        .unwrap();

    let page = store.search_regex(&regex_request("compute_total")).unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].symbol, "compute_total");
    assert_eq!(page.results[0].start_line, 1);
    assert_eq!(page.results[0].end_line, 2);
    assert!(!page.pagination.has_more);
}

#[test]
fn path_filter_scopes_results() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let a = store.upsert_file(&new_file("/r/a/x.py", 1)).unwrap();
    let b = store.upsert_file(&new_file("/r/b/y.py", 2)).unwrap();
    store
        .replace_file_chunks(a, &[chunk("shared_name", "def shared_name(): pass", 1)])
        .unwrap();
    store
        .replace_file_chunks(b, &[chunk("shared_name", "def shared_name(): pass", 1)])
        .unwrap();

    let mut request = regex_request("shared_name");
    request.path_filter = Some("a/".to_string());
    let page = store.search_regex(&request).unwrap();
    assert_eq!(page.results.len(), 1);
    assert!(page.results[0].file.contains("/a/"));
}

#[test]
fn replace_chunks_is_atomic_swap() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let file_id = store.upsert_file(&new_file("/r/a/x.py", 1)).unwrap();
    store
        .replace_file_chunks(file_id, &[chunk("old_name", "def old_name(): pass", 1)])
        .unwrap();
    store
        .replace_file_chunks(file_id, &[chunk("new_name", "def new_name(): pass", 1)])
        .unwrap();

    assert_eq!(
        store.search_regex(&regex_request("old_name")).unwrap().results.len(),
        0
    );
    assert_eq!(
        store.search_regex(&regex_request("new_name")).unwrap().results.len(),
        1
    );
    assert_eq!(store.chunk_count().unwrap(), 1);
}

#[test]
fn delete_file_cascades_to_chunks() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let file_id = store.upsert_file(&new_file("/r/a/x.py", 1)).unwrap();
    store
        .replace_file_chunks(file_id, &[chunk("goner", "def goner(): pass", 1)])
        .unwrap();

    assert!(store.delete_file("/r/a/x.py").unwrap());
    assert!(store.get_file("/r/a/x.py").unwrap().is_none());
    assert_eq!(store.chunk_count().unwrap(), 0);
    assert_eq!(store.search_regex(&regex_request("goner")).unwrap().results.len(), 0);

    // Deleting again is a no-op
    assert!(!store.delete_file("/r/a/x.py").unwrap());
}

#[test]
fn pagination_covers_every_match_exactly_once() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    // 23 chunks carrying the needle across several files
    let mut expected = 0;
    for f in 0usize..5 {
        let file_id = store
            .upsert_file(&new_file(&format!("/r/src/f{f}.py"), f as u32))
            .unwrap();
        let chunks: Vec<Chunk> = (0usize..5)
            .filter(|c| f * 5 + c < 23)
            .map(|c| {
                expected += 1;
                chunk(
                    &format!("fn_{f}_{c}"),
                    &format!("def fn_{f}_{c}():\n    # NEEDLE marker\n    pass"),
                    c * 10 + 1,
                )
            })
            .collect();
        store.replace_file_chunks(file_id, &chunks).unwrap();
    }
    assert_eq!(expected, 23);

    // Single big page is the reference order
    let mut reference = regex_request("NEEDLE");
    reference.limit = 1000;
    let all = store.search_regex(&reference).unwrap();
    assert_eq!(all.results.len(), 23);
    assert!(!all.pagination.has_more);

    // Step through in pages of 5 and compare
    let mut collected = Vec::new();
    let mut offset = 0;
    loop {
        let mut request = regex_request("NEEDLE");
        request.limit = 5;
        request.offset = offset;
        let page = store.search_regex(&request).unwrap();
        collected.extend(page.results);
        match page.pagination.next_offset {
            Some(next) if page.pagination.has_more => offset = next,
            _ => break,
        }
    }

    assert_eq!(collected.len(), 23);
    let reference_keys: Vec<_> = all
        .results
        .iter()
        .map(|r| (r.file.clone(), r.start_line, r.chunk_id))
        .collect();
    let collected_keys: Vec<_> = collected
        .iter()
        .map(|r| (r.file.clone(), r.start_line, r.chunk_id))
        .collect();
    assert_eq!(collected_keys, reference_keys);
}

#[test]
fn response_size_cap_truncates_with_resume_offset() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let file_id = store.upsert_file(&new_file("/r/a/big.py", 1)).unwrap();
    let chunks: Vec<Chunk> = (0..6)
        .map(|i| {
            chunk(
                &format!("big_{i}"),
                &format!("def big_{i}():\n    data = \"{}\"", "y".repeat(2000)),
                i * 10 + 1,
            )
        })
        .collect();
    store.replace_file_chunks(file_id, &chunks).unwrap();

    let mut request = regex_request("def big_");
    request.max_response_bytes = Some(5000);
    let page = store.search_regex(&request).unwrap();

    assert!(page.results.len() < 6);
    assert!(!page.results.is_empty());
    assert!(page.pagination.has_more);

    // Resuming from next_offset eventually yields all six
    let mut seen = page.results.len();
    let mut offset = page.pagination.next_offset.unwrap();
    while seen < 6 {
        let mut next = regex_request("def big_");
        next.max_response_bytes = Some(5000);
        next.offset = offset;
        let next_page = store.search_regex(&next).unwrap();
        assert!(!next_page.results.is_empty());
        seen += next_page.results.len();
        match next_page.pagination.next_offset {
            Some(n) => offset = n,
            None => break,
        }
    }
    assert_eq!(seen, 6);
}

#[test]
fn committed_chunks_survive_close_and_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".chunkhound.db");

    {
        let mut store = ChunkStore::open(&db_path, CheckpointPolicy::default()).unwrap();
        let file_id = store.upsert_file(&new_file("/r/a/x.py", 7)).unwrap();
        store
            .replace_file_chunks(file_id, &[chunk("durable_fn", "def durable_fn(): pass", 1)])
            .unwrap();
        store.close().unwrap();
    }

    let store = ChunkStore::open(&db_path, CheckpointPolicy::default()).unwrap();
    let page = store.search_regex(&regex_request("durable_fn")).unwrap();
    assert_eq!(page.results.len(), 1);

    let stats = store.stats().unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.chunks, 1);
}

#[test]
fn invalid_path_filter_is_rejected_not_executed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut request = regex_request("anything");
    request.path_filter = Some("../secrets".to_string());
    assert!(store.search_regex(&request).is_err());
}

#[test]
fn stats_count_files_and_chunks() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    for i in 0u32..3 {
        let file_id = store
            .upsert_file(&new_file(&format!("/r/s/f{i}.py"), i))
            .unwrap();
        store
            .replace_file_chunks(
                file_id,
                &[
                    chunk(&format!("a{i}"), "def a(): pass", 1),
                    chunk(&format!("b{i}"), "def b(): pass", 5),
                ],
            )
            .unwrap();
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.files, 3);
    assert_eq!(stats.chunks, 6);
}
