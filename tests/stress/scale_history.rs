//! Scale test: large journals, tail reads and search.

use std::fs;
use std::time::Instant;

use chatvault::crypto::Key;
use chatvault::{HistoryLog, Role, SearchMode, SearchQuery, TailOrder};

fn journal(dir: &std::path::Path, chunk: usize) -> HistoryLog {
    HistoryLog::new(dir.join("history.jsonl"), Key::new([11u8; 32]), chunk)
}

#[test]
fn stress_5000_records_tail_and_full_read() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path(), 64 * 1024);

    let start = Instant::now();
    for i in 0..5000 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        log.append(role, &format!("message number {i}")).unwrap();
    }
    let write_time = start.elapsed();

    let start = Instant::now();
    let tail = log.load_tail(10, TailOrder::Chronological).unwrap();
    let tail_time = start.elapsed();
    let contents: Vec<_> = tail.iter().map(|r| r.content.clone()).collect();
    let expected: Vec<_> = (4990..5000).map(|i| format!("message number {i}")).collect();
    assert_eq!(contents, expected);

    let start = Instant::now();
    let all = log.load_all().unwrap();
    let full_time = start.elapsed();
    assert_eq!(all.len(), 5000);
    assert_eq!(all[0].content, "message number 0");

    eprintln!("5000 appends: {write_time:?}, tail(10): {tail_time:?}, load_all: {full_time:?}");
}

#[test]
fn stress_tail_with_tiny_chunks_matches_full_read() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path(), 7);
    for i in 0..300 {
        log.append(Role::User, &format!("line {i}\nwith a second line")).unwrap();
    }

    let all = log.load_all().unwrap();
    for n in [1, 2, 17, 299, 300, 301] {
        let tail = log.load_tail(n, TailOrder::NewestFirst).unwrap();
        let mut expected: Vec<_> = all.iter().rev().take(n).cloned().collect();
        assert_eq!(tail, expected, "n = {n}");
        expected.reverse();
        assert_eq!(log.load_tail(n, TailOrder::Chronological).unwrap(), expected);
    }
}

#[test]
fn stress_search_large_journal() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path(), 64 * 1024);
    for i in 0..2000 {
        let text = if i % 100 == 0 {
            format!("checkpoint {i} reached")
        } else {
            format!("routine chatter {i}")
        };
        log.append(Role::User, &text).unwrap();
    }

    let hits = log
        .search(&SearchQuery::new("checkpoint").limit(1000))
        .unwrap();
    assert_eq!(hits.len(), 20);
    assert!(hits.windows(2).all(|w| w[0].idx < w[1].idx));

    let hits = log
        .search(&SearchQuery::new(r"checkpoint \d+00 ").mode(SearchMode::Regex).limit(5))
        .unwrap();
    assert_eq!(hits.len(), 5);

    let size = fs::metadata(log.path()).unwrap().len();
    assert!(size > 100_000);
}
