//! Edge case tests for the journal, search and dump codec.

use std::fs;

use chatvault::crypto::Key;
use chatvault::history::{dump, Dump};
use chatvault::{
    HistoryLog, ImportMode, KdfParams, Role, SearchMode, SearchQuery, TailOrder, VaultError,
};

fn journal(dir: &std::path::Path) -> HistoryLog {
    HistoryLog::new(dir.join("history.jsonl"), Key::new([21u8; 32]), 64)
}

#[test]
fn edge_unicode_content() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    let text = "Grüße 👋 — 日本語\nzweite Zeile";
    log.append(Role::User, text).unwrap();

    assert_eq!(log.load_all().unwrap()[0].content, text);
    let hits = log.search(&SearchQuery::new("GRÜSSE grüße")).unwrap();
    // Lowercasing does not expand ß, so only the literal term matches.
    assert!(hits.is_empty());
    let hits = log.search(&SearchQuery::new("grüße 日本語")).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].snippet.contains("Grüße"));
    assert!(!hits[0].snippet.contains('\n'));
}

#[test]
fn edge_very_long_record_snippet_is_bounded() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    let text = format!("{}needle{}", "x ".repeat(5000), " y".repeat(5000));
    log.append(Role::Assistant, &text).unwrap();

    let hits = log.search(&SearchQuery::new("needle")).unwrap();
    let snippet = &hits[0].snippet;
    assert!(snippet.starts_with("… "));
    assert!(snippet.ends_with(" …"));
    assert!(snippet.chars().count() <= 6 + 40 + 80 + 4);

    // Tail reads still work when one line is far larger than a chunk.
    let tail = log.load_tail(1, TailOrder::Chronological).unwrap();
    assert_eq!(tail[0].content, text);
}

#[test]
fn edge_search_regex_case_flags() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    log.append(Role::User, "Deploy at 10:30").unwrap();

    let q = SearchQuery::new(r"deploy at \d+:\d+").mode(SearchMode::Regex);
    assert_eq!(log.search(&q).unwrap().len(), 1);
    assert!(log.search(&q.clone().case_sensitive(true)).unwrap().is_empty());
    assert!("bogus".parse::<SearchMode>().is_err());
    assert_eq!("OR".parse::<SearchMode>().unwrap(), SearchMode::Or);
}

#[test]
fn edge_import_empty_and_blank_dumps() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    assert_eq!(log.import(b"", None, ImportMode::Append).unwrap(), 0);
    assert_eq!(log.import(b"\n\n   \n", None, ImportMode::Append).unwrap(), 0);
    // A JSON object that is not a dump is treated as a single plain line.
    assert_eq!(
        log.import(br#"{"role":"user","content":"solo"}"#, None, ImportMode::Append)
            .unwrap(),
        1
    );
}

#[test]
fn edge_export_empty_journal() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    assert_eq!(log.export_plain(true).unwrap(), "");

    let doc = log.export_encrypted("Export-Phrase-2024!", KdfParams::minimal()).unwrap();
    let bytes = doc.to_json().unwrap().into_bytes();
    match dump::detect(&bytes).unwrap() {
        Dump::Encrypted(parsed) => assert_eq!(parsed, doc),
        Dump::Plain(_) => panic!("encrypted dump detected as plain"),
    }
    assert!(dump::preview(&bytes, Some("Export-Phrase-2024!")).unwrap().is_empty());
}

#[test]
fn edge_dump_with_unknown_kdf_is_corrupt() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    log.append(Role::User, "x").unwrap();
    let mut doc = log.export_encrypted("Export-Phrase-2024!", KdfParams::minimal()).unwrap();
    doc.kdf.alg = "scrypt".into();
    let bytes = doc.to_json().unwrap().into_bytes();
    assert!(matches!(
        dump::preview(&bytes, Some("Export-Phrase-2024!")),
        Err(VaultError::Corrupt(_))
    ));
}

#[test]
fn edge_timestamps_survive_plain_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    let input = "{\"ts\":\"2020-02-02T02:02:02Z\",\"role\":\"user\",\"content\":\"old\"}\n";
    let records = dump::preview(input.as_bytes(), None).unwrap();
    assert_eq!(records[0].ts_iso(), "2020-02-02T02:02:02Z");

    // Import re-stamps records with the import time.
    log.import(input.as_bytes(), None, ImportMode::Append).unwrap();
    assert_ne!(log.load_all().unwrap()[0].ts_iso(), "2020-02-02T02:02:02Z");
}

#[test]
fn edge_foreign_lines_in_journal() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    log.append(Role::User, "mine").unwrap();

    let other = HistoryLog::new(log.path(), Key::new([22u8; 32]), 64);
    other.append(Role::User, "theirs").unwrap();

    let text = fs::read_to_string(log.path()).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert_eq!(log.load_all().unwrap().len(), 1);
    assert_eq!(other.load_all().unwrap().len(), 1);
    assert_eq!(log.load_tail(5, TailOrder::NewestFirst).unwrap()[0].content, "mine");
}
