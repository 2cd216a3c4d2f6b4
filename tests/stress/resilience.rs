//! Resilience tests: corrupted lines, wrong passphrases, tampered data.

use std::fs::{self, OpenOptions};
use std::io::Write;

use chatvault::crypto::Key;
use chatvault::history::log::HEADER;
use chatvault::{
    HistoryLog, IdentityManager, ImportMode, KdfParams, Role, TailOrder, VaultConfig, VaultError,
};

const PASS: &str = "Correct-Horse-Battery-7";

fn journal(dir: &std::path::Path) -> HistoryLog {
    HistoryLog::new(dir.join("history.jsonl"), Key::new([3u8; 32]), 128)
}

#[test]
fn resilience_flipped_line_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    for text in ["first", "second", "third"] {
        log.append(Role::User, text).unwrap();
    }

    // Flip bytes inside the second record's line.
    let text = fs::read_to_string(log.path()).unwrap();
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut bytes = lines[2].clone().into_bytes();
    for b in bytes.iter_mut().skip(10).take(4) {
        *b = if *b == b'A' { b'B' } else { b'A' };
    }
    lines[2] = String::from_utf8(bytes).unwrap();
    fs::write(log.path(), lines.join("\n") + "\n").unwrap();

    let contents: Vec<_> = log
        .load_all()
        .unwrap()
        .into_iter()
        .map(|r| r.content)
        .collect();
    assert_eq!(contents, ["first", "third"]);
    assert_eq!(log.load_tail(5, TailOrder::Chronological).unwrap().len(), 2);
}

#[test]
fn resilience_torn_final_line() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    log.append(Role::User, "complete").unwrap();

    // Simulate a crash mid-append: half a token, no newline.
    let token_half = {
        let text = fs::read_to_string(log.path()).unwrap();
        let last = text.lines().last().unwrap().to_string();
        last[..last.len() / 2].to_string()
    };
    let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
    file.write_all(token_half.as_bytes()).unwrap();
    drop(file);

    assert_eq!(log.load_all().unwrap().len(), 1);
    let tail = log.load_tail(1, TailOrder::Chronological).unwrap();
    assert_eq!(tail[0].content, "complete");
}

#[test]
fn resilience_header_never_parsed_as_record() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    log.reset().unwrap();
    assert!(fs::read_to_string(log.path()).unwrap().starts_with(HEADER));
    assert!(log.load_all().unwrap().is_empty());
    assert!(log.load_tail(3, TailOrder::NewestFirst).unwrap().is_empty());
}

#[test]
fn resilience_corrupted_vault_line_is_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = IdentityManager::new(VaultConfig::with_root(tmp.path()).kdf(KdfParams::minimal()));
    let ann = mgr.create("Ann", PASS, "sk-ann").unwrap();
    let bob = mgr.create("Bob", PASS, "sk-bob").unwrap();

    // Damage Ann's credential line only.
    let path = mgr.store().path().to_path_buf();
    let text = fs::read_to_string(&path).unwrap();
    let damaged: String = text
        .lines()
        .map(|l| {
            if l.starts_with(&format!("user.{ann}.api_key_enc")) {
                format!("{}XX", &l[..l.len() - 8])
            } else {
                l.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(&path, damaged + "\n").unwrap();

    assert!(mgr.get_credential(&ann, PASS).is_err());
    assert_eq!(mgr.get_credential(&bob, PASS).unwrap().expose(), "sk-bob");
    // Ann's name still decrypts.
    assert_eq!(mgr.display_name(&ann, PASS).unwrap(), "Ann");
}

#[test]
fn resilience_missing_salt_is_corrupt() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = IdentityManager::new(VaultConfig::with_root(tmp.path()).kdf(KdfParams::minimal()));
    let ann = mgr.create("Ann", PASS, "sk-ann").unwrap();
    mgr.store()
        .remove_where(|k| k == format!("user.{ann}.kdf_salt"))
        .unwrap();
    assert!(matches!(
        mgr.get_credential(&ann, PASS),
        Err(VaultError::Corrupt(_))
    ));
    // Listing skips it rather than failing.
    assert!(mgr.list(PASS).unwrap().is_empty());
}

#[test]
fn resilience_wrong_export_passphrase_imports_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let log = journal(tmp.path());
    log.append(Role::User, "payload").unwrap();
    let bytes = log
        .export_encrypted("Export-Phrase-2024!", KdfParams::minimal())
        .unwrap()
        .to_json()
        .unwrap()
        .into_bytes();

    let before = log.load_all().unwrap();
    assert!(matches!(
        log.import(&bytes, Some("Wrong-Phrase-2024!"), ImportMode::Replace),
        Err(VaultError::AuthFailed)
    ));
    // A failed import must not have reset the journal.
    assert_eq!(log.load_all().unwrap(), before);
}
