//! Integration test: full end-to-end workflow.
//!
//! Tests the complete lifecycle:
//! 1. Bootstrap an empty vault
//! 2. Create identities and resolve them by name
//! 3. Write and read history (full, tail, search)
//! 4. Export an encrypted dump and import it into another identity
//! 5. Remove identities

use chatvault::crypto::{derive_domain_key, derive_field_key, open, seal, HISTORY_DOMAIN};
use chatvault::history::preview;
use chatvault::{
    IdentityManager, ImportMode, KdfParams, Role, SearchQuery, TailOrder, VaultConfig,
    VaultError, VaultStatus,
};

const ANN_PASS: &str = "Correct-Horse-Battery-7";
const BOB_PASS: &str = "Bobs-Own#Passphrase-42";
const EXPORT_PASS: &str = "Export-Phrase-2024!";

#[test]
fn full_workflow_vault_to_import() {
    let tmp = tempfile::tempdir().unwrap();
    let config = VaultConfig::with_root(tmp.path()).kdf(KdfParams::minimal());
    let mgr = IdentityManager::new(config);

    // ── Step 1: Bootstrap ───────────────────────────────────────────────
    assert_eq!(mgr.status().unwrap(), VaultStatus::Missing);
    assert!(mgr.status().unwrap().needs_onboarding());

    // ── Step 2: Identities ──────────────────────────────────────────────
    let ann = mgr.create("Ann", ANN_PASS, "sk-ann").unwrap();
    let bob = mgr.create("Bob", BOB_PASS, "sk-bob").unwrap();
    assert_eq!(mgr.status().unwrap(), VaultStatus::Populated);
    assert_eq!(mgr.admin_ids().unwrap(), vec![ann.clone()]);

    assert_eq!(mgr.resolve("ann", Some(ANN_PASS)).unwrap(), ann);
    // Bob's name is invisible with Ann's passphrase.
    assert!(matches!(
        mgr.resolve("bob", Some(ANN_PASS)),
        Err(VaultError::NotFound(_))
    ));
    assert_eq!(mgr.resolve(bob.as_str(), None).unwrap(), bob);

    assert_eq!(mgr.get_credential(&ann, ANN_PASS).unwrap().expose(), "sk-ann");
    assert!(matches!(
        mgr.get_credential(&ann, BOB_PASS),
        Err(VaultError::AuthFailed)
    ));

    // ── Step 3: History ─────────────────────────────────────────────────
    let ann_log = mgr.history(&ann, ANN_PASS).unwrap();
    for text in ["hello world", "goodbye", "hello there"] {
        ann_log.append(Role::User, text).unwrap();
    }
    ann_log.append(Role::Assistant, "").unwrap();

    let all = ann_log.load_all().unwrap();
    assert_eq!(all.len(), 3);

    let tail = ann_log.load_tail(2, TailOrder::Chronological).unwrap();
    assert_eq!(tail, all[1..].to_vec());

    let hits = ann_log.search(&SearchQuery::new("hello")).unwrap();
    assert_eq!(hits.iter().map(|h| h.idx).collect::<Vec<_>>(), [0, 2]);
    assert!(hits.iter().all(|h| h.snippet.contains("hello")));

    // ── Step 4: Export / import ─────────────────────────────────────────
    let doc = ann_log
        .export_encrypted(EXPORT_PASS, KdfParams::minimal())
        .unwrap();
    let bytes = doc.to_json().unwrap().into_bytes();
    assert_eq!(preview(&bytes, Some(EXPORT_PASS)).unwrap().len(), 3);

    let bob_log = mgr.history(&bob, BOB_PASS).unwrap();
    let imported = bob_log
        .import(&bytes, Some(EXPORT_PASS), ImportMode::Append)
        .unwrap();
    assert_eq!(imported, 3);
    let bob_contents: Vec<String> = bob_log
        .load_all()
        .unwrap()
        .into_iter()
        .map(|r| r.content)
        .collect();
    assert_eq!(bob_contents, ["hello world", "goodbye", "hello there"]);

    // Imported records live under Bob's key, not the export key.
    assert!(mgr.history(&bob, ANN_PASS).is_err());

    // ── Step 5: Remove ──────────────────────────────────────────────────
    let removal = mgr.remove(&bob, true).unwrap();
    assert_eq!(removal.new_active, Some(ann.clone()));
    mgr.layout().purge_identity(&bob).unwrap();
    assert!(!mgr.layout().user_dir(&bob).exists());
    assert_eq!(mgr.snapshot().unwrap().ids().len(), 1);
}

#[test]
fn full_workflow_domain_separation() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = IdentityManager::new(VaultConfig::with_root(tmp.path()).kdf(KdfParams::minimal()));
    let id = mgr.create("Ann", ANN_PASS, "sk-ann").unwrap();

    let record = mgr.snapshot().unwrap().get(&id).cloned().unwrap();
    let salt = record.salt().unwrap();
    let params = record.kdf_or(KdfParams::minimal());

    let base = chatvault::crypto::derive_base(ANN_PASS.as_bytes(), &salt, params).unwrap();
    let field_key = derive_field_key(&base, id.as_str(), "api_key").unwrap();
    let history_key = derive_domain_key(ANN_PASS.as_bytes(), &salt, params, HISTORY_DOMAIN).unwrap();
    assert_ne!(*field_key, *history_key);

    // A history token does not open under the field key, and vice versa.
    let token = seal(&history_key, b"history data").unwrap();
    assert!(matches!(open(&field_key, &token), Err(VaultError::AuthFailed)));
    let sealed = record.credential.unwrap();
    assert!(matches!(open(&history_key, &sealed.0), Err(VaultError::AuthFailed)));
    assert_eq!(open(&field_key, &sealed.0).unwrap(), b"sk-ann");
}
