//! Stress test: many identities in one vault, with mixed passphrases.

use std::collections::HashSet;

use chatvault::{IdentityManager, KdfParams, Role, VaultConfig, VaultError};

const SHARED: &str = "Shared-Family#Phrase-1";
const PRIVATE: &str = "Private-Owner#Phrase-2";

fn manager(root: &std::path::Path) -> IdentityManager {
    IdentityManager::new(VaultConfig::with_root(root).kdf(KdfParams::minimal()))
}

#[test]
fn stress_50_unique_identities() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());

    let mut ids = HashSet::new();
    for i in 0..50 {
        let id = mgr
            .create(&format!("user-{i:02}"), SHARED, &format!("key-{i}"))
            .unwrap();
        assert!(ids.insert(id.clone()), "Duplicate identity ID found: {id}");
        assert_eq!(id.as_str().len(), 22);
    }

    let listed = mgr.list(SHARED).unwrap();
    assert_eq!(listed.len(), 50);
    let names: Vec<&str> = listed.iter().map(|(_, n)| n.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    // Only the first identity is admin.
    assert_eq!(mgr.admin_ids().unwrap().len(), 1);
}

#[test]
fn stress_mixed_passphrases_stay_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());

    let shared: Vec<_> = (0..5)
        .map(|i| mgr.create(&format!("shared-{i}"), SHARED, "k").unwrap())
        .collect();
    let private = mgr.create("owner", PRIVATE, "secret").unwrap();

    assert_eq!(mgr.list(SHARED).unwrap().len(), 5);
    assert_eq!(mgr.list(PRIVATE).unwrap().len(), 1);

    for id in &shared {
        assert!(matches!(
            mgr.get_credential(id, PRIVATE),
            Err(VaultError::AuthFailed)
        ));
    }
    assert_eq!(mgr.get_credential(&private, PRIVATE).unwrap().expose(), "secret");

    // Separate journals per identity.
    for (i, id) in shared.iter().enumerate() {
        let log = mgr.history(id, SHARED).unwrap();
        for j in 0..=i {
            log.append(Role::User, &format!("{i}-{j}")).unwrap();
        }
    }
    for (i, id) in shared.iter().enumerate() {
        assert_eq!(mgr.history(id, SHARED).unwrap().load_all().unwrap().len(), i + 1);
    }
    assert!(mgr.history(&private, PRIVATE).unwrap().load_all().unwrap().is_empty());
}

#[test]
fn stress_remove_all_identities() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());

    let ids: Vec<_> = (0..10)
        .map(|i| mgr.create(&format!("u{i}"), SHARED, "k").unwrap())
        .collect();

    for id in &ids {
        mgr.remove(id, true).unwrap();
        mgr.layout().purge_identity(id).unwrap();
        // The active pointer never dangles.
        let snapshot = mgr.snapshot().unwrap();
        if let Some(active) = &snapshot.active {
            assert!(snapshot.identities.contains_key(active));
        }
    }

    assert!(mgr.snapshot().unwrap().identities.is_empty());
    assert_eq!(mgr.active().unwrap(), None);
    assert!(mgr.status().unwrap().needs_onboarding());
    let known = mgr.snapshot().unwrap().ids();
    assert!(mgr.layout().orphan_user_dirs(&known).unwrap().is_empty());
}
