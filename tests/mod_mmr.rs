use ledgerlite::mmr::{self, Bundle, MmrStore};
use tempfile::tempdir;

#[test]
fn a_service_created_through_the_store_proves_inclusion_for_every_appended_leaf() {
    let dir = tempdir().unwrap();
    let store = MmrStore::open(dir.path().to_path_buf()).unwrap();
    let svc = store.open_or_create("ledger-a").unwrap();

    let leaves: Vec<[u8; 16]> = (0..30u32).map(|i| mmr::hash(&i.to_be_bytes())).collect();
    for l in &leaves {
        svc.append(*l).unwrap();
    }
    svc.flush(false).unwrap();

    for l in &leaves {
        let bundle = svc.server_inclusion(*l).unwrap();
        assert_eq!(bundle.status, 1);
        assert!(mmr::verify(&bundle));
    }
}

#[test]
fn a_bundle_serialized_to_json_and_back_still_verifies() {
    let dir = tempdir().unwrap();
    let store = MmrStore::open(dir.path().to_path_buf()).unwrap();
    let svc = store.open_or_create("wire").unwrap();
    for text in ["first", "second", "third", "fourth"] {
        svc.append(mmr::hash(text.as_bytes())).unwrap();
    }
    svc.flush(false).unwrap();

    let bundle = svc.server_inclusion(mmr::hash(b"second")).unwrap();
    let json = serde_json::to_string(&bundle).unwrap();
    let roundtripped: Bundle = serde_json::from_str(&json).unwrap();
    assert_eq!(bundle, roundtripped);
    assert!(mmr::verify(&roundtripped));
}

#[test]
fn tampering_with_a_proof_sibling_breaks_verification() {
    let dir = tempdir().unwrap();
    let store = MmrStore::open(dir.path().to_path_buf()).unwrap();
    let svc = store.open_or_create("tamper").unwrap();
    for text in ["a", "b", "c", "d", "e"] {
        svc.append(mmr::hash(text.as_bytes())).unwrap();
    }
    svc.flush(false).unwrap();

    let mut bundle = svc.server_inclusion(mmr::hash(b"c")).unwrap();
    assert!(mmr::verify(&bundle));
    if let Some((sib, _)) = bundle.proof.first_mut() {
        *sib = mmr::hash(b"not-the-real-sibling").iter().map(|b| format!("{b:02x}")).collect();
    } else {
        bundle.global_root = Some("00".to_string());
    }
    assert!(!mmr::verify(&bundle));
}

#[test]
fn services_are_independent_registries_across_the_same_store() {
    let dir = tempdir().unwrap();
    let store = MmrStore::open(dir.path().to_path_buf()).unwrap();
    store.open_or_create("one").unwrap().append(mmr::hash(b"x")).unwrap();
    store.open_or_create("two").unwrap().append(mmr::hash(b"y")).unwrap();

    let mut names = store.list_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["one".to_string(), "two".to_string()]);

    store.delete_service("one").unwrap();
    let remaining = store.list_names().unwrap();
    assert_eq!(remaining, vec!["two".to_string()]);
}
