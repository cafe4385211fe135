use ledgerlite::codec;
use ledgerlite::engine::Environment;
use ledgerlite::store::map::KeyValueMap;
use tempfile::tempdir;

fn env() -> std::sync::Arc<Environment> {
    let dir = tempdir().unwrap();
    Environment::open(dir.keep(), 0, true, 16).unwrap()
}

#[test]
fn bucketed_map_round_trips_many_keys_sharing_few_buckets() {
    let map = KeyValueMap::create_bucketed(env(), "wide", 4, false).unwrap();
    let pairs: Vec<(Vec<u8>, Vec<u8>)> =
        (0..50u32).map(|i| (format!("key-{i}").into_bytes(), format!("value-{i}").into_bytes())).collect();
    for (k, v) in &pairs {
        map.set(k, v.clone()).unwrap();
    }
    map.flush(false).unwrap();
    for (k, v) in &pairs {
        assert_eq!(&map.get(k).unwrap(), v);
    }
}

#[test]
fn reopened_bucketed_map_still_answers_lookups_after_a_delete() {
    let dir = tempdir().unwrap();
    let path = dir.keep();
    {
        let env = Environment::open(path.clone(), 0, true, 16).unwrap();
        let map = KeyValueMap::create_bucketed(env, "svc", 8, false).unwrap();
        map.set(b"present", b"v".to_vec()).unwrap();
        map.set(b"gone", b"v".to_vec()).unwrap();
        map.flush(false).unwrap();
        map.delete(b"gone");
        map.flush(false).unwrap();
    }
    let env2 = Environment::open(path, 0, true, 16).unwrap();
    let reopened = KeyValueMap::open(env2, "svc").unwrap();
    assert!(reopened.contains(b"present").unwrap());
    assert!(!reopened.contains(b"gone").unwrap());
}

#[test]
fn iterate_reflects_buffered_writes_on_an_unbucketed_map() {
    let map = KeyValueMap::create_unbucketed(env(), "plain", false).unwrap();
    map.set(b"a", b"1".to_vec()).unwrap();
    map.set(b"b", b"2".to_vec()).unwrap();
    let pairs = map.iterate().unwrap();
    assert_eq!(pairs, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
}

#[test]
fn a_tagged_ref_value_round_trips_through_a_map_used_as_an_index() {
    let map = KeyValueMap::create_bucketed(env(), "index", 4, false).unwrap();
    map.set(b"level-0", codec::encode(&codec::Value::Ref("node_hashes".to_string()))).unwrap();
    map.flush(false).unwrap();
    let raw = map.get(b"level-0").unwrap();
    assert_eq!(codec::decode(&raw).unwrap(), codec::Value::Ref("node_hashes".to_string()));
}
