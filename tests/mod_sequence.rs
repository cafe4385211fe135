use ledgerlite::engine::Environment;
use ledgerlite::store::sequence::OrderedSequence;
use tempfile::tempdir;

fn env() -> std::sync::Arc<Environment> {
    let dir = tempdir().unwrap();
    Environment::open(dir.keep(), 0, true, 16).unwrap()
}

#[test]
fn variable_length_sequence_round_trips_through_a_fresh_environment_handle() {
    let dir = tempdir().unwrap();
    let path = dir.keep();
    {
        let env = Environment::open(path.clone(), 0, true, 16).unwrap();
        let seq = OrderedSequence::create_variable_length(env, "log", 3).unwrap();
        for entry in ["short", "a bit longer", "x"] {
            seq.append(entry.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
    }
    let env2 = Environment::open(path, 0, true, 16).unwrap();
    let reopened = OrderedSequence::open(env2, "log").unwrap();
    assert_eq!(reopened.length(), 3);
    assert_eq!(
        reopened.iterate().unwrap(),
        vec![b"short".to_vec(), b"a bit longer".to_vec(), b"x".to_vec()]
    );
}

#[test]
fn appends_spanning_several_pages_preserve_index_order() {
    let seq = OrderedSequence::create_constant_length(env(), "pages", 4, 2).unwrap();
    let values: Vec<Vec<u8>> = (0..23u16).map(|i| i.to_be_bytes().to_vec()).collect();
    for v in &values {
        seq.append(v.clone()).unwrap();
    }
    seq.flush(false).unwrap();
    for (i, v) in values.iter().enumerate() {
        assert_eq!(&seq.get(i as i64).unwrap(), v);
    }
}

#[test]
fn reading_one_past_the_end_is_out_of_range() {
    let seq = OrderedSequence::create_unbatched(env(), "bounds").unwrap();
    seq.append(b"only".to_vec()).unwrap();
    seq.flush(false).unwrap();
    assert!(seq.get(1).is_err());
}
