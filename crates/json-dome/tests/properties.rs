use json_dome::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};

fn chunk() -> impl Strategy<Value = Chunk> {
    prop_oneof![
        "[a-z_][a-z0-9_]{0,5}".prop_map(Chunk::Key),
        (0usize..40).prop_map(Chunk::Index),
    ]
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-50i64..50).prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,3}", inner), 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

#[derive(Debug, Clone)]
enum Step {
    Set(&'static str, Value),
    Del(&'static str),
    Inc(&'static str, i64),
    Push(&'static str, Value),
    Pop(&'static str),
    Unshift(&'static str, Value),
    Splice(&'static str, i64, i64, Value),
    Fill(&'static str, Value, i64),
    Append(&'static str, Value),
    Reverse(&'static str),
    Sort(&'static str),
    Clear(&'static str),
}

fn target() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["", "a", "b.c", "list", "list[0]", "list[3]", "m.k[1]", "s"])
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (target(), value()).prop_map(|(p, v)| Step::Set(p, v)),
        target().prop_map(Step::Del),
        (target(), -5i64..5).prop_map(|(p, d)| Step::Inc(p, d)),
        (target(), scalar()).prop_map(|(p, v)| Step::Push(p, v)),
        target().prop_map(Step::Pop),
        (target(), scalar()).prop_map(|(p, v)| Step::Unshift(p, v)),
        (target(), -4i64..4, 0i64..3, scalar()).prop_map(|(p, s, d, v)| Step::Splice(p, s, d, v)),
        (target(), scalar(), -3i64..3).prop_map(|(p, v, s)| Step::Fill(p, v, s)),
        (target(), scalar()).prop_map(|(p, v)| Step::Append(p, v)),
        target().prop_map(Step::Reverse),
        target().prop_map(Step::Sort),
        target().prop_map(Step::Clear),
    ]
}

fn run(dome: &Dome, step: Step) {
    let outcome = match step {
        Step::Set(p, v) => dome.write(p).and_then(|w| w.set(v).map(drop)),
        Step::Del(p) => dome.write(p).and_then(|w| w.del().map(drop)),
        Step::Inc(p, d) => dome.write(p).and_then(|w| w.inc(d).map(drop)),
        Step::Push(p, v) => dome.write(p).and_then(|w| w.push([v]).map(drop)),
        Step::Pop(p) => dome.write(p).and_then(|w| w.pop().map(drop)),
        Step::Unshift(p, v) => dome.write(p).and_then(|w| w.unshift([v]).map(drop)),
        Step::Splice(p, s, d, v) => dome.write(p).and_then(|w| w.splice(s, Some(d), [v]).map(drop)),
        Step::Fill(p, v, s) => dome.write(p).and_then(|w| w.fill(v, Some(s), None).map(drop)),
        Step::Append(p, v) => dome.write(p).and_then(|w| w.append([v]).map(drop)),
        Step::Reverse(p) => dome.write(p).and_then(|w| w.reverse().map(drop)),
        Step::Sort(p) => dome.write(p).and_then(|w| w.sort().map(drop)),
        Step::Clear(p) => dome.write(p).and_then(|w| w.clear().map(drop)),
    };
    // Rejected steps leave no trace, so they are fine to ignore here.
    let _ = outcome;
}

proptest! {
    #[test]
    fn path_text_round_trips(chunks in prop::collection::vec(chunk(), 0..6)) {
        let path = Path::from_chunks(chunks.clone());
        let reparsed = Path::parse(path.as_str()).unwrap();
        prop_assert_eq!(reparsed.chunks(), chunks.as_slice());
        prop_assert_eq!(reparsed.as_str(), path.as_str());
    }

    #[test]
    fn set_then_read(chunks in prop::collection::vec(chunk(), 0..5), v in value()) {
        let dome = Dome::new(json!({}));
        let path = Path::from_chunks(chunks);
        dome.write(&path).unwrap().set(v.clone()).unwrap();
        let reader = dome.read(&path).unwrap();
        prop_assert!(reader.exists());
        prop_assert_eq!(reader.get(), Some(v));
    }

    #[test]
    fn replayed_diff_converges(
        initial in value(),
        steps in prop::collection::vec(step(), 0..24),
    ) {
        let source = Dome::new(initial.clone());
        for step in steps {
            run(&source, step);
        }

        let wire = serde_json::to_string(&source.extract_diff()).unwrap();
        let mut diff: Vec<DiffEntry> = serde_json::from_str(&wire).unwrap();
        let replica = Dome::new(initial);
        replica.apply_diff(&mut diff, false).unwrap();

        prop_assert_eq!(replica.value(), source.value());
    }

    #[test]
    fn balanced_snapshots_restore_state(
        initial in value(),
        depth in 1usize..4,
        steps in prop::collection::vec(step(), 0..8),
    ) {
        let dome = Dome::new(initial.clone());
        for _ in 0..depth {
            dome.snapshot().unwrap();
        }
        for step in steps {
            run(&dome, step);
        }
        for _ in 0..depth {
            dome.rollback().unwrap();
        }
        prop_assert_eq!(dome.value(), Some(initial));
        prop_assert!(!dome.has_diff());
        prop_assert!(dome.rollback().is_err());
    }
}
