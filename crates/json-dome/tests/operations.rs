use std::cell::{Cell, RefCell};
use std::rc::Rc;

use json_dome::prelude::*;
use serde_json::{json, Number, Value};

fn count_changes(dome: &Dome) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    let seen = count.clone();
    dome.on_change(move |_| seen.set(seen.get() + 1));
    count
}

#[test]
fn increments_and_decrements() {
    let dome = Dome::new(json!({"n": 10}));
    let n = dome.write("n").expect("path should parse");

    assert_eq!(n.inc(1).unwrap(), json!(11));
    assert_eq!(n.inc(9).unwrap(), json!(20));
    assert_eq!(n.dec(1).unwrap(), json!(19));
    assert_eq!(n.dec(9).unwrap(), json!(10));

    assert_eq!(dome.read("n").unwrap().get(), Some(json!(10)));
    assert_eq!(dome.peek_diff().len(), 4);
}

#[test]
fn fractional_increments() {
    let dome = Dome::new(json!({"n": 1}));
    let n = dome.write("n").unwrap();
    assert_eq!(n.inc(0.5).unwrap(), json!(1.5));
    assert!(n.inc(1).unwrap().is_f64());
    assert_eq!(n.dec(0.25f32).unwrap(), json!(2.25));

    let half = Number::from_f64(0.5).unwrap();
    assert_eq!(n.apply(Op::Inc(half)).unwrap(), Some(json!(2.75)));
    assert_eq!(dome.peek_diff().len(), 4);
}

#[test]
fn non_finite_deltas_are_rejected() {
    let dome = Dome::new(json!({"n": 1}));
    let n = dome.write("n").unwrap();
    for delta in [f64::NAN, f64::INFINITY] {
        let err = n.inc(delta).unwrap_err();
        assert!(matches!(err, DomeError::InvalidArgument { op: OpName::Inc, .. }));
    }
    assert!(n.dec(f64::NEG_INFINITY).is_err());
    assert_eq!(dome.value(), Some(json!({"n": 1})));
    assert!(!dome.has_diff());
}

#[test]
fn del_on_missing_path_is_a_no_op() {
    let dome = Dome::new(json!({"a": 1}));
    let changes = count_changes(&dome);

    assert_eq!(dome.write("nope").unwrap().del().unwrap(), None);
    assert_eq!(dome.write("x.y.z").unwrap().del().unwrap(), None);

    assert_eq!(dome.value(), Some(json!({"a": 1})));
    assert!(!dome.has_diff());
    assert_eq!(changes.get(), 0);
}

#[test]
fn del_removes_map_keys_and_splices_sequences() {
    let dome = Dome::new(json!({"m": {"a": 1, "b": 2}, "list": [1, 2, 3]}));
    assert_eq!(dome.write("m.a").unwrap().del().unwrap(), Some(json!(1)));
    assert_eq!(dome.write("list[0]").unwrap().del().unwrap(), Some(json!(1)));
    assert_eq!(dome.value(), Some(json!({"m": {"b": 2}, "list": [2, 3]})));

    assert_eq!(dome.del().unwrap(), Some(json!({"m": {"b": 2}, "list": [2, 3]})));
    assert_eq!(dome.value(), None);
    assert!(!dome.exists());
}

#[test]
fn del_keeps_the_order_of_remaining_keys() {
    let dome = Dome::new(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
    dome.write("a").unwrap().del().unwrap();
    dome.write("c").unwrap().del().unwrap();
    assert_eq!(serde_json::to_string(&dome).unwrap(), r#"{"b":2,"d":4}"#);

    dome.write("a").unwrap().set(json!(0)).unwrap();
    assert_eq!(serde_json::to_string(&dome).unwrap(), r#"{"b":2,"d":4,"a":0}"#);

    let replica = Dome::new(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
    replica.apply_diff(&mut dome.extract_diff(), false).unwrap();
    assert_eq!(serde_json::to_string(&replica).unwrap(), r#"{"b":2,"d":4,"a":0}"#);
}

#[test]
fn distant_indices_fail_without_side_effects() {
    let dome = Dome::new(json!({"a": [1]}));
    let changes = count_changes(&dome);
    dome.snapshot().unwrap();

    let err = dome
        .write("a[18446744073709551615]")
        .unwrap()
        .set(json!(1))
        .unwrap_err();
    assert!(matches!(err, DomeError::IndexTooFar { len: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    let err = dome.write("b[4000000000].c").unwrap().set(json!(1)).unwrap_err();
    assert!(matches!(err, DomeError::IndexTooFar { index: 4_000_000_000, len: 0 }));
    assert!(dome.write("a[4000000000]").unwrap().push([json!(1)]).is_err());

    assert_eq!(dome.value(), Some(json!({"a": [1]})));
    assert!(!dome.has_diff());
    assert_eq!(changes.get(), 0);
    assert_eq!(dome.snapshot_depth(), 0);

    assert_eq!(dome.write("a[4000000000]").unwrap().del().unwrap(), None);
    dome.write("a[3]").unwrap().set(json!(4)).unwrap();
    assert_eq!(dome.value(), Some(json!({"a": [1, null, null, 4]})));
}

#[test]
fn setting_an_equal_value_is_a_no_op() {
    let dome = Dome::new(json!({"a": {"b": [1, 2]}}));
    let changes = count_changes(&dome);

    assert_eq!(dome.write("a.b").unwrap().set(json!([1, 2.0])).unwrap(), json!([1, 2.0]));
    assert!(!dome.has_diff());
    assert_eq!(changes.get(), 0);

    dome.write("a.b").unwrap().set(json!([1, 3])).unwrap();
    assert_eq!(dome.peek_diff().len(), 1);
    assert_eq!(changes.get(), 1);
}

#[test]
fn set_then_get_at_deep_paths() {
    let dome = Dome::new(json!({}));
    dome.write("hello.world.foo[3].bar").unwrap().set(json!(true)).unwrap();

    assert_eq!(
        dome.value(),
        Some(json!({"hello": {"world": {"foo": [null, null, null, {"bar": true}]}}}))
    );
    let reader = dome.read("hello.world.foo[3].bar").unwrap();
    assert!(reader.exists());
    assert_eq!(reader.get(), Some(json!(true)));
}

#[test]
fn writes_replace_scalars_on_the_way() {
    let dome = Dome::new(json!({"a": "scalar"}));
    dome.write("a.b").unwrap().set(json!(1)).unwrap();
    assert_eq!(dome.value(), Some(json!({"a": {"b": 1}})));

    let dome = Dome::new(json!(null));
    dome.write("[1]").unwrap().set(json!("x")).unwrap();
    assert_eq!(dome.value(), Some(json!([null, "x"])));
}

#[test]
fn type_mismatches_name_the_operation() {
    let dome = Dome::new(json!({"s": "str", "n": 1, "m": {}}));

    let err = dome.write("s").unwrap().inc(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(err.to_string(), "cannot inc a value of type string");

    let err = dome.write("n").unwrap().push([json!(1)]).unwrap_err();
    assert_eq!(err.to_string(), "cannot push a value of type number");

    let err = dome.write("m").unwrap().reverse().unwrap_err();
    assert!(matches!(
        err,
        DomeError::TypeMismatch {
            op: OpName::Reverse,
            ..
        }
    ));

    let err = dome.write("missing").unwrap().clear().unwrap_err();
    assert_eq!(err.to_string(), "cannot clear a value of type absent");
}

#[test]
fn malformed_paths_are_rejected() {
    let dome = Dome::new(json!({}));
    for bad in ["a[", "a[x]", "a..b", "a[1]b"] {
        let err = dome.write(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathSyntax, "{bad}");
    }
}

#[test]
fn string_and_sequence_append() {
    let dome = Dome::new(json!({"s": "hello", "list": [1]}));
    assert_eq!(
        dome.write("s").unwrap().append([json!(", "), json!("world"), json!(1)]).unwrap(),
        json!("hello, world1")
    );
    assert_eq!(
        dome.write("list").unwrap().append([json!([2, 3]), json!(4)]).unwrap(),
        json!([1, 2, 3, 4])
    );
    assert!(dome.write("s").unwrap().append([json!([1])]).is_err());
}

#[test]
fn clear_maps_and_sequences() {
    let dome = Dome::new(json!({"m": {"a": 1}, "list": [1, 2], "empty": []}));
    let changes = count_changes(&dome);

    assert_eq!(dome.write("m").unwrap().clear().unwrap(), json!({}));
    assert_eq!(dome.write("list").unwrap().clear().unwrap(), json!([]));
    assert_eq!(dome.write("empty").unwrap().clear().unwrap(), json!([]));

    assert_eq!(dome.peek_diff().len(), 2);
    assert_eq!(changes.get(), 2);
}

#[test]
fn fill_with_negative_bounds() {
    let dome = Dome::new(json!([1, 2, 3, 4, 5]));
    assert_eq!(dome.fill(json!(0), Some(-3), Some(-1)).unwrap(), json!([1, 2, 0, 0, 5]));
    assert_eq!(dome.fill(json!("x"), None, None).unwrap(), json!(["x", "x", "x", "x", "x"]));

    let diff = dome.peek_diff();
    assert_eq!(diff[0].args, vec![json!(0), json!(2), json!(4)]);
    assert_eq!(diff[1].args, vec![json!("x"), json!(0), json!(5)]);
}

#[test]
fn splice_variants() {
    let dome = Dome::new(json!([1, 2, 3, 4, 5]));
    assert_eq!(dome.splice(1, Some(2), []).unwrap(), vec![json!(2), json!(3)]);
    assert_eq!(dome.splice(-1, None, [json!("a"), json!("b")]).unwrap(), vec![json!(5)]);
    assert_eq!(dome.splice(0, Some(0), [json!(0)]).unwrap(), Vec::<Value>::new());
    assert_eq!(dome.value(), Some(json!([0, 1, 4, "a", "b"])));
}

#[test]
fn sort_records_a_replayable_reposition() {
    let dome = Dome::new(json!([3, 1, 2]));
    assert_eq!(dome.sort().unwrap(), json!([1, 2, 3]));

    let diff = dome.extract_diff();
    assert_eq!(serde_json::to_value(&diff).unwrap(), json!([["reposition", [], [[1, 2, 0]]]]));

    let replica = Dome::new(json!([3, 1, 2]));
    let moves: Vec<usize> = serde_json::from_value(diff[0].args[0].clone()).unwrap();
    assert_eq!(replica.reposition(moves).unwrap(), json!([1, 2, 3]));
}

#[test]
fn sort_by_comparator_never_reaches_the_log() {
    let dome = Dome::new(json!({"list": [{"k": 2}, {"k": 3}, {"k": 1}]}));
    let ops = Rc::new(RefCell::new(Vec::new()));
    let seen = ops.clone();
    dome.on_change(move |ev| seen.borrow_mut().push(ev.op.op));

    let list = dome.write("list").unwrap();
    let sorted = list
        .sort_by(|a, b| b["k"].as_i64().cmp(&a["k"].as_i64()))
        .unwrap();
    assert_eq!(sorted, json!([{"k": 3}, {"k": 2}, {"k": 1}]));
    assert_eq!(*ops.borrow(), vec![OpName::Sort]);

    let mut diff = dome.extract_diff();
    assert_eq!(diff[0].op, OpName::Reposition);

    let replica = Dome::new(json!({"list": [{"k": 2}, {"k": 3}, {"k": 1}]}));
    replica.apply_diff(&mut diff, false).unwrap();
    assert_eq!(replica.value(), dome.value());
}

#[test]
fn sort_keeps_equal_elements_in_order() {
    let dome = Dome::new(json!([[1], "b", [1], null, "a"]));
    dome.sort().unwrap();
    assert_eq!(dome.value(), Some(json!([null, "a", "b", [1], [1]])));
    assert_eq!(dome.peek_diff()[0].args, vec![json!([3, 4, 1, 0, 2])]);
}

#[test]
fn reposition_rejects_non_permutations() {
    let dome = Dome::new(json!([1, 2, 3]));
    assert!(dome.reposition(vec![0, 1]).is_err());
    assert!(dome.reposition(vec![0, 1, 1]).is_err());
    assert!(dome.reposition(vec![0, 1, 3]).is_err());
    assert_eq!(dome.reposition(vec![2, 0, 1]).unwrap(), json!([3, 1, 2]));
}
