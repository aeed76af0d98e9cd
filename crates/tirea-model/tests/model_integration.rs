//! Integration tests for Container observation, updates and restores.
//!
//! These tests drive the public API the way an application would: observe
//! paths, mutate through recorded updates, and check which observers ran and
//! in what order.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use tirea_model::{delta, Container, ContainerConfig, ModelError, ModelExt, Recorder, Value};

// ============================================================================
// Helpers
// ============================================================================

type Log = Rc<RefCell<Vec<(String, Value)>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn tagged(log: &Log, tag: &str) -> impl Fn(&Value) + 'static {
    let log = log.clone();
    let tag = tag.to_string();
    move |v: &Value| log.borrow_mut().push((tag.clone(), v.clone()))
}

fn tags(log: &Log) -> Vec<String> {
    log.borrow().iter().map(|(t, _)| t.clone()).collect()
}

fn values(log: &Log) -> Vec<Value> {
    log.borrow().iter().map(|(_, v)| v.clone()).collect()
}

// ============================================================================
// Basic observation
// ============================================================================

#[test]
fn test_snapshot_restore_scenario() {
    let model = Container::new(json!({"value": 0, "d": {}})).unwrap();
    let log = new_log();
    let _t = model.observe(|s| s.field("value"), tagged(&log, "value"));
    assert_eq!(values(&log), vec![Value::Int(0)]);

    model.update_fields([("value", 25)]).unwrap();
    assert_eq!(values(&log).last(), Some(&Value::Int(25)));
    let snapshot = model.snapshot().unwrap();

    model.update_fields([("value", 0)]).unwrap();
    assert_eq!(values(&log).last(), Some(&Value::Int(0)));
    assert_eq!(model.snapshot_of(|s| s.field("value")).unwrap(), Value::Int(0));

    model.restore(snapshot).unwrap();
    assert_eq!(
        values(&log),
        vec![Value::Int(0), Value::Int(25), Value::Int(0), Value::Int(25)]
    );
}

#[test]
fn test_snapshot_subtree_and_partial_restore() {
    let model = Container::new(json!({"value": 0})).unwrap();
    model.update_fields([("value", 42)]).unwrap();
    let snapshot = model.snapshot_of(|s| s.field("value")).unwrap();
    model.update_fields([("value", 69)]).unwrap();
    assert_eq!(snapshot, Value::Int(42));

    let log = new_log();
    let _t = model.observe(|s| s.field("value"), tagged(&log, "value"));
    assert_eq!(values(&log), vec![Value::Int(69)]);

    model.restore_of(snapshot.clone(), |s| s.field("value")).unwrap();
    assert_eq!(values(&log), vec![Value::Int(69), Value::Int(42)]);

    // Restoring the same value again is silent.
    model.restore_of(snapshot, |s| s.field("value")).unwrap();
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn test_root_observer_sees_whole_state() {
    let model = Container::new(json!({"value": 0})).unwrap();
    let log = new_log();
    let _t = model.observe(|s| s.clone(), tagged(&log, "root"));
    model.update_fields([("value", 12)]).unwrap();
    assert_eq!(
        values(&log),
        vec![
            Value::from(json!({"value": 0})),
            Value::from(json!({"value": 12}))
        ]
    );
}

#[test]
fn test_no_change_no_notification() {
    let model = Container::new(json!({"value": 0})).unwrap();
    let log = new_log();
    let _root = model.observe(|s| s.clone(), tagged(&log, "root"));
    let _value = model.observe(|s| s.field("value"), tagged(&log, "value"));
    log.borrow_mut().clear();

    model.update_fields([("value", 0)]).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_nan_overwritten_by_nan_is_silent() {
    let model = Container::new(Value::from_iter([("value", Value::Float(f64::NAN))])).unwrap();
    let log = new_log();
    let _t = model.observe(|s| s.field("value"), tagged(&log, "value"));
    assert_eq!(log.borrow().len(), 1);
    assert!(values(&log)[0].is_nan());

    model.update_fields([("value", f64::NAN)]).unwrap();
    assert_eq!(log.borrow().len(), 1);

    model.update_fields([("value", 1.0)]).unwrap();
    assert_eq!(values(&log).last(), Some(&Value::Float(1.0)));
}

// ============================================================================
// Absent paths
// ============================================================================

#[test]
fn test_observe_absent_key_registers_without_initial_call() {
    let model = Container::new(json!({"value": 0, "d": {}})).unwrap();
    let early = new_log();
    let _early = model.observe(|s| s.field("d").index("key"), tagged(&early, "early"));
    assert!(early.borrow().is_empty());

    model.update(|s| s.field("d").set_index("key", "v")).unwrap();
    assert_eq!(values(&early), vec![Value::from("v")]);

    let late = new_log();
    let _late = model.observe(|s| s.field("d").index("key"), tagged(&late, "late"));
    assert_eq!(values(&late), vec![Value::from("v")]);

    model.update(|s| s.field("d").set_index("key", "v2")).unwrap();
    assert_eq!(values(&early).last(), Some(&Value::from("v2")));
    assert_eq!(values(&late).last(), Some(&Value::from("v2")));
}

#[test]
fn test_snapshot_of_missing_path_fails() {
    let model = Container::new(json!({"d": {}})).unwrap();
    match model.snapshot_of(|s| s.field("d").index("key")).unwrap_err() {
        ModelError::MissingPathElement { path } => assert_eq!(path.to_string(), "$.d.key"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_removed_subtree_is_skipped_on_notify() {
    let model = Container::new(json!({"d": {"k": {"x": 1}}})).unwrap();
    let log = new_log();
    let _d = model.observe(|s| s.field("d"), tagged(&log, "d"));
    let _x = model.observe(|s| s.field("d").field("k").field("x"), tagged(&log, "x"));
    log.borrow_mut().clear();

    model.update(|s| s.field("d").remove("k")).unwrap();
    assert_eq!(tags(&log), vec!["d"]);
}

// ============================================================================
// Notification order
// ============================================================================

#[test]
fn test_nested_update_notification_order() {
    let model = Container::new(json!({"a": {"b": [{"c": 1}]}, "x": 0})).unwrap();
    let log = new_log();
    let _t = [
        model.observe(|s| s.field("a").field("b").index(0usize).field("c"), tagged(&log, "c")),
        model.observe(|s| s.field("x"), tagged(&log, "x")),
        model.observe(|s| s.field("a").field("b"), tagged(&log, "b")),
        model.observe(|s| s.clone(), tagged(&log, "root")),
        model.observe(|s| s.field("a"), tagged(&log, "a")),
        model.observe(|s| s.field("a").field("b").index(0usize), tagged(&log, "b0")),
    ];
    log.borrow_mut().clear();

    model
        .update(|s| {
            s.field("a")
                .field("b")
                .set_index(0usize, json!({"c": 2}));
        })
        .unwrap();

    assert_eq!(tags(&log), vec!["root", "a", "b", "b0", "c"]);
    assert_eq!(log.borrow().last().unwrap().1, Value::Int(2));
}

#[test]
fn test_root_fires_once_per_update() {
    let model = Container::new(json!({"a": 0, "b": 0})).unwrap();
    let log = new_log();
    let _root = model.observe(|s| s.clone(), tagged(&log, "root"));
    let _a = model.observe(|s| s.field("a"), tagged(&log, "a"));
    let _b = model.observe(|s| s.field("b"), tagged(&log, "b"));
    log.borrow_mut().clear();

    model.update_fields([("a", 1), ("b", 1)]).unwrap();
    assert_eq!(tags(&log), vec!["root", "a", "b"]);
}

#[test]
fn test_only_changed_statements_notify() {
    let model = Container::new(json!({"a": 0, "b": 0})).unwrap();
    let log = new_log();
    let _a = model.observe(|s| s.field("a"), tagged(&log, "a"));
    let _b = model.observe(|s| s.field("b"), tagged(&log, "b"));
    log.borrow_mut().clear();

    model.update_fields([("a", 0), ("b", 7)]).unwrap();
    assert_eq!(tags(&log), vec!["b"]);
}

#[test]
fn test_whole_restore_fires_every_node() {
    let model = Container::new(json!({"a": {"b": 1}, "c": [1, 2]})).unwrap();
    let log = new_log();
    let _t = [
        model.observe(|s| s.clone(), tagged(&log, "root")),
        model.observe(|s| s.field("a"), tagged(&log, "a")),
        model.observe(|s| s.field("a").field("b"), tagged(&log, "b")),
        model.observe(|s| s.field("c").index(1usize), tagged(&log, "c1")),
    ];
    log.borrow_mut().clear();

    model.restore(json!({"a": {"b": 2}, "c": [1]})).unwrap();
    // c[1] no longer resolves and is skipped.
    assert_eq!(tags(&log), vec!["root", "a", "b"]);
}

// ============================================================================
// Re-entrancy and isolation
// ============================================================================

#[test]
fn test_handler_may_update_reentrantly() {
    let model = Container::new(json!({"value": 0, "mirror": 0})).unwrap();
    let weak = model.downgrade();
    let _sync = model.observe(
        |s| s.field("value"),
        move |v| {
            if let Some(model) = weak.upgrade() {
                let v = v.clone();
                model.update(|s| s.set("mirror", v.clone())).unwrap();
            }
        },
    );
    let log = new_log();
    let _mirror = model.observe(|s| s.field("mirror"), tagged(&log, "mirror"));

    model.update_fields([("value", 3)]).unwrap();
    assert_eq!(model.snapshot_of(|s| s.field("mirror")).unwrap(), Value::Int(3));
    assert_eq!(values(&log).last(), Some(&Value::Int(3)));
}

#[test]
fn test_handler_may_observe_reentrantly() {
    let model = Container::new(json!({"value": 0})).unwrap();
    let weak = model.downgrade();
    let late = new_log();
    let tokens = Rc::new(RefCell::new(Vec::new()));
    let _t = {
        let late = late.clone();
        let tokens = tokens.clone();
        model.observe(
            |s| s.field("value"),
            move |_| {
                if let Some(model) = weak.upgrade() {
                    let token = model.observe(|s| s.field("value"), tagged(&late, "late"));
                    tokens.borrow_mut().push(token);
                }
            },
        )
    };
    // The initial call already registered one late observer.
    assert_eq!(late.borrow().len(), 1);
    model.update_fields([("value", 1)]).unwrap();
    assert!(tokens.borrow().len() >= 2);
}

#[test]
fn test_panicking_observer_does_not_stop_others() {
    let model = Container::new(json!({"value": 0})).unwrap();
    let log = new_log();
    let calls = Rc::new(RefCell::new(0));
    let _bad = {
        let calls = calls.clone();
        model.observe(
            |s| s.field("value"),
            move |_| {
                *calls.borrow_mut() += 1;
                if *calls.borrow() > 1 {
                    panic!("observer failure");
                }
            },
        )
    };
    let _good = model.observe(|s| s.field("value"), tagged(&log, "good"));

    model.update_fields([("value", 1)]).unwrap();
    assert_eq!(values(&log).last(), Some(&Value::Int(1)));
}

#[test]
fn test_dropped_token_stops_notifications() {
    let model = Container::new(json!({"value": 0})).unwrap();
    let log = new_log();
    let token = model.observe(|s| s.field("value"), tagged(&log, "value"));
    drop(token);
    model.update_fields([("value", 1)]).unwrap();
    assert_eq!(log.borrow().len(), 1);
}

// ============================================================================
// Pruning
// ============================================================================

#[test]
fn test_prune_keeps_observed_paths() {
    let model = Container::new(json!({"a": {"b": 1, "c": 2}})).unwrap();
    let log = new_log();
    let keep = model.observe(|s| s.field("a").field("b"), tagged(&log, "b"));
    let gone = model.observe(|s| s.field("a").field("c"), tagged(&log, "c"));
    assert_eq!(model.node_count(), 4);

    drop(gone);
    assert_eq!(model.prune(), 1);
    assert_eq!(model.node_count(), 3);

    model.update(|s| s.field("a").set("b", 5)).unwrap();
    assert_eq!(values(&log).last(), Some(&Value::Int(5)));

    drop(keep);
    model.prune();
    assert_eq!(model.node_count(), 1);
}

#[test]
fn test_config_from_json() {
    let config = ContainerConfig::from_json(r#"{"name": "app", "auto_prune": true}"#).unwrap();
    let model = Container::with_config(json!({}), config).unwrap();
    assert_eq!(model.name(), "app");
    assert!(model.config().auto_prune);
}

// ============================================================================
// Delta replay
// ============================================================================

#[test]
fn test_delta_replay_touches_only_changed_paths() {
    let model = Container::new(json!({"a": {"x": 1}, "b": {"y": 2}, "l": [1, 2]})).unwrap();
    let log = new_log();
    let _x = model.observe(|s| s.field("a").field("x"), tagged(&log, "a.x"));
    let _y = model.observe(|s| s.field("b").field("y"), tagged(&log, "b.y"));
    let _l = model.observe(|s| s.field("l"), tagged(&log, "l"));
    log.borrow_mut().clear();

    let target = Value::from(json!({"a": {"x": 5}, "b": {"y": 2}, "l": [1, 2, 3]}));
    let ops = delta(&model.snapshot().unwrap(), &target).unwrap();
    model.update(|s: &Recorder| s.replay(ops.clone())).unwrap();

    assert_eq!(model.snapshot().unwrap(), target);
    let touched = tags(&log);
    assert!(touched.contains(&"a.x".to_string()));
    assert!(touched.contains(&"l".to_string()));
    assert!(!touched.contains(&"b.y".to_string()));
}

// ============================================================================
// Typed models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    font_size: i64,
}

#[test]
fn test_typed_round_trip() {
    let settings = Settings {
        theme: "dark".into(),
        font_size: 12,
    };
    let model = Container::from_model(&settings).unwrap();
    model.update_fields([("font_size", 14)]).unwrap();
    let typed: Settings = model.snapshot_as().unwrap();
    assert_eq!(
        typed,
        Settings {
            theme: "dark".into(),
            font_size: 14
        }
    );
}
