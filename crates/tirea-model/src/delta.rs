//! Structural difference between two values, expressed as replayable
//! statements.
//!
//! ```
//! use tirea_model::{delta, Container, ModelExt, Value};
//! use serde_json::json;
//!
//! let model = Container::new(json!({"a": {"b": 1, "c": 2}})).unwrap();
//! let target = Value::from(json!({"a": {"b": 1, "c": 3}}));
//! let ops = delta(&model.snapshot().unwrap(), &target).unwrap();
//! model.update(|s| s.replay(ops.clone())).unwrap();
//! assert_eq!(model.snapshot().unwrap(), target);
//! ```

use crate::error::{ModelError, ModelResult};
use crate::op::{value_changed, Method};
use crate::{Op, Seg, Value};

/// Compute the statements that turn `base` into `new`.
///
/// Maps are compared key by key and equal-length lists index by index.
/// Scalars and values whose kind changed are assigned at their parent key or
/// index. Keys missing from `new` are removed; lists whose length changed are
/// cleared and refilled. Both roots must be of the same structured kind.
pub fn delta(base: &Value, new: &Value) -> ModelResult<Vec<Op>> {
    if !base.is_structured() {
        return Err(ModelError::invalid_state_type(base.type_name()));
    }
    if !same_structure(base, new) {
        return Err(ModelError::invalid_state_type(new.type_name()));
    }
    let mut out = Vec::new();
    diff(base, new, &mut Vec::new(), &mut out);
    Ok(out)
}

fn same_structure(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Map(_), Value::Map(_)) | (Value::List(_), Value::List(_))
    )
}

fn statement(prefix: &[Op], last: Op, out: &mut Vec<Op>) {
    out.extend_from_slice(prefix);
    out.push(last);
}

fn diff(base: &Value, new: &Value, prefix: &mut Vec<Op>, out: &mut Vec<Op>) {
    match (base, new) {
        (Value::Map(old), Value::Map(next)) => {
            for (key, old_value) in old {
                match next.get(key) {
                    Some(new_value) => {
                        child(Seg::key(key.as_str()), old_value, new_value, prefix, out)
                    }
                    None => statement(
                        prefix,
                        Op::invoke(Method::Remove, vec![Value::from(key.as_str())]),
                        out,
                    ),
                }
            }
            for (key, new_value) in next {
                if !old.contains_key(key) {
                    statement(prefix, Op::write_index(key.as_str(), new_value.clone()), out);
                }
            }
        }
        (Value::List(old), Value::List(next)) if old.len() == next.len() => {
            for (i, (old_value, new_value)) in old.iter().zip(next).enumerate() {
                child(Seg::Index(i), old_value, new_value, prefix, out);
            }
        }
        (Value::List(old), Value::List(next)) => {
            if !old.is_empty() {
                statement(prefix, Op::invoke(Method::Clear, Vec::new()), out);
            }
            if !next.is_empty() {
                statement(
                    prefix,
                    Op::invoke(Method::Extend, vec![Value::List(next.clone())]),
                    out,
                );
            }
        }
        // Callers only descend into matching structures.
        _ => {}
    }
}

fn child(seg: Seg, old: &Value, new: &Value, prefix: &mut Vec<Op>, out: &mut Vec<Op>) {
    if !value_changed(old, new) {
        return;
    }
    if same_structure(old, new) {
        prefix.push(Op::read_index(seg));
        diff(old, new, prefix, out);
        prefix.pop();
    } else {
        statement(prefix, Op::write_index(seg, new.clone()), out);
    }
}
