//! Recorded access operations.
//!
//! An [`Op`] is one step of a recorded path: a read that moves a cursor into
//! a child value, or a write that mutates the value under the cursor and ends
//! the statement. Every operation also knows the tree-edge key ([`Seg`]) it
//! addresses, and how to re-derive its value from a parent value.

use crate::error::{ModelError, ModelResult};
use crate::{Path, Seg, Value};

/// Built-in mutating methods available to [`Op::Invoke`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `list.push(value)`
    Push,
    /// `list.pop()`
    Pop,
    /// `list.insert(index, value)` or `map.insert(key, value)`
    Insert,
    /// `list.remove(index)` or `map.remove(key)`
    Remove,
    /// `list.clear()` or `map.clear()`
    Clear,
    /// `list.extend(values)`
    Extend,
}

impl Method {
    /// Method name, used as the edge key of the invocation node.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Method::Push => "push",
            Method::Pop => "pop",
            Method::Insert => "insert",
            Method::Remove => "remove",
            Method::Clear => "clear",
            Method::Extend => "extend",
        }
    }
}

/// A single recorded access step.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Read a record field.
    ReadField {
        /// Field name.
        key: String,
    },

    /// Assign a record field. Ends the statement.
    WriteField {
        /// Field name.
        key: String,
        /// Value to assign.
        value: Value,
    },

    /// Read a map key or list index.
    ReadIndex {
        /// Key (maps) or index (lists).
        index: Seg,
    },

    /// Assign a map key or list index. Ends the statement.
    WriteIndex {
        /// Key (maps) or index (lists).
        index: Seg,
        /// Value to assign.
        value: Value,
    },

    /// Call a built-in method on the value under the cursor. Ends the
    /// statement.
    Invoke {
        /// Method to call.
        method: Method,
        /// Positional arguments.
        args: Vec<Value>,
    },
}

/// Outcome of applying one operation to the value under the cursor.
#[derive(Debug)]
pub enum Step<'v> {
    /// A read: the cursor moves to the child value.
    Descend(&'v mut Value),
    /// A write: the statement ended, `changed` tells whether the state moved.
    Wrote {
        /// Whether the write altered the state.
        changed: bool,
    },
}

impl Op {
    /// Create a ReadField operation.
    #[inline]
    pub fn read_field(key: impl Into<String>) -> Self {
        Op::ReadField { key: key.into() }
    }

    /// Create a WriteField operation.
    #[inline]
    pub fn write_field(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Op::WriteField {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a ReadIndex operation.
    #[inline]
    pub fn read_index(index: impl Into<Seg>) -> Self {
        Op::ReadIndex {
            index: index.into(),
        }
    }

    /// Create a WriteIndex operation.
    #[inline]
    pub fn write_index(index: impl Into<Seg>, value: impl Into<Value>) -> Self {
        Op::WriteIndex {
            index: index.into(),
            value: value.into(),
        }
    }

    /// Create an Invoke operation.
    #[inline]
    pub fn invoke(method: Method, args: Vec<Value>) -> Self {
        Op::Invoke { method, args }
    }

    /// The tree-edge key this operation addresses.
    ///
    /// Field access and string-keyed index access share a key, so
    /// `field("a")` and `index("a")` reach the same node.
    pub fn key(&self) -> Seg {
        match self {
            Op::ReadField { key } | Op::WriteField { key, .. } => Seg::Key(key.clone()),
            Op::ReadIndex { index } | Op::WriteIndex { index, .. } => index.clone(),
            Op::Invoke { method, .. } => Seg::Call(method.name()),
        }
    }

    /// Returns true for `ReadField` and `ReadIndex`.
    #[inline]
    pub fn is_read(&self) -> bool {
        matches!(self, Op::ReadField { .. } | Op::ReadIndex { .. })
    }

    /// Returns true for operations that terminate a statement.
    #[inline]
    pub fn is_write(&self) -> bool {
        !self.is_read()
    }

    /// Get the operation name.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Op::ReadField { .. } => "read_field",
            Op::WriteField { .. } => "write_field",
            Op::ReadIndex { .. } => "read_index",
            Op::WriteIndex { .. } => "write_index",
            Op::Invoke { .. } => "invoke",
        }
    }

    /// The read form of this operation, stored on subscription nodes.
    pub fn as_read(&self) -> Op {
        match self {
            Op::WriteField { key, .. } => Op::ReadField { key: key.clone() },
            Op::WriteIndex { index, .. } => Op::ReadIndex {
                index: index.clone(),
            },
            other => other.clone(),
        }
    }

    /// The write form of a read: assign `value` where this op reads.
    ///
    /// Returns `None` for invocations, which have no assignable target.
    pub fn into_write(self, value: Value) -> Option<Op> {
        match self {
            Op::ReadField { key } | Op::WriteField { key, .. } => {
                Some(Op::WriteField { key, value })
            }
            Op::ReadIndex { index } | Op::WriteIndex { index, .. } => {
                Some(Op::WriteIndex { index, value })
            }
            Op::Invoke { .. } => None,
        }
    }

    /// Pure read: derive this step's value from its parent value.
    ///
    /// Writes read the slot they assign; invocations read their receiver.
    pub fn read<'v>(&self, target: &'v Value) -> ModelResult<&'v Value> {
        match self {
            Op::ReadField { key } | Op::WriteField { key, .. } => field(target, key),
            Op::ReadIndex { index } | Op::WriteIndex { index, .. } => lookup(target, index),
            Op::Invoke { .. } => Ok(target),
        }
    }

    /// Apply this operation to the value under the cursor.
    pub fn step<'v>(&self, target: &'v mut Value) -> ModelResult<Step<'v>> {
        match self {
            Op::ReadField { key } => field_mut(target, key).map(Step::Descend),
            Op::ReadIndex { index } => lookup_mut(target, index).map(Step::Descend),
            Op::WriteField { key, value } => {
                assign_key(target, key, value).map(|changed| Step::Wrote { changed })
            }
            Op::WriteIndex { index, value } => {
                assign(target, index, value).map(|changed| Step::Wrote { changed })
            }
            Op::Invoke { method, args } => {
                invoke(target, *method, args).map(|changed| Step::Wrote { changed })
            }
        }
    }
}

/// Change rule for an assignment over an existing value.
///
/// Deep inequality, except that `NaN` overwritten by `NaN` is no change.
#[inline]
pub fn value_changed(old: &Value, new: &Value) -> bool {
    if old.is_nan() {
        !new.is_nan()
    } else {
        old != new
    }
}

fn seg_path(seg: Seg) -> Path {
    Path::from(seg)
}

fn field<'v>(target: &'v Value, key: &str) -> ModelResult<&'v Value> {
    match target {
        Value::Map(map) => map
            .get(key)
            .ok_or_else(|| ModelError::missing(seg_path(Seg::key(key)))),
        other => Err(ModelError::type_mismatch(
            seg_path(Seg::key(key)),
            "map",
            other.type_name(),
        )),
    }
}

fn field_mut<'v>(target: &'v mut Value, key: &str) -> ModelResult<&'v mut Value> {
    match target {
        Value::Map(map) => map
            .get_mut(key)
            .ok_or_else(|| ModelError::missing(seg_path(Seg::key(key)))),
        other => Err(ModelError::type_mismatch(
            seg_path(Seg::key(key)),
            "map",
            other.type_name(),
        )),
    }
}

fn lookup<'v>(target: &'v Value, index: &Seg) -> ModelResult<&'v Value> {
    match (index, target) {
        (Seg::Key(key), _) => field(target, key),
        (Seg::Index(i), Value::List(items)) => items
            .get(*i)
            .ok_or_else(|| ModelError::missing(seg_path(index.clone()))),
        (Seg::Index(_), other) => Err(ModelError::type_mismatch(
            seg_path(index.clone()),
            "list",
            other.type_name(),
        )),
        (Seg::Call(_), _) => Err(ModelError::invalid_operation(format!(
            "`{index}` is not an index"
        ))),
    }
}

fn lookup_mut<'v>(target: &'v mut Value, index: &Seg) -> ModelResult<&'v mut Value> {
    match (index, target) {
        (Seg::Key(key), target) => field_mut(target, key),
        (Seg::Index(i), Value::List(items)) => items
            .get_mut(*i)
            .ok_or_else(|| ModelError::missing(seg_path(index.clone()))),
        (Seg::Index(_), other) => Err(ModelError::type_mismatch(
            seg_path(index.clone()),
            "list",
            other.type_name(),
        )),
        (Seg::Call(_), _) => Err(ModelError::invalid_operation(format!(
            "`{index}` is not an index"
        ))),
    }
}

fn assign_key(target: &mut Value, key: &str, value: &Value) -> ModelResult<bool> {
    let map = match target {
        Value::Map(map) => map,
        other => {
            return Err(ModelError::type_mismatch(
                seg_path(Seg::key(key)),
                "map",
                other.type_name(),
            ))
        }
    };
    let changed = map.get(key).map_or(true, |old| value_changed(old, value));
    if changed {
        map.insert(key.to_owned(), value.clone());
    }
    Ok(changed)
}

fn assign(target: &mut Value, index: &Seg, value: &Value) -> ModelResult<bool> {
    match (index, target) {
        (Seg::Key(key), target) => assign_key(target, key, value),
        (Seg::Index(i), Value::List(items)) => {
            let slot = items
                .get_mut(*i)
                .ok_or_else(|| ModelError::missing(seg_path(index.clone())))?;
            let changed = value_changed(slot, value);
            if changed {
                *slot = value.clone();
            }
            Ok(changed)
        }
        (Seg::Index(_), other) => Err(ModelError::type_mismatch(
            seg_path(index.clone()),
            "list",
            other.type_name(),
        )),
        (Seg::Call(_), _) => Err(ModelError::invalid_operation(format!(
            "`{index}` is not an index"
        ))),
    }
}

fn arity(method: Method, args: &[Value], expected: usize) -> ModelResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ModelError::invalid_operation(format!(
            "{}() takes {} argument(s), got {}",
            method.name(),
            expected,
            args.len()
        )))
    }
}

fn list_position(method: Method, arg: &Value) -> ModelResult<usize> {
    arg.as_i64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| {
            ModelError::invalid_operation(format!(
                "{}() on a list needs a non-negative integer index, got {}",
                method.name(),
                arg
            ))
        })
}

fn map_key(method: Method, arg: &Value) -> ModelResult<&str> {
    arg.as_str().ok_or_else(|| {
        ModelError::invalid_operation(format!(
            "{}() on a map needs a string key, got {}",
            method.name(),
            arg
        ))
    })
}

fn invoke(target: &mut Value, method: Method, args: &[Value]) -> ModelResult<bool> {
    let mismatch = |expected: &'static str, found: &Value| {
        ModelError::type_mismatch(
            seg_path(Seg::Call(method.name())),
            expected,
            found.type_name(),
        )
    };

    match (method, target) {
        (Method::Push, Value::List(items)) => {
            arity(method, args, 1)?;
            items.push(args[0].clone());
            Ok(true)
        }
        (Method::Pop, Value::List(items)) => {
            arity(method, args, 0)?;
            Ok(items.pop().is_some())
        }
        (Method::Insert, Value::List(items)) => {
            arity(method, args, 2)?;
            let at = list_position(method, &args[0])?;
            if at > items.len() {
                return Err(ModelError::missing(seg_path(Seg::Index(at))));
            }
            items.insert(at, args[1].clone());
            Ok(true)
        }
        (Method::Insert, Value::Map(map)) => {
            arity(method, args, 2)?;
            let key = map_key(method, &args[0])?;
            let changed = map.get(key).map_or(true, |old| value_changed(old, &args[1]));
            if changed {
                map.insert(key.to_owned(), args[1].clone());
            }
            Ok(changed)
        }
        (Method::Remove, Value::List(items)) => {
            arity(method, args, 1)?;
            let at = list_position(method, &args[0])?;
            if at < items.len() {
                items.remove(at);
                Ok(true)
            } else {
                Ok(false)
            }
        }
        (Method::Remove, Value::Map(map)) => {
            arity(method, args, 1)?;
            let key = map_key(method, &args[0])?;
            Ok(map.shift_remove(key).is_some())
        }
        (Method::Clear, Value::List(items)) => {
            arity(method, args, 0)?;
            let changed = !items.is_empty();
            items.clear();
            Ok(changed)
        }
        (Method::Clear, Value::Map(map)) => {
            arity(method, args, 0)?;
            let changed = !map.is_empty();
            map.clear();
            Ok(changed)
        }
        (Method::Extend, Value::List(items)) => {
            arity(method, args, 1)?;
            let extra = args[0]
                .as_list()
                .ok_or_else(|| mismatch("list", &args[0]))?;
            items.extend(extra.iter().cloned());
            Ok(!extra.is_empty())
        }
        (Method::Insert | Method::Remove | Method::Clear, other) => {
            Err(mismatch("list or map", other))
        }
        (Method::Push | Method::Pop | Method::Extend, other) => Err(mismatch("list", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        Value::from(json!({"value": 0, "d": {"k": "v"}, "items": [1, 2, 3]}))
    }

    fn wrote(step: Step<'_>) -> bool {
        match step {
            Step::Wrote { changed } => changed,
            Step::Descend(_) => panic!("expected a write"),
        }
    }

    #[test]
    fn test_keys() {
        assert_eq!(Op::read_field("a").key(), Seg::key("a"));
        assert_eq!(Op::read_index("a").key(), Seg::key("a"));
        assert_eq!(Op::write_index(2usize, 1).key(), Seg::Index(2));
        assert_eq!(Op::invoke(Method::Push, vec![]).key(), Seg::Call("push"));
    }

    #[test]
    fn test_read() {
        let d = doc();
        assert_eq!(Op::read_field("value").read(&d).unwrap(), &Value::Int(0));
        let items = Op::read_field("items").read(&d).unwrap();
        assert_eq!(Op::read_index(1usize).read(items).unwrap(), &Value::Int(2));
        assert!(Op::read_index(7usize).read(items).is_err());
        let err = Op::read_field("missing").read(&d).unwrap_err();
        assert!(matches!(err, ModelError::MissingPathElement { .. }));
        let err = Op::read_field("x").read(&Value::Int(1)).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }

    #[test]
    fn test_write_detects_change() {
        let mut d = doc();
        assert!(!wrote(Op::write_field("value", 0).step(&mut d).unwrap()));
        assert!(wrote(Op::write_field("value", 5).step(&mut d).unwrap()));
        assert_eq!(d.get("value"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_write_absent_key_is_change() {
        let mut d = doc();
        assert!(wrote(Op::write_field("fresh", Value::Null).step(&mut d).unwrap()));
        assert_eq!(d.get("fresh"), Some(&Value::Null));
    }

    #[test]
    fn test_nan_rule() {
        let mut d = Value::from_iter([("value", Value::Float(f64::NAN))]);
        assert!(!wrote(Op::write_field("value", f64::NAN).step(&mut d).unwrap()));
        assert!(wrote(Op::write_field("value", 1.0).step(&mut d).unwrap()));
        assert!(wrote(Op::write_field("value", f64::NAN).step(&mut d).unwrap()));
        assert!(value_changed(&Value::Float(1.0), &Value::Float(f64::NAN)));
    }

    #[test]
    fn test_write_index_out_of_bounds() {
        let mut items = Value::from(vec![1, 2]);
        let err = Op::write_index(2usize, 9).step(&mut items).unwrap_err();
        assert!(matches!(err, ModelError::MissingPathElement { .. }));
    }

    #[test]
    fn test_invoke_list_methods() {
        let mut items = Value::from(vec![1, 2]);
        assert!(wrote(Op::invoke(Method::Push, vec![3.into()]).step(&mut items).unwrap()));
        assert!(wrote(
            Op::invoke(Method::Insert, vec![0.into(), 0.into()])
                .step(&mut items)
                .unwrap()
        ));
        assert_eq!(items, Value::from(vec![0, 1, 2, 3]));
        assert!(wrote(Op::invoke(Method::Remove, vec![1.into()]).step(&mut items).unwrap()));
        assert!(!wrote(Op::invoke(Method::Remove, vec![9.into()]).step(&mut items).unwrap()));
        assert!(wrote(Op::invoke(Method::Pop, vec![]).step(&mut items).unwrap()));
        assert_eq!(items, Value::from(vec![0, 2]));
        assert!(wrote(Op::invoke(Method::Clear, vec![]).step(&mut items).unwrap()));
        assert!(!wrote(Op::invoke(Method::Clear, vec![]).step(&mut items).unwrap()));
        assert!(!wrote(Op::invoke(Method::Pop, vec![]).step(&mut items).unwrap()));
    }

    #[test]
    fn test_invoke_map_methods() {
        let mut d = Value::from(json!({"a": 1}));
        assert!(!wrote(Op::invoke(Method::Remove, vec!["zz".into()]).step(&mut d).unwrap()));
        assert!(wrote(
            Op::invoke(Method::Insert, vec!["b".into(), 2.into()])
                .step(&mut d)
                .unwrap()
        ));
        assert!(wrote(Op::invoke(Method::Remove, vec!["a".into()]).step(&mut d).unwrap()));
        assert_eq!(d, Value::from(json!({"b": 2})));
    }

    #[test]
    fn test_invoke_rejects_bad_arguments() {
        let mut items = Value::from(vec![1]);
        let err = Op::invoke(Method::Push, vec![]).step(&mut items).unwrap_err();
        assert!(matches!(err, ModelError::InvalidOperation { .. }));
        let mut scalar = Value::Int(1);
        let err = Op::invoke(Method::Push, vec![1.into()]).step(&mut scalar).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }

    #[test]
    fn test_read_and_write_forms() {
        let w = Op::write_field("a", 1);
        assert_eq!(w.as_read(), Op::read_field("a"));
        assert_eq!(Op::read_index(0usize).into_write(5.into()), Some(Op::write_index(0usize, 5)));
        assert_eq!(Op::invoke(Method::Pop, vec![]).into_write(Value::Null), None);
        assert!(Op::read_field("a").is_read());
        assert!(Op::invoke(Method::Pop, vec![]).is_write());
    }
}
