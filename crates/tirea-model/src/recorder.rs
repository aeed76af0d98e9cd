//! Path recording against a stand-in value.
//!
//! A [`Recorder`] never touches real state. Calling its accessors appends
//! [`Op`]s to a log shared by every recorder derived from the same root, so a
//! caller can describe paths and mutations with ordinary method chains:
//!
//! ```
//! use tirea_model::{record_update, Op};
//!
//! let ops = record_update(|s| {
//!     s.field("todos").index(0usize).set("done", true);
//!     s.set("filter", "all");
//! });
//! assert_eq!(ops.len(), 4);
//! assert_eq!(ops[2], Op::write_field("done", true));
//! ```

use crate::error::{ModelError, ModelResult};
use crate::op::Method;
use crate::{Op, Path, Seg, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// A path function: describes a location by chaining reads on a stand-in.
pub type Lens<'a> = dyn Fn(&Recorder) -> Recorder + 'a;

/// Stand-in value that records accesses.
///
/// Reads return a new stand-in for chaining; writes end the chain.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    ops: Rc<RefCell<Vec<Op>>>,
}

impl Recorder {
    /// Create a recorder with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: Op) {
        self.ops.borrow_mut().push(op);
    }

    // ===== Reads =====

    /// Record a field read.
    pub fn field(&self, key: impl Into<String>) -> Recorder {
        self.record(Op::read_field(key));
        self.clone()
    }

    /// Record a key or index read.
    pub fn index(&self, index: impl Into<Seg>) -> Recorder {
        self.record(Op::read_index(index));
        self.clone()
    }

    // ===== Writes =====

    /// Record a field assignment.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.record(Op::write_field(key, value));
    }

    /// Record a key or index assignment.
    pub fn set_index(&self, index: impl Into<Seg>, value: impl Into<Value>) {
        self.record(Op::write_index(index, value));
    }

    /// Record a method invocation.
    pub fn call(&self, method: Method, args: Vec<Value>) {
        self.record(Op::invoke(method, args));
    }

    /// Record `list.push(value)`.
    pub fn push(&self, value: impl Into<Value>) {
        self.call(Method::Push, vec![value.into()]);
    }

    /// Record `list.pop()`.
    pub fn pop(&self) {
        self.call(Method::Pop, Vec::new());
    }

    /// Record `insert(index_or_key, value)` on a list or map.
    pub fn insert(&self, at: impl Into<Value>, value: impl Into<Value>) {
        self.call(Method::Insert, vec![at.into(), value.into()]);
    }

    /// Record `remove(index_or_key)` on a list or map.
    pub fn remove(&self, at: impl Into<Value>) {
        self.call(Method::Remove, vec![at.into()]);
    }

    /// Record `clear()` on a list or map.
    pub fn clear(&self) {
        self.call(Method::Clear, Vec::new());
    }

    /// Record `list.extend(values)`.
    pub fn extend<I, V>(&self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.call(Method::Extend, vec![Value::List(values)]);
    }

    /// Append a pre-built operation sequence, e.g. the output of
    /// [`delta`](crate::delta).
    pub fn replay(&self, ops: impl IntoIterator<Item = Op>) {
        self.ops.borrow_mut().extend(ops);
    }

    // ===== Log access =====

    /// Take the recorded operations, leaving the log empty.
    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.borrow().is_empty()
    }
}

/// The identity path function: the whole state.
pub fn root(r: &Recorder) -> Recorder {
    r.clone()
}

/// Record the operations a path function performs.
pub fn record_path(lens: &Lens<'_>) -> Vec<Op> {
    let recorder = Recorder::new();
    let _ = lens(&recorder);
    recorder.take_ops()
}

/// Record the operations an update callback performs.
pub fn record_update(mutator: impl FnOnce(&Recorder)) -> Vec<Op> {
    let recorder = Recorder::new();
    mutator(&recorder);
    recorder.take_ops()
}

/// Render the edge keys of an operation sequence as a path.
pub fn ops_path(ops: &[Op]) -> Path {
    ops.iter().map(Op::key).collect()
}

/// Split an operation sequence into statements, each ending in exactly one
/// write.
///
/// A trailing run of reads means the callback read a value and never wrote
/// it; that is a contract violation reported before anything is applied.
pub fn split_statements(ops: Vec<Op>) -> ModelResult<Vec<Vec<Op>>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();
    for op in ops {
        let ends = op.is_write();
        current.push(op);
        if ends {
            statements.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        return Err(ModelError::incomplete_statement(ops_path(&current)));
    }
    Ok(statements)
}
