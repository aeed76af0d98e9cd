//! The state-owning model.
//!
//! A [`Container`] owns one structured [`Value`] and the subscription tree of
//! everything observed or written so far. Updates are recorded first, replayed
//! statement by statement against the state, and only the statements that
//! actually changed something are broadcast.
//!
//! Notification order for a changed statement `a.b[0] = x`:
//!
//! 1. the whole-state root, once per update;
//! 2. `$.a`, `$.a.b`, `$.a.b[0]`, each with its freshly read value;
//! 3. every existing node below `$.a.b[0]`, pre-order.
//!
//! A statement ending in a method call (`todos.insert(0, x)`) additionally
//! refreshes the other nodes below the receiver, since their positions may
//! have shifted.
//!
//! No borrow of the container is held while a handler runs, so handlers may
//! observe, update, or prune re-entrantly. Handlers that keep the container
//! alive should capture a [`WeakContainer`] to avoid a reference cycle.

use crate::broadcast::{Broadcast, Subscription, Token};
use crate::config::ContainerConfig;
use crate::error::{ModelError, ModelResult};
use crate::model::{Handler, Model, Wait};
use crate::op::Step;
use crate::recorder::{ops_path, record_path, split_statements, Lens, Recorder};
use crate::tree::{value_for, NodeId, NodeTree};
use crate::{Op, Path, Seg, Value};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

struct Inner {
    state: Value,
    tree: NodeTree,
    config: ContainerConfig,
}

/// Shared handle to an observable state value.
///
/// Cloning the handle shares the same state.
#[derive(Clone)]
pub struct Container {
    inner: Rc<RefCell<Inner>>,
}

/// Non-owning handle to a [`Container`].
#[derive(Clone)]
pub struct WeakContainer {
    inner: Weak<RefCell<Inner>>,
}

impl WeakContainer {
    pub fn upgrade(&self) -> Option<Container> {
        self.inner.upgrade().map(|inner| Container { inner })
    }
}

impl fmt::Debug for WeakContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Container {
    /// Create a container with the default configuration.
    ///
    /// The root must be a map or a list.
    pub fn new(state: impl Into<Value>) -> ModelResult<Self> {
        Self::with_config(state, ContainerConfig::default())
    }

    pub fn with_config(state: impl Into<Value>, config: ContainerConfig) -> ModelResult<Self> {
        let state = state.into();
        if !state.is_structured() {
            return Err(ModelError::invalid_state_type(state.type_name()));
        }
        let tree = NodeTree::new(config.name.clone());
        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                state,
                tree,
                config,
            })),
        })
    }

    /// Create a container from any serializable record.
    pub fn from_model<T: Serialize>(model: &T) -> ModelResult<Self> {
        Self::new(Value::from_model(model)?)
    }

    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn name(&self) -> String {
        self.inner.borrow().config.name.clone()
    }

    pub fn config(&self) -> ContainerConfig {
        self.inner.borrow().config.clone()
    }

    /// Number of live subscription nodes, root included.
    pub fn node_count(&self) -> usize {
        self.inner.borrow().tree.len()
    }

    /// Drop subscription nodes that have no observers and no observed
    /// descendants. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.tree.prune();
        if removed > 0 {
            tracing::debug!(model = %inner.config.name, removed, "pruned subscription nodes");
        }
        removed
    }

    fn channel_at(&self, lens: &Lens<'_>) -> Rc<Broadcast<Value>> {
        let ops = record_path(lens);
        let mut inner = self.inner.borrow_mut();
        let id = inner.tree.get_or_create(&ops);
        match inner.tree.channel(id) {
            Some(channel) => channel,
            None => unreachable!("get_or_create returns a live node"),
        }
    }

    // ===== Update pipeline =====

    /// Replay `statements` below the location `base` leads to, then notify.
    fn apply(&self, base: Vec<Op>, statements: Vec<Vec<Op>>) -> ModelResult<()> {
        if let Some(op) = base.iter().find(|op| op.is_write()) {
            return Err(ModelError::invalid_operation(format!(
                "path function performed `{}` instead of a read",
                op.name()
            )));
        }

        let total = statements.len();
        let mut changed = Vec::with_capacity(total);
        let mut failure = None;
        {
            let mut inner = self.inner.borrow_mut();
            for statement in statements {
                match replay(&mut inner.state, &base, &statement) {
                    Ok(true) => changed.push(statement),
                    Ok(false) => {}
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        let name = self.name();
        tracing::debug!(
            model = %name,
            root = %ops_path(&base),
            statements = total,
            changed = changed.len(),
            "applied update"
        );

        if !changed.is_empty() {
            self.notify(&base, &changed);
        }
        self.auto_prune();

        match failure {
            Some(e) => {
                tracing::debug!(model = %name, error = %e, "update stopped early");
                Err(e)
            }
            None => Ok(()),
        }
    }

    fn notify(&self, base: &[Op], changed: &[Vec<Op>]) {
        self.emit_root();

        // Ancestors of a view root, shared by every statement.
        for depth in 1..=base.len() {
            self.emit_at(&base[..depth]);
        }

        // Handlers may prune and re-observe, so nodes are located by path
        // after every emit rather than held across calls.
        for statement in changed {
            let mut ops = base.to_vec();
            let resolved = statement.iter().all(|op| {
                ops.push(op.clone());
                self.emit_at(&ops)
            });
            if !resolved {
                continue;
            }
            self.fire_descendants(&ops, None);
            // An invocation mutates its receiver, so the receiver's other
            // children may have moved too.
            let call = statement.last().filter(|op| matches!(op, Op::Invoke { .. }));
            if let Some(call) = call {
                self.fire_descendants(&ops[..ops.len() - 1], Some(&call.key()));
            }
        }
    }

    fn emit_root(&self) {
        let channel = self.inner.borrow().tree.channel(NodeId::ROOT);
        if let Some(channel) = channel {
            channel.emit_with(|| Some(self.inner.borrow().state.clone()));
        }
    }

    /// Current value at `ops`, copied only when a handler is waiting for it.
    fn value_at(&self, ops: &[Op]) -> Option<Value> {
        value_for(ops, &self.inner.borrow().state).ok().cloned()
    }

    /// Whether `ops` resolves against the current state, logging when not.
    fn resolves(inner: &Inner, ops: &[Op]) -> bool {
        match value_for(ops, &inner.state) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(model = %inner.config.name, error = %e, "skipping unresolved node");
                false
            }
        }
    }

    /// Broadcast the node at `ops`, creating it if needed. Returns false
    /// when the path no longer resolves.
    fn emit_at(&self, ops: &[Op]) -> bool {
        let channel = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.tree.get_or_create(ops);
            if !Self::resolves(&inner, ops) {
                return false;
            }
            inner.tree.channel(id)
        };
        if let Some(channel) = channel {
            channel.emit_with(|| self.value_at(ops));
        }
        true
    }

    /// Broadcast every node below `parent`, pre-order, leaving out the child
    /// keyed `skip`. A node whose value no longer resolves is skipped together
    /// with its subtree, as is a node removed by an earlier handler.
    fn fire_descendants(&self, parent: &[Op], skip: Option<&Seg>) {
        let children = {
            let inner = self.inner.borrow();
            match inner.tree.find(parent) {
                Some(id) => inner.tree.child_ops(id),
                None => return,
            }
        };
        let mut ops = parent.to_vec();
        for child in children {
            if skip == Some(&child.key()) {
                continue;
            }
            ops.push(child);
            let channel = {
                let inner = self.inner.borrow();
                inner
                    .tree
                    .find(&ops)
                    .filter(|_| Self::resolves(&inner, &ops))
                    .and_then(|id| inner.tree.channel(id))
            };
            if let Some(channel) = channel {
                channel.emit_with(|| self.value_at(&ops));
                self.fire_descendants(&ops, None);
            }
            ops.pop();
        }
    }

    fn auto_prune(&self) {
        let enabled = self.inner.borrow().config.auto_prune;
        if enabled {
            self.prune();
        }
    }

    fn restore_whole(&self, state: Value) -> ModelResult<()> {
        if !state.is_structured() {
            return Err(ModelError::invalid_state_type(state.type_name()));
        }
        let name = {
            let mut inner = self.inner.borrow_mut();
            inner.state = state;
            inner.config.name.clone()
        };
        tracing::debug!(model = %name, "restored whole state");
        self.emit_root();
        self.fire_descendants(&[], None);
        self.auto_prune();
        Ok(())
    }
}

/// Replay one statement below `base`. Returns whether the terminating write
/// changed the state.
fn replay(state: &mut Value, base: &[Op], statement: &[Op]) -> ModelResult<bool> {
    let mut walked = Path::root();
    let mut cursor = state;
    for op in base.iter().chain(statement) {
        match op.step(cursor).map_err(|e| e.with_prefix(&walked))? {
            Step::Descend(next) => {
                cursor = next;
                walked.push(op.key());
            }
            Step::Wrote { changed } => return Ok(changed),
        }
    }
    Err(ModelError::incomplete_statement(walked))
}

impl Default for Container {
    fn default() -> Self {
        let config = ContainerConfig::default();
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: Value::map(),
                tree: NodeTree::new(config.name.clone()),
                config,
            })),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Container")
            .field("name", &inner.config.name)
            .field("state", &inner.state)
            .field("nodes", &inner.tree.len())
            .finish()
    }
}

impl Model for Container {
    fn observe_path(&self, lens: &Lens<'_>, handler: Handler) -> Token {
        let ops = record_path(lens);
        let (token, initial) = {
            let mut inner = self.inner.borrow_mut();
            let Inner { state, tree, config } = &mut *inner;
            let id = tree.get_or_create(&ops);
            let connected = handler.clone();
            let token = match tree.channel(id) {
                Some(channel) => channel.connect(move |value| connected(value)),
                None => unreachable!("get_or_create returns a live node"),
            };
            let initial = match value_for(&ops, state) {
                Ok(value) => Some(value.clone()),
                Err(e) => {
                    tracing::debug!(
                        model = %config.name,
                        error = %e,
                        "observed path does not resolve yet"
                    );
                    None
                }
            };
            (token, initial)
        };
        if let Some(value) = initial {
            handler(&value);
        }
        token
    }

    fn update_rooted(
        &self,
        root: &Lens<'_>,
        mutator: &mut dyn FnMut(&Recorder),
    ) -> ModelResult<()> {
        let recorder = Recorder::new();
        let base = root(&recorder);
        let base_ops = recorder.take_ops();
        mutator(&base);
        let statements = split_statements(recorder.take_ops())
            .map_err(|e| e.with_prefix(&ops_path(&base_ops)))?;
        self.apply(base_ops, statements)
    }

    fn snapshot_path(&self, lens: &Lens<'_>) -> ModelResult<Value> {
        let ops = record_path(lens);
        let inner = self.inner.borrow();
        value_for(&ops, &inner.state).cloned()
    }

    fn restore_path(&self, value: Value, lens: &Lens<'_>) -> ModelResult<()> {
        let mut ops = record_path(lens);
        let Some(last) = ops.pop() else {
            return self.restore_whole(value);
        };
        let name = last.name();
        let write = last.into_write(value).ok_or_else(|| {
            ModelError::invalid_operation(format!("cannot restore through `{name}`"))
        })?;
        self.apply(ops, vec![vec![write]])
    }

    fn inspect_path(&self, lens: &Lens<'_>, visit: &mut dyn FnMut(&Value)) -> ModelResult<()> {
        let ops = record_path(lens);
        let inner = self.inner.borrow();
        visit(value_for(&ops, &inner.state)?);
        Ok(())
    }

    fn wait_path(&self, lens: &Lens<'_>) -> Wait {
        self.channel_at(lens).next()
    }

    fn stream_path(&self, lens: &Lens<'_>) -> Subscription<Value> {
        self.channel_at(lens).subscribe()
    }
}
