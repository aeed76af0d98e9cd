//! The observable model contract.
//!
//! [`Model`] is the object-safe core implemented by [`Container`] and
//! [`View`]: every method takes path functions as [`Lens`] trait objects so
//! views can stack behind `Rc<dyn Model>`. [`ModelExt`] layers the ergonomic
//! generic surface on top and is available on every model.
//!
//! [`Container`]: crate::Container

use crate::broadcast::{Next, Subscription, Token};
use crate::error::ModelResult;
use crate::recorder::{root, Lens, Recorder};
use crate::{Value, View};
use serde::de::DeserializeOwned;
use std::rc::Rc;

/// Observer callback.
pub type Handler = Rc<dyn Fn(&Value)>;

/// Future resolving with the next value broadcast at a path.
pub type Wait = Next<Value>;

/// Object-safe observable model.
pub trait Model {
    /// Connect `handler` to the node at `lens`, calling it once with the
    /// current value if the path resolves.
    fn observe_path(&self, lens: &Lens<'_>, handler: Handler) -> Token;

    /// Record `mutator` against the location selected by `root` and apply
    /// it, notifying observers of every changed path.
    fn update_rooted(
        &self,
        root: &Lens<'_>,
        mutator: &mut dyn FnMut(&Recorder),
    ) -> ModelResult<()>;

    /// Deep copy of the value at `lens`.
    fn snapshot_path(&self, lens: &Lens<'_>) -> ModelResult<Value>;

    /// Replace the value at `lens`. An empty path replaces the whole state.
    fn restore_path(&self, value: Value, lens: &Lens<'_>) -> ModelResult<()>;

    /// Borrow the value at `lens` without copying.
    ///
    /// `visit` must not re-enter the model.
    fn inspect_path(&self, lens: &Lens<'_>, visit: &mut dyn FnMut(&Value)) -> ModelResult<()>;

    /// Suspend until the node at `lens` broadcasts.
    fn wait_path(&self, lens: &Lens<'_>) -> Wait;

    /// Stream every subsequent broadcast of the node at `lens`.
    fn stream_path(&self, lens: &Lens<'_>) -> Subscription<Value>;
}

/// Convenience methods available on every [`Model`].
pub trait ModelExt: Model {
    /// Observe the value selected by `path`.
    ///
    /// The callback runs immediately with the current value (when the path
    /// resolves) and again after every update that touches the path, its
    /// ancestors or its descendants.
    fn observe<L, F>(&self, path: L, callback: F) -> Token
    where
        L: Fn(&Recorder) -> Recorder,
        F: Fn(&Value) + 'static,
    {
        self.observe_path(&path, Rc::new(callback))
    }

    /// Apply a recorded mutation.
    ///
    /// ```
    /// use tirea_model::{Container, ModelExt, Value};
    /// use serde_json::json;
    ///
    /// let model = Container::new(json!({"count": 0, "tags": []})).unwrap();
    /// model
    ///     .update(|s| {
    ///         s.set("count", 1);
    ///         s.field("tags").push("new");
    ///     })
    ///     .unwrap();
    /// assert_eq!(
    ///     model.snapshot().unwrap(),
    ///     Value::from(json!({"count": 1, "tags": ["new"]}))
    /// );
    /// ```
    fn update<F>(&self, mut mutator: F) -> ModelResult<()>
    where
        F: FnMut(&Recorder),
    {
        self.update_rooted(&root, &mut mutator)
    }

    /// Assign each `(field, value)` pair at the top level of the model.
    fn update_fields<I, K, V>(&self, fields: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.update(|s| {
            for (key, value) in &fields {
                s.set(key.clone(), value.clone());
            }
        })
    }

    /// Deep copy of the whole model.
    fn snapshot(&self) -> ModelResult<Value> {
        self.snapshot_path(&root)
    }

    /// Deep copy of the value selected by `path`.
    fn snapshot_of<L>(&self, path: L) -> ModelResult<Value>
    where
        L: Fn(&Recorder) -> Recorder,
    {
        self.snapshot_path(&path)
    }

    /// Deserialize the whole model into `T`.
    fn snapshot_as<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(self.snapshot()?.to_model()?)
    }

    /// Replace the whole model.
    fn restore(&self, value: impl Into<Value>) -> ModelResult<()> {
        self.restore_path(value.into(), &root)
    }

    /// Replace the value selected by `path`.
    fn restore_of<L>(&self, value: impl Into<Value>, path: L) -> ModelResult<()>
    where
        L: Fn(&Recorder) -> Recorder,
    {
        self.restore_path(value.into(), &path)
    }

    /// Run `f` against the current state without copying it.
    ///
    /// `f` must not re-enter the model.
    fn with_state<R>(&self, f: impl FnOnce(&Value) -> R) -> ModelResult<R> {
        let mut f = Some(f);
        let mut out = None;
        self.inspect_path(&root, &mut |state| {
            if let Some(f) = f.take() {
                out = Some(f(state));
            }
        })?;
        // inspect_path only returns Ok after visiting.
        out.ok_or_else(|| crate::ModelError::invalid_operation("state was not visited"))
    }

    /// Suspend until the value selected by `path` is next broadcast.
    fn wait<L>(&self, path: L) -> Wait
    where
        L: Fn(&Recorder) -> Recorder,
    {
        self.wait_path(&path)
    }

    /// Stream every subsequent value broadcast at `path`.
    fn stream<L>(&self, path: L) -> Subscription<Value>
    where
        L: Fn(&Recorder) -> Recorder,
    {
        self.stream_path(&path)
    }

    /// A view over the subtree selected by `projection`.
    fn submodel<L>(&self, projection: L) -> View
    where
        Self: Clone + Sized + 'static,
        L: Fn(&Recorder) -> Recorder + 'static,
    {
        View::new(Rc::new(self.clone()), Rc::new(projection))
    }
}

impl<M: Model + ?Sized> ModelExt for M {}
