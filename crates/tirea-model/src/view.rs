//! Projections over another model.
//!
//! A [`View`] forwards every call to its parent with its projection composed
//! in front of the caller's path function.

use crate::broadcast::{Subscription, Token};
use crate::error::ModelResult;
use crate::model::{Handler, Model, Wait};
use crate::recorder::{Lens, Recorder};
use crate::Value;
use std::fmt;
use std::rc::Rc;

/// A model rooted at a subtree of another model.
///
/// A view owns no state and no subscription nodes. Every call composes the
/// view's projection with the caller's path function and forwards to the
/// parent, so views over views resolve to a single path on the underlying
/// [`Container`](crate::Container).
#[derive(Clone)]
pub struct View {
    parent: Rc<dyn Model>,
    projection: Rc<Lens<'static>>,
}

impl View {
    pub fn new(parent: Rc<dyn Model>, projection: Rc<Lens<'static>>) -> Self {
        Self { parent, projection }
    }

    fn project(&self, r: &Recorder) -> Recorder {
        (self.projection)(r)
    }
}

impl Model for View {
    fn observe_path(&self, lens: &Lens<'_>, handler: Handler) -> Token {
        self.parent
            .observe_path(&|r: &Recorder| lens(&self.project(r)), handler)
    }

    fn update_rooted(
        &self,
        root: &Lens<'_>,
        mutator: &mut dyn FnMut(&Recorder),
    ) -> ModelResult<()> {
        self.parent
            .update_rooted(&|r: &Recorder| root(&self.project(r)), mutator)
    }

    fn snapshot_path(&self, lens: &Lens<'_>) -> ModelResult<Value> {
        self.parent
            .snapshot_path(&|r: &Recorder| lens(&self.project(r)))
    }

    fn restore_path(&self, value: Value, lens: &Lens<'_>) -> ModelResult<()> {
        self.parent
            .restore_path(value, &|r: &Recorder| lens(&self.project(r)))
    }

    fn inspect_path(&self, lens: &Lens<'_>, visit: &mut dyn FnMut(&Value)) -> ModelResult<()> {
        self.parent
            .inspect_path(&|r: &Recorder| lens(&self.project(r)), visit)
    }

    fn wait_path(&self, lens: &Lens<'_>) -> Wait {
        self.parent.wait_path(&|r: &Recorder| lens(&self.project(r)))
    }

    fn stream_path(&self, lens: &Lens<'_>) -> Subscription<Value> {
        self.parent
            .stream_path(&|r: &Recorder| lens(&self.project(r)))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = crate::recorder::ops_path(&crate::recorder::record_path(&*self.projection));
        f.debug_struct("View")
            .field("projection", &format_args!("{path}"))
            .finish()
    }
}
