//! Path-addressed observable state with recorded updates and composable views.
//!
//! `tirea-model` keeps one structured [`Value`] per [`Container`] and lets
//! callers subscribe to any path inside it. Mutations are described by
//! chaining accessors on a [`Recorder`] stand-in; the recorded operations are
//! replayed against the real state, and only the paths whose values actually
//! changed are broadcast.
//!
//! # Core Concepts
//!
//! - **Recorder**: stand-in that records reads and writes as [`Op`]s
//! - **Statement**: a run of reads ending in exactly one write
//! - **Container**: owns the state and the subscription node tree
//! - **View**: a model rooted at a subtree of another model
//! - **Broadcast**: ordered multi-subscriber channel behind every node
//! - **Token**: cancels a subscription when dropped
//!
//! # Notification Order
//!
//! ```text
//! update(a.b[0] = x)  =>  $  ->  $.a  ->  $.a.b  ->  $.a.b[0]  ->  descendants of $.a.b[0]
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tirea_model::{Container, ModelExt, Value};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let model = Container::new(json!({"value": 0})).unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let _token = {
//!     let seen = seen.clone();
//!     model.observe(|s| s.field("value"), move |v| seen.borrow_mut().push(v.clone()))
//! };
//!
//! model.update(|s| s.set("value", 25)).unwrap();
//! let snapshot = model.snapshot().unwrap();
//! model.update_fields([("value", 0)]).unwrap();
//! model.restore(snapshot).unwrap();
//!
//! assert_eq!(
//!     *seen.borrow(),
//!     vec![Value::Int(0), Value::Int(25), Value::Int(0), Value::Int(25)]
//! );
//! ```
//!
//! # Views
//!
//! ```
//! use tirea_model::{Container, ModelExt, Value};
//! use serde_json::json;
//!
//! let model = Container::new(json!({"settings": {"theme": "dark"}})).unwrap();
//! let settings = model.submodel(|s| s.field("settings"));
//! settings.update(|s| s.set("theme", "light")).unwrap();
//!
//! assert_eq!(
//!     model.snapshot_of(|s| s.field("settings").field("theme")).unwrap(),
//!     Value::from("light")
//! );
//! ```

mod broadcast;
mod config;
mod container;
mod delta;
mod error;
mod model;
mod op;
mod path;
mod recorder;
mod tree;
mod value;
mod view;

// Core types
pub use error::{ModelError, ModelResult};
pub use op::{value_changed, Method, Op, Step};
pub use path::{Path, Seg};
pub use value::{Map, Value};

// Recording
pub use recorder::{ops_path, record_path, record_update, root, split_statements, Lens, Recorder};

// Notification
pub use broadcast::{Broadcast, Next, Subscription, Token};
pub use tree::{value_for, NodeId, NodeTree};

// Models
pub use config::ContainerConfig;
pub use container::{Container, WeakContainer};
pub use delta::delta;
pub use model::{Handler, Model, ModelExt, Wait};
pub use view::View;
