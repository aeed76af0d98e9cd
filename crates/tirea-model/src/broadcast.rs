//! Ordered multi-subscriber notification.
//!
//! A [`Broadcast`] delivers each emitted value to its live handlers in the
//! order they were connected. Handlers may connect and disconnect (themselves
//! or others) while an emit is in progress: the emit walks a snapshot taken
//! when it started and skips handlers that are no longer live when their turn
//! comes. A panicking handler is logged and does not stop the others.
//!
//! Subscriptions are cancelled through [`Token`]s. A token only holds a weak
//! reference to its channel, so outstanding tokens never keep a channel
//! alive, and dropping a token disconnects its handler.

use crate::error::{ModelError, ModelResult};
use futures::Stream;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Shared handler callback.
pub type Callback<T> = Rc<dyn Fn(&T)>;

struct Slot<T> {
    id: u64,
    handler: Callback<T>,
    once: bool,
}

/// Type-erased view of a channel used by [`Token`].
trait Detach {
    fn detach(&self, id: u64) -> bool;
    fn is_live(&self, id: u64) -> bool;
}

/// Ordered multi-subscriber notification channel.
pub struct Broadcast<T> {
    name: String,
    next_id: Cell<u64>,
    slots: RefCell<Vec<Slot<T>>>,
}

impl<T: 'static> Broadcast<T> {
    /// Create a named channel. The name only appears in logs.
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            next_id: Cell::new(0),
            slots: RefCell::new(Vec::new()),
        })
    }

    fn attach(self: &Rc<Self>, handler: Callback<T>, once: bool) -> Token {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.slots.borrow_mut().push(Slot { id, handler, once });
        let channel: Rc<dyn Detach> = self.clone();
        Token {
            id,
            channel: Some(Rc::downgrade(&channel)),
        }
    }

    /// Connect a handler. It runs on every emit until its token is dropped
    /// or disconnected.
    pub fn connect(self: &Rc<Self>, handler: impl Fn(&T) + 'static) -> Token {
        self.attach(Rc::new(handler), false)
    }

    /// Connect a handler that is removed right before its first delivery.
    pub fn connect_once(self: &Rc<Self>, handler: impl Fn(&T) + 'static) -> Token {
        self.attach(Rc::new(handler), true)
    }

    /// Disconnect the handler behind `token`.
    ///
    /// Returns false if the token belongs to another channel or its handler
    /// is already gone.
    pub fn disconnect(&self, mut token: Token) -> bool {
        let ours = token.channel.as_ref().is_some_and(|weak| {
            std::ptr::eq(weak.as_ptr() as *const (), self as *const Self as *const ())
        });
        if !ours {
            return false;
        }
        token.channel = None;
        Detach::detach(self, token.id)
    }

    /// Deliver `value` to every live handler in connection order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .slots
            .borrow()
            .iter()
            .map(|slot| (slot.id, slot.handler.clone()))
            .collect();

        for (id, handler) in snapshot {
            if !self.claim(id) {
                continue;
            }
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(value))) {
                tracing::error!(
                    channel = %self.name,
                    panic = %panic_message(payload.as_ref()),
                    "handler panicked during emit"
                );
            }
        }
    }

    /// Like [`emit`](Self::emit), but builds the value only when there is a
    /// handler to receive it. `make` runs before any handler, and `None`
    /// cancels the emit.
    pub fn emit_with(&self, make: impl FnOnce() -> Option<T>) {
        if self.is_empty() {
            return;
        }
        if let Some(value) = make() {
            self.emit(&value);
        }
    }

    /// Check that a snapshotted handler is still live, removing it first if
    /// it is a once-handler.
    fn claim(&self, id: u64) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.iter().position(|slot| slot.id == id) {
            Some(pos) => {
                if slots[pos].once {
                    slots.remove(pos);
                }
                true
            }
            None => false,
        }
    }

    /// Number of live handlers.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Clone + 'static> Broadcast<T> {
    /// Suspend until the next emission.
    ///
    /// The returned future owns a once-handler; dropping the future before it
    /// resolves disconnects that handler.
    pub fn next(self: &Rc<Self>) -> Next<T> {
        let (tx, rx) = oneshot::channel();
        let tx = RefCell::new(Some(tx));
        let token = self.connect_once(move |value: &T| {
            if let Some(tx) = tx.borrow_mut().take() {
                let _ = tx.send(value.clone());
            }
        });
        Next { rx, _token: token }
    }

    /// Stream every subsequent emission.
    pub fn subscribe(self: &Rc<Self>) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.connect(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        Subscription { rx, _token: token }
    }
}

impl<T> Detach for Broadcast<T> {
    fn detach(&self, id: u64) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.iter().position(|slot| slot.id == id) {
            Some(pos) => {
                slots.remove(pos);
                true
            }
            None => false,
        }
    }

    fn is_live(&self, id: u64) -> bool {
        self.slots.borrow().iter().any(|slot| slot.id == id)
    }
}

impl<T> fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcast")
            .field("name", &self.name)
            .field("handlers", &self.slots.borrow().len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}

/// Cancellation handle for one connected handler.
///
/// Dropping the token disconnects the handler. Call [`Token::detach`] to keep
/// the handler for as long as the channel lives.
#[must_use = "dropping a Token disconnects its handler"]
pub struct Token {
    id: u64,
    channel: Option<Weak<dyn Detach>>,
}

impl Token {
    /// Disconnect the handler now. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take().and_then(|weak| weak.upgrade()) {
            channel.detach(self.id);
        }
    }

    /// Whether the handler is still connected to a live channel.
    pub fn is_connected(&self) -> bool {
        self.channel
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|channel| channel.is_live(self.id))
    }

    /// Give up the ability to cancel; the handler stays connected until the
    /// channel is dropped.
    pub fn detach(mut self) {
        self.channel = None;
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Future returned by [`Broadcast::next`].
#[must_use = "futures do nothing unless polled"]
pub struct Next<T> {
    rx: oneshot::Receiver<T>,
    _token: Token,
}

impl<T> Future for Next<T> {
    type Output = ModelResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|res| res.map_err(|_| ModelError::Disconnected))
    }
}

/// Stream returned by [`Broadcast::subscribe`]. Ends when the channel is
/// dropped.
#[must_use = "streams do nothing unless polled"]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _token: Token,
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
