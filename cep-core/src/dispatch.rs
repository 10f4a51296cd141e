//! Hand-off point between the engine and whatever delivers updates.
//!
//! The engine calls [`Dispatcher::dispatch`] while it still holds the editor
//! lock, which is what keeps broadcast order equal to apply order and lets a
//! joining client subscribe atomically with its snapshot. Implementations
//! must therefore only enqueue: never block on a socket or a slow peer.
//!
//! Operations the engine drops after validation are reported through
//! [`Dispatcher::dropped`] so the transport can tell their author.

use std::sync::mpsc;
use std::sync::Arc;

use crate::snapshot::{Dropped, Update};

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, update: &Update);

    /// Called under the same lock as `dispatch`, in apply order.
    fn dropped(&self, _dropped: &Dropped) {}
}

/// Discards every update.
impl Dispatcher for () {
    fn dispatch(&self, _update: &Update) {}
}

impl<T: Dispatcher + ?Sized> Dispatcher for Arc<T> {
    fn dispatch(&self, update: &Update) {
        (**self).dispatch(update)
    }

    fn dropped(&self, dropped: &Dropped) {
        (**self).dropped(dropped)
    }
}

/// Unbounded channel; a dropped receiver just discards updates.
impl Dispatcher for mpsc::Sender<Update> {
    fn dispatch(&self, update: &Update) {
        if self.send(update.clone()).is_err() {
            log::trace!("update v{} dropped: receiver gone", update.version);
        }
    }
}
