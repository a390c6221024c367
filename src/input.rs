//! Platform independent input events and a dispatcher with scoped registrations.
//!
//! The host translates its native events (winit window events, DOM events) into
//! [`InputEvent`]s and feeds them to a shared [`EventDispatcher`]. Consumers such
//! as the gallery register callbacks and keep the returned [`Listener`] guard;
//! dropping the guard unregisters the callback, so nothing stays attached to the
//! dispatcher after its owner is gone.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use bitflags::bitflags;

/// Unique identifier for a registered callback.
pub type CallbackId = u32;

/// Callbacks return `true` to stop later callbacks of the same kind from seeing the event.
type EventCallback = Box<dyn FnMut(&InputEvent) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Escape,
    Other,
}

impl Key {
    /// Letter keys compare case-insensitively.
    pub fn is_char(&self, c: char) -> bool {
        matches!(self, Key::Char(k) if k.eq_ignore_ascii_case(&c))
    }
}

/// Input in physical pixels relative to the container's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerUp { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    /// Wheel notches, positive when scrolling away from the user.
    Wheel { delta: f32 },
    Key { key: Key, pressed: bool },
    Resized { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Pointer,
    Wheel,
    Keyboard,
    Resized,
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PointerDown { .. } | Self::PointerUp { .. } | Self::PointerMove { .. } => {
                EventKind::Pointer
            }
            Self::Wheel { .. } => EventKind::Wheel,
            Self::Key { .. } => EventKind::Keyboard,
            Self::Resized { .. } => EventKind::Resized,
        }
    }
}

bitflags! {
    /// Movement keys currently held by the walking player.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MovementKeys: u8 {
        const FORWARD = 0b0001;
        const BACKWARD = 0b0010;
        const LEFT = 0b0100;
        const RIGHT = 0b1000;
    }
}

impl MovementKeys {
    /// WASD and the arrow keys.
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::ArrowUp => Some(Self::FORWARD),
            Key::ArrowDown => Some(Self::BACKWARD),
            Key::ArrowLeft => Some(Self::LEFT),
            Key::ArrowRight => Some(Self::RIGHT),
            k if k.is_char('w') => Some(Self::FORWARD),
            k if k.is_char('s') => Some(Self::BACKWARD),
            k if k.is_char('a') => Some(Self::LEFT),
            k if k.is_char('d') => Some(Self::RIGHT),
            _ => None,
        }
    }
}

/// Routes [`InputEvent`]s to the callbacks registered for their [`EventKind`].
pub struct EventDispatcher {
    callback_map: HashMap<EventKind, Vec<(CallbackId, EventCallback)>>,
    next_id: CallbackId,
    // ids whose Listener was dropped, possibly while a dispatch was running
    retired: Rc<RefCell<Vec<CallbackId>>>,
}

pub type SharedDispatcher = Rc<RefCell<EventDispatcher>>;

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            callback_map: HashMap::new(),
            next_id: 0,
            retired: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn shared() -> SharedDispatcher {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn register<F>(&mut self, kind: EventKind, callback: F) -> CallbackId
    where
        F: FnMut(&InputEvent) -> bool + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.callback_map
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Returns `true` if the callback was found and removed.
    pub fn unregister(&mut self, id: CallbackId) -> bool {
        for callbacks in self.callback_map.values_mut() {
            if let Some(pos) = callbacks.iter().position(|(cid, _)| *cid == id) {
                let _ = callbacks.remove(pos);
                return true;
            }
        }
        false
    }

    /// Invoke the callbacks for the event's kind in registration order. Returns
    /// whether one of them stopped propagation.
    pub fn dispatch(&mut self, event: &InputEvent) -> bool {
        self.purge_retired();
        if let Some(callbacks) = self.callback_map.get_mut(&event.kind()) {
            for (_id, callback) in callbacks.iter_mut() {
                if callback(event) {
                    return true;
                }
            }
        }
        false
    }

    pub fn callback_count(&mut self) -> usize {
        self.purge_retired();
        self.callback_map.values().map(Vec::len).sum()
    }

    fn purge_retired(&mut self) {
        let retired: Vec<CallbackId> = self.retired.borrow_mut().drain(..).collect();
        for id in retired {
            self.unregister(id);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.callback_map.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Keeps a callback registered for as long as it lives.
#[must_use = "the callback is unregistered as soon as the listener is dropped"]
#[derive(Debug)]
pub struct Listener {
    id: CallbackId,
    retired: Weak<RefCell<Vec<CallbackId>>>,
}

impl Listener {
    pub fn register<F>(dispatcher: &SharedDispatcher, kind: EventKind, callback: F) -> Self
    where
        F: FnMut(&InputEvent) -> bool + 'static,
    {
        let mut dispatcher = dispatcher.borrow_mut();
        let id = dispatcher.register(kind, callback);
        Self {
            id,
            retired: Rc::downgrade(&dispatcher.retired),
        }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // A dispatcher that is already gone has nothing left to unregister from.
        if let Some(retired) = self.retired.upgrade() {
            retired.borrow_mut().push(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_only_see_their_kind() {
        let dispatcher = EventDispatcher::shared();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _keys = Listener::register(&dispatcher, EventKind::Keyboard, move |e| {
            sink.borrow_mut().push(*e);
            false
        });

        dispatcher.borrow_mut().dispatch(&InputEvent::Wheel { delta: 1.0 });
        dispatcher.borrow_mut().dispatch(&InputEvent::Key {
            key: Key::Char('w'),
            pressed: true,
        });
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn stopping_propagation_skips_later_callbacks() {
        let mut dispatcher = EventDispatcher::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        dispatcher.register(EventKind::Wheel, |_| true);
        dispatcher.register(EventKind::Wheel, move |_| {
            *h.borrow_mut() += 1;
            false
        });
        assert!(dispatcher.dispatch(&InputEvent::Wheel { delta: 1.0 }));
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn dropping_the_listener_unregisters() {
        let dispatcher = EventDispatcher::shared();
        let listener = Listener::register(&dispatcher, EventKind::Pointer, |_| false);
        assert_eq!(dispatcher.borrow_mut().callback_count(), 1);
        drop(listener);
        assert_eq!(dispatcher.borrow_mut().callback_count(), 0);
    }

    #[test]
    fn listener_may_outlive_the_dispatcher() {
        let dispatcher = EventDispatcher::shared();
        let listener = Listener::register(&dispatcher, EventKind::Pointer, |_| false);
        drop(dispatcher);
        drop(listener);
    }

    #[test]
    fn wasd_and_arrows_map_to_movement() {
        assert_eq!(
            MovementKeys::from_key(&Key::Char('W')),
            Some(MovementKeys::FORWARD)
        );
        assert_eq!(
            MovementKeys::from_key(&Key::ArrowLeft),
            Some(MovementKeys::LEFT)
        );
        assert_eq!(MovementKeys::from_key(&Key::Char('t')), None);
    }
}
