//! Handler registry keyed by event kind and player scope
//!
//! Handlers run outside the map lock, so subscribe/unsubscribe may be called
//! from anywhere, including from inside a handler. Each subscription carries
//! its own in-flight guard: once [`SubscriptionRegistry::unsubscribe`]
//! returns, that handler is not running and will not run again.

use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error};

use super::{Event, EventKind, PlayerScope};

/// Receives dispatched events. Called on the listener task; must not block
/// for long.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

/// Token returned by [`SubscriptionRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    active: AtomicBool,
    in_flight: Mutex<()>,
}

impl Subscription {
    /// Run the handler unless it was removed. Returns true if it ran.
    fn invoke(&self, event: &Event) -> bool {
        let _guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let result = catch_unwind(AssertUnwindSafe(|| self.handler.handle(event)));
        if let Err(panic) = result {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                "Event handler {:?} panicked on {:?}: {}",
                self.id,
                event.kind(),
                msg
            );
        }
        true
    }

    /// Deactivate and wait out an invocation running on another thread
    fn retire(&self) {
        self.active.store(false, Ordering::Release);
        if DISPATCHING.with(Cell::get) {
            // Called from a handler; waiting here could be waiting on ourselves
            return;
        }
        drop(self.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

struct DispatchFlag {
    previous: bool,
}

impl DispatchFlag {
    fn set() -> Self {
        let previous = DISPATCHING.with(|d| d.replace(true));
        Self { previous }
    }
}

impl Drop for DispatchFlag {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

type Key = (EventKind, PlayerScope);

/// Thread-safe (event kind, player scope) -> handlers map
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<Key, Vec<Arc<Subscription>>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<H>(&self, kind: EventKind, scope: PlayerScope, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            id,
            handler: Arc::new(handler),
            active: AtomicBool::new(true),
            in_flight: Mutex::new(()),
        });
        debug!("Subscribed {:?} to {:?} for {:?}", id, kind, scope);
        self.write()
            .entry((kind, scope))
            .or_default()
            .push(subscription);
        id
    }

    /// Remove one handler. Returns false if it was not registered under
    /// that kind and scope.
    pub fn unsubscribe(&self, kind: EventKind, scope: &PlayerScope, id: SubscriptionId) -> bool {
        let removed = {
            let mut entries = self.write();
            let key = (kind, scope.clone());
            let Some(subs) = entries.get_mut(&key) else {
                return false;
            };
            let removed = subs
                .iter()
                .position(|s| s.id == id)
                .map(|pos| subs.remove(pos));
            if subs.is_empty() {
                entries.remove(&key);
            }
            removed
        };

        match removed {
            Some(subscription) => {
                subscription.retire();
                debug!("Unsubscribed {:?} from {:?}", id, kind);
                true
            }
            None => false,
        }
    }

    /// Remove every handler for `kind`, across all scopes. Returns how many
    /// were removed.
    pub fn unsubscribe_all(&self, kind: EventKind) -> usize {
        let removed: Vec<Arc<Subscription>> = {
            let mut entries = self.write();
            let keys: Vec<Key> = entries.keys().filter(|k| k.0 == kind).cloned().collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k))
                .flatten()
                .collect()
        };
        for subscription in &removed {
            subscription.retire();
        }
        debug!("Unsubscribed {} handler(s) from {:?}", removed.len(), kind);
        removed.len()
    }

    /// Number of handlers registered for `kind`, across all scopes
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.read()
            .iter()
            .filter(|(k, _)| k.0 == kind)
            .map(|(_, subs)| subs.len())
            .sum()
    }

    /// Deliver `event` to matching handlers: those scoped to the event's
    /// player first, then wildcard ones. `Disconnected` goes to every
    /// `Disconnected` handler regardless of scope. Returns how many
    /// handlers ran.
    pub fn dispatch(&self, event: &Event) -> usize {
        let targets = self.targets(event);
        let _flag = DispatchFlag::set();
        targets.iter().filter(|s| s.invoke(event)).count()
    }

    fn targets(&self, event: &Event) -> Vec<Arc<Subscription>> {
        let kind = event.kind();
        let entries = self.read();
        match event.player_id() {
            Some(player_id) => {
                let scoped = entries.get(&(kind, PlayerScope::player(player_id)));
                let wildcard = entries.get(&(kind, PlayerScope::All));
                scoped
                    .into_iter()
                    .chain(wildcard)
                    .flatten()
                    .cloned()
                    .collect()
            }
            None => entries
                .iter()
                .filter(|(k, _)| k.0 == kind)
                .flat_map(|(_, subs)| subs.iter().cloned())
                .collect(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Key, Vec<Arc<Subscription>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Key, Vec<Arc<Subscription>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
