//! Case-insensitive registry of push-event handlers.
//!
//! The server does not use consistent casing for event names, so every
//! registration and dispatch goes through [`normalize_event_name`]. A failing
//! or panicking handler is logged and does not stop the others.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use labgate_shared::normalize_event_name;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One push notification as handed to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Event name as the server sent it.
    pub name: String,
    pub payload: Option<Value>,
}

impl PushEvent {
    pub fn new(name: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// "Something changed, refetch": no payload at all.
    pub fn is_notification(&self) -> bool {
        matches!(self.payload, None | Some(Value::Null))
    }

    /// The `eventType` (or `type`) discriminator of a payload-bearing event.
    pub fn event_type(&self) -> Option<&str> {
        let payload = self.payload.as_ref()?;
        payload
            .get("eventType")
            .or_else(|| payload.get("type"))
            .and_then(Value::as_str)
    }

    /// The `data` object, or the whole payload when there is no envelope.
    pub fn data(&self) -> Option<&Value> {
        let payload = self.payload.as_ref().filter(|p| !p.is_null())?;
        match payload.get("data") {
            Some(data) => Some(data),
            None => Some(payload),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let data = self
            .data()
            .ok_or_else(|| anyhow::anyhow!("event {} carried no data", self.name))?;
        Ok(serde_json::from_value(data.clone())?)
    }

    /// Identity of the affected record, read from `data.id`.
    pub fn record_id<Id: DeserializeOwned>(&self) -> Option<Id> {
        let id = self.data()?.get("id")?;
        serde_json::from_value(id.clone())
            .ok()
            .or_else(|| id.as_str().and_then(|s| serde_json::from_str(s).ok()))
    }

    /// Whether `data.{field}` names `id`. Numbers and strings compare by
    /// their text form.
    pub fn affects(&self, field: &str, id: &str) -> bool {
        match self.data().and_then(|d| d.get(field)) {
            Some(Value::String(s)) => s == id,
            Some(Value::Number(n)) => n.to_string() == id,
            _ => false,
        }
    }
}

type HandlerFn = dyn Fn(&PushEvent) -> anyhow::Result<()> + Send + Sync;

/// A registered callback. Clones are the same handler for registration
/// and removal purposes.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new(f: impl Fn(&PushEvent) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Handler that decodes the event data into `T` first.
    pub fn typed<T: DeserializeOwned + 'static>(
        f: impl Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |event| f(event.decode::<T>()?))
    }

    fn same(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler").finish()
    }
}

#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` under `name`. Registering the same handler twice is a
    /// no-op; returns whether it was added.
    pub fn register(&self, name: &str, handler: &Handler) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let slot = handlers.entry(normalize_event_name(name)).or_default();
        if slot.iter().any(|h| h.same(handler)) {
            return false;
        }
        slot.push(handler.clone());
        true
    }

    /// Remove `handler` from `name`; returns whether it was registered.
    pub fn unregister(&self, name: &str, handler: &Handler) -> bool {
        let key = normalize_event_name(name);
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = handlers.get_mut(&key) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|h| !h.same(handler));
        let removed = slot.len() != before;
        if slot.is_empty() {
            handlers.remove(&key);
        }
        removed
    }

    /// Register `handler` under every name; the guard unregisters on drop.
    pub fn subscribe(&self, names: &[&str], handler: Handler) -> Subscription {
        for name in names {
            self.register(name, &handler);
        }
        Subscription {
            router: self.clone(),
            names: names.iter().map(|n| n.to_string()).collect(),
            handler,
        }
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_event_name(name))
            .map_or(0, Vec::len)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Invoke every handler registered for `name`. Returns how many ran
    /// without error.
    pub fn dispatch(&self, name: &str, payload: Option<Value>) -> usize {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_event_name(name))
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            crate::log_debug!("no handlers for push event '{}'", name);
            return 0;
        }

        let event = PushEvent::new(name, payload);
        let mut ok = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| (handler.0)(&event))) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => crate::log_warn!("handler for '{}' failed: {:#}", name, e),
                Err(_) => crate::log_error!("handler for '{}' panicked", name),
            }
        }
        ok
    }
}

/// Registration guard held by a view; dropping it unregisters the handler.
pub struct Subscription {
    router: EventRouter,
    names: Vec<String>,
    handler: Handler,
}

impl Subscription {
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for name in &self.names {
            self.router.unregister(name, &self.handler);
        }
    }
}
