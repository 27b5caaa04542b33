//! In-process publish/subscribe registry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

use super::error::{BusError, ListenerError};
use super::listener::{Entry, ListenerHandle, ListenerId, ListenerOutput, SubscribeOptions};
use crate::scheduler::panic_message;

/// Callback receiving listener failures.
pub type ErrorHook = Arc<dyn Fn(&ListenerError) + Send + Sync>;

/// Default per-event listener count above which a leak warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Named-event publish/subscribe registry.
///
/// Listeners for one event run synchronously inside [`emit`](Self::emit), in
/// registration order, over a snapshot taken when the emission starts. A
/// listener that fails is reported through the error hook and the remaining
/// listeners still run.
///
/// `A` is the argument type passed to every listener; it defaults to
/// [`serde_json::Value`] so heterogeneous arguments can share one bus.
///
/// Clones share the registry. Configuration (`with_*`) is per handle, so set
/// it up before cloning.
///
/// ## Example
///
/// ```
/// use deferred_bus::EventBus;
/// use serde_json::json;
/// use std::sync::{Arc, Mutex};
///
/// let bus = EventBus::new();
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = log.clone();
/// bus.subscribe("response", move |args: &[serde_json::Value]| {
///     sink.lock().unwrap().push(format!("arg1 : {}", args[0]));
/// })
/// .unwrap();
///
/// let sink = log.clone();
/// bus.subscribe("response", move |_: &[serde_json::Value]| {
///     sink.lock().unwrap().push("listening to response".to_string());
/// })
/// .unwrap();
///
/// let invoked = bus.emit("response", &[json!("argument1"), json!("argument2")]).unwrap();
/// assert_eq!(invoked, 2);
/// assert_eq!(
///     *log.lock().unwrap(),
///     vec!["arg1 : \"argument1\"".to_string(), "listening to response".to_string()]
/// );
/// ```
pub struct EventBus<A = Value> {
    registry: Arc<Mutex<Registry<A>>>,
    error_hook: ErrorHook,
    max_listeners: usize,
}

struct Registry<A> {
    events: HashMap<String, Vec<Arc<Entry<A>>>>,
    warned: HashSet<String>,
}

impl<A> Default for Registry<A> {
    fn default() -> Self {
        Self {
            events: HashMap::new(),
            warned: HashSet::new(),
        }
    }
}

impl<A> Clone for EventBus<A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            error_hook: Arc::clone(&self.error_hook),
            max_listeners: self.max_listeners,
        }
    }
}

impl<A: 'static> Default for EventBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

fn log_listener_error(error: &ListenerError) {
    tracing::error!(
        event = %error.event,
        listener = %error.listener,
        panicked = error.panicked,
        "event listener failed: {}",
        error.message
    );
}

impl<A: 'static> EventBus<A> {
    /// Create an empty bus that logs listener failures.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            error_hook: Arc::new(log_listener_error),
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }

    /// Replace the listener failure hook.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ListenerError) + Send + Sync + 'static,
    {
        self.error_hook = Arc::new(hook);
        self
    }

    /// Set the per-event listener count that triggers a leak warning.
    /// `0` disables the warning.
    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    /// Register `callback` for `event`.
    pub fn subscribe<F, O>(&self, event: &str, callback: F) -> Result<ListenerHandle, BusError>
    where
        F: Fn(&[A]) -> O + Send + Sync + 'static,
        O: ListenerOutput,
    {
        self.subscribe_with(event, callback, SubscribeOptions::default())
    }

    /// Register `callback` to run at most once for `event`.
    pub fn once<F, O>(&self, event: &str, callback: F) -> Result<ListenerHandle, BusError>
    where
        F: Fn(&[A]) -> O + Send + Sync + 'static,
        O: ListenerOutput,
    {
        self.subscribe_with(event, callback, SubscribeOptions::once())
    }

    /// Register `callback` for `event` with explicit options.
    ///
    /// Registering the same closure twice yields two independent listeners.
    pub fn subscribe_with<F, O>(
        &self,
        event: &str,
        callback: F,
        options: SubscribeOptions,
    ) -> Result<ListenerHandle, BusError>
    where
        F: Fn(&[A]) -> O + Send + Sync + 'static,
        O: ListenerOutput,
    {
        if event.is_empty() {
            return Err(BusError::InvalidArgument(
                "event name must not be empty".to_string(),
            ));
        }

        let id = ListenerId::next();
        let entry = Entry::new(
            id,
            options.once,
            Box::new(move |args: &[A]| callback(args).into_outcome()),
        );

        let mut registry = self.registry("subscribe")?;
        let listeners = registry.events.entry(event.to_string()).or_default();
        listeners.push(Arc::new(entry));
        let count = listeners.len();

        if self.max_listeners > 0
            && count > self.max_listeners
            && registry.warned.insert(event.to_string())
        {
            tracing::warn!(
                event,
                count,
                max = self.max_listeners,
                "possible listener leak: more listeners than configured maximum"
            );
        }
        drop(registry);

        tracing::debug!(event, listener = %id, once = options.once, "listener subscribed");
        Ok(ListenerHandle {
            id,
            event: event.to_string(),
        })
    }

    /// Remove the listener behind `handle`.
    ///
    /// Returns `Ok(false)` when it was already removed (including a `once`
    /// listener that has fired) or never existed.
    pub fn unsubscribe(&self, handle: &ListenerHandle) -> Result<bool, BusError> {
        let removed = self.remove(&handle.event, handle.id, "unsubscribe")?;
        if removed {
            tracing::debug!(event = %handle.event, listener = %handle.id, "listener unsubscribed");
        }
        Ok(removed)
    }

    /// Invoke every listener registered for `event`, in registration order.
    ///
    /// Returns how many listeners were invoked, failures included. Listeners
    /// added while this emission runs are not part of it; listeners removed
    /// while it runs still get this call.
    pub fn emit(&self, event: &str, args: &[A]) -> Result<usize, BusError> {
        let snapshot = {
            let registry = self.registry("emit")?;
            match registry.events.get(event) {
                Some(listeners) if !listeners.is_empty() => listeners.clone(),
                _ => return Ok(0),
            }
        };

        let mut invoked = 0;
        for entry in snapshot {
            if entry.once {
                // Claim and remove before running so a recursive emit cannot fire it again.
                if !entry.claim() {
                    continue;
                }
                self.remove(event, entry.id, "emit")?;
            }
            invoked += 1;
            self.invoke(event, &entry, args);
        }
        Ok(invoked)
    }

    fn invoke(&self, event: &str, entry: &Entry<A>, args: &[A]) {
        let (message, panicked) =
            match panic::catch_unwind(AssertUnwindSafe(|| entry.call(args))) {
                Ok(Ok(())) => return,
                Ok(Err(message)) => (message, false),
                Err(payload) => (panic_message(payload.as_ref()), true),
            };

        (self.error_hook)(&ListenerError {
            event: event.to_string(),
            listener: entry.id,
            message,
            panicked,
        });
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> Result<usize, BusError> {
        Ok(self
            .registry("listener_count")?
            .events
            .get(event)
            .map_or(0, Vec::len))
    }

    /// Names of events that currently have listeners, sorted.
    pub fn event_names(&self) -> Result<Vec<String>, BusError> {
        let mut names: Vec<String> = self
            .registry("event_names")?
            .events
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove every listener for `event`, or for all events when `None`.
    /// Returns how many listeners were removed.
    pub fn remove_all_listeners(&self, event: Option<&str>) -> Result<usize, BusError> {
        let mut registry = self.registry("remove_all_listeners")?;
        let removed = match event {
            Some(event) => {
                registry.warned.remove(event);
                registry.events.remove(event).map_or(0, |l| l.len())
            }
            None => {
                registry.warned.clear();
                registry.events.drain().map(|(_, l)| l.len()).sum()
            }
        };
        Ok(removed)
    }

    fn remove(&self, event: &str, id: ListenerId, operation: &'static str) -> Result<bool, BusError> {
        let mut registry = self.registry(operation)?;
        let Some(listeners) = registry.events.get_mut(event) else {
            return Ok(false);
        };

        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        let removed = listeners.len() != before;

        if listeners.is_empty() {
            registry.events.remove(event);
            registry.warned.remove(event);
        }
        Ok(removed)
    }

    fn registry(&self, operation: &'static str) -> Result<MutexGuard<'_, Registry<A>>, BusError> {
        self.registry
            .lock()
            .map_err(|_| BusError::LockPoisoned(operation))
    }
}

impl EventBus<Value> {
    /// Serialize `payload` and emit it as the single listener argument.
    pub fn emit_json<T: Serialize>(&self, event: &str, payload: &T) -> Result<usize, BusError> {
        let value = serde_json::to_value(payload)?;
        self.emit(event, &[value])
    }
}

impl<A> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("EventBus");
        match self.registry.lock() {
            Ok(registry) => {
                let counts: HashMap<&str, usize> = registry
                    .events
                    .iter()
                    .map(|(event, listeners)| (event.as_str(), listeners.len()))
                    .collect();
                debug.field("listeners", &counts);
            }
            Err(_) => {
                debug.field("listeners", &"<poisoned>");
            }
        }
        debug.field("max_listeners", &self.max_listeners).finish()
    }
}
