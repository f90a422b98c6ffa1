//! Multi-fire notification primitive.
//!
//! A [`DeferredSignal`] is a publish point that keeps an ordered list of
//! subscribers. Persistent subscribers fire on every [`trigger`](DeferredSignal::trigger);
//! one-shot subscribers fire on the next trigger only and are then pruned.
//!
//! When a signal is triggered while nobody is subscribed, the payload is handed
//! to the signal's *missed* fallback instead of being dropped silently. The
//! connector installs a fallback that logs a `tracing` warning naming the signal.
//!
//! # Example
//!
//! ```
//! use nexus_client::signal::DeferredSignal;
//!
//! let mut signal = DeferredSignal::<u32>::silent("ticks");
//! let (tx, rx) = std::sync::mpsc::channel();
//! signal.subscribe(move |n| {
//!     let _ = tx.send(*n);
//! });
//! signal.trigger(&1);
//! signal.trigger(&2);
//! assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
//! ```

use std::borrow::Cow;
use std::fmt;

use tracing::warn;

/// A boxed subscriber callback.
pub type Callback<T> = Box<dyn FnMut(&T) + Send + 'static>;

struct Subscriber<T> {
    callback: Callback<T>,
    once: bool,
}

/// Multi-fire publish point with a missed-event fallback.
pub struct DeferredSignal<T> {
    name: Cow<'static, str>,
    subscribers: Vec<Subscriber<T>>,
    missed: Callback<T>,
}

impl<T: 'static> DeferredSignal<T> {
    /// Create a signal with an explicit missed-event fallback.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        missed: impl FnMut(&T) + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            subscribers: Vec::new(),
            missed: Box::new(missed),
        }
    }

    /// Create a signal whose missed events are dropped without a diagnostic.
    pub fn silent(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, |_| {})
    }

    /// Register a callback that fires on every future trigger.
    pub fn subscribe(&mut self, callback: impl FnMut(&T) + Send + 'static) -> &mut Self {
        self.subscribers.push(Subscriber {
            callback: Box::new(callback),
            once: false,
        });
        self
    }

    /// Register a callback that fires on the next trigger only.
    pub fn subscribe_once(&mut self, callback: impl FnMut(&T) + Send + 'static) -> &mut Self {
        self.subscribers.push(Subscriber {
            callback: Box::new(callback),
            once: true,
        });
        self
    }

    /// Replace the missed-event fallback.
    pub fn on_missed(&mut self, missed: impl FnMut(&T) + Send + 'static) -> &mut Self {
        self.missed = Box::new(missed);
        self
    }

    /// Invoke every subscriber in registration order, or the missed fallback if
    /// there are none. One-shot subscribers are removed afterwards.
    pub fn trigger(&mut self, payload: &T) {
        if self.subscribers.is_empty() {
            (self.missed)(payload);
            return;
        }
        self.fire(payload);
    }

    /// Like [`trigger`](Self::trigger), but the caller has already dealt with
    /// the payload, so the missed fallback never runs.
    pub fn trigger_handled(&mut self, payload: &T) {
        self.fire(payload);
    }

    fn fire(&mut self, payload: &T) {
        let mut any_once = false;
        for subscriber in &mut self.subscribers {
            any_once |= subscriber.once;
            (subscriber.callback)(payload);
        }
        if any_once {
            self.subscribers.retain(|s| !s.once);
        }
    }

    /// Drop every subscriber. The missed fallback is kept.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if at least one subscriber is registered.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: fmt::Debug + 'static> DeferredSignal<T> {
    /// Create a signal whose missed events log a warning, unless `suppressed`.
    pub fn warning(name: impl Into<Cow<'static, str>>, suppressed: bool) -> Self {
        let name = name.into();
        let missed = missed_warning::<T>(name.clone(), suppressed);
        Self::new(name, missed)
    }
}

/// Build the standard missed-event fallback: a `warn!` naming the signal.
pub fn missed_warning<T: fmt::Debug + 'static>(
    name: Cow<'static, str>,
    suppressed: bool,
) -> impl FnMut(&T) + Send + 'static {
    move |payload: &T| {
        if !suppressed {
            warn!(event = %name, ?payload, "unhandled deferred event");
        }
    }
}

impl<T> fmt::Debug for DeferredSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredSignal")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Callback<u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::clone(&log);
        let make = move |tag: &'static str| -> Callback<u32> {
            let log = Arc::clone(&handle);
            Box::new(move |n: &u32| log.lock().unwrap().push(format!("{tag}:{n}")))
        };
        (log, make)
    }

    #[test]
    fn persistent_subscribers_fire_on_every_trigger() {
        let (log, make) = recorder();
        let mut signal = DeferredSignal::<u32>::silent("test");
        signal.subscribe(make("a")).subscribe(make("b"));

        signal.trigger(&1);
        signal.trigger(&2);

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn one_shot_subscribers_fire_exactly_once() {
        let (log, make) = recorder();
        let mut signal = DeferredSignal::<u32>::silent("test");
        signal
            .subscribe(make("p1"))
            .subscribe_once(make("once"))
            .subscribe(make("p2"));

        signal.trigger(&1);
        signal.trigger(&2);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["p1:1", "once:1", "p2:1", "p1:2", "p2:2"]
        );
        assert_eq!(signal.subscriber_count(), 2);
    }

    #[test]
    fn missed_fallback_runs_only_without_subscribers() {
        let missed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&missed);
        let mut signal = DeferredSignal::<u32>::new("test", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        signal.trigger(&7);
        assert_eq!(missed.load(Ordering::SeqCst), 1);

        signal.subscribe_once(|_| {});
        signal.trigger(&8);
        assert_eq!(missed.load(Ordering::SeqCst), 1);

        // The one-shot subscriber is gone, so the fallback takes over again.
        signal.trigger(&9);
        assert_eq!(missed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missed_fallback_receives_payload() {
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let mut signal = DeferredSignal::<u32>::silent("test");
        signal.on_missed(move |n| *slot.lock().unwrap() = Some(*n));

        signal.trigger(&42);

        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[test]
    fn handled_trigger_skips_missed_fallback() {
        let (log, make) = recorder();
        let missed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&missed);
        let mut signal = DeferredSignal::<u32>::new("test", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        signal.trigger_handled(&1);
        assert_eq!(missed.load(Ordering::SeqCst), 0);

        signal.subscribe_once(make("once"));
        signal.trigger_handled(&2);
        signal.trigger_handled(&3);

        assert_eq!(*log.lock().unwrap(), vec!["once:2"]);
        assert_eq!(missed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_removes_subscribers() {
        let mut signal = DeferredSignal::<u32>::warning("test", true);
        signal.subscribe(|_| {});
        assert!(signal.has_subscribers());
        signal.clear();
        assert!(!signal.has_subscribers());
        assert_eq!(signal.name(), "test");
    }
}
