//! Re-resolvable success/failure state with late-subscriber replay.
//!
//! A [`DeferredOutcome`] behaves like a promise whose result is remembered:
//! subscribing with [`then`](DeferredOutcome::then) after a success invokes the
//! callback immediately with the stored payload. Unlike a promise it may be
//! resolved again, to either branch. Resolving one branch forgets the other, so a
//! connection that succeeded and later failed replays only the failure.
//!
//! ```
//! use nexus_client::outcome::DeferredOutcome;
//! use std::sync::{Arc, Mutex};
//!
//! let mut outcome = DeferredOutcome::<u32, String>::silent("answer");
//! outcome.resolve_success(42);
//!
//! let seen = Arc::new(Mutex::new(None));
//! let slot = Arc::clone(&seen);
//! outcome.then(move |n| *slot.lock().unwrap() = Some(*n));
//! assert_eq!(*seen.lock().unwrap(), Some(42));
//! ```

use std::borrow::Cow;
use std::fmt;

use crate::signal::DeferredSignal;

/// Current resolution of a [`DeferredOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeState<S, F> {
    /// Not resolved yet, or reset since the last resolution.
    Pending,
    /// Resolved to the success branch.
    Succeeded(S),
    /// Resolved to the failure branch.
    Failed(F),
}

impl<S, F> OutcomeState<S, F> {
    /// Returns `true` while unresolved.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The success payload, if resolved to success.
    pub fn success(&self) -> Option<&S> {
        match self {
            Self::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    /// The failure payload, if resolved to failure.
    pub fn failure(&self) -> Option<&F> {
        match self {
            Self::Failed(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Single-logical-resolution notification built from two [`DeferredSignal`]s.
pub struct DeferredOutcome<S, F> {
    state: OutcomeState<S, F>,
    on_success: DeferredSignal<S>,
    on_failure: DeferredSignal<F>,
}

impl<S: 'static, F: 'static> DeferredOutcome<S, F> {
    /// Build an outcome from its two underlying signals.
    pub fn from_signals(on_success: DeferredSignal<S>, on_failure: DeferredSignal<F>) -> Self {
        Self {
            state: OutcomeState::Pending,
            on_success,
            on_failure,
        }
    }

    /// An outcome whose unobserved resolutions are dropped without a diagnostic.
    pub fn silent(name: &'static str) -> Self {
        Self::from_signals(
            DeferredSignal::silent(format!("{name}.then")),
            DeferredSignal::silent(format!("{name}.on_error")),
        )
    }

    /// Subscribe to success. Fires immediately if already succeeded; otherwise on
    /// every future success.
    pub fn then(&mut self, mut callback: impl FnMut(&S) + Send + 'static) -> &mut Self {
        match &self.state {
            OutcomeState::Succeeded(payload) => callback(payload),
            _ => {
                self.on_success.subscribe(callback);
            }
        }
        self
    }

    /// Subscribe to failure. Fires immediately if already failed; otherwise on
    /// every future failure.
    pub fn on_error(&mut self, mut callback: impl FnMut(&F) + Send + 'static) -> &mut Self {
        match &self.state {
            OutcomeState::Failed(payload) => callback(payload),
            _ => {
                self.on_failure.subscribe(callback);
            }
        }
        self
    }

    /// Record a success, forget any earlier failure, and notify success subscribers.
    pub fn resolve_success(&mut self, payload: S) {
        self.state = OutcomeState::Succeeded(payload);
        if let OutcomeState::Succeeded(payload) = &self.state {
            self.on_success.trigger(payload);
        }
    }

    /// Record a failure, forget any earlier success, and notify failure subscribers.
    pub fn resolve_failure(&mut self, payload: F) {
        self.state = OutcomeState::Failed(payload);
        if let OutcomeState::Failed(payload) = &self.state {
            self.on_failure.trigger(payload);
        }
    }

    /// Record a failure the caller recovers from itself. Subscribers are
    /// notified as usual, but nobody listening is not reported as missed.
    pub fn resolve_failure_handled(&mut self, payload: F) {
        self.state = OutcomeState::Failed(payload);
        if let OutcomeState::Failed(payload) = &self.state {
            self.on_failure.trigger_handled(payload);
        }
    }

    /// Forget the remembered resolution. Subscribers stay registered.
    pub fn reset(&mut self) {
        self.state = OutcomeState::Pending;
    }

    /// Current resolution.
    pub fn state(&self) -> &OutcomeState<S, F> {
        &self.state
    }

    /// Returns `true` while unresolved.
    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Returns `true` if the last resolution was a success.
    pub fn is_succeeded(&self) -> bool {
        matches!(self.state, OutcomeState::Succeeded(_))
    }

    /// Returns `true` if the last resolution was a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, OutcomeState::Failed(_))
    }
}

impl<S: fmt::Debug + 'static, F: fmt::Debug + 'static> DeferredOutcome<S, F> {
    /// An outcome whose unobserved resolutions log a warning, unless `suppressed`.
    pub fn warning(name: impl Into<Cow<'static, str>>, suppressed: bool) -> Self {
        let name = name.into();
        Self::from_signals(
            DeferredSignal::warning(format!("{name}.then"), suppressed),
            DeferredSignal::warning(format!("{name}.on_error"), suppressed),
        )
    }
}

impl<S: fmt::Debug, F: fmt::Debug> fmt::Debug for DeferredOutcome<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredOutcome")
            .field("state", &self.state)
            .field("on_success", &self.on_success)
            .field("on_failure", &self.on_failure)
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

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Log, tag: &'static str) -> impl FnMut(&u32) + Send + 'static {
        let log = Arc::clone(log);
        move |n: &u32| log.lock().unwrap().push(format!("{tag}:{n}"))
    }

    #[test]
    fn then_after_success_fires_immediately() {
        let seen = log();
        let mut outcome = DeferredOutcome::<u32, u32>::silent("test");
        outcome.resolve_success(42);

        outcome.then(push(&seen, "late"));

        assert_eq!(*seen.lock().unwrap(), vec!["late:42"]);
    }

    #[test]
    fn then_before_success_fires_in_registration_order() {
        let seen = log();
        let mut outcome = DeferredOutcome::<u32, u32>::silent("test");
        outcome.then(push(&seen, "first")).then(push(&seen, "second"));
        assert!(seen.lock().unwrap().is_empty());

        outcome.resolve_success(42);

        assert_eq!(*seen.lock().unwrap(), vec!["first:42", "second:42"]);
    }

    #[test]
    fn failure_after_success_clears_remembered_success() {
        let seen = log();
        let mut outcome = DeferredOutcome::<u32, u32>::silent("test");
        outcome.resolve_success(1);
        outcome.resolve_failure(2);

        outcome.then(push(&seen, "then"));
        outcome.on_error(push(&seen, "error"));

        assert_eq!(*seen.lock().unwrap(), vec!["error:2"]);
        assert_eq!(outcome.state().failure(), Some(&2));
        assert!(outcome.state().success().is_none());
    }

    #[test]
    fn subscribers_fire_again_on_re_resolution() {
        let seen = log();
        let mut outcome = DeferredOutcome::<u32, u32>::silent("test");
        outcome.then(push(&seen, "then"));

        outcome.resolve_success(1);
        outcome.reset();
        assert!(outcome.is_pending());
        outcome.resolve_success(2);

        assert_eq!(*seen.lock().unwrap(), vec!["then:1", "then:2"]);
    }

    #[test]
    fn missed_fallback_fires_at_resolution_time() {
        let missed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&missed);
        let on_success = DeferredSignal::<u32>::new("test.then", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut outcome =
            DeferredOutcome::from_signals(on_success, DeferredSignal::<u32>::silent("e"));
        assert_eq!(missed.load(Ordering::SeqCst), 0);

        outcome.resolve_success(5);

        assert_eq!(missed.load(Ordering::SeqCst), 1);
        assert!(outcome.is_succeeded());
        assert!(!outcome.is_failed());
    }

    #[test]
    fn handled_failure_is_remembered_without_missed_fallback() {
        let missed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&missed);
        let on_failure = DeferredSignal::<u32>::new("test.on_error", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut outcome =
            DeferredOutcome::from_signals(DeferredSignal::<u32>::silent("t"), on_failure);

        outcome.resolve_failure_handled(3);
        assert_eq!(missed.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.state().failure(), Some(&3));

        let seen = log();
        outcome.on_error(push(&seen, "late"));
        assert_eq!(*seen.lock().unwrap(), vec!["late:3"]);

        // A replayed subscriber is not kept, so an ordinary failure is missed.
        outcome.resolve_failure(4);
        assert_eq!(missed.load(Ordering::SeqCst), 1);
    }
}
