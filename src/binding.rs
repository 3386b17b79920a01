// src/binding.rs
//! Binding records: the per-name state cell and its once-only trigger.
//!
//! A record moves strictly forward, `Unloaded -> Loading -> Loaded | Failed`.
//! Exactly one caller wins the `Unloaded -> Loading` claim and runs the
//! resolver with no lock held; everyone else either blocks on the condvar or,
//! from async code, awaits the `Notify`.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::{BoxError, LazyError, ResolverError, ResolverPanicked, Result};
use crate::name::QualifiedName;
use crate::unit::Unit;

/// The deferred initialization routine for one binding.
pub type Resolver = Box<dyn FnOnce() -> Result<Arc<dyn Unit>, BoxError> + Send + 'static>;

/// Box a typed resolver closure into a [`Resolver`].
pub fn resolver<F, U, E>(f: F) -> Resolver
where
    F: FnOnce() -> Result<U, E> + Send + 'static,
    U: Unit,
    E: Into<BoxError>,
{
    Box::new(move || {
        f().map(|unit| Arc::new(unit) as Arc<dyn Unit>)
            .map_err(Into::into)
    })
}

/// Observable state of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

impl BindingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BindingState::Loaded | BindingState::Failed)
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindingState::Unloaded => "unloaded",
            BindingState::Loading => "loading",
            BindingState::Loaded => "loaded",
            BindingState::Failed => "failed",
        })
    }
}

enum Slot {
    Unloaded(Resolver),
    Loading { owner: ThreadId },
    Loaded(Arc<dyn Unit>),
    Failed(ResolverError),
}

impl Slot {
    fn state(&self) -> BindingState {
        match self {
            Slot::Unloaded(_) => BindingState::Unloaded,
            Slot::Loading { .. } => BindingState::Loading,
            Slot::Loaded(_) => BindingState::Loaded,
            Slot::Failed(_) => BindingState::Failed,
        }
    }
}

/// Outcome of trying to move a record out of `Unloaded`.
pub(crate) enum Claim {
    /// The record is terminal (or the caller re-entered its own resolution).
    Ready(Result<Arc<dyn Unit>>),
    /// The caller won the race and must run the resolver via [`Binding::run`].
    Won(Resolver),
    /// Another thread is resolving.
    Busy,
}

pub(crate) struct Binding {
    name: QualifiedName,
    slot: Mutex<Slot>,
    settled: Condvar,
    notify: Notify,
}

impl Binding {
    pub(crate) fn new(name: QualifiedName, resolver: Resolver) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot::Unloaded(resolver)),
            settled: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub(crate) fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub(crate) fn state(&self) -> BindingState {
        self.slot.lock().state()
    }

    /// The thread currently running the resolver, if any.
    pub(crate) fn loading_owner(&self) -> Option<ThreadId> {
        match &*self.slot.lock() {
            Slot::Loading { owner } => Some(*owner),
            _ => None,
        }
    }

    /// The cached outcome, if the record has settled.
    pub(crate) fn outcome(&self) -> Option<Result<Arc<dyn Unit>>> {
        match &*self.slot.lock() {
            Slot::Loaded(unit) => Some(Ok(Arc::clone(unit))),
            Slot::Failed(err) => Some(Err(self.failure(err))),
            _ => None,
        }
    }

    pub(crate) fn try_claim(&self) -> Claim {
        let me = thread::current().id();
        let mut slot = self.slot.lock();
        // take the slot out; every arm but `Unloaded` puts back what it found
        let (next, claim) = match std::mem::replace(&mut *slot, Slot::Loading { owner: me }) {
            Slot::Unloaded(resolver) => (Slot::Loading { owner: me }, Claim::Won(resolver)),
            Slot::Loaded(unit) => {
                let ready = Claim::Ready(Ok(Arc::clone(&unit)));
                (Slot::Loaded(unit), ready)
            }
            Slot::Failed(err) => {
                let ready = Claim::Ready(Err(self.failure(&err)));
                (Slot::Failed(err), ready)
            }
            Slot::Loading { owner } if owner == me => {
                tracing::error!(name = %self.name, "resolver re-entered its own binding");
                let cycle = Claim::Ready(Err(LazyError::CyclicInitialization(self.name.clone())));
                (Slot::Loading { owner }, cycle)
            }
            Slot::Loading { owner } => (Slot::Loading { owner }, Claim::Busy),
        };
        *slot = next;
        claim
    }

    /// Run a claimed resolver and publish its outcome.
    ///
    /// If the resolver unwinds, the record is failed before the panic
    /// continues so waiters are never left hanging on `Loading`.
    pub(crate) fn run(&self, resolver: Resolver) -> Result<Arc<dyn Unit>> {
        let span = tracing::info_span!("resolve", name = %self.name);
        let _enter = span.enter();
        tracing::info!("resolution started");

        let started = Instant::now();
        let mut guard = UnwindGuard {
            binding: self,
            armed: true,
        };
        let outcome = resolver();
        guard.armed = false;

        match &outcome {
            Ok(_) => tracing::info!(elapsed = ?started.elapsed(), "resolution finished"),
            Err(err) => tracing::warn!(elapsed = ?started.elapsed(), error = %err, "resolver failed"),
        }
        self.settle(outcome.map_err(ResolverError::from))
    }

    fn settle(&self, outcome: Result<Arc<dyn Unit>, ResolverError>) -> Result<Arc<dyn Unit>> {
        let result = {
            let mut slot = self.slot.lock();
            match outcome {
                Ok(unit) => {
                    *slot = Slot::Loaded(Arc::clone(&unit));
                    Ok(unit)
                }
                Err(err) => {
                    let replay = self.failure(&err);
                    *slot = Slot::Failed(err);
                    Err(replay)
                }
            }
        };
        self.settled.notify_all();
        self.notify.notify_waiters();
        result
    }

    /// Block until the record leaves `Loading`. Returns `false` on timeout.
    pub(crate) fn wait_settled(&self, deadline: Option<Instant>) -> bool {
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Loading { .. }) {
            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut slot, deadline).timed_out() {
                        return !matches!(*slot, Slot::Loading { .. });
                    }
                }
                None => self.settled.wait(&mut slot),
            }
        }
        true
    }

    /// Suspend until the record leaves `Loading`.
    pub(crate) async fn settled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register interest before checking, so a settle in between is not lost
            notified.as_mut().enable();
            if self.state() != BindingState::Loading {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn timed_out(&self, waited: Duration) -> LazyError {
        tracing::warn!(name = %self.name, ?waited, "gave up waiting for resolution");
        LazyError::ResolutionTimedOut {
            name: self.name.clone(),
            waited,
        }
    }

    fn failure(&self, err: &ResolverError) -> LazyError {
        LazyError::ResolutionFailed {
            name: self.name.clone(),
            source: Arc::clone(err),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

struct UnwindGuard<'a> {
    binding: &'a Binding,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(name = %self.binding.name, "resolver panicked");
            let _ = self.binding.settle(Err(Arc::new(ResolverPanicked)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Namespace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn binding(name: &str, resolver: Resolver) -> Binding {
        Binding::new(QualifiedName::parse(name).unwrap(), resolver)
    }

    fn claim_and_run(b: &Binding) -> Result<Arc<dyn Unit>> {
        match b.try_claim() {
            Claim::Ready(outcome) => outcome,
            Claim::Won(r) => b.run(r),
            Claim::Busy => panic!("nobody else is resolving"),
        }
    }

    #[test]
    fn moves_forward_to_loaded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let b = binding(
            "alpha",
            resolver(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(Namespace::new())
            }),
        );
        assert_eq!(b.state(), BindingState::Unloaded);
        assert!(b.outcome().is_none());

        let first = claim_and_run(&b).unwrap();
        assert_eq!(b.state(), BindingState::Loaded);
        let second = claim_and_run(&b).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_sticky_and_shared() {
        let b = binding("beta", resolver(|| Err::<Namespace, _>("boom")));
        let first = claim_and_run(&b).unwrap_err();
        let second = claim_and_run(&b).unwrap_err();
        assert_eq!(b.state(), BindingState::Failed);
        assert!(first.to_string().contains("boom"));
        assert!(Arc::ptr_eq(
            first.resolver_error().unwrap(),
            second.resolver_error().unwrap()
        ));
    }

    #[test]
    fn claim_is_exclusive_while_loading() {
        let b = binding("gamma", resolver(|| Ok::<_, BoxError>(Namespace::new())));
        let Claim::Won(r) = b.try_claim() else {
            panic!("first claim must win");
        };
        assert_eq!(b.state(), BindingState::Loading);
        assert_eq!(b.loading_owner(), Some(thread::current().id()));

        // same thread again: re-entry
        match b.try_claim() {
            Claim::Ready(Err(LazyError::CyclicInitialization(name))) => {
                assert_eq!(name.to_string(), "gamma")
            }
            _ => panic!("expected cycle"),
        }

        // another thread: busy
        std::thread::scope(|s| {
            s.spawn(|| assert!(matches!(b.try_claim(), Claim::Busy)));
        });
        // neither refused claim disturbs the record
        assert_eq!(b.state(), BindingState::Loading);
        assert_eq!(b.loading_owner(), Some(thread::current().id()));

        b.run(r).unwrap();
        assert!(b.wait_settled(None));
    }

    #[test]
    fn panicking_resolver_fails_the_record() {
        let b = binding(
            "delta",
            Box::new(|| -> Result<Arc<dyn Unit>, BoxError> { panic!("kaboom") }),
        );
        let Claim::Won(r) = b.try_claim() else {
            panic!("first claim must win");
        };
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| b.run(r)));
        assert!(unwound.is_err());
        assert_eq!(b.state(), BindingState::Failed);
        let err = claim_and_run(&b).unwrap_err();
        assert!(err.to_string().contains("resolver panicked"));
    }

    #[test]
    fn wait_times_out_while_loading() {
        let b = binding("eps", resolver(|| Ok::<_, BoxError>(Namespace::new())));
        let Claim::Won(r) = b.try_claim() else {
            panic!("first claim must win");
        };
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!b.wait_settled(Some(deadline)));
        b.run(r).unwrap();
        assert!(b.wait_settled(Some(Instant::now())));
    }
}
