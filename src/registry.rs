// src/registry.rs
//! Lazy-binding registry
//! Maps qualified names to binding records and gates their resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::binding::{resolver, Binding, BindingState, Claim, Resolver};
use crate::config::RegistryConfig;
use crate::error::{BoxError, LazyError, Result};
use crate::name::QualifiedName;
use crate::placeholder::UnitPlaceholder;
use crate::proxy::AttributeProxy;
use crate::unit::Unit;

pub struct Registry {
    /// One record per qualified name, never removed.
    bindings: DashMap<QualifiedName, Arc<Binding>>,
    config: RwLock<RegistryConfig>,
    /// Threads currently blocked on someone else's resolution, and on what.
    waiting: Mutex<HashMap<ThreadId, Arc<Binding>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new, empty registry with default settings.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            bindings: DashMap::new(),
            config: RwLock::new(config),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config.read().clone()
    }

    /// Change how long callers wait on another thread's resolution.
    pub fn set_wait_timeout(&self, timeout: Option<Duration>) {
        self.config.write().wait_timeout = timeout;
    }

    /// Declare `name` as lazily bound. Nothing runs until the first resolve.
    pub fn register<F, U, E>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<U, E> + Send + 'static,
        U: Unit,
        E: Into<BoxError>,
    {
        self.register_resolver(QualifiedName::parse(name)?, resolver(f))
    }

    /// Register an already boxed resolver.
    pub fn register_resolver(&self, name: QualifiedName, resolver: Resolver) -> Result<()> {
        match self.bindings.entry(name) {
            Entry::Occupied(entry) => Err(LazyError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(name = %entry.key(), "registered lazy binding");
                let binding = Binding::new(entry.key().clone(), resolver);
                entry.insert(Arc::new(binding));
                Ok(())
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        QualifiedName::parse(name)
            .map(|name| self.bindings.contains_key(&name))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolve `name`, running its resolver if this is the first touch.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Unit>> {
        self.resolve_name(&QualifiedName::parse(name)?)
    }

    pub fn resolve_name(&self, name: &QualifiedName) -> Result<Arc<dyn Unit>> {
        let binding = self.binding(name)?;
        if let Some(outcome) = binding.outcome() {
            return outcome;
        }
        let resolve_parents = self.config.read().resolve_parents;
        if resolve_parents {
            for parent in self.registered_ancestors(name) {
                self.resolve_binding(&parent)?;
            }
        }
        self.resolve_binding(&binding)
    }

    /// Cooperative variant of [`Registry::resolve`]: waiting suspends the task
    /// instead of blocking the thread.
    pub async fn resolve_async(&self, name: &str) -> Result<Arc<dyn Unit>> {
        self.resolve_name_async(&QualifiedName::parse(name)?).await
    }

    pub async fn resolve_name_async(&self, name: &QualifiedName) -> Result<Arc<dyn Unit>> {
        let binding = self.binding(name)?;
        if let Some(outcome) = binding.outcome() {
            return outcome;
        }
        let resolve_parents = self.config.read().resolve_parents;
        if resolve_parents {
            for parent in self.registered_ancestors(name) {
                self.resolve_binding_async(&parent).await?;
            }
        }
        self.resolve_binding_async(&binding).await
    }

    /// Current state of `name`, without side effects.
    pub fn lookup(&self, name: &str) -> Option<BindingState> {
        let name = QualifiedName::parse(name).ok()?;
        self.lookup_name(&name)
    }

    pub fn lookup_name(&self, name: &QualifiedName) -> Option<BindingState> {
        self.bindings.get(name).map(|b| b.state())
    }

    /// Every registered name with its state, ordered by name.
    pub fn dump_state(&self) -> Snapshot {
        let mut entries: Vec<(QualifiedName, BindingState)> = self
            .bindings
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Snapshot { entries }
    }

    /// A stand-in for the whole unit. May be taken before `name` is registered.
    pub fn get_placeholder(self: &Arc<Self>, name: &str) -> Result<UnitPlaceholder> {
        Ok(UnitPlaceholder::new(
            Arc::clone(self),
            QualifiedName::parse(name)?,
        ))
    }

    /// A stand-in for one member of the unit. Creating it resolves nothing.
    pub fn get_attribute_proxy(self: &Arc<Self>, name: &str, member: &str) -> Result<AttributeProxy> {
        Ok(AttributeProxy::new(
            Arc::clone(self),
            QualifiedName::parse(name)?,
            member.to_owned(),
        ))
    }

    fn binding(&self, name: &QualifiedName) -> Result<Arc<Binding>> {
        // clone out so no shard lock is held while a resolver runs
        self.bindings
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LazyError::NotRegistered(name.clone()))
    }

    fn registered_ancestors(&self, name: &QualifiedName) -> Vec<Arc<Binding>> {
        name.ancestors()
            .iter()
            .filter_map(|ancestor| self.bindings.get(ancestor).map(|e| Arc::clone(e.value())))
            .collect()
    }

    fn resolve_binding(&self, binding: &Arc<Binding>) -> Result<Arc<dyn Unit>> {
        let timeout = self.config.read().wait_timeout;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            match binding.try_claim() {
                Claim::Ready(outcome) => return outcome,
                Claim::Won(resolver) => return binding.run(resolver),
                Claim::Busy => self.wait_on(binding, deadline, timeout)?,
            }
        }
    }

    async fn resolve_binding_async(&self, binding: &Arc<Binding>) -> Result<Arc<dyn Unit>> {
        let timeout = self.config.read().wait_timeout;
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            match binding.try_claim() {
                Claim::Ready(outcome) => return outcome,
                Claim::Won(resolver) => return binding.run(resolver),
                Claim::Busy => match (deadline, timeout) {
                    (Some(deadline), Some(timeout)) => {
                        tokio::time::timeout_at(deadline, binding.settled())
                            .await
                            .map_err(|_| binding.timed_out(timeout))?;
                    }
                    _ => binding.settled().await,
                },
            }
        }
    }

    /// Block the current thread until `binding` settles, refusing to wait if
    /// that would close a cycle of threads waiting on each other.
    fn wait_on(
        &self,
        binding: &Arc<Binding>,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let me = thread::current().id();
        {
            let mut waiting = self.waiting.lock();
            let mut owner = binding.loading_owner();
            let mut hops = 0;
            while let Some(thread) = owner {
                if thread == me {
                    tracing::error!(name = %binding.name(), "waiting would deadlock");
                    return Err(LazyError::CyclicInitialization(binding.name().clone()));
                }
                if hops > waiting.len() {
                    break;
                }
                hops += 1;
                owner = waiting.get(&thread).and_then(|b| b.loading_owner());
            }
            waiting.insert(me, Arc::clone(binding));
        }

        let settled = binding.wait_settled(deadline);
        self.waiting.lock().remove(&me);

        match (settled, timeout) {
            (false, Some(timeout)) => Err(binding.timed_out(timeout)),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("bindings", &self.bindings.len())
            .field("config", &*self.config.read())
            .finish()
    }
}

/// Point-in-time view of every binding, ordered by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<(QualifiedName, BindingState)>,
}

impl Snapshot {
    pub fn entries(&self) -> &[(QualifiedName, BindingState)] {
        &self.entries
    }

    pub fn state_of(&self, name: &str) -> Option<BindingState> {
        self.entries
            .iter()
            .find(|(n, _)| n.to_string() == name)
            .map(|(_, state)| *state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.entries.iter().map(|(n, _)| n.to_string()).collect();
        let width = names.iter().map(String::len).max().unwrap_or(0);
        for (name, (_, state)) in names.iter().zip(&self.entries) {
            writeln!(f, "  {name:<width$}  {state}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Namespace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_unit() -> std::result::Result<Namespace, BoxError> {
        Ok(Namespace::new())
    }

    #[test]
    fn register_then_resolve() {
        let registry = Registry::new();
        registry.register("a.b", ok_unit).unwrap();
        assert_eq!(registry.lookup("a.b"), Some(BindingState::Unloaded));
        registry.resolve("a.b").unwrap();
        assert_eq!(registry.lookup("a.b"), Some(BindingState::Loaded));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        registry.register("dup", ok_unit).unwrap();
        let err = registry.register("dup", ok_unit).unwrap_err();
        assert!(matches!(err, LazyError::AlreadyRegistered(ref n) if n.to_string() == "dup"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("dup"), Some(BindingState::Unloaded));
    }

    #[test]
    fn unknown_name_is_not_registered() {
        let registry = Registry::new();
        assert!(matches!(registry.resolve("nope"), Err(LazyError::NotRegistered(_))));
        assert!(matches!(registry.resolve("no..pe"), Err(LazyError::InvalidName(_))));
        assert_eq!(registry.lookup("nope"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn parents_resolve_before_children() {
        let registry = Registry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["pkg", "pkg.mid.leaf"] {
            let order = order.clone();
            registry
                .register(name, move || {
                    order.lock().push(name);
                    ok_unit()
                })
                .unwrap();
        }
        registry.resolve("pkg.mid.leaf").unwrap();
        assert_eq!(*order.lock(), vec!["pkg", "pkg.mid.leaf"]);
    }

    #[test]
    fn parent_resolution_can_be_disabled() {
        let registry = Registry::with_config(RegistryConfig::new().resolve_parents(false));
        registry.register("pkg", ok_unit).unwrap();
        registry.register("pkg.leaf", ok_unit).unwrap();
        registry.resolve("pkg.leaf").unwrap();
        assert_eq!(registry.lookup("pkg"), Some(BindingState::Unloaded));
    }

    #[test]
    fn failed_parent_blocks_child() {
        let registry = Registry::new();
        registry.register("pkg", || Err::<Namespace, _>("parent broke")).unwrap();
        registry.register("pkg.leaf", ok_unit).unwrap();
        let err = registry.resolve("pkg.leaf").unwrap_err();
        assert!(err.to_string().contains("parent broke"));
        assert_eq!(registry.lookup("pkg.leaf"), Some(BindingState::Unloaded));
    }

    #[test]
    fn self_reference_is_cyclic() {
        let registry = Arc::new(Registry::new());
        let inner = registry.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        registry
            .register("selfish", move || {
                c.fetch_add(1, Ordering::SeqCst);
                inner.resolve("selfish").map(|_| Namespace::new())
            })
            .unwrap();

        let err = registry.resolve("selfish").unwrap_err();
        let cause = err.resolver_error().unwrap();
        assert!(cause.to_string().contains("cyclic initialization of `selfish`"));
        assert_eq!(registry.lookup("selfish"), Some(BindingState::Failed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolver_may_resolve_other_names() {
        let registry = Arc::new(Registry::new());
        registry.register("dep", || Ok::<_, BoxError>(Namespace::new().with("n", 1))).unwrap();
        let inner = registry.clone();
        registry
            .register("app", move || {
                let dep = inner.resolve("dep")?;
                let n = dep.member("n").and_then(|m| m.downcast_ref::<i32>().copied());
                Ok::<_, BoxError>(Namespace::new().with("n", n.unwrap_or(0) + 1))
            })
            .unwrap();
        let app = registry.resolve("app").unwrap();
        assert_eq!(app.member("n").unwrap().downcast_ref::<i32>(), Some(&2));
    }

    #[test]
    fn snapshot_is_ordered_and_printable() {
        let registry = Registry::new();
        for name in ["b", "a.z", "a"] {
            registry.register(name, ok_unit).unwrap();
        }
        registry.resolve("a").unwrap();
        let snapshot = registry.dump_state();
        let names: Vec<String> = snapshot.entries().iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["a", "a.z", "b"]);
        assert_eq!(snapshot.state_of("a"), Some(BindingState::Loaded));
        assert_eq!(snapshot.state_of("b"), Some(BindingState::Unloaded));
        assert_eq!(snapshot.to_string(), "  a    loaded\n  a.z  unloaded\n  b    unloaded\n");
    }
}
