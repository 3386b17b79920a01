// src/placeholder.rs
//! Unit placeholders: stand-ins for a whole unit that has not been resolved yet.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::binding::BindingState;
use crate::error::{LazyError, Result};
use crate::name::QualifiedName;
use crate::proxy::AttributeProxy;
use crate::registry::Registry;
use crate::unit::{downcast_member, downcast_unit, fetch_member, Member, Method, Unit};

/// Holds only a name. Every access goes through [`Registry::resolve_name`],
/// so all placeholders for one name agree on what they see.
#[derive(Clone)]
pub struct UnitPlaceholder {
    registry: Arc<Registry>,
    name: QualifiedName,
}

impl UnitPlaceholder {
    pub(crate) fn new(registry: Arc<Registry>, name: QualifiedName) -> Self {
        Self { registry, name }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// `None` until the name is registered.
    pub fn state(&self) -> Option<BindingState> {
        self.registry.lookup_name(&self.name)
    }

    pub fn resolve(&self) -> Result<Arc<dyn Unit>> {
        self.registry.resolve_name(&self.name)
    }

    pub async fn resolve_async(&self) -> Result<Arc<dyn Unit>> {
        self.registry.resolve_name_async(&self.name).await
    }

    /// Run `f` against the resolved unit.
    pub fn with<R>(&self, f: impl FnOnce(&dyn Unit) -> R) -> Result<R> {
        let unit = self.resolve()?;
        Ok(f(&*unit))
    }

    /// Resolve and downcast to the unit's concrete type.
    pub fn downcast<T: Unit>(&self) -> Result<Arc<T>> {
        let unit = self.resolve()?;
        downcast_unit::<T>(&unit).ok_or_else(|| LazyError::UnitType {
            name: self.name.clone(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Resolve and read one member.
    pub fn member(&self, member: &str) -> Result<Member> {
        let unit = self.resolve()?;
        fetch_member(&self.name, &*unit, member)
    }

    /// Resolve and read one member as `T`, cloning it out.
    pub fn member_as<T: Any + Clone>(&self, member: &str) -> Result<T> {
        let value = self.member(member)?;
        downcast_member::<T>(&self.name, member, &value).cloned()
    }

    /// Resolve and invoke a [`Method`] member.
    pub fn call<A: 'static, R: 'static>(&self, member: &str, args: A) -> Result<R> {
        let value = self.member(member)?;
        let method = downcast_member::<Method<A, R>>(&self.name, member, &value)?;
        Ok(method.call(args))
    }

    /// A proxy for one member of this unit. Resolves nothing.
    pub fn attribute(&self, member: &str) -> AttributeProxy {
        AttributeProxy::new(Arc::clone(&self.registry), self.name.clone(), member.to_owned())
    }
}

impl fmt::Debug for UnitPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitPlaceholder")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::unit::Namespace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Junk {
        base: i64,
    }

    impl Unit for Junk {
        fn member(&self, name: &str) -> Option<Member> {
            match name {
                "base" => Some(Arc::new(self.base) as Member),
                _ => None,
            }
        }
    }

    #[test]
    fn placeholder_is_inert_until_touched() {
        let registry = Arc::new(Registry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        registry
            .register("science.pack.junk", move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(Junk { base: 42 })
            })
            .unwrap();

        let junk = registry.get_placeholder("science.pack.junk").unwrap();
        let again = junk.clone();
        assert_eq!(junk.state(), Some(BindingState::Unloaded));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(junk.member_as::<i64>("base").unwrap(), 42);
        assert_eq!(again.downcast::<Junk>().unwrap().base, 42);
        assert_eq!(junk.with(|u| u.member_names().len()).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(junk.state(), Some(BindingState::Loaded));
    }

    #[test]
    fn member_errors_do_not_touch_state() {
        let registry = Arc::new(Registry::new());
        registry
            .register("ns", || Ok::<_, BoxError>(Namespace::new().with("n", 1u32)))
            .unwrap();
        let ns = registry.get_placeholder("ns").unwrap();

        assert!(matches!(ns.member("missing"), Err(LazyError::NoSuchMember { .. })));
        assert!(matches!(ns.member_as::<String>("n"), Err(LazyError::MemberType { .. })));
        assert!(matches!(ns.downcast::<Junk>(), Err(LazyError::UnitType { .. })));
        assert_eq!(ns.state(), Some(BindingState::Loaded));
        assert_eq!(ns.member_as::<u32>("n").unwrap(), 1);
    }

    #[test]
    fn calls_method_members() {
        let registry = Arc::new(Registry::new());
        registry
            .register("math", || {
                Ok::<_, BoxError>(Namespace::new().with_method("add", |(a, b): (i32, i32)| a + b))
            })
            .unwrap();
        let math = registry.get_placeholder("math").unwrap();
        assert_eq!(math.call::<(i32, i32), i32>("add", (40, 2)).unwrap(), 42);
        assert!(matches!(
            math.call::<i32, i32>("add", 1),
            Err(LazyError::MemberType { .. })
        ));
    }

    #[test]
    fn unregistered_placeholder_fails_without_side_effects() {
        let registry = Arc::new(Registry::new());
        let ghost = registry.get_placeholder("ghost").unwrap();
        assert_eq!(ghost.state(), None);
        assert!(matches!(ghost.resolve(), Err(LazyError::NotRegistered(_))));
        assert!(registry.dump_state().is_empty());
    }
}
