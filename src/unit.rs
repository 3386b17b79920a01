// src/unit.rs
//! Units: the opaque values produced by resolvers, and the fixed capability
//! interface placeholders and proxies forward to.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LazyError, Result};
use crate::name::QualifiedName;

/// A type-erased member value fetched off a unit.
pub type Member = Arc<dyn Any + Send + Sync>;

/// Upcasting helper so resolved units can be downcast to their concrete type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// What every lazily bound unit exposes.
///
/// The registry never looks inside a unit; only placeholders and attribute
/// proxies use `member` to reach into one after it has been resolved.
pub trait Unit: AsAny {
    /// Fetch a named member, or `None` if the unit has no such member.
    fn member(&self, name: &str) -> Option<Member>;

    /// Names of the members this unit exposes, for introspection.
    fn member_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl fmt::Debug for dyn Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("members", &self.member_names())
            .finish()
    }
}

/// Downcast a shared unit to its concrete type.
pub(crate) fn downcast_unit<T: Unit>(unit: &Arc<dyn Unit>) -> Option<Arc<T>> {
    AsAny::into_any_arc(Arc::clone(unit)).downcast::<T>().ok()
}

pub(crate) fn fetch_member(owner: &QualifiedName, unit: &dyn Unit, member: &str) -> Result<Member> {
    unit.member(member).ok_or_else(|| LazyError::NoSuchMember {
        owner: owner.clone(),
        member: member.to_owned(),
    })
}

pub(crate) fn downcast_member<'m, T: Any>(owner: &QualifiedName, member: &str, value: &'m Member) -> Result<&'m T> {
    value.downcast_ref::<T>().ok_or_else(|| LazyError::MemberType {
        owner: owner.clone(),
        member: member.to_owned(),
        expected: std::any::type_name::<T>(),
    })
}

/// A callable member. Stored inside a [`Member`] so proxies can invoke it.
pub struct Method<A, R> {
    f: Arc<dyn Fn(A) -> R + Send + Sync>,
}

impl<A, R> Method<A, R> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn call(&self, args: A) -> R {
        (self.f)(args)
    }
}

impl<A, R> Clone for Method<A, R> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<A, R> fmt::Debug for Method<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Method(..)")
    }
}

/// A plain unit that is just an ordered bag of members.
#[derive(Default, Clone)]
pub struct Namespace {
    members: BTreeMap<String, Member>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a plain value.
    pub fn with<V: Any + Send + Sync>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style insert of a callable member.
    pub fn with_method<A, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.with(name, Method::new(f))
    }

    pub fn insert<V: Any + Send + Sync>(&mut self, name: impl Into<String>, value: V) {
        self.members.insert(name.into(), Arc::new(value));
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Unit for Namespace {
    fn member(&self, name: &str) -> Option<Member> {
        self.members.get(name).cloned()
    }

    fn member_names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .finish()
    }
}
