// src/proxy.rs
//! Attribute proxies: stand-ins for one member of a unit.
//!
//! Creating a proxy is free. The first read or call resolves the owning unit
//! through the registry, fetches the member and keeps it in this instance;
//! later reads never touch the registry again.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::name::QualifiedName;
use crate::registry::Registry;
use crate::unit::{downcast_member, fetch_member, Member, Method, Unit};

pub struct AttributeProxy {
    registry: Arc<Registry>,
    owner: QualifiedName,
    member: String,
    value: OnceCell<Member>,
}

impl AttributeProxy {
    pub(crate) fn new(registry: Arc<Registry>, owner: QualifiedName, member: String) -> Self {
        Self {
            registry,
            owner,
            member,
            value: OnceCell::new(),
        }
    }

    pub fn owner(&self) -> &QualifiedName {
        &self.owner
    }

    pub fn member_name(&self) -> &str {
        &self.member
    }

    /// Whether this instance has already fetched its member.
    pub fn is_cached(&self) -> bool {
        self.value.get().is_some()
    }

    /// The member value, resolving the owner on first use.
    ///
    /// A failed fetch caches nothing, so a later call can still succeed
    /// (for instance once the owner has been registered).
    pub fn get(&self) -> Result<&Member> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        // resolve outside the cell: all waiting happens in the registry
        let unit = self.registry.resolve_name(&self.owner)?;
        self.fetch(&*unit)
    }

    pub async fn get_async(&self) -> Result<&Member> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let unit = self.registry.resolve_name_async(&self.owner).await?;
        self.fetch(&*unit)
    }

    /// Only the member lookup runs under the cell, so it happens once per proxy.
    fn fetch(&self, unit: &dyn Unit) -> Result<&Member> {
        self.value.get_or_try_init(|| {
            let value = fetch_member(&self.owner, unit, &self.member)?;
            tracing::debug!(owner = %self.owner, member = %self.member, "attribute fetched");
            Ok(value)
        })
    }

    /// The member as `&T`.
    pub fn downcast<T: Any>(&self) -> Result<&T> {
        downcast_member::<T>(&self.owner, &self.member, self.get()?)
    }

    /// Invoke the member, which must be a [`Method<A, R>`].
    pub fn call<A: 'static, R: 'static>(&self, args: A) -> Result<R> {
        let method = self.downcast::<Method<A, R>>()?;
        Ok(method.call(args))
    }
}

impl fmt::Debug for AttributeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeProxy")
            .field("owner", &self.owner)
            .field("member", &self.member)
            .field("cached", &self.is_cached())
            .finish()
    }
}
