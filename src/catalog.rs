// src/catalog.rs
//! Catalogs: static lists of names to bind lazily at startup.
//!
//! A catalog expands each name to include its parents and installs them
//! shallowest first, so `science.pack.slow` brings `science` and
//! `science.pack` along with it.

use std::collections::BTreeSet;

use crate::binding::Resolver;
use crate::error::{LazyError, Result};
use crate::name::QualifiedName;
use crate::registry::Registry;
use crate::unit::Namespace;

/// Where a catalog finds the resolver for a name.
pub trait ResolverSource {
    fn find(&self, name: &QualifiedName) -> Option<Resolver>;
}

impl<F> ResolverSource for F
where
    F: Fn(&QualifiedName) -> Option<Resolver>,
{
    fn find(&self, name: &QualifiedName) -> Option<Resolver> {
        self(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Newly registered, including empty parent namespaces.
    pub installed: Vec<QualifiedName>,
    /// Already present in the registry.
    pub skipped: Vec<QualifiedName>,
    /// No resolver and no registered parent to hang an empty namespace on.
    pub missing: Vec<QualifiedName>,
}

#[derive(Clone, Debug)]
pub struct Catalog {
    names: Vec<QualifiedName>,
}

impl Catalog {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all = BTreeSet::new();
        for raw in names {
            let name = QualifiedName::parse(raw.as_ref())?;
            all.extend(name.ancestors());
            all.insert(name);
        }
        let mut names: Vec<QualifiedName> = all.into_iter().collect();
        // stable: ties keep name order
        names.sort_by_key(QualifiedName::depth);
        Ok(Self { names })
    }

    /// Every name the catalog will install, shallowest first.
    pub fn names(&self) -> &[QualifiedName] {
        &self.names
    }

    pub fn install<S: ResolverSource + ?Sized>(&self, registry: &Registry, source: &S) -> InstallReport {
        let mut report = InstallReport::default();
        for name in &self.names {
            if registry.lookup_name(name).is_some() {
                report.skipped.push(name.clone());
                continue;
            }

            let resolver = match source.find(name) {
                Some(resolver) => resolver,
                None => match name.parent() {
                    Some(parent) if registry.lookup_name(&parent).is_some() => {
                        tracing::debug!(%name, "no resolver, binding an empty namespace");
                        crate::binding::resolver(|| Ok::<_, LazyError>(Namespace::new()))
                    }
                    _ => {
                        tracing::warn!(%name, "lazy binding not found");
                        report.missing.push(name.clone());
                        continue;
                    }
                },
            };

            match registry.register_resolver(name.clone(), resolver) {
                Ok(()) => report.installed.push(name.clone()),
                // lost a race with another installer
                Err(LazyError::AlreadyRegistered(_)) => report.skipped.push(name.clone()),
                Err(err) => {
                    tracing::warn!(%name, error = %err, "could not register lazy binding");
                    report.missing.push(name.clone());
                }
            }
        }
        report
    }
}
