// src/error.rs
//! Error kinds surfaced by the registry, placeholders and proxies.

use std::sync::Arc;
use std::time::Duration;

use crate::name::QualifiedName;

/// What a resolver may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A recorded resolver failure. Shared so that every caller sees the same value.
pub type ResolverError = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = LazyError> = std::result::Result<T, E>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LazyError {
    #[error("invalid qualified name {0:?}")]
    InvalidName(String),

    #[error("`{0}` is already registered")]
    AlreadyRegistered(QualifiedName),

    #[error("`{0}` is not registered")]
    NotRegistered(QualifiedName),

    /// Sticky: replayed to every caller of `name` for the life of the registry.
    #[error("resolving `{name}` failed: {source}")]
    ResolutionFailed {
        name: QualifiedName,
        #[source]
        source: ResolverError,
    },

    #[error("`{owner}` has no member `{member}`")]
    NoSuchMember { owner: QualifiedName, member: String },

    #[error("`{name}` is not a {expected}")]
    UnitType {
        name: QualifiedName,
        expected: &'static str,
    },

    #[error("`{owner}.{member}` is not a {expected}")]
    MemberType {
        owner: QualifiedName,
        member: String,
        expected: &'static str,
    },

    #[error("cyclic initialization of `{0}`")]
    CyclicInitialization(QualifiedName),

    #[error("timed out after {waited:?} waiting for `{name}` to resolve")]
    ResolutionTimedOut { name: QualifiedName, waited: Duration },
}

impl LazyError {
    /// The recorded resolver failure, if this is a `ResolutionFailed`.
    pub fn resolver_error(&self) -> Option<&ResolverError> {
        match self {
            LazyError::ResolutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure recorded when a resolver unwinds instead of returning.
#[derive(Debug, thiserror::Error)]
#[error("resolver panicked")]
pub(crate) struct ResolverPanicked;
