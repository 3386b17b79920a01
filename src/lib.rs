// src/lib.rs
//! Lazybind: a deferred-initialization registry.
//!
//! Declare expensive units up front with [`Registry::register`], hand out
//! [`UnitPlaceholder`]s and [`AttributeProxy`]s, and let the first real use
//! pay for initialization exactly once.
//!
//! ```
//! use std::sync::Arc;
//! use lazybind::{BoxError, Namespace, Registry};
//!
//! let registry = Arc::new(Registry::new());
//! let answer = registry.get_attribute_proxy("deep.thought", "answer").unwrap();
//!
//! registry
//!     .register("deep.thought", || Ok::<_, BoxError>(Namespace::new().with("answer", 42u32)))
//!     .unwrap();
//!
//! assert_eq!(*answer.downcast::<u32>().unwrap(), 42);
//! ```

pub mod binding;
pub mod catalog;
pub mod config;
pub mod error;
pub mod name;
pub mod placeholder;
pub mod proxy;
pub mod registry;
pub mod unit;

pub use binding::{resolver, BindingState, Resolver};
pub use catalog::{Catalog, InstallReport, ResolverSource};
pub use config::RegistryConfig;
pub use error::{BoxError, LazyError, ResolverError, Result};
pub use name::QualifiedName;
pub use placeholder::UnitPlaceholder;
pub use proxy::AttributeProxy;
pub use registry::{Registry, Snapshot};
pub use unit::{AsAny, Member, Method, Namespace, Unit};
