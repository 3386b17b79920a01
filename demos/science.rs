//! Binds a slow "science" package lazily, then pays for only what is used.
//!
//! Run with `RUST_LOG=lazybind=info cargo run --example science --features demo`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lazybind::{resolver, BoxError, Catalog, Member, Method, QualifiedName, Registry, RegistryConfig, Resolver, Unit};

/// Stands in for an expensive subsystem: construction takes a while.
struct Science {
    label: &'static str,
    number: i64,
}

impl Science {
    fn load(label: &'static str, number: i64, steps: u32) -> Result<Self, BoxError> {
        println!("Initializing {label}");
        for _ in 0..steps {
            thread::sleep(Duration::from_millis(100));
        }
        println!("Done initializing {label}");
        Ok(Self { label, number })
    }
}

impl Unit for Science {
    fn member(&self, name: &str) -> Option<Member> {
        let label = self.label;
        let number = self.number;
        match name {
            "number" => Some(Arc::new(Method::new(move |()| number)) as Member),
            "hello" => Some(Arc::new(Method::new(move |()| format!("Hello, {label}!"))) as Member),
            _ => None,
        }
    }

    fn member_names(&self) -> Vec<String> {
        vec!["hello".into(), "number".into()]
    }
}

fn find(name: &QualifiedName) -> Option<Resolver> {
    match name.to_string().as_str() {
        "science.pack.slow" => Some(resolver(|| Science::load("science.pack.slow", 58, 20))),
        "science.pack.junk" => Some(resolver(|| Science::load("science.pack.junk", 42, 10))),
        _ => None,
    }
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry = Arc::new(Registry::with_config(RegistryConfig::from_env()));
    registry.register("science", || Ok::<_, BoxError>(lazybind::Namespace::new()))?;

    let catalog = Catalog::new(["science.pack.slow", "science.pack.junk"])?;
    let report = catalog.install(&registry, &find);
    println!("Installed {} lazy bindings, skipped {}", report.installed.len(), report.skipped.len());
    print!("{}", registry.dump_state());

    // Nothing is initialized by taking these.
    let slow_number = registry.get_attribute_proxy("science.pack.slow", "number")?;
    let junk = registry.get_placeholder("science.pack.junk")?;
    let junk_number = junk.attribute("number");

    println!("{}", junk.call::<(), String>("hello", ())?);
    let total = slow_number.call::<(), i64>(())? + junk_number.call::<(), i64>(())?;
    println!("The total number is {total}");

    print!("{}", registry.dump_state());
    Ok(())
}
