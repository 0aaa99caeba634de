//! weftdb - uniform CRUD over relational and document stores
//!
//! One filter/sort/relation vocabulary for both backends, plus a cache-backed
//! relation weaver that resolves foreign keys for a batch of rows in a single
//! query per relation.

pub mod engine;

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `weftdb=info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weftdb=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
