//! Proxy allocation, authenticated session pools, and the retry/rotation
//! envelope shared by every networked component of the harvest engine.
//!
//! This crate owns everything that talks to the vendor proxy service or
//! mints credentials; `harvester` composes these primitives into the
//! catalog client, tile fetcher, and artist worker.

pub mod pool;
pub mod proxy;
pub mod retry;
pub mod session;
pub mod token_pool;

pub use pool::{PoolKind, SessionPool};
pub use proxy::ProxyProvider;
pub use session::{SessionBundle, SessionFactory};
pub use token_pool::TokenPool;
