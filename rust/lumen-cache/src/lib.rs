//! Lumen Cache
//!
//! A content-addressed incremental compilation cache: maps source-code
//! content to previously compiled object code so the Lumen toolchain never
//! recompiles an unchanged translation unit. The compiler front-end, build
//! graph, and CLI are external collaborators — this crate only ever sees
//! opaque source and code byte slices.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod hasher;
pub mod index;
pub mod object_store;
pub mod stats;

pub use cache::Cache;
pub use config::Config;
pub use error::{CacheError, CacheResult};
pub use hasher::{hash, Digest};
pub use stats::CacheStats;
