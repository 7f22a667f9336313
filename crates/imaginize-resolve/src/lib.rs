pub mod cache;

pub use cache::{CacheStats, ResolutionCache, ResolveKey, ResolveValue};
