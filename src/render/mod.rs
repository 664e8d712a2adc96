//! Page rendering and the render cache
//!
//! ```text
//! RenderTarget ──► RenderCache::get ──hit──► stored PNG
//!                        │
//!                       miss (single flight per fingerprint)
//!                        ▼
//!                 RenderPipeline::render (blocking pool, bounded)
//!                        │
//!                        ▼
//!                 CacheStorage::write ──► index (if generation unchanged)
//! ```

mod cache;
mod fingerprint;
mod pipeline;
mod storage;

pub use cache::{CacheEntry, CacheStats, Generation, RenderCache, RenderTarget, RenderedPage};
pub use fingerprint::{content_hash, Fingerprint};
pub use pipeline::{encode_png, Geometry, ImagePipeline, RenderPipeline, RenderedImage};
pub use storage::CacheStorage;
