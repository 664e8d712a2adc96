//! Documents, versions and pages
//!
//! ```text
//! Document ──current──▶ DocumentVersion ──▶ DocumentPage ──▶ Transformation*
//!     │                      ▲
//!     └────── versions ──────┘
//! ```
//!
//! [`DocumentStore`] owns documents and their pages, [`VersionManager`] owns
//! the version history. Both share one in-memory [`Catalog`] behind a lock.

mod catalog;
mod decompose;
mod store;
mod types;
mod versions;

pub(crate) use catalog::Catalog;
pub use decompose::{ContentDecomposer, DecomposedContent, PageSource, RasterDecomposer};
pub use store::DocumentStore;
pub use types::*;
pub use versions::{VersionDownload, VersionManager, DOWNLOAD_CHUNK_SIZE};
