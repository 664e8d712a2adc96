//! Folio Server Library
//!
//! Versioned, paginated documents with per-page transformation stacks and a
//! content-addressed render cache. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `document`: documents, document types, versions and pages
//! - `transform`: per-page transformation stacks
//! - `render`: render pipeline and fingerprint-keyed render cache
//! - `viewer`: the page view flow tying the above together
//! - `actions`: immutable action routing table and bound actions
//! - `state`: application wiring and the action interpreter

pub mod access;
pub mod actions;
pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod render;
pub mod search;
pub mod state;
pub mod transform;
pub mod viewer;

mod context;

pub use error::{CoreError, Result};
pub use state::{AppState, Collaborators};
