//! Per-page transformation stacks

mod registry;
mod types;

pub use registry::TransformationRegistry;
pub use types::{Transformation, TransformationKind};
