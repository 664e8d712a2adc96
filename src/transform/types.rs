//! Transformation types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{PageId, TransformationId};
use crate::error::CoreError;

/// Operation applied to a page before rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum TransformationKind {
    RotateLeft,
    RotateRight,
    ZoomIn,
    ZoomOut,
    /// Discard everything before this entry
    Reset,
    /// Rotate clockwise by an explicit number of degrees
    Rotate { degrees: i32 },
    /// Set an absolute zoom level in percent
    Zoom { percent: u32 },
}

impl TransformationKind {
    /// Stable token used in fingerprints and as the textual form
    pub fn token(&self) -> String {
        match self {
            TransformationKind::RotateLeft => "rotate-left".to_string(),
            TransformationKind::RotateRight => "rotate-right".to_string(),
            TransformationKind::ZoomIn => "zoom-in".to_string(),
            TransformationKind::ZoomOut => "zoom-out".to_string(),
            TransformationKind::Reset => "reset".to_string(),
            TransformationKind::Rotate { degrees } => format!("rotate:{}", degrees),
            TransformationKind::Zoom { percent } => format!("zoom:{}", percent),
        }
    }
}

impl fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl FromStr for TransformationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        let invalid = || CoreError::InvalidKind(s.to_string());

        match normalized.as_str() {
            "rotate-left" => return Ok(TransformationKind::RotateLeft),
            "rotate-right" => return Ok(TransformationKind::RotateRight),
            "zoom-in" => return Ok(TransformationKind::ZoomIn),
            "zoom-out" => return Ok(TransformationKind::ZoomOut),
            "reset" => return Ok(TransformationKind::Reset),
            _ => {}
        }

        match normalized.split_once(':') {
            Some(("rotate", arg)) => arg
                .parse()
                .map(|degrees| TransformationKind::Rotate { degrees })
                .map_err(|_| invalid()),
            Some(("zoom", arg)) => match arg.parse() {
                Ok(percent) if percent > 0 => Ok(TransformationKind::Zoom { percent }),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

/// Stored transformation entry of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub id: TransformationId,
    pub page_id: PageId,
    pub kind: TransformationKind,
    /// Application order; unique per page, not necessarily contiguous
    pub order: u32,
}
