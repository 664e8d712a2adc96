//! Page render pipeline
//!
//! A transformation stack is folded into a [`Geometry`] (quarter turns plus a
//! zoom level) and the geometry is applied to the untransformed page source
//! in one pass. Folding first keeps inverse pairs exact: rotate-left followed
//! by rotate-right is the identity, not two lossy resamples.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::config::RenderSettings;
use crate::error::{CoreError, Result};
use crate::transform::TransformationKind;

/// Rendered page output (always PNG)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RenderedImage {
    pub const CONTENT_TYPE: &'static str = "image/png";
}

/// Applies a transformation stack to a page source
pub trait RenderPipeline: Send + Sync {
    fn render(&self, source: &[u8], stack: &[TransformationKind]) -> Result<RenderedImage>;
}

/// Accumulated page geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Clockwise quarter turns, 0..4
    pub quarter_turns: u8,
    /// Zoom level in percent
    pub zoom_percent: u32,
}

impl Geometry {
    pub const IDENTITY: Geometry = Geometry {
        quarter_turns: 0,
        zoom_percent: 100,
    };

    /// Fold a stack in stored order
    ///
    /// Fails on the first operation the pipeline cannot express instead of
    /// skipping it.
    pub fn fold(stack: &[TransformationKind], settings: &RenderSettings) -> Result<Geometry> {
        let clamp = |percent: u32| percent.clamp(settings.zoom_min, settings.zoom_max);

        stack.iter().try_fold(Geometry::IDENTITY, |geometry, kind| {
            let next = match *kind {
                TransformationKind::RotateLeft => geometry.turn(3),
                TransformationKind::RotateRight => geometry.turn(1),
                TransformationKind::Rotate { degrees } => {
                    let degrees = degrees.rem_euclid(360);
                    if degrees % 90 != 0 {
                        return Err(CoreError::UnsupportedOperation(format!(
                            "rotation by {} degrees",
                            degrees
                        )));
                    }
                    geometry.turn((degrees / 90) as u8)
                }
                TransformationKind::ZoomIn => Geometry {
                    zoom_percent: clamp(geometry.zoom_percent.saturating_add(settings.zoom_step)),
                    ..geometry
                },
                TransformationKind::ZoomOut => Geometry {
                    zoom_percent: clamp(geometry.zoom_percent.saturating_sub(settings.zoom_step)),
                    ..geometry
                },
                TransformationKind::Zoom { percent } => Geometry {
                    zoom_percent: clamp(percent),
                    ..geometry
                },
                TransformationKind::Reset => Geometry::IDENTITY,
            };
            Ok(next)
        })
    }

    fn turn(self, quarters: u8) -> Geometry {
        Geometry {
            quarter_turns: (self.quarter_turns + quarters) % 4,
            ..self
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Geometry::IDENTITY
    }
}

/// Raster pipeline backed by the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct ImagePipeline {
    settings: RenderSettings,
}

impl ImagePipeline {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }
}

impl Default for ImagePipeline {
    fn default() -> Self {
        Self::new(RenderSettings::default())
    }
}

impl RenderPipeline for ImagePipeline {
    fn render(&self, source: &[u8], stack: &[TransformationKind]) -> Result<RenderedImage> {
        let geometry = Geometry::fold(stack, &self.settings)?;

        if geometry.is_identity() {
            let (width, height) = ImageReader::new(Cursor::new(source))
                .with_guessed_format()?
                .into_dimensions()?;
            return Ok(RenderedImage {
                data: source.to_vec(),
                width,
                height,
            });
        }

        let mut img = image::load_from_memory(source)?;
        img = match geometry.quarter_turns {
            1 => img.rotate90(),
            2 => img.rotate180(),
            3 => img.rotate270(),
            _ => img,
        };

        if geometry.zoom_percent != 100 {
            let scale =
                |side: u32| ((side as u64 * geometry.zoom_percent as u64) / 100).max(1) as u32;
            img = img.resize_exact(scale(img.width()), scale(img.height()), FilterType::Triangle);
        }

        Ok(RenderedImage {
            width: img.width(),
            height: img.height(),
            data: encode_png(&img)?,
        })
    }
}

/// Encode an image as PNG
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
