//! Content decomposition
//!
//! Turns raw version content into an ordered sequence of page sources. The
//! core treats implementations as a black box; [`RasterDecomposer`] is the
//! built-in one for image content.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat};

use crate::error::{CoreError, Result};
use crate::render::encode_png;

/// One decomposed page
#[derive(Debug, Clone)]
pub struct PageSource {
    /// Extracted text, if the format carries any
    pub text: Option<String>,
    /// Untransformed page raster (PNG)
    pub image: Vec<u8>,
}

/// Result of decomposing a version's content
#[derive(Debug, Clone)]
pub struct DecomposedContent {
    pub mime_type: String,
    pub pages: Vec<PageSource>,
}

impl DecomposedContent {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Page-extraction collaborator
pub trait ContentDecomposer: Send + Sync {
    fn decompose(&self, content: &[u8]) -> Result<DecomposedContent>;
}

/// Decomposes any raster format the `image` crate can decode
///
/// A still image is one page; every frame of a multi-frame GIF is a page.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecomposer;

impl ContentDecomposer for RasterDecomposer {
    fn decompose(&self, content: &[u8]) -> Result<DecomposedContent> {
        let format = image::guess_format(content)
            .map_err(|e| CoreError::InvalidContent(format!("unrecognised content: {}", e)))?;

        let frames: Vec<DynamicImage> = match format {
            ImageFormat::Gif => GifDecoder::new(Cursor::new(content))
                .and_then(|decoder| decoder.into_frames().collect_frames())
                .map_err(|e| CoreError::InvalidContent(e.to_string()))?
                .into_iter()
                .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
                .collect(),
            _ => vec![image::load_from_memory_with_format(content, format)
                .map_err(|e| CoreError::InvalidContent(e.to_string()))?],
        };

        if frames.is_empty() {
            return Err(CoreError::InvalidContent("content has no pages".to_string()));
        }

        let pages = frames
            .iter()
            .map(|frame| {
                Ok(PageSource {
                    text: None,
                    image: encode_png(frame)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DecomposedContent {
            mime_type: format.to_mime_type().to_string(),
            pages,
        })
    }
}
