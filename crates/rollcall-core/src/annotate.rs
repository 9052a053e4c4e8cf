//! Draws recognition results onto frames for display.

use crate::types::{BoundingBox, IdentityDecision};
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 28.0;
const LABEL_GAP: i32 = 10;

/// DejaVu Sans Mono; see `assets/LICENSE-DejaVu`.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: not a usable font", .0.display())]
    InvalidFont(PathBuf),
}

/// Draws the face rectangle and the label above it.
pub struct Annotator {
    font: Option<FontArc>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Labels rendered with the bundled font.
    pub fn new() -> Self {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|err| tracing::warn!(error = %err, "bundled label font unusable; drawing boxes only"))
            .ok();
        Self { font }
    }

    /// Labels rendered with the TTF/OTF font at `path`.
    pub fn with_font(path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font =
            FontArc::try_from_vec(bytes).map_err(|_| AnnotateError::InvalidFont(path.to_path_buf()))?;
        Ok(Self { font: Some(font) })
    }

    /// Copy of `frame` with `decision` drawn on it. Unchanged when no face was found.
    pub fn annotate(&self, frame: &RgbImage, decision: &IdentityDecision) -> RgbImage {
        let mut canvas = frame.clone();
        let Some(face) = &decision.face else {
            return canvas;
        };

        for inset in 0..BOX_THICKNESS {
            if let Some(rect) = face_rect(face, inset) {
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }
        }

        if let Some(font) = &self.font {
            let label = decision.label();
            let scale = PxScale::from(LABEL_SCALE);
            let (_, text_height) = text_size(scale, font, &label);
            let x = face.x.round() as i32;
            let y = (face.y.round() as i32 - LABEL_GAP - text_height as i32).max(0);
            draw_text_mut(&mut canvas, LABEL_COLOR, x, y, scale, font, &label);
        }
        canvas
    }
}

/// Rectangle `inset` pixels inside the face box, `None` once it collapses.
fn face_rect(face: &BoundingBox, inset: i32) -> Option<Rect> {
    let width = face.width.round() as i32 - 2 * inset;
    let height = face.height.round() as i32 - 2 * inset;
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(
        Rect::at(face.x.round() as i32 + inset, face.y.round() as i32 + inset)
            .of_size(width as u32, height as u32),
    )
}
