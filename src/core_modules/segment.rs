// THEORY:
// A `Segment` is a horizontally bounded region of the source image. Like `Pixel`
// and `RowBand`, it is a "dumb" data container: it knows its box, its kind and
// where it came from, and nothing about how it was classified.
//
// Pixel-level segments are created once per decomposition and never mutated.
// Refined segments are new values that point back at the pixel segments they were
// built from through `parent_refs` (1-based indices into the pixel-content list).
// Those indices are provenance, not ownership.
//
// A segment may carry a cropped raster of its region. The crop is a transient
// cache: it is skipped by serde and can always be regenerated from the box.

use crate::core_modules::geometry::BoundingBox;
use crate::error::Result;
use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};

/// What a segment represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentKind {
    /// A content run the classifier judged meaningful.
    PixelContent,
    /// A content run that is too short or judged to be noise.
    InvalidNoise,
    /// A near-uniform run of rows.
    Separator,
    /// A semantic union of several pixel segments.
    RefinedMerge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub kind: SegmentKind,
    /// 1-based indices of the pixel-content segments this one was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_refs: Option<Vec<usize>>,
    /// True for a pixel segment carried through refinement without being mapped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unmapped: bool,
    #[serde(skip)]
    crop: Option<RgbaImage>,
}

impl Segment {
    pub fn new(id: impl Into<String>, label: impl Into<String>, bbox: BoundingBox, kind: SegmentKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            bbox,
            kind,
            parent_refs: None,
            unmapped: false,
            crop: None,
        }
    }

    pub fn with_parent_refs(mut self, refs: Vec<usize>) -> Self {
        self.parent_refs = Some(refs);
        self
    }

    /// A copy of a pixel segment tagged as passed through refinement unmapped.
    pub fn as_unmapped(&self) -> Self {
        let mut carried = self.clone();
        carried.unmapped = true;
        carried
    }

    /// Attaches a crop of `source` matching this segment's box.
    pub fn with_crop(mut self, source: &RgbaImage) -> Self {
        self.crop = Some(crop_region(source, &self.bbox));
        self
    }

    pub fn crop(&self) -> Option<&RgbaImage> {
        self.crop.as_ref()
    }

    pub fn strip_crop(&mut self) {
        self.crop = None;
    }

    pub fn height(&self) -> f64 {
        self.bbox.height()
    }

    pub fn validate(&self) -> Result<()> {
        self.bbox.validate()
    }
}

/// Cuts the pixel region a normalized box covers out of `source`.
pub fn crop_region(source: &RgbaImage, bbox: &BoundingBox) -> RgbaImage {
    let (top, bottom) = bbox.pixel_rows(source.height());
    let (left, right) = bbox.pixel_cols(source.width());
    imageops::crop_imm(source, left, top, right - left, bottom - top).to_image()
}
