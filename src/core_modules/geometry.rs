// THEORY:
// Every box exchanged inside the engine, with the collaborator, or with persistence
// lives in one normalized space: the full image height and width each span
// [0, 1000]. This module owns that space. Nothing outside it converts between
// pixel rows and normalized units, and every constructor re-checks the invariant
// `0 <= min < max <= 1000` on both axes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Extent of the normalized coordinate space on both axes.
pub const NORMALIZED_EXTENT: f64 = 1000.0;

/// Slack used when testing whether one vertical span lies inside another.
pub const SUBSUME_EPSILON: f64 = 0.1;

/// A rectangle in the 0..1000 normalized coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    /// Builds a box, rejecting anything outside the invariant.
    pub fn new(ymin: f64, xmin: f64, ymax: f64, xmax: f64) -> Result<Self> {
        let bbox = Self {
            ymin,
            xmin,
            ymax,
            xmax,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// A full-width band between two normalized heights.
    pub fn band(ymin: f64, ymax: f64) -> Result<Self> {
        Self::new(ymin, 0.0, ymax, NORMALIZED_EXTENT)
    }

    /// Full-width band covering pixel rows `start_row..end_row` of an image `height`
    /// rows tall. Both edges are rounded to the nearest normalized unit; a run too
    /// short to survive rounding is widened to one unit so it keeps a positive height.
    pub fn from_row_span(start_row: u32, end_row: u32, height: u32) -> Result<Self> {
        if height == 0 || start_row >= end_row || end_row > height {
            return Err(Error::GeometryInvariant(format!(
                "row span {start_row}..{end_row} does not fit an image of height {height}"
            )));
        }
        let scale = NORMALIZED_EXTENT / height as f64;
        let mut ymin = (start_row as f64 * scale).round();
        let mut ymax = (end_row as f64 * scale).round();
        if ymax <= ymin {
            if ymax < NORMALIZED_EXTENT {
                ymax = ymin + 1.0;
            } else {
                ymin = ymax - 1.0;
            }
        }
        Self::band(ymin, ymax)
    }

    pub fn validate(&self) -> Result<()> {
        let axis_ok = |min: f64, max: f64| {
            min.is_finite() && max.is_finite() && 0.0 <= min && min < max && max <= NORMALIZED_EXTENT
        };
        if axis_ok(self.ymin, self.ymax) && axis_ok(self.xmin, self.xmax) {
            Ok(())
        } else {
            Err(Error::GeometryInvariant(format!("{self:?}")))
        }
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Whether this box's vertical span lies inside `outer`'s, within `SUBSUME_EPSILON`.
    pub fn is_subsumed_by(&self, outer: &BoundingBox) -> bool {
        self.ymin >= outer.ymin - SUBSUME_EPSILON && self.ymax <= outer.ymax + SUBSUME_EPSILON
    }

    /// Pixel rows `(top, bottom)` this box covers in an image `height` rows tall.
    /// `bottom` is exclusive and always greater than `top`.
    pub fn pixel_rows(&self, height: u32) -> (u32, u32) {
        let scale = height as f64 / NORMALIZED_EXTENT;
        let top = ((self.ymin * scale).round() as u32).min(height.saturating_sub(1));
        let bottom = ((self.ymax * scale).round() as u32).clamp(top + 1, height.max(1));
        (top, bottom)
    }

    /// Pixel columns `(left, right)`; `right` exclusive.
    pub fn pixel_cols(&self, width: u32) -> (u32, u32) {
        let scale = width as f64 / NORMALIZED_EXTENT;
        let left = ((self.xmin * scale).round() as u32).min(width.saturating_sub(1));
        let right = ((self.xmax * scale).round() as u32).clamp(left + 1, width.max(1));
        (left, right)
    }
}

/// Full-width union of a set of boxes: vertical extremes kept, horizontal extents
/// discarded in favour of the whole width.
pub fn full_width_union<'a, I>(boxes: I) -> Result<BoundingBox>
where
    I: IntoIterator<Item = &'a BoundingBox>,
{
    let mut span: Option<(f64, f64)> = None;
    for bbox in boxes {
        span = Some(match span {
            None => (bbox.ymin, bbox.ymax),
            Some((lo, hi)) => (lo.min(bbox.ymin), hi.max(bbox.ymax)),
        });
    }
    let (ymin, ymax) =
        span.ok_or_else(|| Error::GeometryInvariant("union of zero boxes".to_string()))?;
    BoundingBox::band(ymin, ymax)
}

/// `min(100, round(100 * covered / 1000))` for a total of normalized heights.
pub fn percent_of_extent(covered: f64) -> u8 {
    let percent = (100.0 * covered / NORMALIZED_EXTENT).round();
    percent.clamp(0.0, 100.0) as u8
}
