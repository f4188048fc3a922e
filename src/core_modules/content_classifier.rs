// THEORY:
// The `ContentClassifier` decides whether a candidate content band is worth keeping
// or is noise (a faint gradient, a blank strip with a hairline, a compression halo).
// It stacks three increasingly expensive signals and stops at the first one that
// fires:
//
// 1.  **Color cardinality**: more than `MAX_PLAIN_COLORS` exact colors among the
//     non-transparent pixels means real content (text anti-aliasing alone produces
//     dozens). Counting stops as soon as the limit is crossed.
// 2.  **Luma variance**: population variance of the per-pixel luma above
//     `LUMA_VARIANCE_THRESHOLD`.
// 3.  **Connected components**: the band is downsampled so its longer side is at
//     most `COMPONENT_SAMPLE_SIDE`, then an 8-neighbour flood fill groups pixels
//     whose luma differs from their neighbour by at most `LUMA_MERGE_TOLERANCE`.
//     Many components means texture; a dominant component that covers less than
//     `BACKGROUND_COVERAGE_THRESHOLD` of the sample means something sits on the
//     background.
//
// Stateless and deterministic: identical pixels always produce the identical verdict.

use crate::core_modules::row_band::row_band::RowBand;
use std::collections::HashSet;

const MAX_PLAIN_COLORS: usize = 20;
const LUMA_VARIANCE_THRESHOLD: f64 = 100.0;
const COMPONENT_SAMPLE_SIDE: u32 = 128;
const LUMA_MERGE_TOLERANCE: f64 = 5.0;
const MAX_PLAIN_COMPONENTS: usize = 50;
const BACKGROUND_COVERAGE_THRESHOLD: f64 = 0.95;

/// Which signal made a band meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSignal {
    ColorCardinality,
    LumaVariance,
    ComponentCount,
    ComponentCoverage,
}

/// Components found by the flood fill over a sampled luma plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentStats {
    pub count: usize,
    pub largest: usize,
    pub sampled_area: usize,
}

impl ComponentStats {
    /// Share of the sample covered by the dominant component.
    pub fn coverage(&self) -> f64 {
        if self.sampled_area == 0 {
            return 1.0;
        }
        self.largest as f64 / self.sampled_area as f64
    }
}

/// Runs the signal stack; `Some(signal)` when the band is meaningful.
pub fn classify(band: &RowBand<'_>) -> Option<ContentSignal> {
    if band.area() == 0 {
        return None;
    }
    if distinct_opaque_colors(band, MAX_PLAIN_COLORS + 1) > MAX_PLAIN_COLORS {
        return Some(ContentSignal::ColorCardinality);
    }
    if luma_variance(&band.luma_plane()) > LUMA_VARIANCE_THRESHOLD {
        return Some(ContentSignal::LumaVariance);
    }

    let (width, height, plane) = band.downsampled_luma(COMPONENT_SAMPLE_SIDE);
    let stats = connected_components(width, height, &plane);
    if stats.count > MAX_PLAIN_COMPONENTS {
        return Some(ContentSignal::ComponentCount);
    }
    if stats.coverage() < BACKGROUND_COVERAGE_THRESHOLD {
        return Some(ContentSignal::ComponentCoverage);
    }
    None
}

pub fn is_meaningful(band: &RowBand<'_>) -> bool {
    classify(band).is_some()
}

/// Counts distinct exact colors among non-transparent pixels, stopping at `cap`.
fn distinct_opaque_colors(band: &RowBand<'_>, cap: usize) -> usize {
    let mut seen = HashSet::new();
    for pixel in band.pixels.iter().filter(|p| !p.is_transparent()) {
        seen.insert(pixel.packed());
        if seen.len() >= cap {
            break;
        }
    }
    seen.len()
}

/// Population variance.
pub fn luma_variance(values: &[f64]) -> f64 {
    let count = values.len() as f64;
    if count < 1.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / count;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count
}

/// 8-neighbour flood fill over a row-major luma plane.
pub fn connected_components(width: u32, height: u32, plane: &[f64]) -> ComponentStats {
    let w = width as usize;
    let h = height as usize;
    let mut visited = vec![false; plane.len()];
    let mut count = 0usize;
    let mut largest = 0usize;
    let mut stack: Vec<usize> = Vec::new();

    for seed in 0..plane.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        stack.push(seed);
        let mut size = 0usize;

        while let Some(current) = stack.pop() {
            size += 1;
            let cx = (current % w) as i64;
            let cy = (current / w) as i64;

            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = cx + dx;
                    let ny = cy + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let neighbour = ny as usize * w + nx as usize;
                    if !visited[neighbour]
                        && (plane[neighbour] - plane[current]).abs() <= LUMA_MERGE_TOLERANCE
                    {
                        visited[neighbour] = true;
                        stack.push(neighbour);
                    }
                }
            }
        }

        count += 1;
        largest = largest.max(size);
    }

    ComponentStats {
        count,
        largest,
        sampled_area: plane.len(),
    }
}
