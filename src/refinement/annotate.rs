// THEORY:
// The annotated preview is how the collaborator learns which pixel segment is
// which: every pixel-content segment gets a colored outline and a numbered badge
// holding its 1-based index. The collaborator answers in those numbers.
//
// Badge numbers are rasterized with an embedded monospace TTF, sized to the image
// width, so rendering needs no system font and is reproducible across machines.

use crate::core_modules::segment::Segment;
use crate::error::Result;
use ab_glyph::{FontRef, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

const BADGE_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");

const PALETTE: [Rgba<u8>; 6] = [
    Rgba([229, 57, 53, 255]),
    Rgba([30, 136, 229, 255]),
    Rgba([67, 160, 71, 255]),
    Rgba([251, 140, 0, 255]),
    Rgba([142, 36, 170, 255]),
    Rgba([0, 137, 123, 255]),
];

const BADGE_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Preview rendering options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewStyle {
    pub line_thickness: u32,
    /// Badge font size in pixels.
    pub font_px: f32,
}

impl PreviewStyle {
    /// Thickness and font size proportional to the image width.
    pub fn for_width(width: u32) -> Self {
        Self {
            line_thickness: (width / 300).max(2),
            font_px: (width / 25).max(14) as f32,
        }
    }
}

/// Renders `source` with every segment outlined and numbered from 1.
pub fn render_preview(source: &RgbaImage, segments: &[Segment]) -> Result<RgbaImage> {
    render_preview_with(source, segments, PreviewStyle::for_width(source.width()))
}

pub fn render_preview_with(source: &RgbaImage, segments: &[Segment], style: PreviewStyle) -> Result<RgbaImage> {
    let font = FontRef::try_from_slice(BADGE_FONT)?;
    let mut canvas = source.clone();
    let (width, height) = canvas.dimensions();

    for (i, segment) in segments.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let (top, bottom) = segment.bbox.pixel_rows(height);
        let (left, right) = segment.bbox.pixel_cols(width);

        for t in 0..style.line_thickness {
            let w = (right - left).saturating_sub(2 * t);
            let h = (bottom - top).saturating_sub(2 * t);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((left + t) as i32, (top + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }

        let origin = (left + style.line_thickness, top + style.line_thickness);
        draw_badge(&mut canvas, &font, i + 1, origin, color, style);
    }

    Ok(canvas)
}

fn draw_badge(canvas: &mut RgbaImage, font: &FontRef<'_>, number: usize, (x, y): (u32, u32), color: Rgba<u8>, style: PreviewStyle) {
    let scale = PxScale::from(style.font_px);
    let label = number.to_string();
    let (text_w, text_h) = text_size(scale, font, &label);
    let padding = (style.font_px / 4.0).ceil() as u32;

    let badge = Rect::at(x as i32, y as i32).of_size(text_w + 2 * padding, text_h + 2 * padding);
    draw_filled_rect_mut(canvas, badge, color);
    draw_text_mut(
        canvas,
        BADGE_TEXT,
        (x + padding) as i32,
        (y + padding) as i32,
        scale,
        font,
        &label,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::BoundingBox;
    use crate::core_modules::segment::SegmentKind;

    fn segment(ymin: f64, ymax: f64) -> Segment {
        Segment::new("s", "s", BoundingBox::band(ymin, ymax).unwrap(), SegmentKind::PixelContent)
    }

    #[test]
    fn outlines_and_badges_are_drawn() {
        let source = RgbaImage::from_pixel(300, 600, Rgba([255, 255, 255, 255]));
        let preview = render_preview(&source, &[segment(100.0, 400.0), segment(500.0, 900.0)]).unwrap();
        assert_eq!(preview.dimensions(), source.dimensions());
        // Outline of the first segment starts at row 60.
        assert_eq!(*preview.get_pixel(150, 60), PALETTE[0]);
        assert_eq!(*preview.get_pixel(150, 300), PALETTE[1]);
        // Badge background sits just inside the outline corner.
        assert_eq!(*preview.get_pixel(2, 62), PALETTE[0]);
        // Interior is untouched.
        assert_eq!(*preview.get_pixel(150, 150), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn rendering_is_deterministic() {
        let source = RgbaImage::from_pixel(200, 400, Rgba([10, 20, 30, 255]));
        let segments: Vec<Segment> = (0..12).map(|i| segment(i as f64 * 80.0, i as f64 * 80.0 + 60.0)).collect();
        assert_eq!(
            render_preview(&source, &segments).unwrap(),
            render_preview(&source, &segments).unwrap()
        );
    }

    #[test]
    fn badge_number_is_rasterized_over_the_background() {
        let font = FontRef::try_from_slice(BADGE_FONT).unwrap();
        let style = PreviewStyle { line_thickness: 1, font_px: 24.0 };
        let mut canvas = RgbaImage::from_pixel(60, 60, Rgba([0, 0, 0, 255]));
        draw_badge(&mut canvas, &font, 7, (0, 0), PALETTE[0], style);

        assert_eq!(*canvas.get_pixel(0, 0), PALETTE[0]);
        let lit = canvas.pixels().filter(|p| p.0[1] > 200 && p.0[2] > 200).count();
        assert!(lit > 0, "digit glyph left no light pixels");
    }

    #[test]
    fn wider_numbers_get_wider_badges() {
        let font = FontRef::try_from_slice(BADGE_FONT).unwrap();
        let scale = PxScale::from(20.0);
        assert!(text_size(scale, &font, "12").0 > text_size(scale, &font, "7").0);
    }
}
