//! Shared test utilities for sheet-based unit tests.
//!
//! Consolidated here so the per-module tests do not each grow their own
//! synthetic sheet renderer.

use image::{GrayImage, Luma};

use crate::template::{BubbleDef, FieldDef, Region};

/// Background intensity of blank paper on a synthetic sheet.
pub(crate) const PAGE_PIX: u8 = 230;
/// Intensity of a filled (marked) bubble region.
pub(crate) const FILLED_PIX: u8 = 45;

/// Render a synthetic sheet: a uniform page with the given regions filled
/// at the given intensity.
pub(crate) fn draw_sheet_image(w: u32, h: u32, filled: &[(Region, u8)]) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([PAGE_PIX]));
    for (region, pix) in filled {
        let x2 = (region.x + region.w).min(w);
        let y2 = (region.y + region.h).min(h);
        for y in region.y..y2 {
            for x in region.x..x2 {
                img.put_pixel(x, y, Luma([*pix]));
            }
        }
    }
    img
}

/// A four-option (A–D) field with 14x14 bubbles spaced 30px apart,
/// starting at `(x, y)`. Returns the field plus its regions for rendering.
pub(crate) fn four_option_field(label: &str, x: u32, y: u32) -> (FieldDef, [Region; 4]) {
    let regions = [
        Region::new(x, y, 14, 14),
        Region::new(x + 30, y, 14, 14),
        Region::new(x + 60, y, 14, 14),
        Region::new(x + 90, y, 14, 14),
    ];
    let field = FieldDef {
        label: label.to_string(),
        bubbles: ["A", "B", "C", "D"]
            .iter()
            .zip(regions)
            .map(|(v, region)| BubbleDef {
                value: v.to_string(),
                region,
            })
            .collect(),
        empty_value: None,
    };
    (field, regions)
}
