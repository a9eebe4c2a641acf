//! Mosaic geometry for media albums.
//!
//! Items are packed into justified rows: a row closes once its height at full
//! width drops to the target row height or it holds `max_per_row` items. The
//! trailing row is justified too unless that would make it taller than twice
//! the target, in which case it is clamped and left-aligned.

use serde::Serialize;

use crate::media_sizes::MediaSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlbumLayoutParams {
    pub max_width: u32,
    pub row_height: u32,
    pub max_per_row: usize,
    pub spacing: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Which album edges an item touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RectSides(u8);

impl RectSides {
    pub const NONE: RectSides = RectSides(0);
    pub const TOP: RectSides = RectSides(1);
    pub const RIGHT: RectSides = RectSides(1 << 1);
    pub const BOTTOM: RectSides = RectSides(1 << 2);
    pub const LEFT: RectSides = RectSides(1 << 3);

    pub fn contains(self, other: RectSides) -> bool {
        self.0 & other.0 == other.0
    }

    fn with(self, other: RectSides, enabled: bool) -> RectSides {
        if enabled {
            RectSides(self.0 | other.0)
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlbumItemLayout {
    pub geometry: Geometry,
    pub sides: RectSides,
}

struct Row {
    start: usize,
    end: usize,
    height: f64,
    justified: bool,
}

fn ratio(size: &MediaSize) -> f64 {
    if size.width <= 0.0 || size.height <= 0.0 {
        1.0
    } else {
        size.width / size.height
    }
}

fn justified_height(params: &AlbumLayoutParams, ratio_sum: f64, count: usize) -> f64 {
    let gaps = params.spacing.saturating_mul(count.saturating_sub(1) as u32);
    let available = f64::from(params.max_width.saturating_sub(gaps)).max(1.0);
    available / ratio_sum
}

fn split_rows(ratios: &[f64], params: &AlbumLayoutParams) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut start = 0;
    let mut ratio_sum = 0.0;
    let target = f64::from(params.row_height);

    for (idx, ratio) in ratios.iter().enumerate() {
        ratio_sum += ratio;
        let count = idx + 1 - start;
        let height = justified_height(params, ratio_sum, count);
        if height <= target || count >= params.max_per_row {
            rows.push(Row {
                start,
                end: idx + 1,
                height,
                justified: true,
            });
            start = idx + 1;
            ratio_sum = 0.0;
        }
    }

    if start < ratios.len() {
        let height = justified_height(params, ratio_sum, ratios.len() - start);
        let cap = target * 2.0;
        rows.push(Row {
            start,
            end: ratios.len(),
            height: height.min(cap),
            justified: height <= cap,
        });
    }

    rows
}

/// Lays out `sizes` and returns one entry per input, in input order.
pub fn layout_album(sizes: &[MediaSize], params: &AlbumLayoutParams) -> Vec<AlbumItemLayout> {
    let ratios: Vec<f64> = sizes.iter().map(ratio).collect();
    let rows = split_rows(&ratios, params);
    let last_row = rows.len().saturating_sub(1);
    let spacing = f64::from(params.spacing);

    let mut layout = Vec::with_capacity(sizes.len());
    let mut y = 0u32;
    for (row_idx, row) in rows.iter().enumerate() {
        let height = (row.height.round() as u32).max(1);
        let mut cursor = 0.0_f64;

        for idx in row.start..row.end {
            let x = cursor.round() as u32;
            let item_width = ratios[idx] * row.height;
            let is_first = idx == row.start;
            let is_last = idx + 1 == row.end;

            let right = if is_last && row.justified {
                params.max_width
            } else {
                (cursor + item_width).round() as u32
            };
            let width = right.saturating_sub(x).max(1);
            cursor += item_width + spacing;

            let sides = RectSides::NONE
                .with(RectSides::TOP, row_idx == 0)
                .with(RectSides::BOTTOM, row_idx == last_row)
                .with(RectSides::LEFT, is_first)
                .with(RectSides::RIGHT, is_last);

            layout.push(AlbumItemLayout {
                geometry: Geometry {
                    x,
                    y,
                    width,
                    height,
                },
                sides,
            });
        }

        y += height + params.spacing;
    }

    layout
}

/// Container size that encloses the album: widest right-edge item by lowest
/// bottom-edge item.
pub fn container_size(layout: &[AlbumItemLayout]) -> (u32, u32) {
    layout.iter().fold((0, 0), |(width, height), item| {
        let width = if item.sides.contains(RectSides::RIGHT) {
            width.max(item.geometry.right())
        } else {
            width
        };
        let height = if item.sides.contains(RectSides::BOTTOM) {
            height.max(item.geometry.bottom())
        } else {
            height
        };
        (width, height)
    })
}

#[cfg(test)]
#[path = "tests/album_layout_tests.rs"]
mod tests;
