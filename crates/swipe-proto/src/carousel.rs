//! Per-item transform for the vertical carousel.
//!
//! Items are laid out one viewport apart around the current index, shifted
//! by the live drag offset.  Only items inside the visibility window are
//! produced.  `progress` is the distance from the resting slot measured in
//! viewports; scale and opacity fall off linearly up to one viewport away.

use serde::{Deserialize, Serialize};

/// Neighbours rendered on each side of the current item.
pub const DEFAULT_WINDOW: usize = 1;

const SCALE_FALLOFF: f32 = 0.08;
const OPACITY_FALLOFF: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemTransform {
    /// Index into the playlist.
    pub index: usize,
    /// Slot relative to the current item (-1 = previous, +1 = next).
    pub slot: i32,
    /// Vertical offset of the item's top edge from the viewport's top (px).
    pub offset_px: f32,
    pub scale: f32,
    pub opacity: f32,
}

/// Compute transforms for every visible item.  Empty for an empty playlist.
///
/// When the playlist is shorter than the window the same index would appear
/// on both sides; it is placed on the side the drag is moving toward.
pub fn layout(
    len: usize,
    current: usize,
    drag_offset: f32,
    viewport_height: f32,
    window: usize,
) -> Vec<ItemTransform> {
    if len == 0 || viewport_height <= 0.0 {
        return Vec::new();
    }
    let current = current % len;
    let toward_next = drag_offset < 0.0;

    let mut slots: Vec<i32> = vec![0];
    for d in 1..=window as i32 {
        if toward_next {
            slots.push(d);
            slots.push(-d);
        } else {
            slots.push(-d);
            slots.push(d);
        }
    }

    let mut seen = Vec::with_capacity(slots.len());
    let mut items = Vec::with_capacity(slots.len());
    for slot in slots {
        let index = (current as i64 + slot as i64).rem_euclid(len as i64) as usize;
        if seen.contains(&index) {
            continue;
        }
        seen.push(index);

        let offset_px = slot as f32 * viewport_height + drag_offset;
        let progress = (offset_px / viewport_height).abs();
        if progress >= window as f32 + 1.0 {
            continue;
        }
        let falloff = progress.min(1.0);
        items.push(ItemTransform {
            index,
            slot,
            offset_px,
            scale: 1.0 - SCALE_FALLOFF * falloff,
            opacity: 1.0 - OPACITY_FALLOFF * falloff,
        });
    }
    items.sort_by_key(|t| t.slot);
    items
}
