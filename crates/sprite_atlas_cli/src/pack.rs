//! Shelf packing: lay sprites out left-to-right in rows ("shelves"),
//! starting a new shelf once a row would overflow the atlas width.
//! Simple and a little wasteful compared to a MAXRECTS packer, but
//! predictable and cheap enough for the handful of sprites a theme
//! bundles.

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub struct PackedAtlas {
    pub placements: Vec<(String, PackedRect)>,
    pub atlas_width: u32,
    pub atlas_height: u32,
}

/// `sprites` is `(name, width, height)` of the *unpadded* sprite. Each
/// placed rect reserves `width + padding` / `height + padding` of shelf
/// space but the returned `PackedRect` gives the sprite's own pixel box.
pub fn pack_sprites(
    sprites: &[(String, u32, u32)],
    padding: u32,
    max_width: u32,
    max_height: u32,
) -> Result<PackedAtlas> {
    let mut ordered: Vec<&(String, u32, u32)> = sprites.iter().collect();
    ordered.sort_by(|a, b| b.2.cmp(&a.2));

    let mut placements = Vec::with_capacity(ordered.len());
    let mut cursor_x = padding;
    let mut cursor_y = padding;
    let mut shelf_height = 0u32;
    let mut atlas_width = 0u32;

    for (name, width, height) in ordered {
        let (width, height) = (*width, *height);
        if width + 2 * padding > max_width {
            bail!("sprite '{name}' ({width}x{height}) is wider than the atlas width {max_width}");
        }

        if cursor_x + width + padding > max_width {
            cursor_x = padding;
            cursor_y += shelf_height + padding;
            shelf_height = 0;
        }

        if cursor_y + height + padding > max_height {
            bail!(
                "atlas overflowed the configured {max_width}x{max_height} bounds while placing '{name}'"
            );
        }

        placements.push((
            name.clone(),
            PackedRect { x: cursor_x, y: cursor_y, width, height },
        ));

        cursor_x += width + padding;
        atlas_width = atlas_width.max(cursor_x);
        shelf_height = shelf_height.max(height);
    }

    let atlas_height = if placements.is_empty() {
        0
    } else {
        cursor_y + shelf_height + padding
    };

    Ok(PackedAtlas {
        placements,
        atlas_width: atlas_width.min(max_width),
        atlas_height: atlas_height.min(max_height),
    })
}
