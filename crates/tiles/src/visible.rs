//! Visible Tile Set: the per-frame frustum cull over a `DataSource`'s
//! tile pyramid, plus fallback substitution so something is always
//! drawn at a given screen position while the ideal tile is in flight.

use mapengine_model::{morton_encode, TileCoord, WorldBounds};

use crate::cache::TileCache;
use crate::tile::{TileCacheKey, TileStateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileResolution {
    /// The exact tile at the ideal level is renderable. `partial` is set
    /// when only some of its geometry kinds are built.
    Ready { key: TileCacheKey, partial: bool },
    /// The ideal tile is not ready; an ancestor (coarser, already
    /// covering this area) or a descendant (finer, a partial patch) is
    /// drawn in its place until the ideal tile arrives.
    Fallback {
        requested: TileCacheKey,
        substitute: TileCacheKey,
    },
    /// Nothing usable is ready yet for this screen position.
    Pending(TileCacheKey),
}

/// Enumerates every tile coordinate at `level` whose world bounds
/// intersect `view_bounds`, clamped to the valid tile grid extent.
pub fn tiles_intersecting(level: u32, view_bounds: WorldBounds) -> Vec<TileCoord> {
    let tiles_per_axis = 1u64 << level;
    let tile_world_size = 1.0_f64 / tiles_per_axis as f64;

    let min_col = (view_bounds.min_x / tile_world_size).floor().max(0.0) as u64;
    let max_col = (view_bounds.max_x / tile_world_size)
        .ceil()
        .min(tiles_per_axis as f64 - 1.0)
        .max(0.0) as u64;
    let min_row = (view_bounds.min_y / tile_world_size).floor().max(0.0) as u64;
    let max_row = (view_bounds.max_y / tile_world_size)
        .ceil()
        .min(tiles_per_axis as f64 - 1.0)
        .max(0.0) as u64;

    let mut coords = Vec::new();
    if min_col > max_col || min_row > max_row {
        return coords;
    }
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            coords.push(
                TileCoord::new(level, col as u32, row as u32)
                    .expect("intersection math stays within the level's valid range"),
            );
        }
    }
    coords
}

/// Walks ancestors first (cheap, always exactly one candidate per
/// level, `search_up` deep), then descendants breadth-first (`search_down`
/// levels deep) if no ancestor is ready, stopping at the first fully
/// ready substitute. The exact tile itself is accepted even if only
/// partially built; fallback substitutes are not.
pub fn resolve_tile(
    cache: &TileCache,
    data_source_id: u32,
    coord: TileCoord,
    offset: u32,
    offset_bits: u32,
    search_up: u32,
    search_down: u32,
) -> TileResolution {
    let requested_key = make_cache_key(data_source_id, coord, offset, offset_bits);

    if let Some(tile) = cache.get(requested_key) {
        if tile.is_renderable() {
            return TileResolution::Ready { key: requested_key, partial: tile.is_partial() };
        }
    }

    let mut ancestor = coord;
    for _ in 0..search_up.min(coord.level) {
        ancestor = match ancestor.parent() {
            Some(parent) => parent,
            None => break,
        };
        let ancestor_key = make_cache_key(data_source_id, ancestor, offset, offset_bits);
        if cache.get(ancestor_key).is_some_and(|t| t.is_ready()) {
            return TileResolution::Fallback {
                requested: requested_key,
                substitute: ancestor_key,
            };
        }
    }

    let mut frontier = vec![coord];
    for _ in 0..search_down {
        let mut next_frontier = Vec::new();
        for candidate in frontier {
            let Some(children) = candidate.children() else { continue };
            for child in children {
                let child_key = make_cache_key(data_source_id, child, offset, offset_bits);
                if cache.get(child_key).is_some_and(|t| t.is_ready()) {
                    return TileResolution::Fallback {
                        requested: requested_key,
                        substitute: child_key,
                    };
                }
                next_frontier.push(child);
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }

    TileResolution::Pending(requested_key)
}

fn make_cache_key(data_source_id: u32, coord: TileCoord, offset: u32, offset_bits: u32) -> TileCacheKey {
    TileCacheKey {
        data_source_id,
        tile_key: mapengine_model::TileKey::encode(coord, offset, offset_bits)
            .expect("visible-set coordinates are always within the valid tile grid"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleTileSetConfig {
    /// Caps the per-DataSource visible set; candidates beyond this are
    /// dropped in priority order (closest-to-camera first, Morton
    /// tie-break) before the Tile Cache is even consulted.
    pub max_visible_data_source_tiles: usize,
    /// Ancestor levels searched toward the root for a fallback substitute.
    pub search_up: u32,
    /// Descendant levels searched toward the leaves for a fallback
    /// substitute, breadth-first.
    pub search_down: u32,
}

impl Default for VisibleTileSetConfig {
    fn default() -> Self {
        Self {
            max_visible_data_source_tiles: 256,
            search_up: 4,
            search_down: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedTile {
    pub key: TileCacheKey,
    /// Set when `key` is a fallback substitute, or the exact tile but
    /// only partially built — either way, Label Placement should
    /// down-rank it relative to a fully ready exact match.
    pub partial: bool,
}

/// Per-DataSource, per-frame derived structure (spec invariant:
/// `rendered_tiles` only ever contains tiles drawn from `visible_tiles`
/// or their fallback substitutes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VisibleTileSet {
    pub visible_tiles: Vec<TileCacheKey>,
    pub rendered_tiles: Vec<RenderedTile>,
    pub num_tiles_loading: usize,
    pub num_tiles_with_partial_geometry: usize,
}

/// Computes the Visible Tile Set for one DataSource: cull, cap by
/// priority, resolve each capped key against the cache (with fallback
/// search), and tally in-flight/partial counts.
#[allow(clippy::too_many_arguments)]
pub fn compute_visible_tile_set(
    cache: &TileCache,
    data_source_id: u32,
    level: u32,
    view_bounds: WorldBounds,
    camera_world_x: f64,
    camera_world_y: f64,
    offset: u32,
    offset_bits: u32,
    config: &VisibleTileSetConfig,
) -> VisibleTileSet {
    let mut candidates = tiles_intersecting(level, view_bounds);
    candidates.sort_by(|a, b| {
        let distance_a = camera_distance(*a, camera_world_x, camera_world_y);
        let distance_b = camera_distance(*b, camera_world_x, camera_world_y);
        distance_a
            .partial_cmp(&distance_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| morton_encode(a.col, a.row).cmp(&morton_encode(b.col, b.row)))
    });
    candidates.truncate(config.max_visible_data_source_tiles);

    let mut result = VisibleTileSet::default();
    for coord in candidates {
        let requested_key = make_cache_key(data_source_id, coord, offset, offset_bits);
        result.visible_tiles.push(requested_key);

        if let Some(tile) = cache.get(requested_key) {
            if tile.is_permanently_failed() {
                continue;
            }
        }

        match resolve_tile(cache, data_source_id, coord, offset, offset_bits, config.search_up, config.search_down) {
            TileResolution::Ready { key, partial } => {
                if partial {
                    result.num_tiles_with_partial_geometry += 1;
                }
                result.rendered_tiles.push(RenderedTile { key, partial });
            }
            TileResolution::Fallback { substitute, .. } => {
                result.num_tiles_loading += 1;
                result.rendered_tiles.push(RenderedTile { key: substitute, partial: true });
            }
            TileResolution::Pending(_) => {
                result.num_tiles_loading += 1;
            }
        }
    }
    result
}

fn camera_distance(coord: TileCoord, camera_world_x: f64, camera_world_y: f64) -> f64 {
    let (center_x, center_y) = coord.world_bounds().center();
    let dx = center_x - camera_world_x;
    let dy = center_y - camera_world_y;
    (dx * dx + dy * dy).sqrt()
}
