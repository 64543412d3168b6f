//! Tile data model, lifecycle state machine, LRU cache, and per-frame
//! Visible Tile Set computation.

mod cache;
mod tile;
mod visible;

pub use cache::{ResourceAccounting, TileCache, TileCacheConfig, TileCacheError};
pub use mapengine_protocol::RequestSequence;
pub use tile::{
    GpuResourceHandle, Tile, TileCacheKey, TileLifecycleError, TileLoadError, TileState,
    TileStateKind, MAX_LOAD_RETRIES,
};
pub use visible::{
    compute_visible_tile_set, resolve_tile, tiles_intersecting, RenderedTile, TileResolution,
    VisibleTileSet, VisibleTileSetConfig,
};
