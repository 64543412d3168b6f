//! Tile Cache: an LRU keyed by `(data_source_id, TileKey)` with a
//! pinning rule — tiles in the current visible set are never evicted,
//! no matter how long the cache has been over its resource budget.

use std::collections::{BTreeSet, HashMap, HashSet};

use mapengine_protocol::RequestSequence;

use crate::tile::{Tile, TileCacheKey, TileState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAccounting {
    /// Budget is a plain tile count.
    CountTiles,
    /// Budget is a byte estimate; only `Ready` tiles contribute (their
    /// `byte_size`), everything else counts as zero.
    EstimateMb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheConfig {
    pub accounting: ResourceAccounting,
    pub budget: u64,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            accounting: ResourceAccounting::CountTiles,
            budget: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCacheError {
    /// Every unpinned tile was evicted and the budget is still exceeded
    /// — the visible set alone needs more capacity than configured.
    BudgetExceededByPinnedTiles,
}

/// LRU order key: `(last_touched_frame, cache_key)`. Ties are broken by
/// `cache_key` so the set has no duplicate entries for a given tile.
type OrderKey = (u64, TileCacheKey);

pub struct TileCache {
    config: TileCacheConfig,
    entries: HashMap<TileCacheKey, Tile>,
    lru_order: BTreeSet<OrderKey>,
    pinned: HashSet<TileCacheKey>,
    used: u64,
}

impl TileCache {
    pub fn new(config: TileCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            lru_order: BTreeSet::new(),
            pinned: HashSet::new(),
            used: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_budget(&self) -> u64 {
        self.used
    }

    pub fn get(&self, cache_key: TileCacheKey) -> Option<&Tile> {
        self.entries.get(&cache_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileCacheKey, &Tile)> {
        self.entries.iter()
    }

    /// Replaces the pinned set wholesale — called once per frame with
    /// the Visible Tile Set's current keys. Pinned tiles are exempt from
    /// eviction regardless of recency.
    pub fn set_pinned(&mut self, pinned: impl IntoIterator<Item = TileCacheKey>) {
        self.pinned = pinned.into_iter().collect();
    }

    pub fn is_pinned(&self, cache_key: TileCacheKey) -> bool {
        self.pinned.contains(&cache_key)
    }

    fn resource_cost(&self, tile: &Tile) -> u64 {
        match self.config.accounting {
            ResourceAccounting::CountTiles => 1,
            ResourceAccounting::EstimateMb => tile.resident_byte_size(),
        }
    }

    pub fn touch(&mut self, cache_key: TileCacheKey, frame_id: u64) {
        if let Some(tile) = self.entries.get_mut(&cache_key) {
            let old_order_key = (tile.last_touched_frame(), cache_key);
            tile.touch(frame_id);
            self.lru_order.remove(&old_order_key);
            self.lru_order.insert((tile.last_touched_frame(), cache_key));
        }
    }

    /// Inserts a new `Requested` tile if absent, otherwise just touches
    /// the existing one. Returns the tile's current state either way.
    pub fn get_or_insert_requested(
        &mut self,
        cache_key: TileCacheKey,
        frame_id: u64,
    ) -> TileState {
        if let Some(tile) = self.entries.get(&cache_key) {
            let state = tile.state();
            self.touch(cache_key, frame_id);
            return state;
        }

        let tile = Tile::new(cache_key, frame_id);
        self.lru_order.insert((tile.last_touched_frame(), cache_key));
        self.entries.insert(cache_key, tile);
        TileState::Requested
    }

    pub fn set_state(
        &mut self,
        cache_key: TileCacheKey,
        state: TileState,
    ) -> Result<(), crate::tile::TileLifecycleError> {
        let Some(tile) = self.entries.get_mut(&cache_key) else {
            return Ok(());
        };
        let old_cost = self.resource_cost(tile);
        tile.transition_to(state)?;
        let new_cost = self.resource_cost(tile);
        self.used = self.used.saturating_sub(old_cost).saturating_add(new_cost);
        Ok(())
    }

    /// Applies a state transition reported by the tile-worker pool for a
    /// specific request sequence (spec §5 "newer wins" ordering
    /// guarantee). A result that arrives for a request sequence the tile
    /// has already superseded is dropped instead of applied; returns
    /// `Ok(false)` rather than an error, since losing a race is a normal
    /// outcome of concurrent fetch/decode, not an invariant violation.
    pub fn set_state_from_worker(
        &mut self,
        cache_key: TileCacheKey,
        state: TileState,
        sequence: RequestSequence,
    ) -> Result<bool, crate::tile::TileLifecycleError> {
        let Some(tile) = self.entries.get_mut(&cache_key) else {
            return Ok(false);
        };
        let old_cost = self.resource_cost(tile);
        let applied = tile.transition_to_from_worker(state, sequence)?;
        if applied {
            let new_cost = self.resource_cost(tile);
            self.used = self.used.saturating_sub(old_cost).saturating_add(new_cost);
        }
        Ok(applied)
    }

    /// Evicts least-recently-touched unpinned tiles until `used_budget`
    /// is within `config.budget`, or until only pinned tiles remain.
    pub fn evict_to_fit(&mut self) -> Result<u32, TileCacheError> {
        let mut evicted = 0u32;
        if self.used <= self.config.budget {
            return Ok(evicted);
        }

        let candidates: Vec<OrderKey> = self.lru_order.iter().copied().collect();
        for (_, cache_key) in candidates {
            if self.used <= self.config.budget {
                break;
            }
            if self.pinned.contains(&cache_key) {
                continue;
            }
            self.remove(cache_key);
            evicted += 1;
        }

        if self.used > self.config.budget {
            log::warn!(
                "tile cache over budget after eviction: used={} budget={} pinned={}",
                self.used,
                self.config.budget,
                self.pinned.len()
            );
            return Err(TileCacheError::BudgetExceededByPinnedTiles);
        }
        if evicted > 0 {
            log::debug!("evicted {evicted} tiles, used={}", self.used);
        }
        Ok(evicted)
    }

    pub fn remove(&mut self, cache_key: TileCacheKey) -> Option<Tile> {
        let tile = self.entries.remove(&cache_key)?;
        self.lru_order.remove(&(tile.last_touched_frame(), cache_key));
        self.used = self.used.saturating_sub(self.resource_cost(&tile));
        Some(tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::GpuResourceHandle;
    use mapengine_model::{DEFAULT_OFFSET_BITS, TileCoord, TileKey};

    fn cache_key(col: u32, row: u32) -> TileCacheKey {
        TileCacheKey {
            data_source_id: 0,
            tile_key: TileKey::encode(
                TileCoord::new(4, col, row).unwrap(),
                0,
                DEFAULT_OFFSET_BITS,
            )
            .unwrap(),
        }
    }

    fn mark_ready(cache: &mut TileCache, key: TileCacheKey) {
        cache
            .set_state(key, TileState::Loading)
            .unwrap();
        cache.set_state(key, TileState::Decoded).unwrap();
        cache.set_state(key, TileState::Building).unwrap();
        cache
            .set_state(
                key,
                TileState::Ready {
                    resource: GpuResourceHandle::default(),
                    byte_size: 1,
                },
            )
            .unwrap();
    }

    #[test]
    fn evicts_least_recently_touched_tile_under_cap() {
        let mut cache = TileCache::new(TileCacheConfig {
            accounting: ResourceAccounting::CountTiles,
            budget: 2,
        });

        let a = cache_key(0, 0);
        let b = cache_key(1, 0);
        let c = cache_key(2, 0);

        cache.get_or_insert_requested(a, 1);
        cache.get_or_insert_requested(b, 2);
        cache.get_or_insert_requested(c, 3);

        assert_eq!(cache.evict_to_fit(), Ok(1));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(a).is_none(), "oldest-touched tile should be evicted");
        assert!(cache.get(b).is_some());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn pinned_visible_tile_survives_eviction_pressure() {
        let mut cache = TileCache::new(TileCacheConfig {
            accounting: ResourceAccounting::CountTiles,
            budget: 1,
        });

        let old_visible = cache_key(0, 0);
        let newer_offscreen = cache_key(1, 0);

        cache.get_or_insert_requested(old_visible, 1);
        cache.get_or_insert_requested(newer_offscreen, 2);
        cache.set_pinned([old_visible]);

        assert_eq!(cache.evict_to_fit(), Ok(1));
        assert!(
            cache.get(old_visible).is_some(),
            "pinned tile must survive even though it is the oldest"
        );
        assert!(cache.get(newer_offscreen).is_none());
    }

    #[test]
    fn estimate_mb_accounting_only_counts_ready_tiles() {
        let mut cache = TileCache::new(TileCacheConfig {
            accounting: ResourceAccounting::EstimateMb,
            budget: 100,
        });
        let key = cache_key(0, 0);
        cache.get_or_insert_requested(key, 1);
        assert_eq!(cache.used_budget(), 0);

        mark_ready(&mut cache, key);
        assert_eq!(cache.used_budget(), 1);
    }

    #[test]
    fn stale_worker_result_is_dropped_in_favor_of_the_newer_one() {
        let mut cache = TileCache::new(TileCacheConfig { accounting: ResourceAccounting::CountTiles, budget: 100 });
        let key = cache_key(0, 0);
        cache.get_or_insert_requested(key, 0);

        assert_eq!(
            cache.set_state_from_worker(key, TileState::Loading, RequestSequence(2)),
            Ok(true)
        );
        // A result for an older request sequence than the one already
        // applied is ignored, not an error.
        assert_eq!(
            cache.set_state_from_worker(key, TileState::Failed(crate::tile::TileLoadError::Cancelled), RequestSequence(1)),
            Ok(false)
        );
        assert_eq!(cache.get(key).unwrap().state(), TileState::Loading);

        assert_eq!(
            cache.set_state_from_worker(key, TileState::Decoded, RequestSequence(3)),
            Ok(true)
        );
        assert_eq!(cache.get(key).unwrap().state(), TileState::Decoded);
    }

    #[test]
    fn budget_exceeded_by_pinned_tiles_is_reported() {
        let mut cache = TileCache::new(TileCacheConfig {
            accounting: ResourceAccounting::CountTiles,
            budget: 1,
        });
        let a = cache_key(0, 0);
        let b = cache_key(1, 0);
        cache.get_or_insert_requested(a, 1);
        cache.get_or_insert_requested(b, 2);
        cache.set_pinned([a, b]);

        assert_eq!(
            cache.evict_to_fit(),
            Err(TileCacheError::BudgetExceededByPinnedTiles)
        );
    }
}
