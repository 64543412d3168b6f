//! Tile lifecycle state machine: `Requested -> Loading -> Decoded|Failed
//! -> Building -> Ready -> Disposed`. A tile's GPU residency is modeled
//! as an opaque handle rather than a concrete `wgpu` resource — the GPU
//! backend that allocates and frees those resources lives outside this
//! workspace.

use mapengine_model::TileKey;
use mapengine_protocol::RequestSequence;

slotmap::new_key_type! {
    /// Placeholder key type so the crate does not depend on `slotmap`
    /// merely to model "some opaque handle". Kept distinct from
    /// `mapengine_render_protocol::ImageHandle`: a tile's GPU residency
    /// and its decoded image atlas slot are tracked independently.
    pub struct GpuResourceHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLoadError {
    FetchFailed,
    DecodeFailed,
    Cancelled,
}

/// A `Failed` tile is retried with backoff up to this many times before
/// it is considered permanent and skipped by visibility.
pub const MAX_LOAD_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Requested,
    Loading,
    Decoded,
    Failed(TileLoadError),
    Building,
    /// Some of the tile's geometry kinds are ready and may be drawn
    /// while the remaining kinds are still building.
    PartialReady {
        resource: GpuResourceHandle,
        byte_size: u64,
    },
    Ready {
        resource: GpuResourceHandle,
        byte_size: u64,
    },
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLifecycleError {
    InvalidTransition {
        from: TileStateKind,
        to: TileStateKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStateKind {
    Requested,
    Loading,
    Decoded,
    Failed,
    Building,
    PartialReady,
    Ready,
    Disposed,
}

impl TileState {
    pub fn kind(&self) -> TileStateKind {
        match self {
            TileState::Requested => TileStateKind::Requested,
            TileState::Loading => TileStateKind::Loading,
            TileState::Decoded => TileStateKind::Decoded,
            TileState::Failed(_) => TileStateKind::Failed,
            TileState::Building => TileStateKind::Building,
            TileState::PartialReady { .. } => TileStateKind::PartialReady,
            TileState::Ready { .. } => TileStateKind::Ready,
            TileState::Disposed => TileStateKind::Disposed,
        }
    }

    fn can_transition_to(&self, next: &TileState) -> bool {
        use TileStateKind::*;
        matches!(
            (self.kind(), next.kind()),
            (Requested, Loading)
                | (Loading, Decoded)
                | (Loading, Failed)
                | (Decoded, Building)
                | (Building, Ready)
                | (Building, PartialReady)
                | (Building, Failed)
                | (PartialReady, Building)
                | (PartialReady, Ready)
                | (PartialReady, Failed)
                | (Failed, Loading)
                | (_, Disposed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCacheKey {
    pub data_source_id: u32,
    pub tile_key: TileKey,
}

/// One cached map tile, independent of whether it is currently on
/// screen. `last_touched_frame` drives LRU ordering in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub cache_key: TileCacheKey,
    state: TileState,
    last_touched_frame: u64,
    retry_count: u32,
    last_applied_sequence: Option<RequestSequence>,
}

impl Tile {
    pub fn new(cache_key: TileCacheKey, created_at_frame: u64) -> Self {
        Self {
            cache_key,
            state: TileState::Requested,
            last_touched_frame: created_at_frame,
            retry_count: 0,
            last_applied_sequence: None,
        }
    }

    pub fn last_applied_sequence(&self) -> Option<RequestSequence> {
        self.last_applied_sequence
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn last_touched_frame(&self) -> u64 {
        self.last_touched_frame
    }

    /// Fully ready: every geometry kind is built. Use [`Tile::is_renderable`]
    /// to also accept a tile whose partial geometry is usable.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, TileState::Ready { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.state, TileState::PartialReady { .. })
    }

    /// True for anything drawable right now: fully ready or partially
    /// built. Callers that need to down-rank partial tiles should check
    /// [`Tile::is_partial`] as well.
    pub fn is_renderable(&self) -> bool {
        matches!(self.state, TileState::Ready { .. } | TileState::PartialReady { .. })
    }

    pub fn resident_byte_size(&self) -> u64 {
        match self.state {
            TileState::Ready { byte_size, .. } | TileState::PartialReady { byte_size, .. } => byte_size,
            _ => 0,
        }
    }

    /// Number of times this tile has been retried after a load/build
    /// failure. Resets to zero once a retry succeeds.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// A `Failed` tile that has exhausted its retry budget: permanent
    /// until the tile is evicted, and skipped by visibility.
    pub fn is_permanently_failed(&self) -> bool {
        matches!(self.state, TileState::Failed(_)) && self.retry_count >= MAX_LOAD_RETRIES
    }

    pub fn touch(&mut self, frame_id: u64) {
        self.last_touched_frame = self.last_touched_frame.max(frame_id);
    }

    pub fn transition_to(&mut self, next: TileState) -> Result<(), TileLifecycleError> {
        if !self.state.can_transition_to(&next) {
            return Err(TileLifecycleError::InvalidTransition {
                from: self.state.kind(),
                to: next.kind(),
            });
        }
        if matches!(next, TileState::Failed(_)) {
            self.retry_count += 1;
        } else if matches!(next, TileState::Ready { .. }) {
            self.retry_count = 0;
        }
        self.state = next;
        Ok(())
    }

    /// Applies a state transition reported by a tile worker, tagged with
    /// the sequence number of the request it answers. A result whose
    /// sequence is not strictly newer than the last one applied is a
    /// stale race (the request it answers has already been superseded)
    /// and is silently dropped rather than treated as an error — returns
    /// `Ok(false)` rather than mutating the tile.
    pub fn transition_to_from_worker(
        &mut self,
        next: TileState,
        sequence: RequestSequence,
    ) -> Result<bool, TileLifecycleError> {
        if let Some(last) = self.last_applied_sequence {
            if sequence <= last {
                return Ok(false);
            }
        }
        self.transition_to(next)?;
        self.last_applied_sequence = Some(sequence);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapengine_model::{DEFAULT_OFFSET_BITS, TileCoord};

    fn key() -> TileCacheKey {
        TileCacheKey {
            data_source_id: 0,
            tile_key: mapengine_model::TileKey::encode(
                TileCoord::new(2, 1, 1).unwrap(),
                0,
                DEFAULT_OFFSET_BITS,
            )
            .unwrap(),
        }
    }

    #[test]
    fn full_lifecycle_reaches_ready() {
        let mut tile = Tile::new(key(), 0);
        tile.transition_to(TileState::Loading).unwrap();
        tile.transition_to(TileState::Decoded).unwrap();
        tile.transition_to(TileState::Building).unwrap();
        tile.transition_to(TileState::Ready {
            resource: GpuResourceHandle::default(),
            byte_size: 65_536,
        })
        .unwrap();

        assert!(tile.is_ready());
        assert_eq!(tile.resident_byte_size(), 65_536);
    }

    #[test]
    fn rejects_skipping_loading() {
        let mut tile = Tile::new(key(), 0);
        let error = tile
            .transition_to(TileState::Decoded)
            .expect_err("decoded is unreachable without loading first");
        assert_eq!(
            error,
            TileLifecycleError::InvalidTransition {
                from: TileStateKind::Requested,
                to: TileStateKind::Decoded,
            }
        );
    }

    #[test]
    fn disposed_is_reachable_from_any_state() {
        let mut tile = Tile::new(key(), 0);
        tile.transition_to(TileState::Disposed).unwrap();
        assert_eq!(tile.state().kind(), TileStateKind::Disposed);
    }

    #[test]
    fn touch_only_moves_frame_forward() {
        let mut tile = Tile::new(key(), 10);
        tile.touch(5);
        assert_eq!(tile.last_touched_frame(), 10);
        tile.touch(20);
        assert_eq!(tile.last_touched_frame(), 20);
    }

    #[test]
    fn failed_tile_can_retry_and_counts_attempts() {
        let mut tile = Tile::new(key(), 0);
        tile.transition_to(TileState::Loading).unwrap();
        tile.transition_to(TileState::Failed(TileLoadError::FetchFailed)).unwrap();
        assert_eq!(tile.retry_count(), 1);
        assert!(!tile.is_permanently_failed());

        tile.transition_to(TileState::Loading).unwrap();
        tile.transition_to(TileState::Decoded).unwrap();
        tile.transition_to(TileState::Building).unwrap();
        tile.transition_to(TileState::Ready {
            resource: GpuResourceHandle::default(),
            byte_size: 10,
        })
        .unwrap();
        assert_eq!(tile.retry_count(), 0);
    }

    #[test]
    fn failed_tile_becomes_permanent_after_exhausting_retries() {
        let mut tile = Tile::new(key(), 0);
        tile.transition_to(TileState::Loading).unwrap();
        for _ in 0..MAX_LOAD_RETRIES {
            tile.transition_to(TileState::Failed(TileLoadError::FetchFailed)).unwrap();
            if tile.is_permanently_failed() {
                break;
            }
            tile.transition_to(TileState::Loading).unwrap();
        }
        assert!(tile.is_permanently_failed());
    }

    #[test]
    fn partial_ready_is_renderable_but_not_fully_ready() {
        let mut tile = Tile::new(key(), 0);
        tile.transition_to(TileState::Loading).unwrap();
        tile.transition_to(TileState::Decoded).unwrap();
        tile.transition_to(TileState::Building).unwrap();
        tile.transition_to(TileState::PartialReady {
            resource: GpuResourceHandle::default(),
            byte_size: 40,
        })
        .unwrap();

        assert!(tile.is_renderable());
        assert!(tile.is_partial());
        assert!(!tile.is_ready());
        assert_eq!(tile.resident_byte_size(), 40);

        tile.transition_to(TileState::Ready {
            resource: GpuResourceHandle::default(),
            byte_size: 100,
        })
        .unwrap();
        assert!(tile.is_ready());
        assert!(!tile.is_partial());
    }
}
