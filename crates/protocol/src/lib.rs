//! Bottom communication protocol shared between the main (frame loop)
//! thread and the tile-worker thread pool. Can be depended on by any
//! crate; depends only on `mapengine-model`.
//!
//! Transport design (spec §5 "Concurrency & Resource Model"):
//! - Camera pose ring: lossy high-frequency samples (ok to drop/overwrite
//!   under back-pressure — only the newest pose matters for culling).
//! - Control events that define semantic boundaries (datasource add/
//!   remove, theme swap) MUST be delivered reliably and MUST NOT be
//!   folded into the lossy ring. Dropping a boundary event leaves the
//!   Visible Tile Set computing against a stale DataSource list.

use mapengine_model::TileKey;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPoseSample {
    /// Groups samples that share the same camera epoch (e.g. after a
    /// `force_moved` discontinuity); consumers must not interpolate
    /// across an epoch boundary.
    pub epoch: u32,
    pub world_x: f64,
    pub world_y: f64,
    pub world_z: f64,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    pub roll_radians: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    DataSourceAdded { name: String },
    DataSourceRemoved { name: String },
    ThemeLoaded,
}

/// Monotonic per-tile-key request counter (spec §5 "Ordering guarantees"):
/// a later result for the same tile key supersedes an earlier one iff its
/// request sequence is strictly newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestSequence(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRequestId {
    pub data_source_id: u32,
    pub tile_key: TileKey,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub enum DecodeJob<DataSourceHandle> {
    FetchAndDecode {
        request: TileRequestId,
        sequence: RequestSequence,
        data_source: DataSourceHandle,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentFrameId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubmitWaterline(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExecutedBatchWaterline(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompleteWaterline(pub u64);

/// One batch of worker results applied to the Tile Cache each time the
/// Frame Driver polls the completion queue at the start of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFeedbackFrame<Result, Error> {
    pub present_frame_id: PresentFrameId,
    pub submit_waterline: SubmitWaterline,
    pub executed_batch_waterline: ExecutedBatchWaterline,
    pub complete_waterline: CompleteWaterline,
    /// `results` / `errors` are non-overwritable deltas. They must not be
    /// modeled as a single waterline because they are not contiguous, and
    /// losing one would silently drop a decoded tile or a failure reason.
    pub results: Vec<Result>,
    pub errors: Vec<Error>,
}

/// Left to upper layers so the protocol layer stays "dumb": must remove
/// duplicate elements, and must avoid a naive `iter().any()` dedup (O(n^2))
/// once batch sizes grow.
pub trait MergeVec: Sized {
    fn merge_vec(current: &mut Vec<Self>, incoming: Vec<Self>);
}

impl<Result, Error> WorkerFeedbackFrame<Result, Error>
where
    Result: MergeVec,
    Error: MergeVec,
{
    pub fn merge_mailbox(mut current: Self, newer: Self) -> Self {
        current.present_frame_id = current.present_frame_id.max(newer.present_frame_id);
        current.submit_waterline = current.submit_waterline.max(newer.submit_waterline);
        current.executed_batch_waterline = current
            .executed_batch_waterline
            .max(newer.executed_batch_waterline);
        current.complete_waterline = current.complete_waterline.max(newer.complete_waterline);
        Result::merge_vec(&mut current.results, newer.results);
        Error::merge_vec(&mut current.errors, newer.errors);
        current
    }
}

/// Every event spec §6 lists observers can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    Update,
    Render,
    AfterRender,
    FirstRender,
    FrameComplete,
    ThemeLoaded,
    AnimationStarted,
    AnimationFinished,
    MovementStarted,
    MovementFinished,
    DatasourceConnect { name: String },
    CopyrightChanged,
    ContextLost,
    ContextRestored,
}
