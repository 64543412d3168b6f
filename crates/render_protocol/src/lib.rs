//! Data and command protocol between the map engine core and the
//! external GPU rendering backend (out of scope here — this crate only
//! defines what crosses that boundary).

use std::sync::Arc;

use mapengine_model::TileKey;

slotmap::new_key_type! {
    /// Opaque handle into the GPU backend's resident-image table. The
    /// backend owns the actual texture/buffer; this crate only ever
    /// carries the handle.
    pub struct ImageHandle;
}

pub type TransformMatrix4x4 = [f32; 16];
pub const TILE_DRAW_BATCH_CAPACITY: usize = 256;
pub const LABEL_DRAW_BATCH_CAPACITY: usize = 256;

pub type DataSourceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Normal,
    Multiply,
}

/// One ready tile drawn at its world-space quad, with the fade-in
/// opacity that makes newly-ready tiles cross-fade rather than pop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileDrawItem {
    pub tile_key: TileKey,
    pub data_source_id: DataSourceId,
    pub image_handle: ImageHandle,
    pub opacity: f32,
}

/// One placed label glyph or icon, in screen space, with the fade
/// opacity from the label placement fade state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelDrawItem {
    pub image_handle: ImageHandle,
    pub screen_x: f32,
    pub screen_y: f32,
    pub rotation_radians: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBatchBuildError {
    TooManyTiles,
    TooManyLabels,
}

/// Bounded draw batch submitted once per frame. Bounding it (rather than
/// an unbounded `Vec`) keeps the per-frame upload cost predictable, the
/// same reasoning the teacher applied to its fixed-capacity command
/// batches.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBatch {
    pub revision: u64,
    tile_len: u16,
    tiles: [Option<TileDrawItem>; TILE_DRAW_BATCH_CAPACITY],
    label_len: u16,
    labels: [Option<LabelDrawItem>; LABEL_DRAW_BATCH_CAPACITY],
}

impl RenderBatch {
    pub fn from_slices(
        revision: u64,
        tiles: &[TileDrawItem],
        labels: &[LabelDrawItem],
    ) -> Result<Self, RenderBatchBuildError> {
        if tiles.len() > TILE_DRAW_BATCH_CAPACITY {
            return Err(RenderBatchBuildError::TooManyTiles);
        }
        if labels.len() > LABEL_DRAW_BATCH_CAPACITY {
            return Err(RenderBatchBuildError::TooManyLabels);
        }

        let mut batch_tiles = [None; TILE_DRAW_BATCH_CAPACITY];
        for (slot, tile) in batch_tiles.iter_mut().zip(tiles.iter()) {
            *slot = Some(*tile);
        }
        let mut batch_labels = [None; LABEL_DRAW_BATCH_CAPACITY];
        for (slot, label) in batch_labels.iter_mut().zip(labels.iter()) {
            *slot = Some(*label);
        }

        Ok(Self {
            revision,
            tile_len: u16::try_from(tiles.len()).expect("tile count exceeds u16"),
            tiles: batch_tiles,
            label_len: u16::try_from(labels.len()).expect("label count exceeds u16"),
            labels: batch_labels,
        })
    }

    pub fn tiles(&self) -> impl Iterator<Item = &TileDrawItem> {
        self.tiles[..self.tile_len as usize]
            .iter()
            .filter_map(Option::as_ref)
    }

    pub fn labels(&self) -> impl Iterator<Item = &LabelDrawItem> {
        self.labels[..self.label_len as usize]
            .iter()
            .filter_map(Option::as_ref)
    }

    pub fn tile_count(&self) -> usize {
        self.tile_len as usize
    }

    pub fn label_count(&self) -> usize {
        self.label_len as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTreeSnapshot {
    pub revision: u64,
    pub root: Arc<RenderNodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderNodeSnapshot {
    Tile {
        tile_key: TileKey,
        blend: BlendMode,
        image_handle: ImageHandle,
    },
    Group {
        group_id: u64,
        blend: BlendMode,
        children: Arc<[RenderNodeSnapshot]>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendModePipelineStrategy {
    SurfaceAlphaBlend,
    SurfaceMultiplyBlend,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPassStrategy {
    IsolatedOffscreenComposite,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStepSupportMatrix {
    normal_blend_strategy: BlendModePipelineStrategy,
    multiply_blend_strategy: BlendModePipelineStrategy,
    group_strategy: GroupPassStrategy,
}

impl RenderStepSupportMatrix {
    pub const fn current_executable_semantics() -> Self {
        Self {
            normal_blend_strategy: BlendModePipelineStrategy::SurfaceAlphaBlend,
            multiply_blend_strategy: BlendModePipelineStrategy::SurfaceMultiplyBlend,
            group_strategy: GroupPassStrategy::IsolatedOffscreenComposite,
        }
    }

    pub const fn blend_strategy(&self, blend_mode: BlendMode) -> BlendModePipelineStrategy {
        match blend_mode {
            BlendMode::Normal => self.normal_blend_strategy,
            BlendMode::Multiply => self.multiply_blend_strategy,
        }
    }

    pub const fn group_strategy(&self) -> GroupPassStrategy {
        self.group_strategy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStepUnsupportedReason {
    BlendModeUnsupported { blend_mode: BlendMode },
    GroupCompositingUnsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStepValidationError {
    pub step_index: usize,
    pub reason: RenderStepUnsupportedReason,
}

impl RenderTreeSnapshot {
    pub fn validate_executable(
        &self,
        support: &RenderStepSupportMatrix,
    ) -> Result<(), RenderStepValidationError> {
        let mut stack = vec![self.root.as_ref()];
        let mut node_index = 0usize;
        while let Some(node) = stack.pop() {
            match node {
                RenderNodeSnapshot::Tile { blend, .. } => {
                    if matches!(
                        support.blend_strategy(*blend),
                        BlendModePipelineStrategy::Unsupported
                    ) {
                        return Err(RenderStepValidationError {
                            step_index: node_index,
                            reason: RenderStepUnsupportedReason::BlendModeUnsupported {
                                blend_mode: *blend,
                            },
                        });
                    }
                }
                RenderNodeSnapshot::Group {
                    blend, children, ..
                } => {
                    if matches!(
                        support.blend_strategy(*blend),
                        BlendModePipelineStrategy::Unsupported
                    ) {
                        return Err(RenderStepValidationError {
                            step_index: node_index,
                            reason: RenderStepUnsupportedReason::BlendModeUnsupported {
                                blend_mode: *blend,
                            },
                        });
                    }
                    if matches!(support.group_strategy(), GroupPassStrategy::Unsupported) {
                        return Err(RenderStepValidationError {
                            step_index: node_index,
                            reason: RenderStepUnsupportedReason::GroupCompositingUnsupported,
                        });
                    }
                    for child in children.iter().rev() {
                        stack.push(child);
                    }
                }
            }
            node_index = node_index
                .checked_add(1)
                .expect("render tree node index overflow");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    SetViewTransform { matrix: TransformMatrix4x4 },
    SetViewport(Viewport),
    UpsertImage { handle: ImageHandle, width: u32, height: u32, rgba8: Arc<[u8]> },
    EvictImage { handle: ImageHandle },
    SubmitBatch(RenderBatch),
    DropStaleWorkBeforeRevision { revision: u64 },
    PresentToSurface,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(root: RenderNodeSnapshot) -> RenderTreeSnapshot {
        RenderTreeSnapshot {
            revision: 7,
            root: Arc::new(root),
        }
    }

    #[test]
    fn current_matrix_accepts_multiply_leaf() {
        let root = RenderNodeSnapshot::Tile {
            tile_key: TileKey::encode(
                mapengine_model::TileCoord::new(0, 0, 0).unwrap(),
                0,
                mapengine_model::DEFAULT_OFFSET_BITS,
            )
            .unwrap(),
            blend: BlendMode::Multiply,
            image_handle: ImageHandle::default(),
        };
        let snapshot = snapshot(root);

        snapshot
            .validate_executable(&RenderStepSupportMatrix::current_executable_semantics())
            .expect("multiply should be supported by current executable semantics");
    }

    #[test]
    fn current_matrix_accepts_group_boundaries() {
        let root = RenderNodeSnapshot::Group {
            group_id: 0,
            blend: BlendMode::Normal,
            children: Arc::from(
                vec![RenderNodeSnapshot::Tile {
                    tile_key: TileKey::encode(
                        mapengine_model::TileCoord::new(0, 0, 0).unwrap(),
                        0,
                        mapengine_model::DEFAULT_OFFSET_BITS,
                    )
                    .unwrap(),
                    blend: BlendMode::Normal,
                    image_handle: ImageHandle::default(),
                }]
                .into_boxed_slice(),
            ),
        };
        let snapshot = snapshot(root);

        snapshot
            .validate_executable(&RenderStepSupportMatrix::current_executable_semantics())
            .expect("group boundary should be valid as isolated compositing in current semantics");
    }

    #[test]
    fn group_blend_reports_unsupported_mode() {
        let root = RenderNodeSnapshot::Group {
            group_id: 7,
            blend: BlendMode::Multiply,
            children: Arc::from(Vec::<RenderNodeSnapshot>::new().into_boxed_slice()),
        };
        let snapshot = snapshot(root);

        let support = RenderStepSupportMatrix {
            normal_blend_strategy: BlendModePipelineStrategy::SurfaceAlphaBlend,
            multiply_blend_strategy: BlendModePipelineStrategy::Unsupported,
            group_strategy: GroupPassStrategy::IsolatedOffscreenComposite,
        };

        let error = snapshot
            .validate_executable(&support)
            .expect_err("group multiply blend should be rejected when unsupported");
        assert_eq!(error.step_index, 0);
        assert_eq!(
            error.reason,
            RenderStepUnsupportedReason::BlendModeUnsupported {
                blend_mode: BlendMode::Multiply,
            }
        );
    }

    #[test]
    fn render_batch_from_slices_preserves_items() {
        let tile = TileDrawItem {
            tile_key: TileKey::encode(
                mapengine_model::TileCoord::new(0, 0, 0).unwrap(),
                0,
                mapengine_model::DEFAULT_OFFSET_BITS,
            )
            .unwrap(),
            data_source_id: 1,
            image_handle: ImageHandle::default(),
            opacity: 1.0,
        };
        let label = LabelDrawItem {
            image_handle: ImageHandle::default(),
            screen_x: 10.0,
            screen_y: 20.0,
            rotation_radians: 0.0,
            opacity: 0.5,
        };

        let batch = RenderBatch::from_slices(9, &[tile], &[label]).expect("build batch");

        assert_eq!(batch.tile_count(), 1);
        assert_eq!(batch.label_count(), 1);
        assert_eq!(batch.tiles().next(), Some(&tile));
        assert_eq!(batch.labels().next(), Some(&label));
    }

    #[test]
    fn render_batch_rejects_too_many_tiles() {
        let tile = TileDrawItem {
            tile_key: TileKey::encode(
                mapengine_model::TileCoord::new(0, 0, 0).unwrap(),
                0,
                mapengine_model::DEFAULT_OFFSET_BITS,
            )
            .unwrap(),
            data_source_id: 1,
            image_handle: ImageHandle::default(),
            opacity: 1.0,
        };
        let tiles = vec![tile; TILE_DRAW_BATCH_CAPACITY + 1];

        let error = RenderBatch::from_slices(1, &tiles, &[])
            .expect_err("batch should reject too many tiles");
        assert_eq!(error, RenderBatchBuildError::TooManyTiles);
    }
}
