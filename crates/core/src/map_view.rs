//! MapView: the orchestration root. Owns the DataSource registry, the
//! camera, the frame driver, a TileCache per DataSource, the scheduler,
//! and the POI/label/attribute subsystems, and exposes the Core API
//! surface (spec.md §6) to library consumers.

use std::collections::HashMap;

use mapengine_camera::{CameraMovementDetector, CameraPose, MovementDetectorConfig, MovementTransition};
use mapengine_collisions::ScreenRect;
use mapengine_frame_driver::{FrameDriver, FrameDriverConfig, FrameDriverDecision, FrameDriverInput};
use mapengine_labels::LabelId;
use mapengine_model::{geo_to_world, GeoCoordinate, TileCoord, WorldBounds};
use mapengine_protocol::MapEvent;
use mapengine_scheduler::TaskScheduler;
use mapengine_tiles::{Tile, TileCache, TileCacheConfig, TileCacheKey, VisibleTileSet, VisibleTileSetConfig};

use crate::datasource::{DataSource, DataSourceId, DataSourceRegistry};
use crate::error::CoreError;
use crate::events::{EventKind, MapEventSink};
use crate::theme::Theme;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewConfig {
    pub pixel_ratio: f32,
    pub max_fps: u32,
}

impl Default for MapViewConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            max_fps: 60,
        }
    }
}

/// `max_fps == 0` means "no cap" — drive at the platform's natural
/// cadence, which we model as the teacher's own default interval rather
/// than flooring to a nonsensical 1 FPS target.
fn frame_driver_config_for_fps(max_fps: u32) -> FrameDriverConfig {
    let default = FrameDriverConfig::default();
    let target = if max_fps == 0 { default.target_frame_interval_micros } else { 1_000_000u64 / max_fps as u64 };
    FrameDriverConfig {
        target_frame_interval_micros: target,
        idle_frame_interval_micros: default.idle_frame_interval_micros,
        vsync_slack_micros: default.vsync_slack_micros,
        fudge_micros: default.fudge_micros,
    }
}

pub struct MapView {
    config: MapViewConfig,
    data_sources: DataSourceRegistry,
    tile_caches: HashMap<DataSourceId, TileCache>,
    scheduler: TaskScheduler<u64>,
    camera: CameraPose,
    movement_detector: CameraMovementDetector,
    frame_driver: FrameDriver,
    event_sink: MapEventSink,
    theme: Option<Theme>,
    update_requested: bool,
    first_render_done: bool,
    frame_sequence_id: u64,
    last_frame_placements: Vec<(LabelId, ScreenRect)>,
}

impl MapView {
    pub fn new(config: MapViewConfig) -> Self {
        let camera = CameraPose::default();
        Self {
            tile_caches: HashMap::new(),
            scheduler: TaskScheduler::default(),
            movement_detector: CameraMovementDetector::new(MovementDetectorConfig::default(), camera),
            frame_driver: FrameDriver::new(frame_driver_config_for_fps(config.max_fps)),
            config,
            data_sources: DataSourceRegistry::new(),
            camera,
            event_sink: MapEventSink::new(),
            theme: None,
            update_requested: false,
            first_render_done: false,
            frame_sequence_id: 0,
            last_frame_placements: Vec::new(),
        }
    }

    pub fn config(&self) -> MapViewConfig {
        self.config
    }

    pub fn camera(&self) -> CameraPose {
        self.camera
    }

    pub fn theme(&self) -> Option<&Theme> {
        self.theme.as_ref()
    }

    pub fn events(&mut self) -> &mut MapEventSink {
        &mut self.event_sink
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: crate::events::EventCallback) {
        self.event_sink.subscribe(kind, callback);
    }

    // --- Core API surface: DataSource management ---------------------

    pub fn add_data_source(&mut self, source: Box<dyn DataSource>) -> Result<DataSourceId, CoreError> {
        let name = source.name().to_owned();
        let id = self.data_sources.add(source)?;
        self.tile_caches.insert(id, TileCache::new(TileCacheConfig::default()));
        self.event_sink.dispatch(&MapEvent::DatasourceConnect { name });
        self.request_update();
        Ok(id)
    }

    pub fn remove_data_source(&mut self, name: &str) -> Result<(), CoreError> {
        let id = self
            .data_sources
            .iter()
            .find(|(_, source)| source.name() == name)
            .map(|(id, _)| id);
        self.data_sources.remove_by_name(name)?;
        if let Some(id) = id {
            self.tile_caches.remove(&id);
        }
        self.request_update();
        Ok(())
    }

    pub fn data_sources(&self) -> &DataSourceRegistry {
        &self.data_sources
    }

    // --- Core API surface: theme --------------------------------------

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = Some(theme);
        self.event_sink.dispatch(&MapEvent::ThemeLoaded);
        self.request_update();
    }

    // --- Core API surface: camera -------------------------------------

    pub fn set_camera_geolocation(&mut self, latitude_deg: f64, longitude_deg: f64) -> Result<(), CoreError> {
        let target = geo_to_world(GeoCoordinate { latitude_deg, longitude_deg });
        let delta_x = target.x - self.camera.world_x();
        let delta_y = target.y - self.camera.world_y();
        self.camera.pan_by(delta_x, delta_y)?;
        self.request_update();
        Ok(())
    }

    pub fn set_camera_zoom_altitude(&mut self, altitude: f64) -> Result<(), CoreError> {
        self.camera.set_altitude(altitude)?;
        self.request_update();
        Ok(())
    }

    pub fn set_camera_yaw(&mut self, yaw_radians: f32) -> Result<(), CoreError> {
        let delta = yaw_radians - self.camera.yaw_radians();
        self.camera.rotate_yaw_by(delta)?;
        self.request_update();
        Ok(())
    }

    pub fn set_camera_tilt(&mut self, pitch_radians: f32) -> Result<(), CoreError> {
        let delta = pitch_radians - self.camera.pitch_radians();
        self.camera.tilt_pitch_by(delta)?;
        self.request_update();
        Ok(())
    }

    // --- Core API surface: frame/render controls ----------------------

    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.config.pixel_ratio = pixel_ratio;
        self.request_update();
    }

    pub fn set_max_fps(&mut self, max_fps: u32) {
        self.config.max_fps = max_fps;
        let was_driving = self.frame_driver.is_driving();
        self.frame_driver = FrameDriver::new(frame_driver_config_for_fps(max_fps));
        if was_driving {
            self.request_update();
        }
    }

    pub fn request_update(&mut self) {
        self.update_requested = true;
    }

    /// Advances one frame. Idempotent within the frame: calling
    /// `request_update()` any number of times before this still causes
    /// exactly one `update` dispatch, and `should_render` in the
    /// returned decision governs exactly one render.
    pub fn tick(&mut self, now_micros: u64, worker_results_pending: bool) -> FrameDriverDecision {
        self.frame_sequence_id += 1;

        if let Some(transition) = self.movement_detector.check_moved(self.camera, now_micros) {
            match transition {
                MovementTransition::Started => self.event_sink.dispatch(&MapEvent::MovementStarted),
                MovementTransition::Finished => self.event_sink.dispatch(&MapEvent::MovementFinished),
            }
        }

        let decision = self.frame_driver.tick(FrameDriverInput {
            frame_sequence_id: self.frame_sequence_id,
            now_micros,
            camera_moving: self.movement_detector.is_moving(),
            active_animation_count: 0,
            worker_results_pending,
        });

        if self.update_requested || decision.should_render {
            self.event_sink.dispatch(&MapEvent::Update);
        }
        if decision.should_render {
            if !self.first_render_done {
                self.first_render_done = true;
                self.event_sink.dispatch(&MapEvent::FirstRender);
            }
            self.event_sink.dispatch(&MapEvent::Render);
            self.event_sink.dispatch(&MapEvent::AfterRender);
            self.event_sink.dispatch(&MapEvent::FrameComplete);
        }

        self.update_requested = false;
        decision
    }

    // --- Core API surface: tile iteration ------------------------------

    pub fn tile_cache(&self, id: DataSourceId) -> Option<&TileCache> {
        self.tile_caches.get(&id)
    }

    pub fn tile_cache_mut(&mut self, id: DataSourceId) -> Option<&mut TileCache> {
        self.tile_caches.get_mut(&id)
    }

    pub fn scheduler_mut(&mut self) -> &mut TaskScheduler<u64> {
        &mut self.scheduler
    }

    pub fn iterate_cached_tiles(&self, id: DataSourceId) -> impl Iterator<Item = (&TileCacheKey, &Tile)> {
        self.tile_caches
            .get(&id)
            .into_iter()
            .flat_map(|cache| cache.iter())
    }

    pub fn visible_tile_coords(&self, level: u32, view_bounds: WorldBounds) -> Vec<TileCoord> {
        mapengine_tiles::tiles_intersecting(level, view_bounds)
    }

    /// Computes the Visible Tile Set for one DataSource: cull by
    /// `view_bounds` at `level`, cap by priority, and resolve each
    /// capped tile against that DataSource's cache (with fallback
    /// search to an ancestor or descendant).
    pub fn visible_tile_set(
        &self,
        id: DataSourceId,
        level: u32,
        view_bounds: WorldBounds,
        config: &VisibleTileSetConfig,
    ) -> VisibleTileSet {
        let Some(cache) = self.tile_caches.get(&id) else {
            return VisibleTileSet::default();
        };
        mapengine_tiles::compute_visible_tile_set(
            cache,
            id.0,
            level,
            view_bounds,
            self.camera.world_x(),
            self.camera.world_y(),
            0,
            mapengine_model::DEFAULT_OFFSET_BITS,
            config,
        )
    }

    // --- Core API surface: screen hit-testing --------------------------

    /// Replaces the last frame's placed label boxes — the host calls
    /// this after running the Label Placement Engine, since building
    /// candidates from tile content is the host's responsibility.
    pub fn record_frame_placements(&mut self, placements: Vec<(LabelId, ScreenRect)>) {
        self.last_frame_placements = placements;
    }

    pub fn intersect_at_screen(&self, x: f32, y: f32) -> Option<LabelId> {
        self.last_frame_placements
            .iter()
            .find(|(_, rect)| {
                x >= rect.x && x <= rect.x + rect.width && y >= rect.y && y <= rect.y + rect.height
            })
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::TilingScheme;

    struct StubSource {
        name: String,
    }

    impl DataSource for StubSource {
        fn name(&self) -> &str {
            &self.name
        }
        fn ready(&self) -> bool {
            true
        }
        fn style_set_name(&self) -> &str {
            "default"
        }
        fn tiling_scheme(&self) -> TilingScheme {
            TilingScheme::WebMercator
        }
        fn get_tile(&self, _tile_key: mapengine_model::TileKey) -> Option<crate::datasource::TileSnapshot> {
            None
        }
        fn dispose(&mut self) {}
    }

    #[test]
    fn adding_data_source_creates_its_tile_cache() {
        let mut map_view = MapView::new(MapViewConfig::default());
        let id = map_view
            .add_data_source(Box::new(StubSource { name: "roads".into() }))
            .unwrap();
        assert!(map_view.tile_cache(id).is_some());
    }

    #[test]
    fn tick_is_idempotent_within_a_frame() {
        let mut map_view = MapView::new(MapViewConfig::default());
        map_view.request_update();
        map_view.request_update();
        let decision = map_view.tick(0, false);
        assert_eq!(decision.frame_sequence_id, 1);
    }

    #[test]
    fn movement_pairs_started_and_finished_across_ticks() {
        let mut map_view = MapView::new(MapViewConfig::default());
        map_view.set_camera_geolocation(10.0, 20.0).unwrap();
        map_view.tick(0, false);
        assert!(map_view.movement_detector.is_moving());
    }

    #[test]
    fn intersect_at_screen_finds_containing_box() {
        let mut map_view = MapView::new(MapViewConfig::default());
        map_view.record_frame_placements(vec![(
            7,
            ScreenRect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
        )]);
        assert_eq!(map_view.intersect_at_screen(5.0, 5.0), Some(7));
        assert_eq!(map_view.intersect_at_screen(50.0, 50.0), None);
    }
}
