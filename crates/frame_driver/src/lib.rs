//! Frame Driver: paces the render loop to a target FPS while idle, and
//! keeps it running at full rate whenever the camera is moving, an
//! animation is in flight, or a worker result is waiting to be applied.

use std::collections::VecDeque;

/// Number of trailing inter-render intervals averaged into
/// [`FrameDriver::detected_fps`].
const DETECTED_FPS_WINDOW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDriverConfig {
    pub target_frame_interval_micros: u64,
    pub idle_frame_interval_micros: u64,
    /// Held back from the target interval to absorb vsync jitter — the
    /// host's frame callback rarely fires at the exact microsecond
    /// requested.
    pub vsync_slack_micros: u64,
    /// Extra margin subtracted alongside `vsync_slack_micros`, kept
    /// separate so the two can be tuned independently.
    pub fudge_micros: u64,
}

impl Default for FrameDriverConfig {
    fn default() -> Self {
        Self {
            target_frame_interval_micros: 16_667, // ~60 fps
            idle_frame_interval_micros: 250_000,   // ~4 fps while nothing is happening
            vsync_slack_micros: 1_500,
            fudge_micros: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDriverInput {
    pub frame_sequence_id: u64,
    pub now_micros: u64,
    pub camera_moving: bool,
    pub active_animation_count: u32,
    pub worker_results_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDriverUpdateReason {
    DriveStarted,
    DriveTick,
    DriveStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDriverDecision {
    pub frame_sequence_id: u64,
    pub driving: bool,
    pub should_render: bool,
    pub next_wake_micros: u64,
    pub update_reason: Option<FrameDriverUpdateReason>,
}

/// Tracks the number of in-flight animations the driver must keep
/// ticking for; `begin`/`end` are refcount increments/decrements so two
/// overlapping animations don't let one's `end` starve the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationRefCount(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationTransition {
    Started,
    Finished,
}

impl AnimationRefCount {
    pub fn count(&self) -> u32 {
        self.0
    }

    pub fn begin(&mut self) -> Option<AnimationTransition> {
        let was_zero = self.0 == 0;
        self.0 += 1;
        was_zero.then_some(AnimationTransition::Started)
    }

    pub fn end(&mut self) -> Option<AnimationTransition> {
        if self.0 == 0 {
            panic!("animation ref count underflow: end() called with no active animations");
        }
        self.0 -= 1;
        (self.0 == 0).then_some(AnimationTransition::Finished)
    }
}

#[derive(Debug, Clone)]
pub struct FrameDriver {
    config: FrameDriverConfig,
    driving: bool,
    last_render_micros: Option<u64>,
    recent_intervals: VecDeque<u64>,
}

impl FrameDriver {
    pub fn new(config: FrameDriverConfig) -> Self {
        Self {
            config,
            driving: false,
            last_render_micros: None,
            recent_intervals: VecDeque::with_capacity(DETECTED_FPS_WINDOW),
        }
    }

    pub fn config(&self) -> FrameDriverConfig {
        self.config
    }

    pub fn is_driving(&self) -> bool {
        self.driving
    }

    /// Mean of the last [`DETECTED_FPS_WINDOW`] inter-render intervals,
    /// or `None` until at least two renders have happened.
    pub fn detected_fps(&self) -> Option<f64> {
        if self.recent_intervals.is_empty() {
            return None;
        }
        let total: u64 = self.recent_intervals.iter().sum();
        let mean = total as f64 / self.recent_intervals.len() as f64;
        (mean > 0.0).then_some(1_000_000.0 / mean)
    }

    fn record_render(&mut self, now_micros: u64) {
        if let Some(last) = self.last_render_micros {
            if self.recent_intervals.len() == DETECTED_FPS_WINDOW {
                self.recent_intervals.pop_front();
            }
            self.recent_intervals.push_back(now_micros.saturating_sub(last));
        }
        self.last_render_micros = Some(now_micros);
    }

    /// Earliest time a scheduled tick is allowed to actually render,
    /// net of vsync slack and fudge. `None` before the first render —
    /// there is nothing to pace against yet.
    fn earliest_next_render_micros(&self) -> Option<u64> {
        self.last_render_micros.map(|last| {
            last.saturating_add(self.config.target_frame_interval_micros)
                .saturating_sub(self.config.vsync_slack_micros)
                .saturating_sub(self.config.fudge_micros)
        })
    }

    pub fn tick(&mut self, input: FrameDriverInput) -> FrameDriverDecision {
        let wants_to_drive = input.camera_moving
            || input.active_animation_count > 0
            || input.worker_results_pending;

        if wants_to_drive {
            if let Some(target) = self.earliest_next_render_micros() {
                if input.now_micros < target {
                    // The host's frame callback fired ahead of our target
                    // time — reschedule to the same callback instead of
                    // rendering early.
                    self.driving = true;
                    return FrameDriverDecision {
                        frame_sequence_id: input.frame_sequence_id,
                        driving: true,
                        should_render: false,
                        next_wake_micros: target,
                        update_reason: None,
                    };
                }
            }

            let was_stopped = !self.driving;
            self.driving = true;
            self.record_render(input.now_micros);
            return FrameDriverDecision {
                frame_sequence_id: input.frame_sequence_id,
                driving: true,
                should_render: true,
                next_wake_micros: input
                    .now_micros
                    .saturating_add(self.config.target_frame_interval_micros),
                update_reason: Some(if was_stopped {
                    FrameDriverUpdateReason::DriveStarted
                } else {
                    FrameDriverUpdateReason::DriveTick
                }),
            };
        }

        if self.driving {
            self.driving = false;
            self.record_render(input.now_micros);
            return FrameDriverDecision {
                frame_sequence_id: input.frame_sequence_id,
                driving: false,
                should_render: true,
                next_wake_micros: input
                    .now_micros
                    .saturating_add(self.config.idle_frame_interval_micros),
                update_reason: Some(FrameDriverUpdateReason::DriveStopped),
            };
        }

        FrameDriverDecision {
            frame_sequence_id: input.frame_sequence_id,
            driving: false,
            should_render: false,
            next_wake_micros: input
                .now_micros
                .saturating_add(self.config.idle_frame_interval_micros),
            update_reason: None,
        }
    }
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new(FrameDriverConfig::default())
    }
}
