//! Camera pose storage and the Camera Movement Detector: the debounce
//! state machine that turns a stream of pose writes into
//! `movement-started` / `movement-finished` event pairs.

/// World-space pose: position plus orientation. Altitude stands in for
/// zoom level — a camera closer to the ground sees a smaller ground
/// footprint, same as a higher zoom level would.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    world_x: f64,
    world_y: f64,
    altitude: f64,
    yaw_radians: f32,
    pitch_radians: f32,
    roll_radians: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPoseError {
    InvalidAltitude,
    NonFiniteValue,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            world_x: 0.0,
            world_y: 0.0,
            altitude: 1.0,
            yaw_radians: 0.0,
            pitch_radians: 0.0,
            roll_radians: 0.0,
        }
    }
}

impl CameraPose {
    pub fn world_x(&self) -> f64 {
        self.world_x
    }

    pub fn world_y(&self) -> f64 {
        self.world_y
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn yaw_radians(&self) -> f32 {
        self.yaw_radians
    }

    pub fn pitch_radians(&self) -> f32 {
        self.pitch_radians
    }

    pub fn roll_radians(&self) -> f32 {
        self.roll_radians
    }

    pub fn set_altitude(&mut self, altitude: f64) -> Result<(), CameraPoseError> {
        if !altitude.is_finite() || altitude <= 0.0 {
            return Err(CameraPoseError::InvalidAltitude);
        }
        self.altitude = altitude;
        Ok(())
    }

    pub fn pan_by(&mut self, delta_x: f64, delta_y: f64) -> Result<(), CameraPoseError> {
        self.world_x = checked_add_f64(self.world_x, delta_x)?;
        self.world_y = checked_add_f64(self.world_y, delta_y)?;
        Ok(())
    }

    pub fn zoom_by_factor_about(
        &mut self,
        factor: f64,
        anchor_world_x: f64,
        anchor_world_y: f64,
    ) -> Result<(), CameraPoseError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CameraPoseError::InvalidAltitude);
        }
        if !anchor_world_x.is_finite() || !anchor_world_y.is_finite() {
            return Err(CameraPoseError::NonFiniteValue);
        }

        let next_altitude = checked_mul_f64(self.altitude, factor)?;
        if next_altitude <= 0.0 {
            return Err(CameraPoseError::InvalidAltitude);
        }

        let keep_anchor_scale = 1.0 - factor;
        self.world_x =
            checked_add_f64(self.world_x * factor, anchor_world_x * keep_anchor_scale)?;
        self.world_y =
            checked_add_f64(self.world_y * factor, anchor_world_y * keep_anchor_scale)?;
        self.altitude = next_altitude;
        Ok(())
    }

    pub fn rotate_yaw_by(&mut self, delta_yaw: f32) -> Result<(), CameraPoseError> {
        self.yaw_radians = checked_add_f32(self.yaw_radians, delta_yaw)?;
        Ok(())
    }

    pub fn tilt_pitch_by(&mut self, delta_pitch: f32) -> Result<(), CameraPoseError> {
        self.pitch_radians = checked_add_f32(self.pitch_radians, delta_pitch)?;
        Ok(())
    }

    /// Distance in the metric used by `zoom_by_factor_about`'s anchor
    /// coordinates; callers compare this against a debounce threshold.
    pub fn position_distance_to(&self, other: &Self) -> f64 {
        let dx = self.world_x - other.world_x;
        let dy = self.world_y - other.world_y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn altitude_ratio_to(&self, other: &Self) -> f64 {
        (self.altitude / other.altitude).max(other.altitude / self.altitude)
    }
}

fn checked_add_f64(current: f64, delta: f64) -> Result<f64, CameraPoseError> {
    if !delta.is_finite() {
        return Err(CameraPoseError::NonFiniteValue);
    }
    let next = current + delta;
    if !next.is_finite() {
        return Err(CameraPoseError::NonFiniteValue);
    }
    Ok(next)
}

fn checked_mul_f64(left: f64, right: f64) -> Result<f64, CameraPoseError> {
    if !left.is_finite() || !right.is_finite() {
        return Err(CameraPoseError::NonFiniteValue);
    }
    let next = left * right;
    if !next.is_finite() {
        return Err(CameraPoseError::NonFiniteValue);
    }
    Ok(next)
}

fn checked_add_f32(current: f32, delta: f32) -> Result<f32, CameraPoseError> {
    if !delta.is_finite() {
        return Err(CameraPoseError::NonFiniteValue);
    }
    let next = current + delta;
    if !next.is_finite() {
        return Err(CameraPoseError::NonFiniteValue);
    }
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MovementState {
    Still,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementTransition {
    Started,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementDetectorConfig {
    /// Minimum world-space displacement to count as movement.
    pub position_epsilon: f64,
    /// Minimum `max(ratio, 1/ratio)` altitude change to count as movement.
    pub altitude_epsilon_ratio: f64,
    /// How long a pose must stay still, measured from the last observed
    /// motion, before `movement-finished` fires. One-shot: armed (and
    /// re-armed) by motion, never extended by polling a still sample.
    pub finish_throttle_micros: u64,
}

impl Default for MovementDetectorConfig {
    fn default() -> Self {
        Self {
            position_epsilon: 1e-6,
            altitude_epsilon_ratio: 1.0 + 1e-6,
            finish_throttle_micros: 300_000,
        }
    }
}

/// Turns a stream of `CameraPose` writes into a `movement-started` /
/// `movement-finished` pair, emitting each event exactly once per
/// episode of motion (spec invariant: starts and finishes always pair).
#[derive(Debug, Clone)]
pub struct CameraMovementDetector {
    config: MovementDetectorConfig,
    state: MovementState,
    last_pose: CameraPose,
    finish_deadline_micros: Option<u64>,
}

impl CameraMovementDetector {
    pub fn new(config: MovementDetectorConfig, initial_pose: CameraPose) -> Self {
        Self {
            config,
            state: MovementState::Still,
            last_pose: initial_pose,
            finish_deadline_micros: None,
        }
    }

    /// Call once per observed pose with its observation timestamp.
    /// Returns a transition when the still/moving state flips.
    ///
    /// `movement-finished` fires on the first call at or after the
    /// throttle deadline armed by the *last* motion, not after a fixed
    /// count of still samples — it can fire on the very next call if
    /// that call lands past the deadline.
    pub fn check_moved(&mut self, pose: CameraPose, now_micros: u64) -> Option<MovementTransition> {
        let moved = pose.position_distance_to(&self.last_pose) > self.config.position_epsilon
            || pose.altitude_ratio_to(&self.last_pose) > self.config.altitude_epsilon_ratio
            || pose.yaw_radians != self.last_pose.yaw_radians
            || pose.pitch_radians != self.last_pose.pitch_radians
            || pose.roll_radians != self.last_pose.roll_radians;
        self.last_pose = pose;

        if moved {
            self.finish_deadline_micros = Some(now_micros.saturating_add(self.config.finish_throttle_micros));
            if self.state == MovementState::Still {
                self.state = MovementState::Moving;
                return Some(MovementTransition::Started);
            }
            return None;
        }

        if self.state == MovementState::Moving && now_micros >= self.finish_deadline_micros.unwrap_or(now_micros) {
            self.state = MovementState::Still;
            self.finish_deadline_micros = None;
            return Some(MovementTransition::Finished);
        }
        None
    }

    /// Forces the detector into `Moving` regardless of distance, for a
    /// pose discontinuity (e.g. a teleport or an external camera reset)
    /// that should always be reported as movement. Arms the same
    /// throttle deadline a detected motion would.
    pub fn force_moved(&mut self, pose: CameraPose, now_micros: u64) -> Option<MovementTransition> {
        self.last_pose = pose;
        self.finish_deadline_micros = Some(now_micros.saturating_add(self.config.finish_throttle_micros));
        if self.state == MovementState::Still {
            self.state = MovementState::Moving;
            return Some(MovementTransition::Started);
        }
        None
    }

    /// Resets to `Still` without emitting `Finished`, for shutdown paths
    /// where the in-flight movement episode is being abandoned rather
    /// than completed.
    pub fn clear(&mut self, pose: CameraPose) {
        self.state = MovementState::Still;
        self.finish_deadline_micros = None;
        self.last_pose = pose;
    }

    pub fn is_moving(&self) -> bool {
        self.state == MovementState::Moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_by_factor_about_keeps_anchor_position() {
        let mut pose = CameraPose::default();
        pose.pan_by(20.0, -10.0).expect("pan");

        pose.zoom_by_factor_about(2.0, 100.0, 50.0)
            .expect("zoom about point");

        assert!((pose.altitude() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_by_factor_about_rejects_invalid_inputs() {
        let mut pose = CameraPose::default();
        assert_eq!(
            pose.zoom_by_factor_about(0.0, 10.0, 20.0),
            Err(CameraPoseError::InvalidAltitude)
        );
        assert_eq!(
            pose.zoom_by_factor_about(1.2, f64::NAN, 20.0),
            Err(CameraPoseError::NonFiniteValue)
        );
    }

    #[test]
    fn movement_detector_pairs_started_and_finished_on_throttle_deadline() {
        let mut pose = CameraPose::default();
        let mut detector = CameraMovementDetector::new(MovementDetectorConfig::default(), pose);

        assert_eq!(detector.check_moved(pose, 0), None);

        pose.pan_by(5.0, 0.0).unwrap();
        assert_eq!(
            detector.check_moved(pose, 0),
            Some(MovementTransition::Started)
        );
        assert!(detector.is_moving());

        // Still, but the 300ms throttle hasn't elapsed since the last motion.
        assert_eq!(detector.check_moved(pose, 200_000), None);
        assert!(detector.is_moving());

        // Past the deadline, finishes on the very next check regardless of
        // how many still samples were observed before it.
        assert_eq!(
            detector.check_moved(pose, 300_000),
            Some(MovementTransition::Finished)
        );
        assert!(!detector.is_moving());
    }

    #[test]
    fn pan_every_50ms_then_stop_finishes_roughly_one_throttle_after_the_last_motion() {
        let mut pose = CameraPose::default();
        let mut detector = CameraMovementDetector::new(MovementDetectorConfig::default(), pose);

        let mut t = 0u64;
        while t <= 1_000_000 {
            pose.pan_by(1.0, 0.0).unwrap();
            detector.check_moved(pose, t);
            t += 50_000;
        }
        assert!(detector.is_moving());

        // Stopped moving at t=1_000_000 (last motion sample); nothing else
        // happens until a still sample lands at/after the 300ms deadline.
        assert_eq!(detector.check_moved(pose, 1_299_999), None);
        assert_eq!(
            detector.check_moved(pose, 1_300_000),
            Some(MovementTransition::Finished)
        );
    }

    #[test]
    fn force_moved_always_reports_when_idle() {
        let pose = CameraPose::default();
        let mut detector = CameraMovementDetector::new(MovementDetectorConfig::default(), pose);

        assert_eq!(
            detector.force_moved(pose, 0),
            Some(MovementTransition::Started)
        );
        assert_eq!(detector.force_moved(pose, 0), None);
    }

    #[test]
    fn clear_resets_without_emitting_finished() {
        let mut pose = CameraPose::default();
        let mut detector = CameraMovementDetector::new(MovementDetectorConfig::default(), pose);
        pose.pan_by(5.0, 0.0).unwrap();
        detector.check_moved(pose, 0);
        assert!(detector.is_moving());

        detector.clear(pose);
        assert!(!detector.is_moving());
    }
}
