//! Label Placement Engine: builds a priority-ordered candidate list,
//! reserves screen-collision boxes, and drives each element's fade
//! timer. Runs once per frame, after tile selection and before the GPU
//! draw call.

use std::collections::HashMap;

use mapengine_collisions::{ScreenCollisionIndex, ScreenRect};

use crate::fade::{FadePhase, FadeTimer};

pub type LabelId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelCandidate {
    pub id: LabelId,
    /// Negative means "always render" — exempt from collision rejection.
    pub priority: i32,
    pub view_distance: f32,
    pub current_zoom: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    pub tile_ready: bool,
    pub text_rect: Option<ScreenRect>,
    pub icon_rect: Option<ScreenRect>,
    pub text_is_optional: bool,
    pub icon_is_optional: bool,
    pub may_overlap: bool,
    pub reserve_space: bool,
    /// Line-marker variant: markers sharing a group index fade together,
    /// driven by one shared timer rather than per-instance timers.
    pub shield_group_index: Option<u64>,
}

impl LabelCandidate {
    fn in_zoom_range(&self) -> bool {
        self.current_zoom >= self.zoom_min && self.current_zoom <= self.zoom_max
    }

    fn always_renders(&self) -> bool {
        self.priority < 0
    }

    /// The key used to look up this candidate's fade timer — its own id,
    /// or the shared line-marker group's id when it belongs to one.
    fn fade_key(&self) -> LabelId {
        self.shield_group_index.unwrap_or(self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPlacementConfig {
    pub fade_time_micros: u64,
    pub max_num_visible_labels: u32,
    pub num_second_chance_labels: u32,
    /// Candidates beyond `max_distance_ratio_for_labels * far_plane` are
    /// culled before the priority sort.
    pub max_distance_ratio_for_labels_milli: u32,
    pub far_plane_milli: u32,
}

impl Default for LabelPlacementConfig {
    fn default() -> Self {
        Self {
            fade_time_micros: 800_000,
            max_num_visible_labels: 200,
            num_second_chance_labels: 8,
            max_distance_ratio_for_labels_milli: 900,
            far_plane_milli: 20_000_000,
        }
    }
}

impl LabelPlacementConfig {
    fn max_label_distance(&self) -> f32 {
        (self.far_plane_milli as f64 / 1000.0 * self.max_distance_ratio_for_labels_milli as f64
            / 1000.0) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    Placed,
    Rejected,
}

/// Owns the collision index and every label's fade timer across frames.
/// `place_frame` resets the collision index and runs the main pass;
/// `second_chance_pass` retries elements culled by the frustum that are
/// still faded in, to reduce popping during pan.
pub struct LabelPlacer {
    config: LabelPlacementConfig,
    collisions: ScreenCollisionIndex,
    timers: HashMap<LabelId, FadeTimer>,
}

impl LabelPlacer {
    pub fn new(config: LabelPlacementConfig, collisions: ScreenCollisionIndex) -> Self {
        Self {
            config,
            collisions,
            timers: HashMap::new(),
        }
    }

    pub fn fade_phase(&self, id: LabelId) -> FadePhase {
        self.timers.get(&id).map(FadeTimer::phase).unwrap_or(FadePhase::Undefined)
    }

    pub fn opacity(&self, id: LabelId) -> f32 {
        self.timers.get(&id).map(FadeTimer::opacity).unwrap_or(0.0)
    }

    fn timer_mut(&mut self, id: LabelId) -> &mut FadeTimer {
        self.timers.entry(id).or_default()
    }

    /// Removes bookkeeping for labels whose owning tile has been
    /// evicted, so stale ids never leak across frames.
    pub fn retain_ids(&mut self, live_ids: &std::collections::HashSet<LabelId>) {
        self.timers.retain(|id, _| live_ids.contains(id));
    }

    fn eligible(&self, candidate: &LabelCandidate) -> bool {
        candidate.tile_ready
            && candidate.in_zoom_range()
            && candidate.view_distance <= self.config.max_label_distance()
    }

    /// Builds the grouped priority list: higher priority first, ties
    /// broken by smaller view distance (closer wins).
    fn sorted_candidates(candidates: &[LabelCandidate]) -> Vec<LabelCandidate> {
        let mut ordered: Vec<LabelCandidate> = candidates.to_vec();
        ordered.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.view_distance.total_cmp(&b.view_distance))
        });
        ordered
    }

    fn try_reserve(&mut self, rect: ScreenRect, may_overlap: bool) -> bool {
        if may_overlap {
            return true;
        }
        !self.collisions.is_occupied(&rect)
    }

    fn commit_reservation(&mut self, rect: ScreenRect, may_overlap: bool) {
        if may_overlap {
            return;
        }
        self.collisions.try_place(rect, false);
    }

    fn attempt_placement(&mut self, candidate: &LabelCandidate) -> PlacementOutcome {
        if candidate.always_renders() {
            if let Some(rect) = candidate.text_rect {
                self.commit_reservation(rect, candidate.may_overlap);
            }
            if let Some(rect) = candidate.icon_rect {
                self.commit_reservation(rect, candidate.may_overlap);
            }
            return PlacementOutcome::Placed;
        }

        let text_fits = candidate
            .text_rect
            .map(|rect| self.try_reserve(rect, candidate.may_overlap))
            .unwrap_or(true);
        let icon_fits = candidate
            .icon_rect
            .map(|rect| self.try_reserve(rect, candidate.may_overlap))
            .unwrap_or(true);

        let mut accept_text = text_fits;
        let mut accept_icon = icon_fits;

        if candidate.text_rect.is_some() && !text_fits && !candidate.text_is_optional {
            accept_icon = false;
        }
        if candidate.icon_rect.is_some() && !icon_fits {
            if candidate.icon_is_optional {
                accept_icon = false;
            } else {
                accept_text = false;
            }
        }

        if !accept_text && !accept_icon {
            return PlacementOutcome::Rejected;
        }

        if !candidate.reserve_space {
            return PlacementOutcome::Placed;
        }

        if accept_text {
            if let Some(rect) = candidate.text_rect {
                self.commit_reservation(rect, candidate.may_overlap);
            }
        }
        if accept_icon {
            if let Some(rect) = candidate.icon_rect {
                self.commit_reservation(rect, candidate.may_overlap);
            }
        }
        PlacementOutcome::Placed
    }

    /// Runs the main placement pass for one frame. Returns the outcome
    /// per candidate id, in the order they were evaluated (priority
    /// order), so callers can log or test against scenario expectations.
    pub fn place_frame(
        &mut self,
        candidates: &[LabelCandidate],
        now_micros: u64,
    ) -> Vec<(LabelId, PlacementOutcome)> {
        self.collisions.reset();
        let ordered = Self::sorted_candidates(candidates);

        let mut results = Vec::with_capacity(ordered.len());
        let mut placed_count = 0u32;

        for candidate in &ordered {
            let outcome = if !self.eligible(candidate) {
                PlacementOutcome::Rejected
            } else if placed_count >= self.config.max_num_visible_labels
                && !candidate.always_renders()
            {
                PlacementOutcome::Rejected
            } else {
                self.attempt_placement(candidate)
            };

            if outcome == PlacementOutcome::Placed {
                placed_count += 1;
                self.timer_mut(candidate.fade_key()).request_shown(now_micros);
            } else {
                self.timer_mut(candidate.fade_key()).request_hidden(now_micros);
            }
            self.timer_mut(candidate.fade_key())
                .advance(now_micros, self.config.fade_time_micros);

            results.push((candidate.id, outcome));
        }
        results
    }

    /// Retries up to `num_second_chance_labels` candidates that the
    /// frustum culled this frame but are still visibly faded in, so a
    /// quick pan does not make them pop out and immediately back in.
    pub fn second_chance_pass(
        &mut self,
        culled_but_faded_in: &[LabelCandidate],
        now_micros: u64,
    ) -> Vec<(LabelId, PlacementOutcome)> {
        let cap = self.config.num_second_chance_labels as usize;
        let mut results = Vec::new();
        for candidate in culled_but_faded_in.iter().take(cap) {
            let outcome = self.attempt_placement(candidate);
            if outcome == PlacementOutcome::Placed {
                self.timer_mut(candidate.fade_key()).request_shown(now_micros);
            } else {
                self.timer_mut(candidate.fade_key()).request_hidden(now_micros);
            }
            self.timer_mut(candidate.fade_key())
                .advance(now_micros, self.config.fade_time_micros);
            results.push((candidate.id, outcome));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapengine_collisions::CollisionGridConfig;

    fn placer() -> LabelPlacer {
        LabelPlacer::new(
            LabelPlacementConfig::default(),
            ScreenCollisionIndex::new(CollisionGridConfig::default()),
        )
    }

    fn candidate(id: LabelId, priority: i32, rect: ScreenRect) -> LabelCandidate {
        LabelCandidate {
            id,
            priority,
            view_distance: 10.0,
            current_zoom: 5.0,
            zoom_min: 0.0,
            zoom_max: 20.0,
            tile_ready: true,
            text_rect: Some(rect),
            icon_rect: None,
            text_is_optional: false,
            icon_is_optional: false,
            may_overlap: false,
            reserve_space: true,
            shield_group_index: None,
        }
    }

    #[test]
    fn higher_priority_label_wins_collision() {
        let mut placer = placer();
        let l1 = candidate(1, 10, ScreenRect { x: 0.0, y: 0.0, width: 50.0, height: 20.0 });
        let l2 = candidate(2, 5, ScreenRect { x: 10.0, y: 5.0, width: 50.0, height: 20.0 });

        let results = placer.place_frame(&[l2, l1], 0);
        assert_eq!(results, vec![(1, PlacementOutcome::Placed), (2, PlacementOutcome::Rejected)]);
        assert_eq!(placer.fade_phase(1), FadePhase::FadingIn);
        assert_eq!(placer.fade_phase(2), FadePhase::Undefined);
    }

    #[test]
    fn rejected_label_fades_out_to_zero_after_fade_time() {
        let mut placer = placer();
        let l1 = candidate(1, 10, ScreenRect { x: 0.0, y: 0.0, width: 50.0, height: 20.0 });
        let l2 = candidate(2, 5, ScreenRect { x: 10.0, y: 5.0, width: 50.0, height: 20.0 });

        placer.place_frame(&[l1], 0);
        placer.place_frame(&[l1, l2], 0);
        placer.place_frame(&[l1, l2], 800_000);

        assert_eq!(placer.opacity(2), 0.0);
        assert_eq!(placer.fade_phase(2), FadePhase::FadedOut);
    }

    #[test]
    fn always_render_label_ignores_priority_and_collisions() {
        let mut placer = placer();
        let rect = ScreenRect { x: 0.0, y: 0.0, width: 50.0, height: 20.0 };
        let blocker = candidate(1, 100, rect);
        let mut always = candidate(2, -1, rect);
        always.priority = -1;

        let results = placer.place_frame(&[blocker, always], 0);
        assert!(results.contains(&(2, PlacementOutcome::Placed)));
    }

    #[test]
    fn out_of_zoom_range_candidate_is_rejected() {
        let mut placer = placer();
        let mut candidate = candidate(1, 10, ScreenRect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 });
        candidate.current_zoom = 30.0;
        let results = placer.place_frame(&[candidate], 0);
        assert_eq!(results, vec![(1, PlacementOutcome::Rejected)]);
    }

    #[test]
    fn max_visible_labels_cap_rejects_overflow() {
        let mut config = LabelPlacementConfig::default();
        config.max_num_visible_labels = 1;
        let mut placer = LabelPlacer::new(config, ScreenCollisionIndex::new(CollisionGridConfig::default()));

        let l1 = candidate(1, 10, ScreenRect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 });
        let l2 = candidate(2, 9, ScreenRect { x: 1000.0, y: 1000.0, width: 10.0, height: 10.0 });

        let results = placer.place_frame(&[l1, l2], 0);
        assert_eq!(results, vec![(1, PlacementOutcome::Placed), (2, PlacementOutcome::Rejected)]);
    }
}
