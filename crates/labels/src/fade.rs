//! Per-element fade state machine: `Undefined -> FadingIn -> FadedIn ->
//! FadingOut -> FadedOut`. Opacity is recomputed as a pure function of
//! elapsed time since the phase started, so calling `advance` any number
//! of times for the same `now` always yields the same result — the
//! placement pass can call it every `update()` without the element
//! drifting.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    Undefined,
    FadingIn,
    FadedIn,
    FadingOut,
    FadedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct FadeTimer {
    phase: FadePhase,
    phase_start_micros: u64,
    start_opacity: f32,
    target_opacity: f32,
    opacity: f32,
}

impl FadeTimer {
    pub fn new() -> Self {
        Self {
            phase: FadePhase::Undefined,
            phase_start_micros: 0,
            start_opacity: 0.0,
            target_opacity: 0.0,
            opacity: 0.0,
        }
    }

    pub fn phase(&self) -> FadePhase {
        self.phase
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Element was placed successfully this frame. No-op if already
    /// ramping toward or holding at full opacity.
    pub fn request_shown(&mut self, now_micros: u64) {
        if matches!(self.phase, FadePhase::FadingIn | FadePhase::FadedIn) {
            return;
        }
        self.phase = FadePhase::FadingIn;
        self.phase_start_micros = now_micros;
        self.start_opacity = self.opacity;
        self.target_opacity = 1.0;
    }

    /// Placement failed, or the element left view, this frame. No-op if
    /// already ramping toward or sitting at zero opacity.
    pub fn request_hidden(&mut self, now_micros: u64) {
        if matches!(
            self.phase,
            FadePhase::FadingOut | FadePhase::FadedOut | FadePhase::Undefined
        ) {
            return;
        }
        self.phase = FadePhase::FadingOut;
        self.phase_start_micros = now_micros;
        self.start_opacity = self.opacity;
        self.target_opacity = 0.0;
    }

    /// Recomputes opacity for `now_micros` and advances the phase once
    /// the ramp completes. `fade_time_micros` of zero snaps instantly to
    /// the target.
    pub fn advance(&mut self, now_micros: u64, fade_time_micros: u64) {
        match self.phase {
            FadePhase::Undefined | FadePhase::FadedIn | FadePhase::FadedOut => {}
            FadePhase::FadingIn | FadePhase::FadingOut => {
                let elapsed = now_micros.saturating_sub(self.phase_start_micros);
                let ratio = if fade_time_micros == 0 {
                    1.0
                } else {
                    (elapsed as f64 / fade_time_micros as f64).clamp(0.0, 1.0) as f32
                };
                self.opacity =
                    self.start_opacity + (self.target_opacity - self.start_opacity) * ratio;
                if ratio >= 1.0 {
                    self.opacity = self.target_opacity;
                    self.phase = if self.phase == FadePhase::FadingIn {
                        FadePhase::FadedIn
                    } else {
                        FadePhase::FadedOut
                    };
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, FadePhase::Undefined | FadePhase::FadedOut)
    }
}

impl Default for FadeTimer {
    fn default() -> Self {
        Self::new()
    }
}
