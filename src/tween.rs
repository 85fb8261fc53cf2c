//! Timed interpolation with easing, advanced by an explicit clock.
//!
//! A [`Tween`] never owns callbacks. Each call to [`Tween::update`] reports what
//! happened during that tick as a [`TweenStep`], and the owner reacts to the
//! `started` / `completed` flags. Stopping a tween discards its progress and
//! never reports completion.

use std::time::Duration;

/// Easing functions for smooth transitions.
///
/// These control the acceleration curve of a tween.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Easing {
    /// Constant speed throughout.
    #[default]
    Linear,
    /// Start slow, accelerate.
    EaseIn,
    /// Start fast, decelerate.
    EaseOut,
    /// Start slow, speed up, then slow down.
    EaseInOut,
    /// Strong deceleration (`1 - (1 - t)^4`). Used for panorama and infospot fades.
    QuarticOut,
}

impl Easing {
    /// Apply the easing function to a linear progress value (0.0 to 1.0).
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::QuarticOut => 1.0 - (1.0 - t).powi(4),
        }
    }
}

/// What happened to a tween during one [`Tween::update`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TweenStep {
    /// The start delay elapsed on this tick.
    pub started: bool,
    /// Interpolated value, present on every tick the tween is running.
    pub value: Option<f32>,
    /// The tween reached its target on this tick.
    pub completed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TweenState {
    Idle,
    /// Started, waiting for its delay to elapse.
    Pending,
    Running,
}

/// A single scalar interpolation from a start value to a target.
///
/// The duration, target and delay survive across runs, so a tween can be
/// configured once and restarted many times. Restarting a running tween
/// rewinds it.
///
/// # Example
///
/// ```
/// use panowalk::{Easing, Tween};
/// use std::time::Duration;
///
/// let mut fade = Tween::new(Easing::Linear);
/// fade.to(1.0, Duration::from_millis(100));
/// fade.start(0.0, Duration::ZERO);
///
/// let step = fade.update(Duration::from_millis(50));
/// assert!(step.started);
/// assert!((step.value.unwrap() - 0.5).abs() < 1e-6);
///
/// let step = fade.update(Duration::from_millis(100));
/// assert!(step.completed);
/// ```
#[derive(Clone, Debug)]
pub struct Tween {
    from: f32,
    to: f32,
    value: f32,
    duration: Duration,
    delay: Duration,
    easing: Easing,
    start_time: Duration,
    state: TweenState,
}

impl Tween {
    /// Create an idle tween with the given easing and no duration.
    pub fn new(easing: Easing) -> Self {
        Self {
            from: 0.0,
            to: 0.0,
            value: 0.0,
            duration: Duration::ZERO,
            delay: Duration::ZERO,
            easing,
            start_time: Duration::ZERO,
            state: TweenState::Idle,
        }
    }

    /// Set the target value and duration for the next run.
    pub fn to(&mut self, target: f32, duration: Duration) -> &mut Self {
        self.to = target;
        self.duration = duration;
        self
    }

    /// Set how long to wait after `start` before progressing.
    pub fn delay(&mut self, delay: Duration) -> &mut Self {
        self.delay = delay;
        self
    }

    /// Set the easing function.
    pub fn easing(&mut self, easing: Easing) -> &mut Self {
        self.easing = easing;
        self
    }

    /// Start (or restart) from `from`, with `now` as the reference time.
    pub fn start(&mut self, from: f32, now: Duration) {
        self.from = from;
        self.value = from;
        self.start_time = now;
        self.state = TweenState::Pending;
    }

    /// Stop without completing. Returns `true` if the tween was playing.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = TweenState::Idle;
        was_playing
    }

    /// Whether the tween has been started and has not yet completed or stopped.
    pub fn is_playing(&self) -> bool {
        self.state != TweenState::Idle
    }

    /// Duration of one run, excluding delay.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Target value.
    pub fn target(&self) -> f32 {
        self.to
    }

    /// Most recent interpolated value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advance to `now`.
    pub fn update(&mut self, now: Duration) -> TweenStep {
        let mut step = TweenStep::default();

        if self.state == TweenState::Idle {
            return step;
        }

        let begin = self.start_time + self.delay;
        if now < begin {
            return step;
        }

        if self.state == TweenState::Pending {
            self.state = TweenState::Running;
            step.started = true;
        }

        let progress = if self.duration.is_zero() {
            1.0
        } else {
            ((now - begin).as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };

        self.value = self.from + (self.to - self.from) * self.easing.apply(progress);
        step.value = Some(self.value);

        if progress >= 1.0 {
            self.value = self.to;
            step.value = Some(self.to);
            self.state = TweenState::Idle;
            step.completed = true;
        }

        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn easing_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOut,
            Easing::QuarticOut,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-5, "{:?}", easing);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-5, "{:?}", easing);
        }
    }

    #[test]
    fn quartic_out_front_loads_progress() {
        assert!(Easing::QuarticOut.apply(0.25) > 0.6);
    }

    #[test]
    fn delay_postpones_start() {
        let mut tween = Tween::new(Easing::Linear);
        tween.to(1.0, ms(100)).delay(ms(50));
        tween.start(0.0, ms(0));

        assert_eq!(tween.update(ms(40)), TweenStep::default());
        let step = tween.update(ms(50));
        assert!(step.started);
        assert_eq!(step.value, Some(0.0));

        let step = tween.update(ms(150));
        assert!(!step.started);
        assert!(step.completed);
        assert!(!tween.is_playing());
    }

    #[test]
    fn zero_duration_completes_on_first_update() {
        let mut tween = Tween::new(Easing::QuarticOut);
        tween.to(1.0, Duration::ZERO);
        tween.start(0.0, ms(10));

        let step = tween.update(ms(10));
        assert!(step.started && step.completed);
        assert_eq!(step.value, Some(1.0));
    }

    #[test]
    fn stop_never_completes() {
        let mut tween = Tween::new(Easing::Linear);
        tween.to(1.0, ms(100));
        tween.start(0.0, ms(0));
        tween.update(ms(10));

        assert!(tween.stop());
        assert!(!tween.stop());
        assert_eq!(tween.update(ms(500)), TweenStep::default());
    }

    #[test]
    fn restart_rewinds_and_fires_start_again() {
        let mut tween = Tween::new(Easing::Linear);
        tween.to(1.0, ms(100));
        tween.start(0.0, ms(0));
        assert!(tween.update(ms(60)).started);

        tween.start(0.6, ms(60));
        let step = tween.update(ms(60));
        assert!(step.started);
        assert_eq!(step.value, Some(0.6));
    }

    #[test]
    fn interpolates_from_current_value() {
        let mut tween = Tween::new(Easing::Linear);
        tween.to(0.0, ms(100));
        tween.start(0.5, ms(0));

        let value = tween.update(ms(50)).value.unwrap();
        assert!((value - 0.25).abs() < 1e-5);
    }
}
