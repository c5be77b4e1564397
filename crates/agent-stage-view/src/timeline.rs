//! Keyframe timelines and easing curves.

use std::f64::consts::PI;
use std::time::Duration;

use agent_stage_core::config::{AnimationConfig, EasingName};

/// Easing curve applied within each keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Linear,
    /// jQuery's default: `0.5 - cos(p * PI) / 2`.
    Swing,
    /// anime.js `easeOutElastic(amplitude, period)`.
    OutElastic { amplitude: f64, period: f64 },
}

impl Default for Easing {
    fn default() -> Self {
        Self::OutElastic {
            amplitude: 1.0,
            period: 0.5,
        }
    }
}

impl From<EasingName> for Easing {
    fn from(name: EasingName) -> Self {
        match name {
            EasingName::Linear => Self::Linear,
            EasingName::Swing => Self::Swing,
            EasingName::OutElastic => Self::default(),
        }
    }
}

impl Easing {
    /// Map linear progress `p` in `[0, 1]` to eased progress.
    pub fn apply(self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        match self {
            Self::Linear => p,
            Self::Swing => 0.5 - (p * PI).cos() / 2.0,
            Self::OutElastic { amplitude, period } => {
                1.0 - in_elastic(amplitude, period, 1.0 - p)
            }
        }
    }
}

fn in_elastic(amplitude: f64, period: f64, t: f64) -> f64 {
    if t == 0.0 || t == 1.0 {
        return t;
    }
    let a = amplitude.clamp(1.0, 10.0);
    let p = period.clamp(0.1, 2.0);
    let s = p / (2.0 * PI) * (1.0 / a).asin();
    -a * 2f64.powf(10.0 * (t - 1.0)) * (((t - 1.0) - s) * (2.0 * PI) / p).sin()
}

/// Target value reached at the end of a keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub translate_y: f32,
    pub duration: Duration,
}

/// A staggered keyframe timeline shared by a set of letters.
///
/// Letter `i` starts `i * stagger` after the timeline begins and then runs
/// the keyframes in order, starting from `origin`. Looped timelines repeat
/// the keyframe cycle forever; others hold the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub origin: f32,
    pub keyframes: Vec<Keyframe>,
    pub stagger: Duration,
    pub looped: bool,
    pub easing: Easing,
}

impl Timeline {
    /// The letter bob: rise to `letter_rise`, settle back to 0, forever.
    pub fn letter_bob(config: &AnimationConfig) -> Self {
        let phase = Duration::from_millis(config.letter_phase_ms);
        Self {
            origin: 0.0,
            keyframes: vec![
                Keyframe {
                    translate_y: config.letter_rise,
                    duration: phase,
                },
                Keyframe {
                    translate_y: 0.0,
                    duration: phase,
                },
            ],
            stagger: Duration::from_millis(config.letter_stagger_ms),
            looped: true,
            easing: config.letter_easing.into(),
        }
    }

    /// Length of one pass through the keyframes.
    pub fn cycle(&self) -> Duration {
        self.keyframes.iter().map(|k| k.duration).sum()
    }

    /// Time until every one of `count` letters has finished one pass.
    ///
    /// `None` for looped timelines, which never finish.
    pub fn total(&self, count: usize) -> Option<Duration> {
        if self.looped {
            return None;
        }
        let last_delay = self.stagger * count.saturating_sub(1) as u32;
        Some(last_delay + self.cycle())
    }

    fn end_value(&self) -> f32 {
        self.keyframes.last().map(|k| k.translate_y).unwrap_or(self.origin)
    }

    /// Offset of letter `index` at `elapsed` since the timeline started.
    pub fn sample(&self, index: usize, elapsed: Duration) -> f32 {
        let delay = self.stagger.as_secs_f64() * 1000.0 * index as f64;
        let mut t = elapsed.as_secs_f64() * 1000.0 - delay;
        if t < 0.0 {
            return self.origin;
        }

        let cycle = self.cycle().as_secs_f64() * 1000.0;
        if cycle <= 0.0 {
            return self.end_value();
        }
        if self.looped {
            t %= cycle;
        } else if t >= cycle {
            return self.end_value();
        }

        let mut from = self.origin;
        for keyframe in &self.keyframes {
            let d = keyframe.duration.as_secs_f64() * 1000.0;
            if t < d {
                let eased = self.easing.apply(t / d) as f32;
                return from + (keyframe.translate_y - from) * eased;
            }
            t -= d;
            from = keyframe.translate_y;
        }
        from
    }
}
