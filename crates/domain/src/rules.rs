//! Merge rules for parsed stat values.
//!
//! Numeric stats move by a confidence-weighted, bounded delta:
//!
//! ```text
//! conf    = clamp(c, 0, 1)
//! scale   = (1 - α) + conf * α
//! bounded = clamp(d, -m, m)
//! next    = clamp(round(p + round(bounded * scale)), 0, 100)
//! ```
//!
//! Rounding is half-away-from-zero everywhere (`f64::round`), so results are
//! reproducible across implementations.

pub const STAT_MIN: i32 = 0;
pub const STAT_MAX: i32 = 100;

/// Confidence assumed when the parser reports a value without one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Bound and dampening for one numeric stat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaPolicy {
    /// Per-turn bound `m`; treated as at least 1.
    pub max_delta: u32,
    /// Dampening factor `α` in `[0, 1]`.
    pub dampening: f64,
}

impl DeltaPolicy {
    pub fn new(max_delta: u32, dampening: f64) -> Self {
        Self {
            max_delta,
            dampening,
        }
    }
}

/// Round half away from zero.
pub fn round_half_away(value: f64) -> f64 {
    value.round()
}

/// Round and clamp any number into the stat range.
pub fn clamp_stat(value: f64) -> i32 {
    if !value.is_finite() {
        return if value == f64::INFINITY { STAT_MAX } else { STAT_MIN };
    }
    round_half_away(value).clamp(STAT_MIN as f64, STAT_MAX as f64) as i32
}

fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// `(1 - α) + conf * α`
pub fn confidence_scale(confidence: f64, dampening: f64) -> f64 {
    let alpha = unit_interval(dampening);
    (1.0 - alpha) + unit_interval(confidence) * alpha
}

/// Apply one parsed delta to a previous value.
pub fn apply_numeric_delta(previous: i32, delta: f64, confidence: f64, policy: DeltaPolicy) -> i32 {
    let previous = previous.clamp(STAT_MIN, STAT_MAX);
    if !delta.is_finite() {
        return previous;
    }
    let bound = policy.max_delta.max(1) as f64;
    let bounded = delta.clamp(-bound, bound);
    let step = round_half_away(bounded * confidence_scale(confidence, policy.dampening));
    clamp_stat(previous as f64 + step)
}

/// Outcome of the mood stickiness rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoodDecision {
    Keep,
    Adopt,
}

/// Keep the previous mood when `confidence < stickiness`, otherwise adopt.
pub fn apply_mood(confidence: f64, stickiness: f64) -> MoodDecision {
    let confidence = unit_interval(confidence);
    if confidence < unit_interval(stickiness) {
        MoodDecision::Keep
    } else {
        MoodDecision::Adopt
    }
}
