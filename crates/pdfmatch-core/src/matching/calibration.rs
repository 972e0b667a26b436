use tracing::{debug, info};

use crate::config::{AdaptiveConfig, Thresholds};
use crate::report::EffectiveThresholds;

/// Linear-interpolated percentile of an ascending slice, `q` in `[0, 1]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Nudges the confidence tiers toward the score distribution of this
/// bundle. `best_scores` holds each article's best fuzzy score.
///
/// `high` follows the 90th percentile and `medium` the median, each
/// clamped into its hard bounds. `min_score` and `margin` never move.
pub fn calibrate(
    thresholds: &Thresholds,
    adaptive: &AdaptiveConfig,
    best_scores: &[f64],
) -> EffectiveThresholds {
    let fixed = EffectiveThresholds {
        min_score: thresholds.min_score,
        medium: thresholds.medium,
        high: thresholds.high,
        margin: thresholds.margin,
        calibrated: false,
        samples: best_scores.len(),
    };
    if !adaptive.enabled || best_scores.len() < adaptive.min_samples {
        debug!(
            samples = best_scores.len(),
            enabled = adaptive.enabled,
            "keeping configured thresholds"
        );
        return fixed;
    }

    let mut sorted = best_scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    let high = adaptive.high_bounds.clamp(percentile(&sorted, 0.9));
    let medium = adaptive.medium_bounds.clamp(percentile(&sorted, 0.5)).min(high);

    info!(
        samples = sorted.len(),
        high,
        medium,
        "recalibrated confidence thresholds"
    );
    EffectiveThresholds {
        medium,
        high,
        calibrated: true,
        ..fixed
    }
}
