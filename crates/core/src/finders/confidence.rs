//! Confidence and severity scoring (spec §4.7).

/// `margin = clamp((v−t)/(1−t), 0, 1)` for a HIGH_IS_BAD threshold condition,
/// or its mirror `clamp((t−v)/t, 0, 1)` for HIGH_IS_GOOD. Boolean conditions
/// should call `bool_margin` instead.
pub fn threshold_margin_high_is_bad(value: f64, threshold: f64) -> f64 {
    if (1.0 - threshold).abs() < 1e-9 {
        return if value >= threshold { 1.0 } else { 0.0 };
    }
    ((value - threshold) / (1.0 - threshold)).clamp(0.0, 1.0)
}

pub fn threshold_margin_high_is_good(value: f64, threshold: f64) -> f64 {
    if threshold.abs() < 1e-9 {
        return if value <= threshold { 1.0 } else { 0.0 };
    }
    ((threshold - value) / threshold).clamp(0.0, 1.0)
}

/// Same shape as `threshold_margin_high_is_bad` but for signals with no
/// natural ceiling (lift, raw counts, `health_laplacian`): `cap` stands in
/// for "1" in the bounded formula.
pub fn margin_unbounded_high_is_bad(value: f64, threshold: f64, cap: f64) -> f64 {
    if cap <= threshold {
        return if value >= threshold { 1.0 } else { 0.0 };
    }
    ((value - threshold) / (cap - threshold)).clamp(0.0, 1.0)
}

/// Boolean/enum conditions contribute margin 1 when satisfied, 0 otherwise.
pub fn bool_margin(satisfied: bool) -> f64 {
    if satisfied {
        1.0
    } else {
        0.0
    }
}

/// Disjunction of component margins uses max.
pub fn disjunction(margins: &[f64]) -> f64 {
    margins.iter().cloned().fold(0.0, f64::max)
}

/// Conjunction of component margins uses arithmetic mean.
pub fn conjunction(margins: &[f64]) -> f64 {
    if margins.is_empty() {
        0.0
    } else {
        margins.iter().sum::<f64>() / margins.len() as f64
    }
}

/// `adjusted_severity = base_severity · clamp(mean(evidence_margins), 0.5, 1.0)`.
pub fn adjusted_severity(base_severity: f64, evidence_margins: &[f64]) -> f64 {
    let mean = if evidence_margins.is_empty() {
        1.0
    } else {
        evidence_margins.iter().sum::<f64>() / evidence_margins.len() as f64
    };
    base_severity * mean.clamp(0.5, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_clamped_to_unit_interval() {
        assert_eq!(threshold_margin_high_is_bad(2.0, 0.9), 1.0);
        assert_eq!(threshold_margin_high_is_bad(0.0, 0.9), 0.0);
    }

    #[test]
    fn conjunction_is_mean_disjunction_is_max() {
        assert!((conjunction(&[1.0, 0.0]) - 0.5).abs() < 1e-9);
        assert!((disjunction(&[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn severity_amplifier_floors_at_half() {
        assert!((adjusted_severity(1.0, &[0.0, 0.0]) - 0.5).abs() < 1e-9);
    }
}
