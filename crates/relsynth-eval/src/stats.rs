//! Deviation scores used by statistical findings.

use std::collections::BTreeMap;

use relsynth_scenario::Distribution;

/// Smoothing term for empty PSI bins.
pub const PSI_EPSILON: f64 = 1e-8;

/// Population stability index between observed label shares and expected
/// probabilities. Labels missing on either side count as zero share.
pub fn psi(observed: &BTreeMap<String, f64>, expected: &[(String, f64)]) -> f64 {
    let mut labels: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for (label, share) in observed {
        labels.entry(label.as_str()).or_default().0 = *share;
    }
    for (label, probability) in expected {
        labels.entry(label.as_str()).or_default().1 = *probability;
    }
    labels
        .values()
        .map(|(o, e)| (o - e) * ((o + PSI_EPSILON) / (e + PSI_EPSILON)).ln())
        .sum()
}

/// Kolmogorov-Smirnov statistic of `values` against the distribution's CDF.
///
/// Returns `None` for empty samples and for distributions without a
/// continuous CDF.
pub fn ks_statistic(values: &[f64], distribution: &Distribution) -> Option<f64> {
    if values.is_empty() || !distribution.is_continuous() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let mut d = 0.0_f64;
    for (idx, value) in sorted.iter().enumerate() {
        let f = cdf(distribution, *value)?;
        let below = idx as f64 / n;
        let above = (idx + 1) as f64 / n;
        d = d.max(above - f).max(f - below);
    }
    Some(d)
}

/// Cumulative distribution function for continuous declared shapes.
pub fn cdf(distribution: &Distribution, x: f64) -> Option<f64> {
    let p = match distribution {
        Distribution::Uniform { min, max } => {
            if max <= min {
                if x < *min { 0.0 } else { 1.0 }
            } else {
                ((x - min) / (max - min)).clamp(0.0, 1.0)
            }
        }
        Distribution::Normal { mean, std_dev } => normal_cdf((x - mean) / std_dev),
        Distribution::LogNormal { mu, sigma } => {
            if x <= 0.0 {
                0.0
            } else {
                normal_cdf((x.ln() - mu) / sigma)
            }
        }
        Distribution::Exponential { rate } => {
            if x <= 0.0 {
                0.0
            } else {
                1.0 - (-rate * x).exp()
            }
        }
        Distribution::Categorical { .. } | Distribution::Sequence { .. } => return None,
    };
    Some(p)
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun 7.1.26; absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Pearson correlation; `None` with fewer than two pairs or zero variance.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psi_is_zero_for_matching_shares_and_grows_with_drift() {
        let expected = vec![("a".to_string(), 0.7), ("b".to_string(), 0.3)];
        let same = BTreeMap::from([("a".to_string(), 0.7), ("b".to_string(), 0.3)]);
        assert!(psi(&same, &expected).abs() < 1e-12);

        let drifted = BTreeMap::from([("a".to_string(), 0.3), ("b".to_string(), 0.7)]);
        assert!(psi(&drifted, &expected) > 0.25);

        let unexpected = BTreeMap::from([("a".to_string(), 0.7), ("c".to_string(), 0.3)]);
        assert!(psi(&unexpected, &expected) > 1.0);
    }

    #[test]
    fn normal_cdf_matches_known_quantiles() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.959_964) - 0.975).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158_655_25).abs() < 1e-6);
    }

    #[test]
    fn ks_is_small_for_quantile_samples() {
        let uniform = Distribution::Uniform { min: 0.0, max: 100.0 };
        let values: Vec<f64> = (0..100).map(|idx| idx as f64 + 0.5).collect();
        let d = ks_statistic(&values, &uniform).expect("ks");
        assert!(d <= 0.0051, "d = {d}");

        let shifted: Vec<f64> = values.iter().map(|value| value / 2.0).collect();
        let d = ks_statistic(&shifted, &uniform).expect("ks");
        assert!(d > 0.45, "d = {d}");

        let sequence = Distribution::Sequence { start: 1.0, step: 1.0 };
        assert_eq!(ks_statistic(&values, &sequence), None);
    }

    #[test]
    fn pearson_handles_perfect_and_degenerate_inputs() {
        let line: Vec<(f64, f64)> = (0..10).map(|idx| (idx as f64, 2.0 * idx as f64)).collect();
        assert!((pearson(&line).expect("r") - 1.0).abs() < 1e-12);

        let inverse: Vec<(f64, f64)> = (0..10).map(|idx| (idx as f64, -(idx as f64))).collect();
        assert!((pearson(&inverse).expect("r") + 1.0).abs() < 1e-12);

        let flat: Vec<(f64, f64)> = (0..10).map(|idx| (idx as f64, 3.0)).collect();
        assert_eq!(pearson(&flat), None);
    }
}
