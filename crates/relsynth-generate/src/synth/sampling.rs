use std::f64::consts::PI;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use relsynth_scenario::{Distribution, TemporalShape};

const MAX_REJECTIONS: usize = 64;

/// One draw from a declared distribution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Draw {
    Number(f64),
    Label(String),
}

/// Standard normal variate by Box-Muller.
pub(crate) fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub(crate) fn draw<R: Rng + ?Sized>(
    distribution: &Distribution,
    row_index: u64,
    rng: &mut R,
) -> Draw {
    match distribution {
        Distribution::Uniform { min, max } => {
            if max > min {
                Draw::Number(rng.random_range(*min..=*max))
            } else {
                Draw::Number(*min)
            }
        }
        Distribution::Normal { mean, std_dev } => {
            Draw::Number(mean + std_dev * standard_normal(rng))
        }
        Distribution::LogNormal { mu, sigma } => {
            Draw::Number((mu + sigma * standard_normal(rng)).exp())
        }
        Distribution::Exponential { rate } => {
            let u = rng.random::<f64>();
            Draw::Number(-(1.0 - u).ln() / rate)
        }
        Distribution::Categorical { weights } => {
            let total: f64 = weights.values().sum();
            let mut target = rng.random::<f64>() * total;
            let mut chosen = None;
            for (label, weight) in weights {
                chosen = Some(label);
                if target < *weight {
                    break;
                }
                target -= weight;
            }
            Draw::Label(chosen.cloned().unwrap_or_default())
        }
        Distribution::Sequence { start, step } => Draw::Number(start + step * row_index as f64),
    }
}

/// Rejection sampler over a temporal window with a density shape.
#[derive(Debug, Clone)]
pub(crate) struct TemporalWindow {
    start: NaiveDateTime,
    span_seconds: i64,
    shape: Shape,
}

#[derive(Debug, Clone)]
enum Shape {
    Uniform,
    Trend {
        growth: f64,
    },
    Seasonal {
        period_days: f64,
        amplitude: f64,
    },
    Surge {
        start: NaiveDateTime,
        end: NaiveDateTime,
        multiplier: f64,
    },
}

impl TemporalWindow {
    /// Window over `[start, end]`, both ISO dates, end day inclusive.
    pub(crate) fn from_rule(start: &str, end: &str, shape: &TemporalShape) -> Option<Self> {
        let start = parse_date(start)?.and_time(NaiveTime::MIN);
        let end = parse_date(end)?.and_time(NaiveTime::MIN);
        if end < start {
            return None;
        }
        let span_seconds = (end - start).num_seconds() + 86_399;
        let shape = match shape {
            TemporalShape::Uniform => Shape::Uniform,
            TemporalShape::Trend { growth } => Shape::Trend { growth: *growth },
            TemporalShape::Seasonal {
                period_days,
                amplitude,
            } => Shape::Seasonal {
                period_days: *period_days,
                amplitude: amplitude.clamp(0.0, 1.0),
            },
            TemporalShape::Surge {
                start,
                end,
                multiplier,
            } => Shape::Surge {
                start: parse_date(start)?.and_time(NaiveTime::MIN),
                end: parse_date(end)?.and_time(NaiveTime::MIN) + Duration::seconds(86_399),
                multiplier: *multiplier,
            },
        };
        Some(Self {
            start,
            span_seconds,
            shape,
        })
    }

    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> NaiveDateTime {
        let ceiling = self.max_density();
        let mut candidate = self.start;
        for _ in 0..MAX_REJECTIONS {
            let offset = rng.random_range(0..=self.span_seconds);
            candidate = self.start + Duration::seconds(offset);
            if rng.random::<f64>() * ceiling <= self.density(candidate, offset) {
                break;
            }
        }
        candidate
    }

    fn density(&self, at: NaiveDateTime, offset: i64) -> f64 {
        match &self.shape {
            Shape::Uniform => 1.0,
            Shape::Trend { growth } => {
                let fraction = offset as f64 / self.span_seconds.max(1) as f64;
                1.0 + (growth - 1.0) * fraction
            }
            Shape::Seasonal {
                period_days,
                amplitude,
            } => {
                let days = offset as f64 / 86_400.0;
                1.0 + amplitude * (2.0 * PI * days / period_days).sin()
            }
            Shape::Surge {
                start,
                end,
                multiplier,
            } => {
                if at >= *start && at <= *end {
                    *multiplier
                } else {
                    1.0
                }
            }
        }
    }

    fn max_density(&self) -> f64 {
        match &self.shape {
            Shape::Uniform => 1.0,
            Shape::Trend { growth } => growth.max(1.0),
            Shape::Seasonal { amplitude, .. } => 1.0 + amplitude,
            Shape::Surge { multiplier, .. } => multiplier.max(1.0),
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
