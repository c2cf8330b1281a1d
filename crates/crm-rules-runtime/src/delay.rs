//! Randomized workflow delays
//!
//! A wait step may carry a `[min, max]` range instead of a fixed amount. The
//! delay is drawn uniformly from that range when the step is scheduled:
//! whole numbers for minutes and seconds (the scheduler ticks once a minute),
//! hundredths for every other unit.

use crate::error::{Result, RuntimeError};
use crm_rules_core::Value;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unit of a wait amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

impl WaitUnit {
    /// Seconds in one unit
    pub fn seconds(&self) -> f64 {
        match self {
            WaitUnit::Seconds => 1.0,
            WaitUnit::Minutes => 60.0,
            WaitUnit::Hours => 3600.0,
            WaitUnit::Days => 86_400.0,
            WaitUnit::Weeks => 604_800.0,
            WaitUnit::Months => 86_400.0 * 365.0 / 12.0,
        }
    }

    /// Units drawn in whole steps
    pub fn is_whole(&self) -> bool {
        matches!(self, WaitUnit::Seconds | WaitUnit::Minutes)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUnit::Seconds => "seconds",
            WaitUnit::Minutes => "minutes",
            WaitUnit::Hours => "hours",
            WaitUnit::Days => "days",
            WaitUnit::Weeks => "weeks",
            WaitUnit::Months => "months",
        }
    }
}

impl FromStr for WaitUnit {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "seconds" => Ok(WaitUnit::Seconds),
            "minutes" => Ok(WaitUnit::Minutes),
            "hours" => Ok(WaitUnit::Hours),
            "days" => Ok(WaitUnit::Days),
            "weeks" => Ok(WaitUnit::Weeks),
            "months" => Ok(WaitUnit::Months),
            other => Err(RuntimeError::InvalidValue(format!("unknown wait unit: {}", other))),
        }
    }
}

/// Scale an amount by an optional unit; no unit means seconds
pub fn scale(amount: f64, unit: Option<WaitUnit>) -> f64 {
    amount * unit.map(|u| u.seconds()).unwrap_or(1.0)
}

/// Wait step settings as stored on a workflow sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DelaySettings {
    #[serde(default)]
    pub wait_time_amount: Option<f64>,
    #[serde(default)]
    pub wait_time_amount_min: Option<f64>,
    #[serde(default)]
    pub wait_time_amount_max: Option<f64>,
    #[serde(default)]
    pub wait_time_unit: Option<WaitUnit>,
}

impl DelaySettings {
    /// Read settings from the host's loosely typed map.
    ///
    /// Blank or non-numeric amounts are absent; unknown units are ignored.
    pub fn from_json(settings: &serde_json::Value) -> Self {
        let amount = |key: &str| {
            settings.get(key).and_then(|raw| {
                let value = Value::from(raw.clone());
                if value.is_blank() {
                    None
                } else {
                    value.coerce_f64()
                }
            })
        };

        Self {
            wait_time_amount: amount("wait_time_amount"),
            wait_time_amount_min: amount("wait_time_amount_min"),
            wait_time_amount_max: amount("wait_time_amount_max"),
            wait_time_unit: settings
                .get("wait_time_unit")
                .and_then(|u| u.as_str())
                .and_then(|u| u.parse().ok()),
        }
    }

    /// Range `(min, max)` when randomization applies
    pub fn random_range(&self) -> Option<(f64, f64)> {
        let min = self.wait_time_amount_min?;
        let max = self.wait_time_amount_max.unwrap_or(0.0);
        if min >= 0.0 && max > 0.0 {
            Some((min, max))
        } else {
            None
        }
    }
}

/// Delay in seconds for a wait step.
///
/// Draws from the configured range when present, otherwise uses the fixed
/// amount; the result is scaled by the unit.
pub fn compute_delay<R: Rng + ?Sized>(rng: &mut R, settings: &DelaySettings) -> f64 {
    let amount = match settings.random_range() {
        Some((min, max)) => draw(rng, min, max, settings.wait_time_unit),
        None => settings.wait_time_amount.unwrap_or(0.0),
    };
    scale(amount, settings.wait_time_unit)
}

fn draw<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64, unit: Option<WaitUnit>) -> f64 {
    let (lo, hi) = if min > max { (max, min) } else { (min, max) };

    if unit.is_some_and(|u| u.is_whole()) {
        let (a, b) = (lo.ceil() as i64, hi.floor() as i64);
        if a <= b {
            return rng.gen_range(a..=b) as f64;
        }
    }

    let (a, b) = ((lo * 100.0).ceil() as i64, (hi * 100.0).floor() as i64);
    if a <= b {
        rng.gen_range(a..=b) as f64 / 100.0
    } else {
        lo
    }
}

/// Owns an RNG and resolves delays against the previously scheduled one
pub struct DelayRandomizer<R> {
    rng: R,
}

/// A resolved delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayDecision {
    pub seconds: f64,
    /// Differs from the delay the host had computed
    pub changed: bool,
}

impl<R: Rng> DelayRandomizer<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn resolve(&mut self, settings: &DelaySettings, previous: f64) -> DelayDecision {
        let seconds = compute_delay(&mut self.rng, settings);
        DelayDecision {
            seconds,
            changed: seconds != previous,
        }
    }
}

/// A wait step being saved
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaitSequence {
    pub settings: DelaySettings,
    /// Scheduler delay in seconds
    pub delay: f64,
}

/// Normalize a wait step on save.
///
/// With a random range the fixed amount becomes `max`, and the stored delay
/// the scaled maximum, so schedulers that ignore the range wait the longest.
pub fn prepare_sequence(mut sequence: WaitSequence) -> WaitSequence {
    if let Some((_, max)) = sequence.settings.random_range() {
        sequence.settings.wait_time_amount = Some(max);
        sequence.delay = scale(max, sequence.settings.wait_time_unit);
    }
    sequence
}
