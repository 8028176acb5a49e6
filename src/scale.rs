//! Scale factor advisory
//!
//! Derives the largest comfortable UI scale for a screen size and clamps the
//! stored preference into the allowed range.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::scale::{ALL_OUTPUTS, MIN_SCREEN_HEIGHT, MIN_SCREEN_WIDTH, STEPS};

/// Scale factor per scope
///
/// Keys are output names, with `"ALL"` as the wildcard every output falls
/// back to. Only the wildcard is adjusted today; per-output keys are carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaleFactors(BTreeMap<String, f64>);

impl ScaleFactors {
    /// Single wildcard value
    #[cfg(test)]
    pub fn uniform(value: f64) -> Self {
        Self(BTreeMap::from([(ALL_OUTPUTS.to_string(), value)]))
    }

    /// Effective scale for an output: its own key, else `"ALL"`, else 1.0
    pub fn get(&self, output: &str) -> f64 {
        self.0
            .get(output)
            .or_else(|| self.0.get(ALL_OUTPUTS))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn all(&self) -> Option<f64> {
        self.0.get(ALL_OUTPUTS).copied()
    }

    pub fn set(&mut self, scope: impl Into<String>, value: f64) {
        self.0.insert(scope.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copy with the wildcard clamped for a `width` x `height` screen
    pub fn adjusted_for(&self, width: u16, height: u16) -> Self {
        let max = calc_max_scale_factor(width as f64, height as f64);
        let current = self.all().unwrap_or(1.0);
        let clamped = clamp_scale_factor(current, max);
        debug!(current, max, clamped, "Adjusting scale factor");

        let mut adjusted = self.clone();
        adjusted.set(ALL_OUTPUTS, clamped);
        adjusted
    }
}

impl FromIterator<(String, f64)> for ScaleFactors {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Largest allowed step ≤ min(width / 1024, height / 768)
///
/// Screens smaller than the minimum still get the lowest step, and anything
/// past the top of the list gets the top step.
pub fn calc_max_scale_factor(width: f64, height: f64) -> f64 {
    let bound = (width / MIN_SCREEN_WIDTH).min(height / MIN_SCREEN_HEIGHT);
    STEPS
        .iter()
        .copied()
        .take_while(|step| *step <= bound)
        .last()
        .unwrap_or(STEPS[0])
}

/// Clamp `value` into `[1.0, max]`; non-finite values reset to 1.0
pub fn clamp_scale_factor(value: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return 1.0;
    }
    value.min(max).max(1.0)
}
