//! Adaptive open-threshold evaluation
//!
//! A dependency whose baseline is already noisy should not flap on ordinary
//! variance, while a genuine regression above that baseline must still trip.
//! With adaptation enabled the static threshold moves by the scaled gap
//! between the recent and baseline error rates, clamped to a safe band.

use crate::metrics::WindowSnapshot;
use std::time::Duration;

/// Adaptive threshold settings
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// Horizon used for the baseline error rate
    pub baseline_window: Duration,
    /// Scale applied to `recent_rate - baseline_rate`
    pub adaptation_rate: f64,
    /// Lower bound for the effective threshold, in percent
    pub min_threshold: f64,
    /// Upper bound for the effective threshold, in percent
    pub max_threshold: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            baseline_window: Duration::from_secs(5 * 60),
            adaptation_rate: 0.1,
            min_threshold: 10.0,
            max_threshold: 90.0,
        }
    }
}

impl AdaptiveConfig {
    /// Enabled settings with the default window, rate and bounds
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }
}

/// Decides whether a closed circuit should open
#[derive(Debug, Clone)]
pub struct AdaptiveThresholdEngine {
    /// Static threshold in percent (0-100)
    error_percentage_threshold: f64,
    /// Minimum calls in the recent window before any decision
    volume_threshold: u64,
    adaptive: AdaptiveConfig,
}

impl AdaptiveThresholdEngine {
    pub fn new(
        error_percentage_threshold: f64,
        volume_threshold: usize,
        adaptive: AdaptiveConfig,
    ) -> Self {
        let mut adaptive = adaptive;
        if adaptive.min_threshold > adaptive.max_threshold {
            std::mem::swap(&mut adaptive.min_threshold, &mut adaptive.max_threshold);
        }

        Self {
            error_percentage_threshold: error_percentage_threshold.clamp(0.0, 100.0),
            volume_threshold: volume_threshold as u64,
            adaptive,
        }
    }

    /// Threshold in percent that the recent error percentage is compared to
    ///
    /// Without adaptation this is the static threshold. With adaptation it is
    /// `static + (recent_rate - baseline_rate) * adaptation_rate * 100`,
    /// clamped to `[min_threshold, max_threshold]`.
    pub fn effective_threshold(&self, recent: &WindowSnapshot, baseline: &WindowSnapshot) -> f64 {
        if !self.adaptive.enabled {
            return self.error_percentage_threshold;
        }

        let delta = (recent.error_rate() - baseline.error_rate()) * self.adaptive.adaptation_rate;
        let threshold = self.error_percentage_threshold + delta * 100.0;

        // max/min rather than clamp: a NaN rate must not panic the call path
        threshold
            .max(self.adaptive.min_threshold)
            .min(self.adaptive.max_threshold)
    }

    /// True when the recent window has enough volume and its error
    /// percentage reaches the effective threshold
    pub fn should_open(&self, recent: &WindowSnapshot, baseline: &WindowSnapshot) -> bool {
        if recent.total_requests < self.volume_threshold {
            return false;
        }

        recent.error_percentage() >= self.effective_threshold(recent, baseline)
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive.enabled
    }

    pub fn baseline_window(&self) -> Duration {
        self.adaptive.baseline_window
    }

    pub fn volume_threshold(&self) -> u64 {
        self.volume_threshold
    }

    pub fn static_threshold(&self) -> f64 {
        self.error_percentage_threshold
    }
}
