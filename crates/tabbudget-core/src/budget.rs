//! Budget arithmetic: seconds allowed in the active mode and the second
//! at which the pre-expiry warning goes off.

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Usage seconds after which enforcement runs.
    pub budget_seconds: u64,
    /// Usage second at which the warning fires. `None` when the lead time
    /// does not fit inside the budget.
    pub warning_at: Option<u64>,
}

impl Thresholds {
    pub fn new(limit_minutes: f64, warning_lead_seconds: u64) -> Self {
        let budget_seconds = budget_seconds(limit_minutes);
        let lead = warning_lead_seconds.max(1);
        let warning_at = if lead < budget_seconds {
            Some(budget_seconds - lead)
        } else {
            None
        };
        Self {
            budget_seconds,
            warning_at,
        }
    }

    pub fn for_mode(settings: &Settings, break_mode: bool) -> Self {
        Self::new(
            settings.limit_minutes(break_mode),
            settings.warning_lead_seconds,
        )
    }

    pub fn is_expired(&self, seconds_used: u64) -> bool {
        seconds_used >= self.budget_seconds
    }

    /// Whether a warning is due. `already_warned` is the per-cycle latch.
    pub fn warning_due(&self, seconds_used: u64, already_warned: bool) -> bool {
        match self.warning_at {
            Some(at) => !already_warned && seconds_used >= at && !self.is_expired(seconds_used),
            None => false,
        }
    }
}

/// Whole seconds for a fractional minute limit, rounded up, never zero.
///
/// `0.083` minutes is 4.98 s, which the usage counter (whole seconds)
/// reaches on its fifth tick.
pub fn budget_seconds(limit_minutes: f64) -> u64 {
    if !limit_minutes.is_finite() || limit_minutes <= 0.0 {
        return 1;
    }
    // Tolerate float noise so 5/60 minutes stays 5 seconds, not 6.
    ((limit_minutes * 60.0 - 1e-6).ceil() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_and_fractional_minutes() {
        assert_eq!(budget_seconds(25.0), 1500);
        assert_eq!(budget_seconds(10.0), 600);
        assert_eq!(budget_seconds(0.083), 5);
        assert_eq!(budget_seconds(0.0), 1);
        assert_eq!(budget_seconds(f64::INFINITY), 1);
    }

    #[test]
    fn warning_sits_lead_seconds_before_budget() {
        let t = Thresholds::new(1.0, 10);
        assert_eq!(t.budget_seconds, 60);
        assert_eq!(t.warning_at, Some(50));
        assert!(!t.warning_due(49, false));
        assert!(t.warning_due(50, false));
        assert!(t.warning_due(51, false));
        assert!(!t.warning_due(51, true));
        assert!(!t.warning_due(60, false));
    }

    #[test]
    fn lead_longer_than_budget_disables_warning() {
        let t = Thresholds::new(5.0 / 60.0, 10);
        assert_eq!(t.budget_seconds, 5);
        assert_eq!(t.warning_at, None);
        assert!((0..=5).all(|s| !t.warning_due(s, false)));
        assert!(t.is_expired(5));
    }

    #[test]
    fn lead_equal_to_budget_disables_warning() {
        let t = Thresholds::new(10.0 / 60.0, 10);
        assert_eq!(t.warning_at, None);
    }

    #[test]
    fn mode_selects_limit() {
        let settings = Settings::default();
        assert_eq!(Thresholds::for_mode(&settings, false).budget_seconds, 1500);
        assert_eq!(Thresholds::for_mode(&settings, true).budget_seconds, 600);
    }
}
