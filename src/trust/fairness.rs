//! Outcome Fairness Monitor
//!
//! Keeps a rolling window of finalized faces and tests it against a fair
//! die with Pearson's chi-square (5 degrees of freedom):
//!
//! ```text
//! chi2 = sum over faces of (observed - total/6)^2 / (total/6)
//! ```
//!
//! | chi2            | p-value   | status  |
//! |-----------------|-----------|---------|
//! | < 9.236         | >= 0.10   | Normal  |
//! | 9.236 - 11.070  | 0.05-0.10 | Observe |
//! | >= 11.070       | < 0.05    | Suspect |
//!
//! Below the minimum sample size the status is always Normal. The monitor
//! is advisory and never rejects a roll.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of faces.
pub const FACES: usize = 6;

/// Chi-square critical value for 5 d.o.f. at p = 0.10.
pub const CHI2_CRITICAL_P10: f64 = 9.236;

/// Chi-square critical value for 5 d.o.f. at p = 0.05.
pub const CHI2_CRITICAL_P05: f64 = 11.070;

/// Monitor thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FairnessRules {
    /// Samples required before the test is applied.
    pub min_samples: u32,
    /// Outcomes kept in the rolling window.
    pub window: usize,
    /// Statistic at which status becomes Observe.
    pub observe_threshold: f64,
    /// Statistic at which status becomes Suspect.
    pub suspect_threshold: f64,
}

impl Default for FairnessRules {
    fn default() -> Self {
        Self {
            min_samples: 30,
            window: 600,
            observe_threshold: CHI2_CRITICAL_P10,
            suspect_threshold: CHI2_CRITICAL_P05,
        }
    }
}

/// Drift classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairnessStatus {
    /// Consistent with a fair die, or not enough data.
    Normal,
    /// Mild deviation.
    Observe,
    /// Significant deviation.
    Suspect,
}

/// Public view of the monitor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairnessSnapshot {
    /// Count per face, index 0 = face 1.
    pub counts: [u32; FACES],
    /// Outcomes in the window.
    pub total: u32,
    /// Chi-square statistic (None below the minimum sample size).
    pub chi_square: Option<f64>,
    /// Classification.
    pub status: FairnessStatus,
    /// Whether the minimum sample size has been reached.
    pub sufficient_data: bool,
}

/// Rolling per-face counter. Only the window is persisted; counts are
/// rebuilt from it on load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FairnessWindow", into = "FairnessWindow")]
pub struct FairnessMonitor {
    counts: [u32; FACES],
    outcomes: VecDeque<u8>,
}

/// Persisted form of [`FairnessMonitor`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct FairnessWindow {
    outcomes: VecDeque<u8>,
}

impl From<FairnessWindow> for FairnessMonitor {
    fn from(window: FairnessWindow) -> Self {
        let mut monitor = Self::default();
        for face in window.outcomes {
            monitor.push(face);
        }
        monitor
    }
}

impl From<FairnessMonitor> for FairnessWindow {
    fn from(monitor: FairnessMonitor) -> Self {
        Self { outcomes: monitor.outcomes }
    }
}

impl FairnessMonitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finalized face (1-6). Other values are ignored.
    pub fn record(&mut self, face: u8, rules: &FairnessRules) {
        if !self.push(face) {
            return;
        }

        while rules.window > 0 && self.outcomes.len() > rules.window {
            if let Some(old) = self.outcomes.pop_front() {
                self.counts[usize::from(old - 1)] -= 1;
            }
        }
    }

    fn push(&mut self, face: u8) -> bool {
        if !(1..=FACES as u8).contains(&face) {
            return false;
        }
        self.outcomes.push_back(face);
        self.counts[usize::from(face - 1)] += 1;
        true
    }

    /// Outcomes currently in the window.
    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Count per face.
    pub fn counts(&self) -> [u32; FACES] {
        self.counts
    }

    /// Evaluate the window.
    pub fn snapshot(&self, rules: &FairnessRules) -> FairnessSnapshot {
        let total = self.total();
        let sufficient_data = total >= rules.min_samples && total > 0;

        let (chi_square, status) = if sufficient_data {
            let stat = chi_square(&self.counts);
            (Some(stat), classify(stat, rules))
        } else {
            (None, FairnessStatus::Normal)
        };

        FairnessSnapshot {
            counts: self.counts,
            total,
            chi_square,
            status,
            sufficient_data,
        }
    }
}

/// Pearson chi-square against the uniform distribution.
pub fn chi_square(counts: &[u32; FACES]) -> f64 {
    let total: u32 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let expected = f64::from(total) / FACES as f64;
    counts
        .iter()
        .map(|&observed| {
            let diff = f64::from(observed) - expected;
            diff * diff / expected
        })
        .sum()
}

fn classify(stat: f64, rules: &FairnessRules) -> FairnessStatus {
    if stat >= rules.suspect_threshold {
        FairnessStatus::Suspect
    } else if stat >= rules.observe_threshold {
        FairnessStatus::Observe
    } else {
        FairnessStatus::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(monitor: &mut FairnessMonitor, faces: &[u8], rules: &FairnessRules) {
        for &face in faces {
            monitor.record(face, rules);
        }
    }

    #[test]
    fn test_insufficient_data_is_normal() {
        let rules = FairnessRules::default();
        let mut monitor = FairnessMonitor::new();
        feed(&mut monitor, &[6; 29], &rules);
        let snap = monitor.snapshot(&rules);
        assert_eq!(snap.status, FairnessStatus::Normal);
        assert!(!snap.sufficient_data);
        assert_eq!(snap.chi_square, None);
    }

    #[test]
    fn test_uniform_outcomes_normal() {
        let rules = FairnessRules::default();
        let mut monitor = FairnessMonitor::new();
        for _ in 0..10 {
            feed(&mut monitor, &[1, 2, 3, 4, 5, 6], &rules);
        }
        let snap = monitor.snapshot(&rules);
        assert_eq!(snap.total, 60);
        assert_eq!(snap.chi_square, Some(0.0));
        assert_eq!(snap.status, FairnessStatus::Normal);
    }

    #[test]
    fn test_loaded_die_suspect() {
        let rules = FairnessRules::default();
        let mut monitor = FairnessMonitor::new();
        feed(&mut monitor, &[6; 30], &rules);
        let snap = monitor.snapshot(&rules);
        // 30 sixes: (25^2 + 5 * 5^2) / 5 = 150
        assert!((snap.chi_square.unwrap() - 150.0).abs() < 1e-9);
        assert_eq!(snap.status, FairnessStatus::Suspect);
    }

    #[test]
    fn test_observe_band() {
        // counts [10,5,5,5,5,0] over 30: expected 5, chi2 = (25 + 0*4 + 25) / 5 = 10
        let mut counts = [5u32; FACES];
        counts[0] = 10;
        counts[5] = 0;
        let stat = chi_square(&counts);
        assert!((stat - 10.0).abs() < 1e-9);
        assert_eq!(classify(stat, &FairnessRules::default()), FairnessStatus::Observe);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let rules = FairnessRules { window: 6, ..Default::default() };
        let mut monitor = FairnessMonitor::new();
        feed(&mut monitor, &[1, 1, 1, 1, 1, 1], &rules);
        feed(&mut monitor, &[2, 3], &rules);
        assert_eq!(monitor.total(), 6);
        assert_eq!(monitor.counts(), [4, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_invalid_faces_ignored() {
        let rules = FairnessRules::default();
        let mut monitor = FairnessMonitor::new();
        monitor.record(0, &rules);
        monitor.record(7, &rules);
        assert_eq!(monitor.total(), 0);
    }

    #[test]
    fn test_serde_roundtrip_keeps_window() {
        let rules = FairnessRules::default();
        let mut monitor = FairnessMonitor::new();
        feed(&mut monitor, &[3, 4, 4], &rules);
        let json = serde_json::to_string(&monitor).unwrap();
        let back: FairnessMonitor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, monitor);
    }

    #[test]
    fn test_counts_rebuilt_from_stored_window() {
        let rules = FairnessRules { window: 3, ..Default::default() };
        let stored = r#"{"counts":[0,0,0,0,0,9],"outcomes":[0,2,2,9,5]}"#;
        let mut monitor: FairnessMonitor = serde_json::from_str(stored).unwrap();
        assert_eq!(monitor.counts(), [0, 2, 0, 0, 1, 0]);

        monitor.record(6, &rules);
        monitor.record(6, &rules);
        assert_eq!(monitor.counts(), [0, 0, 0, 0, 1, 2]);
        assert_eq!(monitor.total(), 3);

        let json = serde_json::to_value(&monitor).unwrap();
        assert_eq!(json, serde_json::json!({ "outcomes": [5, 6, 6] }));
    }
}
