use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Crowd density band, ordered from calm to crowded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for DensityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// People counts at which a camera enters the medium and high bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityThresholds {
    pub medium: usize,
    pub high: usize,
}

impl Default for DensityThresholds {
    fn default() -> Self {
        Self { medium: 5, high: 10 }
    }
}

impl DensityThresholds {
    pub fn new(medium: usize, high: usize) -> Result<Self, ConfigError> {
        let thresholds = Self { medium, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.medium == 0 {
            return Err(ConfigError::invalid("alert_threshold.medium", "must be at least 1"));
        }
        if self.medium > self.high {
            return Err(ConfigError::invalid(
                "alert_threshold",
                format!("medium ({}) exceeds high ({})", self.medium, self.high),
            ));
        }
        Ok(())
    }
}

/// Density band for `total_people`. Monotonic in the count.
pub fn classify(total_people: usize, thresholds: &DensityThresholds) -> DensityLevel {
    if total_people < thresholds.medium {
        DensityLevel::Low
    } else if total_people < thresholds.high {
        DensityLevel::Medium
    } else {
        DensityLevel::High
    }
}

/// Fires once each time a camera enters the high band.
#[derive(Debug, Clone, Default)]
pub struct AlertTrigger {
    last: DensityLevel,
}

impl AlertTrigger {
    /// Record `level`; true when this is a transition into `High`.
    pub fn observe(&mut self, level: DensityLevel) -> bool {
        let fire = level == DensityLevel::High && self.last != DensityLevel::High;
        self.last = level;
        fire
    }

    pub fn reset(&mut self) {
        self.last = DensityLevel::Low;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands() {
        let t = DensityThresholds::default();
        assert_eq!(classify(0, &t), DensityLevel::Low);
        assert_eq!(classify(4, &t), DensityLevel::Low);
        assert_eq!(classify(5, &t), DensityLevel::Medium);
        assert_eq!(classify(9, &t), DensityLevel::Medium);
        assert_eq!(classify(10, &t), DensityLevel::High);
        assert_eq!(classify(12, &t), DensityLevel::High);
    }

    #[test]
    fn test_classification_is_monotonic() {
        for (medium, high) in [(1, 1), (2, 7), (5, 10), (3, 3)] {
            let t = DensityThresholds::new(medium, high).unwrap();
            let levels: Vec<_> = (0..30).map(|n| classify(n, &t)).collect();
            assert!(levels.windows(2).all(|w| w[0] <= w[1]), "{medium}/{high}");
        }
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(DensityThresholds::new(0, 3).is_err());
        assert!(DensityThresholds::new(6, 5).is_err());
    }

    #[test]
    fn test_alert_is_edge_triggered() {
        use DensityLevel::*;
        let mut trigger = AlertTrigger::default();
        let fired: Vec<bool> = [Low, High, High, Medium, High, High, Low]
            .into_iter()
            .map(|level| trigger.observe(level))
            .collect();
        assert_eq!(fired, vec![false, true, false, false, true, false, false]);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DensityLevel::Medium).unwrap(), "\"medium\"");
    }
}
