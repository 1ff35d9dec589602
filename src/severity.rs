// 🚦 Dilution Severity - UI treatment for relative dilution
// Four ordered, non-overlapping bands over |dilution_percent|:
//   low (< 5) → medium (< 15) → high (< 30) → severe (>= 30)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DilutionSeverity {
    Low,
    Medium,
    High,
    Severe,
}

impl DilutionSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DilutionSeverity::Low => "low",
            DilutionSeverity::Medium => "medium",
            DilutionSeverity::High => "high",
            DilutionSeverity::Severe => "severe",
        }
    }

    /// Display color (hex)
    pub fn color(&self) -> &'static str {
        match self {
            DilutionSeverity::Low => "#22c55e",
            DilutionSeverity::Medium => "#eab308",
            DilutionSeverity::High => "#f97316",
            DilutionSeverity::Severe => "#ef4444",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DilutionSeverity::Low => "Minimal dilution impact",
            DilutionSeverity::Medium => "Moderate dilution - review terms",
            DilutionSeverity::High => "Significant dilution - careful consideration advised",
            DilutionSeverity::Severe => "Severe dilution - stakeholder approval recommended",
        }
    }
}

/// Bucket a relative dilution percentage. Sign is ignored.
pub fn get_dilution_severity(dilution_percent: f64) -> DilutionSeverity {
    let magnitude = dilution_percent.abs();

    if magnitude.is_nan() || magnitude < 5.0 {
        DilutionSeverity::Low
    } else if magnitude < 15.0 {
        DilutionSeverity::Medium
    } else if magnitude < 30.0 {
        DilutionSeverity::High
    } else {
        DilutionSeverity::Severe
    }
}

/// Serializable severity with its display attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityBadge {
    pub level: DilutionSeverity,
    pub color: String,
    pub description: String,
}

impl From<DilutionSeverity> for SeverityBadge {
    fn from(level: DilutionSeverity) -> Self {
        SeverityBadge {
            level,
            color: level.color().to_string(),
            description: level.description().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(get_dilution_severity(0.0), DilutionSeverity::Low);
        assert_eq!(get_dilution_severity(4.9), DilutionSeverity::Low);
        assert_eq!(get_dilution_severity(5.0), DilutionSeverity::Medium);
        assert_eq!(get_dilution_severity(14.99), DilutionSeverity::Medium);
        assert_eq!(get_dilution_severity(15.0), DilutionSeverity::High);
        assert_eq!(get_dilution_severity(29.99), DilutionSeverity::High);
        assert_eq!(get_dilution_severity(30.0), DilutionSeverity::Severe);
        assert_eq!(get_dilution_severity(100.0), DilutionSeverity::Severe);
    }

    #[test]
    fn test_negative_uses_magnitude() {
        assert_eq!(get_dilution_severity(-20.0), DilutionSeverity::High);
    }

    #[test]
    fn test_badge_carries_display_attributes() {
        let badge = SeverityBadge::from(DilutionSeverity::Severe);
        assert_eq!(badge.color, "#ef4444");
        assert!(badge.description.starts_with("Severe"));

        let json = serde_json::to_value(&badge).unwrap();
        assert_eq!(json["level"], "severe");
    }
}
