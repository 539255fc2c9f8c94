// Scale classifier - keyword-based complexity levels
//
// Higher levels need stronger evidence: each matched keyword scores
// 1 / (level + 1). The best score wins, ties go to the lower level, and text
// with no signal at all is treated as a regular product change.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleLevel {
    BugFix = 0,
    SmallFeature = 1,
    Product = 2,
    Enterprise = 3,
    EnterprisePlus = 4,
}

impl ScaleLevel {
    pub const ALL: [ScaleLevel; 5] = [
        ScaleLevel::BugFix,
        ScaleLevel::SmallFeature,
        ScaleLevel::Product,
        ScaleLevel::Enterprise,
        ScaleLevel::EnterprisePlus,
    ];

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScaleLevel::BugFix => "Bug fix",
            ScaleLevel::SmallFeature => "Small feature",
            ScaleLevel::Product => "Product",
            ScaleLevel::Enterprise => "Enterprise",
            ScaleLevel::EnterprisePlus => "Enterprise+",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            ScaleLevel::BugFix => &[
                "bug",
                "fix",
                "error",
                "crash",
                "typo",
                "broken",
                "doesn't work",
                "not working",
                "issue",
                "patch",
            ],
            ScaleLevel::SmallFeature => &[
                "add", "simple", "small", "button", "field", "quick", "minor", "tweak", "update",
                "change",
            ],
            ScaleLevel::Product => &[
                "feature",
                "new functionality",
                "user story",
                "requirement",
                "design",
                "implement",
                "build",
                "create",
            ],
            ScaleLevel::Enterprise => &[
                "compliance",
                "security",
                "audit",
                "regulation",
                "enterprise",
                "scale",
                "performance",
                "sla",
            ],
            ScaleLevel::EnterprisePlus => &[
                "multi-team",
                "cross-functional",
                "organization-wide",
                "platform",
                "infrastructure",
                "migration",
                "transformation",
            ],
        }
    }
}

impl fmt::Display for ScaleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value(), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub level: ScaleLevel,
    /// Matched keywords as `"<level name>: <keyword>"`
    pub indicators: Vec<String>,
    pub confidence: f64,
}

/// Classify free text (usually a story's title, description and criteria)
pub fn classify(text: &str) -> Classification {
    let lower = text.to_lowercase();

    let mut best: Option<(ScaleLevel, f64)> = None;
    let mut indicators = Vec::new();
    let mut total_matches = 0usize;

    for level in ScaleLevel::ALL {
        let matches: Vec<&str> = level
            .keywords()
            .iter()
            .copied()
            .filter(|kw| lower.contains(kw))
            .collect();
        if matches.is_empty() {
            continue;
        }

        total_matches += matches.len();
        indicators.extend(matches.iter().map(|kw| format!("{}: {}", level.name(), kw)));

        let score = matches.len() as f64 / f64::from(level.value() + 1);
        // Strictly greater, so ties keep the lower level
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((level, score));
        }
    }

    match best {
        Some((level, _)) => Classification {
            level,
            indicators,
            confidence: (0.3 + 0.15 * total_matches as f64).min(0.9),
        },
        None => Classification {
            level: ScaleLevel::Product,
            indicators: vec!["No specific complexity indicators found".to_string()],
            confidence: 0.5,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_signal_defaults_to_product() {
        let c = classify("Widgets for the quarterly report");
        assert_eq!(c.level, ScaleLevel::Product);
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn test_bug_fix() {
        let c = classify("Fix crash when the input file is empty");
        assert_eq!(c.level, ScaleLevel::BugFix);
        assert!(c.indicators.contains(&"Bug fix: crash".to_string()));
    }

    #[test]
    fn test_weighting_favours_lower_levels() {
        // one enterprise keyword (1/4) vs one small-feature keyword (1/2)
        let c = classify("Add a security header");
        assert_eq!(c.level, ScaleLevel::SmallFeature);
    }

    #[test]
    fn test_strong_enterprise_signal() {
        let c = classify("Security audit and compliance regulation review, with SLA");
        assert_eq!(c.level, ScaleLevel::Enterprise);
    }

    #[test]
    fn test_tie_goes_to_lower_level() {
        // bug fix 1/1 vs small feature 2/2
        let c = classify("typo: tweak the quick");
        assert_eq!(c.level, ScaleLevel::BugFix);
    }

    #[test]
    fn test_confidence_capped() {
        let c = classify("fix bug error crash typo broken issue patch");
        assert!((c.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_values() {
        assert_eq!(ScaleLevel::from_value(3), Some(ScaleLevel::Enterprise));
        assert_eq!(ScaleLevel::from_value(5), None);
        assert_eq!(ScaleLevel::EnterprisePlus.to_string(), "4 (Enterprise+)");
    }
}
