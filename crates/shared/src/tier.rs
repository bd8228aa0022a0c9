//! Flat-rate plan tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    /// Whether this tier bypasses per-request payment while active
    pub fn is_paid(&self) -> bool {
        matches!(self, PlanTier::Pro | PlanTier::Premium)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown plan tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for PlanTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "premium" => Ok(PlanTier::Premium),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PRO".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!(" premium ".parse::<PlanTier>().unwrap(), PlanTier::Premium);
        assert!("team".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_only_pro_and_premium_are_paid() {
        assert!(!PlanTier::Free.is_paid());
        assert!(PlanTier::Pro.is_paid());
        assert!(PlanTier::Premium.is_paid());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&PlanTier::Premium).unwrap(), "\"premium\"");
    }
}
