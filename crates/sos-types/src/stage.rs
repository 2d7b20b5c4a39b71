//! Escalation stages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Escalation level of a device.
///
/// ALERT is entered after setup, RISK on a single activation, PROOF on a
/// triple activation while evidence is recorded, SAFE briefly after the user
/// marks themselves safe before decaying back to ALERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Alert,
    Risk,
    Proof,
    Safe,
}

impl Stage {
    /// Wire name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Alert => "ALERT",
            Stage::Risk => "RISK",
            Stage::Proof => "PROOF",
            Stage::Safe => "SAFE",
        }
    }

    /// Display label used by dashboards
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Alert => "STAGE 1: ALERT",
            Stage::Risk => "STAGE 2: RISK",
            Stage::Proof => "STAGE 3: PROOF",
            Stage::Safe => "STAGE 4: SAFE",
        }
    }

    /// Whether the user may mark themselves safe from this stage
    pub fn accepts_mark_safe(&self) -> bool {
        matches!(self, Stage::Risk | Stage::Proof)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Alert
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALERT" => Ok(Stage::Alert),
            "RISK" => Ok(Stage::Risk),
            "PROOF" => Ok(Stage::Proof),
            "SAFE" => Ok(Stage::Safe),
            other => Err(format!("Unknown stage: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(serde_json::to_string(&Stage::Proof).unwrap(), "\"PROOF\"");
        let stage: Stage = serde_json::from_str("\"RISK\"").unwrap();
        assert_eq!(stage, Stage::Risk);
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("safe".parse::<Stage>().unwrap(), Stage::Safe);
        assert!("PANIC".parse::<Stage>().is_err());
    }

    #[test]
    fn test_mark_safe_stages() {
        assert!(Stage::Risk.accepts_mark_safe());
        assert!(Stage::Proof.accepts_mark_safe());
        assert!(!Stage::Alert.accepts_mark_safe());
        assert!(!Stage::Safe.accepts_mark_safe());
    }
}
