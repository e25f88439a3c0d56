use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Thermodynamic leg of a relative free-energy calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Ligand bound to the solvated receptor.
    Complex,
    /// Ligand in a box of solvent.
    Solvent,
    /// Ligand in vacuum.
    Vacuum,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Complex, Phase::Solvent, Phase::Vacuum];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Complex => "complex",
            Phase::Solvent => "solvent",
            Phase::Vacuum => "vacuum",
        }
    }

    pub fn is_periodic(self) -> bool {
        !matches!(self, Phase::Vacuum)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown phase '{0}'. Expected one of 'complex', 'solvent', 'vacuum'.")]
pub struct ParsePhaseError(pub String);

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complex" => Ok(Phase::Complex),
            "solvent" => Ok(Phase::Solvent),
            "vacuum" => Ok(Phase::Vacuum),
            _ => Err(ParsePhaseError(s.to_string())),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
