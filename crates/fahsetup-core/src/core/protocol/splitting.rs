use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single substep of a symmetric Langevin splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Substep {
    /// Velocity update from all forces (`V`) or from one force group (`V0`..`V9`).
    Velocity(Option<u8>),
    /// Position update (`R`).
    Position,
    /// Ornstein-Uhlenbeck velocity randomization (`O`).
    Thermostat,
    /// Alchemical perturbation: advance `lambda` and accumulate protocol work (`H`).
    Perturbation,
    /// Metropolization block start (`{`).
    BlockStart,
    /// Metropolization block end (`}`).
    BlockEnd,
}

impl fmt::Display for Substep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Substep::Velocity(None) => f.write_str("V"),
            Substep::Velocity(Some(group)) => write!(f, "V{}", group),
            Substep::Position => f.write_str("R"),
            Substep::Thermostat => f.write_str("O"),
            Substep::Perturbation => f.write_str("H"),
            Substep::BlockStart => f.write_str("{"),
            Substep::BlockEnd => f.write_str("}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplittingError {
    #[error("Splitting string is empty")]
    Empty,
    #[error("Unknown substep '{token}' at position {position}")]
    UnknownToken { token: String, position: usize },
    #[error("Unbalanced metropolization braces")]
    UnbalancedBraces,
    #[error("Splitting '{splitting}' must contain at least one '{substep}' substep")]
    MissingSubstep {
        splitting: String,
        substep: &'static str,
    },
    #[error("Splitting '{splitting}' must contain exactly {expected} 'H' substep(s), found {count}")]
    PerturbationCount {
        splitting: String,
        expected: usize,
        count: usize,
    },
    #[error("Splitting '{0}' uses metropolization, which nonequilibrium switching does not support")]
    Metropolized(String),
}

/// A parsed, whitespace-separated splitting string such as `"V R H O R V"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splitting {
    substeps: Vec<Substep>,
}

impl Splitting {
    pub fn parse(s: &str) -> Result<Self, SplittingError> {
        let mut substeps = Vec::new();
        let mut depth: i32 = 0;

        for (position, token) in s.split_whitespace().enumerate() {
            let substep = match token {
                "V" => Substep::Velocity(None),
                "R" => Substep::Position,
                "O" => Substep::Thermostat,
                "H" => Substep::Perturbation,
                "{" => {
                    depth += 1;
                    Substep::BlockStart
                }
                "}" => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(SplittingError::UnbalancedBraces);
                    }
                    Substep::BlockEnd
                }
                _ => match token.strip_prefix('V').map(str::parse::<u8>) {
                    Some(Ok(group)) if group < 10 => Substep::Velocity(Some(group)),
                    _ => {
                        return Err(SplittingError::UnknownToken {
                            token: token.to_string(),
                            position,
                        });
                    }
                },
            };
            substeps.push(substep);
        }

        if substeps.is_empty() {
            return Err(SplittingError::Empty);
        }
        if depth != 0 {
            return Err(SplittingError::UnbalancedBraces);
        }
        Ok(Self { substeps })
    }

    pub fn substeps(&self) -> &[Substep] {
        &self.substeps
    }

    pub fn count(&self, predicate: impl Fn(&Substep) -> bool) -> usize {
        self.substeps.iter().filter(|s| predicate(s)).count()
    }

    pub fn velocity_count(&self) -> usize {
        self.count(|s| matches!(s, Substep::Velocity(_)))
    }

    pub fn position_count(&self) -> usize {
        self.count(|s| matches!(s, Substep::Position))
    }

    pub fn thermostat_count(&self) -> usize {
        self.count(|s| matches!(s, Substep::Thermostat))
    }

    pub fn perturbation_count(&self) -> usize {
        self.count(|s| matches!(s, Substep::Perturbation))
    }

    pub fn has_metropolization(&self) -> bool {
        self.substeps.contains(&Substep::BlockStart)
    }

    fn require_integrable(&self) -> Result<(), SplittingError> {
        if self.position_count() == 0 {
            return Err(SplittingError::MissingSubstep {
                splitting: self.to_string(),
                substep: "R",
            });
        }
        if self.velocity_count() == 0 {
            return Err(SplittingError::MissingSubstep {
                splitting: self.to_string(),
                substep: "V",
            });
        }
        Ok(())
    }

    /// Parses and checks a splitting used for nonequilibrium production.
    ///
    /// # Errors
    ///
    /// The splitting must integrate positions and velocities and contain exactly one
    /// `H` substep, so that `lambda` advances once per timestep. Metropolization
    /// blocks are rejected.
    pub fn nonequilibrium(s: &str) -> Result<Self, SplittingError> {
        let splitting = Self::parse(s)?;
        splitting.require_integrable()?;
        if splitting.has_metropolization() {
            return Err(SplittingError::Metropolized(splitting.to_string()));
        }
        let count = splitting.perturbation_count();
        if count != 1 {
            return Err(SplittingError::PerturbationCount {
                splitting: splitting.to_string(),
                expected: 1,
                count,
            });
        }
        Ok(splitting)
    }

    /// Parses and checks a splitting used for equilibrium relaxation (no `H`).
    pub fn equilibrium(s: &str) -> Result<Self, SplittingError> {
        let splitting = Self::parse(s)?;
        splitting.require_integrable()?;
        let count = splitting.perturbation_count();
        if count != 0 {
            return Err(SplittingError::PerturbationCount {
                splitting: splitting.to_string(),
                expected: 0,
                count,
            });
        }
        Ok(splitting)
    }
}

impl FromStr for Splitting {
    type Err = SplittingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Splitting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, substep) in self.substeps.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", substep)?;
        }
        Ok(())
    }
}

impl Serialize for Splitting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
