use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Name of the global coupling parameter every expression is written in.
pub const LAMBDA: &str = "lambda";

const DEFAULT_FUNCTIONS: [(&str, &str); 9] = [
    ("lambda_sterics_core", "lambda"),
    ("lambda_electrostatics_core", "lambda"),
    (
        "lambda_sterics_insert",
        "select(step(lambda - 0.5), 1.0, 2.0 * lambda)",
    ),
    (
        "lambda_sterics_delete",
        "select(step(lambda - 0.5), 2.0 * (lambda - 0.5), 0.0)",
    ),
    (
        "lambda_electrostatics_insert",
        "select(step(lambda - 0.5), 2.0 * (lambda - 0.5), 0.0)",
    ),
    (
        "lambda_electrostatics_delete",
        "select(step(lambda - 0.5), 1.0, 2.0 * lambda)",
    ),
    ("lambda_bonds", "lambda"),
    ("lambda_angles", "lambda"),
    ("lambda_torsions", "lambda"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FunctionError {
    #[error("Alchemical function for '{0}' has an empty expression")]
    EmptyExpression(String),
    #[error("Alchemical parameter name cannot be empty")]
    EmptyName,
    #[error("'{0}' is the global coupling parameter and cannot be redefined")]
    ReservedName(String),
}

/// Ordered table of context parameters and the expression of `lambda` that drives each.
///
/// Insertion order is preserved: it determines the order in which the integrator
/// updates the parameters at every perturbation substep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlchemicalFunctions {
    entries: Vec<(String, String)>,
}

impl Default for AlchemicalFunctions {
    fn default() -> Self {
        Self {
            entries: DEFAULT_FUNCTIONS
                .iter()
                .map(|(name, expr)| (name.to_string(), expr.to_string()))
                .collect(),
        }
    }
}

impl AlchemicalFunctions {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, expr)| expr.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces or appends a single entry.
    ///
    /// # Errors
    ///
    /// Rejects empty names or expressions and any attempt to redefine `lambda` itself.
    pub fn set(&mut self, name: &str, expression: &str) -> Result<(), FunctionError> {
        let name = name.trim();
        let expression = expression.trim();
        if name.is_empty() {
            return Err(FunctionError::EmptyName);
        }
        if name == LAMBDA {
            return Err(FunctionError::ReservedName(name.to_string()));
        }
        if expression.is_empty() {
            return Err(FunctionError::EmptyExpression(name.to_string()));
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = expression.to_string(),
            None => self
                .entries
                .push((name.to_string(), expression.to_string())),
        }
        Ok(())
    }

    /// Returns a copy of the table with every override applied in order.
    pub fn with_overrides<'a, I>(&self, overrides: I) -> Result<Self, FunctionError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut functions = self.clone();
        for (name, expression) in overrides {
            functions.set(name, expression)?;
        }
        Ok(functions)
    }
}

impl Serialize for AlchemicalFunctions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, expression) in &self.entries {
            map.serialize_entry(name, expression)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_nine_entries_in_fixed_order() {
        let functions = AlchemicalFunctions::default();
        let names: Vec<_> = functions.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "lambda_sterics_core",
                "lambda_electrostatics_core",
                "lambda_sterics_insert",
                "lambda_sterics_delete",
                "lambda_electrostatics_insert",
                "lambda_electrostatics_delete",
                "lambda_bonds",
                "lambda_angles",
                "lambda_torsions",
            ]
        );
    }

    #[test]
    fn insert_and_delete_schedules_are_staged_around_the_midpoint() {
        let functions = AlchemicalFunctions::default();
        assert_eq!(
            functions.get("lambda_sterics_insert"),
            Some("select(step(lambda - 0.5), 1.0, 2.0 * lambda)")
        );
        assert_eq!(
            functions.get("lambda_electrostatics_insert"),
            Some("select(step(lambda - 0.5), 2.0 * (lambda - 0.5), 0.0)")
        );
        assert_eq!(
            functions.get("lambda_sterics_delete"),
            functions.get("lambda_electrostatics_insert")
        );
        assert_eq!(
            functions.get("lambda_electrostatics_delete"),
            functions.get("lambda_sterics_insert")
        );
    }

    #[test]
    fn overrides_replace_in_place_and_append_new_entries() {
        let functions = AlchemicalFunctions::default()
            .with_overrides([
                ("lambda_bonds", "0.5 * lambda"),
                ("lambda_restraints", "1 - lambda"),
            ])
            .unwrap();
        assert_eq!(functions.len(), 10);
        assert_eq!(functions.get("lambda_bonds"), Some("0.5 * lambda"));
        assert_eq!(functions.iter().nth(6).unwrap().0, "lambda_bonds");
        assert_eq!(functions.iter().last().unwrap().0, "lambda_restraints");
    }

    #[test]
    fn overrides_reject_empty_and_reserved_entries() {
        let base = AlchemicalFunctions::default();
        assert_eq!(
            base.with_overrides([("lambda_bonds", "  ")]),
            Err(FunctionError::EmptyExpression("lambda_bonds".to_string()))
        );
        assert_eq!(
            base.with_overrides([("lambda", "0")]),
            Err(FunctionError::ReservedName("lambda".to_string()))
        );
        assert_eq!(
            base.with_overrides([("", "lambda")]),
            Err(FunctionError::EmptyName)
        );
    }

    #[test]
    fn serializes_as_an_ordered_map() {
        let functions = AlchemicalFunctions::empty()
            .with_overrides([("b", "lambda"), ("a", "1 - lambda")])
            .unwrap();
        let json = serde_json::to_string(&functions).unwrap();
        assert_eq!(json, r#"{"b":"lambda","a":"1 - lambda"}"#);
    }
}
