// 🧮 Formulas - derivation rules as data
//
// A formula defines a record type as a signed sum of other record types
// within the same period column:
//
//   BLS#TOTALASSETS = + BLS#FIXEDASSETS + BLS#CURRENTASSETS
//
// Formulas are configuration, loaded from JSON and keyed by target.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fs;
use std::path::Path;

// ============================================================================
// SIGN
// ============================================================================

/// Serialized as `1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    pub fn factor(&self) -> f64 {
        match self {
            Sign::Plus => 1.0,
            Sign::Minus => -1.0,
        }
    }
}

impl TryFrom<i8> for Sign {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Sign::Plus),
            -1 => Ok(Sign::Minus),
            other => Err(format!("sign must be 1 or -1, got {}", other)),
        }
    }
}

impl From<Sign> for i8 {
    fn from(sign: Sign) -> i8 {
        match sign {
            Sign::Plus => 1,
            Sign::Minus => -1,
        }
    }
}

// ============================================================================
// FORMULA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub rtype: String,
    pub sign: Sign,
}

impl Component {
    pub fn plus(rtype: impl Into<String>) -> Self {
        Component {
            rtype: rtype.into(),
            sign: Sign::Plus,
        }
    }

    pub fn minus(rtype: impl Into<String>) -> Self {
        Component {
            rtype: rtype.into(),
            sign: Sign::Minus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub target: String,
    pub components: Vec<Component>,
}

impl Formula {
    pub fn new(target: impl Into<String>, components: Vec<Component>) -> Self {
        Formula {
            target: target.into(),
            components,
        }
    }

    pub fn uses(&self, rtype: &str) -> bool {
        self.components.iter().any(|c| c.rtype == rtype)
    }

    /// Signed sum of component values. `value_of` returns `None` for a
    /// component with no value available; the sum is then `None` as well.
    pub fn evaluate<F>(&self, mut value_of: F) -> Option<f64>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let mut total = 0.0;
        for component in &self.components {
            total += component.sign.factor() * value_of(&component.rtype)?;
        }
        Some(total)
    }

    pub fn describe(&self) -> String {
        let terms: Vec<String> = self
            .components
            .iter()
            .map(|c| match c.sign {
                Sign::Plus => format!("+ {}", c.rtype),
                Sign::Minus => format!("- {}", c.rtype),
            })
            .collect();
        format!("{} = {}", self.target, terms.join(" "))
    }
}

// ============================================================================
// FORMULA SET
// ============================================================================

/// All formulas of a schema, indexed by target and by component.
#[derive(Debug, Clone, Default)]
pub struct FormulaSet {
    formulas: Vec<Formula>,
    by_target: HashMap<String, Vec<usize>>,
    by_component: HashMap<String, Vec<usize>>,
}

impl FormulaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_formulas(formulas: Vec<Formula>) -> Self {
        let mut set = FormulaSet::new();
        for formula in formulas {
            set.add(formula);
        }
        set
    }

    /// Load a JSON array of `{target, components: [{rtype, sign}]}`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read formulas file: {:?}", path.as_ref()))?;

        let formulas: Vec<Formula> =
            serde_json::from_str(&content).context("Failed to parse formulas JSON")?;

        Ok(FormulaSet::from_formulas(formulas))
    }

    pub fn add(&mut self, formula: Formula) {
        let idx = self.formulas.len();
        self.by_target
            .entry(formula.target.clone())
            .or_default()
            .push(idx);
        for component in &formula.components {
            let users = self.by_component.entry(component.rtype.clone()).or_default();
            // a formula listing the same component twice is indexed once
            if users.last() != Some(&idx) {
                users.push(idx);
            }
        }
        self.formulas.push(formula);
    }

    /// Formulas that list `rtype` among their components.
    pub fn using(&self, rtype: &str) -> Vec<&Formula> {
        self.by_component
            .get(rtype)
            .map(|idxs| idxs.iter().map(|&i| &self.formulas[i]).collect())
            .unwrap_or_default()
    }

    /// Formulas that compute `rtype`.
    pub fn targeting(&self, rtype: &str) -> Vec<&Formula> {
        self.by_target
            .get(rtype)
            .map(|idxs| idxs.iter().map(|&i| &self.formulas[i]).collect())
            .unwrap_or_default()
    }

    pub fn is_target(&self, rtype: &str) -> bool {
        self.by_target.contains_key(rtype)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.formulas.iter()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assets_formulas() -> FormulaSet {
        FormulaSet::from_formulas(vec![
            Formula::new(
                "BLS#TOTALASSETS",
                vec![Component::plus("BLS#FIXEDASSETS"), Component::plus("BLS#CURRENTASSETS")],
            ),
            Formula::new(
                "BLS#FIXEDASSETS",
                vec![Component::plus("BLS#TOTALASSETS"), Component::minus("BLS#CURRENTASSETS")],
            ),
            Formula::new(
                "BLS#CURRENTASSETS",
                vec![Component::plus("BLS#TOTALASSETS"), Component::minus("BLS#FIXEDASSETS")],
            ),
        ])
    }

    #[test]
    fn test_using_and_targeting() {
        let set = assets_formulas();

        let users: Vec<&str> = set
            .using("BLS#CURRENTASSETS")
            .iter()
            .map(|f| f.target.as_str())
            .collect();
        assert_eq!(users, vec!["BLS#TOTALASSETS", "BLS#FIXEDASSETS"]);

        assert_eq!(set.targeting("BLS#TOTALASSETS").len(), 1);
        assert!(set.is_target("BLS#FIXEDASSETS"));
        assert!(!set.is_target("ICS#REVENUE"));
        assert!(set.using("ICS#REVENUE").is_empty());
    }

    #[test]
    fn test_evaluate_signed_sum() {
        let formula = Formula::new("NET", vec![Component::plus("A"), Component::minus("B")]);

        let value = formula.evaluate(|rtype| match rtype {
            "A" => Some(100.0),
            "B" => Some(40.0),
            _ => None,
        });
        assert_eq!(value, Some(60.0));

        assert_eq!(formula.evaluate(|_| None), None);
    }

    #[test]
    fn test_evaluate_propagates_nan() {
        let formula = Formula::new("NET", vec![Component::plus("A"), Component::minus("B")]);
        let value = formula.evaluate(|rtype| if rtype == "A" { Some(f64::NAN) } else { Some(1.0) });
        assert!(value.unwrap().is_nan());
    }

    #[test]
    fn test_sign_serde() {
        let json = r#"{"target": "T", "components": [{"rtype": "A", "sign": 1}, {"rtype": "B", "sign": -1}]}"#;
        let formula: Formula = serde_json::from_str(json).unwrap();

        assert_eq!(formula.components[1].sign, Sign::Minus);
        assert_eq!(formula.describe(), "T = + A - B");

        let back = serde_json::to_value(&formula).unwrap();
        assert_eq!(back["components"][1]["sign"], serde_json::json!(-1));

        let bad = r#"{"target": "T", "components": [{"rtype": "A", "sign": 2}]}"#;
        assert!(serde_json::from_str::<Formula>(bad).is_err());
    }
}
