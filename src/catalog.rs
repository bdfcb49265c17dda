// 🏷️ Catalogs - record types and units of measure
//
// Both catalogs are supplied from outside (schema file or API) and stay
// immutable for the lifetime of a data-entry session.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// STATEMENT
// ============================================================================

/// Financial statement a record type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statement {
    /// Balance sheet
    #[serde(rename = "BLS")]
    Bls,
    /// Income statement
    #[serde(rename = "ICS")]
    Ics,
    /// Cash-flow statement
    #[serde(rename = "CFS")]
    Cfs,
}

impl Statement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statement::Bls => "BLS",
            Statement::Ics => "ICS",
            Statement::Cfs => "CFS",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_uppercase().as_str() {
            "BLS" => Some(Statement::Bls),
            "ICS" => Some(Statement::Ics),
            "CFS" => Some(Statement::Cfs),
            _ => None,
        }
    }

    pub fn all() -> [Statement; 3] {
        [Statement::Bls, Statement::Ics, Statement::Cfs]
    }
}

// ============================================================================
// RECORD TYPE
// ============================================================================

/// A financial line-item category, e.g. `BLS#TOTALASSETS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<Statement>,
}

impl RecordType {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        RecordType {
            id,
            name: name.into(),
            statement: None,
        }
    }

    pub fn with_statement(id: i64, name: impl Into<String>, statement: Statement) -> Self {
        RecordType {
            id,
            name: name.into(),
            statement: Some(statement),
        }
    }
}

/// Lookup table of record types by name and by id.
#[derive(Debug, Clone, Default)]
pub struct RecordTypeCatalog {
    types: Vec<RecordType>,
    by_name: HashMap<String, usize>,
}

impl RecordTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_types(types: Vec<RecordType>) -> Self {
        let mut catalog = RecordTypeCatalog::new();
        for rtype in types {
            catalog.register(rtype);
        }
        catalog
    }

    /// Load a JSON array of `{id, name, statement?}` objects
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read record types file: {:?}", path.as_ref()))?;

        let types: Vec<RecordType> =
            serde_json::from_str(&content).context("Failed to parse record types JSON")?;

        Ok(RecordTypeCatalog::from_types(types))
    }

    /// Register a record type. A later entry with the same name replaces the
    /// earlier one.
    pub fn register(&mut self, rtype: RecordType) {
        if let Some(&idx) = self.by_name.get(&rtype.name) {
            self.types[idx] = rtype;
        } else {
            self.by_name.insert(rtype.name.clone(), self.types.len());
            self.types.push(rtype);
        }
    }

    pub fn get(&self, name: &str) -> Option<&RecordType> {
        self.by_name.get(name).map(|&idx| &self.types[idx])
    }

    pub fn get_by_id(&self, id: i64) -> Option<&RecordType> {
        self.types.iter().find(|rtype| rtype.id == id)
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.get(name).map(|rtype| rtype.id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn statement_of(&self, name: &str) -> Option<Statement> {
        self.get(name).and_then(|rtype| rtype.statement)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordType> {
        self.types.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.types.iter().map(|rtype| rtype.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ============================================================================
// UNITS OF MEASURE
// ============================================================================

/// A multiplier applied to raw entered values. `id` is the multiplier itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    pub id: i64,
    pub text: String,
}

impl UnitOfMeasure {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        UnitOfMeasure {
            id,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCatalog {
    units: Vec<UnitOfMeasure>,
}

impl UnitCatalog {
    pub fn new(units: Vec<UnitOfMeasure>) -> Self {
        UnitCatalog { units }
    }

    /// PLN, thousands of PLN and millions of PLN
    pub fn with_defaults() -> Self {
        UnitCatalog::new(vec![
            UnitOfMeasure::new(1, "PLN"),
            UnitOfMeasure::new(1000, "k'PLN"),
            UnitOfMeasure::new(1_000_000, "m'PLN"),
        ])
    }

    pub fn contains(&self, multiplier: i64) -> bool {
        self.units.iter().any(|unit| unit.id == multiplier)
    }

    pub fn text_of(&self, multiplier: i64) -> Option<&str> {
        self.units
            .iter()
            .find(|unit| unit.id == multiplier)
            .map(|unit| unit.text.as_str())
    }

    /// Unit following `multiplier` in catalog order, wrapping around.
    pub fn next_after(&self, multiplier: i64) -> Option<&UnitOfMeasure> {
        if self.units.is_empty() {
            return None;
        }
        let next = match self.units.iter().position(|unit| unit.id == multiplier) {
            Some(idx) => (idx + 1) % self.units.len(),
            None => 0,
        };
        self.units.get(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitOfMeasure> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Default for UnitCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_catalog() -> RecordTypeCatalog {
        RecordTypeCatalog::from_types(vec![
            RecordType::with_statement(1, "BLS#TOTALASSETS", Statement::Bls),
            RecordType::with_statement(2, "BLS#FIXEDASSETS", Statement::Bls),
            RecordType::with_statement(3, "ICS#REVENUE", Statement::Ics),
        ])
    }

    #[test]
    fn test_lookup_by_name_and_id() {
        let catalog = sample_catalog();

        assert_eq!(catalog.id_of("BLS#FIXEDASSETS"), Some(2));
        assert_eq!(catalog.get_by_id(3).map(|r| r.name.as_str()), Some("ICS#REVENUE"));
        assert_eq!(catalog.statement_of("ICS#REVENUE"), Some(Statement::Ics));
        assert!(catalog.id_of("CFS#UNKNOWN").is_none());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut catalog = sample_catalog();
        catalog.register(RecordType::new(10, "BLS#TOTALASSETS"));

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.id_of("BLS#TOTALASSETS"), Some(10));
    }

    #[test]
    fn test_statement_parse() {
        assert_eq!(Statement::parse("bls"), Some(Statement::Bls));
        assert_eq!(Statement::parse(" CFS "), Some(Statement::Cfs));
        assert_eq!(Statement::parse("XYZ"), None);
    }

    #[test]
    fn test_default_units() {
        let units = UnitCatalog::with_defaults();

        assert!(units.contains(1000));
        assert_eq!(units.text_of(1_000_000), Some("m'PLN"));
        assert_eq!(units.next_after(1).map(|u| u.id), Some(1000));
        assert_eq!(units.next_after(1_000_000).map(|u| u.id), Some(1));
        assert_eq!(units.next_after(7).map(|u| u.id), Some(1));
    }

    #[test]
    fn test_load_record_types_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": 5, "name": "CFS#NETCASH", "statement": "CFS"}}, {{"id": 6, "name": "OTHER"}}]"#
        )
        .unwrap();

        let catalog = RecordTypeCatalog::from_file(file.path()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.statement_of("CFS#NETCASH"), Some(Statement::Cfs));
        assert_eq!(catalog.statement_of("OTHER"), None);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = RecordTypeCatalog::from_file("/nonexistent/rtypes.json").unwrap_err();
        assert!(err.to_string().contains("rtypes.json"));
    }
}
