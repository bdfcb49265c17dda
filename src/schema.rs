// 📐 Table schema - the configuration a record table is built with
//
// Record-type catalog, unit catalog and formula set travel together and are
// shared by every table of a session.

use crate::catalog::{RecordType, RecordTypeCatalog, UnitCatalog, UnitOfMeasure};
use crate::formula::{Formula, FormulaSet};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// On-disk shape of a schema file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFile {
    pub record_types: Vec<RecordType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Vec<UnitOfMeasure>>,
    #[serde(default)]
    pub formulas: Vec<Formula>,
}

#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub record_types: RecordTypeCatalog,
    pub units: UnitCatalog,
    pub formulas: FormulaSet,
}

impl TableSchema {
    pub fn new(record_types: RecordTypeCatalog, units: UnitCatalog, formulas: FormulaSet) -> Self {
        TableSchema {
            record_types,
            units,
            formulas,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read schema file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
            .with_context(|| format!("Invalid schema file: {:?}", path.as_ref()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: SchemaFile =
            serde_json::from_str(content).context("Failed to parse schema JSON")?;
        Ok(Self::from(file))
    }

    /// Convenience for building tables that share this schema.
    pub fn shared(self) -> Arc<TableSchema> {
        Arc::new(self)
    }
}

impl From<SchemaFile> for TableSchema {
    fn from(file: SchemaFile) -> Self {
        let units = match file.units {
            Some(units) if !units.is_empty() => UnitCatalog::new(units),
            _ => UnitCatalog::with_defaults(),
        };

        TableSchema {
            record_types: RecordTypeCatalog::from_types(file.record_types),
            units,
            formulas: FormulaSet::from_formulas(file.formulas),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"{
        "record_types": [
            {"id": 1, "name": "BLS#TOTALASSETS", "statement": "BLS"},
            {"id": 2, "name": "BLS#FIXEDASSETS", "statement": "BLS"},
            {"id": 3, "name": "BLS#CURRENTASSETS", "statement": "BLS"}
        ],
        "formulas": [
            {"target": "BLS#TOTALASSETS", "components": [
                {"rtype": "BLS#FIXEDASSETS", "sign": 1},
                {"rtype": "BLS#CURRENTASSETS", "sign": 1}
            ]}
        ]
    }"#;

    #[test]
    fn test_schema_without_units_uses_defaults() {
        let schema = TableSchema::from_json(SCHEMA).unwrap();

        assert_eq!(schema.record_types.len(), 3);
        assert_eq!(schema.formulas.len(), 1);
        assert_eq!(schema.units, UnitCatalog::with_defaults());
    }

    #[test]
    fn test_schema_with_custom_units() {
        let json = r#"{"record_types": [], "units": [{"id": 1, "text": "EUR"}]}"#;
        let schema = TableSchema::from_json(json).unwrap();

        assert_eq!(schema.units.len(), 1);
        assert_eq!(schema.units.text_of(1), Some("EUR"));
        assert!(schema.formulas.is_empty());
    }

    #[test]
    fn test_schema_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();

        let schema = TableSchema::from_file(file.path()).unwrap();
        assert!(schema.record_types.contains("BLS#CURRENTASSETS"));
    }

    #[test]
    fn test_invalid_schema_is_an_error() {
        let err = TableSchema::from_json(r#"{"formulas": []}"#).unwrap_err();
        assert!(err.to_string().contains("schema"));
    }
}
