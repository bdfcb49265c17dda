// ⚙️ Settings - environment configuration shared by both binaries

use crate::schema::TableSchema;
use anyhow::{Context as AnyhowContext, Result};
use std::env;
use std::path::PathBuf;

pub const SCHEMA_VAR: &str = "RTAB_SCHEMA";
pub const ADDR_VAR: &str = "RTAB_ADDR";
pub const COMPANY_VAR: &str = "RTAB_COMPANY";

pub const DEFAULT_SCHEMA: &str = "schema.json";
pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// JSON file with record types, units and formulas
    pub schema_path: PathBuf,
    /// Listen address of the HTTP server
    pub addr: String,
    /// Company the exported records belong to
    pub company_id: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            schema_path: PathBuf::from(DEFAULT_SCHEMA),
            addr: DEFAULT_ADDR.to_string(),
            company_id: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(path) = get(SCHEMA_VAR) {
            settings.schema_path = PathBuf::from(path);
        }
        if let Some(addr) = get(ADDR_VAR) {
            settings.addr = addr;
        }
        if let Some(company) = get(COMPANY_VAR) {
            let id = company
                .trim()
                .parse::<i64>()
                .with_context(|| format!("{} must be a company id, got {:?}", COMPANY_VAR, company))?;
            settings.company_id = Some(id);
        }

        Ok(settings)
    }

    pub fn load_schema(&self) -> Result<TableSchema> {
        let schema = TableSchema::from_file(&self.schema_path)?;
        log::info!(
            "schema {:?}: {} record types, {} units, {} formulas",
            self.schema_path,
            schema.record_types.len(),
            schema.units.len(),
            schema.formulas.len()
        );
        Ok(schema)
    }
}
