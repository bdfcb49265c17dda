// rtab - Core Library
// Record tables for financial statement data entry, used by the CLI, the
// terminal editor, the API server and tests

pub mod catalog;
pub mod cell;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod formula;
pub mod import;
pub mod period;
pub mod schema;
pub mod table;
pub mod validation;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use catalog::{RecordType, RecordTypeCatalog, Statement, UnitCatalog, UnitOfMeasure};
pub use cell::{Cell, InputCell, TextCell};
pub use config::Settings;
pub use engine::{Update, Visited};
pub use error::TableError;
pub use export::{prepare_export, ExportDecision, ExportPayload, ExportRecord};
pub use formula::{Component, Formula, FormulaSet, Sign};
pub use import::{read_csv, write_csv, ParserRequest, RecordForm, RecordTypeList};
pub use period::{normalize_timestamp, Period, PeriodSpec};
pub use schema::TableSchema;
pub use table::{ColumnAdded, RecordTable, Row, RowData, RowId};
pub use validation::{
    validate_company, validate_export, validate_report, validate_table, Alert, Check,
    ReportMeta, Severity, Validation,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
