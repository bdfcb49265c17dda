// Typed errors for structural misuse of a record table.
//
// These signal a caller bug (stale row id, column index past the end), not
// bad user input. User input problems are reported by the validator instead.

use crate::table::RowId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Unknown row: {0}")]
    UnknownRow(RowId),

    #[error("Column index {index} out of range (table has {count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("Unknown column id: {0}")]
    UnknownColumnId(u32),

    #[error("Record type {0} has no formula whose components are all present")]
    NotCalculable(String),

    #[error("Row {0} has no record type assigned")]
    MissingRecordType(RowId),

    #[error("Unknown unit of measure: {0}")]
    UnknownUnit(i64),

    #[error("No item selected. Please select one of the items from the list.")]
    NoItemSelected,
}

pub type Result<T> = std::result::Result<T, TableError>;
