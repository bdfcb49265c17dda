// 📊 Record Table - grid of financial records
//
// Rows carry a record type, a unit of measure and one cell per period
// column. The table is the system of record; any UI is a projection of it.
//
// Invariant: every row holds exactly `periods.len()` cells after each
// public operation.

use crate::catalog::Statement;
use crate::cell::{Cell, InputCell};
use crate::error::{Result, TableError};
use crate::period::{Period, PeriodSpec};
use crate::schema::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_UNIT: i64 = 1;

// ============================================================================
// ROW
// ============================================================================

/// Stable row identity; survives reordering and removal of other rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(uuid::Uuid);

impl RowId {
    pub fn new() -> Self {
        RowId(uuid::Uuid::new_v4())
    }

    pub fn parse(text: &str) -> Option<Self> {
        uuid::Uuid::parse_str(text).ok().map(RowId)
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    /// `None` is the "unassigned" placeholder
    pub record_type: Option<String>,
    /// Multiplier applied to raw values (1, 1000, 1000000)
    pub unit: i64,
    /// Value is derived by a formula rather than entered
    pub calculable: bool,
    pub values: Vec<InputCell>,
}

impl Row {
    fn new(column_count: usize, data: RowData) -> Self {
        let mut values: Vec<InputCell> = data
            .values
            .into_iter()
            .take(column_count)
            .map(InputCell::new)
            .collect();
        values.resize_with(column_count, InputCell::default);

        Row {
            id: RowId::new(),
            record_type: data.rtype.filter(|name| !name.trim().is_empty()),
            unit: data.unit.unwrap_or(DEFAULT_UNIT),
            calculable: false,
            values,
        }
    }

    pub fn rtype(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    pub fn has_rtype(&self, name: &str) -> bool {
        self.record_type.as_deref() == Some(name)
    }

    /// Cell value scaled by the row's unit of measure.
    pub fn scaled(&self, column: usize) -> Option<f64> {
        self.values
            .get(column)
            .map(|cell| cell.number() * self.unit as f64)
    }

    pub fn raw(&self, column: usize) -> Option<&str> {
        self.values.get(column).map(|cell| cell.get())
    }
}

/// Initial content of a new row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    #[serde(default)]
    pub rtype: Option<String>,
    #[serde(default)]
    pub unit: Option<i64>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl RowData {
    pub fn new(rtype: impl Into<String>) -> Self {
        RowData {
            rtype: Some(rtype.into()),
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: i64) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// What `add_column` touched, for caller bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAdded {
    pub index: usize,
    pub column_id: u32,
    pub rows: Vec<RowId>,
}

// ============================================================================
// RECORD TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordTable {
    schema: Arc<TableSchema>,
    periods: Vec<Period>,
    rows: Vec<Row>,
}

impl RecordTable {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        RecordTable {
            schema,
            periods: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn shared_schema(&self) -> Arc<TableSchema> {
        Arc::clone(&self.schema)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn row_index(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }

    pub(crate) fn row_mut(&mut self, id: RowId) -> Result<&mut Row> {
        self.rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(TableError::UnknownRow(id))
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    /// Rows tagged with `name`; zero, one or many.
    pub fn rows_of(&self, name: &str) -> Vec<&Row> {
        self.rows.iter().filter(|row| row.has_rtype(name)).collect()
    }

    pub fn has_rtype(&self, name: &str) -> bool {
        self.rows.iter().any(|row| row.has_rtype(name))
    }

    /// Rows whose record type belongs to `statement` in the catalog.
    pub fn rows_in_statement(&self, statement: Statement) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|row| {
                row.rtype()
                    .and_then(|name| self.schema.record_types.statement_of(name))
                    == Some(statement)
            })
            .collect()
    }

    pub fn check_column(&self, index: usize) -> Result<()> {
        if index < self.periods.len() {
            Ok(())
        } else {
            Err(TableError::ColumnOutOfRange {
                index,
                count: self.periods.len(),
            })
        }
    }

    pub fn column_index(&self, column_id: u32) -> Option<usize> {
        self.periods.iter().position(|period| period.id == column_id)
    }

    // ========================================================================
    // STRUCTURAL MUTATION
    // ========================================================================

    /// Append a row with one cell per existing column. Values beyond the
    /// column count are ignored; missing ones default to `"0"`.
    pub fn add_row(&mut self, initial: Option<RowData>) -> RowId {
        let row = Row::new(self.periods.len(), initial.unwrap_or_default());
        let id = row.id;
        self.rows.push(row);
        id
    }

    pub fn remove_row(&mut self, id: RowId) -> Result<Row> {
        let index = self.row_index(id).ok_or(TableError::UnknownRow(id))?;
        Ok(self.rows.remove(index))
    }

    /// Append a period and a default cell to every row.
    pub fn add_column(&mut self, period: Option<PeriodSpec>) -> ColumnAdded {
        let column_id = self.next_column_id();
        self.periods
            .push(Period::new(column_id, &period.unwrap_or_default()));

        for row in &mut self.rows {
            row.values.push(InputCell::default());
        }

        ColumnAdded {
            index: self.periods.len() - 1,
            column_id,
            rows: self.rows.iter().map(|row| row.id).collect(),
        }
    }

    /// Remove a period and the aligned cell of every row.
    pub fn remove_column(&mut self, index: usize) -> Result<Period> {
        self.check_column(index)?;

        for row in &mut self.rows {
            if index < row.values.len() {
                row.values.remove(index);
            }
        }
        Ok(self.periods.remove(index))
    }

    pub fn remove_column_by_id(&mut self, column_id: u32) -> Result<Period> {
        let index = self
            .column_index(column_id)
            .ok_or(TableError::UnknownColumnId(column_id))?;
        self.remove_column(index)
    }

    fn next_column_id(&self) -> u32 {
        self.periods
            .iter()
            .map(|period| period.id + 1)
            .max()
            .unwrap_or(0)
    }

    // ========================================================================
    // CONTENT SETTERS (no recomputation)
    // ========================================================================

    pub fn set_period(&mut self, index: usize, spec: &PeriodSpec) -> Result<()> {
        self.check_column(index)?;
        self.periods[index].update(spec);
        Ok(())
    }

    /// Assign or clear a row's record type.
    pub fn set_record_type(&mut self, id: RowId, rtype: Option<&str>) -> Result<()> {
        let row = self.row_mut(id)?;
        row.record_type = rtype
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        // a retagged row must earn the calculable flag again
        row.calculable = false;
        Ok(())
    }

    /// Units are multipliers from the schema's unit catalog.
    pub fn check_unit(&self, unit: i64) -> Result<()> {
        if self.schema.units.contains(unit) {
            Ok(())
        } else {
            Err(TableError::UnknownUnit(unit))
        }
    }

    pub fn set_unit(&mut self, id: RowId, unit: i64) -> Result<()> {
        self.check_unit(unit)?;
        self.row_mut(id)?.unit = unit;
        Ok(())
    }

    pub fn set_cell(&mut self, id: RowId, column: usize, text: &str) -> Result<()> {
        self.check_column(column)?;
        let row = self.row_mut(id)?;
        let count = row.values.len();
        let cell = row
            .values
            .get_mut(column)
            .ok_or(TableError::ColumnOutOfRange { index: column, count })?;
        cell.set(text);
        Ok(())
    }

    /// Set the calculable flag. Turning it on requires the row's record type
    /// to be the target of a formula whose components all have rows here.
    pub fn set_calculable(&mut self, id: RowId, calculable: bool) -> Result<()> {
        if calculable {
            let row = self.row(id).ok_or(TableError::UnknownRow(id))?;
            let rtype = row
                .record_type
                .clone()
                .ok_or(TableError::MissingRecordType(id))?;
            if !self.can_calculate(&rtype) {
                return Err(TableError::NotCalculable(rtype));
            }
        }
        self.row_mut(id)?.calculable = calculable;
        Ok(())
    }

    /// True if some formula targets `rtype` and all its components are present.
    pub fn can_calculate(&self, rtype: &str) -> bool {
        self.schema
            .formulas
            .targeting(rtype)
            .iter()
            .any(|formula| formula.components.iter().all(|c| self.has_rtype(&c.rtype)))
    }

    /// Record types present on at least one non-blank row.
    pub fn present_rtypes(&self) -> HashSet<&str> {
        self.rows.iter().filter_map(|row| row.rtype()).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
