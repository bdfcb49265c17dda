// ⚖️ Formula engine - derived records and change propagation
//
// When a contributing cell changes, every calculable formula that uses the
// changed record type is re-evaluated for the affected columns:
//
//   target = Σ sign_i · (value_i · unit_i)        written back as target / unit
//
// and the change continues depth-first from each target. A visited set keyed
// by (record type, column) bounds the walk, so cyclic formula graphs
// terminate with each node computed at most once per originating edit.

use crate::cell::{format_number, Cell};
use crate::error::{Result, TableError};
use crate::formula::Formula;
use crate::schema::TableSchema;
use crate::table::{RecordTable, RowId};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Pairs already settled during one propagation.
pub type Visited = HashSet<(String, usize)>;

/// One computed cell group: every row of `rtype` at `column` was rewritten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    pub rtype: String,
    pub column: usize,
    pub value: f64,
}

enum Task<'a> {
    /// Queue the calculable formulas that use `rtype`
    Expand { rtype: String, column: usize },
    /// Compute one formula for one column
    Evaluate { formula: &'a Formula, column: usize },
}

impl RecordTable {
    // ========================================================================
    // PROPAGATION
    // ========================================================================

    /// Recompute everything that depends on `trigger` in the given columns
    /// (all columns when `None`).
    pub fn update_records(&mut self, trigger: &str, columns: Option<&[usize]>) -> Result<Vec<Update>> {
        let mut visited = Visited::new();
        self.update_records_with(trigger, columns, &mut visited)
    }

    /// Same as [`update_records`](Self::update_records) with a caller-owned
    /// visited set, so several triggers can share one propagation.
    pub fn update_records_with(
        &mut self,
        trigger: &str,
        columns: Option<&[usize]>,
        visited: &mut Visited,
    ) -> Result<Vec<Update>> {
        let columns = self.resolve_columns(columns)?;

        // the trigger itself is the source of truth for this edit
        for &column in &columns {
            visited.insert((trigger.to_string(), column));
        }

        let schema = self.shared_schema();
        let tasks = columns
            .iter()
            .rev()
            .map(|&column| Task::Expand {
                rtype: trigger.to_string(),
                column,
            })
            .collect();

        Ok(self.run(&schema, tasks, visited))
    }

    /// Evaluate the formulas that compute `target` itself, then propagate
    /// from it. Used when a row becomes calculable or its unit changes.
    pub fn recompute_target(&mut self, target: &str, columns: Option<&[usize]>) -> Result<Vec<Update>> {
        let columns = self.resolve_columns(columns)?;
        let schema = self.shared_schema();

        let mut tasks = Vec::new();
        for formula in schema.formulas.targeting(target) {
            if !self.is_formula_calculable(formula) {
                continue;
            }
            for &column in &columns {
                tasks.push(Task::Evaluate { formula, column });
            }
        }
        tasks.reverse();

        let mut visited = Visited::new();
        Ok(self.run(&schema, tasks, &mut visited))
    }

    /// Recompute every calculable row, in row order.
    pub fn recalculate_all(&mut self) -> Result<Vec<Update>> {
        let mut seen = HashSet::new();
        let targets: Vec<String> = self
            .rows()
            .iter()
            .filter(|row| row.calculable)
            .filter_map(|row| row.record_type.clone())
            .filter(|name| seen.insert(name.clone()))
            .collect();

        let mut updates = Vec::new();
        for target in targets {
            updates.extend(self.recompute_target(&target, None)?);
        }
        Ok(updates)
    }

    /// A formula may run when all its components have rows and at least one
    /// target row is flagged calculable.
    pub fn is_formula_calculable(&self, formula: &Formula) -> bool {
        formula.components.iter().all(|c| self.has_rtype(&c.rtype))
            && self
                .rows()
                .iter()
                .any(|row| row.calculable && row.has_rtype(&formula.target))
    }

    fn resolve_columns(&self, columns: Option<&[usize]>) -> Result<Vec<usize>> {
        match columns {
            Some(columns) => {
                for &column in columns {
                    self.check_column(column)?;
                }
                Ok(columns.to_vec())
            }
            None => Ok((0..self.column_count()).collect()),
        }
    }

    /// Depth-first walk over an explicit stack; mirrors the recursive order
    /// (formula by formula, column by column, descending into each target
    /// before moving to the next sibling).
    fn run<'a>(
        &mut self,
        schema: &'a Arc<TableSchema>,
        mut stack: Vec<Task<'a>>,
        visited: &mut Visited,
    ) -> Vec<Update> {
        let mut updates = Vec::new();

        while let Some(task) = stack.pop() {
            match task {
                Task::Expand { rtype, column } => {
                    let mut children: Vec<Task<'a>> = schema
                        .formulas
                        .using(&rtype)
                        .into_iter()
                        .filter(|formula| self.is_formula_calculable(formula))
                        .map(|formula| Task::Evaluate { formula, column })
                        .collect();
                    children.reverse();
                    stack.extend(children);
                }
                Task::Evaluate { formula, column } => {
                    let key = (formula.target.clone(), column);
                    if visited.contains(&key) {
                        continue;
                    }

                    let value = match formula.evaluate(|rtype| self.snapshot(rtype, column)) {
                        Some(value) => value,
                        None => continue,
                    };
                    visited.insert(key);
                    self.write_target(&formula.target, column, value);

                    log::debug!(
                        "{} [col {}] = {} ({})",
                        formula.target,
                        column,
                        value,
                        formula.describe()
                    );

                    updates.push(Update {
                        rtype: formula.target.clone(),
                        column,
                        value,
                    });
                    stack.push(Task::Expand {
                        rtype: formula.target.clone(),
                        column,
                    });
                }
            }
        }

        updates
    }

    /// Unit-scaled value of the first row carrying `rtype`.
    fn snapshot(&self, rtype: &str, column: usize) -> Option<f64> {
        self.rows()
            .iter()
            .find(|row| row.has_rtype(rtype))
            .and_then(|row| row.scaled(column))
    }

    fn write_target(&mut self, target: &str, column: usize, value: f64) {
        for row in self.rows_mut().iter_mut().filter(|row| row.has_rtype(target)) {
            let unit = row.unit as f64;
            if let Some(cell) = row.values.get_mut(column) {
                cell.set(&format_number(value / unit));
            }
        }
    }

    // ========================================================================
    // EDIT TRIGGERS
    // ========================================================================

    /// Set a cell and propagate. Calculable rows are overwritten by their
    /// formula later, so edits on them do not propagate.
    pub fn edit_cell(&mut self, id: RowId, column: usize, text: &str) -> Result<Vec<Update>> {
        self.set_cell(id, column, text)?;

        let row = self.row(id).ok_or(TableError::UnknownRow(id))?;
        match (row.record_type.clone(), row.calculable) {
            (Some(rtype), false) => self.update_records(&rtype, Some(&[column])),
            _ => Ok(Vec::new()),
        }
    }

    /// Change a row's unit of measure and propagate over all columns.
    pub fn change_unit(&mut self, id: RowId, unit: i64) -> Result<Vec<Update>> {
        self.set_unit(id, unit)?;

        let row = self.row(id).ok_or(TableError::UnknownRow(id))?;
        match (row.record_type.clone(), row.calculable) {
            (Some(rtype), true) => self.recompute_target(&rtype, None),
            (Some(rtype), false) => self.update_records(&rtype, None),
            (None, _) => Ok(Vec::new()),
        }
    }

    /// Flag a row calculable and fill it from its formulas.
    pub fn mark_calculable(&mut self, id: RowId) -> Result<Vec<Update>> {
        self.set_calculable(id, true)?;

        let rtype = self
            .row(id)
            .and_then(|row| row.record_type.clone())
            .ok_or(TableError::MissingRecordType(id))?;
        self.recompute_target(&rtype, None)
    }
}

// ============================================================================
// TESTS
// ============================================================================
