// ✅ Validation - structured checks before a table is exported
//
// Every check returns a `Check<T>`: an overall verdict plus per-item details.
// Nothing here fails; problems are rendered as alerts with a severity, and
// only errors block an export. Warnings ask the user for confirmation.

use crate::cell::Cell;
use crate::period::{is_valid_timestamp, parse_timerange};
use crate::table::RecordTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check<T> {
    pub result: bool,
    pub details: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Bootstrap alert context the web front-end renders with
    pub fn css_class(&self) -> &'static str {
        match self {
            Severity::Error => "danger",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Alert {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Alert {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Combined verdict with rendered alerts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Validation {
    pub result: bool,
    pub alerts: Vec<Alert>,
}

impl Validation {
    pub fn errors(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|alert| alert.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|alert| !alert.is_error())
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} errors, {} warnings",
            if self.result { "PASSED" } else { "FAILED" },
            self.errors().count(),
            self.warnings().count()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderCheck {
    pub index: usize,
    pub timerange_ok: bool,
    pub timestamp_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCheck {
    pub index: usize,
    pub numeric: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCheck {
    pub index: usize,
    pub rtype: Option<String>,
    /// Cell count matches the column count
    pub aligned: bool,
    pub cells: Vec<CellCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtypeCheck {
    pub index: usize,
    pub rtype: Option<String>,
    pub assigned: bool,
    /// Present in the record-type catalog
    pub known: bool,
}

/// Report identification shown above the tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportMeta {
    pub timerange: String,
    pub timestamp: String,
}

impl ReportMeta {
    pub fn new(timerange: impl Into<String>, timestamp: impl Into<String>) -> Self {
        ReportMeta {
            timerange: timerange.into(),
            timestamp: timestamp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCheck {
    pub timerange_ok: bool,
    pub timestamp_ok: bool,
}

// ============================================================================
// TABLE CHECKS
// ============================================================================

impl RecordTable {
    /// Record types carried by more than one row, in first-seen order.
    pub fn validate_records_duplication(&self) -> Check<Vec<String>> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order = Vec::new();

        for name in self.rows().iter().filter_map(|row| row.rtype()) {
            let count = counts.entry(name).or_insert(0);
            if *count == 0 {
                order.push(name);
            }
            *count += 1;
        }

        let duplicated: Vec<String> = order
            .into_iter()
            .filter(|name| counts[name] > 1)
            .map(str::to_string)
            .collect();

        Check {
            result: duplicated.is_empty(),
            details: duplicated,
        }
    }

    pub fn validate_headers(&self) -> Check<Vec<HeaderCheck>> {
        let details: Vec<HeaderCheck> = self
            .periods()
            .iter()
            .enumerate()
            .map(|(index, period)| HeaderCheck {
                index,
                timerange_ok: period.timerange_is_valid(),
                timestamp_ok: period.timestamp_is_valid(),
            })
            .collect();

        Check {
            result: details.iter().all(|h| h.timerange_ok && h.timestamp_ok),
            details,
        }
    }

    /// Misaligned rows only warn; non-numeric cells fail the check.
    pub fn validate_records(&self) -> Check<Vec<RowCheck>> {
        let columns = self.column_count();
        let details: Vec<RowCheck> = self
            .rows()
            .iter()
            .enumerate()
            .map(|(index, row)| RowCheck {
                index,
                rtype: row.record_type.clone(),
                aligned: row.values.len() == columns,
                cells: row
                    .values
                    .iter()
                    .enumerate()
                    .map(|(index, cell)| CellCheck {
                        index,
                        numeric: cell.is_numeric(),
                    })
                    .collect(),
            })
            .collect();

        Check {
            result: details.iter().all(|r| r.cells.iter().all(|c| c.numeric)),
            details,
        }
    }

    pub fn validate_rtypes(&self) -> Check<Vec<RtypeCheck>> {
        let catalog = &self.schema().record_types;
        let details: Vec<RtypeCheck> = self
            .rows()
            .iter()
            .enumerate()
            .map(|(index, row)| RtypeCheck {
                index,
                rtype: row.record_type.clone(),
                assigned: row.record_type.is_some(),
                known: row.rtype().map(|name| catalog.contains(name)).unwrap_or(false),
            })
            .collect();

        Check {
            result: details.iter().all(|r| r.assigned && r.known),
            details,
        }
    }
}

// ============================================================================
// ALERT RENDERING
// ============================================================================

fn adjust_prefix(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{}: ", prefix),
        None => String::new(),
    }
}

fn duplication_alerts(duplicated: &[String], prefix: &str) -> Vec<Alert> {
    duplicated
        .iter()
        .map(|name| Alert::error(format!("{}{} is duplicated", prefix, name)))
        .collect()
}

fn header_alerts(headers: &[HeaderCheck], prefix: &str) -> Vec<Alert> {
    headers
        .iter()
        .filter(|h| !h.timerange_ok || !h.timestamp_ok)
        .map(|h| {
            let mut msg = format!("{}Column #{}:", prefix, h.index + 1);
            if !h.timerange_ok {
                msg.push_str(" timerange corrupted;");
            }
            if !h.timestamp_ok {
                msg.push_str(" timestamp corrupted;");
            }
            Alert::error(msg)
        })
        .collect()
}

fn record_alerts(rows: &[RowCheck], prefix: &str) -> Vec<Alert> {
    if rows.is_empty() {
        return vec![Alert::warning(format!(
            "{}There are not any records in the table.",
            prefix
        ))];
    }

    let mut alerts = Vec::new();
    for row in rows {
        if !row.aligned {
            alerts.push(Alert::warning(format!(
                "{}Row #{}: different number of records",
                prefix,
                row.index + 1
            )));
        }
        for cell in row.cells.iter().filter(|c| !c.numeric) {
            alerts.push(Alert::error(format!(
                "{}Row #{} with {}: not a number in column #{}",
                prefix,
                row.index + 1,
                row.rtype.as_deref().unwrap_or("-"),
                cell.index + 1
            )));
        }
    }
    alerts
}

fn rtype_alerts(rows: &[RtypeCheck], prefix: &str) -> Vec<Alert> {
    rows.iter()
        .filter(|r| !r.assigned || !r.known)
        .map(|r| {
            Alert::error(format!(
                "{}Row #{}: type of record corrupted",
                prefix,
                r.index + 1
            ))
        })
        .collect()
}

/// Run the four table checks and render their alerts.
pub fn validate_table(table: &RecordTable, prefix: Option<&str>) -> Validation {
    let prefix = adjust_prefix(prefix);

    let duplication = table.validate_records_duplication();
    let headers = table.validate_headers();
    let records = table.validate_records();
    let rtypes = table.validate_rtypes();

    let result = duplication.result && headers.result && records.result && rtypes.result;

    let mut alerts = duplication_alerts(&duplication.details, &prefix);
    alerts.extend(header_alerts(&headers.details, &prefix));
    alerts.extend(record_alerts(&records.details, &prefix));
    alerts.extend(rtype_alerts(&rtypes.details, &prefix));

    log::debug!(
        "validated table ({} rows): result={}, {} alerts",
        table.row_count(),
        result,
        alerts.len()
    );

    Validation { result, alerts }
}

// ============================================================================
// COMPANY & REPORT CHECKS
// ============================================================================

pub fn validate_company(company_id: Option<i64>) -> Check<bool> {
    let result = company_id.is_some();
    Check {
        result,
        details: result,
    }
}

pub fn company_alert(check: &Check<bool>) -> Option<Alert> {
    if check.result {
        None
    } else {
        Some(Alert::error("Company not identified"))
    }
}

pub fn validate_report(report: &ReportMeta) -> Check<ReportCheck> {
    let details = ReportCheck {
        timerange_ok: parse_timerange(&report.timerange).is_some(),
        timestamp_ok: is_valid_timestamp(&report.timestamp),
    };
    Check {
        result: details.timerange_ok && details.timestamp_ok,
        details,
    }
}

/// Report problems never block an export.
pub fn report_alert(check: &Check<ReportCheck>) -> Option<Alert> {
    if check.result {
        return None;
    }
    let mut msg = String::from("Financial report identification:");
    if !check.details.timerange_ok {
        msg.push_str(" timerange corrupted;");
    }
    if !check.details.timestamp_ok {
        msg.push_str(" timestamp corrupted;");
    }
    Some(Alert::warning(msg))
}

/// Validation that gates an export: every table (prefixed with its name),
/// the company and, unless disabled, the report identification.
pub fn validate_export(
    tables: &[(&str, &RecordTable)],
    company_id: Option<i64>,
    report: &ReportMeta,
    report_disabled: bool,
) -> Validation {
    let mut result = true;
    let mut alerts = Vec::new();

    for (name, table) in tables {
        let prefix = if tables.len() > 1 { Some(*name) } else { None };
        let validation = validate_table(table, prefix);
        result &= validation.result;
        alerts.extend(validation.alerts);
    }

    let company = validate_company(company_id);
    result &= company.result;
    alerts.extend(company_alert(&company));

    if !report_disabled {
        alerts.extend(report_alert(&validate_report(report)));
    }

    Validation { result, alerts }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RecordType, RecordTypeCatalog, UnitCatalog};
    use crate::formula::FormulaSet;
    use crate::period::PeriodSpec;
    use crate::schema::TableSchema;
    use crate::table::RowData;
    use pretty_assertions::assert_eq;

    fn table() -> RecordTable {
        let schema = TableSchema::new(
            RecordTypeCatalog::from_types(vec![
                RecordType::new(1, "BLS#TOTALASSETS"),
                RecordType::new(2, "BLS#FIXEDASSETS"),
            ]),
            UnitCatalog::with_defaults(),
            FormulaSet::new(),
        );
        RecordTable::new(schema.shared())
    }

    fn messages(validation: &Validation) -> Vec<&str> {
        validation.alerts.iter().map(|a| a.message.as_str()).collect()
    }

    #[test]
    fn test_clean_table_passes() {
        let mut table = table();
        table.add_column(Some(PeriodSpec::months(12, "2020-12")));
        table.add_row(Some(RowData::new("BLS#TOTALASSETS").with_values(["100"])));
        table.add_row(Some(RowData::new("BLS#FIXEDASSETS").with_values(["60"])));

        let validation = validate_table(&table, None);

        assert!(validation.result);
        assert!(validation.alerts.is_empty());
    }

    #[test]
    fn test_duplicates_listed_once_in_order() {
        let mut table = table();
        for name in ["BLS#FIXEDASSETS", "BLS#TOTALASSETS", "BLS#FIXEDASSETS", "BLS#FIXEDASSETS"] {
            table.add_row(Some(RowData::new(name)));
        }
        table.add_row(None);
        table.add_row(None);

        let check = table.validate_records_duplication();

        assert!(!check.result);
        assert_eq!(check.details, vec!["BLS#FIXEDASSETS".to_string()]);
    }

    #[test]
    fn test_duplicate_alert_wording() {
        let mut table = table();
        table.add_row(Some(RowData::new("BLS#TOTALASSETS")));
        table.add_row(Some(RowData::new("BLS#TOTALASSETS")));

        let validation = validate_table(&table, Some("Balance sheet"));

        assert!(!validation.result);
        assert_eq!(
            messages(&validation),
            vec!["Balance sheet: BLS#TOTALASSETS is duplicated"]
        );
        assert_eq!(validation.alerts[0].severity.css_class(), "danger");
    }

    #[test]
    fn test_corrupted_headers() {
        let mut table = table();
        table.add_column(Some(PeriodSpec::new("x", "2020-06")));
        table.add_column(Some(PeriodSpec::new("none", "June")));
        table.add_column(Some(PeriodSpec::months(3, "2020-06")));
        table.add_row(Some(RowData::new("BLS#TOTALASSETS")));

        let check = table.validate_headers();
        assert!(!check.result);
        assert!(check.details[2].timerange_ok && check.details[2].timestamp_ok);

        let validation = validate_table(&table, None);
        assert_eq!(
            messages(&validation),
            vec![
                "Column #1: timerange corrupted;",
                "Column #2: timerange corrupted; timestamp corrupted;",
            ]
        );
    }

    #[test]
    fn test_non_numeric_cell_is_an_error() {
        let mut table = table();
        table.add_column(None);
        table.add_column(None);
        table.add_row(Some(RowData::new("BLS#TOTALASSETS").with_values(["1", "abc"])));

        let validation = validate_table(&table, None);

        assert!(!validation.result);
        assert_eq!(
            messages(&validation),
            vec!["Row #1 with BLS#TOTALASSETS: not a number in column #2"]
        );
    }

    #[test]
    fn test_empty_table_warns_but_passes() {
        let table = table();

        let validation = validate_table(&table, None);

        assert!(validation.result);
        assert_eq!(validation.alerts, vec![Alert::warning("There are not any records in the table.")]);
    }

    #[test]
    fn test_unassigned_and_unknown_rtypes() {
        let mut table = table();
        table.add_row(Some(RowData::new("BLS#TOTALASSETS")));
        table.add_row(None);
        table.add_row(Some(RowData::new("BLS#GOODWILL")));

        let check = table.validate_rtypes();
        assert!(!check.result);
        assert!(!check.details[1].assigned);
        assert!(check.details[2].assigned && !check.details[2].known);

        let validation = validate_table(&table, None);
        assert_eq!(
            messages(&validation),
            vec![
                "Row #2: type of record corrupted",
                "Row #3: type of record corrupted",
            ]
        );
    }

    #[test]
    fn test_company_and_report() {
        assert!(validate_company(Some(7)).result);
        assert_eq!(
            company_alert(&validate_company(None)),
            Some(Alert::error("Company not identified"))
        );

        assert!(validate_report(&ReportMeta::new("12", "2020-12")).result);
        let check = validate_report(&ReportMeta::new("twelve", "2020-12"));
        assert_eq!(
            report_alert(&check),
            Some(Alert::warning("Financial report identification: timerange corrupted;"))
        );
    }

    #[test]
    fn test_export_validation_combines_checks() {
        let mut table = table();
        table.add_column(Some(PeriodSpec::months(3, "2020-06")));
        table.add_row(Some(RowData::new("BLS#TOTALASSETS").with_values(["5"])));
        let bad_report = ReportMeta::new("", "");

        // report problems only warn
        let validation = validate_export(&[("records", &table)], Some(7), &bad_report, false);
        assert!(validation.result);
        assert_eq!(validation.warnings().count(), 1);

        // disabled report is not checked at all
        let validation = validate_export(&[("records", &table)], Some(7), &bad_report, true);
        assert!(validation.alerts.is_empty());

        // missing company blocks
        let validation = validate_export(&[("records", &table)], None, &bad_report, true);
        assert!(!validation.result);
        assert_eq!(validation.summary(), "FAILED: 1 errors, 0 warnings");
    }

    #[test]
    fn test_multi_table_alerts_are_prefixed() {
        let mut bls = table();
        bls.add_row(None);
        let ics = table();

        let validation = validate_export(&[("BLS", &bls), ("ICS", &ics)], Some(1), &ReportMeta::default(), true);

        assert_eq!(
            messages(&validation),
            vec![
                "BLS: Row #1: type of record corrupted",
                "ICS: There are not any records in the table.",
            ]
        );
    }
}
