// 📤 Export - flatten record tables into the upload payload
//
// One record per (assigned row, column). Values are unit-scaled, timestamps
// snapped to month end. The payload is serialized to the JSON string that
// the export form submits.

use crate::period::{normalize_timestamp, parse_timerange};
use crate::table::RecordTable;
use crate::validation::{validate_export, Alert, ReportMeta, Validation};
use serde::{Deserialize, Serialize};

pub const NOTHING_TO_EXPORT: &str = "Nothing to export. There are not any records in the table.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub company_id: Option<i64>,
    /// `None` for non-numeric cells
    pub value: Option<f64>,
    pub rtype_id: Option<i64>,
    pub timerange: Option<i64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub timerange: Option<i64>,
    pub timestamp: String,
    pub company_id: Option<i64>,
    pub records: Vec<ExportRecord>,
}

impl RecordTable {
    /// Records of every row with an assigned record type, row by row then
    /// column by column.
    pub fn get_data(&self, company_id: Option<i64>) -> Vec<ExportRecord> {
        let catalog = &self.schema().record_types;
        let mut records = Vec::new();

        for row in self.rows() {
            let rtype = match row.rtype() {
                Some(rtype) => rtype,
                None => continue,
            };
            let rtype_id = catalog.id_of(rtype);

            for (column, period) in self.periods().iter().enumerate() {
                let value = row.scaled(column).filter(|v| v.is_finite());
                records.push(ExportRecord {
                    company_id,
                    value,
                    rtype_id,
                    timerange: period.months(),
                    timestamp: period.timestamp_normalized(),
                });
            }
        }

        records
    }
}

impl ExportPayload {
    /// Concatenate the records of all tables, in order.
    pub fn assemble(report: &ReportMeta, company_id: Option<i64>, tables: &[&RecordTable]) -> Self {
        let records = tables
            .iter()
            .flat_map(|table| table.get_data(company_id))
            .collect();

        ExportPayload {
            timerange: parse_timerange(&report.timerange),
            timestamp: normalize_timestamp(&report.timestamp),
            company_id,
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value of the export form field.
    pub fn to_form_value(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// SUBMIT FLOW
// ============================================================================

/// Outcome of an export request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportDecision {
    /// Nothing to send, or validation found errors
    Blocked { alerts: Vec<Alert> },
    /// Only warnings; the user has to confirm
    NeedsConfirmation {
        payload: ExportPayload,
        alerts: Vec<Alert>,
    },
    Ready { payload: ExportPayload },
}

impl ExportDecision {
    pub fn payload(&self) -> Option<&ExportPayload> {
        match self {
            ExportDecision::Blocked { .. } => None,
            ExportDecision::NeedsConfirmation { payload, .. } | ExportDecision::Ready { payload } => {
                Some(payload)
            }
        }
    }

    pub fn alerts(&self) -> &[Alert] {
        match self {
            ExportDecision::Blocked { alerts } | ExportDecision::NeedsConfirmation { alerts, .. } => {
                alerts
            }
            ExportDecision::Ready { .. } => &[],
        }
    }
}

/// Assemble the payload and gate it on validation.
pub fn prepare_export(
    tables: &[(&str, &RecordTable)],
    company_id: Option<i64>,
    report: &ReportMeta,
    report_disabled: bool,
) -> ExportDecision {
    let plain: Vec<&RecordTable> = tables.iter().map(|(_, table)| *table).collect();
    let payload = ExportPayload::assemble(report, company_id, &plain);

    if payload.is_empty() {
        log::info!("export blocked: no records");
        return ExportDecision::Blocked {
            alerts: vec![Alert::error(NOTHING_TO_EXPORT)],
        };
    }

    let Validation { result, alerts } = validate_export(tables, company_id, report, report_disabled);

    if !result {
        log::info!("export blocked: {} alerts", alerts.len());
        ExportDecision::Blocked { alerts }
    } else if !alerts.is_empty() {
        ExportDecision::NeedsConfirmation { payload, alerts }
    } else {
        log::info!("export ready: {} records", payload.records.len());
        ExportDecision::Ready { payload }
    }
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
                RecordType::new(3, "BLS#TOTALASSETS"),
                RecordType::new(4, "BLS#FIXEDASSETS"),
            ]),
            UnitCatalog::with_defaults(),
            FormulaSet::new(),
        );
        RecordTable::new(schema.shared())
    }

    #[test]
    fn test_single_record_export() {
        let mut table = table();
        table.add_column(Some(PeriodSpec::months(3, "2020-06")));
        table.add_row(Some(
            RowData::new("BLS#TOTALASSETS")
                .with_unit(1000)
                .with_values(["5"]),
        ));

        let records = table.get_data(Some(7));

        assert_eq!(
            records,
            vec![ExportRecord {
                company_id: Some(7),
                value: Some(5000.0),
                rtype_id: Some(3),
                timerange: Some(3),
                timestamp: "2020-06-30".to_string(),
            }]
        );
    }

    #[test]
    fn test_unassigned_rows_are_skipped() {
        let mut table = table();
        table.add_column(None);
        table.add_column(None);
        table.add_row(None);
        table.add_row(Some(RowData::new("BLS#FIXEDASSETS")));

        let records = table.get_data(None);

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.rtype_id == Some(4)));
        assert_eq!(records[0].timestamp, "0001-01-31");
    }

    #[test]
    fn test_unknown_rtype_and_bad_values_export_as_null() {
        let mut table = table();
        table.add_column(Some(PeriodSpec::new("none", "2021-03-15")));
        table.add_row(Some(RowData::new("BLS#GOODWILL").with_values(["n/a"])));

        let record = &table.get_data(Some(1))[0];

        assert_eq!(record.rtype_id, None);
        assert_eq!(record.value, None);
        assert_eq!(record.timerange, None);
        assert_eq!(record.timestamp, "2021-03-31");

        let json = serde_json::to_value(record).unwrap();
        assert!(json["value"].is_null());
    }

    #[test]
    fn test_payload_concatenates_tables() {
        let mut first = table();
        first.add_column(Some(PeriodSpec::months(12, "2020-12")));
        first.add_row(Some(RowData::new("BLS#TOTALASSETS").with_values(["1"])));
        let mut second = table();
        second.add_column(Some(PeriodSpec::months(12, "2020-12")));
        second.add_row(Some(RowData::new("BLS#FIXEDASSETS").with_values(["2"])));

        let payload = ExportPayload::assemble(&ReportMeta::new("12", "2020-12"), Some(7), &[&first, &second]);

        assert_eq!(payload.timerange, Some(12));
        assert_eq!(payload.timestamp, "2020-12-31");
        let ids: Vec<Option<i64>> = payload.records.iter().map(|r| r.rtype_id).collect();
        assert_eq!(ids, vec![Some(3), Some(4)]);

        let form = payload.to_form_value().unwrap();
        assert!(form.contains("\"company_id\":7"));
    }

    #[test]
    fn test_nothing_to_export() {
        let mut table = table();
        table.add_row(Some(RowData::new("BLS#TOTALASSETS")));

        let decision = prepare_export(&[("records", &table)], Some(7), &ReportMeta::default(), true);

        assert_eq!(
            decision,
            ExportDecision::Blocked {
                alerts: vec![Alert::error(NOTHING_TO_EXPORT)]
            }
        );
    }

    #[test]
    fn test_export_decisions() {
        let mut table = table();
        table.add_column(Some(PeriodSpec::months(3, "2020-06")));
        table.add_row(Some(RowData::new("BLS#TOTALASSETS").with_values(["5"])));
        let report = ReportMeta::new("3", "2020-06");

        let ready = prepare_export(&[("records", &table)], Some(7), &report, false);
        assert!(matches!(ready, ExportDecision::Ready { .. }));
        assert!(ready.alerts().is_empty());

        let warned = prepare_export(&[("records", &table)], Some(7), &ReportMeta::default(), false);
        assert!(matches!(warned, ExportDecision::NeedsConfirmation { .. }));
        assert_eq!(warned.payload().unwrap().records.len(), 1);

        let blocked = prepare_export(&[("records", &table)], None, &report, false);
        assert!(blocked.payload().is_none());
        assert_eq!(blocked.alerts(), &[Alert::error("Company not identified")]);
    }
}
