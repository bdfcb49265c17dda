// 📥 Import - seed record tables from forms, parser output and CSV
//
// CSV layout (one table per file):
//
//   rtype,uom,calculable,3 months ended on 2020-06,12 months ended on 2020-12
//   BLS#TOTALASSETS,1000,true,150,400
//   BLS#FIXEDASSETS,1000,false,90,250

use crate::catalog::{RecordTypeCatalog, Statement};
use crate::cell::Cell;
use crate::error::{self, TableError};
use crate::period::PeriodSpec;
use crate::schema::TableSchema;
use crate::table::{RecordTable, RowData, RowId, DEFAULT_UNIT};
use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Placeholder option of the record-type select.
pub const NONE_RTYPE: &str = "NONE";

const FIXED_COLUMNS: [&str; 3] = ["rtype", "uom", "calculable"];

// ============================================================================
// RECORD FORM
// ============================================================================

fn default_uom() -> i64 {
    DEFAULT_UNIT
}

/// One record as entered in the "add record" form or returned by the
/// text parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordForm {
    pub rtype: String,
    #[serde(default)]
    pub statement: Option<Statement>,
    #[serde(default = "default_uom")]
    pub uom: i64,
    #[serde(default)]
    pub values: Vec<String>,
}

impl RecordForm {
    pub fn new(rtype: impl Into<String>, uom: i64, values: Vec<String>) -> Self {
        RecordForm {
            rtype: rtype.into(),
            statement: None,
            uom,
            values,
        }
    }

    fn is_unselected(&self) -> bool {
        let rtype = self.rtype.trim();
        rtype.is_empty() || rtype == NONE_RTYPE
    }
}

impl RecordTable {
    /// Append a populated row, widening the table first when the form
    /// carries more values than there are columns.
    pub fn add_record(&mut self, form: &RecordForm) -> error::Result<RowId> {
        self.check_record(form)?;

        if let (Some(given), Some(known)) = (
            form.statement,
            self.schema().record_types.statement_of(form.rtype.trim()),
        ) {
            if given != known {
                log::warn!(
                    "{} belongs to {}, form says {}",
                    form.rtype,
                    known.as_str(),
                    given.as_str()
                );
            }
        }

        while self.column_count() < form.values.len() {
            self.add_column(None);
        }

        let data = RowData::new(form.rtype.trim())
            .with_unit(form.uom)
            .with_values(form.values.iter().cloned());
        Ok(self.add_row(Some(data)))
    }

    fn check_record(&self, form: &RecordForm) -> error::Result<()> {
        if form.is_unselected() {
            return Err(TableError::NoItemSelected);
        }
        self.check_unit(form.uom)
    }

    /// Add every parsed record; returns the ids in input order. Nothing is
    /// added unless every form is valid.
    pub fn add_records(&mut self, forms: &[RecordForm]) -> error::Result<Vec<RowId>> {
        for form in forms {
            self.check_record(form)?;
        }
        let ids = forms
            .iter()
            .map(|form| self.add_record(form))
            .collect::<error::Result<Vec<_>>>()?;
        log::info!("added {} records", ids.len());
        Ok(ids)
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Body of the text-parser request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParserRequest {
    pub text: String,
    #[serde(default)]
    pub spec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeName {
    pub name: String,
}

/// `GET /api/rtypes?fields=name` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeList {
    pub results: Vec<RecordTypeName>,
}

impl RecordTypeList {
    pub fn from_catalog(catalog: &RecordTypeCatalog) -> Self {
        RecordTypeList {
            results: catalog
                .iter()
                .map(|rtype| RecordTypeName {
                    name: rtype.name.clone(),
                })
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }
}

// ============================================================================
// CSV
// ============================================================================

fn parse_flag(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Build a table from CSV text.
pub fn read_csv(schema: Arc<TableSchema>, input: &str) -> Result<RecordTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let fixed: Vec<&str> = headers.iter().take(FIXED_COLUMNS.len()).map(str::trim).collect();
    if fixed != FIXED_COLUMNS {
        bail!(
            "Expected CSV header to start with {}, found {:?}",
            FIXED_COLUMNS.join(","),
            fixed
        );
    }

    let mut table = RecordTable::new(schema);
    for label in headers.iter().skip(FIXED_COLUMNS.len()) {
        let spec = PeriodSpec::parse_header(label)
            .with_context(|| format!("Invalid period header: {:?}", label))?;
        table.add_column(Some(spec));
    }

    let mut calculable = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;

        if record.iter().all(|field| field.trim().is_empty()) {
            log::warn!("skipping empty CSV line {}", line_num + 2);
            continue;
        }

        let rtype = record.get(0).unwrap_or("").trim();
        let uom_text = record.get(1).unwrap_or("").trim();
        let unit = match uom_text.parse::<i64>() {
            Ok(unit) if table.check_unit(unit).is_ok() => unit,
            Ok(unit) => {
                log::warn!(
                    "line {}: unit {} is not in the unit catalog, using {}",
                    line_num + 2,
                    unit,
                    DEFAULT_UNIT
                );
                DEFAULT_UNIT
            }
            Err(_) => {
                log::warn!(
                    "line {}: unit {:?} is not a number, using {}",
                    line_num + 2,
                    uom_text,
                    DEFAULT_UNIT
                );
                DEFAULT_UNIT
            }
        };

        let data = RowData {
            rtype: Some(rtype.to_string()),
            unit: Some(unit),
            values: record
                .iter()
                .skip(FIXED_COLUMNS.len())
                .map(str::to_string)
                .collect(),
        };
        let id = table.add_row(Some(data));

        if parse_flag(record.get(2).unwrap_or("")) {
            calculable.push((id, line_num + 2));
        }
    }

    // flags can only be checked once every component row exists
    for (id, line) in calculable {
        if let Err(err) = table.set_calculable(id, true) {
            log::warn!("line {}: calculable flag dropped: {}", line, err);
        }
    }

    log::info!(
        "loaded table: {} rows, {} columns",
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

pub fn read_csv_file<P: AsRef<Path>>(schema: Arc<TableSchema>, path: P) -> Result<RecordTable> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read table file: {:?}", path.as_ref()))?;

    read_csv(schema, &content).with_context(|| format!("Invalid table file: {:?}", path.as_ref()))
}

/// Render a table as CSV text.
pub fn write_csv(table: &RecordTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|s| s.to_string()).collect();
    header.extend(table.periods().iter().map(|period| period.label()));
    writer.write_record(&header)?;

    for row in table.rows() {
        let mut record = vec![
            row.rtype().unwrap_or("").to_string(),
            row.unit.to_string(),
            row.calculable.to_string(),
        ];
        record.extend(row.values.iter().map(|cell| cell.get().to_string()));
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().context("Failed to flush CSV output")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

pub fn write_csv_file<P: AsRef<Path>>(table: &RecordTable, path: P) -> Result<()> {
    let content = write_csv(table)?;
    fs::write(path.as_ref(), content)
        .with_context(|| format!("Failed to write table file: {:?}", path.as_ref()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecordType;
    use crate::catalog::UnitCatalog;
    use crate::formula::{Component, Formula, FormulaSet};
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<TableSchema> {
        TableSchema::new(
            RecordTypeCatalog::from_types(vec![
                RecordType::with_statement(1, "BLS#TOTALASSETS", Statement::Bls),
                RecordType::with_statement(2, "BLS#FIXEDASSETS", Statement::Bls),
                RecordType::with_statement(3, "BLS#CURRENTASSETS", Statement::Bls),
            ]),
            UnitCatalog::with_defaults(),
            FormulaSet::from_formulas(vec![Formula::new(
                "BLS#TOTALASSETS",
                vec![
                    Component::plus("BLS#FIXEDASSETS"),
                    Component::plus("BLS#CURRENTASSETS"),
                ],
            )]),
        )
        .shared()
    }

    const CSV: &str = "\
rtype,uom,calculable,3 months ended on 2020-06,12 months ended on 2020-12
BLS#TOTALASSETS,1000,true,150,400
BLS#FIXEDASSETS,1000,false,90,250
BLS#CURRENTASSETS,1000,false,60,150
";

    #[test]
    fn test_record_form_widens_table() {
        let mut table = RecordTable::new(schema());
        table.add_column(None);
        let other = table.add_row(Some(RowData::new("BLS#FIXEDASSETS")));

        let form = RecordForm::new(
            "BLS#TOTALASSETS",
            1000,
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
        );
        let id = table.add_record(&form).unwrap();

        assert_eq!(table.column_count(), 3);
        let row = table.row(id).unwrap();
        assert_eq!(row.unit, 1000);
        assert_eq!(row.raw(2), Some("3"));
        assert_eq!(table.row(other).unwrap().values.len(), 3);
    }

    #[test]
    fn test_record_form_requires_selection() {
        let mut table = RecordTable::new(schema());
        let form = RecordForm::new(NONE_RTYPE, 1, vec![]);

        assert_eq!(table.add_record(&form), Err(TableError::NoItemSelected));
        assert!(table.is_empty());
    }

    #[test]
    fn test_bad_form_leaves_table_untouched() {
        let mut table = RecordTable::new(schema());
        let forms = vec![
            RecordForm::new(
                "BLS#FIXEDASSETS",
                1,
                vec!["1".to_string(), "2".to_string(), "3".to_string()],
            ),
            RecordForm::new(NONE_RTYPE, 1, vec![]),
        ];

        assert_eq!(table.add_records(&forms), Err(TableError::NoItemSelected));
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.column_count(), 0);
    }

    #[test]
    fn test_record_form_unit_must_be_in_catalog() {
        let mut table = RecordTable::new(schema());
        table.add_column(None);
        let form = RecordForm::new("BLS#TOTALASSETS", 0, vec!["5".to_string()]);

        assert_eq!(table.add_record(&form), Err(TableError::UnknownUnit(0)));

        let forms = vec![
            RecordForm::new("BLS#FIXEDASSETS", 1000, vec!["5".to_string()]),
            RecordForm::new("BLS#CURRENTASSETS", -5, vec!["2".to_string(), "3".to_string()]),
        ];
        assert_eq!(table.add_records(&forms), Err(TableError::UnknownUnit(-5)));
        assert!(table.is_empty());
        assert_eq!(table.column_count(), 1);
    }

    #[test]
    fn test_record_form_from_json() {
        let json = r#"[{"rtype": "BLS#FIXEDASSETS", "statement": "BLS", "values": ["5"]}]"#;
        let forms: Vec<RecordForm> = serde_json::from_str(json).unwrap();
        assert_eq!(forms[0].uom, DEFAULT_UNIT);

        let mut table = RecordTable::new(schema());
        let ids = table.add_records(&forms).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(table.column_count(), 1);
    }

    #[test]
    fn test_rtype_list_shape() {
        let list = RecordTypeList::from_catalog(&schema().record_types);
        let json = serde_json::to_value(&list).unwrap();

        assert_eq!(json["results"][0]["name"], "BLS#TOTALASSETS");
        assert_eq!(list.names().len(), 3);
    }

    #[test]
    fn test_read_csv() {
        let table = read_csv(schema(), CSV).unwrap();

        assert_eq!(table.column_count(), 2);
        assert_eq!(table.periods()[1].months(), Some(12));
        assert_eq!(table.row_count(), 3);
        assert!(table.rows()[0].calculable);
        assert_eq!(table.rows()[2].scaled(1), Some(150_000.0));
    }

    #[test]
    fn test_read_csv_drops_impossible_calculable_flag() {
        let csv = "\
rtype,uom,calculable,3 months ended on 2020-06
BLS#TOTALASSETS,1,true,10
BLS#FIXEDASSETS,oops,false,4
,1,false,
";
        let table = read_csv(schema(), csv).unwrap();

        // BLS#CURRENTASSETS is missing, so the total cannot be calculable
        assert!(!table.rows()[0].calculable);
        assert_eq!(table.rows()[1].unit, DEFAULT_UNIT);
        assert_eq!(table.rows()[2].record_type, None);
        assert_eq!(table.rows()[2].raw(0), Some(""));
    }

    #[test]
    fn test_read_csv_unit_outside_catalog_falls_back() {
        let csv = "\
rtype,uom,calculable,3 months ended on 2020-06
BLS#FIXEDASSETS,-5,false,4
BLS#CURRENTASSETS,0,false,6
BLS#TOTALASSETS,1000000,false,1
";
        let table = read_csv(schema(), csv).unwrap();

        assert_eq!(table.rows()[0].unit, DEFAULT_UNIT);
        assert_eq!(table.rows()[1].unit, DEFAULT_UNIT);
        assert_eq!(table.rows()[2].unit, 1_000_000);
    }

    #[test]
    fn test_read_csv_rejects_bad_headers() {
        assert!(read_csv(schema(), "name,value\nA,1\n").is_err());
        assert!(read_csv(schema(), "rtype,uom,calculable,Q2 2020\n").is_err());
    }

    #[test]
    fn test_csv_write_then_read_keeps_structure() {
        let table = read_csv(schema(), CSV).unwrap();

        let text = write_csv(&table).unwrap();
        let again = read_csv(schema(), &text).unwrap();

        assert_eq!(text, CSV);
        assert_eq!(again.rows().len(), table.rows().len());
        for (a, b) in again.rows().iter().zip(table.rows()) {
            assert_eq!(a.record_type, b.record_type);
            assert_eq!(a.unit, b.unit);
            assert_eq!(a.calculable, b.calculable);
            assert_eq!(a.values, b.values);
        }
    }

    #[test]
    fn test_csv_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        let table = read_csv(schema(), CSV).unwrap();

        write_csv_file(&table, &path).unwrap();
        let loaded = read_csv_file(schema(), &path).unwrap();

        assert_eq!(loaded.row_count(), 3);
        assert!(read_csv_file(schema(), dir.path().join("missing.csv")).is_err());
    }
}
