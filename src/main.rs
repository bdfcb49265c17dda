// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use rtab::config::Settings;
use rtab::export::{prepare_export, ExportDecision};
use rtab::import::{read_csv_file, write_csv, write_csv_file, RecordTypeList};
use rtab::validation::{validate_export, ReportMeta, Severity};
use rtab::{RecordTable, TableSchema};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const USAGE: &str = "\
Usage: rtab <command> [args]

Commands:
  show <table.csv>                    Print a table
  validate <table.csv>...             Check tables before export
  recalc <table.csv> [-o <out.csv>]   Recompute calculable rows
  export <table.csv>... [--company <id>] [--report <months> <YYYY-MM>] [--yes]
                                      Print the upload payload as JSON
  rtypes                              Print the record-type catalog
  tui [table.csv]                     Interactive editor (default)

Environment: RTAB_SCHEMA (schema JSON), RTAB_COMPANY (company id)";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let settings = Settings::from_env()?;

    match args.first().map(String::as_str) {
        Some("show") => run_show(&settings, &args[1..]),
        Some("validate") => run_validate(&settings, &args[1..]),
        Some("recalc") => run_recalc(&settings, &args[1..]),
        Some("export") => run_export(&settings, &args[1..]),
        Some("rtypes") => run_rtypes(&settings),
        Some("tui") => run_ui_mode(&settings, args.get(1).map(PathBuf::from)),
        None => run_ui_mode(&settings, None),
        Some("help") | Some("--help") | Some("-h") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => {
            eprintln!("❌ Unknown command: {}\n", other);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn load_schema(settings: &Settings) -> Result<Arc<TableSchema>> {
    Ok(settings.load_schema()?.shared())
}

fn load_tables(schema: &Arc<TableSchema>, paths: &[String]) -> Result<Vec<(String, RecordTable)>> {
    if paths.is_empty() {
        bail!("No table files given\n\n{}", USAGE);
    }
    paths
        .iter()
        .map(|path| {
            let table = read_csv_file(Arc::clone(schema), path)?;
            Ok((table_name(path), table))
        })
        .collect()
}

fn table_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

fn run_show(settings: &Settings, args: &[String]) -> Result<()> {
    let schema = load_schema(settings)?;
    for (name, table) in load_tables(&schema, args)? {
        println!("📊 {} ({} rows × {} periods)", name, table.row_count(), table.column_count());
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        print!("{}", write_csv(&table)?);
        println!();
    }
    Ok(())
}

fn run_validate(settings: &Settings, args: &[String]) -> Result<()> {
    let schema = load_schema(settings)?;
    let tables = load_tables(&schema, args)?;
    let refs: Vec<(&str, &RecordTable)> = tables.iter().map(|(n, t)| (n.as_str(), t)).collect();

    println!("🔍 Validating {} table(s)...", refs.len());
    let validation = validate_export(&refs, settings.company_id, &ReportMeta::default(), true);

    for alert in &validation.alerts {
        match alert.severity {
            Severity::Error => println!("  ❌ {}", alert.message),
            Severity::Warning => println!("  ⚠️  {}", alert.message),
        }
    }
    println!("\n{}", validation.summary());

    if !validation.result {
        std::process::exit(1);
    }
    Ok(())
}

fn run_recalc(settings: &Settings, args: &[String]) -> Result<()> {
    let (input, output) = match args {
        [input] => (input.clone(), None),
        [input, flag, output] if flag == "-o" => (input.clone(), Some(output.clone())),
        _ => bail!("Usage: rtab recalc <table.csv> [-o <out.csv>]"),
    };

    let schema = load_schema(settings)?;
    let mut table = read_csv_file(schema, &input)?;
    let updates = table.recalculate_all()?;

    match output {
        Some(path) => {
            write_csv_file(&table, &path)?;
            println!("✓ {} cells recomputed, written to {}", updates.len(), path);
        }
        None => print!("{}", write_csv(&table)?),
    }
    Ok(())
}

struct ExportArgs {
    files: Vec<String>,
    company_id: Option<i64>,
    report: Option<ReportMeta>,
    confirmed: bool,
}

fn parse_export_args(settings: &Settings, args: &[String]) -> Result<ExportArgs> {
    let mut parsed = ExportArgs {
        files: Vec::new(),
        company_id: settings.company_id,
        report: None,
        confirmed: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--company" => {
                let id = iter.next().context("--company needs a value")?;
                parsed.company_id = Some(id.parse().with_context(|| format!("Invalid company id: {}", id))?);
            }
            "--report" => {
                let timerange = iter.next().context("--report needs <months> <YYYY-MM>")?;
                let timestamp = iter.next().context("--report needs <months> <YYYY-MM>")?;
                parsed.report = Some(ReportMeta::new(timerange.as_str(), timestamp.as_str()));
            }
            "--yes" | "-y" => parsed.confirmed = true,
            _ => parsed.files.push(arg.clone()),
        }
    }
    Ok(parsed)
}

fn run_export(settings: &Settings, args: &[String]) -> Result<()> {
    let args = parse_export_args(settings, args)?;
    let schema = load_schema(settings)?;
    let tables = load_tables(&schema, &args.files)?;
    let refs: Vec<(&str, &RecordTable)> = tables.iter().map(|(n, t)| (n.as_str(), t)).collect();

    let report_disabled = args.report.is_none();
    let report = args.report.unwrap_or_default();

    let payload = match prepare_export(&refs, args.company_id, &report, report_disabled) {
        ExportDecision::Blocked { alerts } => {
            eprintln!("❌ Export blocked:");
            for alert in alerts {
                eprintln!("   {}", alert.message);
            }
            std::process::exit(1);
        }
        ExportDecision::NeedsConfirmation { payload, alerts } => {
            eprintln!("⚠️  Validation warnings:");
            for alert in &alerts {
                eprintln!("   {}", alert.message);
            }
            if !args.confirmed {
                eprintln!("\n   Re-run with --yes to export anyway.");
                std::process::exit(2);
            }
            payload
        }
        ExportDecision::Ready { payload } => payload,
    };

    println!("{}", payload.to_form_value()?);
    Ok(())
}

fn run_rtypes(settings: &Settings) -> Result<()> {
    let schema = load_schema(settings)?;
    let list = RecordTypeList::from_catalog(&schema.record_types);
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(settings: &Settings, path: Option<PathBuf>) -> Result<()> {
    println!("🖥️  Loading rtab editor...\n");

    let schema = load_schema(settings)?;
    let table = match &path {
        Some(path) if path.exists() => read_csv_file(schema, path)?,
        _ => RecordTable::new(schema),
    };

    println!("✓ Loaded {} records\n", table.row_count());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(table, path);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_settings: &Settings, _path: Option<PathBuf>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin rtab-server --features server");
    std::process::exit(1);
}
