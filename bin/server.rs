// rtab - Web Server
// REST API over the record tables of a data-entry session

use anyhow::{Context, Result};
use rtab::config::Settings;
use rtab::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌐 rtab - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let settings = Settings::from_env()?;

    if !settings.schema_path.exists() {
        eprintln!("❌ Schema not found at {:?}", settings.schema_path);
        eprintln!("   Set RTAB_SCHEMA to a schema JSON file.");
        std::process::exit(1);
    }

    let schema = settings.load_schema()?;
    println!(
        "✓ Schema loaded: {} record types, {} formulas",
        schema.record_types.len(),
        schema.formulas.len()
    );

    let app = router(AppState::new(schema.shared(), settings.company_id));

    let listener = tokio::net::TcpListener::bind(&settings.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.addr))?;

    println!("\n🚀 Server running on http://{}", settings.addr);
    println!("   API: http://{}/api/rtypes?fields=name", settings.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
