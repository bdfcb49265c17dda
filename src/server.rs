// 🌐 HTTP API - hosts the record tables of one data-entry session
//
// Every mutation goes through the table API, so the JSON returned here is a
// projection of the model, never a second source of truth.

use crate::error::TableError;
use crate::export::{prepare_export, ExportDecision};
use crate::import::{RecordForm, RecordTypeList};
use crate::period::{Period, PeriodSpec};
use crate::schema::TableSchema;
use crate::table::{RecordTable, Row, RowData, RowId};
use crate::validation::{validate_table, ReportMeta, Validation};
use crate::catalog::RecordType;
use crate::engine::Update;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    schema: Arc<TableSchema>,
    tables: Arc<Mutex<BTreeMap<String, RecordTable>>>,
    company_id: Option<i64>,
}

impl AppState {
    pub fn new(schema: Arc<TableSchema>, company_id: Option<i64>) -> Self {
        AppState {
            schema,
            tables: Arc::new(Mutex::new(BTreeMap::new())),
            company_id,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, RecordTable>>, ApiError> {
        self.tables
            .lock()
            .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Session state poisoned"))
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        let status = match err {
            TableError::UnknownRow(_) | TableError::UnknownColumnId(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::warn!("{}: {}", self.status, self.message);
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Serialize)]
pub struct TableView {
    name: String,
    periods: Vec<Period>,
    rows: Vec<Row>,
}

impl TableView {
    fn of(name: &str, table: &RecordTable) -> Self {
        TableView {
            name: name.to_string(),
            periods: table.periods().to_vec(),
            rows: table.rows().to_vec(),
        }
    }
}

#[derive(Serialize)]
pub struct RowUpdate {
    row: Row,
    updates: Vec<Update>,
}

// ============================================================================
// REQUEST BODIES
// ============================================================================

#[derive(Deserialize)]
pub struct RtypesQuery {
    fields: Option<String>,
}

#[derive(Deserialize)]
pub struct CellBody {
    value: String,
}

#[derive(Deserialize)]
pub struct RtypeBody {
    rtype: Option<String>,
}

#[derive(Deserialize)]
pub struct UomBody {
    uom: i64,
}

#[derive(Deserialize)]
pub struct CalculableBody {
    calculable: bool,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    /// Tables to export, in order; every session table when empty
    #[serde(default)]
    tables: Vec<String>,
    #[serde(default)]
    company_id: Option<i64>,
    #[serde(default)]
    report: ReportMeta,
    #[serde(default)]
    report_disabled: bool,
}

// ============================================================================
// HELPERS
// ============================================================================

fn parse_row_id(text: &str) -> Result<RowId, ApiError> {
    RowId::parse(text).ok_or_else(|| ApiError::not_found(format!("Unknown row: {}", text)))
}

fn table_mut<'a>(
    tables: &'a mut BTreeMap<String, RecordTable>,
    name: &str,
) -> Result<&'a mut RecordTable, ApiError> {
    tables
        .get_mut(name)
        .ok_or_else(|| ApiError::not_found(format!("Unknown table: {}", name)))
}

fn row_update(table: &RecordTable, id: RowId, updates: Vec<Update>) -> ApiResult<RowUpdate> {
    let row = table.row(id).cloned().ok_or(TableError::UnknownRow(id))?;
    Ok(ApiResponse::ok(RowUpdate { row, updates }))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/rtypes?fields=name - Record type catalog
async fn list_rtypes(State(state): State<AppState>, Query(query): Query<RtypesQuery>) -> Response {
    let catalog = &state.schema.record_types;
    match query.fields.as_deref() {
        Some("name") => Json(RecordTypeList::from_catalog(catalog)).into_response(),
        _ => {
            let results: Vec<RecordType> = catalog.iter().cloned().collect();
            Json(serde_json::json!({ "results": results })).into_response()
        }
    }
}

/// GET /api/tables - Names of the session tables
async fn list_tables(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let tables = state.lock()?;
    Ok(ApiResponse::ok(tables.keys().cloned().collect()))
}

/// GET /api/tables/:table
async fn get_table(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<TableView> {
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    Ok(ApiResponse::ok(TableView::of(&name, table)))
}

/// DELETE /api/tables/:table
async fn delete_table(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<String> {
    let mut tables = state.lock()?;
    tables
        .remove(&name)
        .ok_or_else(|| ApiError::not_found(format!("Unknown table: {}", name)))?;
    log::info!("table {} dropped", name);
    Ok(ApiResponse::ok(name))
}

/// POST /api/tables/:table/rows - Append a row (creates the table on first use)
async fn add_row(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(data): Json<RowData>,
) -> ApiResult<Row> {
    if let Some(unit) = data.unit.filter(|unit| !state.schema.units.contains(*unit)) {
        return Err(TableError::UnknownUnit(unit).into());
    }
    let mut tables = state.lock()?;
    let table = tables
        .entry(name)
        .or_insert_with(|| RecordTable::new(Arc::clone(&state.schema)));
    let id = table.add_row(Some(data));
    let row = table.row(id).cloned().ok_or(TableError::UnknownRow(id))?;
    Ok(ApiResponse::ok(row))
}

/// POST /api/tables/:table/records - Append rows from record forms
async fn add_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(forms): Json<Vec<RecordForm>>,
) -> ApiResult<TableView> {
    let mut tables = state.lock()?;
    let table = tables
        .entry(name.clone())
        .or_insert_with(|| RecordTable::new(Arc::clone(&state.schema)));
    table.add_records(&forms)?;
    Ok(ApiResponse::ok(TableView::of(&name, table)))
}

/// DELETE /api/tables/:table/rows/:id
async fn remove_row(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Row> {
    let id = parse_row_id(&id)?;
    let mut tables = state.lock()?;
    let removed = table_mut(&mut tables, &name)?.remove_row(id)?;
    Ok(ApiResponse::ok(removed))
}

/// PUT /api/tables/:table/rows/:id/cells/:col - Edit a value and propagate
async fn edit_cell(
    State(state): State<AppState>,
    Path((name, id, column)): Path<(String, String, usize)>,
    Json(body): Json<CellBody>,
) -> ApiResult<RowUpdate> {
    let id = parse_row_id(&id)?;
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    let updates = table.edit_cell(id, column, &body.value)?;
    row_update(table, id, updates)
}

/// PUT /api/tables/:table/rows/:id/rtype
async fn set_rtype(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(body): Json<RtypeBody>,
) -> ApiResult<RowUpdate> {
    let id = parse_row_id(&id)?;
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    table.set_record_type(id, body.rtype.as_deref())?;
    row_update(table, id, Vec::new())
}

/// PUT /api/tables/:table/rows/:id/uom - Change unit and propagate
async fn set_uom(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(body): Json<UomBody>,
) -> ApiResult<RowUpdate> {
    let id = parse_row_id(&id)?;
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    let updates = table.change_unit(id, body.uom)?;
    row_update(table, id, updates)
}

/// PUT /api/tables/:table/rows/:id/calculable
async fn set_calculable(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(body): Json<CalculableBody>,
) -> ApiResult<RowUpdate> {
    let id = parse_row_id(&id)?;
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    let updates = if body.calculable {
        table.mark_calculable(id)?
    } else {
        table.set_calculable(id, false)?;
        Vec::new()
    };
    row_update(table, id, updates)
}

/// GET /api/tables/:table/rtypes/:name - Rows carrying a record type
async fn rows_of(
    State(state): State<AppState>,
    Path((name, rtype)): Path<(String, String)>,
) -> ApiResult<Vec<Row>> {
    // record type names contain '#', which clients send percent-encoded
    let decoded = urlencoding::decode(&rtype)
        .unwrap_or_else(|_| rtype.clone().into())
        .into_owned();

    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    Ok(ApiResponse::ok(
        table.rows_of(&decoded).into_iter().cloned().collect(),
    ))
}

/// POST /api/tables/:table/columns - Append a period column
async fn add_column(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(spec): Json<PeriodSpec>,
) -> ApiResult<TableView> {
    let mut tables = state.lock()?;
    let table = tables
        .entry(name.clone())
        .or_insert_with(|| RecordTable::new(Arc::clone(&state.schema)));
    table.add_column(Some(spec));
    Ok(ApiResponse::ok(TableView::of(&name, table)))
}

/// PUT /api/tables/:table/columns/:index - Edit a period header
async fn set_column(
    State(state): State<AppState>,
    Path((name, index)): Path<(String, usize)>,
    Json(spec): Json<PeriodSpec>,
) -> ApiResult<Period> {
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    table.set_period(index, &spec)?;
    Ok(ApiResponse::ok(table.periods()[index].clone()))
}

/// DELETE /api/tables/:table/columns/:index
async fn remove_column(
    State(state): State<AppState>,
    Path((name, index)): Path<(String, usize)>,
) -> ApiResult<Period> {
    let mut tables = state.lock()?;
    let removed = table_mut(&mut tables, &name)?.remove_column(index)?;
    Ok(ApiResponse::ok(removed))
}

/// GET /api/tables/:table/validation
async fn validate(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Validation> {
    let mut tables = state.lock()?;
    let table = table_mut(&mut tables, &name)?;
    Ok(ApiResponse::ok(validate_table(table, None)))
}

/// POST /api/export - Validate and assemble the upload payload
async fn export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<ExportDecision> {
    let tables = state.lock()?;

    let names: Vec<String> = if request.tables.is_empty() {
        tables.keys().cloned().collect()
    } else {
        request.tables.clone()
    };

    let mut selected = Vec::new();
    for name in &names {
        let table = tables
            .get(name)
            .ok_or_else(|| ApiError::not_found(format!("Unknown table: {}", name)))?;
        selected.push((name.as_str(), table));
    }

    let company_id = request.company_id.or(state.company_id);
    let decision = prepare_export(&selected, company_id, &request.report, request.report_disabled);
    Ok(ApiResponse::ok(decision))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/rtypes", get(list_rtypes))
        .route("/tables", get(list_tables))
        .route("/tables/:table", get(get_table).delete(delete_table))
        .route("/tables/:table/rows", post(add_row))
        .route("/tables/:table/records", post(add_records))
        .route("/tables/:table/rows/:id", delete(remove_row))
        .route("/tables/:table/rows/:id/cells/:col", put(edit_cell))
        .route("/tables/:table/rows/:id/rtype", put(set_rtype))
        .route("/tables/:table/rows/:id/uom", put(set_uom))
        .route("/tables/:table/rows/:id/calculable", put(set_calculable))
        .route("/tables/:table/rtypes/:name", get(rows_of))
        .route("/tables/:table/columns", post(add_column))
        .route(
            "/tables/:table/columns/:index",
            put(set_column).delete(remove_column),
        )
        .route("/tables/:table/validation", get(validate))
        .route("/export", post(export))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================
