#![cfg(feature = "web")]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::aggregate::CompanyFilter;
use crate::cell::sanitize_input;
use crate::config::Config;
use crate::downloader::{self, Workbook};
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::login::{AdminGate, Privilege};
use crate::meta::Metadata;
use crate::period::{Granularity, Period};
use crate::remote::{ContentsTransport, EndpointTransport, MirrorTransport, RemoteMirror};
use crate::rows::{DropSide, RowKey};
use crate::schema::NewColumn;
use crate::section::{self, UnitKind};
use crate::storage::FileStore;

const SESSION_COOKIE: &str = "session";

pub struct AppState {
    ledger: Mutex<Ledger>,
    gate: AdminGate,
    mirror: Option<Arc<RemoteMirror>>,
    writer: Option<Arc<dyn MirrorTransport>>,
}

impl AppState {
    /// `mirror` mirrors the cell store after edits; `writer` backs the
    /// single-file update endpoint.
    pub fn new(
        ledger: Ledger,
        gate: AdminGate,
        mirror: Option<Arc<RemoteMirror>>,
        writer: Option<Arc<dyn MirrorTransport>>,
    ) -> Self {
        AppState {
            ledger: Mutex::new(ledger),
            gate,
            mirror,
            writer,
        }
    }

    /// Lock the ledger, picking up changes other processes made to the store.
    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| LedgerError::Storage("ledger lock poisoned".to_string()))?;
        ledger.refresh_external();
        Ok(ledger)
    }

    fn privilege(&self, jar: &CookieJar) -> Result<Privilege> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.gate.privilege_for(cookie.value()))
            .ok_or(LedgerError::ReadOnly)
    }

    fn push_in_background(&self, blob: Value) {
        if let Some(mirror) = &self.mirror {
            mirror.spawn_push(blob);
        }
    }
}

/// Replace local data with the remote blob. Failures leave local data as is.
async fn fetch_remote(state: &AppState) -> Result<()> {
    let mirror = match &state.mirror {
        Some(mirror) => Arc::clone(mirror),
        None => return Ok(()),
    };
    let blob = mirror.fetch().await?;
    state.ledger()?.apply_remote(&blob)?;
    log::info!("local data replaced from remote mirror");
    Ok(())
}

fn spawn_fetch(state: Arc<AppState>) {
    if state.mirror.is_none() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = fetch_remote(&state).await {
            log::warn!("keeping local data: {}", e);
        }
    });
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/meta", get(get_meta).put(put_meta))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/sections", get(list_sections))
        .route("/api/sections/:id", get(get_section))
        .route("/api/sections/:id/columns", post(add_column))
        .route("/api/sections/:id/columns/reorder", post(reorder_column))
        .route("/api/sections/:id/columns/:column", delete(delete_column))
        .route("/api/sections/:id/rows", post(add_row))
        .route("/api/sections/:id/rows/reorder", post(reorder_row))
        .route("/api/sections/:id/rows/:row", delete(delete_row))
        .route("/api/cell", post(update_cell))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/sync", get(sync_status))
        .route("/api/sync/push", post(sync_push))
        .route("/api/sync/fetch", post(sync_fetch))
        .route("/api/export/monthly", get(export_monthly))
        .route("/api/export/yearly", get(export_yearly))
        .route("/api/saveData", post(save_data))
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let sections = match &config.sections_file {
        Some(path) => section::load_sections(path)?,
        None => section::reference_sections(),
    };
    let store = FileStore::open(&config.data_file);
    let ledger = Ledger::open(Box::new(store), sections);

    let gate = AdminGate::new(config.admin_password.as_deref())?;
    if !gate.is_configured() {
        log::warn!("no admin password configured; running read-only");
    }

    let contents: Option<Arc<dyn MirrorTransport>> =
        match (&config.contents_target, &config.github_token) {
            (Some(target), Some(token)) => {
                Some(Arc::new(ContentsTransport::new(target.clone(), token.clone())))
            }
            _ => None,
        };
    let mirror_transport: Option<Arc<dyn MirrorTransport>> = match &config.remote_url {
        Some(url) => Some(Arc::new(EndpointTransport::new(url.clone(), config.save_url.clone()))),
        None => contents.clone(),
    };
    let mirror = mirror_transport.map(|t| Arc::new(RemoteMirror::new(t, config.retry)));

    let state = Arc::new(AppState::new(ledger, gate, mirror, contents));
    spawn_fetch(Arc::clone(&state));

    let app = router(state).fallback_service(ServeDir::new(&config.static_dir));

    let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
    log::info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ---- request bodies ----

#[derive(Deserialize)]
struct PeriodQuery {
    year: i32,
    month: u32,
}

impl PeriodQuery {
    fn period(&self) -> Result<Period> {
        Period::new(self.year, self.month)
    }
}

#[derive(Deserialize)]
struct MetaUpdate {
    year: Option<i32>,
    month: Option<u32>,
    active: Option<String>,
    period: Option<Granularity>,
}

#[derive(Deserialize)]
struct DashboardQuery {
    company: Option<String>,
}

#[derive(Deserialize)]
struct CellUpdate {
    year: i32,
    month: u32,
    section: String,
    row: String,
    column: String,
    value: String,
}

#[derive(Serialize)]
struct CellResponse {
    status: String,
    value: String,
}

#[derive(Deserialize)]
struct AddColumnRequest {
    year: i32,
    month: u32,
    label: String,
    #[serde(default)]
    unit: UnitKind,
    company: Option<String>,
}

#[derive(Deserialize)]
struct ReorderColumnRequest {
    year: i32,
    month: u32,
    source: String,
    target: String,
}

#[derive(Deserialize)]
struct AddRowRequest {
    year: i32,
    month: u32,
    label: String,
}

#[derive(Deserialize)]
struct ReorderRowRequest {
    year: i32,
    month: u32,
    source: String,
    target: String,
    #[serde(default)]
    side: DropSide,
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

#[derive(Deserialize)]
struct ExportQuery {
    year: i32,
    month: Option<u32>,
    company: Option<String>,
}

#[derive(Deserialize)]
struct SaveDataRequest {
    content: Value,
}

// ---- handlers ----

async fn get_meta(State(state): State<Arc<AppState>>) -> Result<Json<Metadata>> {
    Ok(Json(state.ledger()?.meta().clone()))
}

async fn put_meta(
    State(state): State<Arc<AppState>>,
    Json(update): Json<MetaUpdate>,
) -> Result<Json<Metadata>> {
    let (meta, period_changed) = {
        let mut ledger = state.ledger()?;
        let current = ledger.meta().period();
        let period = Period::new(
            update.year.unwrap_or(current.year),
            update.month.unwrap_or(current.month),
        )?;
        if let Some(active) = &update.active {
            ledger.set_active(active)?;
        }
        if let Some(granularity) = update.period {
            ledger.set_granularity(granularity);
        }
        ledger.set_period(period);
        (ledger.meta().clone(), period != current)
    };

    if period_changed {
        spawn_fetch(Arc::clone(&state));
    }
    Ok(Json(meta))
}

async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response> {
    let filter = CompanyFilter::parse(query.company.as_deref());
    let dashboard = state.ledger()?.dashboard(&filter)?;
    Ok(Json(dashboard.as_ref().clone()).into_response())
}

async fn list_sections(State(state): State<Arc<AppState>>) -> Result<Response> {
    let sections = state.ledger()?.sections().to_vec();
    Ok(Json(sections).into_response())
}

async fn get_section(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response> {
    let period = query.period()?;
    let view = state.ledger()?.section_view(&id, period)?;
    Ok(Json(view).into_response())
}

async fn update_cell(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<CellUpdate>,
) -> Result<Json<CellResponse>> {
    let privilege = state.privilege(&jar)?;
    let period = Period::new(payload.year, payload.month)?;
    let row = RowKey::parse(&payload.row)
        .ok_or_else(|| LedgerError::RowNotFound(payload.row.clone()))?;
    let value = sanitize_input(&payload.value);

    let blob = {
        let mut ledger = state.ledger()?;
        let snapshot = ledger.set_cell(
            &privilege,
            period,
            &payload.section,
            &row,
            &payload.column,
            &value,
        )?;
        snapshot.to_json()
    };
    state.push_in_background(blob);

    Ok(Json(CellResponse {
        status: "ok".to_string(),
        value,
    }))
}

async fn add_column(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
    Json(request): Json<AddColumnRequest>,
) -> Result<Response> {
    let privilege = state.privilege(&jar)?;
    let period = Period::new(request.year, request.month)?;
    let column = state.ledger()?.add_column(
        &privilege,
        &id,
        period,
        NewColumn {
            label: request.label,
            unit: request.unit,
            company: request.company,
        },
    )?;
    Ok((StatusCode::CREATED, Json(column)).into_response())
}

async fn delete_column(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path((id, column)): Path<(String, String)>,
    Query(query): Query<PeriodQuery>,
) -> Result<StatusCode> {
    let privilege = state.privilege(&jar)?;
    let period = query.period()?;
    state.ledger()?.delete_column(&privilege, &id, period, &column)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_column(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
    Json(request): Json<ReorderColumnRequest>,
) -> Result<StatusCode> {
    let privilege = state.privilege(&jar)?;
    let period = Period::new(request.year, request.month)?;
    state
        .ledger()?
        .reorder_column(&privilege, &id, period, &request.source, &request.target)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_row(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
    Json(request): Json<AddRowRequest>,
) -> Result<Response> {
    let privilege = state.privilege(&jar)?;
    let period = Period::new(request.year, request.month)?;
    let row = state
        .ledger()?
        .add_row(&privilege, &id, period, &request.label)?;
    Ok((StatusCode::CREATED, Json(row)).into_response())
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path((id, row)): Path<(String, String)>,
    Query(query): Query<PeriodQuery>,
) -> Result<StatusCode> {
    let privilege = state.privilege(&jar)?;
    let period = query.period()?;
    state.ledger()?.delete_row(&privilege, &id, period, &row)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_row(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
    Json(request): Json<ReorderRowRequest>,
) -> Result<StatusCode> {
    let privilege = state.privilege(&jar)?;
    let period = Period::new(request.year, request.month)?;
    state.ledger()?.reorder_row(
        &privilege,
        &id,
        period,
        &request.source,
        &request.target,
        request.side,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Response {
    match state.gate.open_session(&request.password) {
        Some(session_id) => {
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Json(json!({ "status": "ok" }))).into_response()
        }
        None => LedgerError::ReadOnly.into_response(),
    }
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.gate.close_session(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

async fn sync_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    match &state.mirror {
        Some(mirror) => Json(serde_json::to_value(mirror.status()).unwrap_or(Value::Null)),
        None => Json(json!({ "state": "disabled" })),
    }
}

async fn sync_push(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Json<Value>> {
    state.privilege(&jar)?;
    let mirror = state
        .mirror
        .as_ref()
        .map(Arc::clone)
        .ok_or_else(|| LedgerError::Remote("no remote mirror configured".to_string()))?;
    let blob = state.ledger()?.blob();
    Ok(Json(mirror.push(&blob).await?))
}

async fn sync_fetch(State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    if state.mirror.is_none() {
        return Err(LedgerError::Remote("no remote mirror configured".to_string()));
    }
    fetch_remote(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn xlsx_response(book: &Workbook) -> Result<Response> {
    let bytes = downloader::to_xlsx(book)?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", book.file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn export_monthly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let month = query
        .month
        .ok_or_else(|| LedgerError::InvalidInput("month is required".to_string()))?;
    let period = Period::new(query.year, month)?;
    let filter = CompanyFilter::parse(query.company.as_deref());
    let book = state.ledger()?.export_monthly(period, &filter)?;
    xlsx_response(&book)
}

async fn export_yearly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let filter = CompanyFilter::parse(query.company.as_deref());
    let book = state.ledger()?.export_yearly(query.year, &filter)?;
    xlsx_response(&book)
}

/// Single-file update endpoint: versioned overwrite of the remote blob with
/// the server-held credential.
async fn save_data(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SaveDataRequest>,
) -> Result<Json<Value>> {
    state.privilege(&jar)?;
    let writer = state
        .writer
        .as_ref()
        .map(Arc::clone)
        .ok_or_else(|| LedgerError::Remote("no contents host credential configured".to_string()))?;
    Ok(Json(writer.push(&request.content).await?))
}
