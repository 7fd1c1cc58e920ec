//! HTTP request handlers
//!
//! Thin adapters from JSON bodies and query strings to the config store,
//! lifecycle and layout operations. Storage calls are synchronous, and the
//! SQLite backend can wait on its busy timeout, so handlers run them on the
//! blocking pool through [`blocking`].

use axum::{
    extract::{Query, State},
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::error::ApiError;
use super::extract::{authorize, session_cookie, AdminSession, ClientIp, JsonRequest};
use crate::core::app_state::AppState;
use crate::core::error::{Error, Result, StoreError};
use crate::core::types::{BlockConfig, Layout, Props, ORDER_KEY};
use crate::layout::{resolve_layout_with_defaults, BlockDefaults};
use crate::lifecycle::{Lifecycle, PagePublishReport, StateReport};
use crate::storage::StorageImpl;
use crate::system::metrics::{collect_metrics, Metrics};

/// Handler result type
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Success body: `{ "ok": true, "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always true
    pub ok: bool,
    /// Response payload
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload
    pub fn success(data: T) -> Json<Self> {
        Json(Self { ok: true, data })
    }
}

/// Query of `GET /layout`
#[derive(Debug, Deserialize)]
pub struct LayoutQuery {
    /// Page path
    pub path: Option<String>,
    /// `1`/`true` for the draft preview
    pub draft: Option<String>,
}

/// Body of `POST /layout`: resolve with the renderer's defaults
#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    /// Page path
    #[serde(default)]
    pub path: String,
    /// Draft preview
    #[serde(default)]
    pub draft: bool,
    /// Default props per block type, merged under the stored props
    #[serde(default)]
    pub defaults: BlockDefaults,
}

/// Body of `POST /draft` and `POST /save`
#[derive(Debug, Deserialize)]
pub struct BlockWriteRequest {
    /// Page path
    #[serde(default)]
    pub path: String,
    /// Block type; left unchanged when absent
    pub block: Option<String>,
    /// Block instance id
    #[serde(default)]
    pub id: String,
    /// Properties to store
    #[serde(default)]
    pub props: Props,
    /// Explicit layout position, stored as `order_index`
    pub order: Option<Number>,
}

impl BlockWriteRequest {
    fn into_props(self) -> (String, Option<String>, String, Props) {
        let mut props = self.props;
        if let Some(order) = self.order {
            props.insert(ORDER_KEY.to_string(), Value::Number(order));
        }
        (self.path, self.block, self.id, props)
    }
}

/// Body of `POST /publish`
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Page path
    #[serde(default)]
    pub path: String,
    /// Block instance id
    #[serde(default)]
    pub id: String,
}

/// Body of `POST /publish-page`
#[derive(Debug, Deserialize)]
pub struct PublishPageRequest {
    /// Page path
    #[serde(default)]
    pub path: String,
}

/// Query of `GET /state`
#[derive(Debug, Deserialize)]
pub struct StateQuery {
    /// Page path
    #[serde(default)]
    pub path: String,
    /// Block instance id
    #[serde(default)]
    pub id: String,
}

/// Query of `GET /export`
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Restrict to one page; all rows when absent
    pub path: Option<String>,
}

/// Body of `GET /export`
#[derive(Debug, Serialize)]
pub struct ExportResponse {
    /// Time of export
    pub exported_at: DateTime<Utc>,
    /// Number of rows
    pub count: usize,
    /// Exported rows
    pub rows: Vec<BlockConfig>,
}

/// Body of `POST /import`
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Rows to upsert; each is checked on its own
    #[serde(default)]
    pub rows: Vec<Value>,
}

/// Result of `POST /import`
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    /// Rows written
    pub imported: usize,
    /// Rows rejected or failed
    pub skipped: usize,
}

/// Body of `POST /admin/login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Admin password
    #[serde(default)]
    pub password: String,
}

/// Result of a successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Session expiry
    pub expires_at: DateTime<Utc>,
}

/// System health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store cannot be read
    pub status: String,
    /// Service version
    pub version: String,
    /// Stored row count
    pub blocks: Option<usize>,
}

/// Service information
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Storage backend in use
    pub storage: String,
}

fn is_truthy(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|f| f.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Run store work on the blocking thread pool
async fn blocking<S, T, F>(state: &AppState<S>, work: F) -> ApiResult<T>
where
    S: StorageImpl,
    T: Send + 'static,
    F: FnOnce(&AppState<S>) -> Result<T> + Send + 'static,
{
    let state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| Error::from(StoreError::Backend(format!("store task failed: {}", e))))?;
    Ok(outcome?)
}

async fn layout_response<S: StorageImpl>(
    state: &AppState<S>,
    path: String,
    use_draft: bool,
    defaults: BlockDefaults,
) -> ApiResult<Json<Layout>> {
    let lookup = path.clone();
    let layout = blocking(state, move |state| {
        resolve_layout_with_defaults(&state.store, &lookup, use_draft, &defaults)
    })
    .await?;

    match layout {
        Some(layout) => Ok(Json(layout)),
        None => Err(Error::not_found(format!("no configuration for path {}", path.trim())).into()),
    }
}

/// `GET /layout?path=&draft=` - published layout is public, draft needs a session
pub async fn get_layout<S: StorageImpl>(
    State(state): State<AppState<S>>,
    ClientIp(client): ClientIp,
    headers: HeaderMap,
    Query(query): Query<LayoutQuery>,
) -> ApiResult<Json<Layout>> {
    let use_draft = is_truthy(query.draft.as_deref());
    if use_draft {
        authorize(&state, &headers, &client)?;
    }
    layout_response(&state, query.path.unwrap_or_default(), use_draft, BlockDefaults::new()).await
}

/// `POST /layout` - same access rules as `GET /layout`, with per-type defaults
pub async fn resolve_with_defaults<S: StorageImpl>(
    State(state): State<AppState<S>>,
    ClientIp(client): ClientIp,
    headers: HeaderMap,
    JsonRequest(request): JsonRequest<LayoutRequest>,
) -> ApiResult<Json<Layout>> {
    if request.draft {
        authorize(&state, &headers, &client)?;
    }
    layout_response(&state, request.path, request.draft, request.defaults).await
}

/// `POST /draft`
pub async fn save_draft<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    JsonRequest(request): JsonRequest<BlockWriteRequest>,
) -> ApiResult<Json<ApiResponse<BlockConfig>>> {
    let (path, block, id, props) = request.into_props();
    let row = blocking(&state, move |state| {
        Lifecycle::new(&state.store).save_draft(&path, &id, block.as_deref(), props)
    })
    .await?;
    Ok(ApiResponse::success(row))
}

/// `POST /publish`
pub async fn publish<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    JsonRequest(request): JsonRequest<PublishRequest>,
) -> ApiResult<Json<ApiResponse<BlockConfig>>> {
    let row = blocking(&state, move |state| {
        Lifecycle::new(&state.store).publish(&request.path, &request.id)
    })
    .await?;
    Ok(ApiResponse::success(row))
}

/// `POST /save` - direct write to live props
pub async fn save_direct<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    JsonRequest(request): JsonRequest<BlockWriteRequest>,
) -> ApiResult<Json<ApiResponse<BlockConfig>>> {
    let (path, block, id, props) = request.into_props();
    let row = blocking(&state, move |state| {
        Lifecycle::new(&state.store).save_direct(&path, &id, block.as_deref(), props)
    })
    .await?;
    Ok(ApiResponse::success(row))
}

/// `POST /publish-page` - drafted blocks are published, the rest are reported unchanged
pub async fn publish_page<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    JsonRequest(request): JsonRequest<PublishPageRequest>,
) -> ApiResult<Json<ApiResponse<PagePublishReport>>> {
    let report = blocking(&state, move |state| {
        Lifecycle::new(&state.store).publish_page(&request.path)
    })
    .await?;
    Ok(ApiResponse::success(report))
}

/// `GET /state?path=&id=`
pub async fn block_state<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<ApiResponse<StateReport>>> {
    let report = blocking(&state, move |state| {
        Lifecycle::new(&state.store).state(&query.path, &query.id)
    })
    .await?;
    Ok(ApiResponse::success(report))
}

/// `GET /export?path=`
pub async fn export_rows<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<ExportResponse>> {
    let rows = blocking(&state, move |state| {
        match query.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => state.store.list_by_path(path),
            None => state.store.list_all(),
        }
    })
    .await?;

    Metrics::global().rows_exported.inc_by(rows.len() as u64);
    tracing::info!("Exported {} rows", rows.len());
    Ok(Json(ExportResponse {
        exported_at: Utc::now(),
        count: rows.len(),
        rows,
    }))
}

/// `POST /import`
pub async fn import_rows<S: StorageImpl>(
    State(state): State<AppState<S>>,
    _admin: AdminSession,
    JsonRequest(request): JsonRequest<ImportRequest>,
) -> ApiResult<Json<ImportResponse>> {
    let mut malformed = 0;
    let rows: Vec<BlockConfig> = request
        .rows
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<BlockConfig>(value) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!("Skipping malformed import row: {}", e);
                malformed += 1;
                None
            }
        })
        .collect();

    let report = blocking(&state, move |state| Ok(state.store.bulk_upsert(rows))).await?;
    Ok(Json(ImportResponse {
        imported: report.written,
        skipped: report.skipped + malformed,
    }))
}

fn session_cookie_header(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn with_cookie(mut response: Response, cookie: String) -> ApiResult<Response> {
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| Error::config(format!("invalid cookie header: {}", e)))?;
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

/// `POST /admin/login`
pub async fn login<S: StorageImpl>(
    State(state): State<AppState<S>>,
    ClientIp(client): ClientIp,
    JsonRequest(request): JsonRequest<LoginRequest>,
) -> ApiResult<Response> {
    state.limiter.check(&client)?;

    let session = state.sessions.login(&request.password).map_err(|e| {
        Metrics::global().auth_failures.inc();
        tracing::warn!("Login from {} rejected", client);
        e
    })?;

    let admin = &state.config.admin;
    let max_age = (session.expires_at - session.created_at).num_seconds();
    let cookie = session_cookie_header(&admin.cookie_name, &session.token, max_age, admin.secure_cookie);
    let response = ApiResponse::success(LoginResponse {
        expires_at: session.expires_at,
    })
    .into_response();
    with_cookie(response, cookie)
}

/// `POST /admin/logout` - always clears the cookie
pub async fn logout<S: StorageImpl>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let admin = &state.config.admin;
    if let Some(token) = session_cookie(&headers, &admin.cookie_name) {
        state.sessions.logout(&token);
    }

    let cookie = session_cookie_header(&admin.cookie_name, "", 0, admin.secure_cookie);
    with_cookie(ApiResponse::success(Value::Null).into_response(), cookie)
}

/// `GET /health`
pub async fn health_check<S: StorageImpl>(
    State(state): State<AppState<S>>,
) -> Json<HealthResponse> {
    let (status, blocks) = match blocking(&state, |state| state.store.count()).await {
        Ok(count) => ("ok", Some(count)),
        Err(e) => {
            tracing::error!("Health check could not read store: {}", e.0);
            ("degraded", None)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: crate::VERSION.to_string(),
        blocks,
    })
}

/// `GET /info`
pub async fn system_info<S: StorageImpl>(State(state): State<AppState<S>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        storage: state.store.backend().backend_name().to_string(),
    })
}

/// `GET /metrics` - Prometheus text format
pub async fn metrics<S: StorageImpl>(State(state): State<AppState<S>>) -> ApiResult<Response> {
    if !state.config.metrics.enabled {
        return Err(Error::not_found("metrics are disabled").into());
    }

    Ok((
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        collect_metrics(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_written_as_order_index() {
        let request: BlockWriteRequest = serde_json::from_value(serde_json::json!({
            "path": "/", "block": "Hero", "id": "hero-1",
            "props": {"title": "Hi"}, "order": 2
        }))
        .unwrap();
        let (_, block, _, props) = request.into_props();
        assert_eq!(block.as_deref(), Some("Hero"));
        assert_eq!(props[ORDER_KEY], serde_json::json!(2));
        assert_eq!(props["title"], "Hi");
    }

    #[test]
    fn test_draft_flag_parsing() {
        assert!(is_truthy(Some("1")));
        assert!(is_truthy(Some("true")));
        assert!(!is_truthy(Some("0")));
        assert!(!is_truthy(None));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie_header("admin_session", "tok", 60, true);
        assert_eq!(
            cookie,
            "admin_session=tok; Path=/; HttpOnly; SameSite=Strict; Max-Age=60; Secure"
        );
        assert!(!session_cookie_header("a", "", 0, false).contains("Secure"));
    }
}
