//! HTTP query API and live update stream.
//!
//! API endpoints:
//! - GET /healthz                          - liveness probe
//! - GET /ui/api/last{Status,Login,Gps}Message      - all records of a category
//! - GET /ui/api/last{Status,Login,Gps}Message/{id} - one record by logical id
//! - GET /ui/api/device/{id}               - {status, login, gps} of one device
//! - GET /ui/api/events/{category}         - SSE stream of merged updates
//!
//! Records are rendered as `{imei, veloId, <category>Data}`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::stream::Stream;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};
use velocast_devicestate::{
    Category, CombinedRecord, DeviceKey, Distributor, MergedRecord, Pipeline, StateQuery,
};

/// Cookie carrying the session token issued by the identity service.
pub const TOKEN_COOKIE: &str = "Velo.JWT";

/// Decides whether a request may read device state.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> bool;
}

/// Accepts every request.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Accepts requests presenting a fixed token, either as
/// `Authorization: Bearer <token>` or in the session cookie.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.token.as_bytes()))
    }
}

impl Authorizer for StaticToken {
    fn authorize(&self, headers: &HeaderMap) -> bool {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if bearer.is_some_and(|token| self.matches(token)) {
            return true;
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == TOKEN_COOKIE && self.matches(value))
    }
}

/// Picks the authorizer for the configured API token.
///
/// An empty token leaves the API open.
pub fn authorizer(api_token: &str) -> Arc<dyn Authorizer> {
    if api_token.is_empty() {
        warn!("no api_token configured; query API and event streams are unauthenticated");
        Arc::new(AllowAll)
    } else {
        Arc::new(StaticToken::new(api_token))
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    query: StateQuery,
    distributor: Arc<Distributor>,
    auth: Arc<dyn Authorizer>,
}

impl ApiState {
    pub fn new(pipeline: &Pipeline, auth: Arc<dyn Authorizer>) -> Self {
        Self {
            query: pipeline.query.clone(),
            distributor: pipeline.distributor.clone(),
            auth,
        }
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if self.auth.authorize(headers) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Request failure rendered as a plain-text response.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    Unauthorized,
    NotFound(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response()
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
        }
    }
}

/// Builds the API router.
pub fn router(state: ApiState, cors_origin: &str) -> Result<Router> {
    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/ui/api/device/{id}", get(device))
        .route("/ui/api/events/{category}", get(events));

    for category in Category::ALL {
        let path = format!("/ui/api/last{}Message", title(category));
        app = app
            .route(
                &path,
                get(move |state: State<ApiState>, headers: HeaderMap| {
                    all_records(category, state, headers)
                }),
            )
            .route(
                &format!("{path}/{{id}}"),
                get(
                    move |state: State<ApiState>, headers: HeaderMap, id: Path<String>| {
                        record_by_id(category, state, headers, id)
                    },
                ),
            );
    }

    Ok(app.with_state(state).layer(cors(cors_origin)?))
}

fn cors(origin: &str) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods([Method::GET]);
    if origin.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    Ok(layer
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_credentials(true))
}

/// Parse address string to SocketAddr. `:port` binds all interfaces.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    Ok(addr.parse()?)
}

fn title(category: Category) -> &'static str {
    match category {
        Category::Status => "Status",
        Category::Login => "Login",
        Category::Gps => "Gps",
    }
}

/// Renders a record as `{imei, veloId, <category>Data}`.
pub fn render(category: Category, record: &MergedRecord) -> Value {
    let mut obj = Map::new();
    obj.insert("imei".to_string(), Value::from(record.hardware_id.as_str()));
    obj.insert("veloId".to_string(), Value::from(record.logical_id.as_str()));
    obj.insert(
        format!("{}Data", category.as_str()),
        Value::Object(record.fields.clone()),
    );
    Value::Object(obj)
}

fn render_combined(combined: &CombinedRecord) -> Value {
    let mut obj = Map::new();
    for category in Category::ALL {
        let slot = combined
            .get(category)
            .map_or(Value::Null, |record| render(category, record));
        obj.insert(category.as_str().to_string(), slot);
    }
    Value::Object(obj)
}

async fn all_records(
    category: Category,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.check(&headers)?;

    let records: Map<String, Value> = state
        .query
        .all_of(category)
        .iter()
        .map(|(key, record): (&DeviceKey, &MergedRecord)| {
            (key.to_string(), render(category, record))
        })
        .collect();
    Ok(Json(Value::Object(records)))
}

async fn record_by_id(
    category: Category,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.check(&headers)?;

    state
        .query
        .by_logical_id(category, &id)
        .map(|record| Json(render(category, &record)))
        .ok_or(ApiError::NotFound("No device found with the specified Id"))
}

async fn device(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.check(&headers)?;

    let combined = state.query.combined_by_logical_id(&id);
    Ok(Json(render_combined(&combined)))
}

async fn events(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state.check(&headers)?;

    let category: Category = name
        .parse()
        .map_err(|_| ApiError::NotFound("Unknown category"))?;
    let mut rx = state.distributor.subscribe(category);
    debug!("sse observer connected to {} updates", category);

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(update) => {
                    let data = render(update.category, &update.record).to_string();
                    yield Ok(Event::default().event(update.category.as_str()).data(data));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("sse observer lagged, skipped {} {} updates", skipped, category);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
