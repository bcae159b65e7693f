//! HTTP surface for a map host (browser or native shell).
//!
//! The host relays engine events and device positions in, and polls the
//! session snapshot and fog frame out.

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{ApiError, Camera, Destination, GeoPoint, SessionSnapshot, VisitedResponse};
use tower_http::cors::CorsLayer;

use crate::{
    geo::path_length_km,
    gpx_export::encode_visited_path,
    location::{LocationError, PositionFix, PositionUpdate},
    navigation::NavigationError,
    proximity::CompletionError,
    runtime::{ActionError, ExplorerHandle, Msg, RuntimeError},
    viewport::MAX_VIEWPORT_SIDE,
};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Clone)]
pub struct AppState {
    pub explorer: ExplorerHandle,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(session_handler))
        .route("/api/position", post(position_handler))
        .route("/api/camera", post(camera_handler))
        .route("/api/search", post(search_handler))
        .route("/api/search/select", post(select_result_handler))
        .route("/api/destination", post(destination_handler))
        .route("/api/navigation/start", post(start_handler))
        .route("/api/navigation/exit", post(exit_handler))
        .route("/api/navigation/recenter", post(recenter_handler))
        .route("/api/quests/:id/complete", post(complete_quest_handler))
        .route("/api/fog", get(fog_handler))
        .route("/api/visited", get(visited_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PositionFailure {
    PermissionDenied,
    Unavailable,
    Timeout,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionRequest {
    Fix {
        lat: f64,
        lng: f64,
        #[serde(default)]
        heading: Option<f64>,
        #[serde(default)]
        accuracy: Option<f64>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Failure {
        error: PositionFailure,
    },
}

impl PositionRequest {
    fn into_update(self) -> ApiResult<PositionUpdate> {
        match self {
            Self::Fix {
                lat,
                lng,
                heading,
                accuracy,
                timestamp,
            } => Ok(Ok(PositionFix {
                point: checked_point(lat, lng)?,
                heading: heading.filter(|h| h.is_finite()),
                accuracy,
                timestamp: timestamp.unwrap_or_else(Utc::now),
            })),
            Self::Failure { error } => Ok(Err(match error {
                PositionFailure::PermissionDenied => LocationError::PermissionDenied,
                PositionFailure::Unavailable => LocationError::Unavailable,
                PositionFailure::Timeout => LocationError::Timeout,
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CameraRequest {
    #[serde(flatten)]
    camera: Camera,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    user_initiated: bool,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct DestinationRequest {
    lat: f64,
    lng: f64,
    #[serde(default)]
    label: Option<String>,
}

async fn session_handler(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    state.explorer.snapshot().await.map(Json).map_err(stopped)
}

async fn position_handler(
    State(state): State<AppState>,
    Json(req): Json<PositionRequest>,
) -> ApiResult<StatusCode> {
    let update = req.into_update()?;
    state.explorer.position(update).await.map_err(stopped)?;
    Ok(StatusCode::ACCEPTED)
}

async fn camera_handler(
    State(state): State<AppState>,
    Json(req): Json<CameraRequest>,
) -> ApiResult<StatusCode> {
    checked_point(req.camera.center.lat, req.camera.center.lng)?;
    if let Some((width, height)) = checked_size(req.width, req.height)? {
        state
            .explorer
            .send(Msg::Resized { width, height })
            .await
            .map_err(stopped)?;
    }
    state
        .explorer
        .camera_changed(req.camera, req.user_initiated)
        .await
        .map_err(stopped)?;
    Ok(StatusCode::ACCEPTED)
}

async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<StatusCode> {
    state.explorer.search(req.query).await.map_err(stopped)?;
    Ok(StatusCode::ACCEPTED)
}

async fn select_result_handler(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> ApiResult<StatusCode> {
    state
        .explorer
        .select_search_result(req.index)
        .await
        .map_err(action_error)?;
    Ok(StatusCode::OK)
}

async fn destination_handler(
    State(state): State<AppState>,
    Json(req): Json<DestinationRequest>,
) -> ApiResult<StatusCode> {
    let destination = Destination {
        point: checked_point(req.lat, req.lng)?,
        label: req.label,
    };
    state
        .explorer
        .select_destination(destination)
        .await
        .map_err(action_error)?;
    Ok(StatusCode::OK)
}

/// Accepted once the route request is issued; the route shows up in the snapshot.
async fn start_handler(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state
        .explorer
        .start_navigation()
        .await
        .map_err(action_error)?;
    Ok(StatusCode::ACCEPTED)
}

async fn exit_handler(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.explorer.exit_navigation().await.map_err(stopped)?;
    Ok(StatusCode::OK)
}

async fn recenter_handler(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.explorer.recenter().await.map_err(stopped)?;
    Ok(StatusCode::OK)
}

async fn complete_quest_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let first_time = state
        .explorer
        .complete_quest(id)
        .await
        .map_err(action_error)?;
    Ok(if first_time {
        StatusCode::OK
    } else {
        StatusCode::NO_CONTENT
    })
}

async fn fog_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let frame = state.explorer.fog_frame().await.map_err(stopped)?;
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (HeaderName::from_static("x-fog-width"), frame.width.to_string()),
        (HeaderName::from_static("x-fog-height"), frame.height.to_string()),
    ];
    Ok((headers, frame.to_rgba()))
}

async fn visited_handler(State(state): State<AppState>) -> ApiResult<Json<VisitedResponse>> {
    let points = state.explorer.visited_path().await.map_err(stopped)?;
    let gpx_base64 = encode_visited_path(&points)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err))?;
    Ok(Json(VisitedResponse {
        distance_km: path_length_km(&points),
        points,
        gpx_base64,
    }))
}

fn checked_point(lat: f64, lng: f64) -> ApiResult<GeoPoint> {
    let point = GeoPoint::new(lat, lng);
    if point.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) {
        Ok(point)
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                message: format!("invalid coordinate {lat},{lng}"),
            }),
        ))
    }
}

/// Width and height travel together; each side must be 1..=MAX_VIEWPORT_SIDE.
fn checked_size(width: Option<u32>, height: Option<u32>) -> ApiResult<Option<(u32, u32)>> {
    let in_range = |side: u32| (1..=MAX_VIEWPORT_SIDE).contains(&side);
    match (width, height) {
        (None, None) => Ok(None),
        (Some(width), Some(height)) if in_range(width) && in_range(height) => Ok(Some((width, height))),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "viewport must give width and height between 1 and {MAX_VIEWPORT_SIDE}, got {width:?}x{height:?}"
            ),
        )),
    }
}

fn api_error(status: StatusCode, err: impl std::fmt::Display) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}

fn stopped(err: RuntimeError) -> (StatusCode, Json<ApiError>) {
    api_error(StatusCode::SERVICE_UNAVAILABLE, err)
}

fn action_error(err: ActionError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        ActionError::Navigation(NavigationError::LocationUnknown)
        | ActionError::Navigation(NavigationError::NoDestination)
        | ActionError::Navigation(NavigationError::InvalidTransition { .. })
        | ActionError::Quest(CompletionError::NotDiscovered(_)) => StatusCode::CONFLICT,
        ActionError::Quest(CompletionError::UnknownQuest(_)) | ActionError::NoSuchResult(_) => {
            StatusCode::NOT_FOUND
        }
        ActionError::Runtime(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, err)
}
