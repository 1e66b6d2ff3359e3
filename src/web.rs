use crate::{
    app::{AppError, SearchService},
    auth::{self, API_KEY_HEADER},
    config::ServerConfig,
    search::{
        HealthResponse, ImageSearchResponse, ModelsResponse, SearchParams, TextSearchResponse,
        ValidationError,
    },
};
use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, Request, State,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Uploaded images larger than this are rejected before reaching a handler.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct SharedState {
    service: Arc<SearchService>,
}

#[derive(Clone)]
struct AuthState {
    api_key: Option<Arc<str>>,
}

pub fn create_router(service: Arc<SearchService>, config: &ServerConfig) -> anyhow::Result<Router> {
    let shared_state = SharedState { service };
    let auth_state = AuthState {
        api_key: config.api_key.as_deref().map(Arc::from),
    };

    let protected = Router::new()
        .route("/models", get(models))
        .route("/search", post(search_post).get(search_get))
        .route("/search/image", post(search_image))
        .route("/search/hybrid", post(search_hybrid))
        .route("/search/text", get(search_full_text))
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_key));

    let app = Router::new()
        .route("/", get(info))
        .route("/health", get(health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    Ok(app)
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    if origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(AllowOrigin::any()));
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    // credentials cannot be combined with a wildcard origin
    Ok(layer.allow_origin(origins).allow_credentials(true))
}

async fn start_app(service: Arc<SearchService>, config: ServerConfig) -> anyhow::Result<()> {
    if config.api_key.is_none() {
        log::warn!("API_KEY is not set, search endpoints are served without authentication");
    }

    if let Some(backend) = service.backend().current() {
        if backend.test_connection().await {
            log::info!("Search backend is reachable");
        } else {
            log::warn!("Search backend connection test failed");
        }
    }

    let app = create_router(service, &config)?;
    let addr = config.listen_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("shutting down");
}

pub fn start_daemon(service: SearchService, config: ServerConfig) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(Arc::new(service), config))
}

#[derive(Debug)]
pub struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::Validation(err) if err.is_range_violation() => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequestBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotReady(_) => {
                log::warn!("{}", self.0);
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Embedding(_) | AppError::Backend(_) | AppError::Other(_) => {
                log::error!("{:?}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

// Lets handlers use `?` on anything that converts into `AppError`.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn require_api_key(
    State(auth_state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !auth::is_authorized(provided, auth_state.api_key.as_deref()) {
        return Err(HttpError(AppError::Unauthorized));
    }

    Ok(next.run(request).await)
}

async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(state.service.health())
}

async fn models(State(state): State<SharedState>) -> Json<ModelsResponse> {
    Json(state.service.models())
}

fn json_params(
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> Result<SearchParams, AppError> {
    payload
        .map(|Json(params)| params)
        .map_err(|rejection| AppError::BadRequestBody(rejection.body_text()))
}

fn query_params(
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<SearchParams, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::BadRequestBody(rejection.body_text()))
}

async fn search_post(
    State(state): State<SharedState>,
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> Result<Json<TextSearchResponse>, HttpError> {
    let params = json_params(payload)?;
    Ok(Json(state.service.search_text(&params).await?))
}

async fn search_get(
    State(state): State<SharedState>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<TextSearchResponse>, HttpError> {
    let params = query_params(query)?;
    Ok(Json(state.service.search_text(&params).await?))
}

async fn search_hybrid(
    State(state): State<SharedState>,
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> Result<Json<TextSearchResponse>, HttpError> {
    let params = json_params(payload)?;
    Ok(Json(state.service.search_hybrid(&params).await?))
}

async fn search_full_text(
    State(state): State<SharedState>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<TextSearchResponse>, HttpError> {
    let params = query_params(query)?;
    Ok(Json(state.service.search_full_text(&params).await?))
}

/// Multipart upload, the image goes in the `image` field and the search
/// parameters in the query string.
async fn search_image(
    State(state): State<SharedState>,
    query: Result<Query<SearchParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageSearchResponse>, HttpError> {
    let params = query_params(query)?;
    let mut multipart = multipart.map_err(|rejection| {
        AppError::from(ValidationError::MalformedUpload(rejection.body_text()))
    })?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ValidationError::MalformedUpload(err.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| ValidationError::MalformedUpload(err.body_text()))?;
        upload = Some((content_type, data.to_vec()));
        break;
    }

    let (content_type, data) = upload.ok_or(ValidationError::MissingImage)?;

    Ok(Json(
        state
            .service
            .search_image(&params, content_type.as_deref(), data)
            .await?,
    ))
}
