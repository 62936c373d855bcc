use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use server_api::{ApiContext, AuthConfig, PageSettings};
use shared::{
    domain::{Hero, Product, ProductDraft, ProductId, Testimonial, TestimonialDraft, TestimonialId},
    error::{ApiError, ErrorCode},
    protocol::{
        BuyLinkResponse, LoginRequest, PageData, ReorderRequest, ReorderResponse, SessionToken,
        SetPositionRequest,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, normalize_database_url, validate_admin_settings};

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    if !validate_admin_settings(&settings)? {
        warn!("no admin password hash configured; admin login is disabled");
    }

    let api = ApiContext::new(
        storage,
        AuthConfig {
            password_hash: settings.admin_password_hash,
            session_secret: settings.session_secret,
            session_ttl_seconds: settings.session_ttl_seconds,
        },
        PageSettings {
            hero: Hero {
                title: settings.hero_title,
                subtitle: settings.hero_subtitle,
            },
            default_buy_url: settings.default_buy_url,
            snapshot_ttl: Duration::from_secs(settings.page_cache_ttl_seconds),
        },
    );
    spawn_refresh_logger(&api);

    let state = AppState {
        api,
        cache_max_age_seconds: settings.cache_max_age_seconds,
    };
    let app = build_router(Arc::new(state)).layer(RequestBodyLimitLayer::new(settings.max_body_bytes));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "storefront listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_refresh_logger(api: &ApiContext) {
    let mut refresh = api.refresh.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = refresh.recv().await {
            if signal.succeeded {
                info!(collection = %signal.collection, "collection reordered");
            } else {
                warn!(
                    collection = %signal.collection,
                    "collection reorder partially failed; positions may be inconsistent"
                );
            }
        }
    });
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/data", get(http_page_data))
        .route("/api/auth/login", post(http_login))
        .route("/api/buy/:product_id", get(http_buy_link))
        .route("/api/products", post(http_create_product))
        .route(
            "/api/products/:product_id",
            put(http_update_product).delete(http_delete_product),
        )
        .route(
            "/api/products/:product_id/position",
            put(http_set_product_position),
        )
        .route("/api/products/reorder", post(http_reorder_products))
        .route("/api/testimonials", post(http_create_testimonial))
        .route(
            "/api/testimonials/:testimonial_id",
            put(http_update_testimonial).delete(http_delete_testimonial),
        )
        .route(
            "/api/testimonials/:testimonial_id/position",
            put(http_set_testimonial_position),
        )
        .route("/api/testimonials/reorder", post(http_reorder_testimonials))
        .with_state(state)
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), HttpError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    server_api::authorize(&state.api, authorization).map_err(http_error)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        http_error(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_page_data(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let page: PageData = server_api::page_data(&state.api).await.map_err(|e| {
        error!(error = %e, "failed to assemble page data");
        http_error(e)
    })?;

    let mut headers = HeaderMap::new();
    let max_age = state.cache_max_age_seconds;
    if let Ok(value) = HeaderValue::from_str(&format!(
        "s-maxage={max_age}, stale-while-revalidate={max_age}"
    )) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    Ok((StatusCode::OK, headers, Json(page)))
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionToken>, HttpError> {
    server_api::login(&state.api, &req.password)
        .map(Json)
        .map_err(http_error)
}

async fn http_buy_link(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Json<BuyLinkResponse> {
    Json(server_api::buy_link(&state.api, ProductId(product_id)).await)
}

async fn http_create_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<ProductDraft>,
) -> Result<(StatusCode, Json<Product>), HttpError> {
    require_admin(&state, &headers)?;
    let product = server_api::create_product(&state.api, &draft)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn http_update_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
    Json(draft): Json<ProductDraft>,
) -> Result<Json<Product>, HttpError> {
    require_admin(&state, &headers)?;
    server_api::update_product(&state.api, ProductId(product_id), &draft)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, HttpError> {
    require_admin(&state, &headers)?;
    server_api::delete_product(&state.api, ProductId(product_id))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_set_product_position(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<SetPositionRequest>,
) -> Result<StatusCode, HttpError> {
    require_admin(&state, &headers)?;
    server_api::set_product_position(&state.api, ProductId(product_id), req.position)
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_reorder_products(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, HttpError> {
    require_admin(&state, &headers)?;
    server_api::reorder_products(&state.api, req.from_index, req.to_index)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_create_testimonial(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<TestimonialDraft>,
) -> Result<(StatusCode, Json<Testimonial>), HttpError> {
    require_admin(&state, &headers)?;
    let testimonial = server_api::create_testimonial(&state.api, &draft)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(testimonial)))
}

async fn http_update_testimonial(
    State(state): State<Arc<AppState>>,
    Path(testimonial_id): Path<i64>,
    headers: HeaderMap,
    Json(draft): Json<TestimonialDraft>,
) -> Result<Json<Testimonial>, HttpError> {
    require_admin(&state, &headers)?;
    server_api::update_testimonial(&state.api, TestimonialId(testimonial_id), &draft)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_testimonial(
    State(state): State<Arc<AppState>>,
    Path(testimonial_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, HttpError> {
    require_admin(&state, &headers)?;
    server_api::delete_testimonial(&state.api, TestimonialId(testimonial_id))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_set_testimonial_position(
    State(state): State<Arc<AppState>>,
    Path(testimonial_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<SetPositionRequest>,
) -> Result<StatusCode, HttpError> {
    require_admin(&state, &headers)?;
    server_api::set_testimonial_position(&state.api, TestimonialId(testimonial_id), req.position)
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_reorder_testimonials(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, HttpError> {
    require_admin(&state, &headers)?;
    server_api::reorder_testimonials(&state.api, req.from_index, req.to_index)
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
