use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use admin_core::{
    OrderedItem, PositionStore, RefreshSignal, ReorderCoordinator, ReorderError, ReorderOutcome,
};
use chrono::Utc;
use shared::{
    domain::{Hero, Product, ProductDraft, ProductId, Testimonial, TestimonialDraft, TestimonialId},
    error::{ApiError, ErrorCode},
    protocol::{BuyLinkResponse, PageData, ReorderResponse, SessionToken},
};
use storage::Storage;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

pub mod auth;

pub use auth::AuthConfig;

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub hero: Hero,
    pub default_buy_url: String,
    /// Longest a snapshot is served before storage is read again. Bounds how
    /// long writes made outside this process stay invisible.
    pub snapshot_ttl: Duration,
}

struct Snapshot {
    page: PageData,
    built_at: Instant,
}

/// Last assembled page plus a version that moves on every invalidation.
#[derive(Clone)]
pub struct PageCache {
    snapshot: Arc<RwLock<Option<Snapshot>>>,
    version: Arc<AtomicU64>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(None)),
            version: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// A snapshot past its ttl counts as an invalidation.
    async fn current(&self) -> Option<PageData> {
        {
            let snapshot = self.snapshot.read().await;
            match snapshot.as_ref() {
                None => return None,
                Some(cached) if cached.built_at.elapsed() < self.ttl => {
                    return Some(cached.page.clone())
                }
                Some(_) => {}
            }
        }
        debug!("page snapshot expired");
        self.invalidate().await;
        None
    }

    /// Keeps `page` only if nothing invalidated the cache while it was built.
    async fn store(&self, page: PageData) {
        let mut snapshot = self.snapshot.write().await;
        if page.version == self.version() {
            *snapshot = Some(Snapshot {
                page,
                built_at: Instant::now(),
            });
        }
    }

    pub async fn invalidate(&self) {
        let mut snapshot = self.snapshot.write().await;
        self.version.fetch_add(1, Ordering::SeqCst);
        *snapshot = None;
    }
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
    pub page: PageSettings,
    pub cache: PageCache,
    pub refresh: broadcast::Sender<RefreshSignal>,
}

impl ApiContext {
    pub fn new(storage: Storage, auth: AuthConfig, page: PageSettings) -> Self {
        let (refresh, _) = broadcast::channel(64);
        Self {
            storage,
            auth,
            cache: PageCache::new(page.snapshot_ttl),
            page,
            refresh,
        }
    }
}

pub async fn page_data(ctx: &ApiContext) -> Result<PageData, ApiError> {
    if let Some(page) = ctx.cache.current().await {
        return Ok(page);
    }

    let version = ctx.cache.version();
    let (products, testimonials) = futures::try_join!(
        ctx.storage.list_products(),
        ctx.storage.list_testimonials()
    )
    .map_err(internal)?;
    let page = PageData {
        version,
        hero: ctx.page.hero.clone(),
        products,
        testimonials,
    };
    ctx.cache.store(page.clone()).await;
    Ok(page)
}

pub fn login(ctx: &ApiContext, password: &str) -> Result<SessionToken, ApiError> {
    if !ctx.auth.admin_enabled() {
        warn!("admin login attempted while admin access is disabled");
        return Err(ApiError::new(ErrorCode::Unauthorized, "invalid password"));
    }
    if !auth::verify_password(&ctx.auth.password_hash, password) {
        warn!("admin login rejected");
        return Err(ApiError::new(ErrorCode::Unauthorized, "invalid password"));
    }
    let session = auth::mint_session_token(&ctx.auth, Utc::now())
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))?;
    info!(expires_at = %session.expires_at, "admin session issued");
    Ok(session)
}

/// Accepts the raw `Authorization` header value. Every token is refused
/// while admin access is disabled.
pub fn authorize(ctx: &ApiContext, authorization: Option<&str>) -> Result<(), ApiError> {
    if !ctx.auth.admin_enabled() {
        return Err(ApiError::new(
            ErrorCode::Unauthorized,
            "admin access is disabled",
        ));
    }
    let token = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "missing bearer token"))?;
    auth::verify_session_token(&ctx.auth, token)
        .map_err(|e| ApiError::new(ErrorCode::Unauthorized, format!("invalid session: {e}")))
}

pub async fn create_product(ctx: &ApiContext, draft: &ProductDraft) -> Result<Product, ApiError> {
    if let Some(field) = draft.missing_field() {
        return Err(missing(field));
    }
    let product = ctx.storage.create_product(draft).await.map_err(internal)?;
    ctx.cache.invalidate().await;
    info!(product_id = %product.id, position = product.position, "product created");
    Ok(product)
}

pub async fn update_product(
    ctx: &ApiContext,
    product_id: ProductId,
    draft: &ProductDraft,
) -> Result<Product, ApiError> {
    if let Some(field) = draft.missing_field() {
        return Err(missing(field));
    }
    let product = ctx
        .storage
        .update_product(product_id, draft)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "product not found"))?;
    ctx.cache.invalidate().await;
    Ok(product)
}

pub async fn delete_product(ctx: &ApiContext, product_id: ProductId) -> Result<(), ApiError> {
    let deleted = ctx
        .storage
        .delete_product(product_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::new(ErrorCode::NotFound, "product not found"));
    }
    ctx.cache.invalidate().await;
    info!(%product_id, "product deleted");
    Ok(())
}

pub async fn set_product_position(
    ctx: &ApiContext,
    product_id: ProductId,
    position: u32,
) -> Result<(), ApiError> {
    let found = ctx
        .storage
        .set_product_position(product_id, position)
        .await
        .map_err(internal)?;
    if !found {
        return Err(ApiError::new(ErrorCode::NotFound, "product not found"));
    }
    ctx.cache.invalidate().await;
    Ok(())
}

pub async fn reorder_products(
    ctx: &ApiContext,
    from_index: usize,
    to_index: usize,
) -> Result<ReorderResponse, ApiError> {
    let products = ctx.storage.list_products().await.map_err(internal)?;
    reorder_collection(ctx, products, from_index, to_index).await
}

pub async fn create_testimonial(
    ctx: &ApiContext,
    draft: &TestimonialDraft,
) -> Result<Testimonial, ApiError> {
    if let Some(field) = draft.missing_field() {
        return Err(missing(field));
    }
    let testimonial = ctx
        .storage
        .create_testimonial(draft)
        .await
        .map_err(internal)?;
    ctx.cache.invalidate().await;
    info!(testimonial_id = %testimonial.id, "testimonial created");
    Ok(testimonial)
}

pub async fn update_testimonial(
    ctx: &ApiContext,
    testimonial_id: TestimonialId,
    draft: &TestimonialDraft,
) -> Result<Testimonial, ApiError> {
    if let Some(field) = draft.missing_field() {
        return Err(missing(field));
    }
    let testimonial = ctx
        .storage
        .update_testimonial(testimonial_id, draft)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "testimonial not found"))?;
    ctx.cache.invalidate().await;
    Ok(testimonial)
}

pub async fn delete_testimonial(
    ctx: &ApiContext,
    testimonial_id: TestimonialId,
) -> Result<(), ApiError> {
    let deleted = ctx
        .storage
        .delete_testimonial(testimonial_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::new(ErrorCode::NotFound, "testimonial not found"));
    }
    ctx.cache.invalidate().await;
    info!(%testimonial_id, "testimonial deleted");
    Ok(())
}

pub async fn set_testimonial_position(
    ctx: &ApiContext,
    testimonial_id: TestimonialId,
    position: u32,
) -> Result<(), ApiError> {
    let found = ctx
        .storage
        .set_testimonial_position(testimonial_id, position)
        .await
        .map_err(internal)?;
    if !found {
        return Err(ApiError::new(ErrorCode::NotFound, "testimonial not found"));
    }
    ctx.cache.invalidate().await;
    Ok(())
}

pub async fn reorder_testimonials(
    ctx: &ApiContext,
    from_index: usize,
    to_index: usize,
) -> Result<ReorderResponse, ApiError> {
    let testimonials = ctx.storage.list_testimonials().await.map_err(internal)?;
    reorder_collection(ctx, testimonials, from_index, to_index).await
}

async fn reorder_collection<T>(
    ctx: &ApiContext,
    items: Vec<T>,
    from_index: usize,
    to_index: usize,
) -> Result<ReorderResponse, ApiError>
where
    T: OrderedItem,
    Storage: PositionStore<T::Id>,
{
    let coordinator = ReorderCoordinator::with_refresh(ctx.storage.clone(), ctx.refresh.clone());
    let report = coordinator
        .reorder(items, from_index, to_index)
        .await
        .map_err(|ReorderError::IndexOutOfRange { index, len }| {
            ApiError::new(
                ErrorCode::Validation,
                format!("index {index} is out of range for {len} {}", T::COLLECTION),
            )
        })?;
    ctx.cache.invalidate().await;

    match report.outcome {
        ReorderOutcome::Applied { writes } => Ok(ReorderResponse { writes }),
        ReorderOutcome::Failed { attempted, failed } => Err(ApiError::new(
            ErrorCode::Conflict,
            format!(
                "{failed} of {attempted} position writes failed; {} may need reordering again",
                T::COLLECTION
            ),
        )),
    }
}

/// Purchase URL for a product, or the configured fallback.
pub async fn buy_link(ctx: &ApiContext, product_id: ProductId) -> BuyLinkResponse {
    let url = match ctx.storage.load_product(product_id).await {
        Ok(Some(product)) if !product.buy_url.trim().is_empty() => product.buy_url,
        Ok(_) => ctx.page.default_buy_url.clone(),
        Err(error) => {
            warn!(%product_id, %error, "buy link lookup failed, using default");
            ctx.page.default_buy_url.clone()
        }
    };
    BuyLinkResponse { url }
}

fn missing(field: &str) -> ApiError {
    ApiError::new(ErrorCode::Validation, format!("{field} is required"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
