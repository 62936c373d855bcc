use std::sync::Arc;

use admin_core::{
    OrderedItem, PositionStore, RefreshSignal, ReorderCoordinator, ReorderReport,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        Product, ProductDraft, ProductId, Testimonial, TestimonialDraft, TestimonialId,
    },
    error::{ApiError, ErrorCode},
    protocol::{BuyLinkResponse, LoginRequest, PageData, SessionToken, SetPositionRequest},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use url::Url;

pub mod error;

pub use error::ClientError;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Result of a drag-and-drop reorder: what was written, and the page as the
/// server reports it afterwards. The writes have happened even when the
/// re-fetch failed.
#[derive(Debug)]
pub struct ReorderedPage<T> {
    pub report: ReorderReport<T>,
    pub page: Result<PageData>,
}

/// Admin-facing client for the storefront HTTP API.
///
/// Cheap to clone; clones share the session token and refresh channel.
#[derive(Clone)]
pub struct StorefrontClient {
    http: Client,
    base_url: Url,
    session: Arc<RwLock<Option<SessionToken>>>,
    refresh: broadcast::Sender<RefreshSignal>,
}

impl StorefrontClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let (refresh, _) = broadcast::channel(16);
        Ok(Self {
            http: Client::new(),
            base_url,
            session: Arc::new(RwLock::new(None)),
            refresh,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fires after every remote reorder, including partial failures.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshSignal> {
        self.refresh.subscribe()
    }

    pub async fn fetch_page(&self) -> Result<PageData> {
        let request = self.http.get(self.endpoint("api/data")?);
        self.send_json(request).await
    }

    pub async fn login(&self, password: &str) -> Result<SessionToken> {
        let request = self.http.post(self.endpoint("api/auth/login")?).json(&LoginRequest {
            password: password.to_string(),
        });
        let session: SessionToken = self.send_json(request).await?;
        info!(expires_at = %session.expires_at, "admin session started");
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    pub async fn logout(&self) {
        if self.session.write().await.take().is_some() {
            info!("admin session dropped");
        }
    }

    /// True while a session token is held and not yet expired.
    pub async fn is_admin(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .is_some_and(|session| session.expires_at > Utc::now())
    }

    pub async fn buy_link(&self, product_id: ProductId) -> Result<String> {
        let request = self
            .http
            .get(self.endpoint(&format!("api/buy/{product_id}"))?);
        let link: BuyLinkResponse = self.send_json(request).await?;
        Ok(link.url)
    }

    pub async fn create_product(&self, draft: &ProductDraft) -> Result<Product> {
        self.admin_json(self.http.post(self.endpoint("api/products")?), draft)
            .await
    }

    pub async fn update_product(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product> {
        let url = self.endpoint(&format!("api/products/{product_id}"))?;
        self.admin_json(self.http.put(url), draft).await
    }

    pub async fn delete_product(&self, product_id: ProductId) -> Result<()> {
        let url = self.endpoint(&format!("api/products/{product_id}"))?;
        self.admin_empty(self.http.delete(url)).await
    }

    pub async fn set_product_position(&self, product_id: ProductId, position: u32) -> Result<()> {
        let url = self.endpoint(&format!("api/products/{product_id}/position"))?;
        self.admin_empty(self.http.put(url).json(&SetPositionRequest { position }))
            .await
    }

    pub async fn create_testimonial(&self, draft: &TestimonialDraft) -> Result<Testimonial> {
        self.admin_json(self.http.post(self.endpoint("api/testimonials")?), draft)
            .await
    }

    pub async fn update_testimonial(
        &self,
        testimonial_id: TestimonialId,
        draft: &TestimonialDraft,
    ) -> Result<Testimonial> {
        let url = self.endpoint(&format!("api/testimonials/{testimonial_id}"))?;
        self.admin_json(self.http.put(url), draft).await
    }

    pub async fn delete_testimonial(&self, testimonial_id: TestimonialId) -> Result<()> {
        let url = self.endpoint(&format!("api/testimonials/{testimonial_id}"))?;
        self.admin_empty(self.http.delete(url)).await
    }

    pub async fn set_testimonial_position(
        &self,
        testimonial_id: TestimonialId,
        position: u32,
    ) -> Result<()> {
        let url = self.endpoint(&format!("api/testimonials/{testimonial_id}/position"))?;
        self.admin_empty(self.http.put(url).json(&SetPositionRequest { position }))
            .await
    }

    /// Moves one product in `items` (the order currently on screen) and
    /// persists the renumbered positions one request per changed item.
    pub async fn reorder_products(
        &self,
        items: Vec<Product>,
        from: usize,
        to: usize,
    ) -> Result<ReorderedPage<Product>> {
        self.reorder_remote(items, from, to).await
    }

    pub async fn reorder_testimonials(
        &self,
        items: Vec<Testimonial>,
        from: usize,
        to: usize,
    ) -> Result<ReorderedPage<Testimonial>> {
        self.reorder_remote(items, from, to).await
    }

    async fn reorder_remote<T>(
        &self,
        items: Vec<T>,
        from: usize,
        to: usize,
    ) -> Result<ReorderedPage<T>>
    where
        T: OrderedItem,
        Self: PositionStore<T::Id>,
    {
        if !self.is_admin().await {
            return Err(ClientError::NotAuthenticated);
        }
        let coordinator = ReorderCoordinator::with_refresh(self.clone(), self.refresh.clone());
        let report = coordinator.reorder(items, from, to).await?;
        if !report.outcome.is_success() {
            warn!(
                collection = %T::COLLECTION,
                outcome = ?report.outcome,
                "reorder only partially saved; refreshing from server"
            );
        }
        let page = self.fetch_page().await;
        if let Err(error) = &page {
            warn!(collection = %T::COLLECTION, %error, "page refresh after reorder failed");
        }
        Ok(ReorderedPage { report, page })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let guard = self.session.read().await;
        let session = guard.as_ref().ok_or(ClientError::NotAuthenticated)?;
        Ok(request.bearer_auth(&session.token))
    }

    async fn admin_json<B, T>(&self, request: RequestBuilder, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorized(request).await?.json(body);
        self.send_json(request).await
    }

    async fn admin_empty(&self, request: RequestBuilder) -> Result<()> {
        let request = self.authorized(request).await?;
        self.send(request).await?;
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json().await?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ApiError>(&body)
            .unwrap_or_else(|_| ApiError::new(ErrorCode::Internal, body));
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Expired or revoked on the server side.
            *self.session.write().await = None;
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            error,
        })
    }
}

#[async_trait]
impl PositionStore<ProductId> for StorefrontClient {
    async fn set_position(&self, id: ProductId, position: u32) -> anyhow::Result<()> {
        self.set_product_position(id, position).await?;
        Ok(())
    }
}

#[async_trait]
impl PositionStore<TestimonialId> for StorefrontClient {
    async fn set_position(&self, id: TestimonialId, position: u32) -> anyhow::Result<()> {
        self.set_testimonial_position(id, position).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
