use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Hero, Product, Testimonial};

/// Public landing page payload served by the cached read endpoint.
///
/// `version` increases whenever an admin mutation invalidates the server's
/// snapshot, so a client can tell a re-fetch apart from a stale copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    pub version: u64,
    pub hero: Hero,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub testimonials: Vec<Testimonial>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPositionRequest {
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub from_index: usize,
    pub to_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub writes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyLinkResponse {
    pub url: String,
}
