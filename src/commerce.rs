//! Read-only Shopify Admin API access for catalogue enrichment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::CommerceConfig;

const ADMIN_API_VERSION: &str = "2023-07";
const PRODUCT_PAGE_SIZE: u32 = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("shop request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("shop API returned {status}")]
    Api { status: reqwest::StatusCode },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductVariant {
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

#[derive(Debug, Deserialize)]
struct ProductsEnvelope {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopInfo {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShopEnvelope {
    shop: ShopInfo,
}

#[derive(Clone)]
pub struct ShopifyClient {
    http: reqwest::Client,
    base_url_override: Option<String>,
}

impl ShopifyClient {
    pub fn new(http: reqwest::Client, base_url_override: Option<String>) -> Self {
        Self {
            http,
            base_url_override,
        }
    }

    fn admin_url(&self, shop_domain: &str, resource: &str) -> String {
        let base = match &self.base_url_override {
            Some(base) => base.clone(),
            None => format!("https://{shop_domain}.myshopify.com"),
        };
        format!("{base}/admin/api/{ADMIN_API_VERSION}/{resource}")
    }

    async fn get(&self, url: &str, access_token: &str) -> Result<reqwest::Response, CommerceError> {
        let response = self
            .http
            .get(url)
            .header("X-Shopify-Access-Token", access_token)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CommerceError::Api {
                status: response.status(),
            });
        }
        Ok(response)
    }

    /// First page of the shop's products, in shop order.
    pub async fn fetch_products(
        &self,
        config: &CommerceConfig,
    ) -> Result<Vec<Product>, CommerceError> {
        let url = format!(
            "{}?limit={PRODUCT_PAGE_SIZE}",
            self.admin_url(&config.shop_domain, "products.json")
        );
        let envelope = self
            .get(&url, &config.access_token)
            .await?
            .json::<ProductsEnvelope>()
            .await?;
        debug!(
            shop = %config.shop_domain,
            count = envelope.products.len(),
            "fetched products"
        );
        Ok(envelope.products)
    }

    /// Credential check used by the dashboard before saving an integration.
    pub async fn shop_info(
        &self,
        shop_domain: &str,
        access_token: &str,
    ) -> Result<ShopInfo, CommerceError> {
        let url = self.admin_url(shop_domain, "shop.json");
        let envelope = self
            .get(&url, access_token)
            .await?
            .json::<ShopEnvelope>()
            .await?;
        Ok(envelope.shop)
    }
}
