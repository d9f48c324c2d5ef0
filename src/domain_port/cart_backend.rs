use crate::application_port::UpstreamError;
use crate::domain_model::*;

/// Credentials and language for one authorized backend call.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub token: AccessToken,
    pub locale: Locale,
}

#[async_trait::async_trait]
pub trait CartBackend: Send + Sync {
    async fn fetch_cart(&self, auth: &AuthContext) -> Result<CartSnapshot, UpstreamError>;
    async fn add_item(&self, auth: &AuthContext, item: &AddToCart) -> Result<serde_json::Value, UpstreamError>;
    async fn increment(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError>;
    async fn decrement(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError>;
    async fn delete(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError>;
    async fn clear(&self, auth: &AuthContext) -> Result<(), UpstreamError>;
    async fn checkout(&self, auth: &AuthContext, order: &CheckoutOrder) -> Result<serde_json::Value, UpstreamError>;
    /// Never fails: falls back to the default offer.
    async fn shipping_offer(&self, locale: Locale) -> ShippingOffer;
}
