use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOffer {
    pub order_min_value: Decimal,
    pub discount_value: Decimal,
    pub discount_text: String,
    pub is_percentage: bool,
}

impl Default for ShippingOffer {
    fn default() -> Self {
        Self {
            order_min_value: Decimal::from(800),
            discount_value: Decimal::from(60),
            discount_text: "60 %".to_string(),
            is_percentage: true,
        }
    }
}

/// Raw entry of the backend's `ShippingOffer` list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOfferPayload {
    #[serde(default)]
    pub order_min_value: Option<Decimal>,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub value_text: Option<String>,
}

impl From<ShippingOfferPayload> for ShippingOffer {
    fn from(payload: ShippingOfferPayload) -> Self {
        let fallback = ShippingOffer::default();
        let positive = |v: Option<Decimal>| v.filter(|v| *v > Decimal::ZERO);
        Self {
            order_min_value: positive(payload.order_min_value).unwrap_or(fallback.order_min_value),
            discount_value: positive(payload.value).unwrap_or(fallback.discount_value),
            is_percentage: payload
                .value_text
                .as_deref()
                .map(|t| t.contains('%'))
                .unwrap_or(true),
            discount_text: payload
                .value_text
                .filter(|t| !t.is_empty())
                .unwrap_or(fallback.discount_text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuote {
    pub delivery_fee: Decimal,
    pub shipping_discount: Decimal,
    pub qualifies_for_discount: bool,
    pub amount_until_free_shipping: Decimal,
    pub progress_percentage: Decimal,
    pub threshold: Decimal,
    pub discount_text: String,
}

impl ShippingOffer {
    pub fn quote(&self, subtotal: Decimal, base_delivery_fee: Decimal) -> ShippingQuote {
        let qualifies = subtotal >= self.order_min_value;
        let hundred = Decimal::from(100);

        let (delivery_fee, discount) = if qualifies {
            let discount = if self.is_percentage {
                base_delivery_fee * self.discount_value / hundred
            } else {
                self.discount_value
            };
            ((base_delivery_fee - discount).max(Decimal::ZERO), discount)
        } else {
            (base_delivery_fee, Decimal::ZERO)
        };

        let progress = if self.order_min_value.is_zero() {
            hundred
        } else {
            (subtotal / self.order_min_value * hundred).min(hundred)
        };

        ShippingQuote {
            delivery_fee,
            shipping_discount: discount,
            qualifies_for_discount: qualifies,
            amount_until_free_shipping: (self.order_min_value - subtotal).max(Decimal::ZERO),
            progress_percentage: progress,
            threshold: self.order_min_value,
            discount_text: self.discount_text.clone(),
        }
    }
}
