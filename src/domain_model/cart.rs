use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartLineId(pub i64);

impl fmt::Display for CartLineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CartLineId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(CartLineId)
    }
}

/// One line of the cart as the backend reports it.
///
/// Field names follow the backend payload, including its `saleaPrice` spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: CartLineId,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_detail_id: Option<i64>,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub product_image: Option<String>,
    #[serde(default)]
    pub color_name: Option<String>,
    #[serde(default)]
    pub size_name: Option<String>,
    pub qty: u32,
    #[serde(default, rename = "saleaPrice")]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub discount_price: Option<Decimal>,
}

impl CartLine {
    pub fn unit_price(&self) -> Decimal {
        self.sale_price
            .filter(|p| !p.is_zero())
            .or(self.discount_price)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.qty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum CartMutation {
    Increment(CartLineId),
    Decrement(CartLineId),
    Delete(CartLineId),
    BatchDelete(Vec<CartLineId>),
}

impl CartMutation {
    pub fn ids(&self) -> Vec<CartLineId> {
        match self {
            CartMutation::Increment(id) | CartMutation::Decrement(id) | CartMutation::Delete(id) => {
                vec![*id]
            }
            CartMutation::BatchDelete(ids) => ids.clone(),
        }
    }

    pub fn removes(&self, id: CartLineId) -> bool {
        match self {
            CartMutation::Delete(deleted) => *deleted == id,
            CartMutation::BatchDelete(ids) => ids.contains(&id),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(default, rename = "cartProduccts")]
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub requires_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CartSnapshot {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self {
            lines,
            requires_login: false,
            error: None,
        }
    }

    pub fn line(&self, id: CartLineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    pub fn ids(&self) -> BTreeSet<CartLineId> {
        self.lines.iter().map(|line| line.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Pure transition used for the optimistic view. Unknown ids leave the
    /// snapshot unchanged and quantity never drops below one.
    pub fn apply(&self, mutation: &CartMutation) -> CartSnapshot {
        let lines = match mutation {
            CartMutation::Increment(id) => self
                .lines
                .iter()
                .map(|line| {
                    if line.id == *id {
                        CartLine {
                            qty: line.qty.saturating_add(1),
                            ..line.clone()
                        }
                    } else {
                        line.clone()
                    }
                })
                .collect(),
            CartMutation::Decrement(id) => self
                .lines
                .iter()
                .map(|line| {
                    if line.id == *id && line.qty > 1 {
                        CartLine {
                            qty: line.qty - 1,
                            ..line.clone()
                        }
                    } else {
                        line.clone()
                    }
                })
                .collect(),
            CartMutation::Delete(id) => self
                .lines
                .iter()
                .filter(|line| line.id != *id)
                .cloned()
                .collect(),
            CartMutation::BatchDelete(ids) => self
                .lines
                .iter()
                .filter(|line| !ids.contains(&line.id))
                .cloned()
                .collect(),
        };

        CartSnapshot {
            lines,
            requires_login: self.requires_login,
            error: self.error.clone(),
        }
    }

    pub fn apply_all<'a>(&self, mutations: impl IntoIterator<Item = &'a CartMutation>) -> Self {
        mutations
            .into_iter()
            .fold(self.clone(), |snapshot, mutation| snapshot.apply(mutation))
    }

    pub fn subtotal(&self, selection: &BTreeSet<CartLineId>) -> Decimal {
        self.lines
            .iter()
            .filter(|line| selection.contains(&line.id))
            .map(CartLine::total)
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn line(id: i64, qty: u32, price: i64) -> CartLine {
        CartLine {
            id: CartLineId(id),
            product_id: Some(id * 100),
            product_detail_id: Some(id * 1000),
            product_name: format!("product-{id}"),
            product_image: None,
            color_name: None,
            size_name: None,
            qty,
            sale_price: Some(Decimal::from(price)),
            discount_price: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::line;
    use super::*;

    fn snapshot() -> CartSnapshot {
        CartSnapshot::new(vec![line(3, 1, 10), line(5, 2, 20), line(7, 2, 5)])
    }

    fn qty(snapshot: &CartSnapshot, id: i64) -> Option<u32> {
        snapshot.line(CartLineId(id)).map(|line| line.qty)
    }

    #[test]
    fn increment_raises_only_the_target_line() {
        let next = snapshot().apply(&CartMutation::Increment(CartLineId(7)));
        assert_eq!(qty(&next, 7), Some(3));
        assert_eq!(qty(&next, 5), Some(2));
        assert_eq!(qty(&next, 3), Some(1));
    }

    #[test]
    fn decrement_stops_at_one() {
        let base = snapshot();
        let next = base.apply(&CartMutation::Decrement(CartLineId(3)));
        assert_eq!(next, base);

        let next = base.apply(&CartMutation::Decrement(CartLineId(5)));
        assert_eq!(qty(&next, 5), Some(1));
        let next = next.apply(&CartMutation::Decrement(CartLineId(5)));
        assert_eq!(qty(&next, 5), Some(1));
    }

    #[test]
    fn delete_and_batch_delete_keep_order_of_the_rest() {
        let next = snapshot().apply(&CartMutation::Delete(CartLineId(5)));
        let ids: Vec<_> = next.lines.iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![3, 7]);

        let next = snapshot().apply(&CartMutation::BatchDelete(vec![CartLineId(3), CartLineId(7)]));
        let ids: Vec<_> = next.lines.iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn unknown_id_is_a_no_op() {
        let base = snapshot();
        assert_eq!(base.apply(&CartMutation::Increment(CartLineId(99))), base);
        assert_eq!(base.apply(&CartMutation::Delete(CartLineId(99))), base);
    }

    #[test]
    fn reducer_is_deterministic() {
        let base = snapshot();
        let mutations = vec![
            CartMutation::Increment(CartLineId(7)),
            CartMutation::Decrement(CartLineId(5)),
            CartMutation::Delete(CartLineId(3)),
        ];
        let a = base.apply_all(&mutations);
        let b = base.apply_all(&mutations);
        assert_eq!(a, b);
        assert_eq!(qty(&a, 7), Some(3));
        assert_eq!(qty(&a, 5), Some(1));
        assert_eq!(qty(&a, 3), None);
        // the base snapshot is untouched
        assert_eq!(qty(&base, 3), Some(1));
    }

    #[test]
    fn subtotal_counts_selected_lines_only() {
        let base = snapshot();
        let selection: BTreeSet<_> = [CartLineId(5), CartLineId(7)].into_iter().collect();
        assert_eq!(base.subtotal(&selection), Decimal::from(50));
    }

    #[test]
    fn unit_price_falls_back_to_discount_price() {
        let mut l = line(1, 2, 0);
        l.discount_price = Some(Decimal::from(15));
        assert_eq!(l.total(), Decimal::from(30));

        l.discount_price = None;
        assert_eq!(l.total(), Decimal::ZERO);
    }

    #[test]
    fn decodes_backend_payload() {
        let json = r#"{
            "cartProduccts": [
                {"id": 7, "productId": 70, "productName": "Lipstick", "qty": 2,
                 "saleaPrice": 120.5, "discountPrice": null, "colorName": "Red"}
            ]
        }"#;
        let snapshot: CartSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].id, CartLineId(7));
        assert_eq!(snapshot.lines[0].total(), Decimal::new(2410, 1));
        assert!(!snapshot.requires_login);
    }
}
