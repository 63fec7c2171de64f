//! # Cart Store
//!
//! Line items for the active session. All operations are synchronous and
//! atomic from the caller's perspective; nothing here persists.

use crate::catalog::Product;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product paired with a purchase quantity.
///
/// Identity is the product identifier: the cart never holds two lines for
/// the same product. Quantity is always >= 1; dropping to zero is not a
/// removal path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: f64,
    pub quantity: u32,
}

impl CartLine {
    /// Price x quantity for this line
    pub fn line_total(&self) -> f64 {
        self.unit_price * self.quantity as f64
    }
}

/// Success notice returned by checkout. Informational only; there is no
/// payment processing behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutNotice {
    /// Final subtotal at the moment of checkout
    pub subtotal: f64,
    /// Total units purchased
    pub item_count: u32,
    pub completed_at: DateTime<Utc>,
    pub message: String,
}

/// The session cart: an ordered collection of lines, first-added first
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unit of a product. An existing line is incremented; a new
    /// line is appended at the end. Always succeeds.
    pub fn add(&mut self, product: &Product) {
        match self.lines.iter_mut().find(|l| l.product_id == product.id) {
            Some(line) => line.quantity += 1,
            None => self.lines.push(CartLine {
                product_id: product.id.clone(),
                name: product.name.clone(),
                unit_price: product.price,
                quantity: 1,
            }),
        }
    }

    /// Delete the line for a product. Absent lines are a no-op, not an
    /// error. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    /// Adjust a line's quantity by a signed delta, clamped at a floor of 1.
    /// Removal is only ever via `remove`. Absent lines are a no-op.
    /// Returns the new quantity if the line exists.
    pub fn update_quantity(&mut self, product_id: &str, delta: i64) -> Option<u32> {
        let line = self.lines.iter_mut().find(|l| l.product_id == product_id)?;
        let updated = (line.quantity as i64).saturating_add(delta).max(1);
        line.quantity = updated as u32;
        Some(line.quantity)
    }

    /// Sum of price x quantity over all lines; 0.0 for an empty cart
    pub fn subtotal(&self) -> f64 {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Display count: sum of quantities, not number of lines
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Terminal transition for the current cart session: computes the final
    /// subtotal, clears all lines, and returns the success notice. A new
    /// cart session begins empty immediately after.
    pub fn checkout(&mut self) -> CheckoutNotice {
        let notice = CheckoutNotice {
            subtotal: self.subtotal(),
            item_count: self.item_count(),
            completed_at: Utc::now(),
            message: "Transaction secured. Your order is on its way.".to_string(),
        };
        self.lines.clear();
        notice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Product};

    fn product(id: &str, price: f64, rating: f64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            price,
            category: Category::Supplements,
            description: String::new(),
            image: String::new(),
            rating,
            stock_status: None,
            badge: None,
        }
    }

    #[test]
    fn test_add_merges_lines_per_product() {
        let a = product("A", 10.0, 4.0);
        let b = product("B", 20.0, 5.0);

        let mut cart = Cart::new();
        cart.add(&a);
        cart.add(&a);
        cart.add(&b);

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].product_id, "A");
        assert_eq!(cart.lines()[0].quantity, 2);
        assert_eq!(cart.lines()[1].product_id, "B");
        assert_eq!(cart.lines()[1].quantity, 1);
        assert_eq!(cart.subtotal(), 40.0);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_add_preserves_first_added_order() {
        let mut cart = Cart::new();
        cart.add(&product("B", 20.0, 5.0));
        cart.add(&product("A", 10.0, 4.0));
        cart.add(&product("B", 20.0, 5.0));

        let order: Vec<&str> = cart.lines().iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_quantity_floor_holds_for_any_delta_sequence() {
        let mut cart = Cart::new();
        let a = product("A", 10.0, 4.0);
        cart.add(&a);
        cart.add(&a);

        assert_eq!(cart.update_quantity("A", -5), Some(1));
        assert_eq!(cart.update_quantity("A", -1), Some(1));
        assert_eq!(cart.update_quantity("A", 3), Some(4));
        assert_eq!(cart.update_quantity("A", i64::MIN), Some(1));
        assert_eq!(cart.lines().len(), 1, "decrement must never remove a line");
    }

    #[test]
    fn test_update_quantity_on_absent_line_is_noop() {
        let mut cart = Cart::new();
        assert_eq!(cart.update_quantity("ghost", 3), None);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_double_remove_is_safe() {
        let mut cart = Cart::new();
        cart.add(&product("A", 10.0, 4.0));

        assert!(cart.remove("A"));
        assert!(!cart.remove("A"));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_checkout_empties_cart() {
        let mut cart = Cart::new();
        cart.add(&product("A", 10.0, 4.0));
        cart.add(&product("A", 10.0, 4.0));
        cart.add(&product("B", 20.0, 5.0));

        let notice = cart.checkout();
        assert_eq!(notice.subtotal, 40.0);
        assert_eq!(notice.item_count, 3);
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), 0.0);

        // Checkout of the fresh cart still works and reports zero.
        let notice = cart.checkout();
        assert_eq!(notice.subtotal, 0.0);
        assert_eq!(notice.item_count, 0);
    }

    #[test]
    fn test_empty_cart_reads() {
        let cart = Cart::new();
        assert_eq!(cart.subtotal(), 0.0);
        assert_eq!(cart.item_count(), 0);
        assert!(cart.lines().is_empty());
    }
}
