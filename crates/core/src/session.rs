//! # Session Context
//!
//! The per-user session: one cart, one filter state, one coach
//! conversation, owned exclusively by the top-level application and passed
//! to handlers rather than living as ambient globals. Everything here is
//! in-memory and lost on process exit.

use crate::cart::Cart;
use crate::catalog::FilterState;
use crate::coach::Conversation;
use serde::{Deserialize, Serialize};

/// One user's in-memory session state
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Session {
    pub cart: Cart,
    pub filters: FilterState,
    #[serde(default)]
    pub coach: Conversation,
}

impl Session {
    /// A fresh session: empty cart, default filters, greeted coach
    pub fn new() -> Self {
        Self {
            cart: Cart::new(),
            filters: FilterState::default(),
            coach: Conversation::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn test_fresh_session() {
        let session = Session::new();
        assert!(session.cart.is_empty());
        assert!(!session.filters.is_active());
        assert!(!session.coach.is_typing());
    }

    #[test]
    fn test_checkout_resets_cart_but_not_filters() {
        let catalog = Catalog::builtin().unwrap();
        let mut session = Session::new();

        session.filters.query = "whey".to_string();
        session.cart.add(catalog.get("1").unwrap());
        session.cart.add(catalog.get("4").unwrap());

        let notice = session.cart.checkout();
        assert!(notice.subtotal > 0.0);
        assert!(session.cart.is_empty());
        assert_eq!(session.filters.query, "whey", "filters survive checkout");
    }
}
