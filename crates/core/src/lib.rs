//! # Apex Core
//!
//! The "Brain" of the Apex Store - contains all business logic and
//! session state management for the storefront.
//!
//! ## Architecture
//!
//! - `catalog/` - Immutable product catalog plus the filter/sort engine
//! - `cart` - Cart store (line items, totals, checkout transition)
//! - `coach` - Conversation accumulator for the AI coach panel
//! - `insight/` - Boundary to the hosted generative model (tips, macros,
//!   product analysis, streamed coaching replies)
//! - `session` - Per-user session context owning cart, filters and coach
//! - `events` - Store event vocabulary for the SSE feed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apex_core::catalog::Catalog;
//! use apex_core::session::Session;
//!
//! let catalog = Catalog::builtin()?;
//! let mut session = Session::new();
//! session.cart.add(catalog.get("1").unwrap());
//! ```

pub mod cart;
pub mod catalog;
pub mod coach;
pub mod events;
pub mod insight;
pub mod session;
