//! # Product Catalog
//!
//! The immutable product set the storefront sells. Products are compiled
//! into the binary as a versioned JSON document, parsed once at startup,
//! and never mutated afterwards.

mod filter;

pub use filter::{FilterState, SortMode};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Product category (closed set)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Protein,
    Vitamins,
    Supplements,
    Gear,
}

impl Category {
    /// Get all categories, in storefront display order
    pub fn all() -> Vec<Category> {
        vec![
            Category::Protein,
            Category::Vitamins,
            Category::Supplements,
            Category::Gear,
        ]
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Protein => "Proteins",
            Category::Vitamins => "Vitamins",
            Category::Supplements => "Supplements",
            Category::Gear => "Athletic Gear",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Protein => "protein",
            Category::Vitamins => "vitamins",
            Category::Supplements => "supplements",
            Category::Gear => "gear",
        }
    }

    /// Parse a category id as used in API payloads
    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "protein" => Some(Category::Protein),
            "vitamins" => Some(Category::Vitamins),
            "supplements" => Some(Category::Supplements),
            "gear" => Some(Category::Gear),
            _ => None,
        }
    }
}

/// Stock status of a product
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    Limited,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::Limited => "limited",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

/// Merchandising badge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    BestSeller,
    New,
    EliteChoice,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::BestSeller => "best_seller",
            Badge::New => "new",
            Badge::EliteChoice => "elite_choice",
        }
    }
}

/// A single purchasable item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier
    pub id: String,
    pub name: String,
    /// Unit price, non-negative currency amount
    pub price: f64,
    pub category: Category,
    pub description: String,
    /// Image reference (URL)
    pub image: String,
    /// Customer rating, 0-5
    pub rating: f64,
    #[serde(default)]
    pub stock_status: Option<StockStatus>,
    #[serde(default)]
    pub badge: Option<Badge>,
}

/// The full product set, loaded once at process start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalog document version
    pub version: u32,
    products: Vec<Product>,
}

impl Catalog {
    /// Load the catalog bundled at compile time
    pub fn builtin() -> Result<Self> {
        Self::from_json(include_str!("catalog.json"))
    }

    /// Parse a catalog document (useful for testing)
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog =
            serde_json::from_str(json).context("Failed to parse catalog document")?;

        for product in &catalog.products {
            if product.price < 0.0 {
                anyhow::bail!("Product {} has a negative price", product.id);
            }
        }

        Ok(catalog)
    }

    /// Look up a product by identifier
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// All products in declaration order
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        assert_eq!(catalog.version, 1);
    }

    #[test]
    fn test_product_lookup() {
        let catalog = Catalog::builtin().unwrap();
        let product = catalog.get("1").expect("product 1 should exist");
        assert_eq!(product.category, Category::Protein);
        assert!(catalog.get("no-such-id").is_none());
    }

    #[test]
    fn test_category_ids_round_trip() {
        for category in Category::all() {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("spaceships"), None);
    }

    #[test]
    fn test_negative_price_rejected() {
        let doc = r#"{
            "version": 1,
            "products": [{
                "id": "x", "name": "Bad", "price": -1.0,
                "category": "gear", "description": "", "image": "", "rating": 4.0
            }]
        }"#;
        assert!(Catalog::from_json(doc).is_err());
    }

    #[test]
    fn test_catalog_serialization() {
        let catalog = Catalog::builtin().unwrap();
        let json = serde_json::to_string(catalog.get("3").unwrap()).unwrap();
        assert!(json.contains("supplements"));
        assert!(json.contains("elite_choice"));
    }
}
