//! # Catalog Filter/Sort Engine
//!
//! Derives a display list from the immutable product set. A pure function
//! of (catalog, filter state): no side effects, recomputed on every call.

use super::{Catalog, Category, Product};
use serde::{Deserialize, Serialize};

/// Sort mode for the catalog view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Catalog declaration order
    #[default]
    Default,
    PriceAsc,
    PriceDesc,
    RatingDesc,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::RatingDesc => "rating_desc",
        }
    }

    /// Parse a sort mode id as used in API payloads
    pub fn parse(s: &str) -> Option<SortMode> {
        match s {
            "default" => Some(Self::Default),
            "price_asc" => Some(Self::PriceAsc),
            "price_desc" => Some(Self::PriceDesc),
            "rating_desc" => Some(Self::RatingDesc),
            _ => None,
        }
    }
}

/// The combination of category, text query and sort mode driving the
/// catalog view. Owned by the session; never mutates products.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FilterState {
    /// Selected category, `None` meaning "All"
    pub category: Option<Category>,
    /// Free-text search query, matched against name and description
    pub query: String,
    pub sort: SortMode,
}

impl FilterState {
    /// Back to defaults: all categories, empty query, declaration order
    pub fn reset(&mut self) {
        *self = FilterState::default();
    }

    /// Whether any filter deviates from the defaults
    pub fn is_active(&self) -> bool {
        *self != FilterState::default()
    }

    /// Compute the ordered view of the catalog under this filter state.
    ///
    /// Filtering is conjunctive: a product must match the category selector
    /// (always true for "All") and the case-insensitive text query (always
    /// true when empty, matched against name OR description). Sorting is
    /// stable, so equal keys keep their pre-sort relative order. An empty
    /// result is a valid outcome, not an error.
    pub fn apply<'a>(&self, catalog: &'a Catalog) -> Vec<&'a Product> {
        let needle = self.query.to_lowercase();

        let mut result: Vec<&Product> = catalog
            .products()
            .iter()
            .filter(|p| match self.category {
                Some(category) => p.category == category,
                None => true,
            })
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
            })
            .collect();

        match self.sort {
            SortMode::Default => {}
            SortMode::PriceAsc => result.sort_by(|a, b| a.price.total_cmp(&b.price)),
            SortMode::PriceDesc => result.sort_by(|a, b| b.price.total_cmp(&a.price)),
            SortMode::RatingDesc => result.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> Catalog {
        Catalog::from_json(
            r#"{
            "version": 1,
            "products": [
                {"id": "a", "name": "Whey Shake", "price": 10.0, "category": "protein",
                 "description": "fast absorbing", "image": "", "rating": 4.0},
                {"id": "b", "name": "Creatine", "price": 20.0, "category": "supplements",
                 "description": "strength and power", "image": "", "rating": 5.0},
                {"id": "c", "name": "Belt", "price": 20.0, "category": "gear",
                 "description": "core stability", "image": "", "rating": 4.0},
                {"id": "d", "name": "Casein Shake", "price": 15.0, "category": "protein",
                 "description": "slow release", "image": "", "rating": 5.0}
            ]
        }"#,
        )
        .unwrap()
    }

    fn ids(products: &[&Product]) -> Vec<String> {
        products.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_default_state_passes_everything_in_order() {
        let catalog = sample_catalog();
        let view = FilterState::default().apply(&catalog);
        assert_eq!(ids(&view), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_category_filter() {
        let catalog = sample_catalog();
        let filters = FilterState {
            category: Some(Category::Protein),
            ..Default::default()
        };
        assert_eq!(ids(&filters.apply(&catalog)), vec!["a", "d"]);
    }

    #[test]
    fn test_query_is_case_insensitive_and_matches_both_fields() {
        let catalog = sample_catalog();

        let by_name = FilterState {
            query: "SHAKE".to_string(),
            ..Default::default()
        };
        assert_eq!(ids(&by_name.apply(&catalog)), vec!["a", "d"]);

        let by_description = FilterState {
            query: "stability".to_string(),
            ..Default::default()
        };
        assert_eq!(ids(&by_description.apply(&catalog)), vec!["c"]);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let catalog = sample_catalog();
        let filters = FilterState {
            category: Some(Category::Protein),
            query: "slow".to_string(),
            ..Default::default()
        };
        assert_eq!(ids(&filters.apply(&catalog)), vec!["d"]);
    }

    #[test]
    fn test_empty_result_is_valid() {
        let catalog = sample_catalog();
        let filters = FilterState {
            query: "nonexistent".to_string(),
            ..Default::default()
        };
        assert!(filters.apply(&catalog).is_empty());
    }

    #[test]
    fn test_price_sort_is_stable() {
        let catalog = sample_catalog();
        let filters = FilterState {
            sort: SortMode::PriceAsc,
            ..Default::default()
        };
        // b and c share price 20.0; they must keep declaration order.
        assert_eq!(ids(&filters.apply(&catalog)), vec!["a", "d", "b", "c"]);

        let filters = FilterState {
            sort: SortMode::PriceDesc,
            ..Default::default()
        };
        assert_eq!(ids(&filters.apply(&catalog)), vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn test_rating_sort_is_stable() {
        let catalog = sample_catalog();
        let filters = FilterState {
            sort: SortMode::RatingDesc,
            ..Default::default()
        };
        // b and d tie at 5.0, a and c tie at 4.0.
        assert_eq!(ids(&filters.apply(&catalog)), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_output_is_subset_of_catalog() {
        let catalog = sample_catalog();
        let filters = FilterState {
            category: Some(Category::Supplements),
            query: "power".to_string(),
            sort: SortMode::RatingDesc,
        };
        for product in filters.apply(&catalog) {
            assert!(catalog.get(&product.id).is_some());
        }
    }

    #[test]
    fn test_reset_and_is_active() {
        let mut filters = FilterState {
            category: Some(Category::Gear),
            query: "belt".to_string(),
            sort: SortMode::PriceDesc,
        };
        assert!(filters.is_active());

        filters.reset();
        assert!(!filters.is_active());
        assert_eq!(filters, FilterState::default());
    }

    #[test]
    fn test_sort_mode_ids_round_trip() {
        for mode in [
            SortMode::Default,
            SortMode::PriceAsc,
            SortMode::PriceDesc,
            SortMode::RatingDesc,
        ] {
            assert_eq!(SortMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SortMode::parse("alphabetical"), None);
    }
}
