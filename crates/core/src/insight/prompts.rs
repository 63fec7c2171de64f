//! Prompt templates bundled at compile time.
//!
//! Each insight call sends one of these as the system instruction; the
//! user content carries only the per-request fields.

/// Health tip generator - short expert tip for a picked topic
pub const HEALTH_TIP: &str = include_str!("defaults/health_tip.md");

/// Macro estimator - daily calorie/macro split for a profile
pub const MACRO_ESTIMATE: &str = include_str!("defaults/macro_estimate.md");

/// Product analyst - verdict, benefits and a pro tip for one product
pub const PRODUCT_INSIGHT: &str = include_str!("defaults/product_insight.md");

/// Coach persona for the conversational panel
pub const COACH: &str = include_str!("defaults/coach.md");

/// All templates with their slugs
pub fn all() -> Vec<(&'static str, &'static str)> {
    vec![
        ("health_tip", HEALTH_TIP),
        ("macro_estimate", MACRO_ESTIMATE),
        ("product_insight", PRODUCT_INSIGHT),
        ("coach", COACH),
    ]
}
