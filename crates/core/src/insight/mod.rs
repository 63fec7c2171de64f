//! # Insight Provider
//!
//! Boundary to the hosted generative model that powers the health-tip,
//! macro-estimate, product-insight and coach panels. The storefront
//! consumes this trait; `GeminiInsight` is the production implementation.
//!
//! Failure contract: any call may fail (network, quota, malformed
//! response). Callers surface a generic notice and keep prior state; there
//! is no retry, no backoff, and no partial-result caching.

mod config;
mod error;
mod gemini;
pub mod prompts;

pub use config::{InsightConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::InsightError;
pub use gemini::GeminiInsight;

use crate::catalog::Category;
use crate::coach::ChatMessage;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A generated health tip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthTip {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Input to the macro estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroProfile {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age: u32,
    /// Free-form activity descriptor (e.g. "Highly Active")
    pub activity_level: String,
    /// Free-form goal descriptor (e.g. "Muscle Gain")
    pub goal: String,
}

impl MacroProfile {
    /// Reject profiles no estimate could be produced for. Checked before
    /// any provider request is issued.
    pub fn validate(&self) -> Result<(), InsightError> {
        if !self.weight_kg.is_finite() || self.weight_kg <= 0.0 {
            return Err(InsightError::InvalidProfile(
                "weight must be a positive number of kilograms".to_string(),
            ));
        }
        if !self.height_cm.is_finite() || self.height_cm <= 0.0 {
            return Err(InsightError::InvalidProfile(
                "height must be a positive number of centimeters".to_string(),
            ));
        }
        if self.age == 0 || self.age > 130 {
            return Err(InsightError::InvalidProfile(
                "age must be between 1 and 130".to_string(),
            ));
        }
        Ok(())
    }
}

/// A generated daily macro split
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroEstimate {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
    pub explanation: String,
}

/// A generated expert take on one product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductInsight {
    pub verdict: String,
    pub benefits: Vec<String>,
    pub pro_tip: String,
}

/// Ordered text fragments of one streamed coach reply. The stream is
/// finite; a transport drop mid-stream surfaces as a terminal `Err` item
/// rather than a hang.
pub type ChatFragmentStream = Pin<Box<dyn Stream<Item = Result<String, InsightError>> + Send>>;

/// The four request shapes the storefront makes against the hosted model
#[async_trait]
pub trait InsightProvider: Send + Sync {
    /// Single request/response: expert tip for a picked topic
    async fn health_tip(&self, topic: &str) -> Result<HealthTip, InsightError>;

    /// Single request/response: daily macro targets for a profile
    async fn macro_estimate(&self, profile: &MacroProfile) -> Result<MacroEstimate, InsightError>;

    /// Single request/response: expert insight for one catalog product
    async fn product_insight(
        &self,
        product_name: &str,
        category: Category,
    ) -> Result<ProductInsight, InsightError>;

    /// Open a streaming reply to a new coach message. `history` is the
    /// committed conversation so far, excluding `message`.
    async fn chat_stream(
        &self,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<ChatFragmentStream, InsightError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::Conversation;
    use futures::{stream, StreamExt};

    /// Scripted provider double: plays back canned fragments, optionally
    /// ending with a transport error.
    struct ScriptedProvider {
        fragments: Vec<String>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl InsightProvider for ScriptedProvider {
        async fn health_tip(&self, _topic: &str) -> Result<HealthTip, InsightError> {
            Err(InsightError::Malformed("not scripted".to_string()))
        }

        async fn macro_estimate(
            &self,
            profile: &MacroProfile,
        ) -> Result<MacroEstimate, InsightError> {
            profile.validate()?;
            Err(InsightError::Malformed("not scripted".to_string()))
        }

        async fn product_insight(
            &self,
            _product_name: &str,
            _category: Category,
        ) -> Result<ProductInsight, InsightError> {
            Err(InsightError::Malformed("not scripted".to_string()))
        }

        async fn chat_stream(
            &self,
            _history: &[ChatMessage],
            _message: &str,
        ) -> Result<ChatFragmentStream, InsightError> {
            let mut items: Vec<Result<String, InsightError>> =
                self.fragments.iter().cloned().map(Ok).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(InsightError::Malformed("stream dropped".to_string())));
            }
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// Drive a scripted stream into a conversation the way the server
    /// does: fragments append, end-of-stream commits, an error fragment
    /// fails the reply.
    async fn run_chat(provider: &dyn InsightProvider, conversation: &mut Conversation, msg: &str) {
        let history = conversation.history().to_vec();
        conversation.begin_reply(msg).unwrap();
        let mut fragments = provider.chat_stream(&history, msg).await.unwrap();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => conversation.push_fragment(&text).unwrap(),
                Err(_) => {
                    conversation.fail_reply().unwrap();
                    return;
                }
            }
        }
        conversation.finish_reply().unwrap();
    }

    #[tokio::test]
    async fn test_streamed_reply_is_committed_in_order() {
        let provider = ScriptedProvider {
            fragments: vec!["Lift ".to_string(), "heavy, ".to_string(), "rest hard.".to_string()],
            fail_after: None,
        };
        let mut conversation = Conversation::new();

        run_chat(&provider, &mut conversation, "Any advice?").await;

        let last = conversation.history().last().unwrap();
        assert_eq!(last.text, "Lift heavy, rest hard.");
        assert!(!conversation.is_typing());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_commits_notice_not_partial() {
        let provider = ScriptedProvider {
            fragments: vec!["You should".to_string(), " definitely".to_string()],
            fail_after: Some(1),
        };
        let mut conversation = Conversation::new();

        run_chat(&provider, &mut conversation, "Any advice?").await;

        let last = conversation.history().last().unwrap();
        assert_eq!(last.text, crate::coach::FAILURE_NOTICE);
        assert!(!conversation.is_typing());
        assert!(!conversation.history().iter().any(|m| m.text == "You should"));
    }

    #[test]
    fn test_failed_estimate_leaves_previous_result_untouched() {
        let provider = ScriptedProvider {
            fragments: vec![],
            fail_after: None,
        };
        // The previously displayed estimate, owned by the caller.
        let mut displayed = Some(MacroEstimate {
            calories: 3100.0,
            protein: 190.0,
            carbs: 380.0,
            fats: 85.0,
            explanation: "Surplus for lean gain.".to_string(),
        });

        let profile = MacroProfile {
            weight_kg: 85.0,
            height_cm: 180.0,
            age: 25,
            activity_level: "Highly Active".to_string(),
            goal: "Muscle Gain".to_string(),
        };

        let outcome = tokio_test::block_on(provider.macro_estimate(&profile));
        assert!(outcome.is_err());

        // On failure the caller keeps the prior estimate as-is.
        if let Ok(fresh) = outcome {
            displayed = Some(fresh);
        }
        assert_eq!(displayed.as_ref().unwrap().calories, 3100.0);
    }

    #[test]
    fn test_profile_validation() {
        let valid = MacroProfile {
            weight_kg: 85.0,
            height_cm: 180.0,
            age: 25,
            activity_level: "Sedentary".to_string(),
            goal: "Fat Loss".to_string(),
        };
        assert!(valid.validate().is_ok());

        let negative_weight = MacroProfile {
            weight_kg: -10.0,
            ..valid.clone()
        };
        assert!(matches!(
            negative_weight.validate(),
            Err(InsightError::InvalidProfile(_))
        ));

        let nan_height = MacroProfile {
            height_cm: f64::NAN,
            ..valid.clone()
        };
        assert!(nan_height.validate().is_err());

        let unborn = MacroProfile { age: 0, ..valid };
        assert!(unborn.validate().is_err());
    }
}
