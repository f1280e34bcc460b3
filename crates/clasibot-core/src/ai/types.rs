//! AI backend request types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::{Deserialize, Serialize};

/// One transaction to classify into a fixed list of names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Transaction name as it appears on the bank feed
    pub name: String,
    /// Absolute amount in dollars
    pub amount: f64,
    /// Company industry, when known
    pub industry: Option<String>,
    /// Where the company is located, when known
    pub location: Option<String>,
    /// The only acceptable answers
    pub categories: Vec<String>,
    /// Extra context (knowledge graph description, search snippets)
    pub context: Vec<String>,
}

impl ClassificationRequest {
    pub fn new(name: &str, amount: f64, categories: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            amount: amount.abs(),
            categories,
            ..Default::default()
        }
    }

    pub fn with_industry(mut self, industry: Option<&str>) -> Self {
        // the ledger reports missing industries as "None"/"Error"
        self.industry = industry
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "None" && *s != "Error")
            .map(str::to_string);
        self
    }

    pub fn with_location(mut self, location: Option<&str>) -> Self {
        self.location = location
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        if !context.trim().is_empty() {
            self.context.push(context);
        }
        self
    }
}
