//! Plan tiers each product can be recommended, and the rules that turn a
//! free-form model answer into one of them.
//!
//! Everything here is deterministic: the model only ever proposes a string,
//! [`PlanRules::parse_model_reply`] decides which allowed tier it becomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NOT_AVAILABLE_PLAN: &str = "not available";
pub const NO_INFORMATION_REASON: &str = "No user information available for recommendation";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Recommendation {
    pub fn chosen(plan: impl Into<String>) -> Self {
        Self { plan: plan.into(), reason: None }
    }

    pub fn fallback(plan: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { plan: plan.into(), reason: Some(reason.into()) }
    }

    /// Returned when the session holds nothing to base a recommendation on.
    pub fn unavailable() -> Self {
        Self::fallback(NOT_AVAILABLE_PLAN, NO_INFORMATION_REASON)
    }

    pub fn is_available(&self) -> bool {
        self.plan != NOT_AVAILABLE_PLAN
    }
}

/// Case-insensitive pattern mapped onto a canonical option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasRule {
    pub pattern: &'static str,
    pub canonical: &'static str,
}

const fn alias(pattern: &'static str, canonical: &'static str) -> AliasRule {
    AliasRule { pattern, canonical }
}

const TRAVEL_OPTIONS: &[&str] = &["Basic", "Silver", "Gold", "Platinum"];
const MAID_OPTIONS: &[&str] = &["Basic", "Enhanced", "Premier", "Exclusive"];
const CAR_OPTIONS: &[&str] = &["Comprehensive", "TPFT", "TP"];
const STANDARD_OPTIONS: &[&str] = &["Standard"];

const NO_ALIASES: &[AliasRule] = &[];
const TRAVEL_ALIASES: &[AliasRule] = &[alias("platinium", "Platinum")];
const MAID_ALIASES: &[AliasRule] = &[alias("premium", "Premier")];
const CAR_ALIASES: &[AliasRule] = &[
    alias("third party fire & theft", "TPFT"),
    alias("third party fire and theft", "TPFT"),
    alias("third party only", "TP"),
    alias("third party", "TP"),
    alias("comp", "Comprehensive"),
    alias("comprehensive", "Comprehensive"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanRules {
    pub product_code: String,
    pub allowed_options: &'static [&'static str],
    pub default_plan: &'static str,
    pub aliases: &'static [AliasRule],
}

impl PlanRules {
    /// Looks up the static table; unknown codes get the generic single-option set.
    pub fn for_product(product_code: &str) -> Self {
        let product_code = product_code.trim().to_ascii_uppercase();
        let (allowed_options, default_plan, aliases) = match product_code.as_str() {
            "TRAVEL" => (TRAVEL_OPTIONS, "Gold", TRAVEL_ALIASES),
            "MAID" => (MAID_OPTIONS, "Premier", MAID_ALIASES),
            "CAR" => (CAR_OPTIONS, "Comprehensive", CAR_ALIASES),
            _ => (STANDARD_OPTIONS, "Standard", NO_ALIASES),
        };
        Self { product_code, allowed_options, default_plan, aliases }
    }

    pub fn options_label(&self) -> String {
        self.allowed_options.join(", ")
    }

    pub fn is_allowed(&self, plan: &str) -> bool {
        self.allowed_options.contains(&plan)
    }

    /// Applies the alias rules in order, then snaps an allowed option written
    /// in any casing onto its canonical spelling. Unmatched input is returned trimmed.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if let Some(rule) =
            self.aliases.iter().find(|rule| rule.pattern.eq_ignore_ascii_case(trimmed))
        {
            return rule.canonical.to_string();
        }
        if let Some(option) =
            self.allowed_options.iter().find(|option| option.eq_ignore_ascii_case(trimmed))
        {
            return (*option).to_string();
        }
        trimmed.to_string()
    }

    /// Normalises and validates; anything outside the allowed set becomes the default.
    pub fn resolve(&self, raw: &str) -> String {
        let normalized = self.normalize(raw);
        if self.is_allowed(&normalized) {
            normalized
        } else {
            tracing::warn!(
                event_name = "recommendation.plan_rejected",
                product = %self.product_code,
                proposed = %normalized,
                fallback = self.default_plan,
                "proposed plan is not an allowed option, using default"
            );
            self.default_plan.to_string()
        }
    }

    /// Interprets raw model text that should contain `{"plan": "..."}`.
    pub fn parse_model_reply(&self, raw: &str) -> Recommendation {
        let cleaned = strip_code_fences(raw);
        let parsed = match serde_json::from_str::<Value>(&cleaned) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    event_name = "recommendation.reply_unparseable",
                    product = %self.product_code,
                    error = %error,
                    "model reply is not JSON, using default plan"
                );
                return Recommendation::chosen(self.default_plan);
            }
        };

        match parsed.get("plan").and_then(Value::as_str) {
            Some(plan) => Recommendation::chosen(self.resolve(plan)),
            None => Recommendation::chosen(self.default_plan),
        }
    }
}

/// Removes Markdown code-fence markers around a JSON payload.
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim().replace("```json", "").replace("```", "").trim().to_string()
}
