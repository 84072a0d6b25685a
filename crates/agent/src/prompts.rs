use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;
use serde_json::Value;

use coverwise_core::domain::product::{ProductKind, ProductSpec};
use coverwise_core::domain::session::CollectedInfo;
use coverwise_core::plans::PlanRules;

use crate::extractor::ConversationTurn;
use crate::llm::ChatRole;

/// Keeps only the most recent `limit` turns.
pub fn recent_history(history: &[ConversationTurn], limit: usize) -> &[ConversationTurn] {
    let start = history.len().saturating_sub(limit);
    &history[start..]
}

pub fn render_history(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return "(none)".to_string();
    }
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::System => "system",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System instructions for one collection turn: persona, the product's
/// required fields with their normalisation rules and today's date.
pub fn extraction_instructions(spec: &ProductSpec, today: NaiveDate) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", spec.persona);
    let _ = writeln!(prompt, "Collect ONLY these essentials for {}:", spec.display_name);
    for field in &spec.fields {
        match field.kind.rule_hint() {
            Some(hint) => {
                let _ = writeln!(prompt, "- {} ({}): {}", field.name, field.description, hint);
            }
            None => {
                let _ = writeln!(prompt, "- {} ({})", field.name, field.description);
            }
        }
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Rules:");
    let _ = writeln!(prompt, "- Today is {}.", today.format("%Y-%m-%d"));
    for rule in &spec.extra_rules {
        let _ = writeln!(prompt, "- {rule}");
    }
    let _ = writeln!(prompt, "- Leave a field null unless the user has clearly provided it.");
    let _ = writeln!(
        prompt,
        "- Always acknowledge what they gave and ask for the next missing item in `response`."
    );
    prompt
}

/// What has been gathered so far, so the model does not ask again.
pub fn render_collected(collected: &CollectedInfo) -> String {
    format!("Current collected: {}", compact_json(&collected.to_json()))
}

/// Prompt asking the model to pick one allowed tier for `rules.product_code`.
pub fn recommendation_prompt(
    rules: &PlanRules,
    collected: &BTreeMap<ProductKind, CollectedInfo>,
) -> String {
    let user_information: serde_json::Map<String, Value> = collected
        .iter()
        .map(|(product, info)| (product.info_key().to_string(), info.to_json()))
        .collect();
    let options = rules.options_label();

    format!(
        "You are an expert insurance recommendation assistant. Your task is to recommend an \
         insurance plan for the following product: {product}.\n\n\
         Choose the best plan from this exact set of allowed options: [{options}]\n\
         If information is ambiguous or insufficient, choose the default: \"{default}\".\n\n\
         User information: {info}\n\n\
         Respond with a JSON object containing a single key \"plan\" whose value is one of: {options}.",
        product = rules.product_code,
        default = rules.default_plan,
        info = compact_json(&Value::Object(user_information)),
    )
}

pub const RECOMMENDATION_REQUEST: &str = "Please recommend a plan in JSON format.";

/// Classification instructions listing the intents and the product codes the
/// model may return.
pub fn intent_instructions() -> String {
    let mut prompt = String::from(
        "You are an insurance assistant. Classify the message and determine the primary intent and product.\n\n\
         INTENTS:\n\
         - 'greeting': hello/hi/etc.\n\
         - 'unwanted': clearly off-topic or spam.\n\
         - 'informational': asks about terms/coverage/benefits (e.g., \"what is curtailment?\").\n\
         - 'policy_claim_status': wants to check a real policy or claim status.\n\
         - 'product_inquiry': wants to buy or get a quote for a policy.\n\n\
         PRODUCTS (return EXACTLY one of these values):\n",
    );
    for product in ProductKind::ALL {
        let _ = writeln!(prompt, "- '{}'", product.code());
    }
    prompt.push_str(
        "- 'POLICY_CLAIM_STATUS': the message is only about checking policy/claim status.\n\
         - 'UNKNOWN': if not clear.\n\n\
         RULES:\n\
         - For 'product_inquiry' and 'informational', identify the product if possible.\n\
         - Use the conversation history for context.\n\
         - Prefer 'informational' over 'unwanted' if the query is about insurance concepts.\n\
         - Return values MUST match the enums exactly.",
    );
    prompt
}

fn compact_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
