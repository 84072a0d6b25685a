use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::product::{ProductKind, ProductSpec};
use crate::normalize::normalize_value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(flag) => Value::Bool(*flag),
            Self::Integer(number) => Value::from(*number),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(flag) => write!(f, "{flag}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Fields gathered for one product, accumulated across turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedInfo(BTreeMap<String, FieldValue>);

impl CollectedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.0.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        !self.0.values().any(|value| !value.is_empty())
    }

    pub fn is_collected(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|value| !value.is_empty())
    }

    pub fn missing_fields(&self, spec: &ProductSpec) -> Vec<String> {
        spec.required_fields()
            .filter(|name| !self.is_collected(name))
            .map(str::to_string)
            .collect()
    }

    pub fn is_complete(&self, spec: &ProductSpec) -> bool {
        spec.required_fields().all(|name| self.is_collected(name))
    }

    /// Merges extractor output. Values that are absent, empty or fail
    /// normalisation never replace what was already collected.
    pub fn merge(
        &mut self,
        spec: &ProductSpec,
        extracted: &Map<String, Value>,
        today: NaiveDate,
    ) -> Vec<String> {
        let mut updated = Vec::new();
        for (name, raw) in extracted {
            if name == "response" {
                continue;
            }
            let Some(field) = spec.field(name) else {
                continue;
            };
            let Some(value) = normalize_value(&field.kind, raw, today) else {
                continue;
            };
            if self.0.get(name) != Some(&value) {
                updated.push(name.clone());
            }
            self.0.insert(name.clone(), value);
        }
        updated
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.iter().map(|(name, value)| (name.clone(), value.to_json())).collect())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Collecting,
    Recommendation,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub recommended_plan: Option<String>,
    pub active_product: Option<ProductKind>,
}

/// Partial update applied to a session's conversation context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextUpdate {
    pub recommended_plan: Option<String>,
    pub active_product: Option<ProductKind>,
}

impl ContextUpdate {
    pub fn recommended_plan(plan: impl Into<String>) -> Self {
        Self { recommended_plan: Some(plan.into()), ..Self::default() }
    }

    pub fn active_product(product: ProductKind) -> Self {
        Self { active_product: Some(product), ..Self::default() }
    }
}

impl ConversationContext {
    pub fn apply(&mut self, update: ContextUpdate) {
        if let Some(plan) = update.recommended_plan {
            self.recommended_plan = Some(plan);
        }
        if let Some(product) = update.active_product {
            self.active_product = Some(product);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub collected_info: BTreeMap<ProductKind, CollectedInfo>,
    pub stages: BTreeMap<ProductKind, Stage>,
    pub context: ConversationContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            collected_info: BTreeMap::new(),
            stages: BTreeMap::new(),
            context: ConversationContext::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, product: ProductKind) -> Stage {
        self.stages.get(&product).copied().unwrap_or_default()
    }

    pub fn collected(&self, product: ProductKind) -> CollectedInfo {
        self.collected_info.get(&product).cloned().unwrap_or_default()
    }

    pub fn has_collected_anything(&self) -> bool {
        self.collected_info.values().any(|info| !info.is_empty())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use super::{CollectedInfo, FieldValue, Session, SessionId, Stage};
    use crate::domain::product::{car_spec, ProductKind};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date")
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn complete_car() -> CollectedInfo {
        let mut info = CollectedInfo::new();
        info.merge(
            &car_spec(),
            &object(json!({
                "car_model": "Toyota Corolla",
                "year_of_registration": 2019,
                "usage_type": "private",
                "plan_type": "Comprehensive",
                "policy_start_date": "2030-01-01",
            })),
            today(),
        );
        info
    }

    #[test]
    fn complete_car_scenario_satisfies_predicate() {
        let info = complete_car();
        let spec = car_spec();

        assert!(info.is_complete(&spec));
        assert!(info.missing_fields(&spec).is_empty());
        assert_eq!(info.get("year_of_registration"), Some(&FieldValue::Integer(2019)));
        assert!(info.is_complete(&spec), "predicate is idempotent");
    }

    #[test]
    fn null_extraction_never_erases_collected_fields() {
        let spec = car_spec();
        for field in spec.required_fields() {
            let mut info = complete_car();
            let before = info.clone();
            let mut extracted = Map::new();
            extracted.insert(field.to_string(), Value::Null);

            let updated = info.merge(&spec, &extracted, today());

            assert!(updated.is_empty());
            assert_eq!(info, before, "null for `{field}` must not change the mapping");
        }
    }

    #[test]
    fn empty_strings_and_lists_are_ignored() {
        let spec = car_spec();
        let mut info = complete_car();
        let before = info.clone();

        info.merge(&spec, &object(json!({ "car_model": "", "plan_type": [] })), today());

        assert_eq!(info, before);
        assert!(info.is_complete(&spec));
    }

    #[test]
    fn merge_overwrites_with_non_empty_values_and_skips_response() {
        let spec = car_spec();
        let mut info = complete_car();

        let updated = info.merge(
            &spec,
            &object(json!({
                "car_model": "Honda Civic",
                "response": "Noted!",
                "colour": "red",
            })),
            today(),
        );

        assert_eq!(updated, vec!["car_model".to_string()]);
        assert_eq!(info.get("car_model"), Some(&FieldValue::Text("Honda Civic".to_string())));
        assert!(info.get("response").is_none());
        assert!(info.get("colour").is_none());
    }

    #[test]
    fn partial_info_reports_missing_fields_in_spec_order() {
        let spec = car_spec();
        let mut info = CollectedInfo::new();
        info.merge(&spec, &object(json!({ "usage_type": "Commercial" })), today());

        assert!(!info.is_complete(&spec));
        assert_eq!(
            info.missing_fields(&spec),
            vec!["car_model", "year_of_registration", "plan_type", "policy_start_date"]
        );
        assert_eq!(info.get("usage_type"), Some(&FieldValue::Text("commercial".to_string())));
    }

    #[test]
    fn collected_info_serializes_as_plain_mapping() {
        let info = complete_car();
        let encoded = serde_json::to_value(&info).expect("serialize");

        assert_eq!(encoded["year_of_registration"], json!(2019));
        assert_eq!(encoded["usage_type"], json!("private"));
        assert_eq!(info.to_json(), encoded);
    }

    #[test]
    fn new_session_starts_collecting_with_nothing_gathered() {
        let session = Session::new(SessionId::new("s-1"));

        assert_eq!(session.stage(ProductKind::Car), Stage::Collecting);
        assert!(!session.has_collected_anything());
        assert!(session.collected(ProductKind::Car).is_empty());
    }
}
