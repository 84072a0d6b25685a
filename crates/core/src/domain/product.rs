use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductKind {
    Travel,
    Maid,
    Car,
    Family,
    Choice,
    Early,
}

impl ProductKind {
    pub const ALL: [ProductKind; 6] =
        [Self::Travel, Self::Maid, Self::Car, Self::Family, Self::Choice, Self::Early];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Travel => "TRAVEL",
            Self::Maid => "MAID",
            Self::Car => "CAR",
            Self::Family => "FAMILY",
            Self::Choice => "CHOICE",
            Self::Early => "EARLY",
        }
    }

    /// Key under which the product's collected fields live in a session.
    pub fn info_key(&self) -> &'static str {
        match self {
            Self::Travel => "travel_info",
            Self::Maid => "maid_info",
            Self::Car => "car_info",
            Self::Family => "family_info",
            Self::Choice => "choice_info",
            Self::Early => "early_info",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ProductKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == normalized)
            .ok_or_else(|| DomainError::UnknownProduct(value.trim().to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Date(DateBound),
    Choice(&'static [&'static str]),
}

/// Which side of today a date field may fall on. Today is always allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateBound {
    /// Start dates: today or later.
    NotBeforeToday,
    /// Birth dates: today or earlier.
    NotAfterToday,
}

impl FieldKind {
    fn json_type(&self) -> Value {
        match self {
            Self::Text | Self::Date(_) | Self::Choice(_) => json!(["string", "null"]),
            Self::Integer => json!(["integer", "null"]),
            Self::Boolean => json!(["boolean", "null"]),
        }
    }

    /// Normalisation rule shown to the model next to the field name.
    pub fn rule_hint(&self) -> Option<String> {
        match self {
            Self::Text | Self::Integer => None,
            Self::Boolean => Some("true/false; map yes/no answers to booleans".to_string()),
            Self::Date(DateBound::NotBeforeToday) => {
                Some("YYYY-MM-DD; must be today or later, ask again if in the past".to_string())
            }
            Self::Date(DateBound::NotAfterToday) => Some(
                "YYYY-MM-DD with a four-digit year; convert DD/MM/YYYY or DD-MM-YYYY to YYYY-MM-DD"
                    .to_string(),
            ),
            Self::Choice(options) => Some(format!("one of: {}", options.join(" / "))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, kind, description }
    }
}

/// Product-specific wording used once all fields are collected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecommendationCopy {
    /// `{plan}` is replaced with the chosen tier.
    pub headline: &'static str,
    pub next_steps: [&'static str; 3],
    pub apology: &'static str,
}

impl RecommendationCopy {
    pub fn render(&self, plan: &str) -> String {
        let mut message = self.headline.replace("{plan}", plan);
        message.push_str("\n\n**What's Next?**");
        for step in &self.next_steps {
            message.push('\n');
            message.push_str(step);
        }
        message
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductSpec {
    pub product: ProductKind,
    pub display_name: &'static str,
    pub persona: &'static str,
    pub fields: Vec<FieldSpec>,
    pub extra_rules: Vec<&'static str>,
    pub copy: RecommendationCopy,
}

impl ProductSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    pub fn schema_name(&self) -> String {
        format!("{}_info", self.product.code().to_ascii_lowercase())
    }

    /// Structured-output schema: every product field is optional, `response` is mandatory.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(
                field.name.to_string(),
                json!({ "type": field.kind.json_type(), "description": field.description }),
            );
        }
        properties.insert(
            "response".to_string(),
            json!({ "type": "string", "description": "The assistant's conversational reply." }),
        );

        json!({
            "type": "object",
            "properties": properties,
            "required": ["response"],
            "additionalProperties": false,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ProductCatalog {
    specs: BTreeMap<ProductKind, ProductSpec>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog.register(car_spec());
        catalog.register(choice_spec());
        catalog.register(early_spec());
        catalog
    }
}

impl ProductCatalog {
    pub fn empty() -> Self {
        Self { specs: BTreeMap::new() }
    }

    pub fn register(&mut self, spec: ProductSpec) {
        self.specs.insert(spec.product, spec);
    }

    pub fn get(&self, product: ProductKind) -> Option<&ProductSpec> {
        self.specs.get(&product)
    }

    pub fn products(&self) -> impl Iterator<Item = ProductKind> + '_ {
        self.specs.keys().copied()
    }
}

const USAGE_TYPES: &[&str] = &["private", "commercial"];
const PAYMENT_FREQUENCIES: &[&str] = &["monthly", "yearly"];
const GENDERS: &[&str] = &["male", "female"];

pub fn car_spec() -> ProductSpec {
    ProductSpec {
        product: ProductKind::Car,
        display_name: "Car Protect 360",
        persona: "You are a helpful car insurance assistant.",
        fields: vec![
            FieldSpec::new(
                "car_model",
                FieldKind::Text,
                "Vehicle make/model, e.g., 'Toyota Corolla'.",
            ),
            FieldSpec::new(
                "year_of_registration",
                FieldKind::Integer,
                "First registration year, e.g., 2019.",
            ),
            FieldSpec::new("usage_type", FieldKind::Choice(USAGE_TYPES), "private or commercial"),
            FieldSpec::new("plan_type", FieldKind::Text, "e.g., Comprehensive"),
            FieldSpec::new(
                "policy_start_date",
                FieldKind::Date(DateBound::NotBeforeToday),
                "YYYY-MM-DD",
            ),
        ],
        extra_rules: vec![
            "If the user gives a bare year after being asked for the registration year, map it to year_of_registration.",
        ],
        copy: RecommendationCopy {
            headline: "Based on what you've shared, I recommend the **{plan}** plan for Car Protect 360.",
            next_steps: [
                "- Ask me to *compare plan options*",
                "- Ask any *coverage* questions",
                "- Say **\"proceed with purchase\"** when ready",
            ],
            apology: "I'm having trouble generating a car insurance recommendation right now.\nPlease try again shortly, or ask me specific questions about plans/coverage.",
        },
    }
}

pub fn choice_spec() -> ProductSpec {
    ProductSpec {
        product: ProductKind::Choice,
        display_name: "Choice Protect",
        persona: "You are a Choice Protect assistant.",
        fields: vec![
            FieldSpec::new(
                "policy_start_date",
                FieldKind::Date(DateBound::NotBeforeToday),
                "YYYY-MM-DD",
            ),
            FieldSpec::new("cep_customer", FieldKind::Boolean, "CEP customer?"),
            FieldSpec::new("first_time_cep", FieldKind::Boolean, "First CEP purchase?"),
            FieldSpec::new("riders", FieldKind::Boolean, "Include riders?"),
            FieldSpec::new("spouse_coverage", FieldKind::Boolean, "Include spouse?"),
            FieldSpec::new("children_coverage", FieldKind::Boolean, "Include children?"),
            FieldSpec::new(
                "premium_payment_frequency",
                FieldKind::Choice(PAYMENT_FREQUENCIES),
                "monthly or yearly",
            ),
        ],
        extra_rules: Vec::new(),
        copy: RecommendationCopy {
            headline: "Based on what you've shared, I recommend the **{plan}** plan for Choice Protect.",
            next_steps: [
                "- Ask to *compare riders/options*",
                "- Ask *coverage* questions",
                "- Say **\"proceed with purchase\"** when ready",
            ],
            apology: "I'm having trouble generating a Choice Protect recommendation right now.\nPlease try again shortly, or ask plan/coverage questions.",
        },
    }
}

pub fn early_spec() -> ProductSpec {
    ProductSpec {
        product: ProductKind::Early,
        display_name: "Early Protect",
        persona: "You are a critical illness insurance assistant.",
        fields: vec![
            FieldSpec::new("customer_name", FieldKind::Text, "Full name"),
            FieldSpec::new(
                "date_of_birth",
                FieldKind::Date(DateBound::NotAfterToday),
                "YYYY-MM-DD",
            ),
            FieldSpec::new("gender", FieldKind::Choice(GENDERS), "male/female"),
            FieldSpec::new("smoker", FieldKind::Boolean, "true if smoker"),
            FieldSpec::new("email", FieldKind::Text, "email address"),
            FieldSpec::new("mobile", FieldKind::Text, "contact number"),
            FieldSpec::new("cover_units", FieldKind::Integer, "Number of CI cover units"),
            FieldSpec::new("product_code", FieldKind::Text, "Internal product code"),
        ],
        extra_rules: Vec::new(),
        copy: RecommendationCopy {
            headline: "Based on what you've shared, I recommend the **{plan}** plan for Early Protect.",
            next_steps: [
                "- Ask to *compare plan options*",
                "- Ask any *coverage* questions",
                "- Say **\"proceed with purchase\"** when ready",
            ],
            apology: "I'm having trouble generating a recommendation right now.\nPlease try again shortly, or ask me plan/coverage questions.",
        },
    }
}
