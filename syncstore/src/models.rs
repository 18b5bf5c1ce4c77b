use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::schema::{EntityKind, Record};

pub type Metadata = BTreeMap<String, String>;

/// Typed view over a mirrored record.
pub trait SyncEntity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn to_record(&self) -> Result<Record, serde_json::Error> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "{} serialized to non-object {other}",
                Self::KIND
            ))),
        }
    }

    fn from_record(record: Record) -> Result<Self, serde_json::Error> {
        serde_json::from_value(JsonValue::Object(record))
    }
}

macro_rules! sync_entity {
    ($ty:ty, $kind:expr) => {
        impl SyncEntity for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

/// A reference that the provider returns either as a bare id or expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T: SyncEntity> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(object) => object.id(),
        }
    }
}

impl<T> From<&str> for Expandable<T> {
    fn from(id: &str) -> Self {
        Expandable::Id(id.to_string())
    }
}

/// Provider list envelope, e.g. `subscription.items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List<T> {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub url: Option<String>,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self {
            object: Some("list".to_string()),
            data: Vec::new(),
            has_more: Some(false),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    pub id: String,
    pub object: Option<String>,
    pub address: Option<JsonValue>,
    pub balance: Option<i64>,
    pub created: Option<i64>,
    pub currency: Option<String>,
    pub default_source: Option<String>,
    pub delinquent: Option<bool>,
    pub description: Option<String>,
    pub discount: Option<JsonValue>,
    pub email: Option<String>,
    pub invoice_prefix: Option<String>,
    pub invoice_settings: Option<JsonValue>,
    pub livemode: Option<bool>,
    pub metadata: Option<Metadata>,
    pub name: Option<String>,
    pub next_invoice_sequence: Option<i64>,
    pub phone: Option<String>,
    pub preferred_locales: Option<Vec<String>>,
    pub shipping: Option<JsonValue>,
    pub tax_exempt: Option<String>,
    /// Set on the tombstone the provider returns for removed customers.
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionItem {
    pub id: String,
    pub object: Option<String>,
    pub billing_thresholds: Option<JsonValue>,
    pub created: Option<i64>,
    pub deleted: Option<bool>,
    pub metadata: Option<Metadata>,
    pub price: Option<JsonValue>,
    pub quantity: Option<i64>,
    pub subscription: Option<String>,
    pub tax_rates: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub id: String,
    pub object: Option<String>,
    pub application_fee_percent: Option<f64>,
    pub billing_cycle_anchor: Option<i64>,
    pub billing_thresholds: Option<JsonValue>,
    pub cancel_at: Option<i64>,
    pub cancel_at_period_end: Option<bool>,
    pub canceled_at: Option<i64>,
    pub collection_method: Option<String>,
    pub created: Option<i64>,
    pub current_period_end: Option<i64>,
    pub current_period_start: Option<i64>,
    pub customer: Option<Expandable<Customer>>,
    pub days_until_due: Option<i64>,
    pub default_payment_method: Option<String>,
    pub default_source: Option<String>,
    pub default_tax_rates: Option<JsonValue>,
    pub discount: Option<JsonValue>,
    pub ended_at: Option<i64>,
    /// `None` when the payload carried no item list; such a subscription
    /// leaves its stored items untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<List<SubscriptionItem>>,
    pub latest_invoice: Option<String>,
    pub livemode: Option<bool>,
    pub metadata: Option<Metadata>,
    pub pause_collection: Option<JsonValue>,
    pub pending_setup_intent: Option<String>,
    pub pending_update: Option<JsonValue>,
    pub plan: Option<JsonValue>,
    pub schedule: Option<String>,
    pub start_date: Option<i64>,
    pub status: Option<String>,
    pub trial_end: Option<i64>,
    pub trial_start: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSchedule {
    pub id: String,
    pub object: Option<String>,
    pub canceled_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created: Option<i64>,
    pub current_phase: Option<JsonValue>,
    pub customer: Option<Expandable<Customer>>,
    pub default_settings: Option<JsonValue>,
    pub end_behavior: Option<String>,
    pub livemode: Option<bool>,
    pub metadata: Option<Metadata>,
    pub phases: Option<JsonValue>,
    pub released_at: Option<i64>,
    pub released_subscription: Option<String>,
    pub status: Option<String>,
    pub subscription: Option<String>,
}

/// One name/value pair shown on the invoice. Stored as an opaque ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Invoice {
    pub id: String,
    pub object: Option<String>,
    pub amount_due: Option<i64>,
    pub amount_paid: Option<i64>,
    pub amount_remaining: Option<i64>,
    pub auto_advance: Option<bool>,
    pub billing_reason: Option<String>,
    pub collection_method: Option<String>,
    pub created: Option<i64>,
    pub currency: Option<String>,
    pub custom_fields: Option<Vec<CustomField>>,
    pub customer: Option<Expandable<Customer>>,
    pub description: Option<String>,
    pub due_date: Option<i64>,
    pub footer: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub lines: Option<JsonValue>,
    pub livemode: Option<bool>,
    pub metadata: Option<Metadata>,
    pub number: Option<String>,
    pub paid: Option<bool>,
    pub period_end: Option<i64>,
    pub period_start: Option<i64>,
    pub status: Option<String>,
    pub subscription: Option<Expandable<Subscription>>,
    pub subtotal: Option<i64>,
    pub total: Option<i64>,
}

sync_entity!(Customer, EntityKind::Customer);
sync_entity!(Subscription, EntityKind::Subscription);
sync_entity!(SubscriptionSchedule, EntityKind::SubscriptionSchedule);
sync_entity!(Invoice, EntityKind::Invoice);
sync_entity!(SubscriptionItem, EntityKind::SubscriptionItem);
