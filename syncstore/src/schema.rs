//! Static declarations for every mirrored entity kind.
//!
//! Each kind names its table, its columns, the reference fields that must be
//! present locally before a row is written, and (for subscriptions) the owned
//! child collection that is reconciled against the remote snapshot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::errors::{Result, StorageError};

/// An entity record as received from the provider or read back from storage.
pub type Record = Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "customers")]
    Customer,
    #[serde(rename = "subscriptions")]
    Subscription,
    #[serde(rename = "subscription_schedules")]
    SubscriptionSchedule,
    #[serde(rename = "invoices")]
    Invoice,
    #[serde(rename = "subscription_items")]
    SubscriptionItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Structured value stored as serialized JSON text.
    Json,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Json => "TEXT",
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

/// A field whose value is the id of another entity that must exist first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub kind: EntityKind,
}

/// A collection owned exclusively by its parent, reconciled by absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildCollection {
    pub kind: EntityKind,
    /// Field on the parent holding a provider list object (`{"data": [...]}`).
    pub list_field: &'static str,
    /// Column on the child pointing back at the parent id.
    pub parent_field: &'static str,
    /// Boolean column flipped when the child disappears from the snapshot.
    pub deleted_field: &'static str,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

use ColumnType::{Boolean, Integer, Json, Real, Text};

const CUSTOMER_COLUMNS: &[Column] = &[
    col("id", Text),
    col("object", Text),
    col("address", Json),
    col("balance", Integer),
    col("created", Integer),
    col("currency", Text),
    col("default_source", Text),
    col("delinquent", Boolean),
    col("description", Text),
    col("discount", Json),
    col("email", Text),
    col("invoice_prefix", Text),
    col("invoice_settings", Json),
    col("livemode", Boolean),
    col("metadata", Json),
    col("name", Text),
    col("next_invoice_sequence", Integer),
    col("phone", Text),
    col("preferred_locales", Json),
    col("shipping", Json),
    col("tax_exempt", Text),
    col("deleted", Boolean),
];

const SUBSCRIPTION_COLUMNS: &[Column] = &[
    col("id", Text),
    col("object", Text),
    col("application_fee_percent", Real),
    col("billing_cycle_anchor", Integer),
    col("billing_thresholds", Json),
    col("cancel_at", Integer),
    col("cancel_at_period_end", Boolean),
    col("canceled_at", Integer),
    col("collection_method", Text),
    col("created", Integer),
    col("current_period_end", Integer),
    col("current_period_start", Integer),
    col("customer", Text),
    col("days_until_due", Integer),
    col("default_payment_method", Text),
    col("default_source", Text),
    col("default_tax_rates", Json),
    col("discount", Json),
    col("ended_at", Integer),
    col("items", Json),
    col("latest_invoice", Text),
    col("livemode", Boolean),
    col("metadata", Json),
    col("pause_collection", Json),
    col("pending_setup_intent", Text),
    col("pending_update", Json),
    col("plan", Json),
    col("schedule", Text),
    col("start_date", Integer),
    col("status", Text),
    col("trial_end", Integer),
    col("trial_start", Integer),
];

const SUBSCRIPTION_SCHEDULE_COLUMNS: &[Column] = &[
    col("id", Text),
    col("object", Text),
    col("canceled_at", Integer),
    col("completed_at", Integer),
    col("created", Integer),
    col("current_phase", Json),
    col("customer", Text),
    col("default_settings", Json),
    col("end_behavior", Text),
    col("livemode", Boolean),
    col("metadata", Json),
    col("phases", Json),
    col("released_at", Integer),
    col("released_subscription", Text),
    col("status", Text),
    col("subscription", Text),
];

const INVOICE_COLUMNS: &[Column] = &[
    col("id", Text),
    col("object", Text),
    col("amount_due", Integer),
    col("amount_paid", Integer),
    col("amount_remaining", Integer),
    col("auto_advance", Boolean),
    col("billing_reason", Text),
    col("collection_method", Text),
    col("created", Integer),
    col("currency", Text),
    col("custom_fields", Json),
    col("customer", Text),
    col("description", Text),
    col("due_date", Integer),
    col("footer", Text),
    col("hosted_invoice_url", Text),
    col("invoice_pdf", Text),
    col("lines", Json),
    col("livemode", Boolean),
    col("metadata", Json),
    col("number", Text),
    col("paid", Boolean),
    col("period_end", Integer),
    col("period_start", Integer),
    col("status", Text),
    col("subscription", Text),
    col("subtotal", Integer),
    col("total", Integer),
];

const SUBSCRIPTION_ITEM_COLUMNS: &[Column] = &[
    col("id", Text),
    col("object", Text),
    col("billing_thresholds", Json),
    col("created", Integer),
    col("deleted", Boolean),
    col("metadata", Json),
    col("price", Json),
    col("quantity", Integer),
    col("subscription", Text),
    col("tax_rates", Json),
];

const CUSTOMER_REF: &[Reference] = &[Reference {
    field: "customer",
    kind: EntityKind::Customer,
}];

const INVOICE_REFS: &[Reference] = &[
    Reference {
        field: "customer",
        kind: EntityKind::Customer,
    },
    Reference {
        field: "subscription",
        kind: EntityKind::Subscription,
    },
];

const SUBSCRIPTION_REF: &[Reference] = &[Reference {
    field: "subscription",
    kind: EntityKind::Subscription,
}];

const SUBSCRIPTION_ITEMS: ChildCollection = ChildCollection {
    kind: EntityKind::SubscriptionItem,
    list_field: "items",
    parent_field: "subscription",
    deleted_field: "deleted",
};

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Customer,
        EntityKind::Subscription,
        EntityKind::SubscriptionSchedule,
        EntityKind::Invoice,
        EntityKind::SubscriptionItem,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Customer => "customers",
            EntityKind::Subscription => "subscriptions",
            EntityKind::SubscriptionSchedule => "subscription_schedules",
            EntityKind::Invoice => "invoices",
            EntityKind::SubscriptionItem => "subscription_items",
        }
    }

    /// Collection path on the provider's REST API.
    pub fn api_path(self) -> &'static str {
        self.table()
    }

    /// Value of the `object` field the provider puts on payloads of this kind.
    pub fn object_name(self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Subscription => "subscription",
            EntityKind::SubscriptionSchedule => "subscription_schedule",
            EntityKind::Invoice => "invoice",
            EntityKind::SubscriptionItem => "subscription_item",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            EntityKind::Customer => CUSTOMER_COLUMNS,
            EntityKind::Subscription => SUBSCRIPTION_COLUMNS,
            EntityKind::SubscriptionSchedule => SUBSCRIPTION_SCHEDULE_COLUMNS,
            EntityKind::Invoice => INVOICE_COLUMNS,
            EntityKind::SubscriptionItem => SUBSCRIPTION_ITEM_COLUMNS,
        }
    }

    /// Reference fields in backfill order. The graph must stay acyclic.
    pub fn references(self) -> &'static [Reference] {
        match self {
            EntityKind::Customer => &[],
            EntityKind::Subscription | EntityKind::SubscriptionSchedule => CUSTOMER_REF,
            EntityKind::Invoice => INVOICE_REFS,
            EntityKind::SubscriptionItem => SUBSCRIPTION_REF,
        }
    }

    pub fn child_collection(self) -> Option<&'static ChildCollection> {
        match self {
            EntityKind::Subscription => Some(&SUBSCRIPTION_ITEMS),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.table() == s)
            .ok_or_else(|| StorageError::Config(format!("unknown entity kind '{s}'")))
    }
}

/// The record's own id.
pub fn record_id(kind: EntityKind, record: &Record) -> Result<&str> {
    record
        .get("id")
        .and_then(JsonValue::as_str)
        .ok_or(StorageError::MissingId(kind))
}

/// Resolves a reference field to an id. Provider payloads carry either the
/// bare id or the expanded object.
pub fn reference_id(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        JsonValue::String(id) if !id.is_empty() => Some(id.clone()),
        JsonValue::Object(expanded) => expanded
            .get("id")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        _ => None,
    }
}
