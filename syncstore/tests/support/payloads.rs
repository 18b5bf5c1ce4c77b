//! Provider-shaped JSON objects used across the sync tests.

use serde_json::{Value as JsonValue, json};

#[allow(dead_code)]
pub fn customer(id: &str) -> JsonValue {
    json!({
        "id": id,
        "object": "customer",
        "created": 1_700_000_000,
        "email": format!("{id}@example.com"),
        "livemode": false,
        "metadata": {}
    })
}

#[allow(dead_code)]
pub fn item(id: &str, subscription: &str) -> JsonValue {
    json!({
        "id": id,
        "object": "subscription_item",
        "created": 1_700_000_100,
        "quantity": 1,
        "subscription": subscription,
        "price": {"id": format!("price_{id}"), "unit_amount": 1500, "currency": "usd"},
        "metadata": {}
    })
}

#[allow(dead_code)]
pub fn subscription(id: &str, customer: &str, item_ids: &[&str]) -> JsonValue {
    let data: Vec<JsonValue> = item_ids.iter().map(|item_id| item(item_id, id)).collect();
    json!({
        "id": id,
        "object": "subscription",
        "customer": customer,
        "status": "active",
        "created": 1_700_000_050,
        "cancel_at_period_end": false,
        "items": {
            "object": "list",
            "data": data,
            "has_more": false,
            "url": format!("/v1/subscription_items?subscription={id}")
        },
        "metadata": {}
    })
}

#[allow(dead_code)]
pub fn schedule(id: &str, customer: &str) -> JsonValue {
    json!({
        "id": id,
        "object": "subscription_schedule",
        "customer": customer,
        "end_behavior": "release",
        "phases": [{"start_date": 1_700_000_000, "end_date": 1_710_000_000}],
        "status": "not_started"
    })
}

#[allow(dead_code)]
pub fn invoice(id: &str, customer: &str, subscription: Option<&str>) -> JsonValue {
    json!({
        "id": id,
        "object": "invoice",
        "customer": customer,
        "subscription": subscription,
        "status": "open",
        "amount_due": 1500,
        "currency": "usd",
        "custom_fields": null,
        "lines": {"object": "list", "data": [], "has_more": false}
    })
}

#[allow(dead_code)]
pub fn record(value: JsonValue) -> syncstore::Record {
    value
        .as_object()
        .cloned()
        .expect("payload must be a JSON object")
}
