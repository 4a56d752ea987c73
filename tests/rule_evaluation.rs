//! Integration tests for rule evaluation over a real libSQL store.
//!
//! Each test builds an in-memory database, fills it either directly or via
//! the ingest pipeline, and runs parsed rules through the public API.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::time::timeout;

use email_triage::error::{ActionError, SchemaError};
use email_triage::ingest::{
    self, ExportSource, Header, IngestOptions, Part, PartBody, Payload, ProviderMessage,
};
use email_triage::pipeline::actions::{self, JsonLineModifier, LabelChanges, LabelMap};
use email_triage::pipeline::evaluate;
use email_triage::rules::{CollectionPredicate, Rule};
use email_triage::store::{LibSqlBackend, MessageStore, StoredMessage};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn stored(id: &str, subject: &str, from: &str, (y, m, d): (i32, u32, u32)) -> StoredMessage {
    StoredMessage {
        message_id: id.into(),
        from_address: from.into(),
        to_address: "me@example.com".into(),
        subject: subject.into(),
        body: format!("{subject} body"),
        received_at: Utc.with_ymd_and_hms(y, m, d, 8, 15, 0).unwrap(),
    }
}

async fn seeded_store() -> LibSqlBackend {
    let store = LibSqlBackend::new_memory().await.unwrap();
    for msg in [
        stored("M1", "Invoice #1", "billing@acme.com", (2024, 2, 1)),
        stored("M2", "Invoice #2", "billing@acme.com", (2023, 12, 1)),
        stored("M3", "Team lunch", "alice@corp.com", (2024, 3, 10)),
        stored("M4", "Newsletter", "news@paper.com", (2022, 6, 15)),
    ] {
        assert!(store.insert_message(&msg).await.unwrap());
    }
    store
}

fn invoice_rule(collection_predicate: &str) -> Rule {
    Rule::parse(&json!({
        "collection_predicate": collection_predicate,
        "conditions": [
            {"field": "subject", "predicate": "contains", "value": "invoice"},
            {"field": "received_date", "predicate": "gt", "value": "01-01-2024"}
        ],
        "actions": {"move_to_folder": "Invoices", "mark_as_read": true}
    }))
    .unwrap()
}

#[tokio::test]
async fn all_returns_intersection() {
    timeout(TEST_TIMEOUT, async {
        let store = seeded_store().await;
        let ids = evaluate(&store, &invoice_rule("All")).await.unwrap();
        assert_eq!(ids, vec!["M1"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn any_returns_union_in_discovery_order() {
    timeout(TEST_TIMEOUT, async {
        let store = seeded_store().await;
        let ids = evaluate(&store, &invoice_rule("Any")).await.unwrap();
        // Subject matches first (M1, M2), then date-only matches (M3).
        assert_eq!(ids, vec!["M1", "M2", "M3"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn all_is_never_broader_than_any() {
    let store = seeded_store().await;
    let rules = [
        json!([
            {"field": "from_address", "predicate": "contains", "value": "acme"},
            {"field": "received_date", "predicate": "lte", "value": "01-12-2023"}
        ]),
        json!([
            {"field": "subject", "predicate": "does not contain", "value": "invoice"},
            {"field": "body", "predicate": "contains", "value": "body"}
        ]),
        json!([
            {"field": "to_address", "predicate": "contains", "value": "example.com"},
            {"field": "received_date", "predicate": "lt", "value": "15-06-2022"}
        ]),
    ];
    for conditions in rules {
        let all = Rule::parse(&json!({
            "collection_predicate": "All",
            "conditions": conditions,
            "actions": {}
        }))
        .unwrap();
        let any = all.with_collection_predicate(CollectionPredicate::Any);

        let all_ids = evaluate(&store, &all).await.unwrap();
        let any_ids = evaluate(&store, &any).await.unwrap();
        assert!(all_ids.iter().all(|id| any_ids.contains(id)));
    }
}

#[tokio::test]
async fn zero_conditions() {
    let store = seeded_store().await;
    let all = Rule::parse(&json!({"collection_predicate": "All", "conditions": [], "actions": {}}))
        .unwrap();
    assert_eq!(
        evaluate(&store, &all).await.unwrap(),
        vec!["M1", "M2", "M3", "M4"]
    );
    let any = all.with_collection_predicate(CollectionPredicate::Any);
    assert!(evaluate(&store, &any).await.unwrap().is_empty());
}

#[tokio::test]
async fn date_boundary_is_midnight() {
    let store = LibSqlBackend::new_memory().await.unwrap();
    store
        .insert_message(&stored("early", "x", "a@b.c", (2024, 1, 1)))
        .await
        .unwrap();
    let rule = |predicate: &str| {
        Rule::parse(&json!({
            "collection_predicate": "All",
            "conditions": [{"field": "received_date", "predicate": predicate, "value": "01-01-2024"}],
            "actions": {}
        }))
        .unwrap()
    };
    // 08:15 on the day is after the day's midnight.
    assert_eq!(evaluate(&store, &rule("gt")).await.unwrap(), vec!["early"]);
    assert!(evaluate(&store, &rule("lte")).await.unwrap().is_empty());
}

#[test]
fn every_is_rejected_with_allowed_set() {
    let err = Rule::parse(&json!({
        "collection_predicate": "Every",
        "conditions": [],
        "actions": {}
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidCollectionPredicate { .. }));
    assert!(err.to_string().contains("All, Any"));
}

#[test]
fn canonical_form_round_trips() {
    let rule = invoice_rule("Any");
    assert_eq!(Rule::parse(&rule.to_value()).unwrap(), rule);
}

fn provider_message(id: &str, subject: &str, date: &str, body: &str) -> ProviderMessage {
    ProviderMessage {
        id: id.into(),
        payload: Payload {
            headers: vec![
                Header {
                    name: "From".into(),
                    value: "Billing <billing@acme.com>".into(),
                },
                Header {
                    name: "Subject".into(),
                    value: subject.into(),
                },
                Header {
                    name: "Date".into(),
                    value: date.into(),
                },
            ],
            parts: vec![Part {
                mime_type: "text/plain".into(),
                body: PartBody {
                    data: Some(URL_SAFE_NO_PAD.encode(body)),
                },
            }],
        },
    }
}

#[tokio::test]
async fn ingest_then_evaluate_then_plan_actions() {
    let store = LibSqlBackend::new_memory().await.unwrap();
    let source = ExportSource::new(
        "me@example.com",
        vec![
            provider_message("p1", "Invoice #7", "Mon, 5 Feb 2024 09:00:00 +0000", "Pay\r\nnow"),
            provider_message("p2", "Invoice #3", "Fri, 1 Dec 2023 09:00:00 +0000", "Late"),
            provider_message("p3", "Hello", "Tue, 6 Feb 2024 09:00:00 +0000", "Hi"),
        ],
    );
    let options = IngestOptions {
        max_fetch: 10,
        page_size: 2,
        fetch_batch: 2,
    };
    let report = ingest::ingest(&source, &store, options).await.unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(store.get_message("p1").await.unwrap().unwrap().body, "Pay now");

    let ids = evaluate(&store, &invoice_rule("All")).await.unwrap();
    assert_eq!(ids, vec!["p1"]);

    let labels = LabelMap::from_json_str(r#"{"labels": [{"id": "Label_9", "name": "Invoices"}]}"#)
        .unwrap();
    let changes = LabelChanges::from_rule(&invoice_rule("All"), &labels)
        .await
        .unwrap();
    let batches = changes.batches(&ids, 1000);
    let modifier = JsonLineModifier::new(Vec::new());
    assert_eq!(actions::apply(&modifier, &batches).await.unwrap(), 1);

    let out = String::from_utf8(modifier.into_inner()).unwrap();
    let request: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(
        request,
        json!({"ids": ["p1"], "addLabelIds": ["Label_9"], "removeLabelIds": ["UNREAD"]})
    );
}

#[tokio::test]
async fn unknown_folder_blocks_actions() {
    let labels = LabelMap::default();
    let err = LabelChanges::from_rule(&invoice_rule("All"), &labels)
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::LabelNotFound { .. }));
}
