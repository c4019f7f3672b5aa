use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use transacti_stream::adapters::{InMemoryDeadLetterStore, InMemoryTransactionStore};
use transacti_stream::domain::{DeadLetterReason, NewDeadLetter};
use transacti_stream::health::HealthService;
use transacti_stream::messaging::{InMemoryMessageSource, InMemoryPublisher, MessageFeed};
use transacti_stream::ports::DeadLetterStore;
use transacti_stream::services::{
    DeadLetterService, OutcomeConsumer, Reconciler, RetryPolicy, StatisticsService, StoreReconciler,
    TransactionService,
};
use transacti_stream::{create_app, AppState};

struct TestApp {
    addr: SocketAddr,
    client: reqwest::Client,
    publisher: Arc<InMemoryPublisher>,
    dead_letters: Arc<InMemoryDeadLetterStore>,
    feed: MessageFeed,
    _cancel: watch::Sender<bool>,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn create(&self, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/transaction"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn create_id(&self, body: Value) -> Uuid {
        let response = self.create(body).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let location = response.headers()["location"].to_str().unwrap().to_string();
        location.trim_start_matches("/transactions/").parse().unwrap()
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    /// Polls until the transaction has been reconciled by the consumer.
    async fn wait_reconciled(&self, id: Uuid) -> Value {
        for _ in 0..200 {
            let (_, tx) = self.get_json(&format!("/transactions/{}", id)).await;
            if !tx["processed_at"].is_null() {
                return tx;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transaction {} was never reconciled", id);
    }
}

async fn spawn_app() -> TestApp {
    let store = Arc::new(InMemoryTransactionStore::new());
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
    let publisher = Arc::new(InMemoryPublisher::new());
    let reconciler: Arc<dyn Reconciler> = Arc::new(StoreReconciler::new(store.clone(), tracing::Span::none()));

    let state = AppState {
        transactions: TransactionService::new(store.clone(), publisher.clone(), tracing::Span::none()),
        statistics: StatisticsService::new(store.clone()),
        dead_letters: DeadLetterService::new(dead_letters.clone(), reconciler.clone(), tracing::Span::none()),
        health: Arc::new(HealthService::new()),
    };

    let (source, feed) = InMemoryMessageSource::new("processed_transactions");
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let consumer = OutcomeConsumer::new(
        source,
        reconciler,
        dead_letters.clone(),
        RetryPolicy::immediate(3),
        cancel_rx,
        tracing::Span::none(),
    );
    tokio::spawn(consumer.run());

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state, None);
    tokio::spawn(axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service()));

    TestApp {
        addr,
        client: reqwest::Client::new(),
        publisher,
        dead_letters,
        feed,
        _cancel: cancel_tx,
    }
}

#[tokio::test]
async fn post_transaction_returns_created_with_location_and_no_body() {
    let app = spawn_app().await;

    let response = app
        .create(json!({"user_id": "u1", "amount": 10, "currency": "USD"}))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("/transactions/"));
    assert!(response.text().await.unwrap().is_empty());

    let published = app.publisher.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(location, format!("/transactions/{}", published[0].id));
}

#[tokio::test]
async fn post_transaction_rejects_invalid_input() {
    let app = spawn_app().await;

    for body in [
        json!({"user_id": "", "amount": 10, "currency": "USD"}),
        json!({"user_id": "u1", "amount": 0, "currency": "USD"}),
        json!({"user_id": "u1", "amount": 10, "currency": ""}),
        json!({"user_id": "u1", "currency": "USD"}),
    ] {
        let response = app.create(body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["status"], 400);
    }

    let response = app
        .client
        .post(app.url("/transaction"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, list) = app.get_json("/transactions").await;
    assert_eq!(list.as_array().unwrap().len(), 0);
    assert!(app.publisher.published().await.is_empty());
}

#[tokio::test]
async fn decimal_amounts_keep_their_value_on_the_wire() {
    let app = spawn_app().await;

    let a = app
        .create_id(json!({"user_id": "u1", "amount": 19.99, "currency": "USD"}))
        .await;
    let b = app
        .create_id(json!({"user_id": "u2", "amount": "0.1", "currency": "EUR"}))
        .await;

    let (status, tx) = app.get_json(&format!("/transactions/{}", a)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["amount"], json!(19.99));

    let body = app
        .client
        .get(app.url("/transactions"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#""amount":19.99"#), "body was {}", body);
    assert!(body.contains(r#""amount":0.1"#), "body was {}", body);

    for event in app.publisher.published().await {
        let payload = String::from_utf8(event.to_payload().unwrap()).unwrap();
        let expected = if event.id == b { "0.1" } else { "19.99" };
        assert!(payload.contains(&format!(r#""amount":{},"#, expected)), "payload was {}", payload);
    }
}

#[tokio::test]
async fn out_of_range_amount_is_rejected_and_listing_still_works() {
    let app = spawn_app().await;

    let response = app
        .create(json!({"user_id": "u1", "amount": "1e400", "currency": "USD"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["status"], 400);

    let (status, list) = app.get_json("/transactions").await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
    assert!(app.publisher.published().await.is_empty());
}

#[tokio::test]
async fn publish_failure_is_bad_gateway_and_record_stays_created() {
    let app = spawn_app().await;
    app.publisher.set_failing(true);

    let response = app
        .create(json!({"user_id": "u1", "amount": 10, "currency": "USD"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let (_, list) = app.get_json("/transactions").await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["status"], "created");
    assert_eq!(list[0]["done"], false);
}

#[tokio::test]
async fn scenario_a_end_to_end_over_http() {
    let mut app = spawn_app().await;

    let id = app
        .create_id(json!({"user_id": "u1", "amount": 10, "currency": "USD"}))
        .await;

    let (status, tx) = app.get_json(&format!("/transactions/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["done"], false);
    assert!(tx["processed_at"].is_null());
    assert_eq!(tx["amount"], 10.0);

    app.feed.send_outcome(id, true);
    let tx = app.wait_reconciled(id).await;
    assert_eq!(tx["done"], true);
    assert_eq!(tx["status"], "completed");

    let (_, list) = app.get_json("/transactions").await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.to_string());

    let (status, stats) = app.get_json("/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_transactions"], 1);
    assert_eq!(stats["failed_transactions"], 0);
    assert_eq!(stats["total_users"], 1);
    assert_eq!(stats["currencies"], json!(["USD"]));
}

#[tokio::test]
async fn scenario_c_statistics_over_http() {
    let app = spawn_app().await;

    app.create_id(json!({"user_id": "u1", "amount": 10, "currency": "USD"}))
        .await;
    app.create_id(json!({"user_id": "u1", "amount": "2.50", "currency": "EUR"}))
        .await;

    let (_, stats) = app.get_json("/statistics").await;
    assert_eq!(stats["total_transactions"], 2);
    assert_eq!(stats["total_users"], 1);
    assert_eq!(stats["currencies"], json!(["EUR", "USD"]));
    assert_eq!(stats["pending_transactions"], 2);
    assert!(stats["average_processing_time"].is_null());
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let app = spawn_app().await;

    let (status, body) = app.get_json(&format!("/transactions/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn dead_letters_can_be_inspected_requeued_and_discarded() {
    let mut app = spawn_app().await;
    let id = app
        .create_id(json!({"user_id": "u1", "amount": 10, "currency": "USD"}))
        .await;

    // A store failure that outlived its retries, parked for later.
    let parked = app
        .dead_letters
        .push(NewDeadLetter {
            transaction_id: Some(id),
            source_topic: "processed_transactions".to_string(),
            source_partition: 0,
            source_offset: 41,
            message_key: Some(id.to_string()),
            payload: Some(format!(r#"{{"id":"{}","done":false}}"#, id).into_bytes()),
            reason: DeadLetterReason::StoreFailure,
            error: "store unavailable".to_string(),
            attempts: 3,
        })
        .await
        .unwrap();

    // And a poison message from the live consumer.
    app.feed.send_raw(None, Some(b"garbage".to_vec()));
    for _ in 0..200 {
        if app.dead_letters.len().await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, listing) = app.get_json("/dlq").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 2);
    assert_eq!(listing["dlq_entries"][0]["reason"], "malformed");
    assert_eq!(listing["dlq_entries"][0]["payload"], "garbage");
    let poison_id = listing["dlq_entries"][0]["id"].as_str().unwrap().to_string();

    let (status, entry) = app.get_json(&format!("/dlq/{}", parked.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["attempts"], 3);

    let response = app
        .client
        .post(app.url(&format!("/dlq/{}/requeue", parked.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["duplicate"], false);

    let (_, tx) = app.get_json(&format!("/transactions/{}", id)).await;
    assert_eq!(tx["done"], false);
    assert!(!tx["processed_at"].is_null());

    let response = app
        .client
        .post(app.url(&format!("/dlq/{}/requeue", poison_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .client
        .delete(app.url(&format!("/dlq/{}", poison_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, listing) = app.get_json("/dlq").await;
    assert_eq!(listing["count"], 0);

    let (status, _) = app.get_json(&format!("/dlq/{}", poison_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = spawn_app().await;

    let (status, health) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");

    let (status, doc) = app.get_json("/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/transaction"].is_object());
    assert!(doc["paths"]["/statistics"].is_object());
}
