//! Wire records exchanged with the external processor.
//!
//! Both topics carry the same JSON shape, keyed by the transaction id:
//! `{"id", "user_id", "amount", "currency", "done", "timestamp"}`.
//!
//! The processor consumes created-events and must answer each one with an
//! outcome event on the outcome topic, keyed by the same id, with `done`
//! reporting the result. The outcome's `timestamp` is never trusted; the
//! reconciler stamps `processed_at` itself.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Transaction;

/// Snapshot of a transaction as published on the created topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub id: Uuid,
    pub user_id: String,
    #[serde(with = "crate::utils::amount")]
    pub amount: BigDecimal,
    pub currency: String,
    pub done: bool,
    pub timestamp: DateTime<Utc>,
}

impl TransactionEvent {
    /// Partition key: the transaction id, so every event of one
    /// transaction lands on the same partition.
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl From<&Transaction> for TransactionEvent {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id.clone(),
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            done: tx.done,
            timestamp: tx.created_at,
        }
    }
}

/// The parts of an outcome message the reconciler acts on. Other fields of
/// the shared schema are accepted and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub id: Uuid,
    pub done: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("message has no payload")]
    EmptyPayload,

    #[error("malformed outcome payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message key '{key}' does not match payload id {id}")]
    KeyMismatch { key: String, id: Uuid },
}

impl OutcomeEvent {
    /// Decodes an outcome message. A present key must name the same
    /// transaction as the payload.
    pub fn decode(key: Option<&[u8]>, payload: Option<&[u8]>) -> Result<Self, ConsumeError> {
        let payload = payload.ok_or(ConsumeError::EmptyPayload)?;
        let event: OutcomeEvent = serde_json::from_slice(payload)?;

        if let Some(raw_key) = key {
            let key = String::from_utf8_lossy(raw_key);
            match Uuid::parse_str(key.trim()) {
                Ok(key_id) if key_id == event.id => {}
                _ => {
                    return Err(ConsumeError::KeyMismatch {
                        key: key.into_owned(),
                        id: event.id,
                    })
                }
            }
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionState;
    use serde_json::json;

    #[test]
    fn test_created_event_uses_wire_field_names() {
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            amount: BigDecimal::from(10),
            currency: "USD".to_string(),
            status: TransactionState::Created,
            done: false,
            created_at: Utc::now(),
            processed_at: None,
        };

        let event = TransactionEvent::from(&tx);
        let value: serde_json::Value = serde_json::from_slice(&event.to_payload().unwrap()).unwrap();

        assert_eq!(value["id"], tx.id.to_string());
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["amount"], json!(10.0));
        assert_eq!(value["currency"], "USD");
        assert_eq!(value["done"], false);
        assert!(value["timestamp"].is_string());
        assert_eq!(event.key(), tx.id.to_string());
    }

    #[test]
    fn test_created_event_amount_is_the_nearest_double() {
        for (text, expected) in [("19.99", "19.99"), ("0.1", "0.1"), ("-0.07", "-0.07")] {
            let tx = Transaction {
                id: Uuid::new_v4(),
                user_id: "u1".to_string(),
                amount: text.parse().unwrap(),
                currency: "USD".to_string(),
                status: TransactionState::Created,
                done: false,
                created_at: Utc::now(),
                processed_at: None,
            };

            let payload = String::from_utf8(TransactionEvent::from(&tx).to_payload().unwrap()).unwrap();
            assert!(
                payload.contains(&format!(r#""amount":{},"#, expected)),
                "payload was {}",
                payload
            );
        }
    }

    #[test]
    fn test_outcome_decodes_minimal_payload() {
        let id = Uuid::new_v4();
        let payload = json!({"id": id, "done": true}).to_string();

        let event = OutcomeEvent::decode(None, Some(payload.as_bytes())).unwrap();
        assert_eq!(event.id, id);
        assert!(event.done);
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn test_outcome_decodes_full_processor_payload() {
        let id = Uuid::new_v4();
        let payload = json!({
            "id": id,
            "user_id": "u1",
            "amount": 10.5,
            "currency": "USD",
            "done": false,
            "timestamp": "2024-05-01T10:00:00Z"
        })
        .to_string();
        let key = id.to_string();

        let event = OutcomeEvent::decode(Some(key.as_bytes()), Some(payload.as_bytes())).unwrap();
        assert_eq!(event.id, id);
        assert!(!event.done);
        assert!(event.timestamp.is_some());
    }

    #[test]
    fn test_outcome_rejects_garbage_and_missing_payload() {
        assert!(matches!(
            OutcomeEvent::decode(None, Some(b"{not json")),
            Err(ConsumeError::Malformed(_))
        ));
        assert!(matches!(
            OutcomeEvent::decode(None, Some(br#"{"done": true}"#)),
            Err(ConsumeError::Malformed(_))
        ));
        assert!(matches!(
            OutcomeEvent::decode(None, None),
            Err(ConsumeError::EmptyPayload)
        ));
    }

    #[test]
    fn test_outcome_rejects_key_for_other_transaction() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4().to_string();
        let payload = json!({"id": id, "done": true}).to_string();

        let result = OutcomeEvent::decode(Some(other.as_bytes()), Some(payload.as_bytes()));
        assert!(matches!(result, Err(ConsumeError::KeyMismatch { .. })));
    }
}
