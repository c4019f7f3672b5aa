//! Outcome messages that could not be applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Payload could not be decoded.
    Malformed,
    /// Outcome referenced a transaction the store does not know.
    NotFound,
    /// Store kept failing after the retry budget was spent.
    StoreFailure,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Malformed => "malformed",
            DeadLetterReason::NotFound => "not_found",
            DeadLetterReason::StoreFailure => "store_failure",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadLetterReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "malformed" => Ok(DeadLetterReason::Malformed),
            "not_found" => Ok(DeadLetterReason::NotFound),
            "store_failure" => Ok(DeadLetterReason::StoreFailure),
            other => Err(format!("unknown dead letter reason '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDeadLetter {
    pub transaction_id: Option<Uuid>,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub message_key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub reason: DeadLetterReason,
    pub error: String,
    pub attempts: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub message_key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub reason: DeadLetterReason,
    pub error: String,
    pub attempts: i32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_new(id: Uuid, new: NewDeadLetter, dead_lettered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            transaction_id: new.transaction_id,
            source_topic: new.source_topic,
            source_partition: new.source_partition,
            source_offset: new.source_offset,
            message_key: new.message_key,
            payload: new.payload,
            reason: new.reason,
            error: new.error,
            attempts: new.attempts,
            dead_lettered_at,
        }
    }
}
