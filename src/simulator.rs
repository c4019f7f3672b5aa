//! Stand-in for the external processor, for local runs.
//!
//! Reads created-events, waits a random number of whole seconds, decides
//! the outcome at random and answers on the outcome topic keyed by the
//! transaction id.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

use crate::events::TransactionEvent;
use crate::messaging::{InboundMessage, KafkaProducer, MessageSource, TransportError};

pub const PROCESSOR_GROUP: &str = "transaction-processor-group";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorSettings {
    /// Probability in `[0, 1]` that an outcome is negative.
    pub failure_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            failure_rate: 0.2,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl SimulatorSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            anyhow::bail!("failure rate must be within [0, 1], got {}", self.failure_rate);
        }
        if self.min_delay > self.max_delay {
            anyhow::bail!("minimum delay exceeds maximum delay");
        }
        Ok(())
    }
}

/// `true` (success) unless the draw lands inside `failure_rate`.
pub fn decide_outcome<R: Rng + ?Sized>(rng: &mut R, failure_rate: f64) -> bool {
    !rng.gen_bool(failure_rate.clamp(0.0, 1.0))
}

/// Whole seconds drawn uniformly from `[min, max]`.
pub fn sample_delay<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let (low, high) = (min.as_secs(), max.as_secs());
    if high <= low {
        return Duration::from_secs(low);
    }
    Duration::from_secs(rng.gen_range(low..=high))
}

pub struct Simulator<S: MessageSource> {
    source: S,
    producer: KafkaProducer,
    outcome_topic: String,
    settings: SimulatorSettings,
    cancel: watch::Receiver<bool>,
    rng: StdRng,
}

impl<S: MessageSource> Simulator<S> {
    pub fn new(
        source: S,
        producer: KafkaProducer,
        outcome_topic: impl Into<String>,
        settings: SimulatorSettings,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            producer,
            outcome_topic: outcome_topic.into(),
            settings,
            cancel,
            rng: StdRng::from_entropy(),
        }
    }

    /// Runs until cancelled or until the transport fails.
    pub async fn run(mut self) -> Result<(), TransportError> {
        tracing::info!(
            failure_rate = self.settings.failure_rate,
            min_delay_secs = self.settings.min_delay.as_secs(),
            max_delay_secs = self.settings.max_delay.as_secs(),
            "Processor simulator started"
        );

        loop {
            if *self.cancel.borrow() {
                tracing::info!("Processor simulator stopped");
                return Ok(());
            }

            let next = tokio::select! {
                biased;
                changed = self.cancel.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                next = self.source.next_message() => next?,
            };

            let Some(message) = next else {
                return Ok(());
            };

            let span = tracing::info_span!("simulate", offset = message.offset);
            self.process(&message).instrument(span).await;

            if let Err(e) = self.source.commit(&message).await {
                tracing::warn!(error = %e, "Offset commit failed");
            }
        }
    }

    async fn process(&mut self, message: &InboundMessage) {
        let payload = message.payload.as_deref().unwrap_or_default();
        let mut event: TransactionEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable created event");
                return;
            }
        };
        tracing::info!(transaction_id = %event.id, "Received transaction");

        let delay = sample_delay(&mut self.rng, self.settings.min_delay, self.settings.max_delay);
        tokio::time::sleep(delay).await;

        event.done = decide_outcome(&mut self.rng, self.settings.failure_rate);
        if !event.done {
            tracing::info!(transaction_id = %event.id, "Simulated processing failure");
        }

        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(transaction_id = %event.id, error = %e, "Failed to encode outcome");
                return;
            }
        };

        match self.producer.send(&self.outcome_topic, &event.key(), &payload).await {
            Ok(_) => tracing::info!(
                transaction_id = %event.id,
                done = event.done,
                delay_secs = delay.as_secs(),
                "Processed transaction"
            ),
            Err(e) => tracing::error!(transaction_id = %event.id, error = %e, "Failed to publish outcome"),
        }
    }
}
