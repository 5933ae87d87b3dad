// ── Response correlation ──
//
// Devices answer every query on one shared result channel, with no request
// id in the reply. A reply is matched to a query purely by timing: queries
// for one device are serialized, so the next payload after a query belongs
// to it. Nothing outside this module relies on that assumption.

use std::time::Duration;

use tasconf_api::Payload;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::extract::{ExtractError, Extractor};
use crate::value::SettingValue;

/// Replies buffered per device before the transport starts dropping them.
pub const REPLY_QUEUE_CAPACITY: usize = 30;

/// Create the bounded queue a device's result channel feeds into.
pub fn reply_queue() -> (mpsc::Sender<Payload>, mpsc::Receiver<Payload>) {
    mpsc::channel(REPLY_QUEUE_CAPACITY)
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("no reply within {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error(transparent)]
    Decode(#[from] ExtractError),

    #[error("reply stream closed")]
    StreamClosed,
}

/// Waits for device replies and decodes them for the setting just queried.
#[derive(Debug)]
pub struct ResponseCorrelator {
    replies: mpsc::Receiver<Payload>,
    timeout: Duration,
}

impl ResponseCorrelator {
    pub fn new(replies: mpsc::Receiver<Payload>, timeout: Duration) -> Self {
        Self { replies, timeout }
    }

    /// Consume the next reply and decode it with `setting`'s extractor.
    ///
    /// On timeout the queue is left as is, so a late reply is still
    /// available to the next call.
    pub async fn await_response(&mut self, setting: &str) -> Result<SettingValue, ResponseError> {
        let payload = tokio::time::timeout(self.timeout, self.replies.recv())
            .await
            .map_err(|_| ResponseError::Timeout {
                timeout: self.timeout,
            })?
            .ok_or(ResponseError::StreamClosed)?;

        tracing::trace!(
            setting,
            payload = %String::from_utf8_lossy(&payload),
            "reply received"
        );
        Ok(Extractor::for_setting(setting).decode(&payload)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn decodes_next_reply() {
        let (tx, rx) = reply_queue();
        let mut correlator = ResponseCorrelator::new(rx, TIMEOUT);

        tx.send(Bytes::from_static(br#"{"TelePeriod":300}"#))
            .await
            .unwrap();
        let value = correlator.await_response("teleperiod").await.unwrap();
        assert_eq!(value, SettingValue::Int(300));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_late_reply() {
        let (tx, rx) = reply_queue();
        let mut correlator = ResponseCorrelator::new(rx, TIMEOUT);

        let err = correlator.await_response("teleperiod").await.unwrap_err();
        assert!(matches!(err, ResponseError::Timeout { timeout } if timeout == TIMEOUT));

        tx.send(Bytes::from_static(br#"{"TelePeriod":60}"#))
            .await
            .unwrap();
        let value = correlator.await_response("teleperiod").await.unwrap();
        assert_eq!(value, SettingValue::Int(60));
    }

    #[tokio::test(start_paused = true)]
    async fn one_payload_per_call() {
        let (tx, rx) = reply_queue();
        let mut correlator = ResponseCorrelator::new(rx, TIMEOUT);

        tx.send(Bytes::from_static(br#"{"LedState":1}"#)).await.unwrap();
        tx.send(Bytes::from_static(br#"{"TelePeriod":300}"#))
            .await
            .unwrap();

        assert_eq!(
            correlator.await_response("ledstate").await.unwrap(),
            SettingValue::Int(1)
        );
        assert_eq!(
            correlator.await_response("teleperiod").await.unwrap(),
            SettingValue::Int(300)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_is_reported() {
        let (tx, rx) = reply_queue();
        let mut correlator = ResponseCorrelator::new(rx, TIMEOUT);

        tx.send(Bytes::from_static(br#"{"PowerCal":"x"}"#))
            .await
            .unwrap();
        let err = correlator.await_response("powercal").await.unwrap_err();
        assert!(matches!(
            err,
            ResponseError::Decode(ExtractError::TypeMismatch { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream() {
        let (tx, rx) = reply_queue();
        let mut correlator = ResponseCorrelator::new(rx, TIMEOUT);
        drop(tx);

        let err = correlator.await_response("teleperiod").await.unwrap_err();
        assert!(matches!(err, ResponseError::StreamClosed));
    }
}
