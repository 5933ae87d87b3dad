// Transport boundary used by the reconciler.
//
// Connection setup, credentials and reconnects belong to the concrete
// implementation; callers only publish, subscribe and unsubscribe. Every
// operation resolves once the broker acknowledged it or the command
// timeout elapsed.

use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Error;

/// Raw message body as delivered by the broker.
pub type Payload = Bytes;

/// Bounded queue receiving every payload published on a subscribed topic.
pub type PayloadSink = mpsc::Sender<Payload>;

/// Request kinds that wait for a broker acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AckKind {
    Publish,
    Subscribe,
    Unsubscribe,
}

/// Publish/subscribe operations at QoS 1.
///
/// Implementations are shared read-only across devices; none of these
/// methods may change transport-level options.
pub trait Transport: Send + Sync {
    /// Publish `payload` to `topic` and wait for the broker acknowledgement.
    fn publish(
        &self,
        topic: &str,
        payload: Payload,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Subscribe to `topic`; every message received on it is pushed into `sink`.
    fn subscribe(
        &self,
        topic: &str,
        sink: PayloadSink,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Drop the subscription on `topic`. Callers treat failures as best-effort.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), Error>> + Send;
}
