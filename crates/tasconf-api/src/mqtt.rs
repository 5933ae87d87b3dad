//! MQTT transport built on `rumqttc`.
//!
//! [`MqttTransport::connect`] spawns a background task that drives the
//! `rumqttc` event loop. The task fans incoming publishes out to the
//! bounded queue registered for their topic and forwards packet
//! identifiers of outgoing requests and their acknowledgements, so each
//! [`Transport`] call can wait for its own PUBACK / SUBACK / UNSUBACK.
//!
//! Requests are serialized: a call holds the acknowledgement receiver
//! until its packet is acknowledged or the command timeout elapses. A
//! request that times out before its packet is sent leaves a debt, so the
//! next request of that kind does not adopt the late packet as its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
    SubscribeReasonCode,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{AckKind, Payload, PayloadSink, Transport};

// ── Tuning ───────────────────────────────────────────────────────────

/// Capacity of the request queue between client handle and event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Pause between reconnect attempts after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Lower bound accepted by the client for the keep-alive interval.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

const DEFAULT_PLAIN_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

// ── BrokerConfig ─────────────────────────────────────────────────────

/// How to reach the broker.
///
/// Built by the config layer; the transport never reads files or env vars.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker URL, e.g. `tcp://localhost:1883` or `mqtts://broker:8883`.
    pub url: Url,
    /// MQTT client identifier.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Keep-alive interval sent in CONNECT.
    pub keep_alive: Duration,
    /// Upper bound for every acknowledgement wait, including CONNACK.
    pub command_timeout: Duration,
}

impl BrokerConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client_id: format!("tasconf-{}", uuid::Uuid::new_v4().simple()),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            command_timeout: Duration::from_secs(2),
        }
    }

    /// Resolve host, port and TLS mode from the URL.
    pub fn endpoint(&self) -> Result<Endpoint, Error> {
        let tls = match self.url.scheme() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "mqtts" => true,
            other => {
                return Err(Error::InvalidBrokerUrl {
                    url: self.url.to_string(),
                    reason: format!("unsupported scheme '{other}' (expected tcp, mqtt, ssl, tls or mqtts)"),
                });
            }
        };

        let host = self
            .url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidBrokerUrl {
                url: self.url.to_string(),
                reason: "missing host".into(),
            })?;

        let port = self
            .url
            .port()
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT });

        Ok(Endpoint {
            host: host.to_owned(),
            port,
            tls,
        })
    }

    fn mqtt_options(&self) -> Result<MqttOptions, Error> {
        let endpoint = self.endpoint()?;

        let mut options = MqttOptions::new(self.client_id.clone(), endpoint.host, endpoint.port);
        options.set_keep_alive(self.keep_alive.max(MIN_KEEP_ALIVE));
        options.set_clean_session(true);

        if let Some(ref username) = self.username {
            let password = self
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned())
                .unwrap_or_default();
            options.set_credentials(username.clone(), password);
        }

        if endpoint.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        Ok(options)
    }
}

/// Network endpoint derived from a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

// ── Event loop signals ───────────────────────────────────────────────

/// What the event loop reports back to waiting requests.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Connected,
    ConnectionError(String),
    Sent(AckKind, u16),
    Acked(AckKind, u16),
    Rejected(AckKind, u16),
}

type Routes = Arc<DashMap<String, PayloadSink>>;
type SignalTx = mpsc::UnboundedSender<Signal>;
type SignalRx = mpsc::UnboundedReceiver<Signal>;

// ── MqttTransport ────────────────────────────────────────────────────

/// Connected MQTT client implementing [`Transport`].
pub struct MqttTransport {
    client: AsyncClient,
    routes: Routes,
    acks: Mutex<AckWaiter>,
    command_timeout: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect to the broker and wait for its CONNACK.
    ///
    /// The event loop stops when `cancel` (or [`disconnect`](Self::disconnect))
    /// fires.
    pub async fn connect(config: &BrokerConfig, cancel: &CancellationToken) -> Result<Self, Error> {
        let options = config.mqtt_options()?;
        let broker = config.url.to_string();

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let routes: Routes = Arc::new(DashMap::new());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let cancel = cancel.child_token();

        tracing::debug!(broker = %broker, client_id = %config.client_id, "Connecting to MQTT broker");

        let task = tokio::spawn(event_loop(
            eventloop,
            Arc::clone(&routes),
            signal_tx,
            cancel.clone(),
        ));

        let connected =
            tokio::time::timeout(config.command_timeout, await_connack(&mut signal_rx)).await;
        let failure = match connected {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some(format!(
                "no CONNACK within {}ms",
                config.command_timeout.as_millis()
            )),
        };
        if let Some(reason) = failure {
            cancel.cancel();
            return Err(Error::Connection { broker, reason });
        }

        tracing::info!(broker = %broker, "Connected to MQTT broker");

        Ok(Self {
            client,
            routes,
            acks: Mutex::new(AckWaiter::new(signal_rx)),
            command_timeout: config.command_timeout,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Send DISCONNECT and stop the event loop.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "Failed to queue DISCONNECT");
        }

        if let Some(task) = self.task.lock().await.take() {
            if tokio::time::timeout(self.command_timeout, task).await.is_err() {
                tracing::debug!("Event loop did not stop after DISCONNECT");
            }
        }
        self.cancel.cancel();
    }

    /// Submit a request and wait for the matching acknowledgement.
    async fn request<F>(&self, operation: AckKind, topic: &str, submit: F) -> Result<(), Error>
    where
        F: Future<Output = Result<(), rumqttc::ClientError>> + Send,
    {
        let mut acks = self.acks.lock().await;
        acks.discard_queued();

        submit
            .await
            .map_err(|source| Error::Client { operation, source })?;

        let mut pkid = None;
        let waited = tokio::time::timeout(
            self.command_timeout,
            acks.await_ack(operation, topic, &mut pkid),
        )
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => {
                if pkid.is_none() {
                    acks.owe_sent(operation);
                }
                Err(Error::Timeout {
                    operation,
                    topic: topic.to_owned(),
                    timeout: self.command_timeout,
                })
            }
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Payload) -> Result<(), Error> {
        tracing::trace!(topic, bytes = payload.len(), "publish");
        let submit = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec());
        self.request(AckKind::Publish, topic, submit).await
    }

    async fn subscribe(&self, topic: &str, sink: PayloadSink) -> Result<(), Error> {
        tracing::trace!(topic, "subscribe");
        // Route first: retained messages may arrive right behind the SUBACK.
        self.routes.insert(topic.to_owned(), sink);

        let submit = self.client.subscribe(topic, QoS::AtLeastOnce);
        let result = self.request(AckKind::Subscribe, topic, submit).await;
        if result.is_err() {
            self.routes.remove(topic);
        }
        result
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        tracing::trace!(topic, "unsubscribe");
        self.routes.remove(topic);

        let submit = self.client.unsubscribe(topic);
        self.request(AckKind::Unsubscribe, topic, submit).await
    }
}

// ── Background event loop ────────────────────────────────────────────

async fn event_loop(
    mut eventloop: EventLoop,
    routes: Routes,
    signals: SignalTx,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(packet)) => handle_incoming(packet, &routes, &signals),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(Event::Outgoing(outgoing)) => handle_outgoing(&outgoing, &signals),
                Err(e) => {
                    tracing::warn!(error = %e, "MQTT connection error");
                    let _ = signals.send(Signal::ConnectionError(e.to_string()));

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }

    tracing::debug!("MQTT event loop exiting");
}

fn handle_incoming(packet: Packet, routes: &Routes, signals: &SignalTx) {
    let signal = match packet {
        Packet::ConnAck(ack) => {
            if matches!(ack.code, ConnectReturnCode::Success) {
                Signal::Connected
            } else {
                Signal::ConnectionError(format!("broker refused connection: {:?}", ack.code))
            }
        }
        Packet::Publish(publish) => {
            route(routes, publish);
            return;
        }
        Packet::PubAck(ack) => Signal::Acked(AckKind::Publish, ack.pkid),
        Packet::SubAck(ack) => {
            let failed = ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure));
            if failed {
                Signal::Rejected(AckKind::Subscribe, ack.pkid)
            } else {
                Signal::Acked(AckKind::Subscribe, ack.pkid)
            }
        }
        Packet::UnsubAck(ack) => Signal::Acked(AckKind::Unsubscribe, ack.pkid),
        _ => return,
    };

    // Ignore send errors -- the transport handle is gone
    let _ = signals.send(signal);
}

fn handle_outgoing(outgoing: &Outgoing, signals: &SignalTx) {
    let signal = match *outgoing {
        Outgoing::Publish(pkid) => Signal::Sent(AckKind::Publish, pkid),
        Outgoing::Subscribe(pkid) => Signal::Sent(AckKind::Subscribe, pkid),
        Outgoing::Unsubscribe(pkid) => Signal::Sent(AckKind::Unsubscribe, pkid),
        _ => return,
    };
    let _ = signals.send(signal);
}

/// Hand an incoming publish to the queue registered for its topic.
fn route(routes: &Routes, publish: Publish) {
    let Some(sink) = routes.get(&publish.topic) else {
        tracing::trace!(topic = %publish.topic, "No route for incoming message");
        return;
    };

    match sink.try_send(publish.payload) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(topic = %publish.topic, "Reply queue full, dropping message");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(topic = %publish.topic, "Reply queue closed, dropping message");
        }
    }
}

// ── Acknowledgement waits ────────────────────────────────────────────

async fn await_connack(signals: &mut SignalRx) -> Result<(), String> {
    while let Some(signal) = signals.recv().await {
        match signal {
            Signal::Connected => return Ok(()),
            Signal::ConnectionError(reason) => return Err(reason),
            _ => {}
        }
    }
    Err("event loop stopped".into())
}

/// Receiving end of the event loop signals, shared by serialized requests.
struct AckWaiter {
    signals: SignalRx,
    /// Timed-out requests per kind whose packet had not been sent yet.
    unsent: [usize; 3],
}

impl AckWaiter {
    fn new(signals: SignalRx) -> Self {
        Self {
            signals,
            unsent: [0; 3],
        }
    }

    fn slot(kind: AckKind) -> usize {
        match kind {
            AckKind::Publish => 0,
            AckKind::Subscribe => 1,
            AckKind::Unsubscribe => 2,
        }
    }

    /// Record that a packet of `kind` may still be sent for a request that
    /// already gave up.
    fn owe_sent(&mut self, kind: AckKind) {
        self.unsent[Self::slot(kind)] += 1;
    }

    /// Settle one outstanding debt for `kind`, if any.
    fn settle_sent(&mut self, kind: AckKind) -> bool {
        let owed = &mut self.unsent[Self::slot(kind)];
        if *owed == 0 {
            return false;
        }
        *owed -= 1;
        true
    }

    /// Drop signals left over from earlier requests.
    fn discard_queued(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            if let Signal::Sent(kind, id) = signal {
                if self.settle_sent(kind) {
                    tracing::trace!(%kind, pkid = id, "late packet of an abandoned request");
                }
            }
        }
    }

    /// Wait until the packet sent for `operation` is acknowledged.
    ///
    /// The packet identifier is learned from the `Sent` signal and stored in
    /// `pkid`, so stale acknowledgements of earlier requests are skipped.
    /// `Sent` signals owed to abandoned requests are not adopted.
    async fn await_ack(
        &mut self,
        operation: AckKind,
        topic: &str,
        pkid: &mut Option<u16>,
    ) -> Result<(), Error> {
        while let Some(signal) = self.signals.recv().await {
            match signal {
                Signal::Sent(kind, id) if kind == operation && pkid.is_none() => {
                    if self.settle_sent(kind) {
                        tracing::trace!(%kind, pkid = id, "late packet of an abandoned request");
                    } else {
                        *pkid = Some(id);
                    }
                }
                Signal::Sent(kind, _) => {
                    self.settle_sent(kind);
                }
                Signal::Acked(kind, id) if kind == operation && *pkid == Some(id) => return Ok(()),
                Signal::Rejected(kind, id) if kind == operation && *pkid == Some(id) => {
                    return Err(Error::Rejected {
                        operation,
                        topic: topic.to_owned(),
                    });
                }
                Signal::ConnectionError(reason) => {
                    tracing::debug!(%operation, topic, %reason, "Connection error while awaiting ack");
                }
                _ => {}
            }
        }

        Err(Error::Disconnected)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rumqttc::{ConnAck, SubAck};

    use super::*;

    fn config(url: &str) -> BrokerConfig {
        BrokerConfig::new(url.parse().unwrap())
    }

    #[test]
    fn endpoint_defaults_plain_port() {
        let ep = config("tcp://localhost").endpoint().unwrap();
        assert_eq!(
            ep,
            Endpoint {
                host: "localhost".into(),
                port: 1883,
                tls: false
            }
        );
    }

    #[test]
    fn endpoint_tls_schemes() {
        for url in ["ssl://broker", "mqtts://broker", "tls://broker"] {
            let ep = config(url).endpoint().unwrap();
            assert!(ep.tls, "{url} should use TLS");
            assert_eq!(ep.port, 8883);
        }
        assert_eq!(config("mqtts://broker:9000").endpoint().unwrap().port, 9000);
    }

    #[test]
    fn endpoint_rejects_unknown_scheme() {
        let err = config("http://broker:1883").endpoint().unwrap_err();
        assert!(matches!(err, Error::InvalidBrokerUrl { .. }), "{err}");
    }

    #[test]
    fn client_id_is_generated() {
        let a = config("tcp://localhost");
        let b = config("tcp://localhost");
        assert!(a.client_id.starts_with("tasconf-"));
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn publishes_are_routed_by_topic() {
        let routes: Routes = Arc::new(DashMap::new());
        let (tx, mut rx) = mpsc::channel(2);
        routes.insert("stat/plug/RESULT".into(), tx);

        route(
            &routes,
            Publish::new("stat/plug/RESULT", QoS::AtLeastOnce, r#"{"TelePeriod":300}"#),
        );
        route(&routes, Publish::new("stat/other/RESULT", QoS::AtLeastOnce, "x"));

        assert_eq!(rx.try_recv().unwrap(), Payload::from_static(br#"{"TelePeriod":300}"#));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let routes: Routes = Arc::new(DashMap::new());
        let (tx, mut rx) = mpsc::channel(1);
        routes.insert("t".into(), tx);

        route(&routes, Publish::new("t", QoS::AtLeastOnce, "first"));
        route(&routes, Publish::new("t", QoS::AtLeastOnce, "second"));

        assert_eq!(rx.try_recv().unwrap(), Payload::from_static(b"first"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn suback_failure_is_rejection() {
        let routes: Routes = Arc::new(DashMap::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_incoming(
            Packet::SubAck(SubAck {
                pkid: 7,
                return_codes: vec![SubscribeReasonCode::Failure],
            }),
            &routes,
            &tx,
        );
        handle_incoming(
            Packet::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::Success,
            }),
            &routes,
            &tx,
        );

        assert_eq!(rx.try_recv().unwrap(), Signal::Rejected(AckKind::Subscribe, 7));
        assert_eq!(rx.try_recv().unwrap(), Signal::Connected);
    }

    #[tokio::test]
    async fn ack_wait_skips_stale_acknowledgements() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut acks = AckWaiter::new(rx);
        tx.send(Signal::Acked(AckKind::Publish, 2)).unwrap();
        tx.send(Signal::Sent(AckKind::Publish, 3)).unwrap();
        tx.send(Signal::Acked(AckKind::Subscribe, 3)).unwrap();
        tx.send(Signal::Acked(AckKind::Publish, 2)).unwrap();
        tx.send(Signal::Acked(AckKind::Publish, 3)).unwrap();

        let mut pkid = None;
        acks.await_ack(AckKind::Publish, "cmnd/plug/BackLog", &mut pkid)
            .await
            .unwrap();
        assert_eq!(pkid, Some(3));
        assert!(acks.signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn ack_wait_ignores_packet_of_abandoned_request() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut acks = AckWaiter::new(rx);
        // An earlier publish timed out before its packet left the client.
        acks.owe_sent(AckKind::Publish);
        acks.discard_queued();

        tx.send(Signal::Sent(AckKind::Publish, 5)).unwrap();
        tx.send(Signal::Acked(AckKind::Publish, 5)).unwrap();
        drop(tx);

        let mut pkid = None;
        let err = acks
            .await_ack(AckKind::Publish, "cmnd/plug/BackLog", &mut pkid)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected), "{err}");
        assert_eq!(pkid, None);
    }

    #[tokio::test]
    async fn abandoned_packet_is_settled_before_own_ack() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut acks = AckWaiter::new(rx);
        acks.owe_sent(AckKind::Publish);
        acks.owe_sent(AckKind::Subscribe);

        // The late subscribe packet is already queued when the next request starts.
        tx.send(Signal::Sent(AckKind::Subscribe, 4)).unwrap();
        acks.discard_queued();

        tx.send(Signal::Sent(AckKind::Publish, 5)).unwrap();
        tx.send(Signal::Acked(AckKind::Publish, 5)).unwrap();
        tx.send(Signal::Sent(AckKind::Publish, 6)).unwrap();
        tx.send(Signal::Acked(AckKind::Publish, 6)).unwrap();

        let mut pkid = None;
        acks.await_ack(AckKind::Publish, "cmnd/plug/BackLog", &mut pkid)
            .await
            .unwrap();
        assert_eq!(pkid, Some(6));
        assert_eq!(acks.unsent, [0; 3]);
    }

    #[tokio::test]
    async fn ack_wait_reports_rejection_and_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut acks = AckWaiter::new(rx);
        tx.send(Signal::Sent(AckKind::Subscribe, 1)).unwrap();
        tx.send(Signal::Rejected(AckKind::Subscribe, 1)).unwrap();

        let err = acks
            .await_ack(AckKind::Subscribe, "stat/plug/RESULT", &mut None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));

        drop(tx);
        let err = acks
            .await_ack(AckKind::Publish, "cmnd/plug/Power", &mut None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected));
    }

    #[tokio::test]
    async fn connack_wait_surfaces_connection_errors() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Signal::Sent(AckKind::Publish, 1)).unwrap();
        tx.send(Signal::ConnectionError("connection refused".into()))
            .unwrap();

        assert_eq!(await_connack(&mut rx).await.unwrap_err(), "connection refused");
    }
}
