// tasconf-api: MQTT transport and topic addressing for Tasmota devices

pub mod error;
pub mod mqtt;
pub mod topic;
pub mod transport;

pub use error::Error;
pub use mqtt::{BrokerConfig, Endpoint, MqttTransport};
pub use topic::{DeviceChannels, build_topic};
pub use transport::{AckKind, Payload, PayloadSink, Transport};
