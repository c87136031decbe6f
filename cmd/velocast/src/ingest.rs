//! MQTT ingestion wiring: broker frames into the device-state router.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use velocast_devicestate::Router;
use velocast_mqtt::{Conn, Dialer, Handler, Message, QoS};

use crate::config::MqttConfig;

/// Builds the dialer for `config`, delivering every message to `router`.
pub fn dialer(config: &MqttConfig, router: Arc<Router>) -> Dialer {
    let handler: Arc<dyn Handler> = Arc::new(move |msg: &Message| -> velocast_mqtt::Result<()> {
        router.route(&msg.topic, &msg.payload);
        Ok(())
    });

    let url = config.url.clone();
    let mut dialer = Dialer::new()
        .with_keep_alive(config.keep_alive)
        .with_connect_retry_delay(config.retry_delay())
        .with_subscription(config.topic_filter.clone(), QoS::AtMostOnce)
        .with_handler(handler)
        .with_on_connection_up(move || info!("connected to {}", url))
        .with_on_connection_down(|err| warn!("mqtt connection lost: {}", err));

    if !config.client_id.is_empty() {
        dialer = dialer.with_id(config.client_id.clone());
    }
    if !config.username.is_empty() {
        dialer = dialer.with_credentials(config.username.clone(), config.password.clone());
    }
    dialer
}

/// Connects to the broker and starts ingesting.
///
/// Waits up to the configured connect timeout for the first ConnAck; if the
/// broker is not reachable by then, ingestion keeps retrying in the background.
pub async fn connect(config: &MqttConfig, router: Arc<Router>) -> anyhow::Result<Arc<Conn>> {
    let conn = dialer(config, router)
        .dial(&config.url)
        .await
        .with_context(|| format!("dialing mqtt broker {}", config.url))?;

    if let Err(err) = conn.wait_connected(config.connect_timeout()).await {
        warn!("{}; continuing to retry in the background", err);
    }
    Ok(conn)
}
