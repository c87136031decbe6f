//! MQTT client connection using rumqttc.
//!
//! Provides a long-lived subscriber connection with:
//! - Automatic reconnection driven by the rumqttc event loop
//! - Re-subscription of every registered filter on each ConnAck
//! - Connection lifecycle events
//! - Message delivery to a single [`Handler`]

use crate::error::{Error, Result};
use crate::types::{ConnEvent, Handler, Message, QoS};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_KEEP_ALIVE: u16 = 20;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
const REQUEST_CAPACITY: usize = 100;

type ConnectionUpFn = Box<dyn Fn() + Send + Sync>;
type ConnectionDownFn = Box<dyn Fn(&Error) + Send + Sync>;

/// MQTT client dialer.
///
/// Contains all options to establish and maintain an MQTT connection.
#[derive(Default)]
pub struct Dialer {
    /// Keep-alive interval in seconds.
    pub keep_alive: Option<u16>,
    /// Clean session flag (rumqttc default: true).
    pub clean_session: Option<bool>,
    /// Delay between reconnection attempts.
    pub connect_retry_delay: Option<Duration>,
    /// Client ID (defaults to random UUID).
    pub id: Option<String>,
    /// Username and password. Overrides credentials embedded in the URL.
    pub credentials: Option<(String, String)>,
    /// Filters subscribed on every ConnAck.
    pub subscriptions: Vec<(String, QoS)>,
    /// Message handler.
    pub handler: Option<Arc<dyn Handler>>,
    /// Callback on connection up.
    pub on_connection_up: Option<ConnectionUpFn>,
    /// Callback on connection loss.
    pub on_connection_down: Option<ConnectionDownFn>,
}

impl Dialer {
    /// Create a new dialer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the keep-alive interval.
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = Some(seconds);
        self
    }

    /// Set the clean session flag.
    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = Some(clean);
        self
    }

    /// Set username and password.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the reconnection delay.
    pub fn with_connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = Some(delay);
        self
    }

    /// Register a filter that is subscribed on every (re)connection.
    pub fn with_subscription(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.subscriptions.push((filter.into(), qos));
        self
    }

    /// Set the message handler.
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the on_connection_up callback.
    pub fn with_on_connection_up<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connection_up = Some(Box::new(f));
        self
    }

    /// Set the on_connection_down callback.
    pub fn with_on_connection_down<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_connection_down = Some(Box::new(f));
        self
    }

    /// Start a connection to the broker at the given address.
    ///
    /// Address format: `mqtt://[user:pass@]host[:port]` (`tcp://` is accepted
    /// as an alias). The event loop is spawned on the current tokio runtime
    /// and the connection is returned without waiting for the broker; use
    /// [`Conn::wait_connected`] to block until the first ConnAck.
    pub async fn dial(self, addr: &str) -> Result<Arc<Conn>> {
        let mqtt_options = self.mqtt_options(addr)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        let (events, _) = broadcast::channel(16);
        let (shutdown_tx, _) = broadcast::channel(1);

        let conn = Arc::new(Conn {
            client,
            subscriptions: Mutex::new(self.subscriptions),
            connected: AtomicBool::new(false),
            events,
            shutdown_tx,
        });

        let hooks = Hooks {
            handler: self.handler,
            on_up: self.on_connection_up,
            on_down: self.on_connection_down,
            retry_delay: self.connect_retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        };

        let loop_conn = conn.clone();
        tokio::spawn(async move {
            loop_conn.run_event_loop(event_loop, hooks).await;
        });

        Ok(conn)
    }

    fn mqtt_options(&self, addr: &str) -> Result<MqttOptions> {
        let url = url::Url::parse(addr).map_err(|e| Error::InvalidAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "mqtt" | "tcp" => {}
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        }

        let host = url.host_str().ok_or_else(|| Error::InvalidAddress {
            addr: addr.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let id = self
            .id
            .clone()
            .unwrap_or_else(|| format!("velocast-{}", Uuid::new_v4()));
        let keep_alive = self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE);

        let mut options = MqttOptions::new(id, host, port);
        options.set_keep_alive(Duration::from_secs(u64::from(keep_alive)));

        if let Some(clean) = self.clean_session {
            options.set_clean_session(clean);
        }

        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        } else if let Some(password) = url.password() {
            options.set_credentials(url.username(), password);
        }

        Ok(options)
    }
}

struct Hooks {
    handler: Option<Arc<dyn Handler>>,
    on_up: Option<ConnectionUpFn>,
    on_down: Option<ConnectionDownFn>,
    retry_delay: Duration,
}

/// MQTT connection.
pub struct Conn {
    client: AsyncClient,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    connected: AtomicBool,
    events: broadcast::Sender<ConnEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Conn {
    async fn run_event_loop(self: &Arc<Self>, mut event_loop: EventLoop, hooks: Hooks) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("mqtt connection shutdown requested");
                    break;
                }
                event = event_loop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("connected to mqtt broker");
                            self.connected.store(true, Ordering::SeqCst);
                            self.resubscribe();
                            let _ = self.events.send(ConnEvent::Connected);
                            if let Some(on_up) = &hooks.on_up {
                                on_up();
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            debug!("received message on topic: {}", publish.topic);

                            let Some(handler) = &hooks.handler else {
                                continue;
                            };
                            let msg = Message {
                                topic: publish.topic,
                                payload: publish.payload,
                                qos: publish.qos.into(),
                                retain: publish.retain,
                            };
                            if let Err(e) = handler.handle_message(&msg) {
                                debug!("handler error: {}", e);
                            }
                        }
                        Ok(Event::Incoming(Packet::SubAck(suback))) => {
                            debug!("subscription acknowledged: {:?}", suback);
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            warn!("disconnected by broker");
                            self.mark_down(&hooks, &Error::Closed);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("mqtt event loop error: {}", e);
                            self.mark_down(&hooks, &Error::ConnectionError(e));

                            // The next poll reconnects.
                            tokio::time::sleep(hooks.retry_delay).await;
                        }
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
    }

    fn mark_down(&self, hooks: &Hooks, err: &Error) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(ConnEvent::Disconnected);
            if let Some(on_down) = &hooks.on_down {
                on_down(err);
            }
        }
    }

    fn resubscribe(&self) {
        let subs = self.subscriptions.lock().clone();
        for (filter, qos) in subs {
            match self.client.try_subscribe(&filter, qos.into()) {
                Ok(()) => info!("subscribed to {}", filter),
                Err(e) => error!("resubscribe {} error: {}", filter, e),
            }
        }
    }

    /// Subscribe to connection lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ConnEvent> {
        self.events.subscribe()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Wait until the broker has acknowledged the connection.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut events = self.events.subscribe();
        if self.is_connected() {
            return Ok(());
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(ConnEvent::Connected) => return Ok(()),
                    Ok(ConnEvent::Disconnected) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if self.is_connected() {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::Closed),
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::ConnectTimeout(timeout))?
    }

    /// Subscribe to a filter. The filter is re-subscribed on every reconnect.
    pub async fn subscribe(&self, filter: &str, qos: QoS) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock();
            if !subs.iter().any(|(f, _)| f == filter) {
                subs.push((filter.to_string(), qos));
            }
        }

        // Sent on the next ConnAck otherwise.
        if self.is_connected() {
            self.client
                .subscribe(filter, qos.into())
                .await
                .map_err(|e| Error::Subscribe(e.to_string()))?;
        }

        Ok(())
    }

    /// Unsubscribe from a filter.
    pub async fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.subscriptions.lock().retain(|(f, _)| f != filter);

        if self.is_connected() {
            self.client
                .unsubscribe(filter)
                .await
                .map_err(|e| Error::Subscribe(e.to_string()))?;
        }

        Ok(())
    }

    /// Filters re-subscribed on every reconnect.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .iter()
            .map(|(f, _)| f.clone())
            .collect()
    }

    /// Publish a message to a topic.
    pub async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()> {
        self.client
            .publish(topic, qos.into(), retain, payload.to_vec())
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }

    /// Close the connection and stop the event loop.
    pub async fn close(&self) -> Result<()> {
        let result = self.client.disconnect().await;
        let _ = self.shutdown_tx.send(());
        result?;
        Ok(())
    }
}
