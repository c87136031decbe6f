//! Connection tests against an in-process rumqttd broker.
//!
//! The subscriber reaches the broker through a TCP relay that the tests can
//! sever, which forces the client through a full reconnect.

use crate::{ConnEvent, Dialer, Handler, Message, QoS, Result};
use parking_lot::Mutex;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(10);

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn start_broker() -> SocketAddr {
    let addr = free_addr();

    let mut servers = HashMap::new();
    servers.insert(
        "tcp".to_string(),
        ServerSettings {
            name: "tcp".to_string(),
            listen: addr,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 60000,
                max_payload_size: 64 * 1024,
                max_inflight_count: 100,
                auth: None,
                external_auth: None,
                dynamic_filters: false,
            },
        },
    );

    let config = Config {
        id: 0,
        router: RouterConfig {
            max_connections: 100,
            max_outgoing_packet_count: 200,
            max_segment_size: 1024 * 1024,
            max_segment_count: 10,
            ..Default::default()
        },
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        console: None,
        bridge: None,
        cluster: None,
    };

    std::thread::spawn(move || {
        let mut broker = Broker::new(config);
        let _ = broker.start();
    });
    addr
}

/// TCP relay in front of the broker. `sever` drops every open link while
/// the listener keeps accepting new ones.
struct Relay {
    addr: SocketAddr,
    links: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Relay {
    async fn start(upstream: SocketAddr) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let links = Arc::new(Mutex::new(Vec::new()));

        let accepted = links.clone();
        tokio::spawn(async move {
            while let Ok((mut inbound, _)) = listener.accept().await {
                let link = tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(upstream).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
                accepted.lock().push(link);
            }
        });

        Self { addr, links }
    }

    fn sever(&self) {
        for link in self.links.lock().drain(..) {
            link.abort();
        }
    }
}

async fn next_event(events: &mut broadcast::Receiver<ConnEvent>, want: ConnEvent) {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if events.recv().await.unwrap() == want {
                return;
            }
        }
    })
    .await
    .unwrap();
}

/// Publishes until the subscriber sees the payload. The SubAck races the
/// first publishes, so early copies may be lost.
async fn publish_until_received(
    publisher: &crate::Conn,
    received: &mut mpsc::UnboundedReceiver<Message>,
    topic: &str,
    payload: &str,
) -> Message {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            publisher
                .publish(topic, payload.as_bytes(), QoS::AtLeastOnce, false)
                .await
                .unwrap();
            let wait = tokio::time::timeout(Duration::from_millis(200), received.recv());
            if let Ok(Some(msg)) = wait.await {
                if msg.payload_str() == Some(payload) {
                    return msg;
                }
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resubscribes_after_reconnect() {
    let broker = start_broker();
    let relay = Relay::start(broker).await;

    let (tx, mut received) = mpsc::unbounded_channel();
    let handler: Arc<dyn Handler> = Arc::new(move |msg: &Message| -> Result<()> {
        let _ = tx.send(msg.clone());
        Ok(())
    });

    let subscriber = Dialer::new()
        .with_id("velocast-subscriber")
        .with_clean_session(true)
        .with_connect_retry_delay(Duration::from_millis(100))
        .with_subscription("ind/#", QoS::AtLeastOnce)
        .with_handler(handler)
        .dial(&format!("mqtt://{}", relay.addr))
        .await
        .unwrap();
    let mut events = subscriber.events();
    subscriber.wait_connected(TIMEOUT).await.unwrap();

    let publisher = Dialer::new()
        .with_id("velocast-publisher")
        .with_connect_retry_delay(Duration::from_millis(100))
        .dial(&format!("mqtt://{}", broker))
        .await
        .unwrap();
    publisher.wait_connected(TIMEOUT).await.unwrap();

    let msg =
        publish_until_received(&publisher, &mut received, "ind/123/status", "before").await;
    assert_eq!(msg.topic, "ind/123/status");

    relay.sever();
    next_event(&mut events, ConnEvent::Disconnected).await;
    next_event(&mut events, ConnEvent::Connected).await;
    assert!(subscriber.is_connected());

    // A clean session starts without subscriptions, so delivery proves the
    // filter was issued again on the new ConnAck.
    let msg =
        publish_until_received(&publisher, &mut received, "ind/123/status", "after").await;
    assert_eq!(msg.payload_str(), Some("after"));
    assert_eq!(subscriber.subscriptions(), vec!["ind/#".to_string()]);

    let _ = subscriber.close().await;
    let _ = publisher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_runtime_subscription_survives_reconnect() {
    let broker = start_broker();
    let relay = Relay::start(broker).await;

    let (tx, mut received) = mpsc::unbounded_channel();
    let handler: Arc<dyn Handler> = Arc::new(move |msg: &Message| -> Result<()> {
        let _ = tx.send(msg.clone());
        Ok(())
    });

    let subscriber = Dialer::new()
        .with_id("velocast-late-subscriber")
        .with_clean_session(true)
        .with_connect_retry_delay(Duration::from_millis(100))
        .with_handler(handler)
        .dial(&format!("mqtt://{}", relay.addr))
        .await
        .unwrap();
    let mut events = subscriber.events();
    subscriber.wait_connected(TIMEOUT).await.unwrap();
    subscriber
        .subscribe("ind/456/gps", QoS::AtMostOnce)
        .await
        .unwrap();

    let publisher = Dialer::new()
        .with_id("velocast-late-publisher")
        .dial(&format!("mqtt://{}", broker))
        .await
        .unwrap();
    publisher.wait_connected(TIMEOUT).await.unwrap();

    publish_until_received(&publisher, &mut received, "ind/456/gps", "first").await;

    relay.sever();
    next_event(&mut events, ConnEvent::Disconnected).await;
    next_event(&mut events, ConnEvent::Connected).await;

    let msg = publish_until_received(&publisher, &mut received, "ind/456/gps", "second").await;
    assert_eq!(msg.topic, "ind/456/gps");

    let _ = subscriber.close().await;
    let _ = publisher.close().await;
}
