//! MQTT subscriber connection for velocast.
//!
//! This crate wraps rumqttc with the pieces the ingestion service needs:
//! a [`Dialer`] that configures the connection, a [`Conn`] whose event loop
//! re-issues every registered subscription after each (re)connection, and a
//! [`Handler`] seam that receives every inbound message.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use velocast_mqtt::{Dialer, Message, QoS};
//!
//! #[tokio::main]
//! async fn main() -> velocast_mqtt::Result<()> {
//!     let conn = Dialer::new()
//!         .with_subscription("ind/#", QoS::AtMostOnce)
//!         .with_handler(Arc::new(|msg: &Message| -> velocast_mqtt::Result<()> {
//!             println!("{}: {} bytes", msg.topic, msg.payload.len());
//!             Ok(())
//!         }))
//!         .dial("mqtt://127.0.0.1:1883")
//!         .await?;
//!
//!     conn.wait_connected(std::time::Duration::from_secs(30)).await?;
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

#[cfg(test)]
mod tests;

pub use client::{Conn, Dialer};
pub use error::{Error, Result};
pub use types::{ConnEvent, Handler, Message, QoS};
