//! Fan-out of merged records to live observers.
//!
//! One broadcast stream per category. Delivery is best-effort: there is no
//! replay for observers that subscribe late, and a slow observer only lags
//! itself.

use crate::record::MergedRecord;
use crate::types::Category;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// A merged record tagged with its category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    pub category: Category,
    pub record: MergedRecord,
}

/// Pushes record updates to every connected observer.
#[derive(Debug)]
pub struct Distributor {
    channels: [broadcast::Sender<Update>; 3],
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new()
    }
}

impl Distributor {
    /// In-flight updates buffered per observer before it starts lagging.
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Category::ALL.map(|_| broadcast::channel(capacity).0),
        }
    }

    /// Publishes a record on the category's stream.
    ///
    /// Returns the number of observers the update was queued for. Having no
    /// observers is not an error.
    pub fn publish(&self, category: Category, record: MergedRecord) -> usize {
        let update = Update { category, record };
        match self.channels[category.index()].send(update) {
            Ok(n) => n,
            Err(_) => {
                trace!("no observers for {} update", category);
                0
            }
        }
    }

    /// Opens a new observer stream. Only updates published afterwards are received.
    pub fn subscribe(&self, category: Category) -> broadcast::Receiver<Update> {
        self.channels[category.index()].subscribe()
    }

    pub fn observer_count(&self, category: Category) -> usize {
        self.channels[category.index()].receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceIdentity;
    use serde_json::json;

    fn record(logical_id: &str) -> MergedRecord {
        MergedRecord::seeded(&DeviceIdentity::new("123", logical_id))
    }

    #[tokio::test]
    async fn test_fan_out_to_all_observers() {
        let distributor = Distributor::new();
        let mut a = distributor.subscribe(Category::Status);
        let mut b = distributor.subscribe(Category::Status);

        assert_eq!(distributor.publish(Category::Status, record("V1")), 2);

        assert_eq!(a.recv().await.unwrap().record.logical_id, "V1");
        let update = b.recv().await.unwrap();
        assert_eq!(update.category, Category::Status);
        assert_eq!(update.record.logical_id, "V1");
    }

    #[tokio::test]
    async fn test_categories_are_separate_streams() {
        let distributor = Distributor::new();
        let mut gps = distributor.subscribe(Category::Gps);

        distributor.publish(Category::Login, record("V1"));
        distributor.publish(Category::Gps, record("V2"));

        assert_eq!(gps.recv().await.unwrap().record.logical_id, "V2");
        assert!(gps.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_observers() {
        let distributor = Distributor::new();
        assert_eq!(distributor.publish(Category::Gps, record("V1")), 0);
    }

    #[tokio::test]
    async fn test_late_observer_sees_only_new_updates() {
        let distributor = Distributor::new();
        let _early = distributor.subscribe(Category::Status);
        distributor.publish(Category::Status, record("V1"));

        let mut late = distributor.subscribe(Category::Status);
        assert!(late.try_recv().is_err());

        distributor.publish(Category::Status, record("V2"));
        assert_eq!(late.recv().await.unwrap().record.logical_id, "V2");
    }

    #[tokio::test]
    async fn test_dropped_or_lagging_observer_does_not_affect_others() {
        let distributor = Distributor::with_capacity(2);
        let dropped = distributor.subscribe(Category::Status);
        let mut lagging = distributor.subscribe(Category::Status);
        let mut live = distributor.subscribe(Category::Status);
        drop(dropped);

        for i in 0..3 {
            let mut rec = record("V1");
            rec.fields.insert("seq".to_string(), json!(i));
            distributor.publish(Category::Status, rec);
            assert_eq!(live.recv().await.unwrap().record.fields["seq"], json!(i));
        }

        assert!(matches!(
            lagging.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(lagging.recv().await.unwrap().record.fields["seq"], json!(1));
        assert_eq!(distributor.observer_count(Category::Status), 2);
    }
}
