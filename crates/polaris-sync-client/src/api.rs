//! Registry backend contract

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{ChangeNotification, InstanceSet, RegistryKey};

/// Stream of change notifications for one service.
///
/// The stream ending means the registry terminated the subscription.
pub type EventStream = BoxStream<'static, ChangeNotification>;

/// What the bridge needs from a service registry.
///
/// Implementations must be safe to share across tasks without external locking.
#[async_trait]
pub trait RegistryApi: Send + Sync + 'static {
    /// Query the full instance list of a service
    async fn list_all_instances(&self, key: &RegistryKey) -> Result<InstanceSet>;

    /// Open a change subscription for a service
    async fn watch(&self, key: &RegistryKey) -> Result<EventStream>;
}
