//! Sources of stage events.
//!
//! Every source implements [`EventSource`]: starting it yields a receiver of
//! [`Delivery`] values for the controller and a handle to stop it.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use agent_stage_core::protocol::Delivery;

pub mod replay;
pub mod socket;

pub use replay::ReplaySource;
pub use socket::SocketChannel;

/// Receiver for deliveries from a source.
pub type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;

/// Sender for deliveries (used by source implementations).
pub type DeliverySender = mpsc::UnboundedSender<Delivery>;

/// Handle to stop a running source.
pub struct SourceHandle {
    shutdown_tx: oneshot::Sender<()>,
}

impl SourceHandle {
    pub fn new(shutdown_tx: oneshot::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// A source of stage events.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Short source identifier for logs (e.g. "socket", "replay").
    fn id(&self) -> &str;

    /// Start producing deliveries.
    ///
    /// The receiver closes when the source ends or is shut down.
    async fn start(&self) -> anyhow::Result<(DeliveryReceiver, SourceHandle)>;
}
