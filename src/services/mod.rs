pub mod channel_poller;
pub mod order_poller;
pub mod reconciler;

pub use channel_poller::{
    ChannelListPoller, ChannelPollerConfig, ChannelSource, TransportChannelSource,
};
pub use order_poller::{OrderPollerConfig, OrderStatusPoller};
pub use reconciler::{reconcile, OrderViewModel};
