pub mod adapter;
pub mod cache;
pub mod capabilities;
pub mod order_client;
pub mod shapes;
pub mod transport;

pub use adapter::{ProviderAdapter, ProviderKind};
pub use cache::LspCache;
pub use capabilities::CapabilityResolver;
pub use order_client::OrderClient;
pub use transport::{HttpTransport, LspTransport};
