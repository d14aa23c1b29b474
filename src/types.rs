// Canonical data model shared by the resolver, order client, pollers and
// reconciler. Provider-specific shapes never leak past `lsp::adapter`.

use std::fmt;

use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};

/// Hard platform floor for the minimum channel size, in sats
pub const PLATFORM_MIN_CHANNEL_SATS: u64 = 100_000;
/// Used when the LSP does not advertise a usable minimum
pub const DEFAULT_MIN_CHANNEL_SATS: u64 = 100_000;
/// Used when the LSP does not advertise a usable maximum
pub const DEFAULT_MAX_CHANNEL_SATS: u64 = 16_000_000;
/// Used when neither a percent nor a ppm fee field is present
pub const DEFAULT_FEE_RATE_PERCENT: f64 = 0.1;

/// Validated channel-size bounds and fee model of an LSP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LspCapabilities {
    pub min_channel_sats: u64,
    pub max_channel_sats: u64,
    pub fee_rate_percent: f64,
    pub supports_zero_conf: bool,
    pub supports_zero_reserve: bool,
    /// Caller-suggested channel size clamped into `[min, max]`
    pub default_channel_sats: u64,
    /// Connection URIs advertised by the LSP (`pubkey@host:port`)
    #[serde(default)]
    pub uris: Vec<String>,
}

impl Default for LspCapabilities {
    fn default() -> Self {
        Self {
            min_channel_sats: DEFAULT_MIN_CHANNEL_SATS,
            max_channel_sats: DEFAULT_MAX_CHANNEL_SATS,
            fee_rate_percent: DEFAULT_FEE_RATE_PERCENT,
            supports_zero_conf: false,
            supports_zero_reserve: false,
            default_channel_sats: DEFAULT_MIN_CHANNEL_SATS,
            uris: Vec::new(),
        }
    }
}

impl LspCapabilities {
    pub fn contains(&self, channel_sats: u64) -> bool {
        (self.min_channel_sats..=self.max_channel_sats).contains(&channel_sats)
    }

    /// Fee the LSP is expected to charge for a channel of this size, rounded up
    pub fn estimate_fee_sats(&self, channel_sats: u64) -> u64 {
        let fee = channel_sats as f64 * self.fee_rate_percent / 100.0;
        fee.ceil() as u64
    }

    /// Public keys taken from the advertised connection URIs
    pub fn node_pubkeys(&self) -> Vec<String> {
        self.uris.iter().filter_map(|uri| pubkey_from_uri(uri)).collect()
    }
}

/// Split a `pubkey@host:port` connection URI and return the lowercased key.
/// A bare key (no `@`) is accepted as well.
pub fn pubkey_from_uri(uri: &str) -> Option<String> {
    let key = uri.split('@').next()?.trim();
    if key.is_empty() {
        return None;
    }
    Some(key.to_ascii_lowercase())
}

/// Parameters of a channel purchase. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOrderRequest {
    pub channel_size_sats: u64,
    pub node_public_key: String,
    pub required_confirmations: u32,
    pub funding_confirm_within_blocks: u32,
    pub expiry_blocks: u32,
    pub announce_channel: bool,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Created,
    PaymentPending,
    Paid,
    /// Provider reported a state we do not recognise; treated as in progress
    Processing,
    Completed,
    Failed,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Terminal states accept no further transitions
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        !self.is_terminal() || *self == next
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub funding_outpoint: OutPoint,
}

/// A channel order as last reported by the LSP. Replaced wholesale on every
/// status update, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub state: OrderState,
    pub invoice: Option<String>,
    pub total_sats: Option<u64>,
    pub channel_info: Option<ChannelInfo>,
}

impl Order {
    pub fn funding_outpoint(&self) -> Option<OutPoint> {
        self.channel_info.map(|info| info.funding_outpoint)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// One open channel as reported by the node backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub remote_pubkey: String,
    pub capacity_sats: u64,
    pub local_balance_sats: u64,
    pub active: bool,
    pub public: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_from_uri() {
        assert_eq!(
            pubkey_from_uri("02ABCDEF@lsp.example.com:9735").as_deref(),
            Some("02abcdef")
        );
        assert_eq!(pubkey_from_uri("03ffee").as_deref(), Some("03ffee"));
        assert_eq!(pubkey_from_uri("@host:9735"), None);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        for terminal in [OrderState::Completed, OrderState::Failed] {
            for next in [
                OrderState::Created,
                OrderState::PaymentPending,
                OrderState::Paid,
                OrderState::Processing,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!OrderState::Completed.can_transition_to(OrderState::Failed));
        assert!(OrderState::Paid.can_transition_to(OrderState::Completed));
        assert!(OrderState::Paid.can_transition_to(OrderState::PaymentPending));
    }

    #[test]
    fn test_fee_estimate_rounds_up() {
        let caps = LspCapabilities {
            fee_rate_percent: 0.1,
            ..Default::default()
        };
        assert_eq!(caps.estimate_fee_sats(1_000_000), 1_000);
        assert_eq!(caps.estimate_fee_sats(1_005), 2);
    }

    #[test]
    fn test_capabilities_range() {
        let caps = LspCapabilities::default();
        assert!(caps.contains(DEFAULT_MIN_CHANNEL_SATS));
        assert!(caps.contains(DEFAULT_MAX_CHANNEL_SATS));
        assert!(!caps.contains(DEFAULT_MAX_CHANNEL_SATS + 1));
    }
}
