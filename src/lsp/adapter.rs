//! Protocol adapter boundary.
//!
//! Every provider-specific name lives here: endpoint paths, the public key
//! field of the order request, the order state vocabulary and the ordered
//! alias lists used to read capability, order and channel documents.
//! Supporting a new provider means adding a row to [`ADAPTERS`].

use std::fmt;
use std::str::FromStr;

use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::AppError;
use crate::types::{ChannelInfo, ChannelOrderRequest, ChannelRecord, Order, OrderState};

// Capability document fields, in priority order
pub const MIN_CHANNEL_FIELDS: &[&str] = &[
    "min_channel_balance_sat",
    "minChannelBalanceSat",
    "min_initial_lsp_balance_sat",
    "minInitialLspBalanceSat",
    "min_channel_size_sat",
    "minChannelSizeSat",
];
pub const MAX_CHANNEL_FIELDS: &[&str] = &[
    "max_channel_balance_sat",
    "maxChannelBalanceSat",
    "max_initial_lsp_balance_sat",
    "maxInitialLspBalanceSat",
    "max_channel_size_sat",
    "maxChannelSizeSat",
];
pub const FEE_PERCENT_FIELDS: &[&str] = &[
    "fee_rate_percent",
    "feeRatePercent",
    "fee_percent",
    "feePercent",
];
pub const FEE_PPM_FIELDS: &[&str] = &[
    "fee_rate_ppm",
    "feeRatePpm",
    "fee_ppm",
    "feePpm",
    "channel_fee_ppm",
];
pub const ZERO_CONF_FIELDS: &[&str] = &[
    "supports_zero_conf",
    "supportsZeroConf",
    "zero_conf",
    "zeroConf",
];
pub const ZERO_RESERVE_FIELDS: &[&str] = &[
    "supports_zero_reserve",
    "supportsZeroReserve",
    "zero_reserve",
    "zeroReserve",
];
pub const MIN_CONFIRMATIONS_FIELDS: &[&str] = &[
    "min_required_channel_confirmations",
    "minRequiredChannelConfirmations",
];
pub const URI_FIELDS: &[&str] = &["uris", "connection_uris", "connectionUris"];

// Order document fields
pub const ORDER_ID_FIELDS: &[&str] = &["order_id", "orderId", "id"];
pub const ORDER_STATE_FIELDS: &[&str] = &["state", "order_state", "orderState", "status"];
pub const INVOICE_PATHS: &[&[&str]] = &[
    &["payment_request"],
    &["paymentRequest"],
    &["invoice"],
    &["bolt11"],
    &["payment", "bolt11", "invoice"],
    &["payment", "bolt11_invoice"],
];
pub const TOTAL_SATS_PATHS: &[&[&str]] = &[
    &["total_sats"],
    &["totalSats"],
    &["amount"],
    &["fee_total_sat"],
    &["payment", "bolt11", "order_total_sat"],
    &["payment", "order_total_sat"],
];
pub const FUNDING_OUTPOINT_PATHS: &[&[&str]] = &[
    &["channelInfo", "fundingOutpoint"],
    &["channel_info", "funding_outpoint"],
    &["channel", "funding_outpoint"],
    &["channel", "fundingOutpoint"],
];

// Channel list fields
pub const REMOTE_PUBKEY_FIELDS: &[&str] = &[
    "remote_pubkey",
    "remotePubkey",
    "remote_node_id",
    "remoteNodeId",
    "peer_id",
];
pub const CAPACITY_FIELDS: &[&str] = &["capacity", "capacity_sat", "capacitySat"];
pub const LOCAL_BALANCE_FIELDS: &[&str] = &[
    "local_balance",
    "local_balance_sat",
    "localBalance",
    "outbound_capacity_sat",
];
pub const ACTIVE_FIELDS: &[&str] = &["active", "is_active", "isActive", "is_usable"];
pub const PUBLIC_FIELDS: &[&str] = &["public", "is_public", "isPublic"];
pub const PRIVATE_FIELDS: &[&str] = &["private", "is_private"];

/// Vocabulary every provider shares
const BASE_STATE_VOCABULARY: &[(&str, OrderState)] = &[
    ("CREATED", OrderState::Created),
    ("PAYMENT_PENDING", OrderState::PaymentPending),
    ("OPEN", OrderState::PaymentPending),
    ("PAID", OrderState::Paid),
    ("PAYMENT_RECEIVED", OrderState::Paid),
    ("COMPLETED", OrderState::Completed),
    ("SUCCESS", OrderState::Completed),
    ("FAILED", OrderState::Failed),
    ("ERROR", OrderState::Failed),
];

const LSPS1_STATE_VOCABULARY: &[(&str, OrderState)] = &[
    ("EXPECT_PAYMENT", OrderState::PaymentPending),
    ("HOLD", OrderState::Paid),
    ("REFUNDED", OrderState::Failed),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// LSP reached directly with the `/order` protocol
    Direct,
    /// Orders placed through the backend create-order proxy
    Proxy,
    /// LSPS1-over-HTTP providers
    Lsps1,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxy => "proxy",
            Self::Lsps1 => "lsps1",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "proxy" => Ok(Self::Proxy),
            "lsps1" => Ok(Self::Lsps1),
            other => Err(AppError::configuration_error(format!(
                "Unknown LSP provider '{}', expected one of: direct, proxy, lsps1",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct ProviderAdapter {
    pub kind: ProviderKind,
    /// Bumped whenever a provider changes its wire names
    pub version: u32,
    pub info_path: &'static str,
    pub order_path: &'static str,
    /// `{order_id}` is replaced with the percent-encoded order id
    pub order_status_path: &'static str,
    pub pubkey_field: &'static str,
    pub extra_states: &'static [(&'static str, OrderState)],
}

pub static ADAPTERS: &[ProviderAdapter] = &[
    ProviderAdapter {
        kind: ProviderKind::Direct,
        version: 1,
        info_path: "/info",
        order_path: "/order",
        order_status_path: "/order/{order_id}",
        pubkey_field: "public_key",
        extra_states: &[],
    },
    ProviderAdapter {
        kind: ProviderKind::Proxy,
        version: 1,
        info_path: "/info",
        order_path: "/order",
        order_status_path: "/order/{order_id}",
        pubkey_field: "node_pubkey",
        extra_states: &[],
    },
    ProviderAdapter {
        kind: ProviderKind::Lsps1,
        version: 1,
        info_path: "/api/v1/get_info",
        order_path: "/api/v1/create_order",
        order_status_path: "/api/v1/get_order?order_id={order_id}",
        pubkey_field: "public_key",
        extra_states: LSPS1_STATE_VOCABULARY,
    },
];

impl ProviderAdapter {
    pub fn for_kind(kind: ProviderKind) -> &'static ProviderAdapter {
        ADAPTERS
            .iter()
            .find(|adapter| adapter.kind == kind)
            .unwrap_or(&ADAPTERS[0])
    }

    pub fn status_path(&self, order_id: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(order_id.as_bytes()).collect();
        self.order_status_path.replace("{order_id}", &encoded)
    }

    /// Canonical order body with the provider's public key field name
    pub fn order_request_body(&self, request: &ChannelOrderRequest) -> Value {
        let mut body = Map::new();
        body.insert(
            "lsp_balance_sat".to_string(),
            json!(request.channel_size_sats.to_string()),
        );
        body.insert("client_balance_sat".to_string(), json!("0"));
        body.insert(
            "required_channel_confirmations".to_string(),
            json!(request.required_confirmations),
        );
        body.insert(
            "funding_confirms_within_blocks".to_string(),
            json!(request.funding_confirm_within_blocks),
        );
        body.insert(
            "channel_expiry_blocks".to_string(),
            json!(request.expiry_blocks),
        );
        body.insert("token".to_string(), json!(request.token));
        body.insert(
            "announce_channel".to_string(),
            json!(request.announce_channel),
        );
        body.insert(
            self.pubkey_field.to_string(),
            json!(request.node_public_key),
        );
        Value::Object(body)
    }

    /// Map a provider state string onto the canonical enum. Unknown values
    /// are treated as in progress rather than rejected.
    pub fn map_state(&self, raw: &str) -> OrderState {
        let normalized = raw.trim().to_ascii_uppercase().replace(&['-', ' '][..], "_");
        BASE_STATE_VOCABULARY
            .iter()
            .chain(self.extra_states.iter())
            .find(|(name, _)| *name == normalized)
            .map(|(_, state)| *state)
            .unwrap_or(OrderState::Processing)
    }

    /// Read one order object. Returns `None` when no order id is present.
    pub fn parse_order(&self, item: &Value) -> Option<Order> {
        let order_id = first_field(item, ORDER_ID_FIELDS).and_then(as_string_lenient)?;
        Some(self.order_with_id(item, order_id))
    }

    /// Creation result that names no order id but carries an invoice. The
    /// order id is left empty, so it can be paid but not polled.
    pub fn parse_unidentified_order(&self, item: &Value) -> Option<Order> {
        let order = self.order_with_id(item, String::new());
        order.invoice.is_some().then_some(order)
    }

    fn order_with_id(&self, item: &Value, order_id: String) -> Order {
        let state = first_field_with(item, ORDER_STATE_FIELDS, Value::as_str)
            .map(|raw| self.map_state(raw))
            .unwrap_or(OrderState::Created);

        let invoice = first_path(item, INVOICE_PATHS)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let total_sats = first_path_with(item, TOTAL_SATS_PATHS, as_u64_lenient);

        let channel_info = first_path(item, FUNDING_OUTPOINT_PATHS)
            .and_then(Value::as_str)
            .and_then(|raw| match OutPoint::from_str(raw) {
                Ok(funding_outpoint) => Some(ChannelInfo { funding_outpoint }),
                Err(e) => {
                    warn!(
                        order_id = %order_id,
                        funding_outpoint = %raw,
                        error = %e,
                        "Ignoring malformed funding outpoint"
                    );
                    None
                }
            });

        Order {
            order_id,
            state,
            invoice,
            total_sats,
            channel_info,
        }
    }
}

/// Read one channel entry from a channel list. Entries without a remote
/// node key are skipped.
pub fn parse_channel_record(item: &Value) -> Option<ChannelRecord> {
    let remote_pubkey = first_field(item, REMOTE_PUBKEY_FIELDS)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_ascii_lowercase();

    let public = match first_field_with(item, PUBLIC_FIELDS, as_bool_lenient) {
        Some(public) => public,
        None => !first_field_with(item, PRIVATE_FIELDS, as_bool_lenient).unwrap_or(false),
    };

    Some(ChannelRecord {
        remote_pubkey,
        capacity_sats: first_field_with(item, CAPACITY_FIELDS, as_u64_lenient).unwrap_or(0),
        local_balance_sats: first_field_with(item, LOCAL_BALANCE_FIELDS, as_u64_lenient)
            .unwrap_or(0),
        active: first_field_with(item, ACTIVE_FIELDS, as_bool_lenient).unwrap_or(false),
        public,
    })
}

/// First present, non-null field from `fields`
pub fn first_field<'a>(doc: &'a Value, fields: &[&str]) -> Option<&'a Value> {
    let object = doc.as_object()?;
    fields
        .iter()
        .filter_map(|field| object.get(*field))
        .find(|value| !value.is_null())
}

/// First field from `fields` whose value `convert` accepts
pub fn first_field_with<'a, T>(
    doc: &'a Value,
    fields: &[&str],
    convert: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    let object = doc.as_object()?;
    fields
        .iter()
        .filter_map(|field| object.get(*field))
        .find_map(convert)
}

pub fn first_path<'a>(doc: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup_path(doc, path))
        .find(|value| !value.is_null())
}

pub fn first_path_with<T>(
    doc: &Value,
    paths: &[&[&str]],
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    paths
        .iter()
        .filter_map(|path| lookup_path(doc, path))
        .find_map(convert)
}

fn lookup_path<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |current, key| current.get(*key))
}

/// Numbers may arrive as JSON numbers or decimal strings
pub fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_f64_lenient(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub fn as_bool_lenient(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_string_lenient(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
