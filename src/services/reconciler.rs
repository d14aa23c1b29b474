use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};

use crate::types::{ChannelRecord, Order, OrderState};

/// Everything the presentation layer needs to render the order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderViewModel {
    pub order_id: Option<String>,
    pub state: Option<OrderState>,
    pub invoice: Option<String>,
    pub total_sats: Option<u64>,
    pub funding_outpoint: Option<OutPoint>,
    pub is_terminal: bool,
    /// Channels with the LSP, shown until the order reports its funding
    /// outpoint
    pub channel_data: Vec<ChannelRecord>,
    pub status_message: String,
}

/// Merge the latest order status and channel list into one view model.
///
/// `latest` takes precedence over `created`, the result of the creation call
/// that stands in until the first status poll lands. Channels are attached
/// only while no funding outpoint is known. No I/O; equal inputs give equal
/// output.
pub fn reconcile(
    created: Option<&Order>,
    latest: Option<&Order>,
    channels: &[ChannelRecord],
) -> OrderViewModel {
    let order = latest.or(created);

    let funding_outpoint = order.and_then(Order::funding_outpoint);
    let channel_data = if funding_outpoint.is_none() {
        channels.to_vec()
    } else {
        Vec::new()
    };

    let Some(order) = order else {
        return OrderViewModel {
            order_id: None,
            state: None,
            invoice: None,
            total_sats: None,
            funding_outpoint: None,
            is_terminal: false,
            channel_data,
            status_message: "No channel order yet".to_string(),
        };
    };

    // A status response may omit fields the creation response carried
    let fallback = created.filter(|c| c.order_id == order.order_id);
    let invoice = order
        .invoice
        .clone()
        .or_else(|| fallback.and_then(|c| c.invoice.clone()));
    let total_sats = order
        .total_sats
        .or_else(|| fallback.and_then(|c| c.total_sats));

    OrderViewModel {
        order_id: Some(order.order_id.clone()),
        state: Some(order.state),
        invoice,
        total_sats,
        funding_outpoint,
        is_terminal: order.is_terminal(),
        channel_data,
        status_message: status_message(order.state, funding_outpoint).to_string(),
    }
}

fn status_message(state: OrderState, funding_outpoint: Option<OutPoint>) -> &'static str {
    match state {
        OrderState::Created | OrderState::PaymentPending => "Waiting for payment",
        OrderState::Paid | OrderState::Processing => "Payment received, opening channel",
        OrderState::Completed if funding_outpoint.is_some() => "Channel funding broadcast",
        OrderState::Completed => "Channel order completed",
        OrderState::Failed => "Channel order failed",
    }
}
