//! Commands and events as tagged sums (§9: "represent events as a tagged
//! sum with variants per event name; dispatch is a total match").
//!
//! Events are value objects (§3 "Ownership"): created by clients, consumed
//! by the engine, and persisted into a position's event list by copy.

use crate::clock::Timestamp;
use crate::decimal::{Currency, FixedDecimal, Money, Price, Quantity};
use crate::ids::{AccountId, ExecutionId, OrderId, PositionId, StrategyId};
use crate::order::Order;

/// Details carried by a `PartiallyFilled` or `Filled` order event.
#[derive(Debug, Clone, PartialEq)]
pub struct FillDetails {
    pub execution_id: ExecutionId,
    pub fill_price: Price,
    pub fill_quantity: Quantity,
    /// Remaining unfilled quantity on the order after this fill. May be
    /// zero even on a `PartiallyFilled` event (§9 open question); callers
    /// should prefer [`FillDetails::is_exhausted`] over matching on the
    /// event kind.
    pub leaves_quantity: FixedDecimal,
    pub commission: Option<Money>,
    /// Settlement currency of the fill, carried separately from
    /// `commission` since a zero-commission fill still needs a currency
    /// tag to build the position's realized P&L (§3 "Position").
    pub currency: Currency,
    /// Broker-supplied position id reported on the fill itself, when the
    /// venue assigns one (§3 "id_broker"). `None` when the venue reports
    /// no broker-side position id, in which case the position falls back
    /// to `PositionId::to_broker_id()` for cross-referencing.
    pub position_id_broker: Option<String>,
}

impl FillDetails {
    pub fn is_exhausted(&self) -> bool {
        self.leaves_quantity.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEventKind {
    Submitted,
    Accepted,
    Rejected { reason: String },
    Working,
    PartiallyFilled(FillDetails),
    Filled(FillDetails),
    Cancelled,
    Expired,
    /// Advisory only: does not mutate order status (§4.2, §5).
    CancelReject { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub timestamp: Timestamp,
    pub kind: OrderEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionEventKind {
    Opened,
    Modified,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionEvent {
    pub position_id: PositionId,
    pub strategy_id: StrategyId,
    pub timestamp: Timestamp,
    pub kind: PositionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountStateEvent {
    pub account_id: AccountId,
    pub balances: Vec<Money>,
    pub timestamp: Timestamp,
}

/// Everything the engine's reactor queue can carry (§5: "commands and
/// events are serialized into one queue").
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Order(OrderEvent),
    Position(PositionEvent),
    Account(AccountStateEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOrderCommand {
    pub order: Order,
    pub strategy_id: StrategyId,
    pub position_id: Option<PositionId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitBracketOrderCommand {
    pub entry: Order,
    pub stop_loss: Order,
    pub take_profit: Order,
    pub strategy_id: StrategyId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyOrderCommand {
    pub order_id: OrderId,
    pub new_price: Option<Price>,
    pub new_quantity: Option<Quantity>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelOrderCommand {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountInquiryCommand {
    pub account_id: AccountId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionCommand {
    SubmitOrder(SubmitOrderCommand),
    SubmitBracketOrder(SubmitBracketOrderCommand),
    ModifyOrder(ModifyOrderCommand),
    CancelOrder(CancelOrderCommand),
    AccountInquiry(AccountInquiryCommand),
}
