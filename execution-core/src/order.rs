//! Order entity and state machine (§3 "Order", §4.2).
//!
//! `Order` is one concrete, storable, clonable value type rather than a
//! typestate per status — the execution database and the engine's event
//! routing both need to hold orders in arbitrary states in the same
//! collection. Fill validation (reject zero quantity/price, reject
//! over-fills, leave the order untouched on rejection) follows the
//! teacher's `FillError`/`FillResultOrError` discipline even though the
//! typestate wrapper itself does not carry over.

use crate::decimal::{FixedDecimal, Price, Quantity};
use crate::errors::ExecutionError;
use crate::events::{OrderEvent, OrderEventKind};
use crate::ids::{OrderId, Symbol};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    Mit,
}

impl OrderType {
    fn requires_price(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopMarket | OrderType::StopLimit | OrderType::Mit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
    Gtd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Initialized,
    Submitted,
    Accepted,
    Rejected,
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::Expired | OrderStatus::Filled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: Symbol,
    pub id: OrderId,
    pub label: Option<String>,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub timestamp: crate::clock::Timestamp,
    pub price: Option<Price>,
    pub time_in_force: Option<TimeInForce>,
    pub expire_time: Option<crate::clock::Timestamp>,
    status: OrderStatus,
    filled_quantity: FixedDecimal,
    average_price: FixedDecimal,
    /// Set by a `CancelReject` and cleared by the next successful `Cancelled`
    /// or `Accepted`/`Working` transition; lets a strategy tell whether a
    /// second `CancelOrder` would cross an in-flight one (§9 open question).
    in_flight_cancel: bool,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        id: OrderId,
        label: Option<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: Quantity,
        timestamp: crate::clock::Timestamp,
        price: Option<Price>,
        time_in_force: Option<TimeInForce>,
        expire_time: Option<crate::clock::Timestamp>,
    ) -> Result<Self, ExecutionError> {
        let needs_price = order_type.requires_price();
        if needs_price && price.is_none() {
            return Err(ExecutionError::invalid_argument("price is required for this order type"));
        }
        if !needs_price && price.is_some() {
            return Err(ExecutionError::invalid_argument("price is forbidden for MARKET orders"));
        }
        if matches!(time_in_force, Some(TimeInForce::Gtd)) && expire_time.is_none() {
            return Err(ExecutionError::invalid_argument("GTD orders require an expire_time"));
        }

        let precision = quantity.precision();
        Ok(Order {
            symbol,
            id,
            label,
            side,
            order_type,
            quantity,
            timestamp,
            price,
            time_in_force,
            expire_time,
            status: OrderStatus::Initialized,
            filled_quantity: FixedDecimal::zero(precision),
            average_price: FixedDecimal::zero(precision),
            in_flight_cancel: false,
        })
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn filled_quantity(&self) -> FixedDecimal {
        self.filled_quantity
    }

    pub fn average_price(&self) -> FixedDecimal {
        self.average_price
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn in_flight_cancel(&self) -> bool {
        self.in_flight_cancel
    }

    /// Overrides the in-flight-cancel bit directly. Used by the engine to
    /// restore the bit after `apply` clears it on a `CancelReject`, when
    /// `EngineConfig::clear_in_flight_cancel_on_reject` is `false` (§9 open
    /// question; see DESIGN.md).
    pub fn set_in_flight_cancel(&mut self, value: bool) {
        self.in_flight_cancel = value;
    }

    fn weighted_average_price(&self, fill_price: Price, fill_quantity: Quantity) -> FixedDecimal {
        let prior_filled = self.filled_quantity;
        let new_filled = prior_filled.add(&fill_quantity.as_decimal());
        if new_filled.is_zero() {
            return FixedDecimal::zero(self.average_price.precision());
        }
        let prior_notional = self.average_price.mul(&prior_filled);
        let fill_notional = fill_price.as_decimal().mul(&fill_quantity.as_decimal());
        prior_notional.add(&fill_notional).div(&new_filled)
    }

    /// Applies an event to this order, enforcing the §4.2 transition table.
    ///
    /// An event for a different order id is an invariant violation: it
    /// indicates a routing bug upstream, not a recoverable condition. A
    /// repeated event identical in kind to the current terminal status is a
    /// no-op; a different one on an already-terminal order is rejected.
    pub fn apply(&mut self, event: &OrderEvent) -> Result<(), ExecutionError> {
        if event.order_id != self.id {
            return Err(ExecutionError::invariant(format!(
                "event for order {} applied to order {}",
                event.order_id, self.id
            )));
        }

        if let OrderEventKind::CancelReject { .. } = &event.kind {
            self.in_flight_cancel = false;
            return Ok(());
        }

        let target_status = self.target_status(&event.kind);

        if self.status.is_terminal() {
            if target_status == self.status {
                return Ok(());
            }
            return Err(ExecutionError::StateTransitionNotAllowed {
                order_id: self.id.clone(),
                from: self.status,
                event: event_name(&event.kind),
            });
        }

        match &event.kind {
            OrderEventKind::Submitted => self.status = OrderStatus::Submitted,
            OrderEventKind::Accepted => {
                self.status = OrderStatus::Accepted;
                self.in_flight_cancel = false;
            }
            OrderEventKind::Rejected { .. } => self.status = OrderStatus::Rejected,
            OrderEventKind::Working => {
                self.status = OrderStatus::Working;
                self.in_flight_cancel = false;
            }
            OrderEventKind::PartiallyFilled(fill) | OrderEventKind::Filled(fill) => {
                self.apply_fill(fill)?;
                self.status = if fill.is_exhausted() { OrderStatus::Filled } else { OrderStatus::PartiallyFilled };
            }
            OrderEventKind::Cancelled => self.status = OrderStatus::Cancelled,
            OrderEventKind::Expired => self.status = OrderStatus::Expired,
            OrderEventKind::CancelReject { .. } => unreachable!("handled above"),
        }

        Ok(())
    }

    fn target_status(&self, kind: &OrderEventKind) -> OrderStatus {
        match kind {
            OrderEventKind::Submitted => OrderStatus::Submitted,
            OrderEventKind::Accepted => OrderStatus::Accepted,
            OrderEventKind::Rejected { .. } => OrderStatus::Rejected,
            OrderEventKind::Working => OrderStatus::Working,
            OrderEventKind::PartiallyFilled(fill) | OrderEventKind::Filled(fill) => {
                if fill.is_exhausted() { OrderStatus::Filled } else { OrderStatus::PartiallyFilled }
            }
            OrderEventKind::Cancelled => OrderStatus::Cancelled,
            OrderEventKind::Expired => OrderStatus::Expired,
            OrderEventKind::CancelReject { .. } => self.status,
        }
    }

    fn apply_fill(&mut self, fill: &crate::events::FillDetails) -> Result<(), ExecutionError> {
        if fill.fill_quantity.raw().is_zero() {
            return Err(ExecutionError::invalid_argument("fill quantity must not be zero"));
        }
        if fill.fill_price.raw().is_zero() {
            return Err(ExecutionError::invalid_argument("fill price must not be zero"));
        }
        let remaining = self.quantity.as_decimal().sub(&self.filled_quantity);
        if fill.fill_quantity.as_decimal().raw() > remaining.raw() {
            return Err(ExecutionError::invalid_argument(format!(
                "fill quantity {} exceeds remaining {}",
                fill.fill_quantity, remaining
            )));
        }

        self.average_price = self.weighted_average_price(fill.fill_price, fill.fill_quantity);
        self.filled_quantity = self.filled_quantity.add(&fill.fill_quantity.as_decimal());
        Ok(())
    }
}

fn event_name(kind: &OrderEventKind) -> String {
    match kind {
        OrderEventKind::Submitted => "Submitted".into(),
        OrderEventKind::Accepted => "Accepted".into(),
        OrderEventKind::Rejected { .. } => "Rejected".into(),
        OrderEventKind::Working => "Working".into(),
        OrderEventKind::PartiallyFilled(_) => "PartiallyFilled".into(),
        OrderEventKind::Filled(_) => "Filled".into(),
        OrderEventKind::Cancelled => "Cancelled".into(),
        OrderEventKind::Expired => "Expired".into(),
        OrderEventKind::CancelReject { .. } => "CancelReject".into(),
    }
}
