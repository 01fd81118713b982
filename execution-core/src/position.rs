//! Position entity and FIFO weighted-average aggregation (§3 "Position",
//! §4.3).
//!
//! Reimplements the teacher's `Position::process_fill_fixed_with_fee`
//! (`core/types.rs`) weighted-average-entry-price and flip-handling math
//! (the fee parameter and its `realized_pnl -= fee` step are not carried
//! over; spec.md has no notion of commission) with `rust_decimal`-backed
//! [`FixedDecimal`] instead of atomics, since the position is owned
//! exclusively by the engine's single-threaded reactor (§5) and never
//! needs lock-free concurrent mutation.

use crate::clock::Timestamp;
use crate::decimal::{Currency, FixedDecimal, Money, Price, Quantity};
use crate::errors::ExecutionError;
use crate::ids::{ExecutionId, OrderId, PositionId};
use crate::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPosition {
    Long,
    Short,
    Flat,
}

/// A single fill applied to a position, as distinct from an `OrderEvent`:
/// the position model only needs the execution details, not the order's
/// full lifecycle context.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFill {
    pub order_id: OrderId,
    pub execution_id: ExecutionId,
    pub side: OrderSide,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
    pub currency: Currency,
    /// Broker-supplied position id, when the venue assigns one on the fill
    /// itself (§3 "id_broker", §4.3 step 5). `None` when the venue doesn't
    /// report one.
    pub id_broker: Option<String>,
}

/// One entry in a position's event history (§3 "event list", §4.3 step 5:
/// "Append event to history").
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEventRecord {
    pub order_id: OrderId,
    pub execution_id: ExecutionId,
    pub side: OrderSide,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
}

impl From<&PositionFill> for PositionEventRecord {
    fn from(fill: &PositionFill) -> Self {
        PositionEventRecord {
            order_id: fill.order_id.clone(),
            execution_id: fill.execution_id.clone(),
            side: fill.side,
            price: fill.price,
            quantity: fill.quantity,
            timestamp: fill.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteTick {
    pub bid: Price,
    pub ask: Price,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub id_broker: Option<String>,
    pub from_order_id: OrderId,
    entry_direction: Option<OrderSide>,
    net_quantity: FixedDecimal,
    peak_quantity: FixedDecimal,
    pub opened_time: Option<Timestamp>,
    pub closed_time: Option<Timestamp>,
    average_open_price: FixedDecimal,
    average_close_price: FixedDecimal,
    closed_quantity_in_epoch: FixedDecimal,
    realized_points: FixedDecimal,
    realized_return: FixedDecimal,
    realized_pnl: Money,
    order_ids: Vec<OrderId>,
    execution_ids: Vec<ExecutionId>,
    events: Vec<PositionEventRecord>,
    last_currency: Currency,
}

impl Position {
    /// Creates a position from the first fill (§3: "A position is created
    /// from the first fill").
    pub fn open(id: PositionId, fill: &PositionFill) -> Result<Self, ExecutionError> {
        let precision = fill.price.precision();
        let mut position = Position {
            id,
            id_broker: None,
            from_order_id: fill.order_id.clone(),
            entry_direction: None,
            net_quantity: FixedDecimal::zero(precision),
            peak_quantity: FixedDecimal::zero(precision),
            opened_time: None,
            closed_time: None,
            average_open_price: FixedDecimal::zero(precision),
            average_close_price: FixedDecimal::zero(precision),
            closed_quantity_in_epoch: FixedDecimal::zero(precision),
            realized_points: FixedDecimal::zero(precision),
            realized_return: FixedDecimal::zero(precision),
            realized_pnl: Money::zero(2, fill.currency.clone()),
            order_ids: Vec::new(),
            execution_ids: Vec::new(),
            events: Vec::new(),
            last_currency: fill.currency.clone(),
        };
        position.apply_fill(fill)?;
        Ok(position)
    }

    pub fn market_position(&self) -> MarketPosition {
        if self.net_quantity.is_zero() {
            MarketPosition::Flat
        } else if self.net_quantity.is_sign_positive() {
            MarketPosition::Long
        } else {
            MarketPosition::Short
        }
    }

    pub fn quantity(&self) -> FixedDecimal {
        self.net_quantity
    }

    pub fn peak_quantity(&self) -> FixedDecimal {
        self.peak_quantity
    }

    pub fn average_open_price(&self) -> FixedDecimal {
        self.average_open_price
    }

    pub fn average_close_price(&self) -> FixedDecimal {
        self.average_close_price
    }

    pub fn realized_points(&self) -> FixedDecimal {
        self.realized_points
    }

    pub fn realized_return(&self) -> FixedDecimal {
        self.realized_return
    }

    pub fn realized_pnl(&self) -> &Money {
        &self.realized_pnl
    }

    pub fn order_ids(&self) -> &[OrderId] {
        &self.order_ids
    }

    pub fn execution_ids(&self) -> &[ExecutionId] {
        &self.execution_ids
    }

    /// Event history (§3 "event list"): one [`PositionEventRecord`] per
    /// fill applied, in arrival order.
    pub fn events(&self) -> &[PositionEventRecord] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_open(&self) -> bool {
        self.market_position() != MarketPosition::Flat
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    fn delta(fill: &PositionFill) -> FixedDecimal {
        let magnitude = fill.quantity.as_decimal();
        match fill.side {
            OrderSide::Buy => magnitude,
            OrderSide::Sell => magnitude.neg(),
        }
    }

    /// Applies one fill in arrival order (§4.3, §5: "positions do not
    /// reorder fills").
    pub fn apply_fill(&mut self, fill: &PositionFill) -> Result<(), ExecutionError> {
        let delta = Self::delta(fill);
        let net = self.net_quantity;
        self.last_currency = fill.currency.clone();

        if !self.order_ids.contains(&fill.order_id) {
            self.order_ids.push(fill.order_id.clone());
        }
        if !self.execution_ids.contains(&fill.execution_id) {
            self.execution_ids.push(fill.execution_id.clone());
        }
        self.events.push(PositionEventRecord::from(fill));

        // A venue-supplied id_broker on the fill is authoritative; absent
        // one, cross-reference via the engine-assigned PositionId (§3
        // "used for cross-referencing").
        match &fill.id_broker {
            Some(broker) => self.id_broker = Some(broker.clone()),
            None if self.id_broker.is_none() => self.id_broker = Some(self.id.to_broker_id()),
            None => {}
        }

        let same_sign = net.is_zero() || (net.is_sign_positive() == delta.is_sign_positive());

        if same_sign {
            self.apply_opening_leg(delta, fill);
        } else {
            self.apply_reducing_leg(delta, fill)?;
        }

        match self.market_position() {
            MarketPosition::Flat => self.closed_time = Some(fill.timestamp),
            _ => self.closed_time = None,
        }

        Ok(())
    }

    fn apply_opening_leg(&mut self, delta: FixedDecimal, fill: &PositionFill) {
        let old_abs = self.net_quantity.abs();
        let qty = fill.quantity.as_decimal();
        let new_net = self.net_quantity.add(&delta);

        let numerator = old_abs.mul(&self.average_open_price).add(&qty.mul(&fill.price.as_decimal()));
        let denominator = old_abs.add(&qty);
        self.average_open_price = numerator.div(&denominator);

        if old_abs.is_zero() {
            if self.opened_time.is_none() {
                self.opened_time = Some(fill.timestamp);
            }
            self.entry_direction = Some(fill.side);
            self.closed_quantity_in_epoch = FixedDecimal::zero(old_abs.precision());
        }

        self.net_quantity = new_net;
        let new_abs = new_net.abs();
        if new_abs > self.peak_quantity {
            self.peak_quantity = new_abs;
        }
    }

    fn apply_reducing_leg(&mut self, delta: FixedDecimal, fill: &PositionFill) -> Result<(), ExecutionError> {
        let abs_net = self.net_quantity.abs();
        let abs_delta = delta.abs();
        let closed = if abs_net < abs_delta { abs_net } else { abs_delta };

        let closed_so_far_old = self.closed_quantity_in_epoch;
        let closed_so_far_new = closed_so_far_old.add(&closed);
        let numerator = closed_so_far_old.mul(&self.average_close_price).add(&closed.mul(&fill.price.as_decimal()));
        self.average_close_price = numerator.div(&closed_so_far_new);
        self.closed_quantity_in_epoch = closed_so_far_new;

        let entry_was_long = matches!(
            self.entry_direction,
            Some(OrderSide::Buy)
        );
        self.realized_points = if entry_was_long {
            self.average_close_price.sub(&self.average_open_price)
        } else {
            self.average_open_price.sub(&self.average_close_price)
        };
        self.realized_return = if self.average_open_price.is_zero() {
            FixedDecimal::zero(self.realized_points.precision())
        } else {
            self.realized_points.div(&self.average_open_price)
        };
        self.realized_pnl = Money::new(
            self.realized_points.mul(&closed_so_far_new).raw(),
            2,
            fill.currency.clone(),
        );

        let new_net = self.net_quantity.add(&delta);
        if abs_delta > abs_net {
            // flip: re-apply the opening-leg formula to the excess, with
            // average_open_price reset to this fill's price (§4.3 rule 3).
            self.average_open_price = fill.price.as_decimal();
            self.entry_direction = Some(fill.side);
            self.closed_quantity_in_epoch = FixedDecimal::zero(abs_net.precision());
            let excess = abs_delta.sub(&abs_net);
            if excess.abs() > self.peak_quantity {
                self.peak_quantity = excess.abs();
            }
        }
        self.net_quantity = new_net;

        Ok(())
    }

    pub fn unrealized_points(&self, tick: &QuoteTick) -> FixedDecimal {
        match self.market_position() {
            MarketPosition::Long => tick.bid.as_decimal().sub(&self.average_open_price),
            MarketPosition::Short => self.average_open_price.sub(&tick.ask.as_decimal()),
            MarketPosition::Flat => FixedDecimal::zero(self.average_open_price.precision()),
        }
    }

    pub fn unrealized_return(&self, tick: &QuoteTick) -> FixedDecimal {
        if self.average_open_price.is_zero() {
            return FixedDecimal::zero(self.average_open_price.precision());
        }
        self.unrealized_points(tick).div(&self.average_open_price)
    }

    pub fn unrealized_pnl(&self, tick: &QuoteTick) -> Money {
        let points = self.unrealized_points(tick);
        Money::new(points.mul(&self.net_quantity.abs()).raw(), 2, self.last_currency.clone())
    }

    pub fn total_points(&self, tick: &QuoteTick) -> FixedDecimal {
        self.realized_points.add(&self.unrealized_points(tick))
    }

    pub fn total_pnl(&self, tick: &QuoteTick) -> Result<Money, ExecutionError> {
        self.realized_pnl.add(&self.unrealized_pnl(tick))
    }
}
