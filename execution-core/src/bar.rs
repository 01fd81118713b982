//! Bar aggregators (§3 "Bar", §4.6).
//!
//! `BarBuilder` is the shared OHLCV accumulator; `TickBarAggregator` and
//! `TimeBarAggregator` each decide when a boundary is reached and hand the
//! built bar to a registered [`BarHandler`]. Grounded loosely on the
//! teacher's `data::types::conversions`/`MarketSnapshotExt` Decimal-from-tick
//! helpers (`bog-core/src/data/types.rs`); the `Clock` injection point is a
//! pack-sourced addition (§9) the teacher itself does not have, since it
//! reads `SystemTime::now()` directly.

use crate::clock::{Clock, Timestamp};
use crate::decimal::{FixedDecimal, Price, Quantity};
use crate::errors::ExecutionError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceType {
    Bid,
    Ask,
    Mid,
}

/// Resolves the §9 open question on tick-bar volume aggregation: both sides
/// of every quote tick are counted by default (`BidPlusAsk`), with
/// `BidOnly`/`AskOnly` exposed for callers that want one side only. See
/// `DESIGN.md` for why this, rather than the spec's literal fixture value,
/// is the implemented rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeRule {
    BidOnly,
    AskOnly,
    BidPlusAsk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarSpec {
    pub price_type: PriceType,
    pub volume_rule: VolumeRule,
    pub use_previous_close: bool,
}

impl Default for BarSpec {
    fn default() -> Self {
        BarSpec { price_type: PriceType::Mid, volume_rule: VolumeRule::BidPlusAsk, use_previous_close: true }
    }
}

/// A single two-sided quote observation driving bar construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub bid: Price,
    pub ask: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub timestamp: Timestamp,
}

impl Tick {
    fn price(&self, price_type: PriceType) -> Price {
        match price_type {
            PriceType::Bid => self.bid,
            PriceType::Ask => self.ask,
            PriceType::Mid => {
                let precision = self.bid.precision().max(self.ask.precision()) + 1;
                let two = FixedDecimal::new(rust_decimal::Decimal::from(2), 0);
                let mid = self.bid.as_decimal().add(&self.ask.as_decimal()).div(&two);
                Price::new(mid.raw(), precision).expect("mid of two non-negative prices is non-negative")
            }
        }
    }

    fn volume(&self, rule: VolumeRule) -> FixedDecimal {
        match rule {
            VolumeRule::BidOnly => self.bid_size.as_decimal(),
            VolumeRule::AskOnly => self.ask_size.as_decimal(),
            VolumeRule::BidPlusAsk => self.bid_size.as_decimal().add(&self.ask_size.as_decimal()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: FixedDecimal,
    pub timestamp: Timestamp,
}

pub trait BarHandler: Send {
    fn handle_bar(&mut self, bar: Bar);
}

impl BarHandler for Vec<Bar> {
    fn handle_bar(&mut self, bar: Bar) {
        self.push(bar);
    }
}

/// Shared OHLCV accumulator (§4.6 "BarBuilder").
#[derive(Debug, Clone)]
pub struct BarBuilder {
    use_previous_close: bool,
    open: Option<Price>,
    high: Option<Price>,
    low: Option<Price>,
    close: Option<Price>,
    volume: FixedDecimal,
    last_timestamp: Timestamp,
    previous_close: Option<Price>,
}

impl BarBuilder {
    pub fn new(use_previous_close: bool, volume_precision: u8) -> Self {
        BarBuilder {
            use_previous_close,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: FixedDecimal::zero(volume_precision),
            last_timestamp: 0,
            previous_close: None,
        }
    }

    pub fn has_updates(&self) -> bool {
        self.open.is_some()
    }

    pub fn update(&mut self, price: Price, volume: FixedDecimal, timestamp: Timestamp) {
        if self.open.is_none() {
            self.open = Some(price);
            self.high = Some(price);
            self.low = Some(price);
        } else {
            if price > self.high.unwrap() {
                self.high = Some(price);
            }
            if price < self.low.unwrap() {
                self.low = Some(price);
            }
        }
        self.close = Some(price);
        self.volume = self.volume.add(&volume);
        self.last_timestamp = timestamp;
    }

    /// Returns the accumulated bar and resets for the next window, carrying
    /// the previous close forward when configured. Building an empty
    /// window succeeds only when `use_previous_close` is set and a prior
    /// close exists (§4.6, §8 "Bar builder idempotence"); otherwise it is an
    /// error.
    pub fn build(&mut self, boundary_timestamp: Timestamp) -> Result<Bar, ExecutionError> {
        if let Some(open) = self.open {
            let bar = Bar {
                open,
                high: self.high.unwrap(),
                low: self.low.unwrap(),
                close: self.close.unwrap(),
                volume: self.volume,
                timestamp: self.last_timestamp,
            };
            self.previous_close = Some(bar.close);
            self.reset();
            return Ok(bar);
        }

        if self.use_previous_close {
            if let Some(prev) = self.previous_close {
                return Ok(Bar {
                    open: prev,
                    high: prev,
                    low: prev,
                    close: prev,
                    volume: FixedDecimal::zero(self.volume.precision()),
                    timestamp: boundary_timestamp,
                });
            }
        }

        Err(ExecutionError::invalid_argument("build() called with no updates and no previous close to carry forward"))
    }

    fn reset(&mut self) {
        self.open = None;
        self.high = None;
        self.low = None;
        self.close = None;
        self.volume = FixedDecimal::zero(self.volume.precision());
    }
}

pub struct TickBarAggregator {
    n: usize,
    spec: BarSpec,
    builder: BarBuilder,
    count: usize,
    handler: Box<dyn BarHandler>,
}

impl TickBarAggregator {
    pub fn new(n: usize, spec: BarSpec, volume_precision: u8, handler: Box<dyn BarHandler>) -> Self {
        TickBarAggregator { n, spec, builder: BarBuilder::new(spec.use_previous_close, volume_precision), count: 0, handler }
    }

    pub fn spec(&self) -> BarSpec {
        self.spec
    }

    pub fn update(&mut self, tick: Tick) -> Result<(), ExecutionError> {
        let price = tick.price(self.spec.price_type);
        let volume = tick.volume(self.spec.volume_rule);
        self.builder.update(price, volume, tick.timestamp);
        self.count += 1;

        if self.count >= self.n {
            let bar = self.builder.build(tick.timestamp)?;
            self.handler.handle_bar(bar);
            self.count = 0;
        }
        Ok(())
    }
}

pub struct TimeBarAggregator {
    interval_nanos: i64,
    spec: BarSpec,
    builder: BarBuilder,
    next_boundary: Option<Timestamp>,
    clock: Arc<dyn Clock>,
    handler: Box<dyn BarHandler>,
}

impl TimeBarAggregator {
    pub fn new(interval_nanos: i64, spec: BarSpec, volume_precision: u8, clock: Arc<dyn Clock>, handler: Box<dyn BarHandler>) -> Self {
        TimeBarAggregator {
            interval_nanos,
            spec,
            builder: BarBuilder::new(spec.use_previous_close, volume_precision),
            next_boundary: None,
            clock,
            handler,
        }
    }

    fn align_boundary(&self, timestamp: Timestamp) -> Timestamp {
        (timestamp / self.interval_nanos + 1) * self.interval_nanos
    }

    pub fn update(&mut self, tick: Tick) -> Result<(), ExecutionError> {
        if self.next_boundary.is_none() {
            self.next_boundary = Some(self.align_boundary(tick.timestamp));
        }
        self.check_boundary()?;
        let price = tick.price(self.spec.price_type);
        let volume = tick.volume(self.spec.volume_rule);
        self.builder.update(price, volume, tick.timestamp);
        Ok(())
    }

    /// Called by the reactor's timer to emit a bar for any window boundary
    /// that has elapsed, even without a new tick (§4.6 TimeBarAggregator).
    pub fn check_boundary(&mut self) -> Result<Option<Bar>, ExecutionError> {
        let Some(boundary) = self.next_boundary else { return Ok(None) };
        if self.clock.schedule_due(boundary) {
            let bar = self.builder.build(boundary)?;
            self.next_boundary = Some(boundary + self.interval_nanos);
            self.handler.handle_bar(bar);
            return Ok(Some(bar));
        }
        Ok(None)
    }
}
