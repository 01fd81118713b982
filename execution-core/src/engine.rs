//! Execution engine (§4.5): command dispatch, event routing, strategy
//! registration, flat/non-flat bookkeeping.
//!
//! Grounded on the teacher's `engine/generic.rs` `Strategy`/`Executor`
//! capability-trait split, generalized from compile-time monomorphization
//! to dynamic dispatch (`Box<dyn ExecutionClient>`, a strategy-id-keyed map
//! of `Box<dyn Strategy>`) because this spec needs one engine to address a
//! set of strategies registered at runtime (§9 "narrow capability traits
//! ... pass handles"). The reactor itself is grounded on the teacher's
//! `crossbeam`-backed fill queue (`perf::pools::ObjectPool` /
//! `Executor::get_fills`), generalized from a fill-only queue to a single
//! command/event message queue (§5 "commands and events are serialized
//! into one queue").

use crate::account::Account;
use crate::bar::{BarHandler, TickBarAggregator, TimeBarAggregator};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::database::ExecutionDatabase;
use crate::errors::ExecutionError;
use crate::events::{
    AccountInquiryCommand, AccountStateEvent, CancelOrderCommand, EngineEvent, ExecutionCommand,
    ModifyOrderCommand, OrderEvent, OrderEventKind, PositionEvent, PositionEventKind,
    SubmitBracketOrderCommand, SubmitOrderCommand,
};
use crate::ids::StrategyId;
use crate::position::{MarketPosition, Position, PositionFill};
use crossbeam::channel::{self, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Venue adapter capability (§6 "ExecutionClient capability"). Implementors
/// translate commands into venue protocol and post the venue's asynchronous
/// replies back to the engine via an [`EngineHandle`] rather than holding a
/// direct reference to the engine (§9 "invert to message passing").
pub trait ExecutionClient: Send {
    fn account_inquiry(&mut self, command: &AccountInquiryCommand) -> Result<(), ExecutionError>;
    fn submit_order(&mut self, command: &SubmitOrderCommand) -> Result<(), ExecutionError>;
    fn submit_bracket_order(&mut self, command: &SubmitBracketOrderCommand) -> Result<(), ExecutionError>;
    fn modify_order(&mut self, command: &ModifyOrderCommand) -> Result<(), ExecutionError>;
    fn cancel_order(&mut self, command: &CancelOrderCommand) -> Result<(), ExecutionError>;
    fn connect(&mut self) -> Result<(), ExecutionError>;
    fn disconnect(&mut self) -> Result<(), ExecutionError>;
}

/// Events the engine delivers to the strategy that originated the
/// underlying order or position (§6 "Strategy capability").
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    Order(OrderEvent),
    Position(PositionEvent),
}

/// Strategy capability (§6): a named actor the engine can deliver events to
/// by id, resolved at delivery time through the strategy map rather than a
/// cyclic engine<->strategy reference (§9).
pub trait Strategy: Send {
    fn strategy_id(&self) -> &StrategyId;
    fn handle_event(&mut self, event: StrategyEvent);
}

/// Portfolio capability (§6): notified of every position change and account
/// transaction the engine processes.
pub trait Portfolio: Send {
    fn register_strategy(&mut self, strategy_id: StrategyId);
    fn update(&mut self, event: &PositionEvent);
    fn handle_transaction(&mut self, event: &AccountStateEvent);
}

/// Messages carried on the reactor's single queue (§5).
enum Message {
    Command(ExecutionCommand),
    Event(EngineEvent),
}

/// A cloneable handle that lets strategies and clients post work onto the
/// engine's reactor queue without holding the engine itself.
#[derive(Clone)]
pub struct EngineHandle {
    sender: Sender<Message>,
}

impl EngineHandle {
    pub fn submit(&self, command: ExecutionCommand) -> Result<(), ExecutionError> {
        self.sender
            .send(Message::Command(command))
            .map_err(|_| ExecutionError::invariant("engine reactor queue is closed"))
    }

    pub fn post_event(&self, event: EngineEvent) -> Result<(), ExecutionError> {
        self.sender
            .send(Message::Event(event))
            .map_err(|_| ExecutionError::invariant("engine reactor queue is closed"))
    }
}

/// The execution engine (§4.5): a single-threaded cooperative reactor that
/// owns the sole registered [`ExecutionClient`], a map of registered
/// [`Strategy`] handles by id, and the [`ExecutionDatabase`] of record.
pub struct ExecutionEngine {
    database: Arc<dyn ExecutionDatabase>,
    config: EngineConfig,
    client: Option<Box<dyn ExecutionClient>>,
    strategies: HashMap<StrategyId, Box<dyn Strategy>>,
    portfolio: Option<Box<dyn Portfolio>>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl ExecutionEngine {
    pub fn new(database: Arc<dyn ExecutionDatabase>) -> Self {
        Self::with_config(database, EngineConfig::default())
    }

    pub fn with_config(database: Arc<dyn ExecutionDatabase>, config: EngineConfig) -> Self {
        let (sender, receiver) = channel::unbounded();
        ExecutionEngine { database, config, client: None, strategies: HashMap::new(), portfolio: None, sender, receiver }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Builds a tick-bar aggregator seeded with this engine's configured
    /// default `BarSpec` (§2 ambient config table), for strategies that
    /// don't supply their own.
    pub fn new_tick_bar_aggregator(&self, n: usize, volume_precision: u8, handler: Box<dyn BarHandler>) -> TickBarAggregator {
        TickBarAggregator::new(n, self.config.default_bar_spec, volume_precision, handler)
    }

    /// Builds a time-bar aggregator seeded with this engine's configured
    /// default `BarSpec`, for strategies that don't supply their own.
    pub fn new_time_bar_aggregator(
        &self,
        interval_nanos: i64,
        volume_precision: u8,
        clock: Arc<dyn Clock>,
        handler: Box<dyn BarHandler>,
    ) -> TimeBarAggregator {
        TimeBarAggregator::new(interval_nanos, self.config.default_bar_spec, volume_precision, clock, handler)
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle { sender: self.sender.clone() }
    }

    pub fn register_client(&mut self, client: Box<dyn ExecutionClient>) {
        self.client = Some(client);
    }

    pub fn register_portfolio(&mut self, portfolio: Box<dyn Portfolio>) {
        self.portfolio = Some(portfolio);
    }

    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>) {
        let strategy_id = strategy.strategy_id().clone();
        self.database.update_strategy(strategy_id.clone());
        if let Some(portfolio) = &mut self.portfolio {
            portfolio.register_strategy(strategy_id.clone());
        }
        self.strategies.insert(strategy_id, strategy);
    }

    pub fn deregister_strategy(&mut self, strategy_id: &StrategyId) {
        self.strategies.remove(strategy_id);
        self.database.delete_strategy(strategy_id);
    }

    pub fn registered_strategies(&self) -> Vec<StrategyId> {
        self.strategies.keys().cloned().collect()
    }

    fn dispatch(&mut self, message: Message) {
        match message {
            Message::Command(command) => {
                if let Err(error) = self.execute_command(command) {
                    error!(%error, "command dispatch failed");
                }
            }
            Message::Event(event) => self.handle_event(event),
        }
    }

    /// Drains and dispatches one queued message, if any (§5 "suspension
    /// points: none inside the engine's critical section"). Returns `false`
    /// when the queue is empty.
    pub fn run_once(&mut self) -> bool {
        match self.receiver.try_recv() {
            Ok(message) => {
                self.dispatch(message);
                true
            }
            Err(_) => false,
        }
    }

    /// Runs the reactor until every [`EngineHandle`] (including this
    /// engine's own) has been dropped and the queue is drained.
    pub fn run(&mut self) {
        while let Ok(message) = self.receiver.recv() {
            self.dispatch(message);
        }
    }

    /// Command dispatch (§4.5 "Command dispatch").
    pub fn execute_command(&mut self, command: ExecutionCommand) -> Result<(), ExecutionError> {
        let client = self.client.as_mut().ok_or(ExecutionError::NotConnected)?;
        match command {
            ExecutionCommand::SubmitOrder(cmd) => {
                self.database.add_order(cmd.order.clone(), cmd.strategy_id.clone(), cmd.position_id.clone())?;
                client.submit_order(&cmd)
            }
            ExecutionCommand::SubmitBracketOrder(cmd) => {
                self.database.add_order(cmd.entry.clone(), cmd.strategy_id.clone(), None)?;
                self.database.add_order(cmd.stop_loss.clone(), cmd.strategy_id.clone(), None)?;
                self.database.add_order(cmd.take_profit.clone(), cmd.strategy_id.clone(), None)?;
                client.submit_bracket_order(&cmd)
            }
            ExecutionCommand::ModifyOrder(cmd) => client.modify_order(&cmd),
            ExecutionCommand::CancelOrder(cmd) => client.cancel_order(&cmd),
            ExecutionCommand::AccountInquiry(cmd) => client.account_inquiry(&cmd),
        }
    }

    /// Event routing (§4.5 "Event routing"). Never propagates an error out
    /// (§7): unknown-order and unknown-position conditions are logged and
    /// dropped as recoverable, everything else is logged as an error.
    pub fn handle_event(&mut self, event: EngineEvent) {
        let result = match event {
            EngineEvent::Order(order_event) => self.handle_order_event(order_event),
            EngineEvent::Account(account_event) => self.handle_account_event(account_event),
            EngineEvent::Position(position_event) => self.handle_position_event(position_event),
        };
        if let Err(error) = result {
            error!(%error, "event handling failed");
        }
    }

    fn handle_order_event(&mut self, order_event: OrderEvent) -> Result<(), ExecutionError> {
        let Some(mut order) = self.database.get_order(&order_event.order_id) else {
            warn!(order_id = %order_event.order_id, "event for unknown order; dropped");
            return Ok(());
        };
        let Some(strategy_id) = self.database.get_strategy_for_order(&order_event.order_id) else {
            warn!(order_id = %order_event.order_id, "order has no owning strategy; dropped");
            return Ok(());
        };

        order.apply(&order_event)?;
        if matches!(order_event.kind, OrderEventKind::CancelReject { .. }) && !self.config.clear_in_flight_cancel_on_reject {
            // `apply` unconditionally clears the bit per §4.2; restore it
            // when the deployment's config says a reject should not
            // re-open the window for an immediate retry.
            order.set_in_flight_cancel(true);
        }
        self.database.update_order(order.clone())?;

        self.dispatch_to_strategy(&strategy_id, StrategyEvent::Order(order_event.clone()));

        let fill = match &order_event.kind {
            OrderEventKind::PartiallyFilled(fill) | OrderEventKind::Filled(fill) => Some(fill),
            _ => None,
        };
        let Some(fill) = fill else { return Ok(()) };

        let position_fill = PositionFill {
            order_id: order.id.clone(),
            execution_id: fill.execution_id.clone(),
            side: order.side,
            price: fill.fill_price,
            quantity: fill.fill_quantity,
            timestamp: order_event.timestamp,
            currency: fill.currency.clone(),
            id_broker: fill.position_id_broker.clone(),
        };

        self.apply_fill_to_position(&strategy_id, &order.id, &position_fill, order_event.timestamp)
    }

    fn apply_fill_to_position(
        &mut self,
        strategy_id: &StrategyId,
        order_id: &crate::ids::OrderId,
        fill: &PositionFill,
        timestamp: crate::clock::Timestamp,
    ) -> Result<(), ExecutionError> {
        let position_id = self
            .database
            .position_indexed_for_order(order_id)
            .unwrap_or_else(crate::ids::PositionId::generate);

        let (position, event_kind) = match self.database.get_position(&position_id) {
            None => {
                let position = Position::open(position_id.clone(), fill)?;
                self.database.add_position(position.clone(), strategy_id.clone())?;
                (position, PositionEventKind::Opened)
            }
            Some(mut position) => {
                position.apply_fill(fill)?;
                self.database.update_position(position.clone())?;
                let kind = if position.market_position() == MarketPosition::Flat {
                    PositionEventKind::Closed
                } else {
                    PositionEventKind::Modified
                };
                (position, kind)
            }
        };

        let position_event =
            PositionEvent { position_id: position.id.clone(), strategy_id: strategy_id.clone(), timestamp, kind: event_kind };

        self.notify_portfolio_of_position(&position_event);
        self.dispatch_to_strategy(strategy_id, StrategyEvent::Position(position_event));
        Ok(())
    }

    fn handle_account_event(&mut self, account_event: AccountStateEvent) -> Result<(), ExecutionError> {
        match self.database.get_account(&account_event.account_id) {
            Some(mut account) => {
                account.apply(&account_event);
                self.database.update_account(account)?;
            }
            None => {
                let mut account = Account::new(account_event.account_id.clone());
                account.apply(&account_event);
                self.database.add_account(account)?;
            }
        }
        if let Some(portfolio) = &mut self.portfolio {
            portfolio.handle_transaction(&account_event);
        }
        Ok(())
    }

    /// A `PositionEvent` arriving directly on the queue (as opposed to one
    /// synthesized from a fill, §4.5 step 1) is routed to its owning
    /// strategy only, per §4.5 step 3.
    fn handle_position_event(&mut self, position_event: PositionEvent) -> Result<(), ExecutionError> {
        self.dispatch_to_strategy(&position_event.strategy_id.clone(), StrategyEvent::Position(position_event));
        Ok(())
    }

    fn notify_portfolio_of_position(&mut self, event: &PositionEvent) {
        if let Some(portfolio) = &mut self.portfolio {
            portfolio.update(event);
        }
    }

    fn dispatch_to_strategy(&mut self, strategy_id: &StrategyId, event: StrategyEvent) {
        if let Some(strategy) = self.strategies.get_mut(strategy_id) {
            strategy.handle_event(event);
        } else {
            debug!(strategy_id = %strategy_id, "no registered handle for strategy; event not delivered locally");
        }
    }

    pub fn is_strategy_flat(&self, strategy_id: &StrategyId) -> bool {
        self.database.get_positions_open(Some(strategy_id)).is_empty()
    }

    pub fn is_flat(&self) -> bool {
        self.database.get_positions_open(None).is_empty()
    }

    pub fn reset(&mut self) {
        self.database.reset();
        self.strategies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryExecutionDatabase;
    use crate::decimal::{Currency, Price, Quantity};
    use crate::events::FillDetails;
    use crate::ids::{IdTag, OrderId, Symbol, Venue};
    use crate::order::{Order, OrderSide, OrderType};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingClient {
        submitted: Vec<SubmitOrderCommand>,
    }

    impl ExecutionClient for RecordingClient {
        fn account_inquiry(&mut self, _command: &AccountInquiryCommand) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn submit_order(&mut self, command: &SubmitOrderCommand) -> Result<(), ExecutionError> {
            self.submitted.push(command.clone());
            Ok(())
        }
        fn submit_bracket_order(&mut self, _command: &SubmitBracketOrderCommand) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn modify_order(&mut self, _command: &ModifyOrderCommand) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn cancel_order(&mut self, _command: &CancelOrderCommand) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn connect(&mut self) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn disconnect(&mut self) -> Result<(), ExecutionError> {
            Ok(())
        }
    }

    struct RecordingStrategy {
        id: StrategyId,
        events: Arc<Mutex<Vec<StrategyEvent>>>,
    }

    impl Strategy for RecordingStrategy {
        fn strategy_id(&self) -> &StrategyId {
            &self.id
        }
        fn handle_event(&mut self, event: StrategyEvent) {
            self.events.lock().push(event);
        }
    }

    #[derive(Default)]
    struct RecordingPortfolio {
        updates: Vec<PositionEvent>,
    }

    impl Portfolio for RecordingPortfolio {
        fn register_strategy(&mut self, _strategy_id: StrategyId) {}
        fn update(&mut self, event: &PositionEvent) {
            self.updates.push(event.clone());
        }
        fn handle_transaction(&mut self, _event: &AccountStateEvent) {}
    }

    fn sym() -> Symbol {
        Symbol::new("AUD/USD", Venue::new("FXCM").unwrap()).unwrap()
    }

    fn strategy_id(tag: &str) -> StrategyId {
        StrategyId::new("EMACross", IdTag::new(tag).unwrap()).unwrap()
    }

    fn market_order(id: &str, side: OrderSide) -> Order {
        Order::new(
            sym(),
            OrderId::new(id).unwrap(),
            None,
            side,
            OrderType::Market,
            Quantity::new("100000".parse().unwrap(), 0).unwrap(),
            0,
            None,
            None,
            None,
        )
        .unwrap()
    }

    fn engine_with_client() -> (ExecutionEngine, Arc<InMemoryExecutionDatabase>) {
        let database = Arc::new(InMemoryExecutionDatabase::new());
        let mut engine = ExecutionEngine::new(database.clone());
        engine.register_client(Box::new(RecordingClient::default()));
        (engine, database)
    }

    #[test]
    fn submit_order_indexes_into_database_then_forwards_to_client() {
        let (mut engine, database) = engine_with_client();
        let sid = strategy_id("001");
        let order = market_order("O-1", OrderSide::Buy);
        let order_id = order.id.clone();
        engine
            .execute_command(ExecutionCommand::SubmitOrder(SubmitOrderCommand {
                order,
                strategy_id: sid.clone(),
                position_id: None,
            }))
            .unwrap();
        assert!(database.order_exists(&order_id));
        assert_eq!(database.get_strategy_for_order(&order_id), Some(sid));
    }

    #[test]
    fn fill_event_opens_a_position_and_notifies_portfolio_and_strategy() {
        let (mut engine, database) = engine_with_client();
        let sid = strategy_id("002");
        let order = market_order("O-2", OrderSide::Buy);
        let order_id = order.id.clone();

        let events = Arc::new(Mutex::new(Vec::new()));
        engine.register_strategy(Box::new(RecordingStrategy { id: sid.clone(), events: events.clone() }));
        engine.register_portfolio(Box::new(RecordingPortfolio::default()));

        engine
            .execute_command(ExecutionCommand::SubmitOrder(SubmitOrderCommand {
                order,
                strategy_id: sid.clone(),
                position_id: None,
            }))
            .unwrap();

        engine.handle_event(EngineEvent::Order(OrderEvent {
            order_id: order_id.clone(),
            timestamp: 1,
            kind: OrderEventKind::Submitted,
        }));
        engine.handle_event(EngineEvent::Order(OrderEvent {
            order_id: order_id.clone(),
            timestamp: 2,
            kind: OrderEventKind::Accepted,
        }));
        engine.handle_event(EngineEvent::Order(OrderEvent {
            order_id: order_id.clone(),
            timestamp: 3,
            kind: OrderEventKind::Filled(FillDetails {
                execution_id: order_id.to_execution_id(),
                fill_price: Price::new("1.00001".parse::<rust_decimal::Decimal>().unwrap(), 5).unwrap(),
                fill_quantity: Quantity::new("100000".parse().unwrap(), 0).unwrap(),
                leaves_quantity: crate::decimal::FixedDecimal::zero(0),
                commission: None,
                currency: Currency::new("USD").unwrap(),
                position_id_broker: None,
            }),
        }));

        assert_eq!(database.count_positions_open(Some(&sid)), 1);
        assert!(engine.is_strategy_flat(&sid) == false);

        let seen = events.lock();
        let saw_position_opened = seen.iter().any(|event| {
            matches!(event, StrategyEvent::Position(position_event) if position_event.kind == PositionEventKind::Opened)
        });
        assert!(saw_position_opened);
    }

    #[test]
    fn unknown_order_event_is_logged_and_dropped() {
        let (mut engine, _database) = engine_with_client();
        engine.handle_event(EngineEvent::Order(OrderEvent {
            order_id: OrderId::new("O-999").unwrap(),
            timestamp: 1,
            kind: OrderEventKind::Submitted,
        }));
        // No panic, no propagated error: the spec's recoverable-by-design
        // policy for events referring to orders the database never saw.
    }

    #[test]
    fn is_flat_reflects_all_strategies() {
        let (mut engine, _database) = engine_with_client();
        assert!(engine.is_flat());
    }

    #[test]
    fn default_config_clears_in_flight_cancel_on_reject() {
        let (mut engine, database) = engine_with_client();
        let sid = strategy_id("005");
        let order = market_order("O-10", OrderSide::Buy);
        let order_id = order.id.clone();
        engine
            .execute_command(ExecutionCommand::SubmitOrder(SubmitOrderCommand {
                order,
                strategy_id: sid,
                position_id: None,
            }))
            .unwrap();
        for kind in [OrderEventKind::Submitted, OrderEventKind::Accepted, OrderEventKind::Working] {
            engine.handle_event(EngineEvent::Order(OrderEvent { order_id: order_id.clone(), timestamp: 0, kind }));
        }
        engine.handle_event(EngineEvent::Order(OrderEvent {
            order_id: order_id.clone(),
            timestamp: 1,
            kind: OrderEventKind::CancelReject { reason: "too late".into() },
        }));
        assert!(!database.get_order(&order_id).unwrap().in_flight_cancel());
    }

    #[test]
    fn config_can_preserve_in_flight_cancel_on_reject() {
        let database = Arc::new(InMemoryExecutionDatabase::new());
        let config = EngineConfig { clear_in_flight_cancel_on_reject: false, ..EngineConfig::default() };
        let mut engine = ExecutionEngine::with_config(database.clone(), config);
        engine.register_client(Box::new(RecordingClient::default()));
        let sid = strategy_id("006");
        let order = market_order("O-11", OrderSide::Buy);
        let order_id = order.id.clone();
        engine
            .execute_command(ExecutionCommand::SubmitOrder(SubmitOrderCommand {
                order,
                strategy_id: sid,
                position_id: None,
            }))
            .unwrap();
        for kind in [OrderEventKind::Submitted, OrderEventKind::Accepted, OrderEventKind::Working] {
            engine.handle_event(EngineEvent::Order(OrderEvent { order_id: order_id.clone(), timestamp: 0, kind }));
        }
        engine.handle_event(EngineEvent::Order(OrderEvent {
            order_id: order_id.clone(),
            timestamp: 1,
            kind: OrderEventKind::CancelReject { reason: "too late".into() },
        }));
        assert!(database.get_order(&order_id).unwrap().in_flight_cancel());
    }

    #[test]
    fn default_bar_spec_seeds_engine_built_aggregators() {
        use crate::bar::{Bar, BarSpec, PriceType, VolumeRule};

        let database = Arc::new(InMemoryExecutionDatabase::new());
        let config = EngineConfig {
            default_bar_spec: BarSpec { price_type: PriceType::Bid, volume_rule: VolumeRule::AskOnly, use_previous_close: true },
            ..EngineConfig::default()
        };
        let engine = ExecutionEngine::with_config(database, config);
        let bars: Vec<Bar> = Vec::new();
        let aggregator = engine.new_tick_bar_aggregator(3, 0, Box::new(bars));
        assert_eq!(aggregator.spec().price_type, PriceType::Bid);
        assert_eq!(aggregator.spec().volume_rule, VolumeRule::AskOnly);
    }
}
