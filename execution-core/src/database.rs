//! Execution database (§4.4): the canonical, indexed store of orders,
//! positions and accounts per strategy.
//!
//! Grounded on the explicit-index-struct style of the teacher's
//! `engine/position_reconciliation.rs` and on §5's requirement that readers
//! outside the engine's reactor thread only ever see owned copies: every
//! query here returns a clone, never a reference into the store. The store
//! itself sits behind a `parking_lot::RwLock` so a reporting thread can call
//! the query API concurrently with the reactor's mutations without the
//! reactor ever blocking on a writer it doesn't hold itself (§5 "Shared
//! resource policy").

use crate::account::Account;
use crate::errors::ExecutionError;
use crate::ids::{AccountId, OrderId, PositionId, StrategyId};
use crate::order::{Order, OrderStatus};
use crate::position::{MarketPosition, Position};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Default)]
struct StrategyIndex {
    order_ids: HashSet<OrderId>,
    working_order_ids: HashSet<OrderId>,
    completed_order_ids: HashSet<OrderId>,
    position_ids: HashSet<PositionId>,
    open_position_ids: HashSet<PositionId>,
    closed_position_ids: HashSet<PositionId>,
}

#[derive(Default)]
struct Store {
    orders: HashMap<OrderId, Order>,
    positions: HashMap<PositionId, Position>,
    accounts: HashMap<AccountId, Account>,
    order_to_strategy: HashMap<OrderId, StrategyId>,
    order_to_position: HashMap<OrderId, PositionId>,
    strategies: HashMap<StrategyId, StrategyIndex>,
}

/// Abstract execution-database contract (§4.4). The reference
/// implementation is in-memory; a durable backend must preserve the same
/// contract, including `reset()` only clearing the in-process cache.
pub trait ExecutionDatabase: Send + Sync {
    fn add_order(&self, order: Order, strategy_id: StrategyId, position_id: Option<PositionId>) -> Result<(), ExecutionError>;
    fn add_position(&self, position: Position, strategy_id: StrategyId) -> Result<(), ExecutionError>;
    fn update_order(&self, order: Order) -> Result<(), ExecutionError>;
    fn update_position(&self, position: Position) -> Result<(), ExecutionError>;
    fn add_account(&self, account: Account) -> Result<(), ExecutionError>;
    fn update_account(&self, account: Account) -> Result<(), ExecutionError>;
    fn get_account(&self, id: &AccountId) -> Option<Account>;
    fn update_strategy(&self, strategy_id: StrategyId);
    fn delete_strategy(&self, strategy_id: &StrategyId);
    fn check_residuals(&self);
    fn reset(&self);
    fn flush(&self);

    fn order_exists(&self, id: &OrderId) -> bool;
    fn get_order(&self, id: &OrderId) -> Option<Order>;
    fn get_strategy_for_order(&self, order_id: &OrderId) -> Option<StrategyId>;
    fn get_order_ids(&self, strategy_id: Option<&StrategyId>) -> Vec<OrderId>;
    fn get_orders(&self, strategy_id: Option<&StrategyId>) -> Vec<Order>;
    fn get_orders_working(&self, strategy_id: Option<&StrategyId>) -> Vec<Order>;
    fn get_orders_completed(&self, strategy_id: Option<&StrategyId>) -> Vec<Order>;

    fn position_exists(&self, id: &PositionId) -> bool;
    fn position_exists_for_order(&self, order_id: &OrderId) -> bool;
    fn position_indexed_for_order(&self, order_id: &OrderId) -> Option<PositionId>;
    fn get_position(&self, id: &PositionId) -> Option<Position>;
    fn get_position_for_order(&self, order_id: &OrderId) -> Option<Position>;
    fn get_position_id(&self, order_id: &OrderId) -> Option<PositionId>;
    fn get_positions(&self, strategy_id: Option<&StrategyId>) -> Vec<Position>;
    fn get_positions_open(&self, strategy_id: Option<&StrategyId>) -> Vec<Position>;
    fn get_positions_closed(&self, strategy_id: Option<&StrategyId>) -> Vec<Position>;
    fn get_position_ids(&self, strategy_id: Option<&StrategyId>) -> Vec<PositionId>;

    fn is_position_open(&self, id: &PositionId) -> bool;
    fn is_position_closed(&self, id: &PositionId) -> bool;

    fn count_orders_total(&self, strategy_id: Option<&StrategyId>) -> usize;
    fn count_orders_working(&self, strategy_id: Option<&StrategyId>) -> usize;
    fn count_orders_completed(&self, strategy_id: Option<&StrategyId>) -> usize;
    fn count_positions_total(&self, strategy_id: Option<&StrategyId>) -> usize;
    fn count_positions_open(&self, strategy_id: Option<&StrategyId>) -> usize;
    fn count_positions_closed(&self, strategy_id: Option<&StrategyId>) -> usize;

    fn get_strategy_ids(&self) -> Vec<StrategyId>;
}

#[derive(Default)]
pub struct InMemoryExecutionDatabase {
    store: RwLock<Store>,
}

impl InMemoryExecutionDatabase {
    pub fn new() -> Self {
        InMemoryExecutionDatabase::default()
    }
}

impl ExecutionDatabase for InMemoryExecutionDatabase {
    fn add_order(&self, order: Order, strategy_id: StrategyId, position_id: Option<PositionId>) -> Result<(), ExecutionError> {
        let mut store = self.store.write();
        if store.orders.contains_key(&order.id) {
            return Err(ExecutionError::duplicate("order", order.id.to_string()));
        }
        if let Some(pid) = &position_id {
            if let Some(existing) = store.order_to_position.get(&order.id) {
                if existing != pid {
                    return Err(ExecutionError::duplicate("order-position index", order.id.to_string()));
                }
            }
        }

        let order_id = order.id.clone();
        let is_working = matches!(order.status(), OrderStatus::Working | OrderStatus::PartiallyFilled);
        let is_completed = order.status().is_terminal();

        store.orders.insert(order_id.clone(), order);
        store.order_to_strategy.insert(order_id.clone(), strategy_id.clone());
        if let Some(pid) = position_id {
            store.order_to_position.insert(order_id.clone(), pid);
        }

        let index = store.strategies.entry(strategy_id).or_default();
        index.order_ids.insert(order_id.clone());
        if is_working {
            index.working_order_ids.insert(order_id.clone());
        }
        if is_completed {
            index.completed_order_ids.insert(order_id);
        }
        Ok(())
    }

    fn add_position(&self, position: Position, strategy_id: StrategyId) -> Result<(), ExecutionError> {
        let mut store = self.store.write();
        if store.positions.contains_key(&position.id) {
            return Err(ExecutionError::duplicate("position", position.id.to_string()));
        }
        let id = position.id.clone();
        let is_open = position.is_open();
        store.positions.insert(id.clone(), position);

        let index = store.strategies.entry(strategy_id).or_default();
        index.position_ids.insert(id.clone());
        if is_open {
            index.open_position_ids.insert(id);
        } else {
            index.closed_position_ids.insert(id);
        }
        Ok(())
    }

    fn update_order(&self, order: Order) -> Result<(), ExecutionError> {
        let mut store = self.store.write();
        if !store.orders.contains_key(&order.id) {
            return Err(ExecutionError::unknown("order", order.id.to_string()));
        }
        let strategy_id = store
            .order_to_strategy
            .get(&order.id)
            .cloned()
            .ok_or_else(|| ExecutionError::invariant(format!("order {} has no strategy index", order.id)))?;

        let is_working = matches!(order.status(), OrderStatus::Working | OrderStatus::PartiallyFilled);
        let is_completed = order.status().is_terminal();
        let order_id = order.id.clone();
        store.orders.insert(order_id.clone(), order);

        if let Some(index) = store.strategies.get_mut(&strategy_id) {
            index.working_order_ids.remove(&order_id);
            index.completed_order_ids.remove(&order_id);
            if is_working {
                index.working_order_ids.insert(order_id.clone());
            }
            if is_completed {
                index.completed_order_ids.insert(order_id);
            }
        }
        Ok(())
    }

    fn update_position(&self, position: Position) -> Result<(), ExecutionError> {
        let mut store = self.store.write();
        if !store.positions.contains_key(&position.id) {
            return Err(ExecutionError::unknown("position", position.id.to_string()));
        }
        let strategy_id = store
            .strategies
            .iter()
            .find(|(_, idx)| idx.position_ids.contains(&position.id))
            .map(|(sid, _)| sid.clone());

        let is_open = position.is_open();
        let id = position.id.clone();
        store.positions.insert(id.clone(), position);

        if let Some(strategy_id) = strategy_id {
            if let Some(index) = store.strategies.get_mut(&strategy_id) {
                index.open_position_ids.remove(&id);
                index.closed_position_ids.remove(&id);
                if is_open {
                    index.open_position_ids.insert(id);
                } else {
                    index.closed_position_ids.insert(id);
                }
            }
        }
        Ok(())
    }

    fn add_account(&self, account: Account) -> Result<(), ExecutionError> {
        self.store.write().accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn update_account(&self, account: Account) -> Result<(), ExecutionError> {
        self.store.write().accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn get_account(&self, id: &AccountId) -> Option<Account> {
        self.store.read().accounts.get(id).cloned()
    }

    fn update_strategy(&self, strategy_id: StrategyId) {
        self.store.write().strategies.entry(strategy_id).or_default();
    }

    fn delete_strategy(&self, strategy_id: &StrategyId) {
        // Orders/positions are retained; only the strategy_id registration
        // is removed (§4.4).
        self.store.write().strategies.remove(strategy_id);
    }

    fn check_residuals(&self) {
        let store = self.store.read();
        for (strategy_id, index) in &store.strategies {
            if !index.working_order_ids.is_empty() {
                warn!(strategy = %strategy_id, count = index.working_order_ids.len(), "residual working orders at check");
            }
            if !index.open_position_ids.is_empty() {
                warn!(strategy = %strategy_id, count = index.open_position_ids.len(), "residual open positions at check");
            }
        }
    }

    fn reset(&self) {
        debug!("resetting in-memory execution database cache");
        *self.store.write() = Store::default();
    }

    fn flush(&self) {
        // In-memory backend has no durable tier to purge.
    }

    fn order_exists(&self, id: &OrderId) -> bool {
        self.store.read().orders.contains_key(id)
    }

    fn get_order(&self, id: &OrderId) -> Option<Order> {
        self.store.read().orders.get(id).cloned()
    }

    fn get_strategy_for_order(&self, order_id: &OrderId) -> Option<StrategyId> {
        self.store.read().order_to_strategy.get(order_id).cloned()
    }

    fn get_order_ids(&self, strategy_id: Option<&StrategyId>) -> Vec<OrderId> {
        let store = self.store.read();
        match strategy_id {
            Some(sid) => store.strategies.get(sid).map(|idx| idx.order_ids.iter().cloned().collect()).unwrap_or_default(),
            None => store.orders.keys().cloned().collect(),
        }
    }

    fn get_orders(&self, strategy_id: Option<&StrategyId>) -> Vec<Order> {
        self.get_order_ids(strategy_id).iter().filter_map(|id| self.get_order(id)).collect()
    }

    fn get_orders_working(&self, strategy_id: Option<&StrategyId>) -> Vec<Order> {
        let store = self.store.read();
        let ids: Vec<OrderId> = match strategy_id {
            Some(sid) => store.strategies.get(sid).map(|idx| idx.working_order_ids.iter().cloned().collect()).unwrap_or_default(),
            None => store.orders.values().filter(|o| matches!(o.status(), OrderStatus::Working | OrderStatus::PartiallyFilled)).map(|o| o.id.clone()).collect(),
        };
        ids.iter().filter_map(|id| store.orders.get(id).cloned()).collect()
    }

    fn get_orders_completed(&self, strategy_id: Option<&StrategyId>) -> Vec<Order> {
        let store = self.store.read();
        let ids: Vec<OrderId> = match strategy_id {
            Some(sid) => store.strategies.get(sid).map(|idx| idx.completed_order_ids.iter().cloned().collect()).unwrap_or_default(),
            None => store.orders.values().filter(|o| o.status().is_terminal()).map(|o| o.id.clone()).collect(),
        };
        ids.iter().filter_map(|id| store.orders.get(id).cloned()).collect()
    }

    fn position_exists(&self, id: &PositionId) -> bool {
        self.store.read().positions.contains_key(id)
    }

    fn position_exists_for_order(&self, order_id: &OrderId) -> bool {
        self.store.read().order_to_position.contains_key(order_id)
    }

    fn position_indexed_for_order(&self, order_id: &OrderId) -> Option<PositionId> {
        self.store.read().order_to_position.get(order_id).cloned()
    }

    fn get_position(&self, id: &PositionId) -> Option<Position> {
        self.store.read().positions.get(id).cloned()
    }

    fn get_position_for_order(&self, order_id: &OrderId) -> Option<Position> {
        let store = self.store.read();
        let pid = store.order_to_position.get(order_id)?;
        store.positions.get(pid).cloned()
    }

    fn get_position_id(&self, order_id: &OrderId) -> Option<PositionId> {
        self.store.read().order_to_position.get(order_id).cloned()
    }

    fn get_positions(&self, strategy_id: Option<&StrategyId>) -> Vec<Position> {
        let store = self.store.read();
        let ids: Vec<PositionId> = match strategy_id {
            Some(sid) => store.strategies.get(sid).map(|idx| idx.position_ids.iter().cloned().collect()).unwrap_or_default(),
            None => store.positions.keys().cloned().collect(),
        };
        ids.iter().filter_map(|id| store.positions.get(id).cloned()).collect()
    }

    fn get_positions_open(&self, strategy_id: Option<&StrategyId>) -> Vec<Position> {
        let store = self.store.read();
        let ids: Vec<PositionId> = match strategy_id {
            Some(sid) => store.strategies.get(sid).map(|idx| idx.open_position_ids.iter().cloned().collect()).unwrap_or_default(),
            None => store.positions.values().filter(|p| p.market_position() != MarketPosition::Flat).map(|p| p.id.clone()).collect(),
        };
        ids.iter().filter_map(|id| store.positions.get(id).cloned()).collect()
    }

    fn get_positions_closed(&self, strategy_id: Option<&StrategyId>) -> Vec<Position> {
        let store = self.store.read();
        let ids: Vec<PositionId> = match strategy_id {
            Some(sid) => store.strategies.get(sid).map(|idx| idx.closed_position_ids.iter().cloned().collect()).unwrap_or_default(),
            None => store.positions.values().filter(|p| p.market_position() == MarketPosition::Flat).map(|p| p.id.clone()).collect(),
        };
        ids.iter().filter_map(|id| store.positions.get(id).cloned()).collect()
    }

    fn get_position_ids(&self, strategy_id: Option<&StrategyId>) -> Vec<PositionId> {
        self.get_positions(strategy_id).into_iter().map(|p| p.id).collect()
    }

    fn is_position_open(&self, id: &PositionId) -> bool {
        self.get_position(id).map(|p| p.is_open()).unwrap_or(false)
    }

    fn is_position_closed(&self, id: &PositionId) -> bool {
        self.get_position(id).map(|p| p.is_closed()).unwrap_or(false)
    }

    fn count_orders_total(&self, strategy_id: Option<&StrategyId>) -> usize {
        self.get_order_ids(strategy_id).len()
    }

    fn count_orders_working(&self, strategy_id: Option<&StrategyId>) -> usize {
        self.get_orders_working(strategy_id).len()
    }

    fn count_orders_completed(&self, strategy_id: Option<&StrategyId>) -> usize {
        self.get_orders_completed(strategy_id).len()
    }

    fn count_positions_total(&self, strategy_id: Option<&StrategyId>) -> usize {
        self.get_positions(strategy_id).len()
    }

    fn count_positions_open(&self, strategy_id: Option<&StrategyId>) -> usize {
        self.get_positions_open(strategy_id).len()
    }

    fn count_positions_closed(&self, strategy_id: Option<&StrategyId>) -> usize {
        self.get_positions_closed(strategy_id).len()
    }

    fn get_strategy_ids(&self) -> Vec<StrategyId> {
        self.store.read().strategies.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{IdTag, Venue};
    use crate::order::{Order, OrderSide, OrderType};

    fn strategy_id() -> StrategyId {
        StrategyId::new("Strat", IdTag::new("001").unwrap()).unwrap()
    }

    fn make_order(status_terminal: bool) -> Order {
        let mut order = Order::new(
            crate::ids::Symbol::new("AUD/USD", Venue::new("FXCM").unwrap()).unwrap(),
            OrderId::generate(),
            None,
            OrderSide::Buy,
            OrderType::Market,
            "100000".parse().unwrap(),
            0,
            None,
            None,
            None,
        )
        .unwrap();
        if status_terminal {
            use crate::events::{OrderEvent, OrderEventKind};
            order.apply(&OrderEvent { order_id: order.id.clone(), timestamp: 0, kind: OrderEventKind::Submitted }).unwrap();
            order.apply(&OrderEvent { order_id: order.id.clone(), timestamp: 0, kind: OrderEventKind::Rejected { reason: "x".into() } }).unwrap();
        }
        order
    }

    #[test]
    fn add_order_indexes_into_working_or_completed() {
        let db = InMemoryExecutionDatabase::new();
        let sid = strategy_id();
        let order = make_order(true);
        db.add_order(order.clone(), sid.clone(), None).unwrap();
        assert!(db.order_exists(&order.id));
        assert_eq!(db.count_orders_completed(Some(&sid)), 1);
        assert_eq!(db.count_orders_working(Some(&sid)), 0);
    }

    #[test]
    fn add_order_rejects_duplicate_id() {
        let db = InMemoryExecutionDatabase::new();
        let sid = strategy_id();
        let order = make_order(false);
        db.add_order(order.clone(), sid.clone(), None).unwrap();
        let err = db.add_order(order, sid, None);
        assert!(matches!(err, Err(ExecutionError::DuplicateEntity { .. })));
    }

    #[test]
    fn delete_strategy_retains_orders_and_positions() {
        let db = InMemoryExecutionDatabase::new();
        let sid = strategy_id();
        let order = make_order(false);
        db.add_order(order.clone(), sid.clone(), None).unwrap();
        db.delete_strategy(&sid);
        assert!(db.order_exists(&order.id));
        assert!(db.get_strategy_ids().is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let db = InMemoryExecutionDatabase::new();
        let sid = strategy_id();
        let order = make_order(false);
        db.add_order(order.clone(), sid, None).unwrap();
        db.reset();
        assert!(!db.order_exists(&order.id));
    }

    #[test]
    fn queries_return_owned_copies() {
        let db = InMemoryExecutionDatabase::new();
        let sid = strategy_id();
        let order = make_order(false);
        db.add_order(order.clone(), sid, None).unwrap();
        let mut fetched = db.get_order(&order.id).unwrap();
        fetched.label = Some("mutated".into());
        assert_ne!(db.get_order(&order.id).unwrap().label, fetched.label);
    }

    #[test]
    fn get_strategy_for_order_resolves_index() {
        let db = InMemoryExecutionDatabase::new();
        let sid = strategy_id();
        let order = make_order(false);
        db.add_order(order.clone(), sid.clone(), None).unwrap();
        assert_eq!(db.get_strategy_for_order(&order.id), Some(sid));
    }
}
