//! Account entity (§3 "Account"): derived from a sequence of
//! `AccountStateEvent`s; holds the latest balance/margin/pnl snapshot per
//! currency.

use crate::clock::Timestamp;
use crate::decimal::{Currency, Money};
use crate::events::AccountStateEvent;
use crate::ids::AccountId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    balances: HashMap<Currency, Money>,
    pub last_updated: Timestamp,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Account { id, balances: HashMap::new(), last_updated: 0 }
    }

    /// Upserts the balances carried by an `AccountStateEvent`. Later events
    /// overwrite the per-currency balance they name; currencies absent from
    /// the event retain their previous snapshot.
    pub fn apply(&mut self, event: &AccountStateEvent) {
        for balance in &event.balances {
            self.balances.insert(balance.currency().clone(), balance.clone());
        }
        self.last_updated = event.timestamp;
    }

    pub fn balance(&self, currency: &Currency) -> Option<&Money> {
        self.balances.get(currency)
    }

    pub fn balances(&self) -> impl Iterator<Item = &Money> {
        self.balances.values()
    }
}
