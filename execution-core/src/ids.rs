//! Identifiers (§3 "Identifiers").
//!
//! Every id here is opaque and string-serializable: two ids of different
//! kinds are never equal even when their string forms coincide, because
//! each is its own newtype. Parsing is bit-exact with formatting
//! (`parse(format(id)) == id`, §8).

use crate::errors::ExecutionError;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn require_nonempty(kind: &'static str, s: &str) -> Result<(), ExecutionError> {
    if s.is_empty() {
        return Err(ExecutionError::invalid_argument(format!("{kind} must not be empty")));
    }
    Ok(())
}

/// A free-form tag attached to a trader or strategy name (the `TAG` half of
/// `NAME-TAG`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdTag(String);

impl IdTag {
    pub fn new(tag: impl Into<String>) -> Result<Self, ExecutionError> {
        let tag = tag.into();
        require_nonempty("IdTag", &tag)?;
        if tag.contains('-') {
            return Err(ExecutionError::invalid_argument("IdTag must not contain '-'"));
        }
        Ok(IdTag(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! name_tag_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            name: String,
            tag: IdTag,
        }

        impl $name {
            pub fn new(name: impl Into<String>, tag: IdTag) -> Result<Self, ExecutionError> {
                let name = name.into();
                require_nonempty(stringify!($name), &name)?;
                if name.contains('-') {
                    return Err(ExecutionError::invalid_argument(format!(
                        "{} name must not contain '-'",
                        stringify!($name)
                    )));
                }
                Ok($name { name, tag })
            }

            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn tag(&self) -> &IdTag {
                &self.tag
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", self.name, self.tag)
            }
        }

        impl FromStr for $name {
            type Err = ExecutionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (name, tag) = s.rsplit_once('-').ok_or_else(|| {
                    ExecutionError::invalid_argument(format!(
                        "{} must be of the form NAME-TAG: {s}",
                        stringify!($name)
                    ))
                })?;
                $name::new(name, IdTag::new(tag)?)
            }
        }
    };
}

name_tag_id!(TraderId);
name_tag_id!(StrategyId);

/// Trading venue, e.g. `FXCM`, `BINANCE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Venue(String);

impl Venue {
    pub fn new(code: impl Into<String>) -> Result<Self, ExecutionError> {
        let code = code.into();
        require_nonempty("Venue", &code)?;
        if code.contains('.') {
            return Err(ExecutionError::invalid_argument("Venue must not contain '.'"));
        }
        Ok(Venue(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker/account-provider name, e.g. `IB`, `SIM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Brokerage(String);

impl Brokerage {
    pub fn new(name: impl Into<String>) -> Result<Self, ExecutionError> {
        let name = name.into();
        require_nonempty("Brokerage", &name)?;
        if name.contains('-') {
            return Err(ExecutionError::invalid_argument("Brokerage must not contain '-'"));
        }
        Ok(Brokerage(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Brokerage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `CODE.VENUE`, e.g. `AUD/USD.FXCM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    code: String,
    venue: Venue,
}

impl Symbol {
    pub fn new(code: impl Into<String>, venue: Venue) -> Result<Self, ExecutionError> {
        let code = code.into();
        require_nonempty("Symbol code", &code)?;
        Ok(Symbol { code, venue })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn venue(&self) -> &Venue {
        &self.venue
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.venue)
    }
}

impl FromStr for Symbol {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, venue) = s.rsplit_once('.').ok_or_else(|| {
            ExecutionError::invalid_argument(format!("Symbol must be of the form CODE.VENUE: {s}"))
        })?;
        Symbol::new(code, Venue::new(venue)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountType {
    Simulated,
    Demo,
    Real,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountType::Simulated => "SIMULATED",
            AccountType::Demo => "DEMO",
            AccountType::Real => "REAL",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AccountType {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIMULATED" => Ok(AccountType::Simulated),
            "DEMO" => Ok(AccountType::Demo),
            "REAL" => Ok(AccountType::Real),
            other => Err(ExecutionError::invalid_argument(format!("unknown account type: {other}"))),
        }
    }
}

/// `BROKER-NUMBER-TYPE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId {
    broker: Brokerage,
    number: String,
    account_type: AccountType,
}

impl AccountId {
    pub fn new(broker: Brokerage, number: impl Into<String>, account_type: AccountType) -> Result<Self, ExecutionError> {
        let number = number.into();
        require_nonempty("AccountId number", &number)?;
        if number.contains('-') {
            return Err(ExecutionError::invalid_argument("AccountId number must not contain '-'"));
        }
        Ok(AccountId { broker, number, account_type })
    }

    pub fn broker(&self) -> &Brokerage {
        &self.broker
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.broker, self.number, self.account_type)
    }
}

impl FromStr for AccountId {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 {
            return Err(ExecutionError::invalid_argument(format!(
                "AccountId must be of the form BROKER-NUMBER-TYPE: {s}"
            )));
        }
        AccountId::new(Brokerage::new(parts[0])?, parts[1], parts[2].parse()?)
    }
}

/// Monotonically-ordered counter used by the opaque id generators below,
/// combined with a random suffix mirroring the teacher's
/// `OrderId::new_random()` (`execution/types.rs`: `rand::thread_rng().gen::<u128>()`)
/// so two processes racing to generate an id at the same nanosecond still
/// can't collide.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_opaque(prefix: char) -> String {
    use rand::Rng;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let entropy: u32 = rand::thread_rng().gen();
    format!("{prefix}{nanos:x}{seq:x}{entropy:x}")
}

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, ExecutionError> {
                let id = id.into();
                require_nonempty(stringify!($name), &id)?;
                if !id.starts_with($prefix) {
                    return Err(ExecutionError::invalid_argument(format!(
                        "{} must start with '{}': {}",
                        stringify!($name),
                        $prefix,
                        id
                    )));
                }
                Ok($name(id))
            }

            pub fn generate() -> Self {
                $name(next_opaque($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ExecutionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::new(s)
            }
        }
    };
}

opaque_id!(OrderId, 'O');
opaque_id!(ExecutionId, 'E');
opaque_id!(PositionId, 'P');

impl OrderId {
    /// Broker-side variant: leading `O` substituted with `B` (§3, §6).
    pub fn to_broker_id(&self) -> String {
        format!("B{}", &self.0[1..])
    }

    /// Execution id variant: leading `O` substituted with `E`.
    pub fn to_execution_id(&self) -> ExecutionId {
        ExecutionId(format!("E{}", &self.0[1..]))
    }
}

impl PositionId {
    /// Position broker id variant: leading `P` substituted with `T`.
    pub fn to_broker_id(&self) -> String {
        format!("T{}", &self.0[1..])
    }
}
