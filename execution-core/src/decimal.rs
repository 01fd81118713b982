//! Fixed-precision value types (§3 "Price/Quantity/Money", §9 "Decimal
//! arithmetic").
//!
//! Nothing here is a binary float. [`FixedDecimal`] wraps
//! `rust_decimal::Decimal` with an explicit, carried precision (digits after
//! the point); arithmetic between two values keeps the greater of the two
//! precisions, and rendering always pads/truncates to the carried precision
//! rather than to whatever `rust_decimal` would print on its own. [`Price`]
//! and [`Quantity`] are domain newtypes over it; [`Money`] additionally
//! tags a [`Currency`], and arithmetic between different currencies fails
//! rather than silently converting.

use crate::errors::ExecutionError;
use rust_decimal::Decimal as RustDecimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A decimal value carrying its own display precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDecimal {
    value: RustDecimal,
    precision: u8,
}

impl FixedDecimal {
    pub fn new(value: RustDecimal, precision: u8) -> Self {
        FixedDecimal { value, precision }
    }

    pub fn zero(precision: u8) -> Self {
        FixedDecimal { value: RustDecimal::ZERO, precision }
    }

    pub fn raw(&self) -> RustDecimal {
        self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_sign_positive(&self) -> bool {
        self.value.is_sign_positive() && !self.value.is_zero()
    }

    pub fn is_sign_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    fn merged_precision(a: u8, b: u8) -> u8 {
        a.max(b)
    }

    pub fn add(&self, other: &FixedDecimal) -> FixedDecimal {
        FixedDecimal::new(self.value + other.value, Self::merged_precision(self.precision, other.precision))
    }

    pub fn sub(&self, other: &FixedDecimal) -> FixedDecimal {
        FixedDecimal::new(self.value - other.value, Self::merged_precision(self.precision, other.precision))
    }

    pub fn mul(&self, other: &FixedDecimal) -> FixedDecimal {
        FixedDecimal::new(self.value * other.value, Self::merged_precision(self.precision, other.precision))
    }

    pub fn div(&self, other: &FixedDecimal) -> FixedDecimal {
        FixedDecimal::new(self.value / other.value, Self::merged_precision(self.precision, other.precision))
    }

    pub fn neg(&self) -> FixedDecimal {
        FixedDecimal::new(-self.value, self.precision)
    }

    pub fn abs(&self) -> FixedDecimal {
        FixedDecimal::new(self.value.abs(), self.precision)
    }
}

impl PartialOrd for FixedDecimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.value.cmp(&other.value))
    }
}

impl Ord for FixedDecimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.round_dp(self.precision as u32))
    }
}

fn infer_precision(s: &str) -> u8 {
    match s.split_once('.') {
        Some((_, frac)) => frac.len().min(u8::MAX as usize) as u8,
        None => 0,
    }
}

/// A validated price. Required iff the order type needs one (§3); never
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(FixedDecimal);

impl Price {
    pub fn new(value: RustDecimal, precision: u8) -> Result<Self, ExecutionError> {
        if value.is_sign_negative() {
            return Err(ExecutionError::invalid_argument("Price must not be negative"));
        }
        Ok(Price(FixedDecimal::new(value, precision)))
    }

    pub fn raw(&self) -> RustDecimal {
        self.0.raw()
    }

    pub fn precision(&self) -> u8 {
        self.0.precision()
    }

    pub fn as_decimal(&self) -> FixedDecimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let precision = infer_precision(s);
        let value = RustDecimal::from_str(s)
            .map_err(|e| ExecutionError::invalid_argument(format!("invalid price '{s}': {e}")))?;
        Price::new(value, precision)
    }
}

/// A strictly positive quantity (§3: "quantity is a strictly positive
/// integer" for orders; also used for fill sizes and bar volumes, which
/// share the same positivity constraint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quantity(FixedDecimal);

impl Quantity {
    pub fn new(value: RustDecimal, precision: u8) -> Result<Self, ExecutionError> {
        if value.is_sign_negative() || value.is_zero() {
            return Err(ExecutionError::invalid_argument("Quantity must be strictly positive"));
        }
        Ok(Quantity(FixedDecimal::new(value, precision)))
    }

    pub fn raw(&self) -> RustDecimal {
        self.0.raw()
    }

    pub fn precision(&self) -> u8 {
        self.0.precision()
    }

    pub fn as_decimal(&self) -> FixedDecimal {
        self.0
    }

    pub fn add(&self, other: &Quantity) -> Quantity {
        Quantity(self.0.add(&other.0))
    }

    pub fn sub(&self, other: &Quantity) -> FixedDecimal {
        self.0.sub(&other.0)
    }

    pub fn min(&self, other: &Quantity) -> Quantity {
        if self.0 < other.0 { *self } else { *other }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quantity {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let precision = infer_precision(s);
        let value = RustDecimal::from_str(s)
            .map_err(|e| ExecutionError::invalid_argument(format!("invalid quantity '{s}': {e}")))?;
        Quantity::new(value, precision)
    }
}

/// ISO-4217-ish currency tag, e.g. `USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, ExecutionError> {
        let code = code.into();
        if code.is_empty() {
            return Err(ExecutionError::invalid_argument("Currency code must not be empty"));
        }
        Ok(Currency(code.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A currency-tagged decimal amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    amount: FixedDecimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: RustDecimal, precision: u8, currency: Currency) -> Self {
        Money { amount: FixedDecimal::new(amount, precision), currency }
    }

    pub fn zero(precision: u8, currency: Currency) -> Self {
        Money { amount: FixedDecimal::zero(precision), currency }
    }

    pub fn amount(&self) -> FixedDecimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    fn check_currency(&self, other: &Money) -> Result<(), ExecutionError> {
        if self.currency != other.currency {
            return Err(ExecutionError::IncompatibleCurrency {
                lhs: self.currency.to_string(),
                rhs: other.currency.to_string(),
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> Result<Money, ExecutionError> {
        self.check_currency(other)?;
        Ok(Money { amount: self.amount.add(&other.amount), currency: self.currency.clone() })
    }

    pub fn sub(&self, other: &Money) -> Result<Money, ExecutionError> {
        self.check_currency(other)?;
        Ok(Money { amount: self.amount.sub(&other.amount), currency: self.currency.clone() })
    }

    pub fn neg(&self) -> Money {
        Money { amount: self.amount.neg(), currency: self.currency.clone() }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
