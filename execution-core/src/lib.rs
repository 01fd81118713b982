//! Execution core: the order/position lifecycle, the execution database,
//! the execution engine, and the bar aggregators (§1 "In scope").
//!
//! Venue adapters, CLI/config loaders, log transports, wire serialization
//! and strategy indicator code are deliberately outside this crate (§1
//! "Out of scope"); this crate only defines the capability traits
//! ([`engine::ExecutionClient`], [`engine::Strategy`], [`engine::Portfolio`],
//! [`subscription::DataSubscription`]) those collaborators implement.

pub mod account;
pub mod bar;
pub mod clock;
pub mod config;
pub mod database;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ids;
pub mod order;
pub mod position;
pub mod subscription;

pub use errors::{ExecutionError, ExecutionResult};
