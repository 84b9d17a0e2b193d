#![doc = include_str!("../README.md")]

pub mod command;
pub mod config;
pub mod controller;
pub mod datasource;
pub mod engine;
mod error;
pub mod generator;
pub mod metric;
pub mod progress;
pub mod report;
pub mod worker;

#[cfg(test)]
mod tests;

pub use command::Command;
pub use config::{Config, DistributionKind, FullcheckMode, KeyType, TxnMode};
pub use controller::{Controller, RunOutcome};
pub use engine::{KvEngine, Status};
pub use error::{DivergenceKind, Error};
