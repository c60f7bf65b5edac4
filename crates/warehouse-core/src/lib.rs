//! Warehouse driver core — domain logic and business rules
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern:
//! - **domain** — pure entities and state machines, no I/O
//! - **ports** — trait contracts that adapter crates (`warehouse-session`,
//!   `warehouse-chunks`, `warehouse-transfer`, `warehouse-auth`) implement
//! - **config** — the immutable connection option bag

pub mod config;
pub mod domain;
pub mod ports;
