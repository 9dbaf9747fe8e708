//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the bot's core workflows. Each use case is a self-contained
//! business operation.
//!
//! Use cases:
//! - `strategy`: Plug-in contract, registry, engine, implementations
//! - `executor`: Dedup, leg groups, risk-checked order placement
//! - `arb`: Arbitrage detection strategies, gates, consumer loop
//! - `book_service`: Feed events into cache, bus and engine
//! - `risk`: Pre-trade gates and the loss kill switch

pub mod arb;
pub mod book_service;
pub mod executor;
pub mod risk;
pub mod strategy;
