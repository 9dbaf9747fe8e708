//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the ArbExecutionStore port using append-only JSONL
//! files. No database dependency — lightweight and crash-recoverable.

pub mod arb_store;

pub use arb_store::JsonlArbExecutionStore;
