//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (Redis, WebSockets, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `redis`: Shared bus, book cache, rate limiter and lock manager
//! - `memory`: Process-local backend with the same trait surface
//! - `feeds`: Real-time market data (Polymarket CLOB WebSocket)
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL arbitrage execution records
//! - `paper`: Simulated order placement for dry runs

pub mod feeds;
pub mod memory;
pub mod metrics;
pub mod paper;
pub mod persistence;
pub mod redis;
pub mod throttled;
