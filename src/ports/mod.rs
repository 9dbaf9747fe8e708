//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `SignalBus`: Ephemeral pub/sub plus durable bounded streams
//! - `BookCache`: Shared orderbook snapshots and TTL'd last prices
//! - `RateLimiter` / `LockManager`: Distributed throttles and leases
//! - `OrderPlacer` / `ReplaceOrderer` / `RiskChecker`: Execution collaborators
//! - `ArbService` / `ArbExecutionStore`: Arbitrage gates and persistence

pub mod arb;
pub mod bus;
pub mod cache;
pub mod execution;
pub mod market_feed;
pub mod throttle;
