//! Cross-Venue Quote Cache - External Venue Prices with Staleness
//!
//! Holds the latest Kalshi (or other venue) quotes for markets the
//! cross-platform strategy watches. A collaborator feeds it; the
//! strategy only reads, and quotes past the staleness bound are
//! treated as absent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// One external venue quote, prices as floats (display/strategy math).
#[derive(Debug, Clone)]
pub struct VenueQuote {
    /// Venue-local market identifier.
    pub market_id: String,
    /// Best bid for the YES side.
    pub yes_bid: f64,
    /// Best ask for the YES side.
    pub yes_ask: f64,
}

struct QuoteEntry {
    quote: VenueQuote,
    stored_at: Instant,
}

/// TTL'd map of venue market id -> latest quote.
pub struct VenueQuoteCache {
    quotes: RwLock<HashMap<String, QuoteEntry>>,
    max_age: Duration,
}

impl VenueQuoteCache {
    /// Create a cache treating quotes older than `max_age` as absent.
    pub fn new(max_age: Duration) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    /// Store or refresh a quote.
    pub fn set(&self, quote: VenueQuote) {
        self.quotes.write().insert(
            quote.market_id.clone(),
            QuoteEntry {
                quote,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fetch a quote if present and fresh.
    pub fn get(&self, market_id: &str) -> Option<VenueQuote> {
        let quotes = self.quotes.read();
        let entry = quotes.get(market_id)?;
        if entry.stored_at.elapsed() > self.max_age {
            return None;
        }
        Some(entry.quote.clone())
    }

    /// Drop entries past the staleness bound.
    pub fn evict_stale(&self) {
        let mut quotes = self.quotes.write();
        quotes.retain(|_, e| e.stored_at.elapsed() <= self.max_age);
    }
}
