//! The quote lookup seam between the trading core and the outside world.
//!
//! The production application fronts this crate with an HTTP quote client
//! that implements [QuoteProvider]. [StaticQuoteProvider] serves the CLI and
//! the tests with a fixed symbol table.

use std::{collections::HashMap, future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A point-in-time price and display name for a traded symbol.
///
/// A quote is fetched once per business operation and passed through the
/// whole workflow as a single value; it is never re-queried mid-transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// The canonical (uppercase) ticker symbol.
    pub symbol: String,
    /// The display name of the security, e.g. "Apple Inc.".
    pub name: String,
    /// The current price per share in dollars.
    pub price: f64,
}

/// Looks up current quotes by ticker symbol.
pub trait QuoteProvider {
    /// Fetch the current quote for `symbol`.
    ///
    /// Returns `Ok(None)` when the provider does not know the symbol.
    /// Errors are treated as transient provider failures by the trading
    /// operations and abort the operation before any write happens.
    fn lookup(&self, symbol: &str) -> impl Future<Output = Result<Option<Quote>, Error>> + Send;
}

/// Tunables for quote lookups.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// How long to wait for the quote provider before aborting the operation
    /// with [Error::QuoteUnavailable](crate::Error::QuoteUnavailable).
    pub quote_timeout: Duration,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            quote_timeout: Duration::from_secs(5),
        }
    }
}

/// The price and display name for one symbol in a quote table file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuoteTableEntry {
    /// The display name of the security.
    pub name: String,
    /// The price per share in dollars.
    pub price: f64,
}

/// A fixed, in-memory quote table.
///
/// Symbols are matched case-insensitively and reported back in their
/// canonical uppercase form.
#[derive(Debug, Clone, Default)]
pub struct StaticQuoteProvider {
    quotes: HashMap<String, Quote>,
}

impl StaticQuoteProvider {
    /// Create a provider from a list of quotes.
    pub fn new(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let quotes = quotes
            .into_iter()
            .map(|quote| {
                let symbol = canonical_symbol(&quote.symbol);

                (symbol.clone(), Quote { symbol, ..quote })
            })
            .collect();

        Self { quotes }
    }

    /// Create a provider from a JSON quote table mapping symbols to prices,
    /// e.g. `{"AAPL": {"name": "Apple Inc.", "price": 150.0}}`.
    ///
    /// # Errors
    /// Returns an [Error::InvalidQuoteTable] if `json` cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let table: HashMap<String, QuoteTableEntry> = serde_json::from_str(json)
            .map_err(|error| Error::InvalidQuoteTable(error.to_string()))?;

        Ok(Self::new(table.into_iter().map(|(symbol, entry)| Quote {
            symbol,
            name: entry.name,
            price: entry.price,
        })))
    }
}

impl QuoteProvider for StaticQuoteProvider {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, Error> {
        Ok(self.quotes.get(&canonical_symbol(symbol)).cloned())
    }
}

fn canonical_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod static_quote_provider_tests {
    use crate::Error;

    use super::{Quote, QuoteProvider, StaticQuoteProvider};

    fn get_test_provider() -> StaticQuoteProvider {
        StaticQuoteProvider::new([Quote {
            symbol: "AAPL".to_owned(),
            name: "Apple Inc.".to_owned(),
            price: 150.0,
        }])
    }

    #[tokio::test]
    async fn lookup_returns_quote_for_known_symbol() {
        let provider = get_test_provider();

        let quote = provider.lookup("AAPL").await.unwrap();

        assert_eq!(
            quote,
            Some(Quote {
                symbol: "AAPL".to_owned(),
                name: "Apple Inc.".to_owned(),
                price: 150.0,
            })
        );
    }

    #[tokio::test]
    async fn lookup_ignores_case_and_surrounding_whitespace() {
        let provider = get_test_provider();

        let quote = provider.lookup(" aapl ").await.unwrap().unwrap();

        assert_eq!(quote.symbol, "AAPL");
    }

    #[tokio::test]
    async fn lookup_returns_none_for_unknown_symbol() {
        let provider = get_test_provider();

        let quote = provider.lookup("ZZZZ").await.unwrap();

        assert_eq!(quote, None);
    }

    #[tokio::test]
    async fn from_json_parses_quote_table() {
        let provider = StaticQuoteProvider::from_json(
            r#"{"aapl": {"name": "Apple Inc.", "price": 150.0},
                "NFLX": {"name": "Netflix, Inc.", "price": 300.5}}"#,
        )
        .unwrap();

        let apple = provider.lookup("AAPL").await.unwrap().unwrap();
        assert_eq!(apple.price, 150.0);

        let netflix = provider.lookup("nflx").await.unwrap().unwrap();
        assert_eq!(netflix.name, "Netflix, Inc.");
    }

    #[test]
    fn from_json_rejects_malformed_table() {
        let result = StaticQuoteProvider::from_json("not json");

        assert!(matches!(result, Err(Error::InvalidQuoteTable(_))));
    }
}
