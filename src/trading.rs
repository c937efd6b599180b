//! The trading operations: short-lived atomic workflows that compose the
//! quote provider, the account service, the holdings service, and the trade
//! ledger.
//!
//! Each operation validates its inputs once, before any side effect. Every
//! multi-step workflow runs inside a single SQL transaction over the shared
//! connection: an error at any step rolls the whole workflow back, so a
//! partially applied buy or sell cannot be observed. The quote is fetched
//! before the connection lock is taken and is carried through the workflow
//! as one value, never re-queried mid-transaction.

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error, account,
    holding::{self, Holding},
    ledger,
    quote::{Quote, QuoteConfig, QuoteProvider},
    user::UserID,
};

/// The result of a successful buy.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyConfirmation {
    /// The cash balance after the purchase.
    pub balance: f64,
    /// The holding after the purchased shares were added.
    pub holding: Holding,
}

/// The result of a successful sell.
#[derive(Debug, Clone, PartialEq)]
pub struct SellConfirmation {
    /// The cash balance after the sale.
    pub balance: f64,
    /// The remaining holding, `None` when the position was closed out.
    pub remaining: Option<Holding>,
}

/// The current worth of one holding at the latest quoted price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValuation {
    /// The ticker symbol of the position.
    pub symbol: String,
    /// The display name of the security.
    pub name: String,
    /// How many shares are held.
    pub shares: i64,
    /// The price per share used for the valuation.
    pub price: f64,
    /// The worth of the position: `shares × price`.
    pub value: f64,
}

/// A user's portfolio valued at current prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    /// The valuation of each holding, ordered by symbol.
    pub holdings: Vec<HoldingValuation>,
    /// The cash balance.
    pub cash: f64,
    /// The grand total: cash plus the worth of every holding.
    pub total: f64,
}

/// Buy `shares` shares of `symbol` at the current quoted price.
///
/// The debit, the holding update, and the ledger append happen atomically:
/// if any step fails, none of them are applied.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `shares` is not positive or `symbol` is empty,
/// - [Error::UnknownSymbol] if the quote provider does not know `symbol`,
/// - [Error::QuoteUnavailable] if the quote provider fails or does not
///   answer within the configured deadline,
/// - [Error::InsufficientFunds] if the purchase costs more than the user's
///   cash balance,
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub async fn buy<P: QuoteProvider>(
    user_id: UserID,
    symbol: &str,
    shares: i64,
    provider: &P,
    config: &QuoteConfig,
    connection: &Mutex<Connection>,
) -> Result<BuyConfirmation, Error> {
    validate_share_count(shares)?;

    let quote = get_quote(symbol, provider, config).await?;
    let cost = quote.price * shares as f64;

    let connection = acquire(connection)?;
    let sql_transaction = connection.unchecked_transaction()?;

    let balance = account::debit(user_id, cost, &sql_transaction)?;
    let holding = holding::increase(user_id, &quote, shares, &sql_transaction)?;
    ledger::append(
        user_id,
        &quote.symbol,
        shares,
        quote.price,
        OffsetDateTime::now_utc(),
        &sql_transaction,
    )?;

    sql_transaction.commit()?;

    tracing::info!(
        "user {user_id} bought {shares} {} at {} (new balance {balance})",
        quote.symbol,
        quote.price
    );

    Ok(BuyConfirmation { balance, holding })
}

/// Sell `shares` shares of `symbol` at the current quoted price.
///
/// The holding update, the credit, and the ledger append happen atomically:
/// if any step fails, none of them are applied.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `shares` is not positive or `symbol` is empty,
/// - [Error::UnknownSymbol] if the quote provider does not know `symbol`,
/// - [Error::QuoteUnavailable] if the quote provider fails or does not
///   answer within the configured deadline,
/// - [Error::InsufficientShares] if the user holds fewer than `shares`
///   shares of `symbol`,
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub async fn sell<P: QuoteProvider>(
    user_id: UserID,
    symbol: &str,
    shares: i64,
    provider: &P,
    config: &QuoteConfig,
    connection: &Mutex<Connection>,
) -> Result<SellConfirmation, Error> {
    validate_share_count(shares)?;

    let quote = get_quote(symbol, provider, config).await?;
    let proceeds = quote.price * shares as f64;

    let connection = acquire(connection)?;
    let sql_transaction = connection.unchecked_transaction()?;

    let remaining = holding::decrease(user_id, &quote.symbol, shares, &sql_transaction)?;
    let balance = account::credit(user_id, proceeds, &sql_transaction)?;
    ledger::append(
        user_id,
        &quote.symbol,
        -shares,
        quote.price,
        OffsetDateTime::now_utc(),
        &sql_transaction,
    )?;

    sql_transaction.commit()?;

    tracing::info!(
        "user {user_id} sold {shares} {} at {} (new balance {balance})",
        quote.symbol,
        quote.price
    );

    Ok(SellConfirmation { balance, remaining })
}

/// Add `amount` dollars to the user's cash balance and return the new
/// balance.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `amount` is not a positive, finite number,
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn add_funds(
    user_id: UserID,
    amount: f64,
    connection: &Mutex<Connection>,
) -> Result<f64, Error> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "can only add a positive dollar amount, got {amount}"
        )));
    }

    let connection = acquire(connection)?;
    let balance = account::credit(user_id, amount, &connection)?;

    tracing::info!("user {user_id} added {amount} in funds (new balance {balance})");

    Ok(balance)
}

/// Value the user's portfolio at current prices.
///
/// Cash and holdings are read in one locked snapshot; quotes are then
/// re-fetched per holding without holding the lock, so valuations are
/// eventually consistent with concurrent trades. A held symbol the provider
/// no longer serves is valued at its last recorded execution price.
///
/// # Errors
/// This function will return a:
/// - [Error::QuoteUnavailable] if the quote provider fails or does not
///   answer within the configured deadline,
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub async fn portfolio<P: QuoteProvider>(
    user_id: UserID,
    provider: &P,
    config: &QuoteConfig,
    connection: &Mutex<Connection>,
) -> Result<PortfolioValuation, Error> {
    let (cash, holdings) = {
        let connection = acquire(connection)?;

        (
            account::get_balance(user_id, &connection)?,
            holding::get_holdings(user_id, &connection)?,
        )
    };

    let mut valuations = Vec::with_capacity(holdings.len());
    let mut total = cash;

    for held in holdings {
        let price = match fetch_quote(&held.symbol, provider, config).await? {
            Some(quote) => quote.price,
            None => held.price,
        };
        let value = price * held.shares as f64;
        total += value;

        valuations.push(HoldingValuation {
            symbol: held.symbol,
            name: held.name,
            shares: held.shares,
            price,
            value,
        });
    }

    Ok(PortfolioValuation {
        holdings: valuations,
        cash,
        total,
    })
}

/// Look up the current quote for `symbol`, enforcing the lookup deadline.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `symbol` is empty,
/// - [Error::UnknownSymbol] if the quote provider does not know `symbol`,
/// - or [Error::QuoteUnavailable] if the quote provider fails or does not
///   answer within the configured deadline.
pub async fn get_quote<P: QuoteProvider>(
    symbol: &str,
    provider: &P,
    config: &QuoteConfig,
) -> Result<Quote, Error> {
    let symbol = symbol.trim();

    if symbol.is_empty() {
        return Err(Error::InvalidInput(
            "a ticker symbol must not be empty".to_owned(),
        ));
    }

    fetch_quote(symbol, provider, config)
        .await?
        .ok_or_else(|| Error::UnknownSymbol(symbol.to_uppercase()))
}

async fn fetch_quote<P: QuoteProvider>(
    symbol: &str,
    provider: &P,
    config: &QuoteConfig,
) -> Result<Option<Quote>, Error> {
    match tokio::time::timeout(config.quote_timeout, provider.lookup(symbol)).await {
        Ok(Ok(maybe_quote)) => Ok(maybe_quote),
        Ok(Err(error)) => {
            tracing::error!("quote lookup for {symbol} failed: {error}");

            Err(Error::QuoteUnavailable(error.to_string()))
        }
        Err(_) => Err(Error::QuoteUnavailable(format!(
            "the quote provider did not answer within {:?}",
            config.quote_timeout
        ))),
    }
}

fn validate_share_count(shares: i64) -> Result<(), Error> {
    if shares <= 0 {
        return Err(Error::InvalidInput(format!(
            "the number of shares must be a positive integer, got {shares}"
        )));
    }

    Ok(())
}

fn acquire(connection: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, Error> {
    connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");

        Error::DatabaseLock
    })
}





#[cfg(test)]
mod portfolio_tests {
    use crate::quote::QuoteConfig;

    use super::{
        buy, portfolio,
        test_utils::{get_test_provider, get_test_state},
    };

    #[tokio::test]
    async fn portfolio_sums_holdings_and_cash() {
        let (connection, user_id) = get_test_state(2_000.0);
        let provider = get_test_provider();
        let config = QuoteConfig::default();

        buy(user_id, "AAPL", 6, &provider, &config, &connection)
            .await
            .unwrap();
        buy(user_id, "NFLX", 2, &provider, &config, &connection)
            .await
            .unwrap();

        let valuation = portfolio(user_id, &provider, &config, &connection)
            .await
            .unwrap();

        // 2000 - 6×150 - 2×300.5 = 499
        assert_eq!(valuation.cash, 499.0);
        assert_eq!(valuation.holdings.len(), 2);

        let apple = &valuation.holdings[0];
        assert_eq!(apple.symbol, "AAPL");
        assert_eq!(apple.shares, 6);
        assert_eq!(apple.value, 900.0);

        let netflix = &valuation.holdings[1];
        assert_eq!(netflix.symbol, "NFLX");
        assert_eq!(netflix.value, 601.0);

        assert_eq!(valuation.total, 499.0 + 900.0 + 601.0);
    }

    #[tokio::test]
    async fn portfolio_with_no_holdings_is_just_cash() {
        let (connection, user_id) = get_test_state(1_000.0);
        let provider = get_test_provider();

        let valuation = portfolio(user_id, &provider, &QuoteConfig::default(), &connection)
            .await
            .unwrap();

        assert_eq!(valuation.holdings, []);
        assert_eq!(valuation.cash, 1_000.0);
        assert_eq!(valuation.total, 1_000.0);
    }

    #[tokio::test]
    async fn delisted_symbol_is_valued_at_last_execution_price() {
        let (connection, user_id) = get_test_state(1_000.0);
        let provider = get_test_provider();
        let config = QuoteConfig::default();

        buy(user_id, "AAPL", 6, &provider, &config, &connection)
            .await
            .unwrap();

        // A provider that no longer serves any symbol.
        let empty_provider = crate::quote::StaticQuoteProvider::default();

        let valuation = portfolio(user_id, &empty_provider, &config, &connection)
            .await
            .unwrap();

        assert_eq!(valuation.holdings[0].price, 150.0);
        assert_eq!(valuation.total, 100.0 + 900.0);
    }
}
