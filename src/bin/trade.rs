use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use papertrade_rs::{
    QuoteConfig, StaticQuoteProvider, UserID, currency::currency, initialize_db, ledger, trading,
};

/// Command line client for the paper-trading portfolio core.
///
/// User authentication is handled by the application embedding the core; the
/// CLI trusts the user ID it is given.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// File path to the JSON quote table, e.g.
    /// {"AAPL": {"name": "Apple Inc.", "price": 150.0}}.
    #[arg(long)]
    quotes_path: String,

    /// The ID of the user to act as.
    #[arg(long, short)]
    user: i64,

    /// How many seconds to wait for a quote lookup before giving up.
    #[arg(long, default_value_t = 5)]
    quote_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up the current price for a symbol.
    Quote {
        /// The ticker symbol to look up.
        symbol: String,
    },
    /// Buy shares at the current quoted price.
    Buy {
        /// The ticker symbol to buy.
        symbol: String,
        /// How many shares to buy.
        shares: i64,
    },
    /// Sell shares at the current quoted price.
    Sell {
        /// The ticker symbol to sell.
        symbol: String,
        /// How many shares to sell.
        shares: i64,
    },
    /// Add funds to the cash balance.
    Funds {
        /// The dollar amount to add.
        amount: f64,
    },
    /// Show the portfolio valued at current prices.
    Portfolio {
        /// Print the portfolio as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show the trade history.
    History,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    if let Err(error) = run(args).await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::open(&args.db_path)?;
    initialize_db(&conn)?;
    let connection = Arc::new(Mutex::new(conn));

    let quotes_json = fs::read_to_string(&args.quotes_path)?;
    let provider = StaticQuoteProvider::from_json(&quotes_json)?;

    let config = QuoteConfig {
        quote_timeout: Duration::from_secs(args.quote_timeout_secs),
    };

    let user_id = UserID::new(args.user);

    match args.command {
        Command::Quote { symbol } => {
            let quote = trading::get_quote(&symbol, &provider, &config).await?;

            println!(
                "{} ({}): {}",
                quote.name,
                quote.symbol,
                currency(quote.price)
            );
        }
        Command::Buy { symbol, shares } => {
            let confirmation =
                trading::buy(user_id, &symbol, shares, &provider, &config, &connection).await?;

            println!(
                "Bought {} share(s) of {} at {}. New balance: {}.",
                shares,
                confirmation.holding.symbol,
                currency(confirmation.holding.price),
                currency(confirmation.balance)
            );
        }
        Command::Sell { symbol, shares } => {
            let confirmation =
                trading::sell(user_id, &symbol, shares, &provider, &config, &connection).await?;

            match confirmation.remaining {
                Some(holding) => println!(
                    "Sold {} share(s) of {}. {} share(s) remain. New balance: {}.",
                    shares,
                    holding.symbol,
                    holding.shares,
                    currency(confirmation.balance)
                ),
                None => println!(
                    "Sold {} share(s), closing the position. New balance: {}.",
                    shares,
                    currency(confirmation.balance)
                ),
            }
        }
        Command::Funds { amount } => {
            let balance = trading::add_funds(user_id, amount, &connection)?;

            println!(
                "Added {} in funds. New balance: {}.",
                currency(amount),
                currency(balance)
            );
        }
        Command::Portfolio { json } => {
            let valuation = trading::portfolio(user_id, &provider, &config, &connection).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&valuation)?);
            } else {
                print_portfolio_table(&valuation);
            }
        }
        Command::History => {
            let connection = connection.lock().expect("database lock was poisoned");
            let entries = ledger::history(user_id, &connection)?;

            if entries.is_empty() {
                println!("No trades yet.");
            }

            for entry in entries {
                let side = if entry.shares >= 0 { "BUY" } else { "SELL" };

                println!(
                    "{}  {:<4}  {:>6} × {:<6}  at {}",
                    entry.date,
                    side,
                    entry.shares.abs(),
                    entry.symbol,
                    currency(entry.price)
                );
            }
        }
    }

    Ok(())
}

fn print_portfolio_table(valuation: &trading::PortfolioValuation) {
    println!(
        "{:<8} {:<24} {:>8} {:>12} {:>14}",
        "SYMBOL", "NAME", "SHARES", "PRICE", "VALUE"
    );

    for holding in &valuation.holdings {
        println!(
            "{:<8} {:<24} {:>8} {:>12} {:>14}",
            holding.symbol,
            holding.name,
            holding.shares,
            currency(holding.price),
            currency(holding.value)
        );
    }

    println!();
    println!("Cash:  {}", currency(valuation.cash));
    println!("Total: {}", currency(valuation.total));
}

fn setup_logging() {
    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stderr_log
                .with_filter(filter::LevelFilter::WARN)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}
