use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;

use papertrade_rs::{PasswordHash, create_user, initialize_db};

/// A utility for creating a test database for the paper-trading core.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// Optional file path to save a sample JSON quote table to.
    #[arg(long)]
    quotes_output_path: Option<String>,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test user...");

    // Password hashing happens in the auth layer that fronts the core, so
    // the test user gets a fixed placeholder hash.
    let user = create_user("demo", PasswordHash::new_unchecked("not-a-real-hash"), &conn)?;

    println!(
        "Created user \"{}\" (ID {}) with a starting balance of {}",
        user.username, user.id, user.cash
    );

    if let Some(quotes_path) = args.quotes_output_path {
        println!("Writing sample quote table to {quotes_path}");

        std::fs::write(
            quotes_path,
            serde_json::json!({
                "AAPL": { "name": "Apple Inc.", "price": 150.0 },
                "NFLX": { "name": "Netflix, Inc.", "price": 300.5 },
                "AMZN": { "name": "Amazon.com, Inc.", "price": 125.25 },
            })
            .to_string(),
        )?;
    }

    println!("Success!");

    Ok(())
}
