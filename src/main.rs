// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;

// Use library instead of local modules
use balance_ledger::{
    format_amount, format_relative, init_tracing, open_session, Config, KeyRegistry, LedgerSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    // The TUI owns the terminal; only log there when explicitly asked to
    if !args.is_empty() || env::var_os("RUST_LOG").is_some() {
        init_tracing("balance_ledger=warn");
    }
    let config = Config::from_env();

    let registry = KeyRegistry::new();
    let session = open_session(&config, &registry).await?;

    let result = match args.first().map(String::as_str) {
        None => run_ui_mode(&session),
        Some("add") => run_add(&session, &args[1..]),
        Some("delete") => run_delete(&session, &args[1..]),
        Some("reset") => {
            session.reset();
            println!("✓ Ledger cleared");
            Ok(())
        }
        Some("list") => {
            print_ledger(&session);
            Ok(())
        }
        Some("balance") => {
            println!("{}", format_amount(session.balance().unwrap_or(0.0)));
            Ok(())
        }
        Some(other) => {
            print_usage();
            Err(anyhow::anyhow!("unknown command {:?}", other))
        }
    };

    // Every mutation above is written in the background; wait for it before exiting
    session.close().await;
    result
}

fn run_add(session: &LedgerSession, args: &[String]) -> Result<()> {
    let Some(amount) = args.first() else {
        print_usage();
        bail!("add needs an amount");
    };
    let description = args[1..].join(" ");

    let ledger = session
        .push_input(amount, &description)
        .with_context(|| format!("Cannot add {:?}", amount))?;

    println!("✓ Added #{} {}", ledger[0].id, format_amount(ledger[0].amount));
    println!("  Balance: {}", format_amount(session.balance().unwrap_or(0.0)));
    Ok(())
}

fn run_delete(session: &LedgerSession, args: &[String]) -> Result<()> {
    let id: i64 = args
        .first()
        .context("delete needs an id")?
        .parse()
        .context("id must be an integer")?;

    let before = session.changes().map(|c| c.len()).unwrap_or(0);
    let after = session.delete(id).len();

    if after < before {
        println!("✓ Deleted #{}", id);
    } else {
        println!("No change with id {}", id);
    }
    println!("  Balance: {}", format_amount(session.balance().unwrap_or(0.0)));
    Ok(())
}

fn print_ledger(session: &LedgerSession) {
    let changes = session.changes().unwrap_or_default();
    let now = chrono::Utc::now();

    println!("Your balance: {}", format_amount(session.balance().unwrap_or(0.0)));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for change in &changes {
        println!(
            "#{:<4} {:>12}  {:<24} {}",
            change.id,
            format_amount(change.amount),
            change.description,
            format_relative(&change.time, now)
        );
    }
    if changes.is_empty() {
        println!("(no changes yet)");
    }
}

fn print_usage() {
    eprintln!("Usage: balance-ledger [COMMAND]");
    eprintln!();
    eprintln!("  (no command)                 open the terminal UI");
    eprintln!("  add <amount> [description]   record a change");
    eprintln!("  delete <id>                  remove a change");
    eprintln!("  reset                        remove every change");
    eprintln!("  list                         show all changes");
    eprintln!("  balance                      print the balance");
    eprintln!();
    eprintln!("Environment: LEDGER_DB, LEDGER_KEY, LEDGER_ON_CORRUPT, LEDGER_WRITE_MODE");
}

#[cfg(feature = "tui")]
fn run_ui_mode(session: &LedgerSession) -> Result<()> {
    // The event loop blocks; let the runtime move other tasks off this worker
    tokio::task::block_in_place(|| {
        let mut app = ui::App::new(session);
        ui::run_ui(&mut app)
    })
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_session: &LedgerSession) -> Result<()> {
    print_usage();
    eprintln!();
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the HTTP API: cargo run --bin ledger-server --features server");
    std::process::exit(1);
}
