use std::env;
use std::io;
use std::time::Duration;

use bank_ledger::Ledger;
use bank_ledger::RateLimiter;
use bank_ledger::session::{read_commands, run, write_accounts};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Burst headroom and refill rate for the per-account limiter. Sized so an
/// ordinary replayed session never throttles; sustained hammering of one
/// account does.
const LIMITER_CAPACITY: u32 = 64;
const LIMITER_REFILL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args().nth(1).expect("usage: bank-ledger <session.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let ledger = Ledger::in_memory();
    let limiter = RateLimiter::new(LIMITER_CAPACITY, LIMITER_REFILL);
    let (command_sender, command_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_commands(&path) {
            match result {
                Ok(command) => {
                    command_sender.send(command).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    run(
        &ledger,
        &limiter,
        ReceiverStream::new(command_receiver),
        io::stdout().lock(),
    )
    .await;

    write_accounts(ledger.accounts().expect("account store unavailable"));
}
