use clap::Parser;

use leasehold::prelude::*;
use leasehold::util::{init_tracing, millis, summarize};
use leasehold::{Cli, Commands, HarnessConfig, Leasehold};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    let options = cli.lock_config().options()?;
    let app = Leasehold::connect(&cli.store, options).await?;

    match cli.command {
        Commands::Contend {
            workers,
            hold_ms,
            key,
            reset,
            json,
        } => {
            let config = HarnessConfig {
                workers,
                key,
                hold: millis(hold_ms),
                lock: options,
            };
            let report = app.contend(config, reset).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", summarize(&report));
            }

            report.verify()
        }
        Commands::Hold { key, hold_ms } => {
            let outcome = app.hold(&key, millis(hold_ms)).await?;
            println!("{key}: {outcome}");
            Ok(())
        }
    }
}
