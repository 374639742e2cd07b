//! guestboot command-line entry point.

use anyhow::Context;
use clap::Parser;
use guestboot::{BootOptions, logging};
use tokio_util::sync::CancellationToken;

/// Boot an Ubuntu cloud image under vfkit with the guest console on this terminal.
#[derive(Parser, Debug)]
#[command(name = "guestboot", version, about)]
struct Cli {
    #[command(flatten)]
    options: BootOptions,
}

fn main() {
    let cli = Cli::parse();
    let log_guard = match logging::init(cli.options.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:?}", anyhow::Error::new(e));
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.options) {
        eprintln!("Error: {:?}", e);
        // exit() skips destructors; flush the file appender first.
        drop(log_guard);
        std::process::exit(1);
    }
}

fn run(options: BootOptions) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(guestboot::boot(options, CancellationToken::new()))?;
    Ok(())
}
