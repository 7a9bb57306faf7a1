use std::process::ExitCode;

use clap::Parser;
use horreum_mirror::{Cli, MirrorResult, run_mirror};
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logging = match cli.logging_config().build() {
        Ok(logging) => logging,
        Err(err) => {
            eprintln!("horreum-mirror: {}", err);
            return ExitCode::FAILURE;
        }
    };

    logging.in_scope(|| match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Mirror run failed");
            ExitCode::FAILURE
        }
    })
}

fn run(cli: &Cli) -> MirrorResult<()> {
    let config = cli.mirror_config()?;
    debug!(?config, "Resolved configuration");
    let report = run_mirror(&config)?;
    info!(
        datasets = report.datasets,
        batches = report.batches,
        inserted = report.inserted,
        "Upload complete"
    );
    Ok(())
}
