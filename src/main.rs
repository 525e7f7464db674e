#![allow(clippy::enum_variant_names)]

use clap::Parser as _;
use tracing::debug;

use crate::{
    application::{Application, ApplicationError},
    cli::Cli,
    history::CancellationFlag,
};

mod application;
mod apply;
mod cli;
mod config;
mod ext;
mod filesystem;
mod history;
mod replay;

#[compio::main]
#[snafu::report]
async fn main() -> Result<(), ApplicationError> {
    let cli_args = Cli::parse();
    setup_tracing(&cli_args);
    debug!("Parsed CLI arguments: {cli_args:?}");

    let cancellation = CancellationFlag::new();
    Application::listen_for_ctrl_c(cancellation.clone());

    let dry_run = cli_args.dry_run;
    let updated = Application::run(cli_args, cancellation).await?;
    if dry_run {
        println!("{updated} mtimes would be updated");
    } else {
        println!("{updated} mtimes updated");
    }

    Ok(())
}

fn setup_tracing(cli_args: &Cli) {
    if let Some(level) = cli_args.log_level.to_tracing_level() {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .without_time()
            .compact()
            .init();
    }
}
