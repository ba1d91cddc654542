mod checks;
mod cli;
mod commands;
mod dispatch;
mod error;
mod output;
mod probe;
mod sanity;
mod site;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{
    handle_check_command,
    handle_checks_command,
    handle_fetch_command,
    handle_probe_command,
    handle_report_command,
    handle_run_command,
    handle_site_command,
};
use error::Result;
use output::print_error;
use site::load_site;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch_command(&cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr; RUST_LOG overrides the -v level
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn dispatch_command(cli: &Cli) -> Result<i32> {
    let site = || load_site(cli.site_config.as_deref());

    match &cli.command {
        Commands::Run(args) => handle_run_command(args),
        Commands::Check(args) => handle_check_command(args, &site()?),
        Commands::Report(args) => handle_report_command(args, &site()?),
        Commands::Checks(cmd) => handle_checks_command(cmd, &site()?),
        Commands::Site(cmd) => handle_site_command(cmd, &site()?),
        Commands::Fetch {
            benchmark,
            source_path,
            format,
        } => handle_fetch_command(benchmark, source_path.as_deref(), format),
        Commands::Probe(cmd) => handle_probe_command(cmd),
    }
}
