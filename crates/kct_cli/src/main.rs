use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kct_cli::{describe_toolchain, run_compile, Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile(args) => {
            let exit_code = run_compile(&args)?;
            if !exit_code.is_success() {
                std::process::exit(exit_code.process_code());
            }
        }
        Commands::Toolchain { kotlin_home } => {
            print!("{}", describe_toolchain(kotlin_home.as_deref())?);
        }
    }

    Ok(())
}
