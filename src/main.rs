//! gcodeforge command line

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use gcodeforge::{init_logging, process_file, Config, BUILD_DATE, VERSION};

#[derive(Parser)]
#[command(name = "gcodeforge")]
#[command(version, about = "Post-process 3D printer G-code", long_about = None)]
struct Cli {
    /// G-code file to process
    #[arg(required_unless_present = "print_config")]
    input: Option<PathBuf>,

    /// Where to write the result (default: rewrite the input in place)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file, .toml or .json (default: the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if cli.print_config {
        let text = config
            .to_toml_string()
            .context("Failed to render configuration")?;
        print!("{}", text);
        return Ok(());
    }

    let Some(input) = cli.input else {
        anyhow::bail!("No input file given");
    };
    let output = cli.output.unwrap_or_else(|| input.clone());

    info!("gcodeforge {} (built {})", VERSION, BUILD_DATE);
    process_file(&input, &output, &config)?;
    Ok(())
}
