use std::path::Path;

use clap::Parser;
use terraloc_cli::{CliError, USAGE, parse_input, parse_output, run};
use tracing_subscriber::EnvFilter;

/// Convert game localization between JSON, PO and assembly resources.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = USAGE)]
struct Args {
    /// Input format and its arguments
    #[arg(allow_hyphen_values = true)]
    input: Vec<String>,

    /// Output format and its arguments, after `--`
    #[arg(last = true)]
    output: Vec<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let commands = parse_input(&args.input).and_then(|input| Ok((input, parse_output(&args.output)?)));
    let result = commands.and_then(|(input, output)| run(&input, &output, Path::new(".")));

    if let Err(e) = result {
        match &e {
            CliError::Usage(message) => {
                eprintln!("{}", message);
                eprintln!("{}", USAGE);
            }
            CliError::Conversion(error) => eprintln!("Error: {}", error),
        }
        std::process::exit(e.exit_code());
    }
}
