//! Main entry point for the layerdiff CLI app

use layerdiff::cli::{self, Commands};
use layerdiff::LayerDiffer;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        match e.downcast_ref::<clap::Error>() {
            Some(clap_err) => {
                let _ = clap_err.print();
                if !clap_err.use_stderr() {
                    return std::process::ExitCode::SUCCESS;
                }
            }
            None => eprintln!("Error: {}", e),
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run()?;
    cli::init_logging(args.verbose);

    match &args.command {
        Commands::Changes { layer, json } => {
            let config = layer.config();
            let differ = LayerDiffer::new(Arc::new(layer.backend()), layer.native_diff(&config)?, config);
            let changes = differ.changes(&layer.layer, &layer.parent)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            if *json {
                serde_json::to_writer_pretty(&mut out, &changes)?;
                writeln!(out)?;
            } else {
                for change in &changes {
                    writeln!(out, "{change}")?;
                }
            }
        }
        Commands::Export { layer, output } => {
            let config = layer.config();
            let differ = LayerDiffer::new(Arc::new(layer.backend()), layer.native_diff(&config)?, config);
            let mut stream = differ.diff(&layer.layer, &layer.parent)?;

            let written = match output {
                Some(path) => io::copy(&mut stream, &mut File::create(path)?),
                None => io::copy(&mut stream, &mut io::stdout().lock()),
            };
            stream.close();
            written?;
        }
    }

    Ok(())
}
