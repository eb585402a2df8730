mod cli;

use fragforge::{config, inspect, rewrite};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "fragforge=debug,fragforge_media=debug".to_string()
        } else {
            "fragforge=info,fragforge_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { file, json } => inspect_file(&file, cli.config.as_deref(), json),
        Commands::Rewrite {
            input,
            output,
            sample_defaults,
            max_offset_iterations,
        } => rewrite_file(
            &input,
            &output,
            cli.config.as_deref(),
            sample_defaults,
            max_offset_iterations,
        ),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("fragforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn inspect_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let report = inspect::inspect_file(file, config.codec.fragment_options())?;

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        inspect::print_report(&report);
    }

    Ok(())
}

fn rewrite_file(
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    sample_defaults: bool,
    max_offset_iterations: Option<usize>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let mut fragment = config.codec.fragment_options();
    if let Some(iterations) = max_offset_iterations {
        if iterations == 0 {
            anyhow::bail!("--max-offset-iterations must be at least 1");
        }
        fragment.max_offset_iterations = iterations;
    }

    let options = rewrite::RewriteOptions {
        fragment,
        set_sample_defaults: sample_defaults || config.codec.set_sample_defaults,
        overwrite: config.output.overwrite,
    };

    tracing::info!("Rewriting {:?} -> {:?}", input, output);
    let summary = rewrite::rewrite_file(input, output, options)?;

    println!(
        "Rewrote {} fragments ({} other atoms passed through)",
        summary.fragments, summary.passthrough
    );
    println!("Size: {} -> {} bytes", summary.bytes_in, summary.bytes_out);

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!(
                "  Max offset iterations: {}",
                config.codec.max_offset_iterations
            );
            println!("  Sample defaults: {}", config.codec.set_sample_defaults);
            println!("  Overwrite output: {}", config.output.overwrite);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!(
                "  Max offset iterations: {}",
                config.codec.max_offset_iterations
            );
        }
    }

    Ok(())
}
