use clap::{Parser, Subcommand};
use std::path::PathBuf;

use warden_core::{ApplyOptions, ChangeSpec, CostLedger, EvidenceLog, Redactor, TransformEngine};
use warden_gateway::GatewayConfig;

/// WARDEN - governance control plane for AI-assisted code modification
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind
        #[arg(long, default_value = warden_gateway::DEFAULT_HOST)]
        host: String,

        /// Port to bind
        #[arg(long, default_value_t = warden_gateway::DEFAULT_PORT)]
        port: u16,

        /// Evidence store directory
        #[arg(long, default_value = ".warden/evidence")]
        store: PathBuf,
    },

    /// Apply a change spec against a working directory
    Apply {
        /// Path to the change spec JSON
        spec: PathBuf,

        /// Working directory to transform
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Plan the patches without writing files
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify a change spec's invariants and mutation gate
    Verify {
        /// Path to the change spec JSON
        spec: PathBuf,

        /// Working directory to verify
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Scan a file for secrets and PII
    Scan {
        /// File to scan
        file: PathBuf,

        /// Emit the full scan result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forecast the cost of a model invocation
    Forecast {
        /// Model id from the pricing table
        model: String,

        /// Estimated input tokens
        input_tokens: u64,

        /// Estimated output tokens
        #[arg(default_value_t = 0)]
        output_tokens: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=info,warden_gateway=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, store } => {
            let config = GatewayConfig::new()
                .with_host(host)
                .with_port(port)
                .with_store_path(store);
            warden_gateway::serve(config).await?;
        }
        Commands::Apply {
            spec,
            workdir,
            dry_run,
        } => {
            let spec = load_spec(&spec)?;
            let engine = TransformEngine::new();
            let result = engine
                .apply(&spec, &workdir, ApplyOptions { dry_run })
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Verify { spec, workdir } => {
            let spec = load_spec(&spec)?;
            let engine = TransformEngine::new();
            let result = engine.verify(&spec, &workdir).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Scan { file, json } => {
            let content = std::fs::read_to_string(&file)?;
            let redactor = Redactor::with_default_policies();
            let result = redactor.scan(&content, file.to_str());
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.findings.is_empty() {
                println!("clean: no findings in {}", file.display());
            } else {
                for finding in &result.findings {
                    println!(
                        "{:?}/{:?} {} at line {}",
                        finding.policy_type,
                        finding.severity,
                        finding.message,
                        finding.location.start_line
                    );
                }
                std::process::exit(2);
            }
        }
        Commands::Forecast {
            model,
            input_tokens,
            output_tokens,
        } => {
            let evidence = std::sync::Arc::new(EvidenceLog::new());
            let ledger = CostLedger::new(evidence);
            let forecast = ledger.forecast_cost(&model, input_tokens, output_tokens)?;
            println!("{}", serde_json::to_string_pretty(&forecast)?);
        }
    }

    Ok(())
}

fn load_spec(path: &PathBuf) -> anyhow::Result<ChangeSpec> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(ChangeSpec::from_json(&value)?)
}
