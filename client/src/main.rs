use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueHint};
use token_sale_client::{PollConfig, SaleClient};
use token_sale_core::interface::{load_json, save_json, ChainConfig, SaleMetadata, SaleParams};
use tracing_subscriber::EnvFilter;

const DEFAULT_SALE_PARAMS_PATH: &str = "./sale_params.json";
const DEFAULT_SALE_METADATA_PATH: &str = "./sale_metadata.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let poll = PollConfig {
        interval: Duration::from_millis(cli.poll_interval_ms),
        attempts: cli.poll_attempts,
    };

    match cli.command {
        Commands::Init { params, outfile } => {
            let params: SaleParams = load_json(&params)?;

            let client = SaleClient::new(&params.chain_config, None, poll)?;
            let (metadata, record) = client.init(&params).await?;
            // For reuse later during `Claim` and `Cancel`
            save_json(&outfile, &metadata)?;

            println!("{}", client.summary(&metadata.sale, &record).await?);
            tracing::info!(metadata = ?outfile, "Token sale initialized successfully");
        }
        Commands::Claim { metadata, taker } => {
            let metadata: SaleMetadata = load_json(&metadata)?;

            let client = SaleClient::new(&metadata.chain_config, taker.as_deref(), poll)?;
            let record = client.claim(&metadata).await?;
            println!("{}", client.summary(&metadata.sale, &record).await?);
        }
        Commands::Cancel { metadata } => {
            let metadata: SaleMetadata = load_json(&metadata)?;

            let client = SaleClient::new(&metadata.chain_config, None, poll)?;
            client.cancel(&metadata).await?;
            println!("Token Sale closed!");
        }
        Commands::Show { config } => {
            let config: ChainConfig = load_json(&config)?;

            let client = SaleClient::new(&config, None, poll)?;
            let summaries = client.summaries().await?;
            if summaries.is_empty() {
                println!("No open token sales");
            }
            for summary in summaries {
                println!("{summary}\n");
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "token-sale")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Milliseconds between account polls
    #[arg(long, global = true, default_value_t = 1_000)]
    poll_interval_ms: u64,

    /// Polls before giving up on a submitted change
    #[arg(long, global = true, default_value_t = 30)]
    poll_attempts: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit tokens into a new sale
    Init {
        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_SALE_PARAMS_PATH,
            value_hint = ValueHint::FilePath)]
        params: PathBuf,

        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_SALE_METADATA_PATH,
            value_hint = ValueHint::FilePath)]
        outfile: PathBuf,
    },
    /// Buy one allocation
    Claim {
        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_SALE_METADATA_PATH,
            value_hint = ValueHint::FilePath)]
        metadata: PathBuf,

        /// Taker keypair file; defaults to the configured payer
        #[arg(short, long, value_parser, value_hint = ValueHint::FilePath)]
        taker: Option<PathBuf>,
    },
    /// Return unsold tokens and close the sale
    Cancel {
        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_SALE_METADATA_PATH,
            value_hint = ValueHint::FilePath)]
        metadata: PathBuf,
    },
    /// List every open sale of the program
    Show {
        /// Any file carrying the chain config (params or metadata)
        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_SALE_METADATA_PATH,
            value_hint = ValueHint::FilePath)]
        config: PathBuf,
    },
}
