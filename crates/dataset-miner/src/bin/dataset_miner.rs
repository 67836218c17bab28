//! Dataset miner binary
//!
//! Run with: cargo run -p dataset-miner -- --source ./docs --model llama3.2:3b

use dataset_miner::{
    cli::Args,
    config::Backend,
    generation::{CompletionProvider, GroqProvider, OllamaProvider},
    Error, Miner, MinerConfig,
};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let args = Args::parse_normalized();

    // Initialize tracing
    let default_filter = if args.debug {
        "dataset_miner=debug"
    } else {
        "dataset_miner=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            let code = err
                .downcast_ref::<Error>()
                .map_or(1, Error::exit_code);
            tracing::error!("{:#}", err);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = args.into_config()?;
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(mine(config))
}

async fn mine(config: MinerConfig) -> anyhow::Result<ExitCode> {
    let provider: Box<dyn CompletionProvider> = match config.backend {
        Backend::Ollama => {
            let ollama = OllamaProvider::new(&config.llm, config.model.clone())?;
            tracing::info!("Checking Ollama at {}...", ollama.base_url());
            match ollama.health_check().await {
                Ok(true) => {
                    tracing::info!("Ollama is running");
                    if let Ok(false) = ollama.has_model().await {
                        tracing::warn!(
                            "Model '{}' is not pulled; run `ollama pull {}`",
                            config.model,
                            config.model
                        );
                    }
                }
                _ => {
                    tracing::warn!("Ollama not available at {}", ollama.base_url());
                    tracing::warn!("Start it with `ollama serve` and pull the model:");
                    tracing::warn!("  ollama pull {}", config.model);
                }
            }
            Box::new(ollama)
        }
        Backend::Groq => Box::new(GroqProvider::new(&config.llm, config.model.clone())?),
    };

    let miner = Miner::new(config, provider)?;
    let cancel = miner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current chunk");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = miner.run().await?;
    report.print();

    if report.interrupted {
        Ok(ExitCode::from(Error::Interrupted.exit_code() as u8))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
