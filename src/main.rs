use clap::Parser;
use hedgebot::cli::{self, Cli, Commands};
use hedgebot::config::LoggingConfig;
use hedgebot::error::{HedgeError, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            symbols,
            stop_losses,
        } => {
            let config = cli::load_config(&cli.config)?;
            init_logging(&config.logging);
            if let Err(problems) = config.validate() {
                for problem in &problems {
                    error!("config: {}", problem);
                }
                return Err(HedgeError::Validation(format!(
                    "{} configuration problem(s)",
                    problems.len()
                )));
            }
            cli::run(&config, symbols, stop_losses.as_deref()).await?;
        }
        Commands::Check { symbol } => {
            init_logging_simple();
            let config = cli::load_config(&cli.config)?;
            cli::check(&config, symbol).await?;
        }
        Commands::Close { symbol } => {
            init_logging_simple();
            let config = cli::load_config(&cli.config)?;
            cli::close(&config, symbol).await?;
        }
        Commands::Validate => {
            init_logging_simple();
            cli::validate(&cli.config)?;
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hedgebot=debug", config.level)));

    // HEDGEBOT_LOG_DIR wins over the configured directory
    let log_dir = std::env::var("HEDGEBOT_LOG_DIR")
        .ok()
        .or_else(|| config.dir.clone());

    // `rolling::daily` panics when the first file cannot be created
    let file_layer = log_dir.and_then(|log_dir| {
        if std::fs::create_dir_all(&log_dir).is_err() {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                log_dir
            );
            return None;
        }
        let test_path = std::path::Path::new(&log_dir).join(".hedgebot_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "hedgebot.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Flushes on drop; the process owns it until exit
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let (console_plain, console_json) = if config.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .init();
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .try_init();
}
