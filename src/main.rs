//! Command-line entry point.
//!
//! Reads `IDLE_REPLY_*` variables (from the environment or a `.env` file),
//! watches the mailbox until the watched sender writes, replies, and exits.
//!
//! Exit status is 0 after a successful match-and-reply and 1 on any fatal or
//! configuration error. Log verbosity follows `RUST_LOG`
//! (default `idle_reply=info`).

use idle_reply::{WatchConfig, Watcher};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("idle_reply=info")),
        )
        .with_target(false)
        .init();

    let config = match WatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(category = %e.category(), error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(async {
        let mut watcher = Watcher::connect(&config).await?;
        watcher.run().await
    });

    match outcome {
        Ok(matched) => {
            info!(
                seq = matched.message.seq,
                from = %matched.message.from,
                subject = %matched.message.subject,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(category = %e.category(), error = %e, "Watch failed");
            ExitCode::FAILURE
        }
    }
}
