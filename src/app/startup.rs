//! Application startup
//!
//! Resolves configuration, installs logging, and runs the pipeline on a
//! single-threaded runtime until the shutdown coordinator stops it.

use crate::app::cli::args::Args;
use crate::app::cli::config::PipelineConfig;
use crate::core::error_handling::{fatal_message, log_error_with_context};
use crate::core::logging::init_logging;
use crate::core::shutdown::{ShutdownCoordinator, ShutdownTrigger};
use crate::pipeline::{MessageHandler, Pipeline, SimulatedRestart, SimulatedStore};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;

/// Run the application and return the process exit status
pub fn startup() -> i32 {
    let args = Args::parse();

    let config = match PipelineConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", fatal_message(&e, "Configuration loading"));
            return 1;
        }
    };

    let use_color = config
        .logging
        .color
        .unwrap_or_else(|| std::io::stdout().is_terminal());
    colored::control::set_override(use_color);

    if let Err(e) = init_logging(
        &config.logging.level,
        config.logging.format,
        config.logging.file.as_deref(),
        use_color,
    ) {
        eprintln!("FATAL: Could not initialise logging: {e}");
        return 1;
    }

    log::info!(
        "mayhem {} ({} built {}) starting",
        env!("CARGO_PKG_VERSION"),
        crate::GIT_HASH,
        crate::BUILD_TIME
    );
    log::debug!("Configuration: {:?}", config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("FATAL: Could not start the async runtime: {}", e);
            return 1;
        }
    };

    runtime.block_on(run(config))
}

/// Start the pipeline and wait for it to shut down
pub async fn run(config: PipelineConfig) -> i32 {
    let mut coordinator = ShutdownCoordinator::new();
    coordinator.install_signal_handlers();

    let pipeline = Pipeline::new(config.pipeline_settings(), build_handler(&config));
    if let Err(e) = pipeline.start(&coordinator.registry(), coordinator.handle()) {
        log_error_with_context(&e, "Pipeline startup");
        // Drain whatever did get spawned
        coordinator.shutdown(ShutdownTrigger::Requested).await;
        return 1;
    }

    coordinator.run().await.exit_code()
}

/// Handler wired to the simulated collaborators described by `config`
pub fn build_handler(config: &PipelineConfig) -> MessageHandler {
    MessageHandler::new(
        Arc::new(SimulatedStore::new(
            config.operation_delay(),
            config.persist_failure,
        )),
        Arc::new(SimulatedRestart::new(
            config.operation_delay(),
            config.action_failure,
        )),
    )
    .with_retry(config.retry_policy())
    .with_timeout(config.operation_timeout)
}
