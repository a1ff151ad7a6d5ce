use clap::Parser;
use lambda_api::cli::{self, Cli, Commands};
use lambda_api::config::AppConfig;
use lambda_api::error::{AppError, Result};
use lambda_api::predict_service::{proxy_event, InvocationResult};
use lambda_api::services::HttpServer;
use lambda_api::PredictResolver;
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let command = cli.command.clone().unwrap_or(Commands::Lambda);

    match &command {
        Commands::Lambda | Commands::Serve { .. } => init_logging(&config.logging),
        Commands::Predict { .. } | Commands::Inspect { .. } => init_logging_simple(),
    }

    let resolver = Arc::new(PredictResolver::from_config(&config)?);

    let outcome = match command {
        Commands::Lambda => run_lambda(Arc::clone(&resolver)).await,
        Commands::Serve { port, warm } => {
            run_server(Arc::clone(&resolver), port.unwrap_or(config.server.port), warm).await
        }
        Commands::Predict { body, event } => run_predict(&resolver, body, event).await,
        Commands::Inspect { json } => run_inspect(&resolver, json).await,
    };

    match Arc::into_inner(resolver) {
        Some(resolver) => resolver.teardown(),
        None => warn!("resolver still shared at exit, skipping teardown"),
    }
    outcome
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(&cli.config)?;
    if let Some(reference) = &cli.model {
        config.model.reference = reference.clone();
    }
    config.validate().map_err(AppError::InvalidConfig)?;
    Ok(config)
}

/// AWS Lambda runtime loop; one resolver (and model cache) per execution
/// environment
async fn run_lambda(resolver: Arc<PredictResolver>) -> Result<()> {
    info!("Starting Lambda runtime");

    // Loading during init keeps the first invocation fast. A failure here is
    // not fatal: the invocation reports it with the right error kind.
    if let Err(e) = resolver.warm_up().await {
        warn!(kind = %e.kind(), "model warm-up failed: {}", e);
    }

    let handler = service_fn(move |event: LambdaEvent<Value>| {
        let resolver = Arc::clone(&resolver);
        async move {
            let result: InvocationResult = resolver.handle(&event.payload).await;
            Ok::<InvocationResult, lambda_runtime::Error>(result)
        }
    });

    lambda_runtime::run(handler)
        .await
        .map_err(|e| AppError::Lambda(e.to_string()))
}

async fn run_server(resolver: Arc<PredictResolver>, port: u16, warm: bool) -> Result<()> {
    if warm {
        resolver.warm_up().await?;
    }
    let server = HttpServer::new(resolver, port);
    server.run(shutdown_signal()).await?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_predict(
    resolver: &PredictResolver,
    body: Option<String>,
    event: Option<std::path::PathBuf>,
) -> Result<()> {
    let event: Value = match (body, event) {
        (Some(body), _) => proxy_event(&body),
        (None, Some(path)) => serde_json::from_slice(&tokio::fs::read(&path).await?)?,
        (None, None) => {
            return Err(AppError::Internal(
                "predict needs --body or --event".to_string(),
            ))
        }
    };
    let result = lambda_api::predict(resolver, &event).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_inspect(resolver: &PredictResolver, json: bool) -> Result<()> {
    let model = resolver.model().await?;
    cli::print_summary(&cli::summarize(&model), json)?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
