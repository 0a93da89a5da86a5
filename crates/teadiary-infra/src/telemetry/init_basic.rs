use teadiary_core::Environment;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => "teadiary=info,warn",
        Environment::Development => "teadiary=debug,info",
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(
    environment: Environment,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let production = environment.is_production();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(environment).into()),
        )
        .with(production.then(|| fmt::layer().json().with_current_span(false)))
        .with((!production).then(|| fmt::layer()))
        .try_init()?;

    tracing::debug!(environment = %environment, "Tracing initialized");
    Ok(())
}
