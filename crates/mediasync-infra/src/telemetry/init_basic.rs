use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "mediasync=info";

/// Initialize tracing with an env filter and either plain or JSON output.
///
/// Events go to stderr, leaving stdout to command output. Fails if a global
/// subscriber is already installed.
pub fn init_telemetry(
    service_name: &str,
    environment: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::info!(
        service_name = %service_name,
        environment = %environment,
        "Tracing initialized"
    );
    Ok(())
}
