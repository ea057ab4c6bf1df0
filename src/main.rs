use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use apnscrab::config::{self, CliConfig, LogLevel, NotificationArgs};
use apnscrab::{ApnsClient, ApnsConfig, Payload, Priority, PushError, PushNotification};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🦀 apnscrab";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, config) = match setup().await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{APP_NAME}: {e}");
            return ExitCode::from(2);
        }
    };

    match run(&cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{APP_NAME} send failed: {e}");
            ExitCode::FAILURE
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() -> Result<(CliConfig, ApnsConfig), config::ConfigError> {
    // Parsed first: it decides the log level.
    let cli = CliConfig::from_args()?;
    init_tracing(cli.log_level);

    let config = config::load(&cli).await?;
    Ok((cli, config))
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_new(level.as_str()).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run(cli: &CliConfig, config: ApnsConfig) -> Result<(), PushError> {
    let address = config.gateway.address();
    let client = ApnsClient::new(config);

    let mut notification = build_notification(&client, &cli.notification);
    info!(
        "{} sending notification {} to {}",
        APP_NAME,
        notification.identifier(),
        address
    );

    let result = client.send(&mut notification).await;
    client.close().await;
    result?;

    info!(
        "{} delivered notification {} ({} retries left)",
        APP_NAME,
        notification.identifier(),
        notification.retry_budget()
    );
    Ok(())
}

fn build_notification(client: &ApnsClient, args: &NotificationArgs) -> PushNotification {
    let mut payload = Payload::new();
    if let Some(alert) = &args.alert {
        payload = payload.alert(alert.as_str());
    }
    if let Some(badge) = args.badge {
        payload = payload.badge(badge);
    }
    if let Some(sound) = &args.sound {
        payload = payload.sound(sound.as_str());
    }

    let mut notification = client.notification(args.device_token.trim(), payload);
    if let Some(ttl) = args.expires_in {
        notification = notification.expires_in(ttl);
    }
    if args.lazy {
        notification = notification.with_priority(Priority::Lazy);
    }

    notification
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
