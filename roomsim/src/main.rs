use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use roomsim_core::{
    config::Config,
    logging::init_logging,
    publish::{PublishOutcome, TargetOutcome},
    Credentials, LocalRoom, PublishRunner, RoomCallback, RoomSession,
};
use tracing::{debug, error, info};

const DEFAULT_ROOM: &str = "roomsim";
const DEFAULT_IDENTITY: &str = "roomsim-bot";

#[derive(Parser, Debug)]
#[command(name = "roomsim")]
#[command(about = "Synthetic room participant that publishes media and data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a room and publish the requested targets
    JoinRoom(JoinRoomArgs),
}

#[derive(Args, Debug)]
struct JoinRoomArgs {
    /// Room server URL
    #[arg(long)]
    url: Option<String>,

    /// Access token; takes precedence over the API key pair
    #[arg(long)]
    token: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    api_secret: Option<String>,

    /// Room to join when minting a token from the API key pair
    #[arg(long)]
    room: Option<String>,

    /// Participant identity when minting a token from the API key pair
    #[arg(long)]
    identity: Option<String>,

    /// Publish the simulcast test pattern
    #[arg(long)]
    publish_demo: bool,

    /// Publish target: a file path, or <h264|vp8|opus|data>://<address>
    #[arg(long = "publish", value_name = "SPEC")]
    publish: Vec<String>,

    /// Video frame rate for h264 and vp8 sources
    #[arg(long)]
    fps: Option<f64>,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,

    /// Configuration file
    #[arg(long, env = "ROOMSIM_CONFIG_PATH")]
    config: Option<String>,
}

impl JoinRoomArgs {
    /// Layer explicit flags over the loaded configuration
    fn apply(self, config: &mut Config) {
        let connection = &mut config.connection;
        let overrides = [
            (&mut connection.url, self.url),
            (&mut connection.token, self.token),
            (&mut connection.api_key, self.api_key),
            (&mut connection.api_secret, self.api_secret),
            (&mut connection.room, self.room),
            (&mut connection.identity, self.identity),
        ];
        for (slot, value) in overrides {
            if value.is_some() {
                *slot = value;
            }
        }

        if self.publish_demo {
            config.publish.demo = true;
        }
        if !self.publish.is_empty() {
            config.publish.targets = self.publish;
        }
        if let Some(fps) = self.fps {
            config.publish.fps = fps;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::JoinRoom(args) => join_room(args).await,
    }
}

async fn join_room(args: JoinRoomArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.ensure_valid()?;

    init_logging(&config.logging)?;

    let credentials = config.credentials()?;
    debug!(credentials = ?credentials, "Resolved connection details");

    let room_name = credentials.room().unwrap_or(DEFAULT_ROOM).to_string();
    let identity = credentials.identity().unwrap_or(DEFAULT_IDENTITY).to_string();
    let room = LocalRoom::connect(room_name, identity, RoomCallback::logging());
    log_connected(&credentials, room.as_ref());

    let session: Arc<dyn RoomSession> = room;
    let plan = config.publish_plan();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tokio::select! {
        outcomes = PublishRunner::run(Arc::clone(&session), plan) => {
            report(&outcomes);
            shutdown.await;
        }
        () = &mut shutdown => {
            info!("Shutdown requested while publishing");
        }
    }

    session.disconnect().await;
    info!("Disconnected");
    Ok(())
}

fn log_connected(credentials: &Credentials, room: &dyn RoomSession) {
    info!(
        url = %credentials.url(),
        room = %room.name(),
        identity = %room.identity(),
        "connected to room"
    );
}

/// Counts over the settled publish tasks
#[derive(Debug, Default, PartialEq, Eq)]
struct PublishSummary {
    live_tracks: usize,
    data_streams_ended: usize,
    failed: usize,
}

/// Summarise once every task has settled.
///
/// Each target is already logged as its own task finishes; tracks are still
/// writing at this point, while data streams have ended.
fn report(outcomes: &[TargetOutcome]) -> PublishSummary {
    let mut summary = PublishSummary::default();
    for outcome in outcomes {
        match &outcome.result {
            Ok(PublishOutcome::Track(_) | PublishOutcome::Demo(_)) => summary.live_tracks += 1,
            Ok(PublishOutcome::Data(_)) => summary.data_streams_ended += 1,
            Err(e) => {
                summary.failed += 1;
                error!(target_spec = %outcome.spec, error = %e, "Publish target failed");
            }
        }
    }
    info!(
        live_tracks = summary.live_tracks,
        data_streams_ended = summary.data_streams_ended,
        failed = summary.failed,
        "Publish tasks settled, tracks keep streaming until shutdown"
    );
    summary
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
