use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use client_core::{
    CaptureAction, CatalogClient, ClientEvent, ControlClient, DisplayClient, MediaUploader,
    RelayConnection,
};
use shared::{domain::FilterId, protocol::ServerEvent};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Display,
    Control,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:3002")]
    server_url: String,
    #[arg(long, value_enum)]
    role: Role,
    /// Image uploaded as the captured photo on every capture (display only).
    #[arg(long)]
    photo: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    match args.role {
        Role::Display => run_display(&args).await,
        Role::Control => run_control(&args).await,
    }
}

enum Capture {
    Upload(MediaUploader),
    LogOnly,
}

#[async_trait]
impl CaptureAction for Capture {
    async fn capture(&mut self, filter: &FilterId) -> Result<()> {
        match self {
            Self::Upload(uploader) => uploader.capture(filter).await,
            Self::LogOnly => {
                info!(%filter, "capture (no --photo configured, nothing uploaded)");
                Ok(())
            }
        }
    }
}

async fn connect_with_retry(server_url: &str, delay: Duration) -> RelayConnection {
    loop {
        match RelayConnection::connect(server_url).await {
            Ok(connection) => return connection,
            Err(err) => {
                warn!(error = %err, retry_in_secs = delay.as_secs(), "relay unreachable");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn run_display(args: &Args) -> Result<()> {
    let delay = Duration::from_secs(args.reconnect_secs);
    loop {
        let connection = connect_with_retry(&args.server_url, delay).await;
        let capture = match &args.photo {
            Some(path) => Capture::Upload(MediaUploader::new(
                CatalogClient::new(&args.server_url),
                path,
            )),
            None => Capture::LogOnly,
        };
        let mut display = DisplayClient::new(connection, capture);

        tokio::select! {
            result = display.run() => result?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        warn!("relay connection lost; reconnecting");
        tokio::time::sleep(delay).await;
    }
}

async fn run_control(args: &Args) -> Result<()> {
    let delay = Duration::from_secs(args.reconnect_secs);
    let catalog = CatalogClient::new(&args.server_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let connection = connect_with_retry(&args.server_url, delay).await;
        let (client, _task) = ControlClient::start(connection)?;
        let mut events = client.subscribe_events();
        println!("connected. commands: filter <name> | capture | status | filters | quit");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return Ok(());
                    };
                    if !run_command(&client, &catalog, line.trim()).await {
                        return Ok(());
                    }
                }
                event = events.recv() => match event {
                    Ok(ClientEvent::Server(event)) => print_event(&event),
                    Ok(ClientEvent::Disconnected) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                },
            }
        }
        warn!("relay connection lost; reconnecting");
        tokio::time::sleep(delay).await;
    }
}

/// Returns `false` when the operator asked to quit.
async fn run_command(client: &ControlClient, catalog: &CatalogClient, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("filter"), Some(name)) => {
            if let Err(reason) = client.change_filter(name).await {
                println!("not sent: {reason}");
            }
        }
        (Some("capture"), None) => {
            if let Err(reason) = client.start_capture().await {
                println!("not sent: {reason}");
            }
        }
        (Some("status"), None) => {
            let state = client.state().await;
            println!(
                "connected={} display={} filter={} capturing={} countdown={:?}",
                state.connected,
                state.display_connected,
                state.current_filter,
                state.is_capturing,
                state.countdown
            );
        }
        (Some("filters"), None) => match catalog.list_filters().await {
            Ok(filters) => {
                for filter in filters {
                    println!(
                        "{:<10} {} {}",
                        filter.name,
                        filter.icon.unwrap_or_default(),
                        filter.display_name
                    );
                }
            }
            Err(err) => println!("failed to load filters: {err}"),
        },
        (Some("quit"), None) => return false,
        (None, _) => {}
        _ => println!("unknown command: {line}"),
    }
    true
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::ConnectionStatus(status) => println!(
            "display {} / control {}",
            if status.display_connected { "online" } else { "offline" },
            if status.control_connected { "online" } else { "offline" },
        ),
        ServerEvent::FilterUpdate {
            filter,
            filter_info,
        } => match filter_info {
            Some(info) => println!("filter: {} ({})", filter, info.display_name),
            None => println!("filter: {filter}"),
        },
        ServerEvent::CaptureStarted => println!("capture started"),
        ServerEvent::CountdownUpdate { count } => println!("{count}..."),
        ServerEvent::CaptureFinished => println!("capture finished"),
        ServerEvent::RoleSuperseded { role } => {
            println!("another {role} client took over; commands from here still reach the relay")
        }
        ServerEvent::StartCountdown => {}
    }
}
