//! Parley terminal client.
//!
//! # Usage
//!
//! ```bash
//! parley --token "$TOKEN" --room 7
//! parley --server ws://chat.example:8000/ws --api http://chat.example:8000 --token "$TOKEN"
//! ```
//!
//! Lines typed on stdin are sent to the active room. Lines starting with `/`
//! are commands; `/quit` exits. Logs go to stderr.

mod input;
mod render;

use std::io::{self, Write};

use clap::Parser;
use parley_client::{
    ClientConfig, ClientError, ClientHandle, ClientUpdate, DEFAULT_API_URL, HttpChatApi,
    WsConnector,
};
use parley_core::{ConnectionConfig, connection::DEFAULT_ENDPOINT};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::input::Input;

/// Parley chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Terminal client for Parley chat")]
#[command(version)]
struct Args {
    /// Streaming endpoint; the token is appended as the last path segment
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    server: String,

    /// Base URL of the HTTP API
    #[arg(short, long, default_value = DEFAULT_API_URL)]
    api: String,

    /// Access token
    #[arg(short, long)]
    token: String,

    /// Room to open after connecting
    #[arg(short, long)]
    room: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// CLI errors.
#[derive(Debug, Error)]
enum CliError {
    /// Terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Client error that ends the session.
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config = ClientConfig {
        connection: ConnectionConfig { endpoint: args.server, ..ConnectionConfig::default() },
        ..ClientConfig::default()
    };
    let api =
        HttpChatApi::new(args.api, args.token.clone()).with_timeout(config.runtime.request_timeout);
    let (client, updates, task) = parley_client::spawn(config, WsConnector, api);

    client.connect(args.token).await?;
    if let Some(room_id) = args.room {
        report(client.join_room(room_id).await)?;
    }

    let result = session(&client, updates).await;

    client.shutdown().await;
    if let Err(e) = task.await {
        tracing::warn!(error = %e, "client task did not stop cleanly");
    }
    result
}

async fn session(
    client: &ClientHandle,
    mut updates: tokio::sync::mpsc::UnboundedReceiver<ClientUpdate>,
) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                match Input::parse(&line) {
                    Input::Quit => return Ok(()),
                    Input::Empty => {},
                    Input::Invalid(hint) => print_lines([hint])?,
                    Input::Join(room_id) => report(client.join_room(room_id).await)?,
                    Input::Leave => report(client.leave_room().await)?,
                    Input::Older => {
                        if !client.load_older().await? {
                            print_lines(["* nothing more to load".to_string()])?;
                        }
                    },
                    Input::Rooms => client.refresh_rooms().await?,
                    Input::Status => {
                        let status = client.status().await?;
                        print_lines([render::status_line(&status)])?;
                    },
                    Input::Message(text) => report(client.send_message(text).await.map(drop))?,
                }
            }

            update = updates.recv() => match update {
                Some(update) => print_lines(render::update_lines(&update))?,
                None => return Ok(()),
            },
        }
    }
}

/// Show user-facing failures, log the rest. Only a stopped runtime is fatal.
fn report(result: Result<(), ClientError>) -> Result<(), CliError> {
    match result {
        Ok(()) => Ok(()),
        Err(ClientError::RuntimeClosed) => Err(ClientError::RuntimeClosed.into()),
        Err(e) if e.is_user_visible() => print_lines([format!("! {e}")]),
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            Ok(())
        },
    }
}

fn print_lines(lines: impl IntoIterator<Item = String>) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}
