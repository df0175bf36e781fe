//! # Console Remote Example
//!
//! Drives a playback server from the terminal:
//!
//! 1. Connect over WebSocket and mirror the server's playback state
//! 2. Print every connection status change and mirrored update
//! 3. Read commands from stdin
//! 4. Shut down gracefully on Ctrl+C or `quit`
//!
//! ## Running
//!
//! ```sh
//! cargo run --example console_remote
//!
//! # Override the server URL:
//! PLAYBACK_URL=http://10.0.0.2:3000/ cargo run --example console_remote
//! ```
//!
//! ## Commands
//!
//! | Input        | Effect                                |
//! |--------------|---------------------------------------|
//! | `vol <n>`    | set volume (clamped to 0..=100)       |
//! | `play`       | toggle between playing and stopped    |
//! | `mute`       | toggle mute                           |
//! | `song <name>`| switch to another song                |
//! | `reconnect`  | drop the link and connect again       |
//! | `status`     | print status and mirrored values      |
//! | `quit`       | exit                                  |

use playback_remote::transport::DEFAULT_SERVER_URL;
use playback_remote::{RemoteClient, RemoteConfig, RemoteControl, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("PLAYBACK_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    tracing::info!("Connecting to {url}");

    let client = RemoteClient::new(WebSocketConnector::new(), RemoteConfig::new(url));
    let mut remote = RemoteControl::new(client)?;
    remote.start()?;

    let mut status = remote.watch_status();
    let mut volume = remote.mirror().watch_volume();
    let mut song = remote.mirror().watch_current_song();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                println!("status: {current}");
                if current.blocks_interaction() {
                    println!("  (type `reconnect` to try again)");
                }
            }

            Ok(()) = volume.changed() => {
                println!("volume: {}", *volume.borrow_and_update());
            }

            Ok(()) = song.changed() => {
                println!("song: {}", *song.borrow_and_update());
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let mut words = line.split_whitespace();
                let result = match (words.next(), words.next()) {
                    (Some("vol"), Some(n)) => match n.parse::<i64>() {
                        Ok(n) => remote.change_volume(n),
                        Err(_) => {
                            println!("not a number: {n}");
                            Ok(())
                        }
                    },
                    (Some("play" | "song"), _) if remote.is_processing() => {
                        println!("still processing the last command, try again in a moment");
                        Ok(())
                    }
                    (Some("play"), None) => remote.toggle_playback(),
                    (Some("mute"), None) => remote.toggle_mute(),
                    (Some("song"), Some(name)) => remote.change_song(name).map(|sent| {
                        if !sent {
                            println!("already playing {name}");
                        }
                    }),
                    (Some("reconnect"), None) => remote.request_reconnect().map(|accepted| {
                        if !accepted {
                            println!("reconnect requested too recently, try again in a moment");
                        }
                    }),
                    (Some("status"), None) => {
                        println!("status: {}", remote.status());
                        println!("{:?}", remote.mirror());
                        Ok(())
                    }
                    (Some("quit"), None) => break,
                    (None, _) => Ok(()),
                    _ => {
                        println!("unknown command: {line}");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    tracing::error!("command failed: {e}");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    remote.shutdown().await;
    tracing::info!("Client shut down");
    Ok(())
}
