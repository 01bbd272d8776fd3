use std::sync::Arc;

use bridge_core::{ConnectionSupervisor, DebugLogger, Relay};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Parsed form of a line typed at the running host's console (spec §6):
/// the same verb set as the `bridge-hostd` argv subcommands, since there is
/// no separate daemon/IPC layer — a live `start` and its console are the
/// same process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Stop,
    SelectModel(String),
    CopyServerId,
    ShowQr,
    ToggleDebug,
    Quit,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.splitn(2, char::is_whitespace);
        match parts.next().unwrap_or_default() {
            "stop" => Self::Stop,
            "select-model" => Self::SelectModel(parts.next().unwrap_or_default().trim().to_owned()),
            "copy-server-id" => Self::CopyServerId,
            "show-qr" => Self::ShowQr,
            "toggle-debug" => Self::ToggleDebug,
            "quit" => Self::Quit,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

/// Reads console commands from `reader` until EOF or a `stop`/`quit` is
/// received, applying each one against the running relay. Returns once the
/// console loop should no longer be read (the caller still owns deciding
/// whether to actually tear the process down).
pub async fn run<R>(
    reader: R,
    relay: Arc<Relay>,
    supervisor: Arc<ConnectionSupervisor>,
    server_id: String,
    debug_log: Arc<DebugLogger>,
    debug_enabled_tx: mpsc::UnboundedSender<bool>,
    mut debug_enabled: bool,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "console input closed with an error");
                break;
            }
        };

        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Stop | ConsoleCommand::Quit => {
                info!("console: shutting down");
                supervisor.shutdown().await;
                break;
            }
            ConsoleCommand::SelectModel(model) if !model.is_empty() => {
                info!(model = %model, "console: model changed");
                relay.set_model(model);
            }
            ConsoleCommand::SelectModel(_) => {
                println!("usage: select-model <name>");
            }
            ConsoleCommand::CopyServerId => {
                println!("{server_id}");
            }
            ConsoleCommand::ShowQr => {
                println!("{}", render_qr_placeholder(&server_id));
            }
            ConsoleCommand::ToggleDebug => {
                debug_enabled = !debug_enabled;
                let _ = debug_enabled_tx.send(debug_enabled);
                if debug_enabled {
                    for entry in debug_log.entries() {
                        println!("{entry}");
                    }
                }
                println!("debug console: {}", if debug_enabled { "on" } else { "off" });
            }
            ConsoleCommand::Unknown(cmd) => {
                println!("unrecognized command: {cmd}");
            }
        }
    }
}

/// Renders the server id as text framed for scanning (actual QR rendering
/// is a UI concern out of scope here; this is the text an operator pastes
/// into any QR generator, or reads directly).
fn render_qr_placeholder(server_id: &str) -> String {
    format!("[server id]\n{server_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_verbs() {
        assert_eq!(ConsoleCommand::parse("stop"), ConsoleCommand::Stop);
        assert_eq!(ConsoleCommand::parse("quit\n"), ConsoleCommand::Quit);
        assert_eq!(ConsoleCommand::parse("copy-server-id"), ConsoleCommand::CopyServerId);
        assert_eq!(ConsoleCommand::parse("show-qr"), ConsoleCommand::ShowQr);
        assert_eq!(ConsoleCommand::parse("toggle-debug"), ConsoleCommand::ToggleDebug);
        assert_eq!(
            ConsoleCommand::parse("select-model llama3"),
            ConsoleCommand::SelectModel("llama3".to_owned())
        );
        assert_eq!(
            ConsoleCommand::parse("frobnicate"),
            ConsoleCommand::Unknown("frobnicate".to_owned())
        );
    }

    #[tokio::test]
    async fn stop_command_shuts_down_the_supervisor() {
        let relay = Relay::new(Arc::new(bridge_provider::MockProvider::new()), "h".to_owned(), "m".to_owned());
        let supervisor = Arc::new(ConnectionSupervisor::new(relay.clone()));
        let (debug_log, _rx) = bridge_core::new_debug_logger(16);
        let (tx, _rx2) = mpsc::unbounded_channel();

        let input: &[u8] = b"stop\n";
        run(input, relay, supervisor.clone(), "abc".to_owned(), debug_log, tx, false).await;

        assert!(supervisor.is_shutting_down());
    }
}
