use bridge_client::{ClientEvent, ClientHandle, TerminalOutcome};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// Drives the interactive Client console: reads prompt lines from `input`,
/// submits them, and prints streamed chunks and terminal outcomes to
/// `output` as they arrive. A line of just `/abort` cancels the active
/// request instead of being submitted as a prompt.
///
/// Runs until `input` reaches EOF. The event-printer and the line-reader
/// run concurrently so a chunk for an earlier prompt can print while the
/// operator is still typing the next one.
pub async fn run<R, W>(input: R, mut output: W, handle: ClientHandle, mut events: mpsc::UnboundedReceiver<ClientEvent>)
where
    R: AsyncRead + Unpin,
    W: std::io::Write,
{
    let mut lines = BufReader::new(input).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => handle_line(&line, &handle, &mut output),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "client console input closed with an error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => print_event(&event, &mut output),
                    None => break,
                }
            }
        }
    }
}

fn handle_line<W: std::io::Write>(line: &str, handle: &ClientHandle, output: &mut W) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if line == "/abort" {
        handle.send_abort();
        return;
    }
    if let Err(e) = handle.send_chat_start(line) {
        let _ = writeln!(output, "rejected: {e}");
    }
}

fn print_event<W: std::io::Write>(event: &ClientEvent, output: &mut W) {
    match event {
        ClientEvent::ServerInfo { host_name, model, status } => {
            let _ = writeln!(output, "[connected to {host_name} running {model}, status: {status:?}]");
        }
        ClientEvent::Chunk { text, .. } => {
            let _ = write!(output, "{text}");
            let _ = output.flush();
        }
        ClientEvent::Terminal { outcome, .. } => {
            let _ = writeln!(output);
            match outcome {
                TerminalOutcome::Stop => {}
                TerminalOutcome::Abort => {
                    let _ = writeln!(output, "[aborted]");
                }
                TerminalOutcome::Error { code, message } => {
                    let _ = writeln!(output, "[error {code:?}: {message}]");
                }
                TerminalOutcome::Timeout => {
                    let _ = writeln!(output, "[timed out waiting for a response]");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_protocol::GateStatus;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn abort_with_no_active_request_writes_nothing_to_the_socket() {
        let (mut peer_side, client_side) = duplex(8192);
        let (handle, _events) = bridge_client::spawn(client_side);
        let mut buf = Vec::new();

        handle_line("/abort", &handle, &mut buf);
        assert!(buf.is_empty());

        // the socket only sees bytes once something is actually submitted
        handle_line("hello", &handle, &mut buf);
        let mut read_buf = [0u8; 64];
        let n = peer_side.read(&mut read_buf).await.unwrap();
        assert!(n > 0);
    }

    #[test]
    fn print_event_formats_server_info() {
        let mut buf = Vec::new();
        print_event(
            &ClientEvent::ServerInfo {
                host_name: "box".to_owned(),
                model: "llama3".to_owned(),
                status: GateStatus::Ready,
            },
            &mut buf,
        );
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("box"));
        assert!(text.contains("llama3"));
    }
}
