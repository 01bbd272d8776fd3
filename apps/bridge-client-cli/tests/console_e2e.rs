use bridge_client_cli::console;
use bridge_protocol::{codec::DecodeEvent, encode, FrameDecoder, GateStatus, Message, ServerInfoPayload};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn prompt_from_stdin_is_sent_and_reply_chunks_are_printed() {
    let (mut peer_side, client_side) = duplex(8192);
    let (handle, events) = bridge_client::spawn(client_side);

    // Host-side server_info, as every peer session sends on attach.
    peer_side
        .write_all(&encode(&Message::ServerInfo {
            request_id: None,
            payload: ServerInfoPayload {
                host_name: "box".to_owned(),
                model: "llama3".to_owned(),
                status: GateStatus::Ready,
            },
        }))
        .await
        .unwrap();

    // A duplex pipe stands in for stdin so it doesn't EOF until the test
    // explicitly closes the write half, after the reply has been printed —
    // an always-ready EOF would race the console's event branch and exit
    // the loop before the host's reply ever arrives.
    let (mut stdin_writer, stdin_reader) = duplex(256);
    stdin_writer.write_all(b"hello there\n").await.unwrap();

    let mut stdout = Vec::new();
    let console_task = tokio::spawn(async move {
        console::run(stdin_reader, &mut stdout, handle, events).await;
        stdout
    });

    // The console should have written a chat_start frame.
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    let n = peer_side.read(&mut buf).await.unwrap();
    let frames = decoder.write(&buf[..n]);
    let DecodeEvent::Frame(value) = frames.into_iter().next().expect("one frame") else {
        panic!("expected a frame");
    };
    assert_eq!(value["type"], "chat_start");
    let request_id = value["request_id"].as_str().unwrap().to_owned();

    peer_side
        .write_all(&encode(&Message::chat_chunk(request_id.clone(), "hi!")))
        .await
        .unwrap();
    peer_side
        .write_all(&encode(&Message::chat_end(request_id, bridge_protocol::FinishReason::Stop)))
        .await
        .unwrap();

    drop(peer_side);
    drop(stdin_writer);

    let stdout = console_task.await.unwrap();
    let text = String::from_utf8(stdout).unwrap();
    assert!(text.contains("hi!"), "unexpected output: {text}");
}
