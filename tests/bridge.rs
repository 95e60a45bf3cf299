//! 端到端桥接测试：真实的 `cat` / `sh` 进程，内存传输或真实 WebSocket
//!
//! 没有 PTY 支持的环境下这些测试打印原因后直接返回。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message;

use ws_pty_bridge::pty::{decode_payload, encode_chunk, PtySession, PumpExit, SessionOptions, Trigger};
use ws_pty_bridge::server::{BridgeConfig, BridgeServer};
use ws_pty_bridge::transport::memory::{inbound_channel, outbound_channel};
use ws_pty_bridge::transport::Frame;
use ws_pty_bridge::utils::RecordingReporter;

fn start_or_skip(command: &str, args: &[&str], options: SessionOptions) -> Option<PtySession> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    match PtySession::start(command, &args, options) {
        Ok(session) => Some(session),
        Err(e) => {
            println!("PTY creation failed (may be expected in CI): {}", e);
            None
        }
    }
}

/// 收集输出帧直到连接关闭，返回解码后的字节与关闭码
async fn drain(out: &mut UnboundedReceiver<Frame>) -> (Vec<u8>, Option<u16>) {
    let mut bytes = Vec::new();
    let mut close_code = None;
    while let Some(frame) = out.recv().await {
        match frame {
            Frame::Text(payload) => bytes.extend(decode_payload(&payload).unwrap()),
            Frame::Close(reason) => close_code = reason.map(|r| r.code),
            Frame::Binary(_) => panic!("bridge must never send binary frames"),
        }
    }
    (bytes, close_code)
}

/// 读取输出直到出现 `needle`
async fn read_until(out: &mut UnboundedReceiver<Frame>, needle: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    while !bytes.windows(needle.len()).any(|w| w == needle) {
        match out.recv().await {
            Some(Frame::Text(payload)) => bytes.extend(decode_payload(&payload).unwrap()),
            Some(other) => panic!("unexpected frame before {:?}: {:?}", needle, other),
            None => panic!("connection closed before {:?}", needle),
        }
    }
    bytes
}

#[tokio::test]
async fn test_cat_echoes_input() {
    let Some(session) = start_or_skip("/bin/cat", &[], SessionOptions::default()) else {
        return;
    };
    let session = Arc::new(session);

    let (sink, mut out) = outbound_channel();
    let (tx, source) = inbound_channel();
    let bridge = tokio::spawn({
        let session = session.clone();
        async move { session.run_bridge(sink, source).await }
    });

    tx.send(Ok(Frame::Text("bHMK".to_string()))).unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), read_until(&mut out, b"ls"))
        .await
        .expect("echo should arrive");
    assert!(echoed.starts_with(b"ls"));

    tx.send(Ok(Frame::Close(None))).unwrap();
    let outcome = bridge.await.unwrap();

    assert_eq!(outcome.trigger, Trigger::Inbound);
    assert!(matches!(outcome.exit, PumpExit::ClientClosed));
    assert!(outcome.stop.exited);
}

#[tokio::test]
async fn test_process_exit_ends_bridge() {
    let Some(session) = start_or_skip("/bin/sh", &["-c", "printf hello"], SessionOptions::default())
    else {
        return;
    };

    let (sink, mut out) = outbound_channel();
    let (_tx, source) = inbound_channel();

    let outcome = tokio::time::timeout(Duration::from_secs(10), session.run_bridge(sink, source))
        .await
        .expect("bridge should return once the process exits");

    assert_eq!(outcome.trigger, Trigger::Outbound);
    assert!(matches!(outcome.exit, PumpExit::ProcessExited));
    assert_eq!(outcome.stop.exit_code, Some(0));

    let (bytes, close_code) = drain(&mut out).await;
    assert_eq!(bytes, b"hello");
    assert_eq!(close_code, Some(1000));
}

#[tokio::test]
async fn test_output_after_idle_period_is_delivered() {
    let Some(session) = start_or_skip("/bin/sh", &["-c", "sleep 1; printf late"], SessionOptions::default())
    else {
        return;
    };

    let (sink, mut out) = outbound_channel();
    let (_tx, source) = inbound_channel();
    let outcome = tokio::time::timeout(Duration::from_secs(10), session.run_bridge(sink, source))
        .await
        .expect("bridge should return once the process exits");

    assert!(matches!(outcome.exit, PumpExit::ProcessExited));
    let (bytes, close_code) = drain(&mut out).await;
    assert_eq!(bytes, b"late");
    assert_eq!(close_code, Some(1000));
}

#[tokio::test]
async fn test_output_round_trip_with_small_buffer() {
    let options = SessionOptions {
        read_buffer_size: 7,
        ..SessionOptions::default()
    };
    let script = "i=0; while [ $i -lt 20 ]; do printf 'line-%02d|' $i; i=$((i+1)); done";
    let Some(session) = start_or_skip("/bin/sh", &["-c", script], options) else {
        return;
    };

    let (sink, mut out) = outbound_channel();
    let (_tx, source) = inbound_channel();
    session.run_bridge(sink, source).await;

    let mut expected = String::new();
    for i in 0..20 {
        expected.push_str(&format!("line-{:02}|", i));
    }
    let (bytes, _) = drain(&mut out).await;
    assert_eq!(String::from_utf8_lossy(&bytes), expected);
}

#[tokio::test]
async fn test_invalid_payload_is_skipped() {
    let reporter = RecordingReporter::new();
    let Some(session) = start_or_skip("/bin/cat", &[], SessionOptions::default()) else {
        return;
    };
    let session = Arc::new(session.with_reporter(Arc::new(reporter.clone())));

    let (sink, mut out) = outbound_channel();
    let (tx, source) = inbound_channel();
    let bridge = tokio::spawn({
        let session = session.clone();
        async move { session.run_bridge(sink, source).await }
    });

    tx.send(Ok(Frame::Text("not base64!!".to_string()))).unwrap();
    tx.send(Ok(Frame::Text(encode_chunk(b"still-alive\n")))).unwrap();

    tokio::time::timeout(Duration::from_secs(5), read_until(&mut out, b"still-alive"))
        .await
        .expect("valid frame after a bad one should be written");
    assert_eq!(reporter.count_of("payload_decode"), 1);

    drop(tx);
    let outcome = bridge.await.unwrap();
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn test_binary_frame_closes_with_protocol_error() {
    let Some(session) = start_or_skip("/bin/cat", &[], SessionOptions::default()) else {
        return;
    };

    let (sink, mut out) = outbound_channel();
    let (tx, source) = inbound_channel();
    tx.send(Ok(Frame::Binary(b"ls\n".to_vec()))).unwrap();

    let outcome = session.run_bridge(sink, source).await;

    assert_eq!(outcome.trigger, Trigger::Inbound);
    assert_eq!(
        outcome.exit.error().map(|e| e.error_type()),
        Some("protocol_violation")
    );
    assert!(outcome.stop.exited);
    let (_, close_code) = drain(&mut out).await;
    assert_eq!(close_code, Some(1003));
}

#[tokio::test]
async fn test_hangup_resistant_process_is_killed() {
    let options = SessionOptions {
        exit_grace: Duration::from_millis(200),
        ..SessionOptions::default()
    };
    let Some(session) = start_or_skip("/bin/sh", &["-c", "trap '' HUP; echo ready; exec sleep 30"], options)
    else {
        return;
    };
    let session = Arc::new(session);

    let (sink, mut out) = outbound_channel();
    let (tx, source) = inbound_channel();
    let bridge = tokio::spawn({
        let session = session.clone();
        async move { session.run_bridge(sink, source).await }
    });

    tokio::time::timeout(Duration::from_secs(5), read_until(&mut out, b"ready"))
        .await
        .expect("process should start");

    let started = Instant::now();
    drop(tx);
    let outcome = bridge.await.unwrap();

    assert!(outcome.stop.forced);
    assert!(outcome.stop.exited);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_websocket_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = BridgeConfig {
        listen_addr: addr.to_string(),
        command: "/bin/cat".to_string(),
        args: Vec::new(),
        static_root: std::env::temp_dir(),
        session: SessionOptions::default(),
    };
    let server = BridgeServer::new(config);
    let registry = server.registry().clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = shutdown_rx.await;
    }));

    let url = format!("ws://{}/pty", addr);
    let mut ws = match tokio_tungstenite::connect_async(url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            // 服务端无法分配 PTY 时返回 500
            println!("PTY creation failed (may be expected in CI): {}", e);
            let _ = shutdown_tx.send(());
            let _ = handle.await;
            return;
        }
    };
    assert_eq!(registry.count().await, 1);

    ws.send(Message::Text(encode_chunk(b"ls\n"))).await.unwrap();

    let mut echoed = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !echoed.windows(2).any(|w| w == b"ls") {
        assert!(Instant::now() < deadline, "echo should arrive");
        match ws.next().await {
            Some(Ok(Message::Text(payload))) => echoed.extend(decode_payload(&payload).unwrap()),
            Some(Ok(_)) => {}
            other => panic!("unexpected message: {:?}", other),
        }
    }

    ws.send(Message::Binary(vec![0])).await.unwrap();
    let mut close_code = None;
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Close(frame) = message {
            close_code = frame.map(|f| u16::from(f.code));
            break;
        }
    }
    assert_eq!(close_code, Some(1003));

    let deadline = Instant::now() + Duration::from_secs(5);
    while registry.count().await > 0 {
        assert!(Instant::now() < deadline, "session should be removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let _ = shutdown_tx.send(());
    handle.await.unwrap().unwrap();
}
