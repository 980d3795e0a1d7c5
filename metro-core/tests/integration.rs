//! Integration tests: full client lifecycle, commands interleaved with
//! telemetry, and error scenarios over a real TCP connection on localhost.

use std::time::Duration;

use metro_core::{
    Action, ClientConfig, Connection, ConnectionInfo, Correlator, FrameTransport, MessageType,
    MetroClient, MetroError, NetworkConfig, Session, StopOutcome, TelemetryConfig,
    TelemetrySample,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

// ── Helpers ──────────────────────────────────────────────────────

const TOKEN: &str = "tok-42";

/// Spin up a listener on an OS-assigned port and return the connection
/// info.  The listener is returned so the caller can accept on it.
async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    (listener, info)
}

/// A small metro server: accepts `admin`/`metro123`, acknowledges the
/// four known actions, and pushes telemetry every `push_every`.
///
/// Returns every line it received once the client hangs up.
async fn fake_server(listener: TcpListener, push_every: Option<Duration>) -> Vec<String> {
    let (stream, _) = listener.accept().await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut ticker = tokio::time::interval(push_every.unwrap_or(Duration::from_secs(3600)));
    ticker.tick().await;
    let mut speed = 40.0;
    let mut received = Vec::new();

    loop {
        let reply = tokio::select! {
            _ = ticker.tick(), if push_every.is_some() => {
                speed += 0.5;
                format!("TYPE:TELEMETRY;SPEED:{speed:.1};BATTERY:72;DIRECTION:FORWARD;STATION:5")
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                received.push(line.clone());
                respond(&line)
            }
        };
        if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
            break;
        }
    }
    received
}

fn respond(line: &str) -> String {
    if line.starts_with("TYPE:AUTH;") {
        if line == "TYPE:AUTH;USER:admin;PASS:metro123" {
            format!("TYPE:AUTH_OK;TOKEN:{TOKEN}")
        } else {
            "TYPE:ERR;REASON:Invalid credentials".to_string()
        }
    } else if let Some(rest) = line.strip_prefix("TYPE:CMD;") {
        let known = Action::KNOWN
            .iter()
            .any(|a| rest == format!("TOKEN:{TOKEN};ACTION:{a}"));
        if known {
            "TYPE:ACK".to_string()
        } else {
            "TYPE:ERR;REASON:Unknown command".to_string()
        }
    } else if line.starts_with("TYPE:LOGOUT;") {
        "TYPE:ACK".to_string()
    } else {
        "TYPE:ERR;REASON:Bad request".to_string()
    }
}

fn test_config() -> ClientConfig {
    ClientConfig {
        network: NetworkConfig {
            connect_timeout_ms: 1000,
            read_timeout_ms: 1000,
            max_attempts: 5,
        },
        telemetry: TelemetryConfig {
            poll_interval_ms: 50,
            stop_grace_ms: 1000,
            buffer_size: 16,
        },
    }
}

// ── Client lifecycle ─────────────────────────────────────────────

#[tokio::test]
async fn test_full_session_lifecycle() {
    let (listener, info) = ephemeral_listener().await;
    let server = tokio::spawn(fake_server(listener, Some(Duration::from_millis(20))));

    let mut client = MetroClient::new(test_config());
    assert_ok!(client.connect(info.host(), info.port()).await);
    assert!(client.is_connected());
    assert!(matches!(
        client.connect(info.host(), info.port()).await,
        Err(MetroError::AlreadyConnected)
    ));

    let token = assert_ok!(client.authenticate("admin", "metro123").await);
    assert_eq!(token.as_str(), TOKEN);

    // Commands succeed while telemetry is streaming and while listening.
    assert_ok!(client.issue_command(&Action::SpeedUp).await);

    let (tx, mut rx) = mpsc::unbounded_channel::<TelemetrySample>();
    assert!(assert_ok!(client.start_listening(tx)));

    for action in Action::KNOWN {
        assert_ok!(client.issue_command(&action).await);
    }

    let sample = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout")
        .expect("listener stopped");
    assert_eq!(sample.battery_percent, 72);
    assert_eq!(sample.station, "5");

    assert_eq!(client.stop_listening().await, StopOutcome::Stopped);
    assert_eq!(client.stop_listening().await, StopOutcome::NotRunning);

    assert_ok!(client.logout().await);
    assert!(!client.session().is_authenticated());
    assert!(matches!(
        client.issue_command(&Action::SpeedUp).await,
        Err(MetroError::NotAuthenticated)
    ));

    client.close().await;
    client.close().await;
    assert!(!client.is_connected());

    let received = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(received.first().unwrap(), "TYPE:AUTH;USER:admin;PASS:metro123");
    assert_eq!(received.last().unwrap(), &format!("TYPE:LOGOUT;TOKEN:{TOKEN}"));
    assert_eq!(
        received.iter().filter(|l| l.starts_with("TYPE:CMD")).count(),
        5
    );
}

#[tokio::test]
async fn test_invalid_credentials() {
    let (listener, info) = ephemeral_listener().await;
    tokio::spawn(fake_server(listener, None));

    let mut client = MetroClient::new(test_config());
    assert_ok!(client.connect(info.host(), info.port()).await);

    let err = assert_err!(client.authenticate("admin", "wrong").await);
    assert!(matches!(err, MetroError::Rejected { reason: Some(ref r) } if r == "Invalid credentials"));
    assert!(!client.session().is_authenticated());

    // A later attempt with the right password still works.
    assert_ok!(client.authenticate("admin", "metro123").await);
    client.close().await;
}

#[tokio::test]
async fn test_unknown_command_is_rejected() {
    let (listener, info) = ephemeral_listener().await;
    tokio::spawn(fake_server(listener, None));

    let mut client = MetroClient::new(test_config());
    assert_ok!(client.connect(info.host(), info.port()).await);
    assert_ok!(client.authenticate("admin", "metro123").await);

    let err = assert_err!(client.issue_command(&Action::from("TELEPORT")).await);
    assert!(matches!(err, MetroError::Rejected { reason: Some(ref r) } if r == "Unknown command"));
    assert!(client.session().is_authenticated());
    client.close().await;
}

#[tokio::test]
async fn test_close_logs_out() {
    let (listener, info) = ephemeral_listener().await;
    let server = tokio::spawn(fake_server(listener, None));

    let mut client = MetroClient::new(test_config());
    assert_ok!(client.connect(info.host(), info.port()).await);
    assert_ok!(client.authenticate("admin", "metro123").await);
    client.close().await;

    let received = server.await.unwrap();
    assert_eq!(received.last().unwrap(), &format!("TYPE:LOGOUT;TOKEN:{TOKEN}"));
}

// ── Correlation over TCP ─────────────────────────────────────────

#[tokio::test]
async fn test_reply_after_telemetry_burst() {
    let (listener, info) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let _auth = lines.next_line().await.unwrap().unwrap();
        for _ in 0..4 {
            write
                .write_all(b"TYPE:TELEMETRY;SPEED:1;BATTERY:2\n")
                .await
                .unwrap();
        }
        write.write_all(b"TYPE:AUTH_OK;TOKEN:abc\n").await.unwrap();
        let _ = lines.next_line().await;
    });

    let mut conn = assert_ok!(Connection::connect(&info, &test_config().network).await);
    let correlator = Correlator::from_config(&test_config().network);
    let mut session = Session::new();
    let token = assert_ok!(
        session
            .authenticate(&mut conn, &correlator, "admin", "metro123")
            .await
    );
    assert_eq!(token.as_str(), "abc");

    conn.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_silent_server_gives_no_response() {
    let (listener, info) = ephemeral_listener().await;
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let mut config = test_config();
    config.network.read_timeout_ms = 100;
    let mut client = MetroClient::new(config);
    assert_ok!(client.connect(info.host(), info.port()).await);

    let err = assert_err!(client.authenticate("admin", "metro123").await);
    assert!(matches!(err, MetroError::NoResponse { .. }));
}

#[tokio::test]
async fn test_server_hangup_is_detected() {
    let (listener, info) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut conn = assert_ok!(Connection::connect(&info, &test_config().network).await);
    server.await.unwrap();

    let err = assert_err!(conn.recv(Duration::from_secs(2)).await);
    assert!(matches!(err, MetroError::ConnectionClosed));
    assert!(err.is_fatal());
}

// ── Connection errors ────────────────────────────────────────────

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nothing listens on.
    let (listener, info) = ephemeral_listener().await;
    drop(listener);

    let mut client = MetroClient::new(test_config());
    let err = assert_err!(client.connect(info.host(), info.port()).await);
    assert!(matches!(err, MetroError::Connection(_)));
    assert!(!client.is_connected());
    assert!(client.phase().is_disconnected());

    client.close().await;
}

#[tokio::test]
async fn test_frames_are_lines_on_the_wire() {
    let (listener, info) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        lines.next_line().await.unwrap().unwrap()
    });

    let mut conn = assert_ok!(Connection::connect(&info, &NetworkConfig::default()).await);
    let frame = metro_core::Frame::command("abc", "STOPNOW").unwrap();
    assert!(frame.is(MessageType::Cmd));
    assert_ok!(conn.send(frame).await);

    assert_eq!(server.await.unwrap(), "TYPE:CMD;TOKEN:abc;ACTION:STOPNOW");
    conn.close().await;
}
