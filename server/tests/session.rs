//! End-to-end session tests over loopback TCP

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use trackwire_server::{Dispatcher, ServerConfig, SessionEvent};

const LOGON: &[u8] = b"##,imei:123456789012345,A;";

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        idle_timeout: Duration::from_millis(200),
    }
}

async fn next_event(dispatcher: &mut Dispatcher) -> SessionEvent {
    timeout(Duration::from_secs(5), dispatcher.recv())
        .await
        .expect("timed out waiting for event")
        .expect("dispatcher closed")
}

#[tokio::test]
async fn test_logon_session_events_and_acks() {
    let mut dispatcher = Dispatcher::bind(test_config()).await.expect("bind");
    let mut client = TcpStream::connect(dispatcher.local_addr())
        .await
        .expect("connect");

    client.write_all(LOGON).await.expect("write");

    let started = next_event(&mut dispatcher).await;
    let id = match started {
        SessionEvent::Started { id } => id,
        other => panic!("expected Started, got {other:?}"),
    };

    match next_event(&mut dispatcher).await {
        SessionEvent::Data { id: data_id, message } => {
            assert_eq!(data_id, id);
            assert!(message.valid);
            assert_eq!(message.imei.as_deref(), Some("123456789012345"));
            assert_eq!(message.cmd.as_deref(), Some("logon"));
        }
        other => panic!("expected Data, got {other:?}"),
    }

    // Both acknowledgments arrive on the socket, in order
    let expected = b"LOAD;**,imei:123456789012345,C,10s;";
    let mut buf = vec![0u8; expected.len()];
    timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .expect("timed out reading acks")
        .expect("read acks");
    assert_eq!(buf, expected);

    drop(client);
    match next_event(&mut dispatcher).await {
        SessionEvent::Finished { id: finished_id } => assert_eq!(finished_id, id),
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_after_logon() {
    let mut dispatcher = Dispatcher::bind(test_config()).await.expect("bind");
    let mut client = TcpStream::connect(dispatcher.local_addr())
        .await
        .expect("connect");

    // Logon split across two chunks, then a heartbeat
    client
        .write_all(b"##,imei:123456789012345,A")
        .await
        .expect("write");
    client.write_all(b";").await.expect("write");
    client.write_all(b"123456789012345;").await.expect("write");

    assert!(matches!(
        next_event(&mut dispatcher).await,
        SessionEvent::Started { .. }
    ));

    match next_event(&mut dispatcher).await {
        SessionEvent::Data { message, .. } => assert_eq!(message.cmd.as_deref(), Some("logon")),
        other => panic!("expected logon Data, got {other:?}"),
    }
    match next_event(&mut dispatcher).await {
        SessionEvent::Data { message, .. } => {
            assert_eq!(message.cmd.as_deref(), Some("heartbeat"))
        }
        other => panic!("expected heartbeat Data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_protocol_terminates_without_data() {
    let mut dispatcher = Dispatcher::bind(test_config()).await.expect("bind");
    let mut client = TcpStream::connect(dispatcher.local_addr())
        .await
        .expect("connect");

    client.write_all(b"XY,garbage;").await.expect("write");

    assert!(matches!(
        next_event(&mut dispatcher).await,
        SessionEvent::Started { .. }
    ));
    assert!(matches!(
        next_event(&mut dispatcher).await,
        SessionEvent::Finished { .. }
    ));

    // The server closed the connection
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("timed out waiting for close")
        .expect("read");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_idle_session_finishes_exactly_once() {
    let mut dispatcher = Dispatcher::bind(test_config()).await.expect("bind");
    let _client = TcpStream::connect(dispatcher.local_addr())
        .await
        .expect("connect");

    assert!(matches!(
        next_event(&mut dispatcher).await,
        SessionEvent::Started { .. }
    ));

    // No bytes sent: the idle timeout closes the session
    assert!(matches!(
        next_event(&mut dispatcher).await,
        SessionEvent::Finished { .. }
    ));

    // And nothing follows it
    let followup = timeout(Duration::from_millis(500), dispatcher.recv()).await;
    assert!(followup.is_err(), "no events expected after Finished");
}
