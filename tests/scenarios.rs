//! End-to-end scenarios against an in-process mock gateway speaking the
//! real wire format over a loopback TCP socket.

use std::time::Duration;

use flexi_logger::Logger;
use gwmux::{Connection, GatewayConfig, ReplyCount, Reply, Request, RequestKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Starts a logger printing info/warn/error to stderr, the way the teacher's
/// own `test_utils::init_logger` does. Safe to call from more than one test
/// in the same process: a logger is already installed on every call after
/// the first, which we just ignore.
fn init_logger() {
    let _ = Logger::try_with_env_or_str("info").unwrap().start();
}

async fn write_frame(stream: &mut TcpStream, fields: &[&str]) {
    let mut payload = Vec::new();
    for f in fields {
        payload.extend_from_slice(f.as_bytes());
        payload.push(0);
    }
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&payload).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Vec<String> {
    let mut len_buf = [0_u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0_u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    let text = String::from_utf8(payload).unwrap();
    let mut fields: Vec<String> = text.split('\0').map(str::to_owned).collect();
    if fields.last().map(String::is_empty).unwrap_or(false) {
        fields.pop();
    }
    fields
}

/// Performs the server side of the handshake and leaves the socket
/// positioned for scenario-specific traffic.
async fn server_handshake(stream: &mut TcpStream, next_valid_id: i64, accounts: &str) {
    let mut head = [0_u8; 4];
    stream.read_exact(&mut head).await.unwrap();
    assert_eq!(&head, b"API\0");
    let mut len_buf = [0_u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut version_range = vec![0_u8; len];
    stream.read_exact(&mut version_range).await.unwrap();

    write_frame(stream, &["151", "20230101 12:00:00 UTC"]).await;

    // consume the client's start-api frame
    let _ = read_frame(stream).await;

    let nid = next_valid_id.to_string();
    write_frame(stream, &["9", "1", &nid]).await;
    write_frame(stream, &["15", "1", accounts]).await;
}

async fn mock_server(listener: TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().await.unwrap();
    stream
}

struct Ping;
impl Request for Ping {
    fn kind(&self) -> RequestKind {
        RequestKind::Static
    }
    fn reply_count(&self) -> ReplyCount {
        ReplyCount::Zero
    }
    fn write_body(&self, out: &mut Vec<u8>, req_id: i64, _server_version: i64) {
        out.extend_from_slice(format!("1\0{req_id}\0").as_bytes());
    }
}

struct OrderPlace;
impl Request for OrderPlace {
    fn kind(&self) -> RequestKind {
        RequestKind::Order
    }
    fn reply_count(&self) -> ReplyCount {
        ReplyCount::One
    }
    fn write_body(&self, out: &mut Vec<u8>, req_id: i64, _server_version: i64) {
        out.extend_from_slice(format!("3\0{req_id}\0AAPL\0").as_bytes());
    }
}

struct ContractLookup;
impl Request for ContractLookup {
    fn kind(&self) -> RequestKind {
        RequestKind::Ticker
    }
    fn reply_count(&self) -> ReplyCount {
        ReplyCount::Many {
            end_code: Some(gwmux::codes::CONTRACT_DATA_END),
        }
    }
    fn write_body(&self, out: &mut Vec<u8>, req_id: i64, _server_version: i64) {
        out.extend_from_slice(format!("9\0{req_id}\0AAPL\0").as_bytes());
    }
}

struct TickByTick;
impl Request for TickByTick {
    fn kind(&self) -> RequestKind {
        RequestKind::Ticker
    }
    fn reply_count(&self) -> ReplyCount {
        ReplyCount::Many { end_code: None }
    }
    fn cancelable(&self) -> bool {
        true
    }
    fn write_body(&self, out: &mut Vec<u8>, req_id: i64, _server_version: i64) {
        out.extend_from_slice(format!("{}\0{req_id}\0AAPL\0", gwmux::codes::TICK_BY_TICK).as_bytes());
    }
    fn write_cancel(&self, out: &mut Vec<u8>, req_id: i64) {
        out.extend_from_slice(
            format!("{}\0{req_id}\0", gwmux::codes::CANCEL_TICK_BY_TICK).as_bytes(),
        );
    }
}

#[tokio::test]
async fn s1_handshake_reports_negotiated_fields() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 777, "DU123").await;
        stream
    });

    let conn = Connection::connect(&addr.to_string(), 1, GatewayConfig::default())
        .await
        .unwrap();

    let info = conn.handshake_info();
    assert_eq!(info.server_version, 151);
    assert_eq!(info.next_valid_id, 777);
    assert_eq!(info.managed_accounts, vec!["DU123".to_string()]);

    server.abort();
}

#[tokio::test]
async fn s3_order_id_floor_wins_over_a_lower_server_value() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 100, "DU123").await;
        let fields = read_frame(&mut stream).await;
        // code, id, symbol
        assert_eq!(fields[1], "1024");
        write_frame(&mut stream, &["4", "2", &fields[1], "200", "filled"]).await;
    });

    let conn = Connection::connect(&addr.to_string(), 1, GatewayConfig::default())
        .await
        .unwrap();

    let mut handle = conn.request(OrderPlace).await.unwrap();
    match handle.recv().await.unwrap() {
        Reply::Error(e) => assert_eq!(e.code, 200),
        other => panic!("expected an error reply, got {other:?}"),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn s4_timeout_closes_the_channel_after_one_timeout_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 1, "DU1").await;
        let _ = read_frame(&mut stream).await;
        // never reply
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = GatewayConfig::default().with_first_reply_timeout(Duration::from_millis(200));
    let conn = Connection::connect(&addr.to_string(), 1, config).await.unwrap();

    let mut handle = conn.request(ContractLookup).await.unwrap();
    assert!(matches!(handle.recv().await, Some(Reply::Timeout)));
    assert!(handle.recv().await.is_none());

    server.abort();
}

#[tokio::test]
async fn s5_streamed_contract_data_ends_on_sentinel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 1, "DU1").await;
        let fields = read_frame(&mut stream).await;
        let id = fields[1].clone();
        for i in 0..3 {
            write_frame(&mut stream, &["10", &id, &format!("row-{i}")]).await;
        }
        write_frame(&mut stream, &["52", &id]).await;
    });

    let conn = Connection::connect(&addr.to_string(), 1, GatewayConfig::default())
        .await
        .unwrap();
    let mut handle = conn.request(ContractLookup).await.unwrap();

    let mut seen = 0;
    while let Some(reply) = handle.recv().await {
        match reply {
            Reply::Message { .. } => seen += 1,
            other => panic!("unexpected reply {other:?}"),
        }
    }
    assert_eq!(seen, 4);

    server.await.unwrap();
}

#[tokio::test]
async fn s6_cancel_writes_the_cancel_frame_and_closes_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 1, "DU1").await;
        let fields = read_frame(&mut stream).await;
        let id = fields[1].clone();
        for i in 0..10 {
            write_frame(&mut stream, &["99", &id, &format!("tick-{i}")]).await;
        }
        let cancel_fields = read_frame(&mut stream).await;
        assert_eq!(cancel_fields[0], "98");
        assert_eq!(cancel_fields[1], id);
    });

    let conn = Connection::connect(&addr.to_string(), 1, GatewayConfig::default())
        .await
        .unwrap();
    let mut handle = conn.request(TickByTick).await.unwrap();

    for _ in 0..10 {
        assert!(matches!(handle.recv().await, Some(Reply::Message { .. })));
    }

    handle.cancel().await.unwrap();
    assert!(handle.recv().await.is_none());

    tokio::time::timeout(Duration::from_millis(500), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn static_requests_never_receive_a_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 1, "DU1").await;
        let fields = read_frame(&mut stream).await;
        assert_eq!(fields[1], "0");
    });

    let conn = Connection::connect(&addr.to_string(), 1, GatewayConfig::default())
        .await
        .unwrap();
    let mut handle = conn.request(Ping).await.unwrap();
    assert!(handle.recv().await.is_none());

    server.await.unwrap();
}

#[tokio::test]
async fn readonly_config_rejects_order_requests() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut stream = mock_server(listener).await;
        server_handshake(&mut stream, 1, "DU1").await;
        stream
    });

    let config = GatewayConfig::default().with_readonly(true);
    let conn = Connection::connect(&addr.to_string(), 1, config).await.unwrap();

    let err = conn.request(OrderPlace).await.unwrap_err();
    assert!(matches!(err, gwmux::GwError::Readonly));

    server.abort();
}
