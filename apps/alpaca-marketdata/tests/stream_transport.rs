//! Stream Transport Integration Tests
//!
//! Dials each implemented backend against a local `tokio-tungstenite`
//! server and checks that both libraries honor the same connection
//! contract: binary reads, control-frame handling, deadlines, cancellation,
//! and the frame ceiling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use test_case::test_case;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

use alpaca_marketdata::infrastructure::stream::{
    Backend, CallContext, DIAL_TIMEOUT, KEEPALIVE, KeepaliveMonitor, KeepaliveTiming,
    MSGPACK_CONTENT_TYPE, TransportError, resolve_backend,
};

type ServerStream = WebSocketStream<TcpStream>;

/// Accept one websocket client and hand it to `script`.
async fn serve<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(ServerStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        script(ws).await;
    });

    (format!("ws://{addr}"), handle)
}

/// Server that stays connected but never sends anything.
async fn silent_server() -> (String, JoinHandle<()>) {
    serve(|ws| async move {
        sleep(Duration::from_secs(5)).await;
        drop(ws);
    })
    .await
}

/// Listener that accepts TCP but never answers the upgrade.
async fn mute_listener() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        sleep(Duration::from_secs(5)).await;
        drop(tcp);
    });

    (format!("ws://{addr}"), handle)
}

fn fast_timing() -> KeepaliveTiming {
    KeepaliveTiming {
        ping_period: Duration::from_millis(100),
        pong_wait: Duration::from_millis(100),
        ..KEEPALIVE
    }
}

// =============================================================================
// Backend selection
// =============================================================================

#[tokio::test]
async fn unknown_backend_is_rejected_before_dial() {
    let err = resolve_backend("unknown-x").unwrap_err();
    assert!(matches!(err, TransportError::InvalidBackend(ref id) if id == "unknown-x"));
    assert!(err.is_config());
}

#[tokio::test]
async fn unimplemented_backend_fails_without_hanging() {
    let backend = resolve_backend("fastwebsockets").unwrap();
    let ctx = CallContext::new();

    let result = timeout(
        Duration::from_millis(500),
        backend.dial(&ctx, "ws://127.0.0.1:9/never"),
    )
    .await
    .expect("dial must not hang");

    assert!(matches!(
        result,
        Err(TransportError::NotImplemented(Backend::FastWebSockets))
    ));
}

// =============================================================================
// Connection contract
// =============================================================================

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn reads_binary_messages(backend: Backend) {
    let (url, server) = serve(|mut ws| async move {
        ws.send(Message::Binary(Bytes::from_static(b"\x81\xa1T\xa1t")))
            .await
            .unwrap();
        ws.send(Message::Binary(Bytes::from_static(b"second")))
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;
    })
    .await;

    let ctx = CallContext::new();
    let conn = backend.dial(&ctx, &url).await.unwrap();

    assert_eq!(conn.read_message(&ctx).await.unwrap(), &b"\x81\xa1T\xa1t"[..]);
    assert_eq!(conn.read_message(&ctx).await.unwrap(), &b"second"[..]);

    conn.close().await.unwrap();
    server.await.unwrap();
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn handshake_declares_msgpack(backend: Backend) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let content_type = request
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = tx.send(content_type);
            Ok(response)
        };
        let _ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
    });

    let conn = backend
        .dial(&CallContext::new(), &format!("ws://{addr}"))
        .await
        .unwrap();

    assert_eq!(rx.await.unwrap().as_deref(), Some(MSGPACK_CONTENT_TYPE));
    drop(conn);
    server.await.unwrap();
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn writes_binary_and_pings(backend: Backend) {
    let (done_tx, done_rx) = oneshot::channel();
    let (url, server) = serve(|mut ws| async move {
        let first = ws.next().await.unwrap().unwrap();
        let second = ws.next().await.unwrap().unwrap();
        let _ = done_tx.send((first, second));
    })
    .await;

    let ctx = CallContext::new();
    let conn = backend.dial(&ctx, &url).await.unwrap();

    conn.write_message(&ctx, Bytes::from_static(b"subscribe"))
        .await
        .unwrap();
    conn.ping(&ctx).await.unwrap();

    let (first, second) = done_rx.await.unwrap();
    assert_eq!(first, Message::Binary(Bytes::from_static(b"subscribe")));
    assert!(matches!(second, Message::Ping(_)));
    server.await.unwrap();
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn control_frames_are_consumed(backend: Backend) {
    let (url, server) = serve(|mut ws| async move {
        ws.send(Message::Ping(Bytes::from_static(b"hb"))).await.unwrap();
        ws.send(Message::Pong(Bytes::new())).await.unwrap();
        ws.send(Message::Binary(Bytes::from_static(b"data")))
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;
    })
    .await;

    let ctx = CallContext::new();
    let conn = backend.dial(&ctx, &url).await.unwrap();

    assert_eq!(conn.read_message(&ctx).await.unwrap(), &b"data"[..]);
    server.await.unwrap();
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn silent_peer_trips_read_deadline(backend: Backend) {
    let (url, _server) = silent_server().await;
    let timing = fast_timing();

    let ctx = CallContext::new();
    let conn = backend.dial_with(&ctx, &url, timing).await.unwrap();

    let started = Instant::now();
    let err = timeout(Duration::from_secs(2), conn.read_message(&ctx))
        .await
        .expect("read must not block past the read window")
        .unwrap_err();

    assert!(matches!(err, TransportError::ReadDeadline));
    assert!(started.elapsed() <= timing.read_window() + Duration::from_millis(150));
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn control_frames_extend_read_window(backend: Backend) {
    let (url, _server) = serve(|mut ws| async move {
        for n in 0..5 {
            sleep(Duration::from_millis(150)).await;
            let frame = if n % 2 == 0 {
                Message::Pong(Bytes::new())
            } else {
                Message::Ping(Bytes::from_static(b"hb"))
            };
            ws.send(frame).await.unwrap();
        }
        sleep(Duration::from_millis(150)).await;
        ws.send(Message::Binary(Bytes::from_static(b"late")))
            .await
            .unwrap();
        sleep(Duration::from_millis(500)).await;
    })
    .await;

    let timing = fast_timing();
    let ctx = CallContext::new();
    let conn = backend.dial_with(&ctx, &url, timing).await.unwrap();

    let started = Instant::now();
    let data = timeout(Duration::from_secs(3), conn.read_message(&ctx))
        .await
        .expect("read must finish once data arrives")
        .unwrap();

    assert_eq!(data, &b"late"[..]);
    assert!(started.elapsed() > timing.read_window() * 3);
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn stalled_peer_trips_write_deadline(backend: Backend) {
    let (url, _server) = silent_server().await;
    let timing = KeepaliveTiming {
        write_wait: Duration::from_millis(200),
        ..KEEPALIVE
    };
    let ctx = CallContext::new();
    let conn = backend.dial_with(&ctx, &url, timing).await.unwrap();

    // the peer never reads, so the socket buffers fill and a write stalls
    let payload = Bytes::from(vec![0u8; 1024 * 1024]);
    let err = timeout(Duration::from_secs(4), async {
        loop {
            if let Err(e) = conn.write_message(&ctx, payload.clone()).await {
                return e;
            }
        }
    })
    .await
    .expect("writes to a stalled peer must give up");
    assert!(matches!(err, TransportError::WriteDeadline));

    let started = Instant::now();
    let err = conn.ping(&ctx).await.unwrap_err();
    assert!(matches!(err, TransportError::WriteDeadline));
    assert!(started.elapsed() <= timing.write_wait + Duration::from_millis(150));
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn dial_timeout_reports_caller_bound(backend: Backend) {
    let (url, _server) = mute_listener().await;
    let bound = Duration::from_millis(150);
    let ctx = CallContext::new().with_timeout(bound);

    let result = timeout(Duration::from_secs(2), backend.dial(&ctx, &url))
        .await
        .expect("dial must respect the caller deadline");

    match result {
        Err(TransportError::DialTimeout(waited)) => {
            assert!(waited <= bound, "reported {waited:?}");
            assert!(waited > Duration::from_millis(100), "reported {waited:?}");
            assert!(waited < DIAL_TIMEOUT);
        }
        Err(other) => panic!("expected dial timeout, got {other}"),
        Ok(_) => panic!("a mute listener must not complete the handshake"),
    }
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn caller_deadline_narrows_read_window(backend: Backend) {
    let (url, _server) = silent_server().await;
    let conn = backend
        .dial(&CallContext::new(), &url)
        .await
        .unwrap();

    let ctx = CallContext::new().with_timeout(Duration::from_millis(100));
    let err = timeout(Duration::from_secs(1), conn.read_message(&ctx))
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_deadline());
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn cancellation_unblocks_read(backend: Backend) {
    let (url, _server) = silent_server().await;
    let cancel = CancellationToken::new();
    let ctx = CallContext::with_cancel(cancel.clone());
    let conn = backend.dial(&ctx, &url).await.unwrap();

    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = timeout(Duration::from_secs(1), conn.read_message(&ctx))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, TransportError::Cancelled));
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn oversize_frame_is_rejected(backend: Backend) {
    let (url, _server) = serve(|mut ws| async move {
        ws.send(Message::Binary(Bytes::from(vec![0u8; 4096])))
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;
    })
    .await;

    let timing = KeepaliveTiming {
        max_frame_size: 1024,
        ..KEEPALIVE
    };
    let ctx = CallContext::new();
    let conn = backend
        .dial_with(&ctx, &url, timing)
        .await
        .unwrap();

    let err = conn.read_message(&ctx).await.unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge));
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn text_frame_is_rejected(backend: Backend) {
    let (url, _server) = serve(|mut ws| async move {
        ws.send(Message::text("[{\"T\":\"success\"}]")).await.unwrap();
        sleep(Duration::from_millis(200)).await;
    })
    .await;

    let ctx = CallContext::new();
    let conn = backend.dial(&ctx, &url).await.unwrap();

    let err = conn.read_message(&ctx).await.unwrap_err();
    assert!(matches!(err, TransportError::UnexpectedText));
}

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn server_close_ends_reads(backend: Backend) {
    let (url, _server) = serve(|mut ws| async move {
        ws.close(None).await.unwrap();
        sleep(Duration::from_millis(200)).await;
    })
    .await;

    let ctx = CallContext::new();
    let conn = backend.dial(&ctx, &url).await.unwrap();

    let err = conn.read_message(&ctx).await.unwrap_err();
    assert!(matches!(err, TransportError::Closed));
}

// =============================================================================
// Keepalive monitor
// =============================================================================

#[test_case(Backend::Tungstenite; "managed dial")]
#[test_case(Backend::Socket; "tuned socket")]
#[tokio::test]
async fn monitor_pings_until_cancelled(backend: Backend) {
    let (count_tx, count_rx) = oneshot::channel();
    let (url, _server) = serve(|mut ws| async move {
        let mut pings = 0usize;
        let window = sleep(Duration::from_millis(350));
        tokio::pin!(window);
        loop {
            tokio::select! {
                () = &mut window => break,
                frame = ws.next() => match frame {
                    Some(Ok(Message::Ping(_))) => pings += 1,
                    Some(Ok(_)) => {}
                    _ => break,
                },
            }
        }
        let _ = count_tx.send(pings);
        sleep(Duration::from_secs(1)).await;
    })
    .await;

    let ctx = CallContext::new();
    let conn = backend.dial(&ctx, &url).await.unwrap();
    let cancel = CancellationToken::new();

    let monitor = KeepaliveMonitor::new(conn.clone(), cancel.clone())
        .with_period(Duration::from_millis(100));
    let handle = tokio::spawn(monitor.run());

    let pings = count_rx.await.unwrap();
    assert!(pings >= 2, "expected at least two pings, saw {pings}");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
