//! Application-level tests: lifecycle events, background tasks, mounts,
//! WebSockets, GraphQL and a real listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use kestrel::prelude::*;
use kestrel_test::{TestClient, TestError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite;

const GRACE: Duration = Duration::from_secs(5);

fn recorder(log: &Arc<Mutex<Vec<String>>>, entry: &'static str) -> LifecycleHook {
    let log = Arc::clone(log);
    LifecycleHook::blocking(move || {
        log.lock().push(entry.to_string());
        Ok(())
    })
}

#[tokio::test]
async fn test_startup_and_shutdown_events() {
    let api = Api::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    api.add_event_handler("startup", recorder(&log, "open db")).unwrap();
    api.add_event_handler("startup", recorder(&log, "warm cache")).unwrap();
    api.add_event_handler("shutdown", recorder(&log, "close db")).unwrap();
    assert!(api.add_event_handler("reload", recorder(&log, "never")).is_err());

    let client = TestClient::new(&api);
    client.startup().await.unwrap();
    assert_eq!(*log.lock(), ["open db", "warm cache"]);
    client.shutdown(GRACE).await.unwrap();
    assert_eq!(*log.lock(), ["open db", "warm cache", "close db"]);
}

#[tokio::test]
async fn test_failing_startup_hook() {
    let api = Api::new();
    api.on_event(
        Event::Startup,
        LifecycleHook::new(|| async { anyhow::bail!("no database") }),
    );
    let err = TestClient::new(&api).startup().await.unwrap_err();
    assert!(err.to_string().contains("no database"));
}

#[tokio::test]
async fn test_background_task_finishes_before_shutdown_returns() {
    let api = Api::builder().workers(2).build().unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    let queue = api.background().clone();
    let counter = Arc::clone(&done);
    api.route(
        "/work",
        Endpoint::handler(move |_, mut resp| {
            let queue = queue.clone();
            let counter = Arc::clone(&counter);
            async move {
                queue.submit("slow job", move || {
                    std::thread::sleep(Duration::from_millis(50));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })?;
                resp.set_status(StatusCode::ACCEPTED);
                resp.set_media(json!({ "queued": true }))?;
                Ok(resp)
            }
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client
        .post("/work")
        .send()
        .await
        .assert_status(StatusCode::ACCEPTED)
        .assert_json_eq(&json!({ "queued": true }));
    client.shutdown(GRACE).await.unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert_eq!(api.background().pending(), 0);
}

#[tokio::test]
async fn test_slow_background_task_does_not_delay_response() {
    const TASK_SLEEP: Duration = Duration::from_secs(1);

    let api = Api::builder().workers(2).build().unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    let queue = api.background().clone();
    let counter = Arc::clone(&done);
    api.route(
        "/report",
        Endpoint::handler(move |_, mut resp| {
            let queue = queue.clone();
            let counter = Arc::clone(&counter);
            async move {
                queue.submit("build report", move || {
                    std::thread::sleep(TASK_SLEEP);
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })?;
                resp.text("building");
                Ok(resp)
            }
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    let started = Instant::now();
    client
        .get("/report")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body_eq("building");
    let elapsed = started.elapsed();
    assert!(elapsed < TASK_SLEEP / 2, "response took {elapsed:?}");
    assert_eq!(done.load(Ordering::SeqCst), 0);

    client.shutdown(GRACE).await.unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_background_task_does_not_affect_response() {
    let api = Api::new();
    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    api.background().on_complete(move |report| {
        if !report.outcome.is_success() {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    let queue = api.background().clone();
    api.route(
        "/fire",
        Endpoint::handler(move |_, mut resp| {
            let queue = queue.clone();
            async move {
                queue.submit_async("doomed", async {
                    Err::<(), _>(anyhow::anyhow!("mail server down"))
                })?;
                resp.text("sent");
                Ok(resp)
            }
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client.get("/fire").send().await.assert_status(StatusCode::OK).assert_body_eq("sent");
    client.shutdown(GRACE).await.unwrap();
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mounted_application() {
    let inner = Api::new();
    inner
        .route(
            "/page",
            Endpoint::blocking(|req, resp| {
                resp.text(format!("{}|{}", req.root_path(), req.path()));
                Ok(())
            }),
        )
        .unwrap();
    let outer = Api::new();
    outer
        .route(
            "/{name}",
            Endpoint::blocking(|_, resp| {
                resp.text("outer");
                Ok(())
            }),
        )
        .unwrap();
    outer.mount("/v2", Arc::new(inner)).unwrap();
    let client = TestClient::new(&outer);

    client.get("/v2/page").send().await.assert_body_eq("/v2|/page");
    client.get("/v2page").send().await.assert_body_eq("outer");
    client
        .get("/v2/missing")
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

fn chat_api() -> Api {
    let api = Api::new();
    api.before_ws_request(WsHook::new(|mut ws: WebSocket| async move {
        if ws.query().get("token") != Some("letmein") {
            ws.close(CloseCode::PolicyViolation).await?;
            anyhow::bail!("missing token");
        }
        ws.accept().await?;
        Ok(ws)
    }));
    api.websocket_route(
        "/chat/{room}",
        Endpoint::websocket(|mut ws: WebSocket| async move {
            let room = ws.params().get_str("room").unwrap_or_default().to_string();
            ws.send_json(&json!({ "joined": room })).await?;
            while let Ok(text) = ws.receive_text().await {
                ws.send_text(format!("[{room}] {text}")).await?;
            }
            Ok(())
        }),
    )
    .unwrap();
    api
}

#[tokio::test]
async fn test_websocket_chat() {
    let api = chat_api();
    let client = TestClient::new(&api);

    let mut ws = client.websocket("/chat/lobby?token=letmein").await.unwrap();
    assert_eq!(ws.receive_json::<Value>().await.unwrap(), json!({ "joined": "lobby" }));
    ws.send_text("hi").unwrap();
    assert_eq!(ws.receive_text().await.unwrap(), "[lobby] hi");
    ws.close(CloseCode::Normal).unwrap();
    assert!(ws.server_error().await.is_none());
}

#[tokio::test]
async fn test_websocket_hook_rejects() {
    let api = chat_api();
    let client = TestClient::new(&api);

    let err = client.websocket("/chat/lobby").await.unwrap_err();
    assert!(matches!(err, TestError::WebSocketRejected(Some(1008))));

    let err = client.websocket("/nowhere?token=letmein").await.unwrap_err();
    assert!(matches!(err, TestError::WebSocketRejected(Some(1000))));
}

struct Library;

#[async_trait]
impl GraphQlSchema for Library {
    async fn execute(&self, request: GraphQlRequest) -> Value {
        if request.query.contains("books") {
            json!({ "data": { "books": ["Dune", "Emma"] } })
        } else {
            json!({ "errors": [{ "message": "unknown field" }] })
        }
    }
}

#[tokio::test]
async fn test_graphql_view() {
    let api = Api::new();
    api.route("/graphql", GraphQlView::new(Library)).unwrap();
    let client = TestClient::new(&api);

    client
        .post("/graphql")
        .json(&json!({ "query": "{ books }" }))
        .send()
        .await
        .assert_json_eq(&json!({ "data": { "books": ["Dune", "Emma"] } }));
    client
        .get("/graphql?q=%7B%20books%20%7D")
        .send()
        .await
        .assert_json_eq(&json!({ "data": { "books": ["Dune", "Emma"] } }));
    client
        .post("/graphql")
        .json(&json!({ "operationName": "Books" }))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    client
        .get("/graphql")
        .accept("text/html")
        .send()
        .await
        .assert_content_type("text/html")
        .assert_body_contains("GraphiQL");
    assert_eq!(api.url_for("GraphQlView", Vec::<(&str, &str)>::new()).unwrap(), "/graphql");
}

#[tokio::test]
async fn test_serve_over_tcp() {
    let api = Arc::new(chat_api());
    api.route(
        "/ping",
        Endpoint::blocking(|_, resp| {
            resp.text("pong");
            Ok(())
        }),
    )
    .unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    api.add_event_handler("startup", recorder(&log, "started")).unwrap();
    api.add_event_handler("shutdown", recorder(&log, "stopped")).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = {
        let api = Arc::clone(&api);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { api.serve_listener(listener, shutdown).await })
    };

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /ping HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.ends_with("pong"));
    assert_eq!(*log.lock(), ["started"]);

    let (mut ws, response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/chat/den?token=letmein"))
            .await
            .unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    let joined = ws.next().await.unwrap().unwrap();
    assert_eq!(joined.into_text().unwrap().as_str(), r#"{"joined":"den"}"#);
    ws.send(tungstenite::Message::Text("hey".into())).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "[den] hey");
    ws.close(None).await.unwrap();

    shutdown.trigger();
    server.await.unwrap().unwrap();
    assert_eq!(*log.lock(), ["started", "stopped"]);
}
