//! End-to-end HTTP tests through the in-memory test client.
//!
//! Every request runs the whole dispatch path: mounts, route resolution,
//! before-request hooks, the handler and finalization.

use std::sync::Arc;

use http::StatusCode;
use kestrel::core::SetCookie;
use kestrel::prelude::*;
use kestrel::server::{APPLICATION_ERROR_BODY, METHOD_NOT_ALLOWED_BODY, NOT_FOUND_BODY};
use kestrel_test::{Multipart, TestClient};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

const KEY: &str = "an example secret key of 32 bytes!";

fn text(body: &'static str) -> Endpoint {
    Endpoint::blocking(move |_, resp| {
        resp.text(body);
        Ok(())
    })
}

#[tokio::test]
async fn test_hello_world() {
    let api = Api::new();
    api.route("/", text("hello, world!")).unwrap();
    let client = TestClient::new(&api);

    client
        .get("/")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_content_type("text/plain")
        .assert_body_eq("hello, world!");
}

#[tokio::test]
async fn test_typed_parameters() {
    let api = Api::new();
    api.route(
        "/items/{id:int}",
        Endpoint::handler(|req, mut resp| async move {
            let id = req.params().get_int("id").unwrap_or_default();
            resp.set_media(json!({ "id": id, "next": id + 1 }))?;
            Ok(resp)
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client
        .get("/items/41")
        .send()
        .await
        .assert_json_eq(&json!({ "id": 41, "next": 42 }));
    client
        .get("/items/forty")
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND)
        .assert_body_eq(NOT_FOUND_BODY);
}

#[tokio::test]
async fn test_static_route_wins_over_parameter() {
    let api = Api::new();
    api.route("/users/{name}", text("someone")).unwrap();
    api.route("/users/me", text("me")).unwrap();
    let client = TestClient::new(&api);

    client.get("/users/me").send().await.assert_body_eq("me");
    client.get("/users/ada").send().await.assert_body_eq("someone");
}

#[tokio::test]
async fn test_duplicate_route_rejected() {
    let api = Api::new();
    api.route("/dup", text("one")).unwrap();
    assert!(api.route("/dup", text("two")).is_err());
    api.add_route("/dup", text("two"), RouteOptions::new().allow_existing())
        .unwrap();
}

#[tokio::test]
async fn test_content_negotiation() {
    let api = Api::new();
    api.route(
        "/data",
        Endpoint::blocking(|_, resp| {
            resp.set_media(json!({ "hello": "world" }))?;
            Ok(())
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    let response = client.get("/data").send().await;
    response.assert_content_type("application/json");
    assert_eq!(response.json::<Value>().unwrap(), json!({ "hello": "world" }));

    let response = client.get("/data").accept("yaml").send().await;
    response.assert_content_type("application/x-yaml");
    assert_eq!(response.yaml::<Value>().unwrap(), json!({ "hello": "world" }));

    let response = client.get("/data").accept("text/html").send().await;
    response.assert_content_type("application/json");
}

#[derive(Debug, Deserialize)]
struct Order {
    item: String,
    quantity: u32,
}

#[tokio::test]
async fn test_request_media_formats() {
    let api = Api::new();
    api.route(
        "/order",
        Endpoint::handler(|req, mut resp| async move {
            let order: Order = req.media_as().await?;
            resp.text(format!("{} x{}", order.item, order.quantity));
            Ok(resp)
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client
        .post("/order")
        .json(&json!({ "item": "tea", "quantity": 2 }))
        .send()
        .await
        .assert_body_eq("tea x2");
    client
        .post("/order")
        .yaml(&json!({ "item": "cake", "quantity": 1 }))
        .send()
        .await
        .assert_body_eq("cake x1");

    let response = client.post("/order").json(&json!({ "item": "tea" })).send().await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.server_error().is_some());
}

#[tokio::test]
async fn test_form_and_query() {
    let api = Api::new();
    api.route(
        "/search",
        Endpoint::handler(|req, mut resp| async move {
            let form = req.media(None).await?;
            let fields = form.as_form().map(|f| f.get_list("tag").join(",")).unwrap_or_default();
            let page = req.query().get("page").unwrap_or("1").to_string();
            resp.text(format!("{fields}|{page}"));
            Ok(resp)
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client
        .post("/search?page=3")
        .form(&[("tag", "a"), ("tag", "b")])
        .send()
        .await
        .assert_body_eq("a,b|3");
}

#[tokio::test]
async fn test_file_upload() {
    let api = Api::new();
    api.route(
        "/upload",
        Endpoint::handler(|req, mut resp| async move {
            let media = req.media(Some("files")).await?;
            let file = media
                .part("report")
                .and_then(|p| p.as_file())
                .ok_or_else(|| anyhow::anyhow!("no file"))?;
            let title = media
                .part("title")
                .map(|p| String::from_utf8_lossy(p.content()).to_string())
                .unwrap_or_default();
            resp.set_media(json!({
                "title": title,
                "filename": file.filename,
                "content_type": file.content_type,
                "size": file.content.len(),
            }))?;
            Ok(resp)
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    let form = Multipart::new()
        .text("title", "numbers")
        .file("report", "data.csv", "text/csv", "a,b\n1,2\n");
    client
        .post("/upload")
        .multipart(form)
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json_eq(&json!({
            "title": "numbers",
            "filename": "data.csv",
            "content_type": "text/csv",
            "size": 8,
        }));
}

#[derive(Default)]
struct Visits {
    log: Mutex<Vec<&'static str>>,
}

#[tokio::test]
async fn test_resource_methods() {
    let api = Api::new();
    let visits = Arc::new(Visits::default());
    let resource = Resource::from_instance(Arc::clone(&visits))
        .on_request(|view: Arc<Visits>, _req, resp| async move {
            view.log.lock().push("request");
            Ok(resp)
        })
        .on_get(|view: Arc<Visits>, _req, mut resp| async move {
            view.log.lock().push("get");
            resp.text("got");
            Ok(resp)
        });
    api.route("/visits", resource).unwrap();
    let client = TestClient::new(&api);

    client.get("/visits").send().await.assert_body_eq("got");
    assert_eq!(*visits.log.lock(), ["request", "get"]);

    // The catch-all runs for every method.
    client.delete("/visits").send().await.assert_status(StatusCode::OK);
    assert_eq!(visits.log.lock().len(), 3);
}

#[derive(Default)]
struct Item;

#[tokio::test]
async fn test_resource_method_not_allowed() {
    let api = Api::new();
    let resource = Resource::<Item>::from_default().on_get(|_, _req, mut resp| async move {
        resp.text("item");
        Ok(resp)
    });
    api.route("/item", resource).unwrap();
    let client = TestClient::new(&api);

    client
        .post("/item")
        .send()
        .await
        .assert_status(StatusCode::METHOD_NOT_ALLOWED)
        .assert_header("allow", "GET")
        .assert_body_eq(METHOD_NOT_ALLOWED_BODY);
    assert_eq!(api.url_for("Item", Vec::<(&str, &str)>::new()).unwrap(), "/item");
}

#[tokio::test]
async fn test_before_request_hooks() {
    let api = Api::new();
    api.before_request(Callable::blocking(|req, resp| {
        if req.header("x-token") != Some("secret") {
            resp.set_status(StatusCode::UNAUTHORIZED);
        }
        resp.set_header("x-checked", "yes")?;
        Ok(())
    }));
    api.route(
        "/private",
        Endpoint::blocking(|_, resp| {
            if resp.status() != Some(StatusCode::UNAUTHORIZED) {
                resp.text("welcome");
            }
            Ok(())
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client
        .get("/private")
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED)
        .assert_header("x-checked", "yes");
    client
        .get("/private")
        .header("x-token", "secret")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body_eq("welcome");
}

#[tokio::test]
async fn test_default_route() {
    let api = Api::new();
    api.route("/known", text("known")).unwrap();
    api.add_route("/fallback", text("fallback"), RouteOptions::new().as_default())
        .unwrap();
    let client = TestClient::new(&api);

    client.get("/nowhere").send().await.assert_body_eq("fallback");
    client.get("/fallback").send().await.assert_body_eq("fallback");
    client.get("/known").send().await.assert_body_eq("known");
}

#[tokio::test]
async fn test_handler_error_is_500() {
    let api = Api::new();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    api.on_error(move |err| sink.lock().push(err.to_string()));
    api.route(
        "/broken",
        Endpoint::blocking(|_, _| Err(anyhow::anyhow!("disk full"))),
    )
    .unwrap();
    let client = TestClient::new(&api);

    let response = client.get("/broken").send().await;
    response
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR)
        .assert_body_eq(APPLICATION_ERROR_BODY);
    let err = response.server_error().unwrap();
    assert!(format!("{err:#}").contains("disk full"));
    assert_eq!(reported.lock().len(), 1);
}

#[tokio::test]
async fn test_debug_mode_shows_error() {
    let api = Api::builder().debug(true).build().unwrap();
    api.route("/broken", Endpoint::blocking(|_, _| Err(anyhow::anyhow!("disk full"))))
        .unwrap();
    let client = TestClient::new(&api);

    client
        .get("/broken")
        .send()
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR)
        .assert_body_contains("disk full");
}

#[tokio::test]
async fn test_redirect() {
    let api = Api::new();
    api.route(
        "/old",
        Endpoint::blocking(|_, resp| {
            resp.redirect("/new")?;
            Ok(())
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client
        .get("/old")
        .send()
        .await
        .assert_status(StatusCode::MOVED_PERMANENTLY)
        .assert_header("location", "/new")
        .assert_body_eq("Redirecting to: /new");
}

#[tokio::test]
async fn test_cookies() {
    let api = Api::new();
    api.route(
        "/theme/{name}",
        Endpoint::blocking(|req, resp| {
            let name = req.params().get_str("name").unwrap_or("light").to_string();
            resp.set_cookie(SetCookie::new("theme", name));
            Ok(())
        }),
    )
    .unwrap();
    api.route(
        "/theme",
        Endpoint::blocking(|req, resp| {
            resp.text(req.cookies().get("theme").unwrap_or("none").to_string());
            Ok(())
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    let response = client.get("/theme/dark").send().await;
    assert_eq!(response.cookie("theme").as_deref(), Some("dark"));
    client.get("/theme").send().await.assert_body_eq("dark");
}

#[tokio::test]
async fn test_session_round_trip_and_tampering() {
    let api = Api::builder().secret_key(KEY).build().unwrap();
    api.route(
        "/login/{user}",
        Endpoint::blocking(|req, resp| {
            let user = req.params().get_str("user").unwrap_or_default().to_string();
            resp.session_mut().insert("user", user);
            Ok(())
        }),
    )
    .unwrap();
    api.route(
        "/whoami",
        Endpoint::blocking(|req, resp| {
            let user = req.session().get_as::<String>("user");
            resp.text(user.unwrap_or_else(|| "anonymous".to_string()));
            Ok(())
        }),
    )
    .unwrap();
    let client = TestClient::new(&api);

    client.get("/whoami").send().await.assert_body_eq("anonymous");
    let response = client.get("/login/ada").send().await;
    assert!(response.cookie("Kestrel-Session").is_some());
    client.get("/whoami").send().await.assert_body_eq("ada");

    let signed = client.cookie("Kestrel-Session").unwrap();
    client.set_cookie("Kestrel-Session", format!("x{signed}"));
    client.get("/whoami").send().await.assert_body_eq("anonymous");
}

#[tokio::test]
async fn test_sessions_survive_a_restart_with_the_same_key() {
    let first = Api::builder().secret_key(KEY).build().unwrap();
    first
        .route(
            "/login",
            Endpoint::blocking(|_, resp| {
                resp.session_mut().insert("user", "ada");
                Ok(())
            }),
        )
        .unwrap();
    let cookie = TestClient::new(&first)
        .get("/login")
        .send()
        .await
        .cookie("Kestrel-Session")
        .unwrap();

    let second = Api::builder().secret_key(KEY).build().unwrap();
    second
        .route(
            "/whoami",
            Endpoint::blocking(|req, resp| {
                resp.text(req.session().get_as::<String>("user").unwrap_or_default());
                Ok(())
            }),
        )
        .unwrap();
    let client = TestClient::new(&second);
    client.set_cookie("Kestrel-Session", cookie);
    client.get("/whoami").send().await.assert_body_eq("ada");
}

#[tokio::test]
async fn test_url_for() {
    let api = Api::new();
    api.add_route(
        "/books/{id:int}/{slug}",
        text("book"),
        RouteOptions::new().named("book"),
    )
    .unwrap();

    let url = api
        .url_for("book", [("id", ParamValue::from(7)), ("slug", ParamValue::from("dune"))])
        .unwrap();
    assert_eq!(url, "/books/7/dune");
    assert!(api.url_for("missing", Vec::<(&str, &str)>::new()).is_err());
    assert!(api.url_for("book", [("id", 7)]).is_err());

    let client = TestClient::new(&api);
    client.get(&url).send().await.assert_body_eq("book");
}
