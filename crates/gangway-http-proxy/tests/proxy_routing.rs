//! End-to-end routing tests.
//!
//! These tests bind real loopback upstreams and drive the router handler
//! the way the serving loop does: request in, `StageOutcome` out.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use gangway_http_proxy::config::ConnectionPoolConfig;
use gangway_http_proxy::pipeline::{empty_body, full_body, ProxyBody, StageOutcome};
use gangway_http_proxy::proxy::client::create_http_client;
use gangway_http_proxy::route::ExcludeMatcher;
use gangway_http_proxy::{
    PathMode, ProxyError, RedirectPolicy, RouteOptions, Router, RouterHandler,
};

/// Bind a loopback upstream that answers with `handler`.
async fn spawn_upstream<F>(handler: F) -> SocketAddr
where
    F: Fn(&Request<Incoming>) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler(&req)) }
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

/// Bind a loopback upstream that echoes the request body back.
async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(|req: Request<Incoming>| async move {
                    let bytes = req.into_body().collect().await.unwrap().to_bytes();
                    Ok::<_, Infallible>(Response::new(Full::new(bytes)))
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn build_handler(router: Router) -> RouterHandler {
    router
        .build_handler(create_http_client(&ConnectionPoolConfig::default()))
        .unwrap()
}

fn request(method: Method, uri: &str) -> Request<ProxyBody> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(empty_body())
        .unwrap()
}

async fn body_string(response: Response<ProxyBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_forwards_matching_request() {
    let upstream = spawn_upstream(|req| {
        Response::builder()
            .header("x-seen-path", req.uri().path())
            .header(
                "x-seen-host",
                req.headers()
                    .get(header::HOST)
                    .cloned()
                    .unwrap_or_else(|| "missing".parse().unwrap()),
            )
            .body(Full::new(Bytes::from("hello from upstream")))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/api",
                &format!("http://{upstream}/base"),
                RouteOptions {
                    path_mode: PathMode::Root,
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let outcome = handler
        .handle(request(Method::GET, "/api/Users/Me"))
        .await
        .unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };

    assert_eq!(response.status(), StatusCode::OK);
    // Remainder keeps the request's casing and lands after the target path.
    assert_eq!(
        response.headers().get("x-seen-path").unwrap(),
        "/base/Users/Me"
    );
    assert_eq!(
        response.headers().get("x-seen-host").unwrap(),
        upstream.to_string().as_str()
    );
    assert_eq!(body_string(response).await, "hello from upstream");
}

#[tokio::test]
async fn test_case_insensitive_path_match() {
    let upstream = spawn_upstream(|_| Response::new(Full::new(Bytes::from("ok")))).await;

    let handler = build_handler(
        Router::new()
            .get(
                "/api/health",
                &format!("http://{upstream}/health"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    let outcome = handler
        .handle(request(Method::GET, "/API/Health"))
        .await
        .unwrap();
    assert!(matches!(outcome, StageOutcome::Responded(_)));
}

#[tokio::test]
async fn test_method_gate_declines() {
    let upstream = spawn_upstream(|_| Response::new(Full::new(Bytes::from("ok")))).await;

    let handler = build_handler(
        Router::new()
            .post(
                "/api",
                &format!("http://{upstream}/"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    let outcome = handler.handle(request(Method::GET, "/api")).await.unwrap();
    let StageOutcome::Continue(req) = outcome else {
        panic!("expected fallthrough");
    };
    assert_eq!(req.uri(), "/api");
}

#[tokio::test]
async fn test_registration_order_wins_over_specificity() {
    let upstream_a =
        spawn_upstream(|_| Response::new(Full::new(Bytes::from("first route")))).await;
    let upstream_b = dead_addr().await;

    let handler = build_handler(
        Router::new()
            .get(
                "/api",
                &format!("http://{upstream_a}/a"),
                RouteOptions {
                    path_mode: PathMode::Root,
                    ..Default::default()
                },
            )
            .unwrap()
            .get(
                "/api/health",
                &format!("http://{upstream_b}/b"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    // The prefix route registered first claims the request even though the
    // second route is the more specific match.
    let outcome = handler
        .handle(request(Method::GET, "/api/health"))
        .await
        .unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(body_string(response).await, "first route");
}

#[tokio::test]
async fn test_upstream_404_falls_through() {
    let upstream = spawn_upstream(|_| {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("upstream 404 page")))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/docs",
                &format!("http://{upstream}/docs"),
                RouteOptions {
                    path_mode: PathMode::Root,
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let outcome = handler
        .handle(request(Method::GET, "/docs/missing"))
        .await
        .unwrap();
    let StageOutcome::Continue(req) = outcome else {
        panic!("the upstream 404 must not be relayed");
    };
    assert_eq!(req.uri(), "/docs/missing");
}

#[tokio::test]
async fn test_excluded_path_falls_through() {
    let upstream = spawn_upstream(|_| Response::new(Full::new(Bytes::from("ok")))).await;

    let handler = build_handler(
        Router::new()
            .get(
                "/api",
                &format!("http://{upstream}/"),
                RouteOptions {
                    path_mode: PathMode::Root,
                    exclude_paths: vec![ExcludeMatcher::literal("/api/admin")],
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let outcome = handler
        .handle(request(Method::GET, "/api/admin"))
        .await
        .unwrap();
    assert!(matches!(outcome, StageOutcome::Continue(_)));

    // Paths outside the exclusion are still forwarded.
    let outcome = handler
        .handle(request(Method::GET, "/api/users"))
        .await
        .unwrap();
    assert!(matches!(outcome, StageOutcome::Responded(_)));
}

#[tokio::test]
async fn test_rewrite_policy_translates_same_origin_301() {
    let upstream = spawn_upstream(|req| {
        let host = req.headers().get(header::HOST).unwrap().to_str().unwrap();
        Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(header::LOCATION, format!("http://{host}/base/sub"))
            .body(Full::new(Bytes::new()))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/ext",
                &format!("http://{upstream}/base"),
                RouteOptions {
                    redirect: RedirectPolicy::Rewrite,
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let outcome = handler.handle(request(Method::GET, "/ext")).await.unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/ext/sub");
}

#[tokio::test]
async fn test_rewrite_policy_relays_foreign_origin_301() {
    let upstream = spawn_upstream(|_| {
        Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(header::LOCATION, "https://other.example/sub")
            .body(Full::new(Bytes::new()))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/ext",
                &format!("http://{upstream}/base"),
                RouteOptions {
                    redirect: RedirectPolicy::Rewrite,
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let outcome = handler.handle(request(Method::GET, "/ext")).await.unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://other.example/sub"
    );
}

#[tokio::test]
async fn test_forward_policy_relays_redirect_untouched() {
    let upstream = spawn_upstream(|_| {
        Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(header::LOCATION, "/base/sub")
            .body(Full::new(Bytes::new()))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/ext",
                &format!("http://{upstream}/base"),
                RouteOptions {
                    redirect: RedirectPolicy::Forward,
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let outcome = handler.handle(request(Method::GET, "/ext")).await.unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/base/sub");
}

#[tokio::test]
async fn test_follow_policy_resolves_redirect() {
    let upstream = spawn_upstream(|req| {
        if req.uri().path() == "/base" {
            Response::builder()
                .status(StatusCode::FOUND)
                .header(header::LOCATION, "/base/final")
                .body(Full::new(Bytes::new()))
                .unwrap()
        } else {
            Response::new(Full::new(Bytes::from("final")))
        }
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/ext",
                &format!("http://{upstream}/base"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    let outcome = handler.handle(request(Method::GET, "/ext")).await.unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };
    // The client of this hop never sees the intermediate redirect.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "final");
}

#[tokio::test]
async fn test_request_body_streams_to_upstream() {
    let upstream = spawn_echo_upstream().await;

    let handler = build_handler(
        Router::new()
            .post(
                "/submit",
                &format!("http://{upstream}/intake"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    let req = Request::builder()
        .method(Method::POST)
        .uri("/submit")
        .body(full_body("payload bytes"))
        .unwrap();

    let outcome = handler.handle(req).await.unwrap();
    let StageOutcome::Responded(response) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(body_string(response).await, "payload bytes");
}

#[tokio::test]
async fn test_unreachable_upstream_is_an_error() {
    let upstream = dead_addr().await;

    let handler = build_handler(
        Router::new()
            .get(
                "/api",
                &format!("http://{upstream}/"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    let result = handler.handle(request(Method::GET, "/api")).await;
    assert!(matches!(result, Err(ProxyError::UpstreamUnavailable(_))));
}

#[tokio::test]
async fn test_handler_is_shared_across_tasks() {
    let upstream = spawn_upstream(|req| {
        Response::builder()
            .header("x-seen-path", req.uri().path())
            .body(Full::new(Bytes::from("ok")))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/api",
                &format!("http://{upstream}/base"),
                RouteOptions {
                    path_mode: PathMode::Root,
                    ..Default::default()
                },
            )
            .unwrap(),
    );

    let tasks = (0..8).map(|i| {
        let handler = handler.clone();
        tokio::spawn(async move {
            let outcome = handler
                .handle(request(Method::GET, &format!("/api/item/{i}")))
                .await
                .unwrap();
            let StageOutcome::Responded(response) = outcome else {
                panic!("expected a response");
            };
            assert_eq!(
                response.headers().get("x-seen-path").unwrap(),
                format!("/base/item/{i}").as_str()
            );
        })
    });

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
}

#[tokio::test]
async fn test_percent_encoded_path_matches() {
    let upstream = spawn_upstream(|req| {
        Response::builder()
            .header("x-seen-path", req.uri().path())
            .body(Full::new(Bytes::from("ok")))
            .unwrap()
    })
    .await;

    let handler = build_handler(
        Router::new()
            .get(
                "/files and folders",
                &format!("http://{upstream}/store"),
                RouteOptions::default(),
            )
            .unwrap(),
    );

    let outcome = handler
        .handle(request(Method::GET, "/files%20and%20folders"))
        .await
        .unwrap();
    assert!(matches!(outcome, StageOutcome::Responded(_)));
}
