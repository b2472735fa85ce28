use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    error_handling::HandleErrorLayer,
    extract::Request,
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse},
    routing::get,
    BoxError, Extension, Router,
};
use lazy_static::lazy_static;
use minijinja::{context, Environment};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tower_steady_etag::{Fingerprinter, IdentitySeed, Sendfile, SteadyEtagLayer};
use tracing::Level;

pub const SESSION_HEADER: &str = "x-session-id";

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta name="csrf-param" content="authenticity_token">
    <meta name="csrf-token" content="{{ token }}">
    <script nonce="{{ nonce }}">console.log("hello");</script>
  </head>
  <body>
    <form method="post" action="/">
      <input type="hidden" name="authenticity_token" value="{{ token }}">
      <button type="submit">Submit</button>
    </form>
  </body>
</html>
"#;

lazy_static! {
    pub static ref TEMPLATES: Environment<'static> = {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX_TEMPLATE)
            .expect("index template must parse");
        env
    };
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

pub async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .compact()
        .init();

    let app = Router::new()
        .route("/", get(home))
        .route("/robots.txt", get(robots))
        .route("/download", get(download))
        .fallback_service(
            ServeDir::new("app") // if no files found, check your pwd to make sure it's at project root
                .fallback(ServeFile::new("app/404.html")),
        )
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_steady_etag_layer_err))
                .layer(SteadyEtagLayer::new(Fingerprinter::default())),
        )
        .layer(middleware::map_request(seed_from_session))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();
    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();
}

pub async fn handle_steady_etag_layer_err<T: Into<BoxError>>(err: T) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.into().to_string())
}

/// Stand-in for a real session layer: the session header becomes the
/// digest's identity seed
pub async fn seed_from_session(mut req: Request) -> Request {
    let seed = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(IdentitySeed::new);
    if let Some(seed) = seed {
        req.extensions_mut().insert(seed);
    }
    req
}

/// Every render carries fresh tokens, yet the ETag stays put
pub async fn home() -> axum::response::Result<Html<String>> {
    let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let template = TEMPLATES
        .get_template("index.html")
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let html = template
        .render(context! {
            token => format!("token-{n:016x}"),
            nonce => format!("nonce-{n:08x}"),
        })
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(html.into())
}

pub async fn robots() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        "User-agent: *\nDisallow:\n",
    )
}

/// Marked for sendfile delivery, so it goes out without an ETag
pub async fn download() -> impl IntoResponse {
    (
        Extension(Sendfile("app/404.html".into())),
        [(header::CONTENT_TYPE, "text/html")],
        "<!DOCTYPE html><p>not buffered</p>\n",
    )
}
