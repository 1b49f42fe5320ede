//! Serves a built web app: client assets, prerendered pages, and a small
//! router standing in for the server-side renderer.
//!
//! ```text
//! QUAY_SERVED_ROOT=build/client QUAY_ENABLE_GZIP=true cargo run --example serve
//! ```
//!
//! Prerendered pages are read from `build/prerendered` unless
//! `PRERENDERED_ROOT` says otherwise.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use matchit::Router;
use quay::hyper::StatusCode;
use quay::{
    immutable_under, AssetConfig, Assets, Body, Chain, ConnectionInfo, Prerendered, Request,
    Response, ResponseBuilder, Server, Service, Settings,
};

/// A route handler; the second argument is the matched path parameter, if any.
type Handler = Box<dyn Fn(&Request, Option<&str>) -> Response + Send + Sync>;

/// Dynamic routes, reached only when no file matched.
struct Renderer {
    router: Router<Handler>,
    rendered: AtomicUsize,
}

impl Renderer {
    fn new() -> Result<Self, matchit::InsertError> {
        let mut router = Router::new();

        router.insert(
            "/api/health",
            Box::new(|_: &Request, _: Option<&str>| Response::new(Body::new("ok"))) as Handler,
        )?;
        router.insert(
            "/hello/:name",
            Box::new(|_: &Request, name: Option<&str>| {
                let name = name.unwrap_or("world");
                Response::new(Body::new(format!("<h1>Hello, {name}!</h1>")))
            }) as Handler,
        )?;

        Ok(Self {
            router,
            rendered: AtomicUsize::new(0),
        })
    }
}

impl Service for Renderer {
    fn call(&self, request: Request, info: ConnectionInfo) -> Response {
        let path = request.uri().path().to_string();
        let Ok(matched) = self.router.at(&path) else {
            log::info!("{} {} -> 404", info.peer_addr, path);
            return ResponseBuilder::new()
                .status(StatusCode::NOT_FOUND)
                .body(Body::new("Not Found"))
                .unwrap_or_default();
        };

        let count = self.rendered.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!("{} {} rendered (#{count})", info.peer_addr, path);
        (matched.value)(&request, matched.params.get("name"))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::new()?;

    let client = Assets::builder(settings.assets.clone())
        .on_headers(immutable_under("/_app/immutable/"))
        .build()?;

    let prerendered_root = env::var_os("PRERENDERED_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("build/prerendered"));
    let mut prerendered_config = AssetConfig::new(prerendered_root);
    prerendered_config.enable_gzip = settings.assets.enable_gzip;
    prerendered_config.enable_brotli = settings.assets.enable_brotli;
    prerendered_config.enable_etag = settings.assets.enable_etag;
    let prerendered = Prerendered::discover(Assets::new(prerendered_config)?);

    let app = Chain::new()
        .layer(client)
        .layer(prerendered)
        .endpoint(Renderer::new()?);

    Server::run(&settings.server, app)?;
    Ok(())
}
