use std::cmp;
use std::convert::Infallible;
use std::future::{self, Future};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::StatusCode;
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::{status_response, Body, Request, Response};

/// Smallest read buffer hyper accepts.
const MIN_BUF_SIZE: usize = 8192;

/// Handles one request at a time, synchronously.
///
/// Calls run on tokio's blocking pool, so implementations are free to stat
/// and open files. Closures of the right shape are services too:
///
/// ```no_run
/// use quay::{Body, ConnectionInfo, Request, Response, Server};
///
/// #[tokio::main]
/// async fn main() -> quay::Result<()> {
///     Server::bind("127.0.0.1:3000")
///         .serve(|_req: Request, _info: ConnectionInfo| Response::new(Body::new("Hello World!")))
///         .await
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    fn call(&self, request: Request, info: ConnectionInfo) -> Response;
}

impl<F> Service for F
where
    F: Fn(Request, ConnectionInfo) -> Response + Send + Sync + 'static,
{
    fn call(&self, request: Request, info: ConnectionInfo) -> Response {
        self(request, info)
    }
}

/// Addresses of the connection a request arrived on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectionInfo {
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

impl ConnectionInfo {
    fn from_stream(stream: &AddrStream) -> Self {
        Self {
            peer_addr: stream.remote_addr(),
            local_addr: stream.local_addr(),
        }
    }
}

enum Listen {
    Addr(String),
    Tcp(TcpListener),
}

/// An HTTP server that drives a [`Service`].
pub struct Server {
    listen: Listen,
    config: ServerConfig,
}

impl Server {
    /// A server for `addr` with default settings.
    pub fn bind(addr: impl Into<String>) -> Self {
        Self {
            listen: Listen::Addr(addr.into()),
            config: ServerConfig::default(),
        }
    }

    /// A server for `config.host:config.port` using all of `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            listen: Listen::Addr(config.listen_addr()),
            config: config.clone(),
        }
    }

    /// A server on an already bound listener, e.g. one on port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listen: Listen::Tcp(listener),
            config: ServerConfig::default(),
        }
    }

    /// Replaces the HTTP settings, keeping the listen address.
    pub fn with_config(mut self, config: &ServerConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Serves until Ctrl-C or SIGTERM, then drains in-flight requests.
    pub async fn serve<S: Service>(self, service: S) -> Result<()> {
        self.serve_with_shutdown(service, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains in-flight requests for
    /// at most the configured shutdown timeout.
    pub async fn serve_with_shutdown<S, F>(self, service: S, signal: F) -> Result<()>
    where
        S: Service,
        F: Future<Output = ()>,
    {
        let listener = match self.listen {
            Listen::Tcp(listener) => listener,
            Listen::Addr(addr) => TcpListener::bind(resolve(&addr)?)?,
        };
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let config = self.config;

        let service = Arc::new(service);
        let make_service = make_service_fn(move |stream: &AddrStream| {
            let info = ConnectionInfo::from_stream(stream);
            let service = Arc::clone(&service);
            async move {
                Ok::<_, Infallible>(service_fn(move |request: hyper::Request<hyper::Body>| {
                    let service = Arc::clone(&service);
                    async move { Ok::<_, Infallible>(dispatch(service, request, info).await) }
                }))
            }
        });

        let builder = hyper::Server::from_tcp(listener)?
            .http1_keepalive(config.http1_keep_alive)
            .http1_half_close(config.http1_half_close)
            .http1_max_buf_size(cmp::max(config.http1_max_buf_size, MIN_BUF_SIZE))
            .http1_title_case_headers(config.http1_title_case_headers)
            .http1_preserve_header_case(config.http1_preserve_header_case)
            .http1_only(config.http1_only);
        #[cfg(feature = "http2")]
        let builder = builder.http2_only(config.http2_only);

        let (signalled, drain_started) = oneshot::channel();
        let graceful = builder
            .serve(make_service)
            .with_graceful_shutdown(async move {
                signal.await;
                log::info!("shutdown signal received, draining connections");
                let _ = signalled.send(());
            });
        log::info!("listening on http://{local_addr}");

        let timeout = config.shutdown_timeout();
        let deadline = async move {
            if drain_started.await.is_err() {
                future::pending::<()>().await;
            }
            tokio::time::sleep(timeout).await;
        };

        tokio::select! {
            result = graceful => result?,
            () = deadline => {
                log::warn!("connections still open after {timeout:?}, shutting down anyway");
            }
        }
        log::info!("server on {local_addr} stopped");
        Ok(())
    }

    /// Builds a multi-threaded runtime sized from `config` and serves on it
    /// until shutdown.
    pub fn run<S: Service>(config: &ServerConfig, service: S) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(cmp::max(config.max_workers, 1))
            .thread_keep_alive(config.worker_keep_alive())
            .build()?;
        runtime.block_on(Self::from_config(config).serve(service))
    }
}

/// Runs the service on the blocking pool and converts its response.
async fn dispatch<S: Service>(
    service: Arc<S>,
    request: hyper::Request<hyper::Body>,
    info: ConnectionInfo,
) -> hyper::Response<hyper::Body> {
    let request = request.map(Body);
    let response = match tokio::task::spawn_blocking(move || service.call(request, info)).await {
        Ok(response) => response,
        Err(err) => {
            log::error!("request handler for {} failed: {}", info.peer_addr, err);
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    response.map(Body::into_inner)
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| Error::InvalidAddress(addr.to_string()))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl-C: {err}");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::error!("failed to listen for SIGTERM: {err}");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
