#![allow(clippy::return_self_not_must_use)]
#![doc = include_str!("../README.md")]

//! ## Architecture
//!
//! - [`Server`] accepts connections with hyper and runs each request's
//!   [`Service::call`] on tokio's blocking pool.
//! - [`Chain`] composes [`Layer`]s in front of an endpoint service.
//! - [`Assets`] is the delivery engine: negotiation, candidate paths, the
//!   [`AssetIndex`] or [`LiveProbe`], conditional requests and ranges.
//! - [`Prerendered`] canonicalizes trailing slashes for prerendered pages.

pub use crate::candidates::candidates;
pub use crate::chain::{Chain, Layer, Next};
pub use crate::config::{AssetConfig, ServerConfig, Settings, SpaFallback};
pub use crate::engine::{Assets, AssetsBuilder, NotFoundHandler};
pub use crate::error::{Error, Result};
pub use crate::headers::{immutable_under, FileStats, HeaderHook, HeaderPolicy};
pub use crate::http::{Body, Bytes, FileStream, Request, Response, ResponseBuilder};
pub use crate::ignore::IgnorePolicy;
pub use crate::index::{AssetEntry, AssetIndex, AssetSource, LiveProbe};
pub use crate::negotiate::{Encoding, Negotiator};
pub use crate::prerendered::Prerendered;
pub use crate::range::{compute_range, RangeOutcome, RangeWindow};
pub use crate::server::{ConnectionInfo, Server, Service};

mod candidates;
mod chain;
mod config;
mod engine;
mod error;
mod headers;
mod http;
mod ignore;
mod index;
pub mod mime;
mod negotiate;
mod prerendered;
mod range;
mod server;

// Re-export common types
pub use hyper;
