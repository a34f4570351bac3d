//! Async client for the v3io multi-tenant object/key-value/stream service.
//!
//! Three data models share one HTTP endpoint: opaque objects, typed
//! key-value items, and partitioned record streams. This crate provides the
//! typed operation surface over all three, a bounded dispatcher for
//! asynchronous submission, and a consumer-group layer that coordinates
//! multiple readers over a stream's shards.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use v3io_client::{ClientConfig, Dispatcher, HttpTransport, Session};
//! use v3io_client::types::{GetItemInput, PutItemInput};
//! use v3io_core::AttrValue;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new()?);
//! let dispatcher = Dispatcher::new(ClientConfig::default(), transport);
//!
//! let session = Session::with_access_key("https://cluster:8081", "access-key");
//!
//! let mut put = PutItemInput {
//!     data_plane: session.data_plane_input("users"),
//!     path: "registry/user-1".to_string(),
//!     ..Default::default()
//! };
//! put.attributes.insert("age".to_string(), AttrValue::Int(30));
//! put.attributes.insert("name".to_string(), AttrValue::from("foo"));
//!
//! dispatcher.data_plane().put_item(&put).await?.release();
//!
//! let get = GetItemInput {
//!     data_plane: session.data_plane_input("users"),
//!     path: "registry/user-1".to_string(),
//!     attribute_names: vec!["age".to_string(), "name".to_string()],
//! };
//! let response = dispatcher.data_plane().get_item(&get).await?;
//! println!("{:?}", response.output());
//! response.release();
//! # Ok(())
//! # }
//! ```
//!
//! # Call Families
//!
//! Every operation exists twice: the direct form on
//! [`DataPlane`](crate::DataPlane) runs on the caller's task and returns
//! the response; the `submit_*` form on [`Dispatcher`] enqueues the input
//! onto the worker pool and delivers the response on a caller-provided
//! channel. Completions on that channel are unordered.

#![warn(missing_docs)]

pub mod config;
pub mod consumer;
mod dispatcher;
mod ops;
mod request;
mod response;
mod session;
pub mod transport;
pub mod types;
mod uri;

pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use dispatcher::Dispatcher;
pub use ops::DataPlane;
pub use request::{CallerContext, OperationInput, Request, RequestHandle};
pub use response::{Response, ResponsePool};
pub use session::{Container, Session};
pub use transport::{HttpTransport, HttpTransportBuilder, Transport};
pub use uri::build_request_uri;

pub use v3io_core as core;
