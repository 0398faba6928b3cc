#![forbid(unsafe_code)]
#![warn(
	future_incompatible,
	nonstandard_style,
	rust_2018_idioms,
	rustdoc,
	unused
)]
#![warn(
	deprecated_in_future,
	missing_crate_level_docs,
	missing_debug_implementations,
	missing_docs,
	missing_doc_code_examples,
	// Disabled due to <https://github.com/rust-lang/rust/issues/69952> and
	// <https://github.com/rust-lang/rust/issues/77217>.
	// single_use_lifetimes,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_import_braces,
	// Disabled due to <https://github.com/rust-lang/rust/issues/77217>.
	// unused_lifetimes,
	unused_qualifications,
	unused_results
)]
#![warn(clippy::pedantic, clippy::cargo)]
// Disabled because we frequently mix u64 and usize, where the former is used for message body
// lengths and the latter for in-memory buffer sizes.
#![allow(clippy::cast_possible_truncation)]

//! Event-driven HTTP/1.1 client
//!
//! This crate sends single-shot HTTP/1.1 requests and reports the progress of each exchange as an
//! ordered sequence of [`State`] events delivered to handlers registered on a [`ResponseFuture`].
//! Exchanges can be cancelled from any thread, and synchronous callers can block until one is
//! over.
//!
//! A request is assembled with a [`RequestBuilder`], which produces an immutable [`Request`]. A
//! [`Dispatcher`] runs the exchange as a task on a tokio runtime, opening a fresh connection
//! through its [`Connect`] implementation, and feeds the events to the future. Every exchange
//! ends with exactly one [`State::Closed`], preceded immediately by [`State::Error`],
//! [`State::Cancelled`] or [`State::Timeout`] if it did not finish normally.
//!
//! Errors are opt-in: builder misuse fails synchronously, but anything that goes wrong on the
//! network only arrives as an `Error` event and through [`ResponseFuture::throw_if_error`].
//!
//! # Example
//! ```no_run
//! use evhc::{Dispatcher, RequestBuilder, ResponseFuture, State, StateKind};
//!
//! let runtime = tokio::runtime::Builder::new_multi_thread()
//!		.enable_all()
//!		.build()
//!		.unwrap();
//! let dispatcher = Dispatcher::new(runtime.handle().clone());
//!
//! let request = RequestBuilder::post("http://example.com/submit")
//!		.add_header("User-Agent", "evhc")
//!		.set_body("hello", mime::TEXT_PLAIN)
//!		.build()
//!		.unwrap();
//!
//! let future = ResponseFuture::new();
//! future.register(StateKind::HeadersReceived, |state: &State| {
//!		if let State::HeadersReceived(head) = state {
//!			println!("status {}", head.status);
//!		}
//! });
//! future.register(StateKind::ContentReceived, |state: &State| {
//!		if let State::ContentReceived(data) = state {
//!			println!("{} bytes", data.len());
//!		}
//! });
//! dispatcher.send_with(request, &future).unwrap();
//!
//! future.wait();
//! future.throw_if_error().unwrap();
//! ```

mod config;
mod dispatch;
pub mod error;
mod future;
mod request;
mod response;
mod state;
mod util;

pub use config::Config;
pub use dispatch::{Connect, Connection, Dispatcher, Release, TcpConnector};
pub use error::{Error, InvalidData};
pub use future::{Handler, HandlerRegistry, ResponseFuture};
pub use request::{
	format_http_date, BasicCredentials, Body, EncodeImage, Header, HeaderValue, Method, Payload,
	Request, RequestBuilder, Version,
};
pub use response::{ResponseHead, ResponseHeader};
pub use state::{State, StateKind};
