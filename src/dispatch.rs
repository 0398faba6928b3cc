//! Running exchanges on a tokio runtime.

mod connect;
mod exchange;

pub use connect::{Connect, Connection, Release, TcpConnector};

use crate::config::Config;
use crate::error::Error;
use crate::future::ResponseFuture;
use crate::request::Request;
use crate::state::State;
use exchange::{ReleaseSlot, Stop};
use log::debug;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Sends requests, one tokio task per exchange.
///
/// Each exchange opens its own connection through the connector, delivers its events to the
/// request’s [`ResponseFuture`] from the task, and releases the connection before `Closed`.
/// Cancelling the future releases the connection through its release hook and aborts the task.
///
/// The runtime behind the handle must have I/O enabled, and time too if [`Config::timeout`] is
/// set.
///
/// A `Dispatcher` is cheap to clone; clones share the connector and configuration.
#[derive(Debug)]
pub struct Dispatcher<C: Connect = TcpConnector> {
	/// The runtime the exchange tasks are spawned on.
	handle: Handle,

	/// Opens connections.
	connector: Arc<C>,

	/// Settings applied to every exchange.
	config: Arc<Config>,
}

impl Dispatcher {
	/// Constructs a dispatcher that connects over TCP and spawns on `handle`.
	pub fn new(handle: Handle) -> Self {
		Self::with_connector(handle, TcpConnector)
	}
}

impl<C: Connect> Dispatcher<C> {
	/// Constructs a dispatcher that opens connections through `connector`.
	pub fn with_connector(handle: Handle, connector: C) -> Self {
		Self {
			handle,
			connector: Arc::new(connector),
			config: Arc::new(Config::default()),
		}
	}

	/// Replaces the configuration.
	#[must_use]
	pub fn with_config(mut self, config: Config) -> Self {
		self.config = Arc::new(config);
		self
	}

	/// Returns the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Sends `request` and returns the future that will receive its events.
	///
	/// Events may start arriving before this function returns; use
	/// [`send_with`](Self::send_with) to register handlers first.
	pub fn send(&self, request: Request) -> ResponseFuture {
		let future = ResponseFuture::new();
		let _ = future.begin();
		self.spawn(request, &future);
		future
	}

	/// Sends `request`, delivering its events to `future`.
	///
	/// A future that was cancelled beforehand receives no further events and no connection is
	/// opened.
	///
	/// # Errors
	/// This function returns [`Error::Configuration`] if `future` has already been used for
	/// another request.
	pub fn send_with(&self, request: Request, future: &ResponseFuture) -> Result<(), Error> {
		if !future.begin() {
			return Err(Error::configuration("ResponseFuture has already been sent"));
		}
		self.spawn(request, future);
		Ok(())
	}

	fn spawn(&self, request: Request, future: &ResponseFuture) {
		let request = Arc::new(request);
		let connector = Arc::clone(&self.connector);
		let config = Arc::clone(&self.config);
		let driver = future.clone();
		let slot = Arc::new(ReleaseSlot::new());
		let held = Arc::clone(&slot);
		let task = self.handle.spawn(async move {
			let running = exchange::run(&*connector, &config, &request, &driver, &held);
			let outcome = match config.timeout {
				Some(limit) => {
					let finished = tokio::time::timeout(limit, running).await;
					if let Ok(outcome) = finished {
						outcome
					} else {
						debug!("{} {} timed out after {limit:?}", request.method(), request.url());
						let _ = driver.deliver(State::Timeout(limit));
						return;
					}
				}
				None => running.await,
			};
			match outcome {
				Ok(()) => {
					let _ = driver.deliver(State::Closed);
				}
				Err(Stop::Failed(error)) => {
					debug!("{} {} failed: {error}", request.method(), request.url());
					let _ = driver.deliver(State::Error(Arc::new(error)));
				}
				Err(Stop::Rejected) => {
					debug!("{} {} stopped after cancellation", request.method(), request.url());
				}
			}
		});
		let abort = task.abort_handle();
		future.set_abort(move || {
			slot.release();
			abort.abort();
		});
	}
}

impl<C: Connect> Clone for Dispatcher<C> {
	fn clone(&self) -> Self {
		Self {
			handle: self.handle.clone(),
			connector: Arc::clone(&self.connector),
			config: Arc::clone(&self.config),
		}
	}
}
