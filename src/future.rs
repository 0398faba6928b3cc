//! The per-request handle through which lifecycle events reach the application.

mod registry;

pub use registry::{Handler, HandlerRegistry};

use crate::error::Error;
use crate::state::{State, StateKind};
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A hook that aborts the exchange driving a future.
type AbortHook = Box<dyn FnOnce() + Send>;

/// Locks a mutex, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The delivery queue and the bookkeeping updated together with it.
#[derive(Debug, Default)]
struct Queue {
	/// Events accepted but not yet dispatched.
	pending: VecDeque<State>,

	/// Whether some thread is currently dispatching events.
	draining: bool,

	/// Whether `Closed` has been accepted.
	closed: bool,

	/// The tag of the most recently accepted event.
	last_accepted: Option<StateKind>,

	/// The tag of the most recently observed event.
	last_state: Option<StateKind>,

	/// The first error accepted before cancellation.
	error: Option<Arc<Error>>,
}

struct Shared {
	queue: Mutex<Queue>,
	handlers: Mutex<HandlerRegistry>,
	done: Mutex<bool>,
	done_signal: Condvar,
	cancelled: AtomicBool,
	started: AtomicBool,
	abort: Mutex<Option<AbortHook>>,
}

/// The handle to one in-flight exchange.
///
/// A `ResponseFuture` is created by the caller, handed to a [`Dispatcher`](crate::Dispatcher)
/// (which clones it and feeds it events) and kept by the caller to register handlers, cancel,
/// wait for completion and inspect the outcome. Every clone refers to the same exchange. A
/// future is single-use: it can be sent only once.
///
/// Events are dispatched one at a time. A handler never runs concurrently with another handler
/// of the same future; an event delivered or a cancellation requested while a handler is running
/// (including from inside that handler) is queued and dispatched once the handler returns.
/// Handlers therefore run on whichever thread happens to be delivering, normally the
/// dispatcher’s, and should not block for long. A handler must never call [`wait`](Self::wait).
/// A handler that panics is logged and skipped; dispatch carries on with the next handler.
///
/// # Example
/// ```
/// use evhc::{ResponseFuture, State, StateKind};
///
/// let future = ResponseFuture::new();
/// future.register(StateKind::Cancelled, |_: &State| println!("cancelled"));
/// assert!(future.cancel());
/// assert!(!future.cancel());
/// future.wait();
/// assert_eq!(future.last_state(), Some(StateKind::Closed));
/// assert!(future.throw_if_error().is_ok());
/// ```
#[derive(Clone)]
pub struct ResponseFuture {
	shared: Arc<Shared>,
}

impl ResponseFuture {
	/// Constructs a future with no handlers that has observed no events.
	pub fn new() -> Self {
		Self {
			shared: Arc::new(Shared {
				queue: Mutex::new(Queue::default()),
				handlers: Mutex::new(HandlerRegistry::new()),
				done: Mutex::new(false),
				done_signal: Condvar::new(),
				cancelled: AtomicBool::new(false),
				started: AtomicBool::new(false),
				abort: Mutex::new(None),
			}),
		}
	}

	/// Registers a handler for events tagged `kind`.
	///
	/// Handlers for one tag run in registration order, before any catch-all handler. A handler
	/// registered while an event is being dispatched first runs for the next event.
	///
	/// Registering after `Closed` has been dispatched succeeds, but the handler never runs.
	/// Register handlers before sending the request to be sure to see every event.
	pub fn register(&self, kind: StateKind, handler: impl FnMut(&State) + Send + 'static) {
		let done = lock(&self.shared.done);
		if *done {
			warn!("handler for {kind} registered after Closed will never run");
		} else {
			lock(&self.shared.handlers).register(kind, handler);
		}
	}

	/// Registers a handler for every event.
	///
	/// Catch-all handlers run in registration order, after the handlers registered for the
	/// event’s tag. The same timing rules as [`register`](Self::register) apply.
	pub fn register_any(&self, handler: impl FnMut(&State) + Send + 'static) {
		let done = lock(&self.shared.done);
		if *done {
			warn!("catch-all handler registered after Closed will never run");
		} else {
			lock(&self.shared.handlers).register_any(handler);
		}
	}

	/// Delivers an event.
	///
	/// This is how a driver reports progress; applications normally leave it to the
	/// [`Dispatcher`](crate::Dispatcher). The event is dispatched to handlers before this function
	/// returns unless another thread is already dispatching, in which case that thread picks it
	/// up.
	///
	/// `Error`, `Cancelled` and `Timeout` are followed automatically by `Closed`. An `Error` is
	/// captured for [`throw_if_error`](Self::throw_if_error).
	///
	/// This function returns `false`, and dispatches nothing, if the exchange has already been
	/// closed or cancelled. A driver must stop when that happens. An `Error` rejected because the
	/// exchange was cancelled is still recorded as the [last state](Self::last_state) but never
	/// surfaces as an error.
	///
	/// # Panics
	/// In a debug build, this function panics if `state` may not follow the previously delivered
	/// event.
	pub fn deliver(&self, state: State) -> bool {
		let kind = state.kind();
		{
			let mut queue = lock(&self.shared.queue);
			if queue.closed {
				if kind == StateKind::Error && self.shared.cancelled.load(Ordering::SeqCst) {
					debug!("suppressing error after cancel: {state}");
					queue.last_state = Some(StateKind::Error);
				} else {
					debug!("rejecting {state} after Closed");
				}
				return false;
			}
			debug_assert!(
				kind.may_follow(queue.last_accepted),
				"{kind} may not follow {:?}",
				queue.last_accepted
			);
			if let State::Error(error) = &state {
				let _ = queue.error.get_or_insert_with(|| Arc::clone(error));
			}
			queue.pending.push_back(state);
			if kind.is_interruption() {
				queue.pending.push_back(State::Closed);
			}
			if kind.is_interruption() || kind == StateKind::Closed {
				queue.closed = true;
				queue.last_accepted = Some(StateKind::Closed);
			} else {
				queue.last_accepted = Some(kind);
			}
		}
		self.drain();
		true
	}

	/// Cancels the exchange.
	///
	/// On the first successful call the running exchange (if any) is aborted, its connection is
	/// released, and `Cancelled` then `Closed` are delivered. Events the driver delivers
	/// afterwards are rejected.
	///
	/// Returns `true` if this call cancelled the exchange, or `false` if it had already been
	/// cancelled or had already closed.
	pub fn cancel(&self) -> bool {
		{
			let mut queue = lock(&self.shared.queue);
			if queue.closed {
				return false;
			}
			if self
				.shared
				.cancelled
				.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
				.is_err()
			{
				return false;
			}
			// The connection is gone before another draining thread can dispatch `Closed`.
			let hook = lock(&self.shared.abort).take();
			if let Some(hook) = hook {
				hook();
			}
			queue.pending.push_back(State::Cancelled);
			queue.pending.push_back(State::Closed);
			queue.closed = true;
			queue.last_accepted = Some(StateKind::Closed);
		}
		self.drain();
		true
	}

	/// Blocks the calling thread until `Closed` has been dispatched.
	///
	/// This is meant for tests and synchronous callers. Calling it from a handler deadlocks.
	pub fn wait(&self) {
		let _done = self
			.shared
			.done_signal
			.wait_while(lock(&self.shared.done), |done| !*done)
			.unwrap_or_else(PoisonError::into_inner);
	}

	/// Blocks the calling thread until `Closed` has been dispatched or `timeout` elapses.
	///
	/// Returns whether `Closed` was observed in time.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let (done, _) = self
			.shared
			.done_signal
			.wait_timeout_while(lock(&self.shared.done), timeout, |done| !*done)
			.unwrap_or_else(PoisonError::into_inner);
		*done
	}

	/// Returns the captured error, if the exchange failed before it could be cancelled.
	///
	/// # Errors
	/// This function returns the cause carried by the first `Error` event.
	pub fn throw_if_error(&self) -> Result<(), Arc<Error>> {
		match self.error() {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	/// Returns the captured error, if any.
	pub fn error(&self) -> Option<Arc<Error>> {
		lock(&self.shared.queue).error.clone()
	}

	/// Returns the tag of the most recent event, or `None` before the first one.
	pub fn last_state(&self) -> Option<StateKind> {
		lock(&self.shared.queue).last_state
	}

	/// Returns whether the exchange has been cancelled.
	pub fn is_cancelled(&self) -> bool {
		self.shared.cancelled.load(Ordering::SeqCst)
	}

	/// Returns whether `Closed` has been dispatched.
	pub fn is_done(&self) -> bool {
		*lock(&self.shared.done)
	}

	/// Marks the future as sent.
	///
	/// Returns `false` if it had already been sent.
	pub(crate) fn begin(&self) -> bool {
		!self.shared.started.swap(true, Ordering::SeqCst)
	}

	/// Installs the hook that [`cancel`](Self::cancel) uses to abort the exchange.
	///
	/// If the future has already been cancelled, the hook is invoked immediately instead.
	pub(crate) fn set_abort(&self, hook: impl FnOnce() + Send + 'static) {
		*lock(&self.shared.abort) = Some(Box::new(hook));
		if self.shared.cancelled.load(Ordering::SeqCst) {
			let hook = lock(&self.shared.abort).take();
			if let Some(hook) = hook {
				hook();
			}
		}
	}

	/// Dispatches queued events until the queue is empty, unless another thread is already
	/// doing so.
	fn drain(&self) {
		let mut queue = lock(&self.shared.queue);
		if queue.draining {
			return;
		}
		queue.draining = true;
		while let Some(state) = queue.pending.pop_front() {
			queue.last_state = Some(state.kind());
			drop(queue);

			trace!("delivering {state}");
			let mut handlers = std::mem::take(&mut *lock(&self.shared.handlers));
			handlers.dispatch(&state);
			if matches!(state, State::Closed) {
				// Nothing can run any more, and dropping the handlers releases whatever they
				// captured, including clones of this future.
				drop(handlers);
				drop(std::mem::take(&mut *lock(&self.shared.handlers)));
				let abort = lock(&self.shared.abort).take();
				drop(abort);
				*lock(&self.shared.done) = true;
				self.shared.done_signal.notify_all();
			} else {
				let mut registered = lock(&self.shared.handlers);
				let added = std::mem::replace(&mut *registered, handlers);
				registered.append(added);
			}

			queue = lock(&self.shared.queue);
		}
		queue.draining = false;
	}
}

impl Default for ResponseFuture {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for ResponseFuture {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResponseFuture")
			.field("last_state", &self.last_state())
			.field("cancelled", &self.is_cancelled())
			.field("done", &self.is_done())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use bytes::Bytes;
	use std::io::ErrorKind;

	/// Records every event a future dispatches.
	fn record(future: &ResponseFuture) -> Arc<Mutex<Vec<String>>> {
		let log = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&log);
		future.register_any(move |state: &State| sink.lock().unwrap().push(state.to_string()));
		log
	}

	fn refused() -> Arc<Error> {
		Arc::new(Error::Connection(ErrorKind::ConnectionRefused.into()))
	}

	/// Tests a complete successful exchange.
	#[test]
	fn test_success_sequence() {
		let future = ResponseFuture::new();
		let log = record(&future);
		assert_eq!(future.last_state(), None);
		for state in [
			State::Connecting,
			State::Connected,
			State::AwaitResponse,
			State::ContentReceived(Bytes::from_static(b"ab")),
			State::ContentReceived(Bytes::from_static(b"c")),
			State::Finished,
		] {
			assert!(future.deliver(state));
		}
		assert!(!future.is_done());
		assert_eq!(future.last_state(), Some(StateKind::Finished));
		assert!(future.deliver(State::Closed));
		assert!(future.wait_timeout(Duration::ZERO));
		assert_eq!(future.last_state(), Some(StateKind::Closed));
		assert_eq!(
			*log.lock().unwrap(),
			[
				"Connecting",
				"Connected",
				"AwaitResponse",
				"ContentReceived(2 bytes)",
				"ContentReceived(1 bytes)",
				"Finished",
				"Closed",
			]
		);
		assert!(!future.deliver(State::Closed));
		assert!(future.throw_if_error().is_ok());
	}

	/// Tests that an error is captured and closes the exchange.
	#[test]
	fn test_error_closes() {
		let future = ResponseFuture::new();
		let log = record(&future);
		assert!(future.deliver(State::Connecting));
		assert!(future.deliver(State::Error(refused())));
		assert!(!future.deliver(State::Connected));
		assert!(future.is_done());
		assert_eq!(
			*log.lock().unwrap(),
			[
				"Connecting",
				"Error(connection failed: connection refused)",
				"Closed"
			]
		);
		match future.throw_if_error() {
			Err(e) => assert!(matches!(*e, Error::Connection(_))),
			Ok(()) => panic!("Expected captured error"),
		}
		assert!(!future.cancel());
		assert!(!future.is_cancelled());
	}

	/// Tests that a timeout closes the exchange without an error.
	#[test]
	fn test_timeout_closes() {
		let future = ResponseFuture::new();
		let log = record(&future);
		assert!(future.deliver(State::Connecting));
		assert!(future.deliver(State::Timeout(Duration::from_millis(5))));
		assert_eq!(*log.lock().unwrap(), ["Connecting", "Timeout(5ms)", "Closed"]);
		assert!(future.throw_if_error().is_ok());
	}

	/// Tests cancelling before anything happened, twice.
	#[test]
	fn test_cancel_before_connect() {
		let future = ResponseFuture::new();
		let log = record(&future);
		let cancelled = Arc::new(Mutex::new(0));
		let count = Arc::clone(&cancelled);
		future.register(StateKind::Cancelled, move |_: &State| *count.lock().unwrap() += 1);
		assert!(future.cancel());
		assert!(!future.cancel());
		future.wait();
		assert!(future.is_cancelled());
		assert_eq!(*cancelled.lock().unwrap(), 1);
		assert_eq!(*log.lock().unwrap(), ["Cancelled", "Closed"]);
		assert!(future.throw_if_error().is_ok());
		assert!(!future.deliver(State::Connecting));
	}

	/// Tests that the abort hook runs once whether it is installed before or after cancelling.
	#[test]
	fn test_abort_hook() {
		let aborted = Arc::new(Mutex::new(0));

		let before = ResponseFuture::new();
		let count = Arc::clone(&aborted);
		before.set_abort(move || *count.lock().unwrap() += 1);
		assert!(before.cancel());
		assert!(!before.cancel());
		assert_eq!(*aborted.lock().unwrap(), 1);

		let after = ResponseFuture::new();
		assert!(after.cancel());
		let count = Arc::clone(&aborted);
		after.set_abort(move || *count.lock().unwrap() += 1);
		assert_eq!(*aborted.lock().unwrap(), 2);
	}

	/// Tests that an error delivered first wins over a later cancel.
	#[test]
	fn test_error_then_cancel() {
		let future = ResponseFuture::new();
		assert!(future.deliver(State::Connecting));
		assert!(future.deliver(State::Error(refused())));
		assert!(!future.cancel());
		assert!(future.throw_if_error().is_err());
		assert_eq!(future.last_state(), Some(StateKind::Closed));
	}

	/// Tests that a cancel issued first suppresses a later error.
	#[test]
	fn test_cancel_then_error() {
		let future = ResponseFuture::new();
		let errors = Arc::new(Mutex::new(0));
		let count = Arc::clone(&errors);
		future.register(StateKind::Error, move |_: &State| *count.lock().unwrap() += 1);
		assert!(future.deliver(State::Connecting));
		assert!(future.cancel());
		assert!(!future.deliver(State::Error(refused())));
		assert!(future.throw_if_error().is_ok());
		assert_eq!(*errors.lock().unwrap(), 0);
		assert_eq!(future.last_state(), Some(StateKind::Error));
		assert!(future.is_done());
	}

	/// Tests that racing an error against a cancel surfaces exactly one outcome.
	#[test]
	fn test_error_cancel_race() {
		for _ in 0..200 {
			let future = ResponseFuture::new();
			assert!(future.deliver(State::Connecting));
			let driver = future.clone();
			let thread = std::thread::spawn(move || driver.deliver(State::Error(refused())));
			let cancelled = future.cancel();
			let delivered = thread.join().unwrap();
			future.wait();
			assert_ne!(cancelled, delivered);
			assert_eq!(future.throw_if_error().is_err(), delivered);
		}
	}

	/// Tests cancelling from inside a handler.
	#[test]
	fn test_reentrant_cancel() {
		let future = ResponseFuture::new();
		let log = record(&future);
		let inner = future.clone();
		let result = Arc::new(Mutex::new(None));
		let sink = Arc::clone(&result);
		future.register(StateKind::Connected, move |_: &State| {
			*sink.lock().unwrap() = Some(inner.cancel());
		});
		assert!(future.deliver(State::Connecting));
		assert!(future.deliver(State::Connected));
		assert!(!future.deliver(State::AwaitResponse));
		assert_eq!(*result.lock().unwrap(), Some(true));
		assert_eq!(
			*log.lock().unwrap(),
			["Connecting", "Connected", "Cancelled", "Closed"]
		);
		assert!(future.is_done());
	}

	/// Tests that a panicking handler does not stop later events, nor the final Closed.
	#[test]
	fn test_panicking_handler_still_closes() {
		let future = ResponseFuture::new();
		let log = record(&future);
		future.register(StateKind::Connected, |_: &State| panic!("handler failure"));
		assert!(future.deliver(State::Connecting));
		assert!(future.deliver(State::Connected));
		assert_eq!(future.last_state(), Some(StateKind::Connected));
		assert!(future.cancel());
		assert!(future.wait_timeout(Duration::from_millis(200)));
		assert_eq!(future.last_state(), Some(StateKind::Closed));
		assert_eq!(
			*log.lock().unwrap(),
			["Connecting", "Connected", "Cancelled", "Closed"]
		);
	}

	/// Tests the timing of registrations made during dispatch and after Closed.
	#[test]
	fn test_late_registration() {
		let future = ResponseFuture::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let inner = future.clone();
		let sink = Arc::clone(&log);
		future.register(StateKind::Connecting, move |_: &State| {
			let sink = Arc::clone(&sink);
			inner.register_any(move |state: &State| sink.lock().unwrap().push(state.to_string()));
		});
		assert!(future.deliver(State::Connecting));
		assert!(future.deliver(State::Connected));
		assert!(future.deliver(State::Closed));
		assert_eq!(*log.lock().unwrap(), ["Connected", "Closed"]);

		let fired = Arc::new(Mutex::new(false));
		let flag = Arc::clone(&fired);
		future.register(StateKind::Closed, move |_: &State| *flag.lock().unwrap() = true);
		assert!(!future.deliver(State::Closed));
		assert!(!*fired.lock().unwrap());
	}

	/// Tests blocking waits with and without a deliverer.
	#[test]
	fn test_wait() {
		let future = ResponseFuture::new();
		assert!(!future.wait_timeout(Duration::from_millis(10)));
		let driver = future.clone();
		let thread = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			assert!(driver.deliver(State::Connecting));
			assert!(driver.deliver(State::Closed));
		});
		future.wait();
		assert!(future.is_done());
		thread.join().unwrap();
	}

	/// Tests that a future can only be started once.
	#[test]
	fn test_begin() {
		let future = ResponseFuture::default();
		assert!(future.begin());
		assert!(!future.clone().begin());
		assert_eq!(
			format!("{future:?}"),
			"ResponseFuture { last_state: None, cancelled: false, done: false, .. }"
		);
	}
}
