use crate::state::{State, StateKind};
use log::error;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A callback invoked with each matching event.
pub type Handler = Box<dyn FnMut(&State) + Send>;

/// An ordered mapping from state tag to handlers, plus catch-all handlers.
///
/// For each event, the handlers registered for its tag run first in registration order, then the
/// catch-all handlers in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
	/// The handlers for each tag, indexed by [`StateKind::index`].
	by_kind: [Vec<Handler>; StateKind::COUNT],

	/// The catch-all handlers.
	any: Vec<Handler>,
}

impl HandlerRegistry {
	/// Constructs an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a handler for events tagged `kind`.
	pub fn register(&mut self, kind: StateKind, handler: impl FnMut(&State) + Send + 'static) {
		self.by_kind[kind.index()].push(Box::new(handler));
	}

	/// Appends a handler for every event.
	pub fn register_any(&mut self, handler: impl FnMut(&State) + Send + 'static) {
		self.any.push(Box::new(handler));
	}

	/// Returns whether any handler would run for events tagged `kind`.
	pub fn has(&self, kind: StateKind) -> bool {
		!self.by_kind[kind.index()].is_empty() || !self.any.is_empty()
	}

	/// Returns whether the registry holds no handlers at all.
	pub fn is_empty(&self) -> bool {
		self.any.is_empty() && self.by_kind.iter().all(Vec::is_empty)
	}

	/// Invokes the handlers for `state`.
	///
	/// A handler that panics is logged and skipped; the handlers after it still run, and it stays
	/// registered for later events.
	pub fn dispatch(&mut self, state: &State) {
		let kind = state.kind();
		for handler in self.by_kind[kind.index()].iter_mut().chain(self.any.iter_mut()) {
			if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(state))) {
				error!("handler for {kind} panicked: {}", panic_message(&*payload));
			}
		}
	}

	/// Moves every handler of `other` to the end of the corresponding list in `self`.
	pub(crate) fn append(&mut self, mut other: Self) {
		for (mine, theirs) in self.by_kind.iter_mut().zip(other.by_kind.iter_mut()) {
			mine.append(theirs);
		}
		self.any.append(&mut other.any);
	}
}

/// Extracts the message from a panic payload.
fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
	if let Some(&message) = payload.downcast_ref::<&str>() {
		message
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.as_str()
	} else {
		"non-string payload"
	}
}

impl Debug for HandlerRegistry {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut map = f.debug_map();
		for kind in StateKind::ALL {
			let count = self.by_kind[kind.index()].len();
			if count != 0 {
				let _ = map.entry(&kind, &count);
			}
		}
		let _ = map.entry(&"any", &self.any.len());
		map.finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::{Arc, Mutex};

	fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl FnMut(&State) + Send {
		let log = Arc::clone(log);
		move |state: &State| log.lock().unwrap().push(format!("{name}:{state}"))
	}

	/// Tests that tag handlers run before catch-all handlers, each in registration order.
	#[test]
	fn test_dispatch_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut registry = HandlerRegistry::new();
		registry.register_any(recorder(&log, "any1"));
		registry.register(StateKind::Connected, recorder(&log, "c1"));
		registry.register_any(recorder(&log, "any2"));
		registry.register(StateKind::Connected, recorder(&log, "c2"));
		registry.register(StateKind::Finished, recorder(&log, "f"));
		registry.dispatch(&State::Connected);
		registry.dispatch(&State::Connecting);
		assert_eq!(
			*log.lock().unwrap(),
			[
				"c1:Connected",
				"c2:Connected",
				"any1:Connected",
				"any2:Connected",
				"any1:Connecting",
				"any2:Connecting",
			]
		);
	}

	/// Tests that a handler runs once per matching event and keeps its own state.
	#[test]
	fn test_fnmut_state() {
		let total = Arc::new(Mutex::new(0_usize));
		let mut registry = HandlerRegistry::new();
		let mut seen = 0_usize;
		let shared = Arc::clone(&total);
		registry.register(StateKind::ContentReceived, move |state: &State| {
			if let State::ContentReceived(data) = state {
				seen += data.len();
				*shared.lock().unwrap() = seen;
			}
		});
		registry.dispatch(&State::ContentReceived(bytes::Bytes::from_static(b"abc")));
		registry.dispatch(&State::ContentReceived(bytes::Bytes::from_static(b"de")));
		registry.dispatch(&State::Finished);
		assert_eq!(*total.lock().unwrap(), 5);
	}

	/// Tests that a panicking handler neither stops the others nor is dropped.
	#[test]
	fn test_panicking_handler() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut registry = HandlerRegistry::new();
		registry.register(StateKind::Connected, |_: &State| panic!("boom"));
		registry.register(StateKind::Connected, recorder(&log, "c"));
		registry.register_any(recorder(&log, "any"));
		registry.dispatch(&State::Connected);
		registry.dispatch(&State::Connected);
		assert_eq!(
			*log.lock().unwrap(),
			["c:Connected", "any:Connected", "c:Connected", "any:Connected"]
		);
		assert_eq!(format!("{registry:?}"), r#"{Connected: 2, "any": 1}"#);
	}

	/// Tests merging registries and the introspection helpers.
	#[test]
	fn test_append() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut first = HandlerRegistry::new();
		assert!(first.is_empty());
		first.register(StateKind::Closed, recorder(&log, "a"));
		let mut second = HandlerRegistry::new();
		second.register(StateKind::Closed, recorder(&log, "b"));
		second.register_any(recorder(&log, "z"));
		assert!(!first.has(StateKind::Connected));
		first.append(second);
		assert!(first.has(StateKind::Connected));
		first.dispatch(&State::Closed);
		assert_eq!(*log.lock().unwrap(), ["a:Closed", "b:Closed", "z:Closed"]);
		assert_eq!(format!("{first:?}"), r#"{Closed: 2, "any": 1}"#);
	}
}
