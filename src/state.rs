//! The lifecycle events of one exchange.

use crate::error::Error;
use crate::request::Request;
use crate::response::ResponseHead;
use bytes::Bytes;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A single lifecycle notification describing the progress of an exchange.
///
/// For one exchange the events arrive in the order
///
/// `Connecting → Connected → SendRequest → Continue? → AwaitResponse → HeadersReceived →
/// Redirect? → ContentReceived* → Finished → Closed`
///
/// `Error`, `Cancelled` and `Timeout` may interrupt the sequence at any point and are always
/// followed immediately by the single terminal `Closed`.
#[derive(Clone, Debug)]
pub enum State {
	/// A connection to the server is being opened.
	Connecting,

	/// The connection is open.
	Connected,

	/// The request head is being transmitted.
	SendRequest(Arc<Request>),

	/// The server answered `100 Continue`; the withheld body is being transmitted.
	Continue,

	/// The request has been sent and the response is awaited.
	AwaitResponse,

	/// The final response head arrived.
	HeadersReceived(Arc<ResponseHead>),

	/// The response is a redirect to the contained, already resolved, location.
	///
	/// Redirects are reported, never followed.
	Redirect(Url),

	/// One piece of the decoded response body, in arrival order.
	ContentReceived(Bytes),

	/// The response body is complete.
	Finished,

	/// The exchange deadline expired after the contained duration.
	Timeout(Duration),

	/// The exchange failed.
	Error(Arc<Error>),

	/// The exchange was cancelled by the caller.
	Cancelled,

	/// The exchange is over and its connection has been released.
	Closed,
}

impl State {
	/// Returns the tag of this event.
	pub fn kind(&self) -> StateKind {
		match self {
			Self::Connecting => StateKind::Connecting,
			Self::Connected => StateKind::Connected,
			Self::SendRequest(_) => StateKind::SendRequest,
			Self::Continue => StateKind::Continue,
			Self::AwaitResponse => StateKind::AwaitResponse,
			Self::HeadersReceived(_) => StateKind::HeadersReceived,
			Self::Redirect(_) => StateKind::Redirect,
			Self::ContentReceived(_) => StateKind::ContentReceived,
			Self::Finished => StateKind::Finished,
			Self::Timeout(_) => StateKind::Timeout,
			Self::Error(_) => StateKind::Error,
			Self::Cancelled => StateKind::Cancelled,
			Self::Closed => StateKind::Closed,
		}
	}
}

impl Display for State {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::HeadersReceived(head) => write!(f, "HeadersReceived({})", head.status),
			Self::Redirect(location) => write!(f, "Redirect({location})"),
			Self::ContentReceived(data) => write!(f, "ContentReceived({} bytes)", data.len()),
			Self::Timeout(limit) => write!(f, "Timeout({limit:?})"),
			Self::Error(error) => write!(f, "Error({error})"),
			other => f.write_str(other.kind().name()),
		}
	}
}

/// The tag of a [`State`], without its payload.
///
/// Handlers are registered per tag, and [`ResponseFuture::last_state`] reports one.
///
/// [`ResponseFuture::last_state`]: crate::ResponseFuture::last_state
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum StateKind {
	/// Tag of [`State::Connecting`].
	Connecting,
	/// Tag of [`State::Connected`].
	Connected,
	/// Tag of [`State::SendRequest`].
	SendRequest,
	/// Tag of [`State::Continue`].
	Continue,
	/// Tag of [`State::AwaitResponse`].
	AwaitResponse,
	/// Tag of [`State::HeadersReceived`].
	HeadersReceived,
	/// Tag of [`State::Redirect`].
	Redirect,
	/// Tag of [`State::ContentReceived`].
	ContentReceived,
	/// Tag of [`State::Finished`].
	Finished,
	/// Tag of [`State::Timeout`].
	Timeout,
	/// Tag of [`State::Error`].
	Error,
	/// Tag of [`State::Cancelled`].
	Cancelled,
	/// Tag of [`State::Closed`].
	Closed,
}

impl StateKind {
	/// The number of tags.
	pub const COUNT: usize = 13;

	/// Every tag, in declaration order.
	pub const ALL: [Self; Self::COUNT] = [
		Self::Connecting,
		Self::Connected,
		Self::SendRequest,
		Self::Continue,
		Self::AwaitResponse,
		Self::HeadersReceived,
		Self::Redirect,
		Self::ContentReceived,
		Self::Finished,
		Self::Timeout,
		Self::Error,
		Self::Cancelled,
		Self::Closed,
	];

	/// Returns the tag’s position in [`ALL`](Self::ALL).
	pub(crate) fn index(self) -> usize {
		self as usize
	}

	/// Returns the tag’s position in the progress order.
	///
	/// Progress events have strictly increasing ranks, except that `ContentReceived` may repeat.
	/// The interrupting tags share one rank after `Finished`, and `Closed` comes last.
	pub fn rank(self) -> u8 {
		match self {
			Self::Connecting => 0,
			Self::Connected => 1,
			Self::SendRequest => 2,
			Self::Continue => 3,
			Self::AwaitResponse => 4,
			Self::HeadersReceived => 5,
			Self::Redirect => 6,
			Self::ContentReceived => 7,
			Self::Finished => 8,
			Self::Timeout | Self::Error | Self::Cancelled => 9,
			Self::Closed => 10,
		}
	}

	/// Returns whether the tag may interrupt the exchange at any point.
	///
	/// An interrupting event is always followed immediately by `Closed`.
	pub fn is_interruption(self) -> bool {
		matches!(self, Self::Timeout | Self::Error | Self::Cancelled)
	}

	/// Returns whether an event of this tag may directly follow an event tagged `previous`.
	pub fn may_follow(self, previous: Option<Self>) -> bool {
		let Some(previous) = previous else {
			return true;
		};
		if previous == Self::Closed {
			return false;
		}
		if previous.is_interruption() {
			return self == Self::Closed;
		}
		if self.is_interruption() || self == Self::Closed {
			return true;
		}
		self.rank() > previous.rank()
			|| (self == Self::ContentReceived && previous == Self::ContentReceived)
	}

	/// Returns the tag’s name.
	pub fn name(self) -> &'static str {
		match self {
			Self::Connecting => "Connecting",
			Self::Connected => "Connected",
			Self::SendRequest => "SendRequest",
			Self::Continue => "Continue",
			Self::AwaitResponse => "AwaitResponse",
			Self::HeadersReceived => "HeadersReceived",
			Self::Redirect => "Redirect",
			Self::ContentReceived => "ContentReceived",
			Self::Finished => "Finished",
			Self::Timeout => "Timeout",
			Self::Error => "Error",
			Self::Cancelled => "Cancelled",
			Self::Closed => "Closed",
		}
	}
}

impl Display for StateKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}
