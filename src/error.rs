//! Errors that originate inside `evhc` or `httparse`.
//!
//! Two layers of errors exist. The wire layer (sending request heads, receiving response heads
//! and bodies) reports [`std::io::Error`]: errors passed up from the underlying socket pass
//! through completely unmodified, a server closing its socket prematurely is reported as
//! [`std::io::ErrorKind::UnexpectedEof`], and a server sending an invalid or unsupported response
//! is reported as [`std::io::ErrorKind::InvalidData`] whose inner error is an [`InvalidData`].
//!
//! The client layer reports [`Error`]. Builder misuse and body encoding failures are returned
//! synchronously from [`RequestBuilder`](crate::RequestBuilder); everything that happens after a
//! request is handed to a [`Dispatcher`](crate::Dispatcher) arrives as a
//! [`State::Error`](crate::State::Error) event and is only re-raised by
//! [`ResponseFuture::throw_if_error`](crate::ResponseFuture::throw_if_error).

use std::io::ErrorKind;

/// The errors a client operation can report.
///
/// Cancellation is not an error: a cancelled exchange ends with
/// [`State::Cancelled`](crate::State::Cancelled) followed by [`State::Closed`](crate::State::Closed).
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The request builder was misused, e.g. `build()` was called without a host.
	#[error("invalid request configuration: {0}")]
	Configuration(String),

	/// A request body could not be encoded.
	#[error("failed to encode request body")]
	Serialization(#[source] SerializationSource),

	/// The transport failed: connection refused or reset, DNS failure, or a write error.
	#[error("connection failed: {0}")]
	Connection(#[source] std::io::Error),

	/// The server sent a malformed or unsupported response.
	#[error("malformed response: {0}")]
	Protocol(#[source] InvalidData),
}

/// The underlying cause of an [`Error::Serialization`].
#[derive(Debug, thiserror::Error)]
pub enum SerializationSource {
	/// The value could not be serialized to JSON.
	#[error(transparent)]
	Json(#[from] serde_json::Error),

	/// Reading a body stream or encoding an image failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Constructs an [`Error::Configuration`] from a message.
	pub(crate) fn configuration(message: impl Into<String>) -> Self {
		Self::Configuration(message.into())
	}

	/// Classifies an I/O error raised while an exchange was in progress.
	///
	/// Errors of kind [`InvalidData`](ErrorKind::InvalidData) whose inner error is an
	/// [`InvalidData`] and errors of kind [`UnexpectedEof`](ErrorKind::UnexpectedEof) are protocol
	/// errors; everything else is a connection error.
	pub(crate) fn from_exchange_io(error: std::io::Error) -> Self {
		match error.kind() {
			ErrorKind::UnexpectedEof => Self::Protocol(InvalidData::Truncated),
			ErrorKind::InvalidData => {
				if error
					.get_ref()
					.is_some_and(|inner| inner.is::<InvalidData>())
				{
					// The check above guarantees that the downcast succeeds.
					match error.into_inner().map(|inner| inner.downcast::<InvalidData>()) {
						Some(Ok(inner)) => Self::Protocol(*inner),
						_ => Self::Protocol(InvalidData::Truncated),
					}
				} else {
					Self::Connection(error)
				}
			}
			_ => Self::Connection(error),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(inner: serde_json::Error) -> Self {
		Self::Serialization(inner.into())
	}
}

/// The ways in which a received `Content-Length` header can be invalid.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum BadContentLength {
	/// The header is not valid UTF-8.
	#[error(transparent)]
	NotUtf8(std::str::Utf8Error),

	/// The header is not a nonnegative integer or does not fit into a `u64`.
	#[error(transparent)]
	NotU64(<u64 as std::str::FromStr>::Err),
}

/// The ways in which a chunk header can be invalid.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum BadChunkHeader {
	/// A byte in the chunk size is not a hex digit.
	#[error("Chunk size is not a hex number")]
	SizeNotHex,

	/// The size does not fit in a `u64`.
	#[error("Chunk size is too large")]
	SizeNotU64,

	/// A character in the chunk header extensions section was not permitted to appear there.
	#[error("Chunk extensions contains invalid character")]
	ExtChar,

	/// A newline character (CR or LF) was not present where required, either after the chunk
	/// header, after a chunk’s data, or after the blank line following the end marker.
	#[error("Chunk framing contains incorrect newlines")]
	Newline,
}

/// The type of nested error included in any error of kind
/// [`InvalidData`](std::io::ErrorKind::InvalidData) that originates within `evhc` itself, and
/// the payload of [`Error::Protocol`].
///
/// Errors that pass through `evhc` but do not originate there—such as errors returned by the
/// underlying socket—may be of kind [`InvalidData`](std::io::ErrorKind::InvalidData) but not
/// contain a nested error object of this type.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum InvalidData {
	/// An error occurred during parsing headers.
	#[error(transparent)]
	ParseHeaders(#[from] httparse::Error),

	/// The response headers are too long.
	#[error("Response headers too long")]
	ResponseHeadersTooLong,

	/// The server decided to switch protocols. This is not supported.
	#[error("Unsupported 101 Switching Protocols received")]
	SwitchingProtocols,

	/// The server sent both a `Content-Length` header and a `Transfer-Encoding` header.
	#[error("Content-Length and Transfer-Encoding both received")]
	ContentLengthAndTransferEncoding,

	/// The server sent a `Content-Length` header with a 204 No Content status code.
	#[error("Content-Length received in 204 No Content response")]
	ContentLengthWithNoContent,

	/// The server sent multiple `Content-Length` headers.
	#[error("Multiple Content-Length headers received")]
	MultipleContentLengths,

	/// The server sent an invalid `Content-Length` header.
	#[error("Invalid Content-Length header received: {0}")]
	BadContentLength(#[from] BadContentLength),

	/// The server sent a `Transfer-Encoding` header with a 204 No Content status code.
	#[error("Transfer-Encoding received in 204 No Content response")]
	TransferEncodingWithNoContent,

	/// The server sent multiple `Transfer-Encoding` headers.
	#[error("Multiple Transfer-Encoding headers received")]
	MultipleTransferEncodings,

	/// The server sent a `Transfer-Encoding` header with an encoding other than `chunked`.
	#[error("Unsupported Transfer-Encoding received")]
	NotChunked,

	/// The server sent an invalid chunk header.
	#[error("Invalid chunk header received: {0}")]
	BadChunkHeader(#[from] BadChunkHeader),

	/// The server closed the connection before the response was complete.
	#[error("Connection closed before the response was complete")]
	Truncated,
}

impl From<InvalidData> for std::io::Error {
	fn from(inner: InvalidData) -> Self {
		Self::new(ErrorKind::InvalidData, inner)
	}
}

impl From<BadContentLength> for std::io::Error {
	fn from(inner: BadContentLength) -> Self {
		Into::<InvalidData>::into(inner).into()
	}
}

impl From<BadChunkHeader> for std::io::Error {
	fn from(inner: BadChunkHeader) -> Self {
		Into::<InvalidData>::into(inner).into()
	}
}
