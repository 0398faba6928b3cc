use super::{ResponseHead, ResponseHeader};
use crate::error::InvalidData;
use crate::request::Metadata;
use futures_io::AsyncBufRead;
use std::io::Result;
use std::pin::Pin;

/// How the length of a response body is determined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
	/// The body is exactly this many bytes long.
	Fixed(u64),

	/// The body uses chunked transfer coding.
	Chunked,

	/// The body extends until the server closes the connection.
	Eof,
}

/// Receives one HTTP status line and its headers.
///
/// The `socket` parameter is the transport-layer socket over which the HTTP response will be
/// received. At most `max_bytes` bytes are accepted for the head and at most `max_headers`
/// headers. Nothing beyond the blank line ending the head is consumed from `socket`, so the body
/// (or the next head) remains available.
///
/// Interim 1xx heads are returned like any other; the caller decides whether to wait for another.
///
/// # Errors
/// This function returns an error if reading from `socket` fails, or of kind
/// [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof) if the socket closes before the head is
/// complete.
///
/// This function returns an error of kind [`InvalidData`](std::io::ErrorKind::InvalidData) under
/// the following conditions:
/// * if the response status line or headers are malformed
/// * if the response head is longer than `max_bytes`
/// * if there are more than `max_headers` headers
/// * if the server sent a status code 101 Switching Protocols
pub async fn receive<Socket: AsyncBufRead + ?Sized>(
	mut socket: Pin<&mut Socket>,
	max_bytes: usize,
	max_headers: usize,
) -> Result<ResponseHead> {
	use crate::util::io::AsyncBufReadExt as _;

	let mut buffer: Vec<u8> = Vec::new();
	loop {
		// Copy bytes out of the socket’s buffer until the copy ends with two consecutive [CR]LFs.
		// Only the bytes up to and including the terminator are consumed.
		let headers_done = socket
			.as_mut()
			.read_buf(|bytes: &[u8]| -> (usize, Result<bool>) {
				if bytes.is_empty() {
					return (0, Err(std::io::ErrorKind::UnexpectedEof.into()));
				}
				let previously_used = buffer.len();
				let to_copy = std::cmp::min(max_bytes - previously_used, bytes.len());
				buffer.extend_from_slice(&bytes[..to_copy]);
				if let Some(n) = headers_length(&buffer) {
					buffer.truncate(n);
					(n - previously_used, Ok(true))
				} else {
					(to_copy, Ok(false))
				}
			})
			.await??;
		if headers_done {
			break;
		}
		if buffer.len() >= max_bytes {
			return Err(InvalidData::ResponseHeadersTooLong.into());
		}
	}
	parse(&buffer, max_headers)
}

/// Parses a complete response head.
fn parse(buffer: &[u8], max_headers: usize) -> Result<ResponseHead> {
	let mut headers = vec![httparse::EMPTY_HEADER; max_headers];
	let mut resp = httparse::Response::new(&mut headers);
	match resp.parse(buffer).map_err(InvalidData::from)? {
		httparse::Status::Complete(n) if n == buffer.len() => (),
		// httparse disagrees with headers_length about where the head ends. That is almost
		// certainly due to incorrect newlines.
		httparse::Status::Partial | httparse::Status::Complete(_) => {
			return Err(InvalidData::from(httparse::Error::NewLine).into());
		}
	}
	let (Some(minor_version), Some(status)) = (resp.version, resp.code) else {
		return Err(InvalidData::from(httparse::Error::Status).into());
	};
	if status == 101 {
		return Err(InvalidData::SwitchingProtocols.into());
	}
	Ok(ResponseHead {
		minor_version,
		status,
		reason: resp.reason.unwrap_or_default().to_owned(),
		headers: resp
			.headers
			.iter()
			.map(|h| ResponseHeader {
				name: h.name.to_owned(),
				value: h.value.to_vec(),
			})
			.collect(),
	})
}

/// Determines how the body following a final response head is delimited.
///
/// # Errors
/// This function returns an error of kind [`InvalidData`](std::io::ErrorKind::InvalidData) under
/// the following conditions:
/// * if multiple `Content-Length` headers are present
/// * if the value of the `Content-Length` header is not a nonnegative integer
/// * if the value of the `Content-Length` header is too large to represent in a `u64`
/// * if the `Content-Length` and `Transfer-Encoding` headers are both present
/// * if the `Content-Length` header is present in a 204 No Content response
/// * if multiple `Transfer-Encoding` headers are present
/// * if the `Transfer-Encoding` header indicates an encoding other than chunked
/// * if the `Transfer-Encoding` header is present in a 204 No Content response
pub fn framing(head: &ResponseHead, metadata: Metadata) -> Result<Framing> {
	let content_length = get_content_length(head)?;
	let chunked = is_chunked(head)?;

	// A server MUST NOT send a Content-Length header field in any message that contains a
	// Transfer-Encoding header field.
	if content_length.is_some() && chunked {
		return Err(InvalidData::ContentLengthAndTransferEncoding.into());
	}

	// A server MUST NOT send a Content-Length header field in any response with a status code of
	// 204 (No Content).
	if head.status == 204 {
		if chunked {
			return Err(InvalidData::TransferEncodingWithNoContent.into());
		}
		if content_length.is_some() {
			return Err(InvalidData::ContentLengthWithNoContent.into());
		}
	}

	// Message body length rules from RFC 9112 §6.3. CONNECT is never sent, and a message with both
	// framing headers was rejected above.
	Ok(if metadata.head || head.status == 204 || head.status == 304 {
		Framing::Fixed(0)
	} else if chunked {
		Framing::Chunked
	} else if let Some(n) = content_length {
		Framing::Fixed(n)
	} else {
		Framing::Eof
	})
}

/// Scans the headers and decodes the `Content-Length` header, if any.
fn get_content_length(head: &ResponseHead) -> Result<Option<u64>> {
	use crate::error::BadContentLength;

	let mut ret = None;
	for header in head
		.headers
		.iter()
		.filter(|h| h.name.eq_ignore_ascii_case("content-length"))
	{
		if ret.is_some() {
			return Err(InvalidData::MultipleContentLengths.into());
		}
		let value = std::str::from_utf8(&header.value).map_err(BadContentLength::NotUtf8)?;
		ret = Some(value.parse::<u64>().map_err(BadContentLength::NotU64)?);
	}
	Ok(ret)
}

/// Scans the headers and determines whether chunked transfer coding is in use.
fn is_chunked(head: &ResponseHead) -> Result<bool> {
	let mut ret = false;
	for header in head
		.headers
		.iter()
		.filter(|h| h.name.eq_ignore_ascii_case("transfer-encoding"))
	{
		if ret {
			return Err(InvalidData::MultipleTransferEncodings.into());
		}
		if header.value.eq_ignore_ascii_case(b"chunked") {
			ret = true;
		} else {
			return Err(InvalidData::NotChunked.into());
		}
	}
	Ok(ret)
}

/// Scans the buffer and determines the length of the HTTP head.
///
/// If the head is complete, returns `Some(n)` where `n` is its length in bytes, including the
/// final [CR]LF[CR]LF. Otherwise returns `None`.
fn headers_length(buffer: &[u8]) -> Option<usize> {
	const TERMINATORS: [&[u8]; 4] = [b"\r\n\r\n", b"\r\n\n", b"\n\r\n", b"\n\n"];
	buffer
		.iter()
		.enumerate()
		.filter(|(_, &b)| b == b'\n' || b == b'\r')
		.find_map(|(eol_pos, _)| {
			TERMINATORS
				.iter()
				.find(|t| buffer[eol_pos..].starts_with(t))
				.map(|t| eol_pos + t.len())
		})
}
