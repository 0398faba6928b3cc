use super::{Metadata, Request};
use crate::util::io::AsyncWriteExt as _;
use std::pin::Pin;

impl Request {
	/// Serializes the request line and headers, including the terminating blank line.
	///
	/// # Panics
	/// This function panics in a debug build if the request target or any header is invalid.
	/// [`RequestBuilder`](crate::RequestBuilder) never produces such requests.
	pub fn encode_head(&self, out: &mut Vec<u8>) {
		use crate::util::{is_field_value, is_request_target, is_token};

		let target = self.request_target();
		debug_assert!(
			is_request_target(&target),
			"Request target {target:?} contains invalid characters"
		);
		out.extend_from_slice(self.method.as_str().as_bytes());
		out.push(b' ');
		out.extend_from_slice(target.as_bytes());
		out.push(b' ');
		out.extend_from_slice(self.version.as_str().as_bytes());
		out.extend_from_slice(b"\r\n");

		for header in &self.headers {
			debug_assert!(
				is_token(&header.name),
				"Request header {} is not a token",
				header.name
			);
			debug_assert!(
				is_field_value(header.value.as_bytes()),
				"Request header value {:?} is not a valid field value",
				header.value
			);
			out.extend_from_slice(header.name.as_bytes());
			out.extend_from_slice(b": ");
			out.extend_from_slice(header.value.as_bytes());
			out.extend_from_slice(b"\r\n");
		}
		out.extend_from_slice(b"\r\n");
	}

	/// Serializes the whole request as it appears on the wire: head, then body.
	pub fn to_bytes(&self) -> Vec<u8> {
		let body = self.body.as_ref().map_or(&[][..], |b| &b.bytes[..]);
		let mut out = Vec::with_capacity(256 + body.len());
		self.encode_head(&mut out);
		out.extend_from_slice(body);
		out
	}
}

/// Sends an HTTP request line and request headers.
///
/// The `socket` parameter is the transport-layer socket over which the HTTP request will be sent,
/// which must already be connected to the remote host.
///
/// This function returns once the head has been written to `socket`. The returned [`Metadata`]
/// must be passed along when the response head is received.
///
/// *Important*: This function does not flush the socket. If the body is withheld until the
/// server sends `100 Continue`, the caller must flush before waiting, otherwise the server may
/// never see the request.
///
/// # Errors
/// This function returns an error if writing to `socket` fails.
pub(crate) async fn send_head<Socket: futures_io::AsyncWrite + ?Sized>(
	request: &Request,
	mut socket: Pin<&mut Socket>,
) -> std::io::Result<Metadata> {
	let mut head = Vec::with_capacity(256);
	request.encode_head(&mut head);
	socket.as_mut().write_all(&head).await?;
	Ok(request.metadata())
}

/// Sends the request body, if any, and flushes the socket.
///
/// # Errors
/// This function returns an error if writing to or flushing `socket` fails.
pub(crate) async fn send_body<Socket: futures_io::AsyncWrite + ?Sized>(
	request: &Request,
	mut socket: Pin<&mut Socket>,
) -> std::io::Result<()> {
	if let Some(body) = &request.body {
		socket.as_mut().write_all(&body.bytes).await?;
	}
	socket.flush().await
}
