mod chunked;
mod eof;
mod fixed;

use super::headers::Framing;
use futures_io::AsyncRead;
use std::io::Result;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug)]
enum Impl<'socket, Socket: AsyncRead + ?Sized> {
	Chunked(chunked::Receive<'socket, Socket>),
	Eof(eof::Receive<'socket, Socket>),
	Fixed(fixed::Receive<'socket, Socket>),
}

/// A response body decoder.
///
/// It implements [`AsyncRead`](futures_io::AsyncRead), yielding the decoded body bytes and then
/// end of stream once the framing says the body is complete. A server closing the connection
/// before that point is reported as [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof), except
/// for [`Framing::Eof`] where closure is the terminator.
///
/// The `'socket` lifetime parameter is the lifetime of the transport socket. The `Socket` type
/// parameter is the type of the transport-layer socket over which the HTTP response is received.
#[derive(Debug)]
pub struct Receive<'socket, Socket: AsyncRead + ?Sized> {
	body_impl: Impl<'socket, Socket>,
}

impl<'socket, Socket: AsyncRead + ?Sized> Receive<'socket, Socket> {
	/// Constructs a decoder for a body delimited as described by `framing`.
	pub fn new(socket: Pin<&'socket mut Socket>, framing: Framing) -> Self {
		let body_impl = match framing {
			Framing::Chunked => Impl::Chunked(chunked::Receive::new(socket)),
			Framing::Eof => Impl::Eof(eof::Receive::new(socket)),
			Framing::Fixed(length) => Impl::Fixed(fixed::Receive::new(socket, length)),
		};
		Self { body_impl }
	}
}

impl<Socket: AsyncRead + ?Sized> AsyncRead for Receive<'_, Socket> {
	fn poll_read(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut [u8],
	) -> Poll<Result<usize>> {
		match self.body_impl {
			Impl::Chunked(ref mut chunked) => Pin::new(chunked).poll_read(cx, buf),
			Impl::Eof(ref mut eof) => Pin::new(eof).poll_read(cx, buf),
			Impl::Fixed(ref mut fixed) => Pin::new(fixed).poll_read(cx, buf),
		}
	}
}
