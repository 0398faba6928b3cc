use futures_core::ready;
use futures_io::AsyncRead;
use std::io::{ErrorKind, Result};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A response body that is a fixed length known a priori from a `Content-Length` header.
#[derive(Debug)]
pub(super) struct Receive<'socket, Socket: AsyncRead + ?Sized> {
	/// The underlying socket.
	socket: Pin<&'socket mut Socket>,

	/// The number of body bytes not yet handed to the caller.
	remaining: u64,
}

impl<'socket, Socket: AsyncRead + ?Sized> Receive<'socket, Socket> {
	/// Constructs a new `Receive` for a body of `length` bytes.
	pub(super) fn new(socket: Pin<&'socket mut Socket>, length: u64) -> Self {
		Self {
			socket,
			remaining: length,
		}
	}
}

impl<Socket: AsyncRead + ?Sized> AsyncRead for Receive<'_, Socket> {
	fn poll_read(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut [u8],
	) -> Poll<Result<usize>> {
		if self.remaining == 0 || buf.is_empty() {
			return Ok(0).into();
		}
		let to_read = std::cmp::min(buf.len() as u64, self.remaining) as usize;
		let bytes_read = ready!(self.socket.as_mut().poll_read(cx, &mut buf[..to_read]))?;
		if bytes_read == 0 {
			Err(ErrorKind::UnexpectedEof.into()).into()
		} else {
			self.remaining -= bytes_read as u64;
			Ok(bytes_read).into()
		}
	}
}
