use futures_core::ready;
use futures_io::{AsyncBufRead, AsyncRead, AsyncWrite};
use std::future::Future;
use std::io::Result;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Additional utility functions available on any type implementing `AsyncBufRead`.
pub trait AsyncBufReadExt: AsyncBufRead {
	/// Fills the internal buffer, then invokes a callback which can consume some bytes from that
	/// buffer.
	///
	/// The `callback` is called at most once (not at all if filling the buffer fails). It is
	/// passed the buffered bytes, which are empty at end of stream, and returns how many of them
	/// to consume along with an arbitrary value to hand back to the caller.
	fn read_buf<CallbackReturn, Callback: FnOnce(&'_ [u8]) -> (usize, CallbackReturn) + Unpin>(
		self: Pin<&mut Self>,
		callback: Callback,
	) -> ReadBufFuture<'_, Self, CallbackReturn, Callback> {
		ReadBufFuture {
			source: self,
			callback: Some(callback),
		}
	}
}

impl<R: AsyncBufRead + ?Sized> AsyncBufReadExt for R {}

/// Additional utility functions available on any type implementing `AsyncRead`.
pub trait AsyncReadExt: AsyncRead {
	/// Reads data into a caller-provided buffer.
	fn read<'buffer>(
		self: Pin<&mut Self>,
		buffer: &'buffer mut [u8],
	) -> ReadFuture<'_, 'buffer, Self> {
		ReadFuture {
			source: self,
			buffer,
		}
	}
}

impl<R: AsyncRead + ?Sized> AsyncReadExt for R {}

/// Additional utility functions available on any type implementing `AsyncWrite`.
pub trait AsyncWriteExt: AsyncWrite {
	/// Writes a block of bytes, issuing repeated writes until all of it has been accepted.
	fn write_all<'a>(self: Pin<&'a mut Self>, data: &'a [u8]) -> WriteAllFuture<'a, Self> {
		WriteAllFuture { sink: self, data }
	}

	/// Flushes any buffered data.
	fn flush(self: Pin<&mut Self>) -> FlushFuture<'_, Self> {
		FlushFuture {
			sink: self,
			close: false,
		}
	}

	/// Flushes any buffered data and shuts down the write side.
	fn close(self: Pin<&mut Self>) -> FlushFuture<'_, Self> {
		FlushFuture {
			sink: self,
			close: true,
		}
	}
}

impl<W: AsyncWrite + ?Sized> AsyncWriteExt for W {}

/// A future that fills an `AsyncBufRead`’s internal buffer and then invokes a callback to consume
/// some or all of the data.
#[derive(Debug)]
pub struct ReadBufFuture<
	'source,
	Source: AsyncBufRead + ?Sized,
	CallbackReturn,
	Callback: FnOnce(&[u8]) -> (usize, CallbackReturn) + Unpin,
> {
	source: Pin<&'source mut Source>,
	callback: Option<Callback>,
}

impl<
		Source: AsyncBufRead + ?Sized,
		CallbackReturn,
		Callback: FnOnce(&[u8]) -> (usize, CallbackReturn) + Unpin,
	> Future for ReadBufFuture<'_, Source, CallbackReturn, Callback>
{
	type Output = Result<CallbackReturn>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		let data = ready!(this.source.as_mut().poll_fill_buf(cx))?;
		let callback = this
			.callback
			.take()
			.expect("ReadBufFuture polled after completion");
		let (consumed, ret) = callback(data);
		this.source.as_mut().consume(consumed);
		Ok(ret).into()
	}
}

/// A future that reads from an `AsyncRead` into a single caller-provided buffer.
#[derive(Debug)]
pub struct ReadFuture<'source, 'buffer, Source: AsyncRead + ?Sized> {
	source: Pin<&'source mut Source>,
	buffer: &'buffer mut [u8],
}

impl<Source: AsyncRead + ?Sized> Future for ReadFuture<'_, '_, Source> {
	type Output = Result<usize>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		this.source.as_mut().poll_read(cx, this.buffer)
	}
}

/// A future that writes all of an array to an `AsyncWrite`.
#[derive(Debug)]
pub struct WriteAllFuture<'a, T: AsyncWrite + ?Sized> {
	sink: Pin<&'a mut T>,
	data: &'a [u8],
}

impl<T: AsyncWrite + ?Sized> Future for WriteAllFuture<'_, T> {
	type Output = Result<()>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		while !self.data.is_empty() {
			let data = self.data;
			let bytes_written = ready!(self.sink.as_mut().poll_write(cx, data))?;
			if bytes_written == 0 {
				return Err(std::io::ErrorKind::WriteZero.into()).into();
			}
			self.data = &self.data[bytes_written..];
		}
		Ok(()).into()
	}
}

/// A future that flushes, and optionally closes, an `AsyncWrite`.
#[derive(Debug)]
pub struct FlushFuture<'a, T: AsyncWrite + ?Sized> {
	sink: Pin<&'a mut T>,
	close: bool,
}

impl<T: AsyncWrite + ?Sized> Future for FlushFuture<'_, T> {
	type Output = Result<()>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		if self.close {
			self.sink.as_mut().poll_close(cx)
		} else {
			self.sink.as_mut().poll_flush(cx)
		}
	}
}

/// Reads until end of stream, appending everything to `out`.
#[cfg(test)]
pub async fn read_to_end<Source: AsyncRead + ?Sized>(
	mut src: Pin<&mut Source>,
	out: &mut Vec<u8>,
) -> Result<()> {
	let mut buffer = [0_u8; 7];
	loop {
		let bytes_read = src.as_mut().read(&mut buffer).await?;
		if bytes_read == 0 {
			return Ok(());
		}
		out.extend_from_slice(&buffer[..bytes_read]);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use futures_executor::block_on;

	/// A sink that accepts at most `per_write` bytes per call and records flushes and closes.
	struct Trickle {
		v: Vec<u8>,
		per_write: usize,
		flushed: bool,
		closed: bool,
	}

	impl Trickle {
		fn new(per_write: usize) -> Self {
			Self {
				v: vec![],
				per_write,
				flushed: false,
				closed: false,
			}
		}
	}

	impl AsyncWrite for Trickle {
		fn poll_write(
			mut self: Pin<&mut Self>,
			_cx: &mut Context<'_>,
			data: &[u8],
		) -> Poll<Result<usize>> {
			let n = std::cmp::min(self.per_write, data.len());
			self.v.extend_from_slice(&data[..n]);
			Ok(n).into()
		}

		fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
			self.flushed = true;
			Ok(()).into()
		}

		fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
			self.closed = true;
			Ok(()).into()
		}
	}

	/// Tests consuming part of a buffered source through `read_buf`.
	#[test]
	fn test_read_buf_partial_consume() {
		block_on(async {
			let mut src: &[u8] = &b"abcdefgh"[..];
			let first = Pin::new(&mut src)
				.read_buf(|bytes| (3, bytes.len()))
				.await
				.unwrap();
			assert_eq!(first, 8);
			assert_eq!(src, b"defgh");
		});
	}

	/// Tests that `read_buf` hands the callback an empty slice at end of stream.
	#[test]
	fn test_read_buf_eof() {
		block_on(async {
			let mut src: &[u8] = &b""[..];
			let empty = Pin::new(&mut src)
				.read_buf(|bytes| (0, bytes.is_empty()))
				.await
				.unwrap();
			assert!(empty);
		});
	}

	/// Tests calling `read` on a source.
	#[test]
	fn test_read() {
		block_on(async {
			let mut src: &[u8] = &b"abcdefgh"[..];
			let mut buffer = [0u8; 4];
			let bytes_read = Pin::new(&mut src).read(&mut buffer[..]).await.unwrap();
			assert_eq!(bytes_read, 4);
			assert_eq!(&buffer, b"abcd");
		});
	}

	/// Tests calling `write_all` on a sink that accepts data only one byte at a time.
	#[test]
	fn test_write_all_slow() {
		let mut t = Trickle::new(1);
		block_on(async { Pin::new(&mut t).write_all(b"abcdefgh").await }).unwrap();
		assert_eq!(t.v.as_slice(), b"abcdefgh");
	}

	/// Tests that a sink refusing all data is reported rather than looping forever.
	#[test]
	fn test_write_all_zero() {
		let mut t = Trickle::new(0);
		let e = block_on(async { Pin::new(&mut t).write_all(b"abc").await }).unwrap_err();
		assert_eq!(e.kind(), std::io::ErrorKind::WriteZero);
	}

	/// Tests that `flush` and `close` reach the right poll functions.
	#[test]
	fn test_flush_and_close() {
		let mut t = Trickle::new(8);
		block_on(async { Pin::new(&mut t).flush().await }).unwrap();
		assert!(t.flushed && !t.closed);
		block_on(async { Pin::new(&mut t).close().await }).unwrap();
		assert!(t.closed);
	}
}
