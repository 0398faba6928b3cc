use crate::error::BadChunkHeader;
use futures_core::ready;
use futures_io::AsyncRead;
use std::io::{ErrorKind, Result};
use std::num::NonZeroU64;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Checks whether a character can legally appear in the chunk extensions section.
fn is_chunk_ext_char(b: u8) -> bool {
	b == b'\t' || !b.is_ascii_control()
}

/// Returns the value of an ASCII hex digit.
fn hex_value(b: u8) -> Option<u64> {
	char::from(b).to_digit(16).map(u64::from)
}

/// The different states that the decoder can be in.
#[derive(Debug, Eq, PartialEq)]
enum State {
	/// The first hex digit of a chunk size is expected.
	SizeFirst,

	/// At least one hex digit of the chunk size has been seen; the value is the size so far.
	SizeRest(u64),

	/// Chunk extensions are being skipped; the value is the chunk size.
	Ext(u64),

	/// The LF ending a chunk header is expected; the value is the chunk size.
	HeaderLF(u64),

	/// Chunk data is being read; the value is the number of bytes left in the chunk.
	Data(NonZeroU64),

	/// The CR following the chunk data is expected.
	DataCR,

	/// The LF following the chunk data is expected.
	DataLF,

	/// The start of a trailer field line, or the CR of the final blank line, is expected.
	FinalCR,

	/// A trailer field line is being skipped.
	Trailer,

	/// The LF of the final blank line is expected.
	FinalLF,

	/// Everything has been read.
	Done,
}

/// A response body that is encoded using chunked transfer coding.
///
/// Chunk extensions and trailer fields are accepted and discarded.
#[derive(Debug)]
pub(super) struct Receive<'socket, Socket: AsyncRead + ?Sized> {
	/// The underlying socket.
	socket: Pin<&'socket mut Socket>,

	/// The current state.
	state: State,
}

impl<'socket, Socket: AsyncRead + ?Sized> Receive<'socket, Socket> {
	pub(super) fn new(socket: Pin<&'socket mut Socket>) -> Self {
		Self {
			socket,
			state: State::SizeFirst,
		}
	}

	/// Reads and returns one byte from the socket.
	fn poll_read_byte(&mut self, cx: &mut Context<'_>) -> Poll<Result<u8>> {
		let mut byte = [0_u8; 1];
		if ready!(self.socket.as_mut().poll_read(cx, &mut byte))? == 1 {
			Ok(byte[0]).into()
		} else {
			Err(ErrorKind::UnexpectedEof.into()).into()
		}
	}

	/// Reads one byte and checks that it is `expected`, then moves to `next`.
	fn poll_expect(&mut self, cx: &mut Context<'_>, expected: u8, next: State) -> Poll<Result<()>> {
		if ready!(self.poll_read_byte(cx))? == expected {
			self.state = next;
			Ok(()).into()
		} else {
			Err(BadChunkHeader::Newline.into()).into()
		}
	}

	/// Advances the state to either [`State::Data`] or [`State::Done`].
	///
	/// This function returns `Some(n)` in the case of [`State::Data`], where `n` is the number of
	/// bytes of body data that can be fetched, or `None` in the case of [`State::Done`].
	fn poll_advance_to_data(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<NonZeroU64>>> {
		loop {
			match self.state {
				State::SizeFirst => {
					let b = ready!(self.poll_read_byte(cx))?;
					match hex_value(b) {
						Some(nybble) => self.state = State::SizeRest(nybble),
						None => return Err(BadChunkHeader::SizeNotHex.into()).into(),
					}
				}

				State::SizeRest(size_so_far) => match ready!(self.poll_read_byte(cx))? {
					b';' => self.state = State::Ext(size_so_far),
					b'\r' => self.state = State::HeaderLF(size_so_far),
					b => match hex_value(b) {
						// Adding another digit would overflow.
						Some(_) if size_so_far >= 0x1000_0000_0000_0000_u64 => {
							return Err(BadChunkHeader::SizeNotU64.into()).into();
						}
						Some(nybble) => self.state = State::SizeRest((size_so_far << 4) | nybble),
						None => return Err(BadChunkHeader::SizeNotHex.into()).into(),
					},
				},

				State::Ext(chunk_size) => match ready!(self.poll_read_byte(cx))? {
					b'\r' => self.state = State::HeaderLF(chunk_size),
					b if is_chunk_ext_char(b) => (),
					_ => return Err(BadChunkHeader::ExtChar.into()).into(),
				},

				State::HeaderLF(chunk_size) => {
					let next = NonZeroU64::new(chunk_size).map_or(State::FinalCR, State::Data);
					ready!(self.poll_expect(cx, b'\n', next))?;
				}

				State::Data(chunk_remaining) => return Ok(Some(chunk_remaining)).into(),

				State::DataCR => ready!(self.poll_expect(cx, b'\r', State::DataLF))?,

				State::DataLF => ready!(self.poll_expect(cx, b'\n', State::SizeFirst))?,

				State::FinalCR => {
					self.state = match ready!(self.poll_read_byte(cx))? {
						b'\r' => State::FinalLF,
						b'\n' => return Err(BadChunkHeader::Newline.into()).into(),
						_ => State::Trailer,
					};
				}

				State::Trailer => {
					if ready!(self.poll_read_byte(cx))? == b'\n' {
						self.state = State::FinalCR;
					}
				}

				State::FinalLF => ready!(self.poll_expect(cx, b'\n', State::Done))?,

				State::Done => return Ok(None).into(),
			}
		}
	}
}

impl<Socket: AsyncRead + ?Sized> AsyncRead for Receive<'_, Socket> {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut [u8],
	) -> Poll<Result<usize>> {
		let this = self.get_mut();
		if buf.is_empty() {
			return Ok(0).into();
		}
		match ready!(this.poll_advance_to_data(cx))? {
			None => Ok(0).into(),
			Some(bytes_available) => {
				let to_read = std::cmp::min(buf.len() as u64, bytes_available.get()) as usize;
				let bytes_read = ready!(this.socket.as_mut().poll_read(cx, &mut buf[..to_read]))?;
				if bytes_read == 0 {
					return Err(ErrorKind::UnexpectedEof.into()).into();
				}
				let bytes_remaining = bytes_available.get() - bytes_read as u64;
				this.state = NonZeroU64::new(bytes_remaining).map_or(State::DataCR, State::Data);
				Ok(bytes_read).into()
			}
		}
	}
}
