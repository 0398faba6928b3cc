use async_compat::{Compat, CompatExt as _};
use futures_io::{AsyncBufRead, AsyncWrite};
use log::debug;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::io::Result;
use std::net::Shutdown;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A hook that tears a connection down immediately.
pub type Release = Box<dyn FnOnce() + Send>;

/// An open connection: a buffered read half, a write half and optionally a release hook.
///
/// Dropping both halves must release the underlying connection. The release hook, if present,
/// must do so at once even while the halves are still owned by a running exchange; cancelling
/// calls it so the connection is gone before `Closed` is reported.
pub struct Connection<R, W> {
	/// The receiving half.
	pub reader: R,

	/// The sending half.
	pub writer: W,

	release: Option<Release>,
}

impl<R, W> Connection<R, W> {
	/// Wraps a pair of halves without a release hook.
	pub fn new(reader: R, writer: W) -> Self {
		Self {
			reader,
			writer,
			release: None,
		}
	}

	/// Attaches a release hook.
	#[must_use]
	pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
		self.release = Some(Box::new(release));
		self
	}

	/// Splits the connection into its halves and release hook.
	pub(crate) fn into_parts(self) -> (R, W, Option<Release>) {
		(self.reader, self.writer, self.release)
	}
}

impl<R, W> Debug for Connection<R, W> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("release", &self.release.is_some())
			.finish_non_exhaustive()
	}
}

/// Opens byte-stream connections to servers.
///
/// Implement this to run exchanges over something other than plain TCP, or to script a server in
/// tests.
pub trait Connect: Send + Sync + 'static {
	/// The receiving half of a connection.
	type Reader: AsyncBufRead + Unpin + Send + 'static;

	/// The sending half of a connection.
	type Writer: AsyncWrite + Unpin + Send + 'static;

	/// Connects to `port` on `host`, which is a domain name or a textual IP address (IPv6
	/// addresses without brackets).
	///
	/// # Errors
	/// This function returns an error if name resolution or connecting fails.
	fn connect(
		&self,
		host: &str,
		port: u16,
	) -> impl Future<Output = Result<Connection<Self::Reader, Self::Writer>>> + Send;
}

/// Connects over TCP using tokio.
///
/// The release hook shuts the socket down in both directions through a duplicate handle.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connect for TcpConnector {
	type Reader = Compat<BufReader<OwnedReadHalf>>;
	type Writer = Compat<OwnedWriteHalf>;

	fn connect(
		&self,
		host: &str,
		port: u16,
	) -> impl Future<Output = Result<Connection<Self::Reader, Self::Writer>>> + Send {
		let host = host.to_owned();
		async move {
			let socket = TcpStream::connect((host.as_str(), port)).await?;
			socket.set_nodelay(true)?;
			let local = socket.local_addr()?;
			debug!("connected to {host}:{port} from {local}");
			let socket = socket.into_std()?;
			let control = socket.try_clone()?;
			let (read, write) = TcpStream::from_std(socket)?.into_split();
			Ok(
				Connection::new(BufReader::new(read).compat(), write.compat()).with_release(
					move || {
						if let Err(e) = control.shutdown(Shutdown::Both) {
							debug!("shutting down connection from {local}: {e}");
						}
					},
				),
			)
		}
	}
}
