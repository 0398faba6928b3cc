use super::connect::{Connect, Release};
use crate::config::Config;
use crate::error::Error;
use crate::future::ResponseFuture;
use crate::request::{send_body, send_head, Request};
use crate::response::{framing, receive_head, ReceiveBody, ResponseHead};
use crate::state::State;
use crate::util::io::{AsyncReadExt as _, AsyncWriteExt as _};
use bytes::Bytes;
use futures_io::AsyncBufRead;
use log::debug;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Host;

/// Why an exchange stopped early.
#[derive(Debug)]
pub(crate) enum Stop {
	/// The future refused an event because the exchange was cancelled or closed.
	Rejected,

	/// The exchange failed.
	Failed(Error),
}

impl From<Error> for Stop {
	fn from(error: Error) -> Self {
		Self::Failed(error)
	}
}

/// What a [`ReleaseSlot`] holds.
enum Slot {
	/// No connection is held.
	Empty,

	/// A connection is held and this tears it down.
	Armed(Release),

	/// The exchange was cancelled; a connection arriving now is released at once.
	Released,
}

/// Where a running exchange parks the release hook of the connection it holds, so a
/// cancellation on another thread can tear the connection down before reporting `Closed`.
pub(crate) struct ReleaseSlot(Mutex<Slot>);

impl ReleaseSlot {
	pub(crate) fn new() -> Self {
		Self(Mutex::new(Slot::Empty))
	}

	fn lock(&self) -> MutexGuard<'_, Slot> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Releases the held connection, if any, and every connection parked afterwards.
	pub(crate) fn release(&self) {
		let previous = std::mem::replace(&mut *self.lock(), Slot::Released);
		if let Slot::Armed(hook) = previous {
			hook();
		}
	}

	/// Parks a connection's release hook for as long as the returned guard lives.
	///
	/// Returns `None`, after releasing the connection, if the slot was already released.
	fn arm(&self, hook: Option<Release>) -> Option<Armed<'_>> {
		let mut slot = self.lock();
		if matches!(*slot, Slot::Released) {
			drop(slot);
			if let Some(hook) = hook {
				hook();
			}
			return None;
		}
		if let Some(hook) = hook {
			*slot = Slot::Armed(hook);
		}
		Some(Armed(self))
	}
}

/// Unparks a release hook without calling it once the connection is dropped normally.
struct Armed<'slot>(&'slot ReleaseSlot);

impl Drop for Armed<'_> {
	fn drop(&mut self) {
		let mut slot = self.0.lock();
		if matches!(*slot, Slot::Armed(_)) {
			*slot = Slot::Empty;
		}
	}
}

/// Classifies an I/O error raised after the connection was opened.
fn failed(error: std::io::Error) -> Stop {
	Stop::Failed(Error::from_exchange_io(error))
}

/// Delivers an event, stopping the exchange if it is refused.
fn emit(future: &ResponseFuture, state: State) -> Result<(), Stop> {
	if future.deliver(state) {
		Ok(())
	} else {
		Err(Stop::Rejected)
	}
}

/// Receives response heads until one that is not interim.
async fn receive_final<Socket: AsyncBufRead + ?Sized>(
	mut socket: Pin<&mut Socket>,
	config: &Config,
) -> std::io::Result<ResponseHead> {
	loop {
		let head = receive_head(socket.as_mut(), config.max_header_bytes, config.max_headers).await?;
		if !head.is_informational() {
			break Ok(head);
		}
		debug!("skipping interim response {}", head.status);
	}
}

/// Runs one exchange, delivering every event up to and including `Finished`.
///
/// The connection is released when this function returns, so the caller delivers the final
/// `Closed` (on success) or `Error` (on failure) afterwards. Nothing is delivered after a
/// rejection. While the connection is held, its release hook is parked in `slot`.
pub(crate) async fn run<C: Connect + ?Sized>(
	connector: &C,
	config: &Config,
	request: &Arc<Request>,
	future: &ResponseFuture,
	slot: &ReleaseSlot,
) -> Result<(), Stop> {
	let url = request.url();
	if url.scheme() != "http" {
		return Err(Error::configuration(format!("unsupported scheme {:?}", url.scheme())).into());
	}
	let host = match url.host() {
		Some(Host::Domain(domain)) => domain.to_owned(),
		Some(Host::Ipv4(address)) => address.to_string(),
		Some(Host::Ipv6(address)) => address.to_string(),
		None => return Err(Error::configuration("URL has no host").into()),
	};
	let port = url.port_or_known_default().unwrap_or(80);

	emit(future, State::Connecting)?;
	debug!("connecting to {host}:{port}");
	let (reader, writer, release) = connector
		.connect(&host, port)
		.await
		.map_err(|e| Stop::Failed(Error::Connection(e)))?
		.into_parts();
	let _armed = slot.arm(release).ok_or(Stop::Rejected)?;
	// Declared after the guard so the halves are dropped before it unparks the hook.
	let (mut reader, mut writer) = (reader, writer);
	let mut reader = Pin::new(&mut reader);
	let mut writer = Pin::new(&mut writer);
	emit(future, State::Connected)?;

	emit(future, State::SendRequest(Arc::clone(request)))?;
	let metadata = send_head(request, writer.as_mut()).await.map_err(failed)?;
	let head = if metadata.expect_continue {
		// The head must reach the server before it can answer 100.
		writer.as_mut().flush().await.map_err(failed)?;
		let first = loop {
			let head = receive_head(reader.as_mut(), config.max_header_bytes, config.max_headers)
				.await
				.map_err(failed)?;
			if head.status == 100 || !head.is_informational() {
				break head;
			}
			debug!("skipping interim response {}", head.status);
		};
		if first.status == 100 {
			emit(future, State::Continue)?;
			send_body(request, writer.as_mut()).await.map_err(failed)?;
			emit(future, State::AwaitResponse)?;
			receive_final(reader.as_mut(), config).await.map_err(failed)?
		} else {
			debug!("server answered {} without 100 Continue, body withheld", first.status);
			emit(future, State::AwaitResponse)?;
			first
		}
	} else {
		send_body(request, writer.as_mut()).await.map_err(failed)?;
		emit(future, State::AwaitResponse)?;
		receive_final(reader.as_mut(), config).await.map_err(failed)?
	};

	let head = Arc::new(head);
	emit(future, State::HeadersReceived(Arc::clone(&head)))?;
	if head.is_redirect() {
		if let Some(location) = head
			.header_str("location")
			.and_then(|location| request.url().join(location.trim()).ok())
		{
			debug!("{} redirect to {location}", head.status);
			emit(future, State::Redirect(location))?;
		}
	}

	let framing = framing(&head, metadata).map_err(failed)?;
	let mut body = ReceiveBody::new(reader.as_mut(), framing);
	let mut buffer = vec![0_u8; config.read_chunk_size.max(1)];
	loop {
		let bytes_read = Pin::new(&mut body).read(&mut buffer).await.map_err(failed)?;
		if bytes_read == 0 {
			break;
		}
		emit(
			future,
			State::ContentReceived(Bytes::copy_from_slice(&buffer[..bytes_read])),
		)?;
	}
	emit(future, State::Finished)?;

	if let Err(e) = writer.close().await {
		debug!("error closing connection to {host}:{port}: {e}");
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::dispatch::connect::Connection;
	use crate::error::InvalidData;
	use crate::{Method, RequestBuilder, StateKind};
	use futures_executor::block_on;
	use std::sync::Mutex;
	use std::task::{Context, Poll};

	/// A sink whose contents stay reachable after the connection is handed over.
	#[derive(Clone, Default)]
	struct Sink(Arc<Mutex<Vec<u8>>>);

	impl futures_io::AsyncWrite for Sink {
		fn poll_write(
			self: Pin<&mut Self>,
			_cx: &mut Context<'_>,
			buf: &[u8],
		) -> Poll<std::io::Result<usize>> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len()).into()
		}

		fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
			Ok(()).into()
		}

		fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
			Ok(()).into()
		}
	}

	/// A connector that answers every connection with a canned response.
	struct Script {
		response: &'static [u8],
		sent: Sink,
		target: Mutex<Option<(String, u16)>>,
	}

	impl Script {
		fn new(response: &'static [u8]) -> Self {
			Self {
				response,
				sent: Sink::default(),
				target: Mutex::new(None),
			}
		}

		fn sent(&self) -> Vec<u8> {
			self.sent.0.lock().unwrap().clone()
		}
	}

	impl Connect for Script {
		type Reader = &'static [u8];
		type Writer = Sink;

		async fn connect(
			&self,
			host: &str,
			port: u16,
		) -> std::io::Result<Connection<&'static [u8], Sink>> {
			*self.target.lock().unwrap() = Some((host.to_owned(), port));
			Ok(Connection::new(self.response, self.sent.clone()))
		}
	}

	/// A connector that is always refused.
	struct Refuse;

	impl Connect for Refuse {
		type Reader = &'static [u8];
		type Writer = Sink;

		async fn connect(
			&self,
			_host: &str,
			_port: u16,
		) -> std::io::Result<Connection<&'static [u8], Sink>> {
			Err(std::io::ErrorKind::ConnectionRefused.into())
		}
	}

	/// Runs an exchange and returns its outcome and the events it delivered.
	fn drive(
		connector: &impl Connect,
		config: &Config,
		request: Request,
	) -> (Result<(), Stop>, Vec<String>) {
		let future = ResponseFuture::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&log);
		future.register_any(move |state: &State| sink.lock().unwrap().push(state.to_string()));
		let slot = ReleaseSlot::new();
		let result = block_on(run(connector, config, &Arc::new(request), &future, &slot));
		let events = log.lock().unwrap().clone();
		(result, events)
	}

	fn get(url: &str) -> Request {
		RequestBuilder::get(url).build().unwrap()
	}

	/// Tests a plain successful exchange.
	#[test]
	fn test_success() {
		let script = Script::new(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
		let (result, events) = drive(&script, &Config::default(), get("http://example.com:8080/x"));
		result.unwrap();
		assert_eq!(
			events,
			[
				"Connecting",
				"Connected",
				"SendRequest",
				"AwaitResponse",
				"HeadersReceived(200)",
				"ContentReceived(5 bytes)",
				"Finished",
			]
		);
		assert_eq!(
			*script.target.lock().unwrap(),
			Some(("example.com".to_owned(), 8080))
		);
		assert!(script.sent().starts_with(b"GET /x HTTP/1.1\r\nHost: example.com:8080\r\n"));
	}

	/// Tests that the body is split by the read size and de-chunked.
	#[test]
	fn test_chunked_pieces() {
		let script = Script::new(
			b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n7\r\n, World\r\n0\r\n\r\n",
		);
		let config = Config {
			read_chunk_size: 4,
			..Config::default()
		};
		let (result, events) = drive(&script, &config, get("http://example.com/"));
		result.unwrap();
		let pieces: Vec<_> = events
			.iter()
			.filter(|e| e.starts_with("ContentReceived"))
			.collect();
		assert_eq!(
			pieces,
			[
				"ContentReceived(4 bytes)",
				"ContentReceived(1 bytes)",
				"ContentReceived(4 bytes)",
				"ContentReceived(3 bytes)",
			]
		);
	}

	/// Tests that interim responses other than 100 are skipped.
	#[test]
	fn test_interim_skipped() {
		let script = Script::new(
			b"HTTP/1.1 103 Early Hints\r\nLink: </a>\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n",
		);
		let (result, events) = drive(&script, &Config::default(), get("http://example.com/"));
		result.unwrap();
		assert!(events.contains(&"HeadersReceived(204)".to_owned()));
		assert_eq!(events.last().map(String::as_str), Some("Finished"));
	}

	/// Tests that a withheld body is sent after 100 Continue.
	#[test]
	fn test_continue() {
		let script = Script::new(
			b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n",
		);
		let request = RequestBuilder::post("http://example.com/upload")
			.set_body(Bytes::from_static(b"payload"), mime::APPLICATION_OCTET_STREAM)
			.build()
			.unwrap();
		let (result, events) = drive(&script, &Config::default(), request);
		result.unwrap();
		assert_eq!(
			events,
			[
				"Connecting",
				"Connected",
				"SendRequest",
				"Continue",
				"AwaitResponse",
				"HeadersReceived(201)",
				"Finished",
			]
		);
		assert!(script.sent().ends_with(b"\r\n\r\npayload"));
	}

	/// Tests that a withheld body is never sent if the server answers at once.
	#[test]
	fn test_continue_refused() {
		let script = Script::new(b"HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\n\r\n");
		let request = RequestBuilder::post("http://example.com/upload")
			.set_body(Bytes::from_static(b"payload"), mime::APPLICATION_OCTET_STREAM)
			.build()
			.unwrap();
		let (result, events) = drive(&script, &Config::default(), request);
		result.unwrap();
		assert!(!events.contains(&"Continue".to_owned()));
		assert!(events.contains(&"HeadersReceived(413)".to_owned()));
		assert!(script.sent().ends_with(b"\r\n\r\n"));
	}

	/// Tests that a redirect is reported with its resolved location.
	#[test]
	fn test_redirect() {
		let script = Script::new(
			b"HTTP/1.1 302 Found\r\nLocation: /elsewhere?y=2\r\nContent-Length: 0\r\n\r\n",
		);
		let (result, events) = drive(&script, &Config::default(), get("http://example.com/a/b"));
		result.unwrap();
		assert_eq!(
			&events[4..],
			[
				"HeadersReceived(302)",
				"Redirect(http://example.com/elsewhere?y=2)",
				"Finished",
			]
		);
	}

	/// Tests that a HEAD response carries no body even with a Content-Length.
	#[test]
	fn test_head() {
		let script = Script::new(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n");
		let request = RequestBuilder::new(Method::Head)
			.set_url("http://example.com/")
			.build()
			.unwrap();
		let (result, events) = drive(&script, &Config::default(), request);
		result.unwrap();
		assert!(!events.iter().any(|e| e.starts_with("ContentReceived")));
	}

	/// Tests failures and how they are classified.
	#[test]
	fn test_failures() {
		let (result, events) = drive(&Refuse, &Config::default(), get("http://example.com/"));
		assert!(matches!(result, Err(Stop::Failed(Error::Connection(_)))));
		assert_eq!(events, ["Connecting"]);

		let script = Script::new(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");
		let (result, events) = drive(&script, &Config::default(), get("http://example.com/"));
		assert!(matches!(
			result,
			Err(Stop::Failed(Error::Protocol(InvalidData::Truncated)))
		));
		assert_eq!(events.last().map(String::as_str), Some("ContentReceived(5 bytes)"));

		let script = Script::new(b"garbage\r\n\r\n");
		let (result, _) = drive(&script, &Config::default(), get("http://example.com/"));
		assert!(matches!(
			result,
			Err(Stop::Failed(Error::Protocol(InvalidData::ParseHeaders(_))))
		));

		let script = Script::new(b"HTTP/1.1 200 OK\r\n\r\n");
		let (result, events) = drive(&script, &Config::default(), get("https://example.com/"));
		assert!(matches!(result, Err(Stop::Failed(Error::Configuration(_)))));
		assert!(events.is_empty());
	}

	/// Tests that a cancelled exchange stops at the first refused event.
	#[test]
	fn test_rejected() {
		let script = Script::new(b"HTTP/1.1 200 OK\r\n\r\n");
		let future = ResponseFuture::new();
		assert!(future.cancel());
		let result = block_on(run(
			&script,
			&Config::default(),
			&Arc::new(get("http://example.com/")),
			&future,
			&ReleaseSlot::new(),
		));
		assert!(matches!(result, Err(Stop::Rejected)));
		assert_eq!(future.last_state(), Some(StateKind::Closed));
		assert!(script.target.lock().unwrap().is_none());
	}

	/// Tests that the release hook is parked only while the connection is held.
	#[test]
	fn test_release_slot() {
		let calls = Arc::new(Mutex::new(0));
		let hook = |calls: &Arc<Mutex<i32>>| -> Option<Release> {
			let calls = Arc::clone(calls);
			Some(Box::new(move || *calls.lock().unwrap() += 1))
		};

		let slot = ReleaseSlot::new();
		drop(slot.arm(hook(&calls)));
		slot.release();
		assert_eq!(*calls.lock().unwrap(), 0);

		let slot = ReleaseSlot::new();
		let armed = slot.arm(hook(&calls));
		slot.release();
		assert_eq!(*calls.lock().unwrap(), 1);
		drop(armed);
		assert!(slot.arm(hook(&calls)).is_none());
		assert_eq!(*calls.lock().unwrap(), 2);
		slot.release();
		assert_eq!(*calls.lock().unwrap(), 2);
	}
}
