mod body;
mod builder;
mod headers;
mod wire;

pub use body::{EncodeImage, Payload};
pub use builder::RequestBuilder;
pub use headers::{format_http_date, BasicCredentials, HeaderValue};
pub(crate) use wire::{send_body, send_head};

use bytes::Bytes;
use mime::Mime;
use std::fmt::{Display, Formatter};
use url::Url;

/// An HTTP request method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
	/// `GET`
	Get,
	/// `HEAD`
	Head,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
	/// `OPTIONS`
	Options,
	/// `PATCH`
	Patch,
	/// `TRACE`
	Trace,
}

impl Method {
	/// Returns the method name as it appears on the request line.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Head => "HEAD",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
			Self::Options => "OPTIONS",
			Self::Patch => "PATCH",
			Self::Trace => "TRACE",
		}
	}
}

impl Display for Method {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An HTTP/1.x protocol version.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Version {
	/// HTTP/1.0
	Http10,
	/// HTTP/1.1
	#[default]
	Http11,
}

impl Version {
	/// Returns the version as it appears on the request line.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Http10 => "HTTP/1.0",
			Self::Http11 => "HTTP/1.1",
		}
	}
}

/// A single request header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
	/// The header name, exactly as it will be sent.
	pub name: String,

	/// The rendered header value.
	pub value: String,
}

/// An encoded request body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Body {
	/// The bytes to transmit.
	pub(crate) bytes: Bytes,

	/// The media type announced in `Content-Type`.
	pub(crate) content_type: Mime,

	/// Whether the request announces `Expect: 100-continue` and withholds the body until the server
	/// agrees to receive it.
	pub(crate) expect_continue: bool,
}

impl Body {
	/// Returns the encoded body bytes.
	pub fn bytes(&self) -> &Bytes {
		&self.bytes
	}

	/// Returns the body’s media type.
	pub fn content_type(&self) -> &Mime {
		&self.content_type
	}
}

/// A fully-specified HTTP request.
///
/// A `Request` is produced by [`RequestBuilder::build`] and never changes afterwards. Its headers
/// are exactly the headers that go on the wire, in order: the defaults (`Host`, `Connection`,
/// `Date`), then every header the application added, then the headers describing the body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
	pub(crate) method: Method,
	pub(crate) url: Url,
	pub(crate) version: Version,
	pub(crate) headers: Vec<Header>,
	pub(crate) body: Option<Body>,
}

impl Request {
	/// Returns the request method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Returns the absolute URL the request targets.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Returns the protocol version.
	pub fn version(&self) -> Version {
		self.version
	}

	/// Returns all headers in transmission order.
	pub fn headers(&self) -> &[Header] {
		&self.headers
	}

	/// Returns the value of the first header named `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|h| h.name.eq_ignore_ascii_case(name))
			.map(|h| h.value.as_str())
	}

	/// Returns the values of every header named `name`, compared case-insensitively, in order.
	pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
		self.headers
			.iter()
			.filter(move |h| h.name.eq_ignore_ascii_case(name))
			.map(|h| h.value.as_str())
	}

	/// Returns the body, if there is one.
	pub fn body(&self) -> Option<&Body> {
		self.body.as_ref()
	}

	/// Returns the `request-target` for the request line: the path and, if present, the query.
	pub fn request_target(&self) -> String {
		let path = match self.url.path() {
			"" => "/",
			path => path,
		};
		match self.url.query() {
			Some(query) => format!("{path}?{query}"),
			None => path.to_owned(),
		}
	}

	/// Collects the facts the response side needs to know about this request.
	pub(crate) fn metadata(&self) -> Metadata {
		Metadata {
			head: self.method == Method::Head,
			expect_continue: self.body.as_ref().is_some_and(|b| b.expect_continue),
		}
	}
}

/// Metadata about a request.
///
/// Certain information about a request is needed in order to properly process the corresponding
/// response. It is captured when the request head is sent and consulted when the response head is
/// received.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Metadata {
	/// Whether the method was `HEAD`.
	pub(crate) head: bool,

	/// Whether the body is withheld until a `100 Continue` arrives.
	pub(crate) expect_continue: bool,
}
