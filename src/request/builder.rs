use super::body::{self, EncodeImage, Payload};
use super::headers::{format_http_date, BasicCredentials, HeaderValue};
use super::{Body, Header, Method, Request, Version};
use crate::error::Error;
use crate::util::{is_field_value, is_token};
use log::trace;
use mime::Mime;
use std::io::Read;
use url::Url;

/// Accumulates the parts of a [`Request`].
///
/// The URL can be given whole with [`set_url`](Self::set_url) or assembled from its components;
/// component setters called after `set_url` override the corresponding part. Problems with the
/// inputs (an unparseable URL, an invalid header name, and so on) are remembered and reported by
/// [`build`](Self::build), so setters can be chained freely.
///
/// Building does not consume or modify the builder. A builder may be built any number of times and
/// each call yields a fresh, independent `Request` with its own `Date` header, which makes it easy
/// to re-send the same request.
///
/// # Example
/// ```
/// let request = evhc::RequestBuilder::new(evhc::Method::Put)
/// 	.set_url("http://example.com/a?x=1")
/// 	.add_header("X-Trace", "abc")
/// 	.set_body(&b"{\"k\":1}"[..], mime::APPLICATION_JSON)
/// 	.build()
/// 	.unwrap();
/// assert_eq!(request.request_target(), "/a?x=1");
/// assert_eq!(request.header("Content-Length"), Some("7"));
/// ```
#[derive(Clone, Debug)]
pub struct RequestBuilder {
	method: Method,
	version: Version,
	scheme: String,
	host: Option<String>,
	port: Option<u16>,
	username: Option<String>,
	password: Option<String>,
	path: String,
	path_elements: Vec<String>,
	query: Option<String>,
	query_pairs: Vec<(String, String)>,
	fragment: Option<String>,
	headers: Vec<Header>,
	body: Option<Body>,

	/// The problem with the last whole URL given, cleared by the next one.
	url_problem: Option<String>,

	/// The first configuration problem encountered, reported by `build`.
	problem: Option<String>,
}

impl RequestBuilder {
	/// Constructs an empty builder for the given method.
	pub fn new(method: Method) -> Self {
		Self {
			method,
			version: Version::default(),
			scheme: "http".to_owned(),
			host: None,
			port: None,
			username: None,
			password: None,
			path: String::new(),
			path_elements: Vec::new(),
			query: None,
			query_pairs: Vec::new(),
			fragment: None,
			headers: Vec::new(),
			body: None,
			url_problem: None,
			problem: None,
		}
	}

	/// Constructs a `GET` builder for a URL.
	pub fn get(url: &str) -> Self {
		let mut ret = Self::new(Method::Get);
		let _ = ret.set_url(url);
		ret
	}

	/// Constructs a `POST` builder for a URL.
	pub fn post(url: &str) -> Self {
		let mut ret = Self::new(Method::Post);
		let _ = ret.set_url(url);
		ret
	}

	/// Constructs a `PUT` builder for a URL.
	pub fn put(url: &str) -> Self {
		let mut ret = Self::new(Method::Put);
		let _ = ret.set_url(url);
		ret
	}

	/// Constructs a `DELETE` builder for a URL.
	pub fn delete(url: &str) -> Self {
		let mut ret = Self::new(Method::Delete);
		let _ = ret.set_url(url);
		ret
	}

	/// Returns the method the built requests will use.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Records a problem to report from `build`, keeping only the first.
	fn problem(&mut self, message: String) {
		if self.problem.is_none() {
			self.problem = Some(message);
		}
	}

	/// Sets the whole URL, replacing every URL component set so far.
	///
	/// An unparseable URL is reported by `build` unless a later call replaces it.
	pub fn set_url(&mut self, url: &str) -> &mut Self {
		match Url::parse(url) {
			Ok(url) => {
				let _ = self.set_parsed_url(&url);
			}
			Err(e) => self.url_problem = Some(format!("invalid URL {url:?}: {e}")),
		}
		self
	}

	/// Sets the whole URL from an already-parsed [`Url`].
	pub fn set_parsed_url(&mut self, url: &Url) -> &mut Self {
		self.scheme = url.scheme().to_owned();
		self.host = url.host_str().map(str::to_owned);
		self.url_problem = if self.host.is_none() {
			Some(format!("URL {url} has no host"))
		} else {
			None
		};
		self.port = url.port();
		self.username = Some(url.username())
			.filter(|u| !u.is_empty())
			.map(str::to_owned);
		self.password = url.password().map(str::to_owned);
		self.path = url.path().to_owned();
		self.path_elements.clear();
		self.query = url.query().map(str::to_owned);
		self.query_pairs.clear();
		self.fragment = url.fragment().map(str::to_owned);
		self
	}

	/// Sets the URL scheme (default `http`).
	pub fn set_scheme(&mut self, scheme: &str) -> &mut Self {
		scheme.clone_into(&mut self.scheme);
		self
	}

	/// Sets the host name or address.
	pub fn set_host(&mut self, host: &str) -> &mut Self {
		if host.is_empty() {
			self.problem("empty host".to_owned());
		}
		self.host = Some(host.to_owned());
		self
	}

	/// Sets an explicit port.
	pub fn set_port(&mut self, port: u16) -> &mut Self {
		if port == 0 {
			self.problem("port 0 is not a valid destination".to_owned());
		}
		self.port = Some(port);
		self
	}

	/// Sets the user name part of the URL.
	pub fn set_username(&mut self, username: &str) -> &mut Self {
		self.username = Some(username.to_owned());
		self
	}

	/// Sets the password part of the URL.
	pub fn set_password(&mut self, password: &str) -> &mut Self {
		self.password = Some(password.to_owned());
		self
	}

	/// Sets the path, discarding any path elements appended so far.
	pub fn set_path(&mut self, path: &str) -> &mut Self {
		path.clone_into(&mut self.path);
		self.path_elements.clear();
		self
	}

	/// Appends one path segment; `/` and other reserved characters in it are percent-encoded.
	pub fn add_path_element(&mut self, element: &str) -> &mut Self {
		self.path_elements.push(element.to_owned());
		self
	}

	/// Sets the raw query string, discarding any query pairs appended so far.
	pub fn set_query(&mut self, query: &str) -> &mut Self {
		self.query = Some(query.to_owned());
		self.query_pairs.clear();
		self
	}

	/// Appends a form-encoded `key=value` pair to the query.
	pub fn add_query_pair(&mut self, key: &str, value: &str) -> &mut Self {
		self.query_pairs.push((key.to_owned(), value.to_owned()));
		self
	}

	/// Sets the fragment (anchor).
	pub fn set_fragment(&mut self, fragment: &str) -> &mut Self {
		self.fragment = Some(fragment.to_owned());
		self
	}

	/// Sets the protocol version (default HTTP/1.1).
	pub fn set_version(&mut self, version: Version) -> &mut Self {
		self.version = version;
		self
	}

	/// Appends a header.
	///
	/// Headers are sent in the order they are added, after the default `Host`, `Connection` and
	/// `Date` headers. Adding a header with a name that is already present, including one of the
	/// defaults, adds another instance rather than replacing it.
	pub fn add_header<V: HeaderValue + ?Sized>(&mut self, name: &str, value: &V) -> &mut Self {
		let value = value.to_header_value();
		if !is_token(name) {
			self.problem(format!("header name {name:?} is not a token"));
		} else if !is_field_value(value.as_bytes()) {
			self.problem(format!("header {name} has invalid value {value:?}"));
		}
		self.headers.push(Header {
			name: name.to_owned(),
			value,
		});
		self
	}

	/// Adds an `Authorization` header carrying `Basic` credentials.
	pub fn basic_authentication(&mut self, username: &str, password: &str) -> &mut Self {
		self.add_header("Authorization", &BasicCredentials::new(username, password))
	}

	/// Sets an in-memory body, replacing any previous body.
	pub fn set_body(&mut self, payload: impl Into<Payload>, content_type: Mime) -> &mut Self {
		self.body = Some(body::encode(payload.into(), content_type));
		self
	}

	/// Reads a stream fully into memory and uses it as the body.
	///
	/// # Errors
	/// Returns [`Error::Serialization`] if reading the stream fails; the previous body is kept.
	pub fn set_body_reader(
		&mut self,
		reader: impl Read,
		content_type: Mime,
	) -> Result<&mut Self, Error> {
		self.body = Some(body::read_stream(reader, content_type)?);
		Ok(self)
	}

	/// Encodes an image in the format named by `content_type` and uses it as the body.
	///
	/// # Errors
	/// Returns [`Error::Serialization`] if the image cannot be encoded; the previous body is kept.
	pub fn set_body_image(
		&mut self,
		image: &(impl EncodeImage + ?Sized),
		content_type: Mime,
	) -> Result<&mut Self, Error> {
		self.body = Some(body::encode_image(image, content_type)?);
		Ok(self)
	}

	/// Serializes a value to JSON and uses it as the body, with type `application/json`.
	///
	/// # Errors
	/// Returns [`Error::Serialization`] if the value cannot be serialized; the previous body is
	/// kept.
	pub fn set_body_json(
		&mut self,
		value: &(impl serde::Serialize + ?Sized),
	) -> Result<&mut Self, Error> {
		self.body = Some(body::encode_json(value)?);
		Ok(self)
	}

	/// Assembles the URL from its components.
	fn url(&self) -> Result<Url, Error> {
		let host = self
			.host
			.as_deref()
			.ok_or_else(|| Error::configuration("URL not set"))?;
		let mut url = Url::parse(&format!("{}://{}", self.scheme, host))
			.map_err(|e| Error::configuration(format!("invalid URL: {e}")))?;
		let bad_component = |what: &str| Error::configuration(format!("URL cannot carry a {what}"));
		url.set_port(self.port).map_err(|()| bad_component("port"))?;
		if let Some(username) = &self.username {
			url.set_username(username)
				.map_err(|()| bad_component("user name"))?;
		}
		url.set_password(self.password.as_deref())
			.map_err(|()| bad_component("password"))?;
		url.set_path(&self.path);
		if !self.path_elements.is_empty() {
			let _ = url
				.path_segments_mut()
				.map_err(|()| bad_component("path"))?
				.pop_if_empty()
				.extend(&self.path_elements);
		}
		url.set_query(self.query.as_deref());
		if !self.query_pairs.is_empty() {
			let _ = url.query_pairs_mut().extend_pairs(&self.query_pairs);
		}
		url.set_fragment(self.fragment.as_deref());
		Ok(url)
	}

	/// Produces a request from the current configuration.
	///
	/// The request starts with `Host` (derived from the URL), `Connection: close` and `Date` (the
	/// current time), followed by the added headers in insertion order and finally, if there is a
	/// body, `Expect: 100-continue` (pre-built buffers only), `Content-Length` and `Content-Type`.
	///
	/// # Errors
	/// Returns [`Error::Configuration`] if no host has been set, or if any earlier setter was given
	/// invalid input.
	pub fn build(&self) -> Result<Request, Error> {
		if let Some(problem) = self.url_problem.as_ref().or(self.problem.as_ref()) {
			return Err(Error::configuration(problem.clone()));
		}
		let url = self.url()?;

		let host = match (url.host_str(), url.port()) {
			(Some(host), Some(port)) => format!("{host}:{port}"),
			(Some(host), None) => host.to_owned(),
			(None, _) => return Err(Error::configuration("URL not set")),
		};
		let mut headers = Vec::with_capacity(self.headers.len() + 6);
		headers.push(Header {
			name: "Host".to_owned(),
			value: host,
		});
		headers.push(Header {
			name: "Connection".to_owned(),
			value: "close".to_owned(),
		});
		headers.push(Header {
			name: "Date".to_owned(),
			value: format_http_date(&chrono::Utc::now()),
		});
		headers.extend(self.headers.iter().cloned());
		if let Some(body) = &self.body {
			if body.expect_continue {
				headers.push(Header {
					name: "Expect".to_owned(),
					value: "100-continue".to_owned(),
				});
			}
			headers.push(Header {
				name: "Content-Length".to_owned(),
				value: body.bytes.len().to_header_value(),
			});
			headers.push(Header {
				name: "Content-Type".to_owned(),
				value: body.content_type.to_header_value(),
			});
		}

		let request = Request {
			method: self.method,
			url,
			version: self.version,
			headers,
			body: self.body.clone(),
		};
		trace!(
			"built {} {} with {} header entries",
			request.method,
			request.url,
			request.headers.len()
		);
		Ok(request)
	}
}
