mod body;
mod headers;

pub(crate) use body::Receive as ReceiveBody;
pub(crate) use headers::{framing, receive as receive_head};

/// A single response header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseHeader {
	/// The header name, as sent by the server.
	pub name: String,

	/// The raw header value.
	pub value: Vec<u8>,
}

/// An HTTP status line and response headers, owned so they can travel with a
/// [`State::HeadersReceived`](crate::State::HeadersReceived) event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseHead {
	/// The HTTP minor version number.
	///
	/// For example, for HTTP/1.0, this is zero; for HTTP/1.1, this is 1.
	pub minor_version: u8,

	/// The status code.
	pub status: u16,

	/// The reason phrase.
	pub reason: String,

	/// The response headers, in the order received.
	pub headers: Vec<ResponseHeader>,
}

impl ResponseHead {
	/// Returns the value of the first header named `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&[u8]> {
		self.headers
			.iter()
			.find(|h| h.name.eq_ignore_ascii_case(name))
			.map(|h| h.value.as_slice())
	}

	/// Returns the value of the first header named `name` if it is valid UTF-8.
	pub fn header_str(&self, name: &str) -> Option<&str> {
		self.header(name).and_then(|v| std::str::from_utf8(v).ok())
	}

	/// Returns whether the status is 1xx.
	pub fn is_informational(&self) -> bool {
		(100..=199).contains(&self.status)
	}

	/// Returns whether the status is one of the redirection codes that carries a `Location`.
	pub fn is_redirect(&self) -> bool {
		matches!(self.status, 301 | 302 | 303 | 307 | 308)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn head(status: u16, headers: &[(&str, &[u8])]) -> ResponseHead {
		ResponseHead {
			minor_version: 1,
			status,
			reason: String::new(),
			headers: headers
				.iter()
				.map(|(name, value)| ResponseHeader {
					name: (*name).to_owned(),
					value: value.to_vec(),
				})
				.collect(),
		}
	}

	/// Tests case-insensitive lookup returning the first match.
	#[test]
	fn test_header_lookup() {
		let h = head(200, &[("Set-Cookie", b"a=1"), ("set-cookie", b"b=2"), ("X-Bin", b"\xFF")]);
		assert_eq!(h.header("SET-COOKIE"), Some(&b"a=1"[..]));
		assert_eq!(h.header_str("set-cookie"), Some("a=1"));
		assert_eq!(h.header("missing"), None);
		assert_eq!(h.header_str("x-bin"), None);
	}

	/// Tests status classification.
	#[test]
	fn test_status_classes() {
		assert!(head(100, &[]).is_informational());
		assert!(!head(200, &[]).is_informational());
		assert!(head(302, &[]).is_redirect());
		assert!(!head(304, &[]).is_redirect());
	}
}
