use base64::prelude::*;
use chrono::format::Numeric::{Day, Hour, Minute, Second, Year};
use chrono::format::{Fixed, Item, Pad};
use chrono::{DateTime, Utc};
use mime::Mime;
use url::Url;

/// The IMF-fixdate format used by `Date` and other HTTP date headers.
const HTTP_DATE: &[Item<'static>] = &[
	Item::Fixed(Fixed::ShortWeekdayName),
	Item::Literal(", "),
	Item::Numeric(Day, Pad::Zero),
	Item::Literal(" "),
	Item::Fixed(Fixed::ShortMonthName),
	Item::Literal(" "),
	Item::Numeric(Year, Pad::Zero),
	Item::Literal(" "),
	Item::Numeric(Hour, Pad::Zero),
	Item::Literal(":"),
	Item::Numeric(Minute, Pad::Zero),
	Item::Literal(":"),
	Item::Numeric(Second, Pad::Zero),
	Item::Literal(" GMT"),
];

/// Formats a timestamp as an HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(when: &DateTime<Utc>) -> String {
	when.format_with_items(HTTP_DATE.iter()).to_string()
}

/// A value that can be rendered into a request header.
///
/// Typed values let [`RequestBuilder::add_header`](crate::RequestBuilder::add_header) accept
/// numbers, media types, dates, URLs and credentials directly, each rendered the way HTTP expects.
pub trait HeaderValue {
	/// Renders the value as header text.
	fn to_header_value(&self) -> String;
}

impl HeaderValue for str {
	fn to_header_value(&self) -> String {
		self.to_owned()
	}
}

impl HeaderValue for String {
	fn to_header_value(&self) -> String {
		self.clone()
	}
}

impl<T: HeaderValue + ?Sized> HeaderValue for &T {
	fn to_header_value(&self) -> String {
		(**self).to_header_value()
	}
}

macro_rules! integer_header_values {
	($($ty:ty),*) => {
		$(
			impl HeaderValue for $ty {
				fn to_header_value(&self) -> String {
					self.to_string()
				}
			}
		)*
	};
}

integer_header_values!(u16, u32, u64, usize, i32, i64);

impl HeaderValue for Mime {
	fn to_header_value(&self) -> String {
		self.to_string()
	}
}

impl HeaderValue for DateTime<Utc> {
	fn to_header_value(&self) -> String {
		format_http_date(self)
	}
}

impl HeaderValue for Url {
	fn to_header_value(&self) -> String {
		self.as_str().to_owned()
	}
}

/// Credentials for the `Basic` authentication scheme.
#[derive(Clone, Eq, PartialEq)]
pub struct BasicCredentials {
	username: String,
	password: String,
}

impl BasicCredentials {
	/// Constructs a new set of credentials.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
		}
	}

	/// Returns the user name.
	pub fn username(&self) -> &str {
		&self.username
	}
}

impl std::fmt::Debug for BasicCredentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BasicCredentials")
			.field("username", &self.username)
			.finish_non_exhaustive()
	}
}

impl HeaderValue for BasicCredentials {
	fn to_header_value(&self) -> String {
		format!(
			"Basic {}",
			BASE64_STANDARD.encode(format!("{}:{}", self.username, self.password))
		)
	}
}
