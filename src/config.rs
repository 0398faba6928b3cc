//! Dispatcher settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings applied to every exchange a [`Dispatcher`](crate::Dispatcher) runs.
///
/// Every field has a default, so a configuration file only needs to name what it changes:
///
/// ```
/// let config: evhc::Config = serde_json::from_str(r#"{"timeout_ms": 2500}"#).unwrap();
/// assert_eq!(config.timeout, Some(std::time::Duration::from_millis(2500)));
/// assert_eq!(config.max_headers, 128);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
	/// The deadline for a whole exchange, from connecting to the end of the body.
	///
	/// When it expires the exchange is abandoned, its connection released, and `Timeout` then
	/// `Closed` are delivered. `None` waits forever.
	#[serde(rename = "timeout_ms", with = "millis")]
	pub timeout: Option<Duration>,

	/// The largest response head accepted, in bytes.
	pub max_header_bytes: usize,

	/// The largest number of response headers accepted.
	pub max_headers: usize,

	/// The size of each body read, and so the largest payload of one `ContentReceived` event.
	pub read_chunk_size: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			timeout: None,
			max_header_bytes: 16384,
			max_headers: 128,
			read_chunk_size: 8192,
		}
	}
}

/// Represents an optional duration as a whole number of milliseconds.
mod millis {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub(super) fn serialize<S: Serializer>(
		value: &Option<Duration>,
		serializer: S,
	) -> Result<S::Ok, S::Error> {
		match value {
			Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
			None => serializer.serialize_none(),
		}
	}

	pub(super) fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Option<Duration>, D::Error> {
		Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
	}
}
