use crate::error::{Error, SerializationSource};
use crate::request::Body;
use bytes::Bytes;
use mime::Mime;
use std::io::{Read, Write};

/// An in-memory request body payload.
///
/// Each kind of payload is encoded differently by
/// [`RequestBuilder::set_body`](crate::RequestBuilder::set_body):
/// * text is sent as its UTF-8 bytes
/// * raw bytes are sent as-is
/// * a pre-built [`Bytes`] buffer is sent without copying and announces `Expect: 100-continue`,
///   so the server can refuse it before it is transmitted
///
/// Streams, images and serializable values have their own setters on the builder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
	/// Text, encoded as UTF-8.
	Text(String),

	/// Raw bytes, passed through.
	Bytes(Vec<u8>),

	/// A pre-built buffer, passed through directly.
	Buffer(Bytes),
}

impl From<&str> for Payload {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

impl From<String> for Payload {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<&[u8]> for Payload {
	fn from(bytes: &[u8]) -> Self {
		Self::Bytes(bytes.to_vec())
	}
}

impl From<Vec<u8>> for Payload {
	fn from(bytes: Vec<u8>) -> Self {
		Self::Bytes(bytes)
	}
}

impl From<Bytes> for Payload {
	fn from(buffer: Bytes) -> Self {
		Self::Buffer(buffer)
	}
}

/// An image that can encode itself into a named file format.
///
/// Implement this over whichever imaging library the application uses. `format` is the encoder
/// name derived from the request’s content type subtype (`png`, `gif`, `jpg`, …).
pub trait EncodeImage {
	/// Writes the image to `out` in the given format.
	///
	/// # Errors
	/// Returns an error if the format is unsupported or encoding fails.
	fn encode(&self, format: &str, out: &mut dyn Write) -> std::io::Result<()>;
}

/// Encodes an in-memory payload.
pub(super) fn encode(payload: Payload, content_type: Mime) -> Body {
	let (bytes, expect_continue) = match payload {
		Payload::Text(text) => (Bytes::from(text.into_bytes()), false),
		Payload::Bytes(bytes) => (Bytes::from(bytes), false),
		Payload::Buffer(buffer) => (buffer, true),
	};
	Body {
		bytes,
		content_type,
		expect_continue,
	}
}

/// Copies a byte stream fully into memory.
pub(super) fn read_stream(mut reader: impl Read, content_type: Mime) -> Result<Body, Error> {
	let mut buffer = Vec::new();
	let _ = reader
		.read_to_end(&mut buffer)
		.map_err(|e| Error::Serialization(e.into()))?;
	Ok(encode(Payload::Bytes(buffer), content_type))
}

/// Returns the encoder name for an image content type.
pub(super) fn image_format(content_type: &Mime) -> &str {
	match content_type.subtype().as_str() {
		"jpeg" => "jpg",
		other => other,
	}
}

/// Encodes an image into the format named by its content type.
pub(super) fn encode_image(
	image: &(impl EncodeImage + ?Sized),
	content_type: Mime,
) -> Result<Body, Error> {
	let mut buffer = Vec::new();
	image
		.encode(image_format(&content_type), &mut buffer)
		.map_err(|e| Error::Serialization(SerializationSource::Io(e)))?;
	Ok(encode(Payload::Bytes(buffer), content_type))
}

/// Serializes a value to JSON.
pub(super) fn encode_json(value: &(impl serde::Serialize + ?Sized)) -> Result<Body, Error> {
	let bytes = serde_json::to_vec(value)?;
	Ok(encode(Payload::Bytes(bytes), mime::APPLICATION_JSON))
}
