/*!
# Writer for XML 1.0 documents

The inverse of the reader: a document-construction state machine which
encodes [`Item`]s into a caller-supplied [`bytes::BytesMut`]. The encoder
enforces the same document structure the reader accepts (prolog, exactly one
root element tree, epilog) and escapes or validates all content, so that the
output is well-formed by construction.
*/
use std::error;
use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::strings::{CDataStr, NameStr};

static XML_DECL: &'static [u8] = b"<?xml version='1.0' encoding='utf-8'?>\n";

const CDATA_SPECIALS: &'static [u8] = &[b'<', b'>', b'&', b'\r'];

const ATTR_SPECIALS: &'static [u8] = &[b'"', b'\'', b'\r', b'\n', b'\t', b'<', b'>', b'&'];

fn escape<'a, B: BufMut>(out: &'a mut B, data: &'a [u8], specials: &'static [u8]) {
	let mut last_index = 0;
	for i in 0..data.len() {
		let ch = data[i];
		if !specials.contains(&ch) {
			continue;
		}
		if i > last_index {
			out.put_slice(&data[last_index..i]);
		}
		match ch {
			b'"' => out.put_slice(b"&#34;"),
			b'\'' => out.put_slice(b"&#39;"),
			b'<' => out.put_slice(b"&lt;"),
			b'>' => out.put_slice(b"&gt;"),
			b'&' => out.put_slice(b"&amp;"),
			b'\r' => out.put_slice(b"&#xd;"),
			b'\n' => out.put_slice(b"&#xa;"),
			b'\t' => out.put_slice(b"&#x9;"),
			_ => panic!("unexpected special character?!"),
		}
		last_index = i + 1;
	}
	out.put_slice(&data[last_index..data.len()]);
}

/// An encodable item.
///
/// Items are borrowed, because the encoder copies their contents into the
/// output buffer anyway.
pub enum Item<'x> {
	/// XML declaration; always written as
	/// `<?xml version='1.0' encoding='utf-8'?>`.
	///
	/// Only allowed as the very first item of a document.
	XmlDeclaration,

	/// Document type declaration.
	///
	/// Only allowed before the root element, at most once. The root
	/// element name must match the declared name.
	DocumentType(&'x NameStr),

	/// A processing instruction with optional data.
	///
	/// The target must not lowercase to `xml`, the data must not contain
	/// `?>`.
	ProcessingInstruction(&'x NameStr, Option<&'x CDataStr>),

	/// A comment.
	///
	/// The text must not contain `--` and must not end with `-`.
	Comment(&'x CDataStr),

	/// Start of an element header.
	ElementHeadStart(&'x NameStr),

	/// An attribute key/value pair; the value is escaped automatically.
	///
	/// Only allowed while an element header is open; attribute names must
	/// be unique within the header.
	Attribute(&'x NameStr, &'x CDataStr),

	/// End of an element header (`>`).
	ElementHeadEnd,

	/// A piece of text (in element content, not attributes); escaped
	/// automatically.
	Text(&'x CDataStr),

	/// A CDATA section; written verbatim, which is why the contents must
	/// not contain `]]>`.
	CData(&'x CDataStr),

	/// Footer of an element.
	///
	/// If the element header is still open, the empty-element form `/>` is
	/// written; otherwise a full `</name>` end tag. Closing the root
	/// element ends the document.
	ElementFoot,
}

/// Error condition from encoding an item.
///
/// Encoder errors are reported synchronously and do not latch: the item is
/// rejected without being written and the document state is unchanged, so
/// the caller may continue with a corrected item.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// The item is not allowed in the current document state.
	///
	/// The contents are implementation details.
	InvalidState(&'static str),

	/// The item content would produce output which cannot be reparsed.
	///
	/// The contents are implementation details.
	InvalidContent(&'static str),

	/// Attribute with the same name was already written in this element
	/// header.
	DuplicateAttribute,

	/// The root element name does not match the declared document type
	/// name.
	DocumentTypeMismatch,
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidState(what) => write!(f, "{} not allowed at this point", what),
			Self::InvalidContent(what) => write!(f, "invalid content: {}", what),
			Self::DuplicateAttribute => f.write_str("duplicate attribute"),
			Self::DocumentTypeMismatch => {
				f.write_str("root element does not match document type name")
			}
		}
	}
}

impl error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
	/// Nothing has been written yet.
	Empty,
	/// Prolog items have been written, the root element has not been
	/// opened yet.
	DocumentStarted,
	/// An element header is open; attributes may still be written.
	ElementStarted,
	/// Inside element content.
	InElement,
	/// The root element has been closed; only epilog items may follow.
	DocumentEnded,
}

/**
# XML document encoder

Encodes a sequence of [`Item`]s into a [`BytesMut`], enforcing document
structure along the way.

## Example

```
use bytes::BytesMut;
use estax::writer::{Encoder, Item};
use std::convert::TryInto;

let mut enc = Encoder::new();
let mut out = BytesMut::new();
enc.encode(Item::XmlDeclaration, &mut out).unwrap();
enc.encode(Item::ElementHeadStart("root".try_into().unwrap()), &mut out).unwrap();
enc.encode(Item::Attribute("a".try_into().unwrap(), "x & y".try_into().unwrap()), &mut out).unwrap();
enc.encode(Item::ElementHeadEnd, &mut out).unwrap();
enc.encode(Item::Text("hello".try_into().unwrap()), &mut out).unwrap();
enc.encode(Item::ElementFoot, &mut out).unwrap();
assert!(enc.is_document_complete());
assert_eq!(
	&out[..],
	&b"<?xml version='1.0' encoding='utf-8'?>\n<root a=\"x &amp; y\">hello</root>"[..],
);
```
*/
pub struct Encoder {
	state: State,
	xml_declaration_set: bool,
	doctype: Option<String>,
	element_stack: Vec<String>,
	attribute_names: Vec<String>,
}

impl Encoder {
	/// Create a new encoder for an empty document.
	pub fn new() -> Self {
		Self {
			state: State::Empty,
			xml_declaration_set: false,
			doctype: None,
			element_stack: Vec::new(),
			attribute_names: Vec::new(),
		}
	}

	/// True once the root element has been closed.
	///
	/// A serialized document is only complete (and guaranteed to be
	/// reparsable) when this returns true.
	pub fn is_document_complete(&self) -> bool {
		self.state == State::DocumentEnded
	}

	/// Depth of the currently open element stack.
	pub fn depth(&self) -> usize {
		self.element_stack.len()
	}

	/// Close a still-open element header before content is written.
	fn close_head<B: BufMut>(&mut self, out: &mut B) {
		debug_assert!(self.state == State::ElementStarted);
		out.put_u8(b'>');
		self.attribute_names.clear();
		self.state = State::InElement;
	}

	/// Write the footer of the current element and unwind the stack.
	fn write_foot<B: BufMut>(&mut self, empty: bool, out: &mut B) {
		let name = self.element_stack.pop().unwrap();
		if empty {
			out.put_slice(b"/>");
			self.attribute_names.clear();
		} else {
			out.put_slice(b"</");
			out.put_slice(name.as_bytes());
			out.put_u8(b'>');
		}
		self.state = if self.element_stack.len() == 0 {
			State::DocumentEnded
		} else {
			State::InElement
		};
	}

	/// Encode a single item into `out`.
	///
	/// On error, nothing has been written and the encoder state is
	/// unchanged.
	pub fn encode<'x>(&mut self, item: Item<'x>, out: &mut BytesMut) -> Result<()> {
		match item {
			Item::XmlDeclaration => {
				if self.state != State::Empty {
					return Err(Error::InvalidState("XML declaration"));
				}
				out.put_slice(XML_DECL);
				self.xml_declaration_set = true;
				self.state = State::DocumentStarted;
				Ok(())
			}
			Item::DocumentType(name) => {
				if self.doctype.is_some()
					|| (self.state != State::Empty && self.state != State::DocumentStarted)
				{
					return Err(Error::InvalidState("document type declaration"));
				}
				out.put_slice(b"<!DOCTYPE ");
				out.put_slice(name.as_bytes());
				out.put_u8(b'>');
				self.doctype = Some(name.to_string());
				self.state = State::DocumentStarted;
				Ok(())
			}
			Item::ProcessingInstruction(target, data) => {
				if target.eq_ignore_ascii_case("xml") {
					return Err(Error::InvalidContent("'xml' is a reserved target"));
				}
				if let Some(data) = data {
					if data.contains("?>") {
						return Err(Error::InvalidContent(
							"'?>' not allowed in instruction data",
						));
					}
				}
				match self.state {
					State::ElementStarted => self.close_head(out),
					State::Empty => self.state = State::DocumentStarted,
					_ => (),
				}
				out.put_slice(b"<?");
				out.put_slice(target.as_bytes());
				if let Some(data) = data {
					out.put_u8(b' ');
					out.put_slice(data.as_bytes());
				}
				out.put_slice(b"?>");
				Ok(())
			}
			Item::Comment(text) => {
				if text.contains("--") || text.ends_with('-') {
					return Err(Error::InvalidContent("'--' not allowed in comment"));
				}
				match self.state {
					State::ElementStarted => self.close_head(out),
					State::Empty => self.state = State::DocumentStarted,
					_ => (),
				}
				out.put_slice(b"<!--");
				out.put_slice(text.as_bytes());
				out.put_slice(b"-->");
				Ok(())
			}
			Item::ElementHeadStart(name) => {
				match self.state {
					State::Empty | State::DocumentStarted => {
						// this is the root element; it must match the
						// declared document type name, if any
						if let Some(doctype) = self.doctype.as_ref() {
							if doctype.as_str() != &**name {
								return Err(Error::DocumentTypeMismatch);
							}
						}
					}
					State::ElementStarted => self.close_head(out),
					State::InElement => (),
					State::DocumentEnded => {
						return Err(Error::InvalidState("element"));
					}
				}
				out.put_u8(b'<');
				out.put_slice(name.as_bytes());
				self.element_stack.push(name.to_string());
				self.attribute_names.clear();
				self.state = State::ElementStarted;
				Ok(())
			}
			Item::Attribute(name, value) => {
				if self.state != State::ElementStarted {
					return Err(Error::InvalidState("attribute"));
				}
				if self.attribute_names.iter().any(|n| n.as_str() == &**name) {
					return Err(Error::DuplicateAttribute);
				}
				out.put_u8(b' ');
				out.put_slice(name.as_bytes());
				out.put_slice(b"=\"");
				escape(out, value.as_bytes(), ATTR_SPECIALS);
				out.put_u8(b'"');
				self.attribute_names.push(name.to_string());
				Ok(())
			}
			Item::ElementHeadEnd => {
				if self.state != State::ElementStarted {
					return Err(Error::InvalidState("'>'"));
				}
				self.close_head(out);
				Ok(())
			}
			Item::Text(text) => {
				match self.state {
					State::ElementStarted => self.close_head(out),
					State::InElement => (),
					_ => return Err(Error::InvalidState("text")),
				}
				escape(out, text.as_bytes(), CDATA_SPECIALS);
				Ok(())
			}
			Item::CData(text) => {
				if text.contains("]]>") {
					return Err(Error::InvalidContent(
						"']]>' not allowed in CDATA section",
					));
				}
				match self.state {
					State::ElementStarted => self.close_head(out),
					State::InElement => (),
					_ => return Err(Error::InvalidState("CDATA section")),
				}
				out.put_slice(b"<![CDATA[");
				out.put_slice(text.as_bytes());
				out.put_slice(b"]]>");
				Ok(())
			}
			Item::ElementFoot => match self.state {
				State::ElementStarted => {
					self.write_foot(true, out);
					Ok(())
				}
				State::InElement => {
					self.write_foot(false, out);
					Ok(())
				}
				_ => Err(Error::InvalidState("element footer")),
			},
		}
	}
}

impl Default for Encoder {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Encoder {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Encoder")
			.field("state", &self.state)
			.field("depth", &self.element_stack.len())
			.finish()
	}
}
