/*!
# Validator functions for XML-related strings

Supplementary crate for [`estax`](https://docs.rs/estax): the XML 1.0
character classes and the string validators built from them. It depends on
nothing, so both the lexer hot path and user code can pull it in directly.
*/
use std::fmt;

pub mod selectors;

use selectors::CharSelector;

/**
Error condition from validating an XML string.
*/
#[derive(Debug, Clone)]
pub enum Error {
	/// A Name was empty.
	EmptyName,
	/// An invalid character was encountered.
	///
	/// This variant contains the character as data.
	InvalidChar(char),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::EmptyName => f.write_str("a Name requires at least one character"),
			Self::InvalidChar(c) => write!(f, "U+{:04x} is not allowed here", *c as u32),
		}
	}
}

impl std::error::Error for Error {}

/// Return true if the char may start an XML 1.0 Name.
pub fn is_name_start(c: char) -> bool {
	selectors::CLASS_XML_NAMESTART.select(c)
}

/// Return true if the char may occur in an XML 1.0 Name beyond the first
/// position.
pub fn is_name_char(c: char) -> bool {
	selectors::CLASS_XML_NAME.select(c)
}

/// Return true if the char is XML whitespace (XML 1.0 § 2.3 \[3\]).
pub fn is_xml_whitespace(c: char) -> bool {
	selectors::CLASS_XML_SPACES.select(c)
}

/**
Check a str against the XML 1.0 `Name` production.

Qualified names pass as-is; the colon is an ordinary name character here.

# Example

```rust
use estax_validation::{validate_name, Error};

assert!(validate_name("tag-1").is_ok());
assert!(validate_name("ns:tag").is_ok());
assert!(matches!(validate_name("two words"), Err(Error::InvalidChar(' '))));
assert!(matches!(validate_name(""), Err(Error::EmptyName)));
```
*/
pub fn validate_name(s: &str) -> Result<(), Error> {
	let mut chars = s.chars();
	let head = chars.next().ok_or(Error::EmptyName)?;
	if !is_name_start(head) {
		return Err(Error::InvalidChar(head));
	}
	match chars.find(|&c| !is_name_char(c)) {
		Some(offender) => Err(Error::InvalidChar(offender)),
		None => Ok(()),
	}
}

/**
Check that a str consists only of XML 1.0 `Char`s.

Markup characters are fine — this is about the codepoint set, not about
escaping.

# Example

```rust
use estax_validation::{validate_cdata, Error};

assert!(validate_cdata("a < b, <em>c</em> & d").is_ok());
assert!(matches!(validate_cdata("\x01"), Err(Error::InvalidChar('\x01'))));
```
*/
pub fn validate_cdata(s: &str) -> Result<(), Error> {
	match s
		.chars()
		.find(|&c| selectors::CLASS_XML_NONCHAR.select(c))
	{
		Some(offender) => Err(Error::InvalidChar(offender)),
		None => Ok(()),
	}
}
