/*!
# Error types

This module holds the error types returned by the various functions of this
crate.
*/
use std::error;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::result::Result as StdResult;
use std::sync::Arc;

use estax_validation::Error as ValidationError;

pub use crate::errctx::*;

fn list_expected<'f>(f: &'f mut fmt::Formatter, opts: &[&'static str]) -> fmt::Result {
	f.write_str(" (expected ")?;
	if opts.len() == 1 {
		f.write_str(opts[0])?;
	} else {
		f.write_str("one of: ")?;
		for (i, opt) in opts.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			f.write_str(*opt)?;
		}
	}
	f.write_str(")")
}

/// Violation of a well-formedness constraint or the XML 1.0 grammar.
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum WFError {
	/// End of input encountered inside a construct which still required
	/// more data.
	///
	/// The contents are implementation details.
	InvalidEof(&'static str),

	/// Reference to an entity this crate does not know.
	///
	/// **Note**: Because the lexer bounds how many bytes it is willing to
	/// read for a reference, very long (and thus necessarily undefined)
	/// references are reported as this error, too.
	UndeclaredEntity,

	/// Codepoint which XML 1.0 does not allow at this position.
	///
	/// The contents are implementation details.
	InvalidChar(&'static str, u32),

	/// Character reference which denotes a codepoint outside the XML
	/// `Char` production.
	InvalidCharRef(u32),

	/// Byte which the grammar does not allow at this position.
	///
	/// The contents are implementation details.
	UnexpectedByte(&'static str, u8, Option<&'static [&'static str]>),

	/// Malformed construct which no other variant describes.
	///
	/// The contents are implementation details.
	InvalidSyntax(&'static str),

	/// Token which the document parser does not allow at this position.
	///
	/// The contents are implementation details.
	UnexpectedToken(&'static str, &'static str, Option<&'static [&'static str]>),

	/// Attribute name used twice in the same element header.
	DuplicateAttribute,

	/// End tag which does not close the innermost open element.
	ElementMismatch,
}

impl error::Error for WFError {}

impl ErrorWithContext for WFError {
	fn with_context(self, ctx: &'static str) -> WFError {
		match self {
			Self::InvalidEof(_) => Self::InvalidEof(ctx),
			Self::InvalidChar(_, cp) => Self::InvalidChar(ctx, cp),
			Self::UnexpectedByte(_, b, alt) => Self::UnexpectedByte(ctx, b, alt),
			Self::UnexpectedToken(_, tok, alt) => Self::UnexpectedToken(ctx, tok, alt),
			other => other,
		}
	}
}

impl fmt::Display for WFError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidEof(ctx) => write!(f, "premature end of data {}", ctx),
			Self::UndeclaredEntity => f.write_str("reference to undeclared entity"),
			Self::InvalidChar(ctx, cp) => write!(f, "codepoint U+{:x} not allowed {}", cp, ctx),
			Self::InvalidCharRef(cp) => write!(
				f,
				"character reference denotes invalid codepoint U+{:x}",
				cp
			),
			Self::UnexpectedByte(ctx, b, alternatives) => {
				write!(f, "byte 0x{:02x} not allowed {}", b, ctx)?;
				match alternatives {
					Some(opts) if opts.len() > 0 => list_expected(f, opts),
					_ => Ok(()),
				}
			}
			Self::InvalidSyntax(what) => write!(f, "invalid syntax: {}", what),
			Self::UnexpectedToken(ctx, tok, alternatives) => {
				write!(f, "unexpected {} token {}", tok, ctx)?;
				match alternatives {
					Some(opts) if opts.len() > 0 => list_expected(f, opts),
					_ => Ok(()),
				}
			}
			Self::DuplicateAttribute => {
				f.write_str("attribute declared twice in the same element")
			}
			Self::ElementMismatch => f.write_str("end tag does not match open element"),
		}
	}
}

impl From<ValidationError> for WFError {
	fn from(other: ValidationError) -> Self {
		match other {
			ValidationError::EmptyName => Self::InvalidSyntax("empty name"),
			ValidationError::InvalidChar(ch) => Self::InvalidChar(ERRCTX_UNKNOWN, ch as u32),
		}
	}
}

/// Syntactically valid construct encountered in a document phase which does
/// not allow it.
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum StructureError {
	/// XML declaration anywhere but as the very first construct of the
	/// document.
	XmlDeclarationMisplaced,

	/// Document type declaration after the root element was opened, or a
	/// second document type declaration.
	DoctypeMisplaced,

	/// CDATA section outside element content.
	CDataOutsideElement,

	/// Construct after the root element which is not allowed in the epilog.
	///
	/// The contents are implementation details.
	ContentAfterRoot(&'static str),
}

impl error::Error for StructureError {}

impl fmt::Display for StructureError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::XmlDeclarationMisplaced => {
				f.write_str("XML declaration must be the first thing in the document")
			}
			Self::DoctypeMisplaced => {
				f.write_str("document type declaration not allowed at this point")
			}
			Self::CDataOutsideElement => {
				f.write_str("CDATA section only allowed inside element content")
			}
			Self::ContentAfterRoot(tok) => {
				write!(f, "{} not allowed after end of root element", tok)
			}
		}
	}
}

/// Clonable, shared handle on a [`std::io::Error`].
///
/// [`std::io::Error`] itself is not `Clone`; putting it behind an
/// [`Arc`] lets [`Error`] stay `Clone`, which the latching behavior of the
/// lexer and parser relies on. All read access goes through [`Deref`].
#[derive(Clone)]
pub struct SharedIoError(Arc<io::Error>);

impl Deref for SharedIoError {
	type Target = io::Error;

	fn deref(&self) -> &io::Error {
		&self.0
	}
}

impl fmt::Debug for SharedIoError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl fmt::Display for SharedIoError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self.deref(), f)
	}
}

impl PartialEq for SharedIoError {
	/// Two handles are equal iff they share the same underlying error
	/// object.
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

/// Error types which may be returned from the reader or lexer.
///
/// With the exception of [`Error::IO`], all errors are fatal and will be
/// returned indefinitely from the reader or lexer after the first encounter.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// An I/O error was encountered during lexing.
	///
	/// I/O errors are not fatal and may be retried. This is especially
	/// important for (but not limited to)
	/// [`std::io::ErrorKind::WouldBlock`] errors: those signal that the
	/// buffered data is exhausted and more input is required ("need more
	/// data").
	///
	/// **Note:** When an unexpected end-of-file situation is encountered
	/// during parsing or lexing, that is signalled using
	/// [`Error::NotWellFormed`] instead of a
	/// [`std::io::ErrorKind::UnexpectedEof`] error.
	IO(SharedIoError),

	/// An invalid UTF-8 byte was encountered during decoding.
	InvalidUtf8Byte(u8),

	/// A violation of the XML 1.0 grammar or a well-formedness constraint
	/// was encountered during parsing or lexing.
	NotWellFormed(WFError),

	/// A syntactically valid construct was encountered in a document phase
	/// which does not allow it.
	InvalidStructure(StructureError),
}

pub type Result<T> = StdResult<T, Error>;

pub(crate) trait ErrorWithContext {
	fn with_context(self, ctx: &'static str) -> Self;
}

impl Error {
	pub fn io(e: io::Error) -> Error {
		Error::IO(SharedIoError(Arc::new(e)))
	}

	pub(crate) fn premature_end(ctx: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidEof(ctx))
	}
}

impl ErrorWithContext for Error {
	fn with_context(self, ctx: &'static str) -> Self {
		match self {
			Self::NotWellFormed(wf) => Self::NotWellFormed(wf.with_context(ctx)),
			other => other,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::io(e)
	}
}

impl From<WFError> for Error {
	fn from(e: WFError) -> Error {
		Error::NotWellFormed(e)
	}
}

impl From<StructureError> for Error {
	fn from(e: StructureError) -> Error {
		Error::InvalidStructure(e)
	}
}

impl From<ValidationError> for Error {
	fn from(e: ValidationError) -> Error {
		Error::NotWellFormed(e.into())
	}
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::IO(e) => write!(f, "I/O error: {}", e),
			Error::InvalidUtf8Byte(b) => write!(f, "invalid utf-8 byte: \\x{:02x}", b),
			Error::NotWellFormed(e) => write!(f, "not-well-formed: {}", e),
			Error::InvalidStructure(e) => write!(f, "invalid document structure: {}", e),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::IO(e) => Some(e.deref()),
			_ => None,
		}
	}
}
