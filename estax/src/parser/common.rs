use std::io;

use crate::error::Result;
use crate::lexer::{Lexer, Token};

/**
# XML version number

Only version 1.0 is supported.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlVersion {
	/// XML Version 1.0
	V1_0,
}

/**
# Standalone flag of the XML declaration

The declaration carries an `Option<Standalone>`; `None` means the document
did not state anything.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standalone {
	/// `standalone='yes'`
	Yes,
	/// `standalone='no'`
	No,
}

/// Size of an event, in input bytes.
///
/// Unlike tokens, events cover the input without gaps; whitespace consumed
/// between two tokens is accounted to the event which the following token
/// belongs to (so the whitespace between the XML declaration and the root
/// element counts towards the root element's start event). Only a length is
/// kept, not a position: positions could wrap around mid-event on very long
/// streams, lengths cannot.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct EventMetrics {
	pub(super) len: usize,
}

impl EventMetrics {
	/// Number of input bytes this event was produced from.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Create new event metrics
	pub const fn new(len: usize) -> EventMetrics {
		EventMetrics { len: len }
	}
}

/**
# Source of individual tokens

The parser-facing counterpart of [`std::io::Read`]: something which can be
asked for the next [`Token`]. Usually backed by a [`Lexer`] via
[`TokenSource`].
*/
pub trait TokenRead {
	/// Return the next token.
	///
	/// `None` means the input ended cleanly. Lexer errors and I/O errors of
	/// the underlying byte source pass through unchanged.
	fn read(&mut self) -> Result<Option<Token>>;
}

/// Pairs a [`Lexer`] with the [`std::io::BufRead`] it draws bytes from,
/// forming a [`TokenRead`].
pub struct TokenSource<R: io::BufRead> {
	lexer: Lexer,
	bytes: R,
}

impl<R: io::BufRead> TokenSource<R> {
	pub fn new(lexer: Lexer, bytes: R) -> Self {
		Self {
			lexer: lexer,
			bytes: bytes,
		}
	}

	/// The underlying byte source.
	pub fn get_ref(&self) -> &R {
		&self.bytes
	}

	/// The underlying byte source, mutably.
	pub fn get_mut(&mut self) -> &mut R {
		&mut self.bytes
	}

	/// The lexer driving this source.
	pub fn get_lexer(&self) -> &Lexer {
		&self.lexer
	}

	/// The lexer driving this source, mutably.
	pub fn get_lexer_mut(&mut self) -> &mut Lexer {
		&mut self.lexer
	}
}

impl<R: io::BufRead> TokenRead for TokenSource<R> {
	fn read(&mut self) -> Result<Option<Token>> {
		self.lexer.lex(&mut self.bytes)
	}
}

/**
# What a parser looks like to a driver

Implemented by anything which turns tokens into higher-level output; the
drivers in [`crate::FeedReader`] / [`crate::PullReader`] are generic over
this trait.
*/
pub trait Parse {
	type Output;

	/// Produce one output item from the tokens of `r`.
	///
	/// `None` means the input ended after a complete, acceptable document.
	/// Grammar and structure violations are reported as errors, as are
	/// errors passed through from the token source (I/O errors included).
	fn parse<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<Self::Output>>;

	/// Shed buffers which are cheap to reacquire, for phases where the
	/// memory is better used elsewhere.
	fn release_temporaries(&mut self);
}
