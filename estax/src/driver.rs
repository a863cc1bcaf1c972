/*!
Frontends which connect a buffer, the lexer and a parser into a usable
reader. [`FeedReader`] (push-based) and [`PullReader`] (blocking) are the
two entry points; the crate-level documentation shows them in action.
*/

use std::io;

use crate::bufq::BufferQueue;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, LexerOptions};
use crate::parser::{Parse, Parser, TokenSource};

/**
# Source for individual XML events

What [`std::io::Read`] is for bytes, this trait is for document events; all
reader frontends implement it.
*/
pub trait EventRead {
	type Output;

	/// Produce the next event.
	///
	/// `None` means the input ended with a complete, valid document.
	/// I/O errors are retriable; any other error is fatal and will be
	/// repeated on every further call without consuming input.
	fn read(&mut self) -> Result<Option<Self::Output>>;

	/// Hand every event which can currently be produced to `cb`.
	///
	/// Stops cleanly at the end of a complete document; everything else —
	/// including running out of buffered data — surfaces as the error it
	/// is. See [`Self::read`] for which of those are retriable.
	fn read_all<F>(&mut self, mut cb: F) -> Result<()>
	where
		F: FnMut(Self::Output) -> (),
	{
		while let Some(ev) = self.read()? {
			cb(ev);
		}
		Ok(())
	}

	/// Like [`Self::read_all`], but folds the need-more-data condition into
	/// the return value: `Ok(true)` on a complete document, `Ok(false)`
	/// when the source would have to block for more input.
	fn read_all_eof<F>(&mut self, cb: F) -> Result<bool>
	where
		F: FnMut(Self::Output) -> (),
	{
		as_eof_flag(self.read_all(cb))
	}
}

/// Fold the would-block condition of a read result into a boolean.
///
/// `Ok(true)` stands for "complete document", `Ok(false)` for "fine so far,
/// but more input is required". Everything else passes through as an error.
pub fn as_eof_flag(r: Result<()>) -> Result<bool> {
	match r {
		Ok(()) => Ok(true),
		Err(Error::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
		Err(other) => Err(other),
	}
}

/**
# Push-based driver

Generic over the [`Parse`] implementation it drives; the [`FeedReader`]
alias fixes that to the document [`Parser`] and is what most code wants.

Bytes go in through [`feed()`](Self::feed), events come out through the
[`EventRead`] trait, and the two never block: when the fed data runs out
mid-construct, reading yields a [`std::io::ErrorKind::WouldBlock`] I/O
error and can be retried after the next `feed()`.
*/
pub struct FeedDriver<'x, P: Parse> {
	tokens: TokenSource<BufferQueue<'x>>,
	parser: P,
}

impl<'x, P: Parse + Default> Default for FeedDriver<'x, P> {
	fn default() -> Self {
		Self::wrap(Lexer::new(), P::default())
	}
}

impl<'x, P: Parse + Default> FeedDriver<'x, P> {
	/// Create a driver with a default parser and lexer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a driver with a default parser and the given lexer options.
	pub fn with_options(options: LexerOptions) -> Self {
		Self::wrap(Lexer::with_options(options), P::default())
	}

	/// Reset the driver to its initial state, as if freshly constructed.
	///
	/// All buffered input, any in-flight construct and a possibly latched
	/// error state are discarded; the lexer options are retained. This is
	/// the way to reuse a reader for a new document after an error.
	pub fn clear(&mut self) {
		let opts = self.tokens.get_lexer().options();
		self.tokens = TokenSource::new(Lexer::with_options(opts), BufferQueue::new());
		self.parser = P::default();
	}
}

impl<'x, P: Parse> FeedDriver<'x, P> {
	/// Assemble a driver from a lexer and a parser, with an unbounded
	/// input buffer.
	pub fn wrap(lexer: Lexer, parser: P) -> Self {
		Self::wrap_buffer(lexer, parser, BufferQueue::new())
	}

	/// Assemble a driver from a lexer, a parser and a caller-provided
	/// input buffer.
	///
	/// Passing a capacity-bounded queue
	/// (cf. [`BufferQueue::with_capacity()`]) makes
	/// [`feed()`](Self::feed) honor that bound.
	pub fn wrap_buffer(lexer: Lexer, parser: P, buffer: BufferQueue<'x>) -> Self {
		Self {
			tokens: TokenSource::new(lexer, buffer),
			parser,
		}
	}

	/// Enqueue a chunk of input bytes.
	///
	/// The data is not processed yet; processing happens during
	/// [`read()`](EventRead::read). Returns how many bytes were accepted,
	/// which is less than the chunk length only for a capacity-bounded
	/// buffer (cf. [`Self::wrap_buffer()`]).
	///
	/// # Panics
	///
	/// If [`feed_eof()`](Self::feed_eof) has been called before.
	pub fn feed<'a: 'x, T: Into<std::borrow::Cow<'a, [u8]>>>(&mut self, data: T) -> usize {
		self.tokens.get_mut().push(data)
	}

	/// Mark the end of the input.
	///
	/// Without this marker the reader keeps asking for more data forever;
	/// with it, the remaining buffered bytes must complete the document.
	/// Feeding anything afterwards panics.
	pub fn feed_eof(&mut self) {
		self.tokens.get_mut().push_eof();
	}

	/// Number of fed bytes which have not been processed yet.
	///
	/// Memory-wise this is a lower bound: a partially processed chunk is
	/// retained in full until it is done.
	pub fn buffered(&self) -> usize {
		self.tokens.get_ref().len()
	}

	/// Direct access to the input buffer, e.g. to drop everything pending
	/// in an error situation.
	pub fn get_buffer_mut(&mut self) -> &mut BufferQueue<'x> {
		self.tokens.get_mut()
	}

	/// Access the lexer
	pub fn get_lexer(&self) -> &Lexer {
		self.tokens.get_lexer()
	}

	/// Access the lexer, mutably
	pub fn get_lexer_mut(&mut self) -> &mut Lexer {
		self.tokens.get_lexer_mut()
	}

	/// Access the parser
	pub fn get_parser(&self) -> &P {
		&self.parser
	}

	/// Access the parser, mutably
	pub fn get_parser_mut(&mut self) -> &mut P {
		&mut self.parser
	}

	/// Release all temporary buffers
	///
	/// This is sensible to call when it is expected that no more data will
	/// be processed for a while and the memory is better used elsewhere.
	pub fn release_temporaries(&mut self) {
		self.tokens.get_lexer_mut().release_temporaries();
		self.parser.release_temporaries();
	}
}

impl<P: Parse> EventRead for FeedDriver<'_, P> {
	type Output = P::Output;

	/// Produce the next event from the fed data.
	///
	/// `None` means a complete document was read. When the buffered data
	/// ends mid-construct, a [`std::io::ErrorKind::WouldBlock`] I/O error
	/// is returned — feed more data and retry. All non-I/O errors are
	/// fatal and latched.
	fn read(&mut self) -> Result<Option<Self::Output>> {
		self.parser.parse(&mut self.tokens)
	}
}

/**
# Blocking driver

Generic over the [`Parse`] implementation it drives; the [`PullReader`]
alias fixes that to the document [`Parser`].

Draws bytes from a [`std::io::BufRead`] and blocks whenever that source
blocks.
*/
pub struct BlockingDriver<T: io::BufRead, P: Parse> {
	tokens: TokenSource<T>,
	parser: P,
}

impl<T: io::BufRead, P: Parse + Default> BlockingDriver<T, P> {
	/// Wrap a byte source, using default options.
	pub fn new(inner: T) -> Self {
		Self::with_options(inner, LexerOptions::default())
	}

	/// Wrap a byte source, configuring the lexer with the given options.
	pub fn with_options(inner: T, options: LexerOptions) -> Self {
		Self::wrap(inner, Lexer::with_options(options), P::default())
	}
}

impl<T: io::BufRead, P: Parse> BlockingDriver<T, P> {
	/// Assemble a driver from a byte source, a lexer and a parser.
	pub fn wrap(inner: T, lexer: Lexer, parser: P) -> Self {
		Self {
			tokens: TokenSource::new(lexer, inner),
			parser,
		}
	}

	/// Access the inner BufRead
	pub fn get_inner(&self) -> &T {
		self.tokens.get_ref()
	}

	/// Access the inner BufRead, mutably
	pub fn get_inner_mut(&mut self) -> &mut T {
		self.tokens.get_mut()
	}

	/// Access the lexer
	pub fn get_lexer(&self) -> &Lexer {
		self.tokens.get_lexer()
	}

	/// Access the lexer, mutably
	pub fn get_lexer_mut(&mut self) -> &mut Lexer {
		self.tokens.get_lexer_mut()
	}

	/// Access the parser
	pub fn get_parser(&self) -> &P {
		&self.parser
	}

	/// Access the parser, mutably
	pub fn get_parser_mut(&mut self) -> &mut P {
		&mut self.parser
	}
}

impl<T: io::BufRead, P: Parse> EventRead for BlockingDriver<T, P> {
	type Output = P::Output;

	/// Produce the next event, blocking on the byte source as needed.
	///
	/// `None` means a complete document was read. I/O errors of the source
	/// pass through unchanged and may be retried; everything else is fatal
	/// and latched.
	fn read(&mut self) -> Result<Option<Self::Output>> {
		self.parser.parse(&mut self.tokens)
	}
}

/**
# Non-blocking reading

A [`FeedDriver`] over the document [`Parser`]: push chunks of a document in
as they arrive — from a socket, a DMA buffer, wherever — and pull events
out in between. Control returns to the caller the moment the data runs out.

## Example

```
use estax::{FeedReader, Error, Event, EventRead};
use std::io;

let mut fr = FeedReader::new();
fr.feed(&b"<greeting no"[..]);
// the attribute is still open, so the reader asks for more data
assert!(matches!(
	fr.read().err().unwrap(),
	Error::IO(e) if e.kind() == io::ErrorKind::WouldBlock
));
fr.feed(&b"='1'>hi"[..]);
// now the start tag is complete
assert!(matches!(fr.read().unwrap().unwrap(), Event::StartElement(..)));
```
*/
pub type FeedReader<'x> = FeedDriver<'x, Parser>;

/**
# Blocking reading

A [`BlockingDriver`] over the document [`Parser`]: reads a document
straight out of an [`io::BufRead`], blocking on it as needed.

Beware of slow sources such as network sockets: a few tokens (most notably
end tags) only complete when the byte *after* them arrives, so events can
lag behind the wire. For such sources the [`FeedReader`] is the better fit.

## Example

```
use estax::{PullReader, Event, EventRead};

let mut doc = &b"<?xml version='1.0'?><hello>World!</hello>"[..];
let mut pr = PullReader::new(&mut doc);
assert!(matches!(pr.read().unwrap().unwrap(), Event::XmlDeclaration(..)));
```
*/
pub type PullReader<T> = BlockingDriver<T, Parser>;
