/*!
# XML 1.0 Lexer

The lexer is the item-level half of the reader: it consumes bytes and emits
[`Token`]s. It is written as a flat state machine in which every suspension
point is an explicit state, so that it can stop at any byte boundary when the
input is exhausted and resume losslessly when more data arrives.
*/
use std::fmt;
use std::io;

mod ranges;
mod read;

use estax_validation::selectors::*;
use estax_validation::{validate_cdata, validate_name, Error as ValidationError};

use crate::errctx::*;
use crate::error::{ErrorWithContext, Result as CrateResult, WFError};
use crate::strings::{CData, Name};
use ranges::*;
use read::ScanEnd;

/// Byte range of the input stream a token was produced from.
///
/// Token ranges need not be contiguous: whitespace between the pieces of an
/// element header or of the XML declaration is consumed without producing a
/// token of its own.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct TokenMetrics {
	start: usize,
	end: usize,
}

impl TokenMetrics {
	/// Length of the token in input bytes.
	///
	/// Computed with wrapping arithmetic so that it stays correct even if
	/// the underlying stream counter overflowed between the two ends.
	pub fn len(&self) -> usize {
		self.end.wrapping_sub(self.start)
	}

	/// Offset of the first byte of the token.
	///
	/// This is a plain [`usize`] counter of all bytes consumed so far; on
	/// sufficiently long-running streams it wraps around. Within a single
	/// token at most one wraparound can occur, because token sizes are
	/// bounded by the lexer.
	pub fn start(&self) -> usize {
		self.start
	}

	/// Offset just past the last byte of the token.
	///
	/// The wraparound caveat of [`TokenMetrics::start()`] applies.
	pub fn end(&self) -> usize {
		self.end
	}

	// for use in parser unit tests
	#[cfg(test)]
	pub(crate) const fn new(start: usize, end: usize) -> TokenMetrics {
		TokenMetrics {
			start: start,
			end: end,
		}
	}
}

/// Quotation mark used around an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
	/// `"`
	Double,
	/// `'`
	Single,
}

impl Quote {
	fn from_delimiter(delim: u8) -> Quote {
		if delim == b'"' {
			Quote::Double
		} else {
			Quote::Single
		}
	}

	/// The delimiter byte itself.
	pub fn byte(&self) -> u8 {
		match self {
			Quote::Double => b'"',
			Quote::Single => b'\'',
		}
	}
}

/**
A single XML token

Tokens are the lexer's output and the document parser's input. They do not
correspond one-to-one to productions of the XML 1.0 grammar; they are cut in
whatever way lets the parser above make its decisions with one token of
lookahead.

Every token carries [`TokenMetrics`] locating it in the input stream.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	/// An XML `Name` occurring inside an element header or the XML
	/// declaration: an attribute name or a declaration pseudo-attribute
	/// name. Element names travel in [`Token::ElementHeadStart`] and
	/// [`Token::ElementFootStart`] instead.
	Name(TokenMetrics, Name),

	/// The `=` between an attribute name and its value.
	Eq(TokenMetrics),

	/// A complete attribute value, without its delimiters, with references
	/// already expanded and whitespace normalization applied. The kind of
	/// delimiter used is reported alongside.
	AttributeValue(TokenMetrics, CData, Quote),

	/// The `<?xml` sequence (any capitalization of the `xml` target).
	XMLDeclStart(TokenMetrics),

	/// The `?>` sequence closing the XML declaration.
	XMLDeclEnd(TokenMetrics),

	/// The `<?` sequence followed by a processing instruction target which
	/// does not lowercase to `xml`.
	PIStart(TokenMetrics, Name),

	/// The `?>` sequence closing a processing instruction; carries the
	/// instruction data accumulated since the target (leading whitespace
	/// between target and data is not included).
	PIEnd(TokenMetrics, CData),

	/// A complete comment; the delimiters are not included in the text.
	Comment(TokenMetrics, CData),

	/// A complete document type declaration, reduced to its name; any
	/// external-ID content is discarded during lexing.
	DocType(TokenMetrics, Name),

	/// The `<` sequence, followed by the element name.
	ElementHeadStart(TokenMetrics, Name),

	/// The `</` sequence, followed by the element name.
	ElementFootStart(TokenMetrics, Name),

	/// The `/>` sequence.
	///
	/// This token is only emitted while an element header is being lexed.
	ElementHeadClose(TokenMetrics),

	/// The `>` sequence closing an element header or footer.
	ElementHFEnd(TokenMetrics),

	/// A run of character data inside an element, with references already
	/// expanded. Note that because of that expansion, the literal string
	/// `<![CDATA[x]]>` can occur inside a Text token (from the input
	/// `&lt;![CDATA[x]]&gt;`).
	///
	/// One logical run of text may be delivered as several consecutive
	/// Text tokens, for example when the token length limit forces a
	/// flush or when a reference was expanded in the middle.
	Text(TokenMetrics, CData),

	/// The contents of one CDATA section.
	///
	/// In contrast to [`Token::Text`], the contents are taken verbatim and
	/// no references are expanded. An empty section produces an empty
	/// token. Long sections may be split into multiple tokens when the
	/// token length limit is exceeded.
	CData(TokenMetrics, CData),
}

impl Token {
	pub const NAME_NAME: &'static str = "Name";
	pub const NAME_EQ: &'static str = "'='";
	pub const NAME_ATTRIBUTEVALUE: &'static str = "AttValue";
	pub const NAME_XMLDECLSTART: &'static str = "'<?xml'";
	pub const NAME_XMLDECLEND: &'static str = "'?>'";
	pub const NAME_PISTART: &'static str = "'<?'";
	pub const NAME_PIEND: &'static str = "'?>'";
	pub const NAME_COMMENT: &'static str = "Comment";
	pub const NAME_DOCTYPE: &'static str = "'<!DOCTYPE'";
	pub const NAME_ELEMENTHEADSTART: &'static str = "'<'";
	pub const NAME_ELEMENTFOOTSTART: &'static str = "'</'";
	pub const NAME_ELEMENTHEADCLOSE: &'static str = "'/>'";
	pub const NAME_ELEMENTHFEND: &'static str = "'>'";
	pub const NAME_TEXT: &'static str = "Text";
	pub const NAME_CDATA: &'static str = "CDATA section";

	/// Return a static string describing the token type.
	///
	/// This is intended for error messages.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Name(..) => Self::NAME_NAME,
			Self::Eq(..) => Self::NAME_EQ,
			Self::AttributeValue(..) => Self::NAME_ATTRIBUTEVALUE,
			Self::XMLDeclStart(..) => Self::NAME_XMLDECLSTART,
			Self::XMLDeclEnd(..) => Self::NAME_XMLDECLEND,
			Self::PIStart(..) => Self::NAME_PISTART,
			Self::PIEnd(..) => Self::NAME_PIEND,
			Self::Comment(..) => Self::NAME_COMMENT,
			Self::DocType(..) => Self::NAME_DOCTYPE,
			Self::ElementHeadStart(..) => Self::NAME_ELEMENTHEADSTART,
			Self::ElementFootStart(..) => Self::NAME_ELEMENTFOOTSTART,
			Self::ElementHeadClose(..) => Self::NAME_ELEMENTHEADCLOSE,
			Self::ElementHFEnd(..) => Self::NAME_ELEMENTHFEND,
			Self::Text(..) => Self::NAME_TEXT,
			Self::CData(..) => Self::NAME_CDATA,
		}
	}

	/// Return a reference to this tokens [`TokenMetrics`].
	pub fn metrics(&self) -> &TokenMetrics {
		match self {
			Self::Name(m, ..) => &m,
			Self::Eq(m) => &m,
			Self::AttributeValue(m, ..) => &m,
			Self::XMLDeclStart(m) => &m,
			Self::XMLDeclEnd(m) => &m,
			Self::PIStart(m, ..) => &m,
			Self::PIEnd(m, ..) => &m,
			Self::Comment(m, ..) => &m,
			Self::DocType(m, ..) => &m,
			Self::ElementHeadStart(m, ..) => &m,
			Self::ElementFootStart(m, ..) => &m,
			Self::ElementHeadClose(m) => &m,
			Self::ElementHFEnd(m) => &m,
			Self::Text(m, ..) => &m,
			Self::CData(m, ..) => &m,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CharRefRadix {
	Decimal,
	Hexadecimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RefKind {
	Entity,
	Char(CharRefRadix),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementState {
	Start,
	/// Whitespace is mandatory here, e.g. after the `<?xml` target or
	/// between an attribute value and the next attribute name.
	SpaceRequired,
	Blank,
	Name,
	Eq,
	Close,
	/// Delimiter, accumulation selector and whether we just read a CR,
	/// because of the mess which is CRLF -> LF normalization.
	AttributeValue(u8, &'static [ByteRange], bool),
	/// Encountered ?
	MaybeXMLDeclEnd,
	/// Encountered /
	MaybeHeadClose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementKind {
	/// standard XML element head e.g. `<foo>`
	Header,
	/// standard XML element foot e.g. `</foo>`
	Footer,
	/// XML declaration e.g. `<?xml version='1.0'?>`
	XMLDecl,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MaybeElementState {
	Initial,
	/// Encountered `<!`
	Bang,
	/// Encountered `<!-`, the second dash is outstanding
	CommentStart,
	/// Matching a fixed opener literal (`<![CDATA[` or `<!DOCTYPE`);
	/// carries the literal and how far into it we are
	Literal(&'static [u8], usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentState {
	Initial,
	/// Within a CDATA section
	CDataSection,
	/// Encountered <
	MaybeElement(MaybeElementState),
	/// only whitespace allowed, e.g. between ?> of the XML declaration
	/// and <
	Whitespace,
	/// Some prefix of `]]>` was seen, either within a CDATA section (true)
	/// or in plain character data (false), where completing the sequence
	/// is illegal
	MaybeCDataEnd(bool, usize),
	/// `\r` read, we need to look ahead by one char to see if it is a `\n`
	/// before substituting
	///
	/// bool indicates whether we’re in a CDATA section, because yes, this
	/// also applies to those
	MaybeCRLF(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PiState {
	/// Reading the target name right after `<?`
	Target,
	/// Whitespace between target and data
	Blank,
	/// Accumulating instruction data
	Data,
	/// Encountered `?`
	MaybeEnd,
	/// Encountered `\r` within the data
	MaybeCRLF,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CommentState {
	/// Accumulating comment text
	Data,
	/// Encountered `-`
	MaybeEnd1,
	/// Encountered `--`; only `>` may follow
	MaybeEnd2,
	/// Encountered `\r` within the text
	MaybeCRLF,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DoctypeState {
	/// Whitespace after the `<!DOCTYPE` literal is mandatory
	SpaceRequired,
	/// Whitespace requirement satisfied, more whitespace allowed
	Blank,
	/// Reading the document type name
	Name,
	/// Discarding anything up to the closing `>`; the name rests in the
	/// accumulator
	Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RefReturnState {
	AttributeValue(ElementKind, u8, &'static [ByteRange]),
	Text,
}

impl RefReturnState {
	/// The state to continue in once the reference has been expanded.
	fn resume(self) -> State {
		match self {
			Self::AttributeValue(kind, delim, selector) => State::Element {
				kind: kind,
				state: ElementState::AttributeValue(delim, selector, false),
			},
			Self::Text => State::Content(ContentState::Initial),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
	/// Document start; an UTF-8 byte order mark may be consumed here.
	Bom(usize),
	/// Discarding bytes until the next `<` (synchronization option).
	Sync,
	Content(ContentState),
	Element {
		kind: ElementKind,
		state: ElementState,
	},
	Pi(PiState),
	Comment(CommentState),
	Doctype(DoctypeState),

	/// encountered &
	Reference {
		ret: RefReturnState,
		kind: RefKind,
	},

	Eof,
}

/// Result of skipping a run of bytes: either the delimiter which ended the
/// run, or the reason no delimiter was found.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SkipEnd {
	Delimiter(u8),
	/// Buffered data ran out, more may be fed later.
	Depleted,
	/// Buffered data ran out and the end-of-file marker is set.
	Eof,
}

// longest named entity is 4 bytes; the longest decimal and hexadecimal
// references denoting valid codepoints are 7 resp. 6 digits
const MAX_REFERENCE_LENGTH: usize = 8usize;

const TOK_XML_CDATA_START: &'static [u8] = b"<![CDATA[";
const TOK_XML_CDATA_END: &'static [u8] = b"]]>";
const TOK_XML_DOCTYPE_START: &'static [u8] = b"<!DOCTYPE";
const UTF8_BOM: &'static [u8] = b"\xef\xbb\xbf";

// the five predefined entities, XML 1.0 § 4.6
const NAMED_ENTITIES: &'static [(&'static [u8], u8)] = &[
	(b"amp", b'&'),
	(b"apos", b'\''),
	(b"gt", b'>'),
	(b"lt", b'<'),
	(b"quot", b'"'),
];

fn lookup_named_entity(name: &[u8]) -> Option<u8> {
	NAMED_ENTITIES
		.iter()
		.find(|(entity, _)| *entity == name)
		.map(|(_, replacement)| *replacement)
}

/// Hold options to configure a [`Lexer`].
///
/// See also [`Lexer::with_options()`].
#[derive(Debug, Clone, PartialEq, Copy)]
pub struct LexerOptions {
	/// Maximum number of bytes which can form a token.
	///
	/// This exists to limit the memory use of the Lexer for tokens where
	/// the data needs to be buffered in memory (most notably
	/// [`Token::Text`], [`Token::CData`] and [`Token::AttributeValue`]).
	///
	/// If token data exceeds this limit, it depends on the token type
	/// whether a partial token is emitted or the lexing fails with a
	/// syntax error: Text and CDATA section tokens are split and emitted
	/// in parts (and lexing continues), all other tokens exceeding this
	/// limit will cause an error.
	pub max_token_length: usize,

	/// Discard bytes preceding the first `<` of the document instead of
	/// lexing them as character data.
	///
	/// This is useful to lock onto a document boundary in the middle of a
	/// byte stream. Off by default.
	pub synchronization: bool,
}

impl LexerOptions {
	/// Set the [`LexerOptions::max_token_length`] value.
	///
	/// # Example
	///
	/// ```
	/// use estax::{Lexer, LexerOptions};
	/// let mut lexer = Lexer::with_options(LexerOptions::default().max_token_length(1024));
	/// ```
	pub fn max_token_length(mut self, v: usize) -> LexerOptions {
		self.max_token_length = v;
		self
	}

	/// Set the [`LexerOptions::synchronization`] flag.
	pub fn synchronization(mut self, v: bool) -> LexerOptions {
		self.synchronization = v;
		self
	}
}

impl Default for LexerOptions {
	/// Constructs default lexer options.
	///
	/// The defaults are implementation-defined and should not be relied
	/// upon.
	fn default() -> Self {
		Self {
			max_token_length: 8192,
			synchronization: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Copy)]
enum Error {
	/// The byte window ran dry without the end-of-file marker; retriable.
	Depleted,
	NotWellFormed(WFError),
	InvalidUtf8Byte(u8),
}

impl Error {
	fn premature_end(ctx: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidEof(ctx))
	}
}

impl ErrorWithContext for Error {
	fn with_context(self, ctx: &'static str) -> Self {
		match self {
			Self::NotWellFormed(e) => Self::NotWellFormed(e.with_context(ctx)),
			other => other,
		}
	}
}

impl From<WFError> for Error {
	fn from(other: WFError) -> Self {
		Self::NotWellFormed(other)
	}
}

impl From<ValidationError> for Error {
	fn from(other: ValidationError) -> Self {
		Self::NotWellFormed(other.into())
	}
}

impl From<Error> for crate::Error {
	fn from(other: Error) -> Self {
		match other {
			Error::Depleted => {
				io::Error::new(io::ErrorKind::WouldBlock, "byte buffer exhausted").into()
			}
			Error::NotWellFormed(e) => Self::NotWellFormed(e),
			Error::InvalidUtf8Byte(b) => Self::InvalidUtf8Byte(b),
		}
	}
}

type Result<T> = std::result::Result<T, Error>;

/// One state transition: the state to continue in, and possibly a token to
/// hand to the caller.
type Step = (State, Option<Token>);

fn token_length_error() -> Error {
	Error::NotWellFormed(WFError::InvalidSyntax("token length limit exceeded"))
}

fn decode_char_reference(digits: &str, radix: CharRefRadix) -> Result<char> {
	let base = match radix {
		CharRefRadix::Decimal => 10,
		CharRefRadix::Hexadecimal => 16,
	};
	// the digit alphabet and the length were both enforced while the
	// reference was accumulated, so the conversion itself cannot fail
	let value = u32::from_str_radix(digits, base).unwrap();
	match std::char::from_u32(value) {
		Some(ch) if !CLASS_XML_NONCHAR.select(ch) => Ok(ch),
		_ => Err(Error::NotWellFormed(WFError::InvalidCharRef(value))),
	}
}

/**
# Restartable XML 1.0 lexer

The lexer consumes UTF-8 bytes in arbitrarily sized portions and emits
[`Token`]s. Reaching the end of the buffered data is not an error: the lexer
parks its progress in an explicit state and picks up exactly where it
stopped when called again with more data.
*/
pub struct Lexer {
	state: State,
	/// Bytes of the construct currently being accumulated.
	accum: Vec<u8>,
	/// Parking spot for `accum` while a reference borrows the accumulator.
	aside: Vec<u8>,
	/// Count of bytes consumed so far (wrapping).
	pos: usize,
	/// `pos` value at which the previous token ended.
	anchor: usize,
	opts: LexerOptions,
	err: Option<Error>,
	has_eof: bool,
	/// state snapshot for stuck-detection in debug builds
	#[cfg(debug_assertions)]
	last_state: (Vec<u8>, State),
	#[cfg(debug_assertions)]
	last_byte: Option<u8>,
}

impl Lexer {
	/// Construct a new Lexer based on [`LexerOptions::default()`].
	pub fn new() -> Self {
		Self::with_options(LexerOptions::default())
	}

	/// Construct a new Lexer with the given options.
	pub fn with_options(opts: LexerOptions) -> Self {
		Self {
			state: State::Bom(0),
			accum: Vec::new(),
			aside: Vec::new(),
			pos: 0,
			anchor: 0,
			opts: opts,
			err: None,
			has_eof: false,
			#[cfg(debug_assertions)]
			last_state: (Vec::new(), State::Bom(0)),
			#[cfg(debug_assertions)]
			last_byte: None,
		}
	}

	/// The options the lexer was constructed with.
	pub fn options(&self) -> LexerOptions {
		self.opts
	}

	#[inline]
	fn reserve_accum(&mut self) {
		// growing once to the token size bound keeps the hot path free of
		// incremental reallocations
		if self.accum.capacity() < self.opts.max_token_length {
			self.accum
				.reserve_exact(self.opts.max_token_length - self.accum.capacity());
		}
	}

	#[inline]
	fn next_byte(&mut self, r: &mut &[u8]) -> Result<Option<u8>> {
		if r.is_empty() {
			return if self.has_eof {
				Ok(None)
			} else {
				Err(Error::Depleted)
			};
		}
		let b = r[0];
		*r = &r[1..];
		self.pos = self.pos.wrapping_add(1);
		#[cfg(debug_assertions)]
		{
			self.last_byte = Some(b);
		}
		Ok(Some(b))
	}

	/// Like [`Self::next_byte`], but end-of-file is a well-formedness
	/// error in the given context.
	#[inline]
	fn require_byte(&mut self, r: &mut &[u8], ctx: &'static str) -> Result<u8> {
		match self.next_byte(r)? {
			Some(b) => Ok(b),
			None => Err(Error::premature_end(ctx)),
		}
	}

	/// Accumulate bytes of the given class, bounded by `limit`, keeping the
	/// position counters in sync.
	fn accumulate<B: ByteSelect>(
		&mut self,
		r: &mut &[u8],
		selector: &B,
		limit: usize,
	) -> Result<ScanEnd> {
		if self.accum.len() >= limit {
			return Ok(ScanEnd::Limit);
		}
		self.reserve_accum();
		let before = self.accum.len();
		let end = read::copy_selected(r, selector, limit - before, &mut self.accum);
		self.pos = self.pos.wrapping_add(self.accum.len() - before);
		match end {
			ScanEnd::Delimiter(b) => {
				self.pos = self.pos.wrapping_add(1);
				Ok(ScanEnd::Delimiter(b))
			}
			ScanEnd::Eof if !self.has_eof => Err(Error::Depleted),
			other => Ok(other),
		}
	}

	/// Skip bytes of the given class without keeping them, tracking the
	/// position counters.
	fn skip_selected<B: ByteSelect>(&mut self, r: &mut &[u8], selector: &B) -> (usize, SkipEnd) {
		let (n, delimiter) = read::skip_selected(r, selector);
		self.pos = self.pos.wrapping_add(n);
		match delimiter {
			Some(b) => {
				self.pos = self.pos.wrapping_add(1);
				(n, SkipEnd::Delimiter(b))
			}
			None if self.has_eof => (n, SkipEnd::Eof),
			None => (n, SkipEnd::Depleted),
		}
	}

	fn discard_accum(&mut self) {
		self.accum.clear();
	}

	/// Park the accumulator so the reference machinery can use it.
	fn stash_accum(&mut self) {
		std::mem::swap(&mut self.accum, &mut self.aside);
	}

	fn take_aside(&mut self) -> Vec<u8> {
		std::mem::take(&mut self.aside)
	}

	/// Cut a token range ending `back` bytes before the current position
	/// and move the anchor.
	fn token_span(&mut self, back: usize) -> TokenMetrics {
		let end = self.pos.wrapping_sub(back);
		let tm = TokenMetrics {
			start: self.anchor,
			end: end,
		};
		self.anchor = end;
		tm
	}

	/// Move the anchor without producing a token (for silently consumed
	/// bytes such as inter-token whitespace or the BOM).
	fn drop_span(&mut self, back: usize) {
		self.anchor = self.pos.wrapping_sub(back);
	}

	fn accum_str(&self) -> Result<&str> {
		match std::str::from_utf8(&self.accum) {
			Ok(s) => Ok(s),
			Err(e) => Err(Error::InvalidUtf8Byte(self.accum[e.valid_up_to()])),
		}
	}

	fn take_name(&mut self, ctx: &'static str) -> Result<Name> {
		let name = {
			let s = self.accum_str()?;
			validate_name(s).map_err(|e| Error::from(e).with_context(ctx))?;
			// SAFETY: validated right above
			unsafe { Name::from_str_unchecked(s) }
		};
		self.accum.clear();
		Ok(name)
	}

	fn take_cdata(&mut self, ctx: &'static str) -> Result<CData> {
		let data = {
			let s = self.accum_str()?;
			validate_cdata(s).map_err(|e| Error::from(e).with_context(ctx))?;
			// SAFETY: validated right above
			unsafe { CData::from_str_unchecked(s) }
		};
		self.accum.clear();
		Ok(data)
	}

	/// Take as much of the accumulator as forms complete UTF-8, leaving a
	/// straddling multibyte head behind for the next call.
	fn take_cdata_prefix(&mut self, ctx: &'static str) -> Result<CData> {
		let (text, used) = match std::str::from_utf8(&self.accum) {
			Ok(s) => (s, self.accum.len()),
			Err(e) if e.valid_up_to() > 0 => {
				let cut = e.valid_up_to();
				// SAFETY: valid_up_to() bounds the well-formed prefix
				(
					unsafe { std::str::from_utf8_unchecked(&self.accum[..cut]) },
					cut,
				)
			}
			Err(_) => return Err(Error::InvalidUtf8Byte(self.accum[0])),
		};
		validate_cdata(text).map_err(|e| Error::from(e).with_context(ctx))?;
		// SAFETY: validated right above
		let data = unsafe { CData::from_str_unchecked(text) };
		self.accum.drain(..used);
		Ok(data)
	}

	/// Turn the accumulated character data into a Text token, or into
	/// nothing if no data accumulated.
	fn flush_text(&mut self, back: usize) -> Result<Option<Token>> {
		if self.accum.is_empty() {
			self.drop_span(back);
			return Ok(None);
		}
		let tm = self.token_span(back);
		Ok(Some(Token::Text(tm, self.take_cdata(ERRCTX_TEXT)?)))
	}

	/// Emit a partial Text token if the accumulator hit the length bound.
	fn flush_text_at_limit(&mut self) -> Result<Option<Token>> {
		if self.accum.len() < self.opts.max_token_length {
			return Ok(None);
		}
		let tm = self.token_span(0);
		Ok(Some(Token::Text(tm, self.take_cdata_prefix(ERRCTX_TEXT)?)))
	}

	/// Emit a partial CData token if the accumulator hit the length bound.
	fn flush_cdata_at_limit(&mut self) -> Result<Option<Token>> {
		if self.accum.len() < self.opts.max_token_length {
			return Ok(None);
		}
		let tm = self.token_span(0);
		Ok(Some(Token::CData(
			tm,
			self.take_cdata_prefix(ERRCTX_CDATA_SECTION)?,
		)))
	}

	/// React to a delimiter byte found while lexing character data.
	///
	/// Returns `None` if the byte has no delimiter role; the caller then
	/// decides whether it is acceptable as plain text.
	fn on_text_delimiter(&mut self, b: u8) -> Result<Option<Step>> {
		match b {
			b'<' => {
				let tok = self.flush_text(1)?;
				Ok(Some((
					State::Content(ContentState::MaybeElement(MaybeElementState::Initial)),
					tok,
				)))
			}
			b'&' => {
				// the pending text must be flushed first, because the
				// reference machinery borrows the accumulator via
				// stash_accum
				let tok = self.flush_text(1)?;
				self.stash_accum();
				Ok(Some((
					State::Reference {
						ret: RefReturnState::Text,
						kind: RefKind::Entity,
					},
					tok,
				)))
			}
			// a possible start of the forbidden `]]>` sequence
			// (XML 1.0 § 2.4); not flushed yet in case it is a false alarm
			b']' => Ok(Some((
				State::Content(ContentState::MaybeCDataEnd(false, 1)),
				None,
			))),
			b'\r' => Ok(Some((State::Content(ContentState::MaybeCRLF(false)), None))),
			_ => Ok(None),
		}
	}

	/// Handle a single byte as character data, including its possible
	/// delimiter role.
	fn text_byte(&mut self, b: u8) -> Result<Step> {
		if let Some(step) = self.on_text_delimiter(b)? {
			return Ok(step);
		}
		if CLASS_XML_MAY_NONCHAR_BYTE.select(b) {
			return Err(Error::NotWellFormed(WFError::InvalidChar(
				ERRCTX_TEXT,
				b as u32,
			)));
		}
		self.reserve_accum();
		self.accum.push(b);
		Ok((State::Content(ContentState::Initial), None))
	}

	fn lex_bom(&mut self, offset: usize, r: &mut &[u8]) -> Result<Step> {
		debug_assert!(offset < UTF8_BOM.len());
		let b = match self.next_byte(r)? {
			Some(b) => b,
			None if offset == 0 => {
				// empty document; the parser reports that
				return Ok((State::Eof, None));
			}
			None => {
				// truncated multibyte sequence at document start
				return Err(Error::InvalidUtf8Byte(UTF8_BOM[0]));
			}
		};
		if b == UTF8_BOM[offset] {
			let next = offset + 1;
			if next < UTF8_BOM.len() {
				return Ok((State::Bom(next), None));
			}
			// a complete BOM is consumed silently and belongs to no token
			self.drop_span(0);
			let next_state = if self.opts.synchronization {
				State::Sync
			} else {
				State::Content(ContentState::Initial)
			};
			return Ok((next_state, None));
		}
		if self.opts.synchronization {
			// whatever prefix was matched was garbage anyway
			if b == b'<' {
				self.drop_span(1);
				Ok((
					State::Content(ContentState::MaybeElement(MaybeElementState::Initial)),
					None,
				))
			} else {
				self.drop_span(0);
				Ok((State::Sync, None))
			}
		} else {
			// not a BOM after all; the matched prefix is character data and
			// gets its UTF-8 check when the text is flushed
			self.reserve_accum();
			self.accum.extend_from_slice(&UTF8_BOM[..offset]);
			self.text_byte(b)
		}
	}

	fn lex_sync(&mut self, r: &mut &[u8]) -> Result<Step> {
		let (_, end) = self.skip_selected(r, &CLASS_XML_SYNC_SKIP_BYTE);
		match end {
			SkipEnd::Delimiter(_) => {
				// '<' is the only byte outside the skip class
				self.drop_span(1);
				Ok((
					State::Content(ContentState::MaybeElement(MaybeElementState::Initial)),
					None,
				))
			}
			SkipEnd::Eof => {
				self.drop_span(0);
				Ok((State::Eof, None))
			}
			SkipEnd::Depleted => Err(Error::Depleted),
		}
	}

	fn lex_markup_start(&mut self, state: MaybeElementState, r: &mut &[u8]) -> Result<Step> {
		match state {
			MaybeElementState::Initial => {
				let b = self.require_byte(r, ERRCTX_ELEMENT)?;
				self.discard_accum();
				match b {
					b'?' => Ok((State::Pi(PiState::Target), None)),
					b'!' => Ok((
						State::Content(ContentState::MaybeElement(MaybeElementState::Bang)),
						None,
					)),
					b'/' => Ok((
						State::Element {
							kind: ElementKind::Footer,
							state: ElementState::Start,
						},
						None,
					)),
					b if CLASS_XML_NAMESTART_BYTE.select(b) => {
						// hold on to the first byte of the name; the name
						// accumulation takes over from here
						self.reserve_accum();
						self.accum.push(b);
						Ok((
							State::Element {
								kind: ElementKind::Header,
								state: ElementState::Start,
							},
							None,
						))
					}
					b => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_NAMESTART,
						b,
						None,
					))),
				}
			}
			MaybeElementState::Bang => {
				let b = self.require_byte(r, ERRCTX_ELEMENT)?;
				match b {
					b'-' => Ok((
						State::Content(ContentState::MaybeElement(
							MaybeElementState::CommentStart,
						)),
						None,
					)),
					b'[' => Ok((
						State::Content(ContentState::MaybeElement(MaybeElementState::Literal(
							TOK_XML_CDATA_START,
							3,
						))),
						None,
					)),
					b'D' => Ok((
						State::Content(ContentState::MaybeElement(MaybeElementState::Literal(
							TOK_XML_DOCTYPE_START,
							3,
						))),
						None,
					)),
					b => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ELEMENT,
						b,
						Some(&["--", "[CDATA[", "DOCTYPE"]),
					))),
				}
			}
			MaybeElementState::CommentStart => {
				let b = self.require_byte(r, ERRCTX_COMMENT)?;
				if b != b'-' {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"malformed comment start",
					)));
				}
				Ok((State::Comment(CommentState::Data), None))
			}
			MaybeElementState::Literal(literal, at) => {
				debug_assert!(at < literal.len());
				let is_cdata = literal == TOK_XML_CDATA_START;
				let ctx = if is_cdata {
					ERRCTX_CDATA_SECTION_START
				} else {
					ERRCTX_DOCTYPE
				};
				let b = self.require_byte(r, ctx)?;
				if b != literal[at] {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(if is_cdata {
						"malformed CDATA section opener"
					} else {
						"malformed document type declaration"
					})));
				}
				if at + 1 < literal.len() {
					Ok((
						State::Content(ContentState::MaybeElement(MaybeElementState::Literal(
							literal,
							at + 1,
						))),
						None,
					))
				} else if is_cdata {
					Ok((State::Content(ContentState::CDataSection), None))
				} else {
					Ok((State::Doctype(DoctypeState::SpaceRequired), None))
				}
			}
		}
	}

	/// Continue a partially seen `]]>` sequence, in or outside a CDATA
	/// section.
	fn lex_section_end(&mut self, in_cdata: bool, seen: usize, r: &mut &[u8]) -> Result<Step> {
		debug_assert!(seen == 1 || seen == 2);
		let ctx = if in_cdata {
			ERRCTX_CDATA_SECTION
		} else {
			ERRCTX_TEXT
		};
		let b = self.require_byte(r, ctx)?;
		match (seen, b) {
			// second ] of the sequence
			(1, b']') => Ok((
				State::Content(ContentState::MaybeCDataEnd(in_cdata, 2)),
				None,
			)),
			// the full ]]> closes a CDATA section...
			(2, b'>') if in_cdata => {
				// the delimiter belongs to the section, so no bytes are
				// subtracted from the span
				let tok = Token::CData(self.token_span(0), self.take_cdata(ERRCTX_CDATA_SECTION)?);
				Ok((State::Content(ContentState::Initial), Some(tok)))
			}
			// ...but must never appear verbatim in character data
			(2, b'>') => Err(Error::NotWellFormed(WFError::InvalidSyntax(
				"']]>' must be escaped in character data",
			))),
			// within a longer ]]]]]> run, each surplus ] is ordinary data
			// and the final two ] may still close the section
			(2, b']') => {
				self.reserve_accum();
				self.accum.push(b']');
				let tok = if in_cdata {
					self.flush_cdata_at_limit()?
				} else {
					self.flush_text_at_limit()?
				};
				Ok((
					State::Content(ContentState::MaybeCDataEnd(in_cdata, 2)),
					tok,
				))
			}
			// the sequence fell apart; what was matched so far is data
			(_, b) => {
				self.reserve_accum();
				self.accum.extend_from_slice(&TOK_XML_CDATA_END[..seen]);
				if !in_cdata {
					return self.text_byte(b);
				}
				if b == b'\r' {
					return Ok((State::Content(ContentState::MaybeCRLF(true)), None));
				}
				if CLASS_XML_MAY_NONCHAR_BYTE.select(b) {
					return Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_CDATA_SECTION,
						b as u32,
					)));
				}
				self.accum.push(b);
				Ok((
					State::Content(ContentState::CDataSection),
					self.flush_cdata_at_limit()?,
				))
			}
		}
	}

	fn lex_content(&mut self, state: ContentState, r: &mut &[u8]) -> Result<Step> {
		match state {
			// accumulate character data up to the next byte with a
			// delimiter role
			ContentState::Initial => {
				match self.accumulate(
					r,
					&CLASS_XML_TEXT_DELIMITED_BYTE,
					self.opts.max_token_length,
				)? {
					ScanEnd::Delimiter(b) => match self.on_text_delimiter(b)? {
						Some(step) => Ok(step),
						// neither a delimiter nor valid text
						None => Err(Error::NotWellFormed(WFError::InvalidChar(
							ERRCTX_TEXT,
							b as u32,
						))),
					},
					ScanEnd::Limit => Ok((
						State::Content(ContentState::Initial),
						self.flush_text(0)?,
					)),
					ScanEnd::Eof => Ok((State::Eof, self.flush_text(0)?)),
				}
			}
			ContentState::CDataSection => {
				match self.accumulate(
					r,
					&CLASS_XML_CDATA_SECTION_DELIMITED_BYTE,
					self.opts.max_token_length,
				)? {
					ScanEnd::Delimiter(b']') => Ok((
						State::Content(ContentState::MaybeCDataEnd(true, 1)),
						None,
					)),
					ScanEnd::Delimiter(b'\r') => {
						Ok((State::Content(ContentState::MaybeCRLF(true)), None))
					}
					ScanEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_CDATA_SECTION,
						b as u32,
					))),
					ScanEnd::Limit => Ok((
						State::Content(ContentState::CDataSection),
						self.flush_cdata_at_limit()?,
					)),
					ScanEnd::Eof => Err(Error::premature_end(ERRCTX_CDATA_SECTION)),
				}
			}
			ContentState::Whitespace => {
				let (_, end) = self.skip_selected(r, &CLASS_XML_SPACE_BYTE);
				match end {
					SkipEnd::Delimiter(b'<') => Ok((
						State::Content(ContentState::MaybeElement(MaybeElementState::Initial)),
						None,
					)),
					SkipEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_XML_DECL_END,
						b,
						Some(&["whitespace", "<"]),
					))),
					SkipEnd::Eof => Ok((State::Eof, None)),
					SkipEnd::Depleted => Err(Error::Depleted),
				}
			}
			ContentState::MaybeElement(substate) => self.lex_markup_start(substate, r),
			ContentState::MaybeCDataEnd(in_cdata, seen) => self.lex_section_end(in_cdata, seen, r),
			ContentState::MaybeCRLF(in_cdata) => {
				let ctx = if in_cdata {
					ERRCTX_CDATA_SECTION
				} else {
					ERRCTX_TEXT
				};
				let b = self.require_byte(r, ctx)?;
				// the CR which got us here always folds into a line feed
				self.reserve_accum();
				self.accum.push(b'\n');
				match b {
					// CRLF collapses into the single LF pushed above
					b'\n' => {
						let next = if in_cdata {
							ContentState::CDataSection
						} else {
							ContentState::Initial
						};
						Ok((State::Content(next), None))
					}
					// a CR run; each CR folds separately
					b'\r' => Ok((State::Content(ContentState::MaybeCRLF(in_cdata)), None)),
					b if in_cdata => {
						if b == b']' {
							Ok((State::Content(ContentState::MaybeCDataEnd(true, 1)), None))
						} else if CLASS_XML_MAY_NONCHAR_BYTE.select(b) {
							Err(Error::NotWellFormed(WFError::InvalidChar(
								ERRCTX_CDATA_SECTION,
								b as u32,
							)))
						} else {
							self.accum.push(b);
							Ok((State::Content(ContentState::CDataSection), None))
						}
					}
					b => self.text_byte(b),
				}
			}
		}
	}

	fn lex_pi(&mut self, state: PiState, r: &mut &[u8]) -> Result<Step> {
		match state {
			PiState::Target => {
				if self.accum.is_empty() {
					// first byte of the target must be a NameStart
					let b = self.require_byte(r, ERRCTX_PI_TARGET)?;
					if !CLASS_XML_NAMESTART_BYTE.select(b) {
						return Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_PI_TARGET,
							b,
							None,
						)));
					}
					self.reserve_accum();
					self.accum.push(b);
					return Ok((State::Pi(PiState::Target), None));
				}
				let b = match self.accumulate(
					r,
					&CLASS_XML_NAME_BYTE,
					self.opts.max_token_length,
				)? {
					ScanEnd::Delimiter(b) => b,
					ScanEnd::Limit => return Err(token_length_error()),
					ScanEnd::Eof => return Err(Error::premature_end(ERRCTX_PI_TARGET)),
				};
				// targets which lowercase to "xml" do not start a
				// processing instruction but the XML declaration, which
				// has an attribute-like grammar of its own
				if self.accum.eq_ignore_ascii_case(b"xml") {
					self.discard_accum();
					let decl_state = match b {
						b' ' | b'\t' | b'\r' | b'\n' => ElementState::Blank,
						b'?' => ElementState::MaybeXMLDeclEnd,
						b => {
							return Err(Error::NotWellFormed(WFError::UnexpectedByte(
								ERRCTX_XML_DECL,
								b,
								Some(&["whitespace", "?"]),
							)))
						}
					};
					let tok = Token::XMLDeclStart(self.token_span(1));
					Ok((
						State::Element {
							kind: ElementKind::XMLDecl,
							state: decl_state,
						},
						Some(tok),
					))
				} else {
					let name = self.take_name(ERRCTX_PI_TARGET)?;
					let pi_state = match b {
						b' ' | b'\t' | b'\r' | b'\n' => PiState::Blank,
						b'?' => PiState::MaybeEnd,
						b => {
							return Err(Error::NotWellFormed(WFError::UnexpectedByte(
								ERRCTX_PI,
								b,
								Some(&["whitespace", "?"]),
							)))
						}
					};
					let tok = Token::PIStart(self.token_span(1), name);
					Ok((State::Pi(pi_state), Some(tok)))
				}
			}
			PiState::Blank => {
				let (_, end) = self.skip_selected(r, &CLASS_XML_SPACE_BYTE);
				match end {
					SkipEnd::Delimiter(b'?') => Ok((State::Pi(PiState::MaybeEnd), None)),
					SkipEnd::Delimiter(b) if CLASS_XML_PI_DELIMITED_BYTE.select(b) => {
						// the skipped separator whitespace belongs to no
						// token
						self.drop_span(1);
						self.reserve_accum();
						self.accum.push(b);
						Ok((State::Pi(PiState::Data), None))
					}
					SkipEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_PI,
						b as u32,
					))),
					SkipEnd::Eof => Err(Error::premature_end(ERRCTX_PI)),
					SkipEnd::Depleted => Err(Error::Depleted),
				}
			}
			PiState::Data => {
				match self.accumulate(r, &CLASS_XML_PI_DELIMITED_BYTE, self.opts.max_token_length)?
				{
					ScanEnd::Delimiter(b'?') => Ok((State::Pi(PiState::MaybeEnd), None)),
					ScanEnd::Delimiter(b'\r') => Ok((State::Pi(PiState::MaybeCRLF), None)),
					ScanEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_PI,
						b as u32,
					))),
					ScanEnd::Limit => Err(token_length_error()),
					ScanEnd::Eof => Err(Error::premature_end(ERRCTX_PI)),
				}
			}
			PiState::MaybeEnd => {
				let b = self.require_byte(r, ERRCTX_PI)?;
				if b == b'>' {
					let tok = Token::PIEnd(self.token_span(0), self.take_cdata(ERRCTX_PI)?);
					return Ok((State::Content(ContentState::Initial), Some(tok)));
				}
				// the ? was instruction data after all
				self.reserve_accum();
				self.accum.push(b'?');
				match b {
					b'?' => Ok((State::Pi(PiState::MaybeEnd), None)),
					b'\r' => Ok((State::Pi(PiState::MaybeCRLF), None)),
					b if CLASS_XML_PI_DELIMITED_BYTE.select(b) => {
						self.accum.push(b);
						Ok((State::Pi(PiState::Data), None))
					}
					b => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_PI,
						b as u32,
					))),
				}
			}
			PiState::MaybeCRLF => {
				let b = self.require_byte(r, ERRCTX_PI)?;
				self.reserve_accum();
				self.accum.push(b'\n');
				match b {
					b'\n' => Ok((State::Pi(PiState::Data), None)),
					b'\r' => Ok((State::Pi(PiState::MaybeCRLF), None)),
					b'?' => Ok((State::Pi(PiState::MaybeEnd), None)),
					b if CLASS_XML_PI_DELIMITED_BYTE.select(b) => {
						self.accum.push(b);
						Ok((State::Pi(PiState::Data), None))
					}
					b => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_PI,
						b as u32,
					))),
				}
			}
		}
	}

	fn lex_comment(&mut self, state: CommentState, r: &mut &[u8]) -> Result<Step> {
		match state {
			CommentState::Data => {
				match self.accumulate(
					r,
					&CLASS_XML_COMMENT_DELIMITED_BYTE,
					self.opts.max_token_length,
				)? {
					ScanEnd::Delimiter(b'-') => Ok((State::Comment(CommentState::MaybeEnd1), None)),
					ScanEnd::Delimiter(b'\r') => {
						Ok((State::Comment(CommentState::MaybeCRLF), None))
					}
					ScanEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_COMMENT,
						b as u32,
					))),
					ScanEnd::Limit => Err(token_length_error()),
					ScanEnd::Eof => Err(Error::premature_end(ERRCTX_COMMENT)),
				}
			}
			CommentState::MaybeEnd1 => {
				let b = self.require_byte(r, ERRCTX_COMMENT)?;
				if b == b'-' {
					return Ok((State::Comment(CommentState::MaybeEnd2), None));
				}
				// a single dash is ordinary comment text
				self.reserve_accum();
				self.accum.push(b'-');
				match b {
					b'\r' => Ok((State::Comment(CommentState::MaybeCRLF), None)),
					b if CLASS_XML_COMMENT_DELIMITED_BYTE.select(b) => {
						self.accum.push(b);
						Ok((State::Comment(CommentState::Data), None))
					}
					b => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_COMMENT,
						b as u32,
					))),
				}
			}
			CommentState::MaybeEnd2 => {
				// XML 1.0 § 2.5: `--` must not occur inside a comment,
				// which means the only legal continuation here is `>`
				let b = self.require_byte(r, ERRCTX_COMMENT)?;
				if b != b'>' {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"'--' not allowed inside comment",
					)));
				}
				let tok = Token::Comment(self.token_span(0), self.take_cdata(ERRCTX_COMMENT)?);
				Ok((State::Content(ContentState::Initial), Some(tok)))
			}
			CommentState::MaybeCRLF => {
				let b = self.require_byte(r, ERRCTX_COMMENT)?;
				self.reserve_accum();
				self.accum.push(b'\n');
				match b {
					b'\n' => Ok((State::Comment(CommentState::Data), None)),
					b'\r' => Ok((State::Comment(CommentState::MaybeCRLF), None)),
					b'-' => Ok((State::Comment(CommentState::MaybeEnd1), None)),
					b if CLASS_XML_COMMENT_DELIMITED_BYTE.select(b) => {
						self.accum.push(b);
						Ok((State::Comment(CommentState::Data), None))
					}
					b => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_COMMENT,
						b as u32,
					))),
				}
			}
		}
	}

	fn lex_doctype(&mut self, state: DoctypeState, r: &mut &[u8]) -> Result<Step> {
		match state {
			DoctypeState::SpaceRequired | DoctypeState::Blank => {
				let (nskipped, end) = self.skip_selected(r, &CLASS_XML_SPACE_BYTE);
				match end {
					SkipEnd::Delimiter(b) => {
						if state == DoctypeState::SpaceRequired && nskipped == 0 {
							Err(Error::NotWellFormed(WFError::InvalidSyntax(
								"space required after '<!DOCTYPE'",
							)))
						} else if CLASS_XML_NAMESTART_BYTE.select(b) {
							self.reserve_accum();
							self.accum.push(b);
							Ok((State::Doctype(DoctypeState::Name), None))
						} else {
							Err(Error::NotWellFormed(WFError::UnexpectedByte(
								ERRCTX_DOCTYPE,
								b,
								Some(&["start of name"]),
							)))
						}
					}
					SkipEnd::Depleted => {
						if nskipped > 0 && state == DoctypeState::SpaceRequired {
							// the whitespace requirement is met; record
							// that before suspending so resumption works
							// regardless of where the chunk ended
							Ok((State::Doctype(DoctypeState::Blank), None))
						} else {
							Err(Error::Depleted)
						}
					}
					SkipEnd::Eof => Err(Error::premature_end(ERRCTX_DOCTYPE)),
				}
			}
			DoctypeState::Name => {
				match self.accumulate(r, &CLASS_XML_NAME_BYTE, self.opts.max_token_length)? {
					ScanEnd::Delimiter(b'>') => {
						let tok = Token::DocType(self.token_span(0), self.take_name(ERRCTX_DOCTYPE)?);
						Ok((State::Content(ContentState::Initial), Some(tok)))
					}
					ScanEnd::Delimiter(b' ')
					| ScanEnd::Delimiter(b'\t')
					| ScanEnd::Delimiter(b'\r')
					| ScanEnd::Delimiter(b'\n') => {
						// the name stays in the accumulator while the
						// external-ID part is discarded
						Ok((State::Doctype(DoctypeState::Trailing), None))
					}
					ScanEnd::Delimiter(b'[') => Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"internal subset not supported",
					))),
					ScanEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_DOCTYPE,
						b,
						Some(&["whitespace", ">"]),
					))),
					ScanEnd::Limit => Err(token_length_error()),
					ScanEnd::Eof => Err(Error::premature_end(ERRCTX_DOCTYPE)),
				}
			}
			DoctypeState::Trailing => {
				let (_, end) = self.skip_selected(r, &CLASS_XML_DOCTYPE_TRAILING_BYTE);
				match end {
					SkipEnd::Delimiter(b'>') => {
						let tok = Token::DocType(self.token_span(0), self.take_name(ERRCTX_DOCTYPE)?);
						Ok((State::Content(ContentState::Initial), Some(tok)))
					}
					SkipEnd::Delimiter(b'[') => Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"internal subset not supported",
					))),
					SkipEnd::Delimiter(b) => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_DOCTYPE,
						b as u32,
					))),
					SkipEnd::Eof => Err(Error::premature_end(ERRCTX_DOCTYPE)),
					SkipEnd::Depleted => Err(Error::Depleted),
				}
			}
		}
	}

	/// Decide the element sub-state following a delimiter byte read after a
	/// name, an attribute value or whitespace inside a header, footer or
	/// the XML declaration.
	fn tag_delimiter_state(&mut self, kind: ElementKind, b: u8) -> Result<ElementState> {
		match (b, kind) {
			(b' ', _) | (b'\t', _) | (b'\r', _) | (b'\n', _) => Ok(ElementState::Blank),
			(b'=', _) => Ok(ElementState::Eq),
			(b'"', _) => Ok(ElementState::AttributeValue(
				b'"',
				CLASS_XML_ATT_QUOT_DELIMITED_BYTE,
				false,
			)),
			(b'\'', _) => Ok(ElementState::AttributeValue(
				b'\'',
				CLASS_XML_ATT_APOS_DELIMITED_BYTE,
				false,
			)),
			(b'>', ElementKind::XMLDecl) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_XML_DECL,
				b'>',
				Some(&["?"]),
			))),
			(b'>', _) => Ok(ElementState::Close),
			(b'?', ElementKind::XMLDecl) => Ok(ElementState::MaybeXMLDeclEnd),
			(b'?', _) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_ELEMENT,
				b'?',
				None,
			))),
			(b'/', ElementKind::Header) => Ok(ElementState::MaybeHeadClose),
			(b'/', ElementKind::Footer) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_ELEMENT_FOOT,
				b'/',
				None,
			))),
			(b'/', ElementKind::XMLDecl) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_XML_DECL,
				b'/',
				None,
			))),
			(b, _) if CLASS_XML_NAMESTART_BYTE.select(b) => {
				// the byte opens the next name; keep it
				self.reserve_accum();
				self.accum.push(b);
				Ok(ElementState::Name)
			}
			(b, ElementKind::XMLDecl) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_XML_DECL,
				b,
				Some(&["whitespace", "\"", "'", "=", ">", "?", "start of name"]),
			))),
			(b, _) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_ELEMENT,
				b,
				Some(&["whitespace", "\"", "'", "=", ">", "?", "/", "start of name"]),
			))),
		}
	}

	/// Handle the byte which ended an attribute value accumulation run.
	fn end_attribute(
		&mut self,
		delim: u8,
		selector: &'static [ByteRange],
		b: u8,
		kind: ElementKind,
	) -> Result<Step> {
		match b {
			d if d == delim => {
				let tok = Token::AttributeValue(
					self.token_span(0),
					self.take_cdata(ERRCTX_ATTVAL)?,
					Quote::from_delimiter(delim),
				);
				Ok((
					State::Element {
						kind: kind,
						// the grammar demands whitespace before the next
						// attribute name
						state: ElementState::SpaceRequired,
					},
					Some(tok),
				))
			}
			b'&' => {
				// lend the accumulator (holding the partial value) to the
				// reference machinery
				self.stash_accum();
				Ok((
					State::Reference {
						ret: RefReturnState::AttributeValue(kind, delim, selector),
						kind: RefKind::Entity,
					},
					None,
				))
			}
			b'<' => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_ATTVAL,
				b'<',
				None,
			))),
			// XML 1.0 § 3.3.3: attribute-value normalization
			b'\t' | b'\n' => {
				self.reserve_accum();
				self.accum.push(b' ');
				Ok((
					State::Element {
						kind: kind,
						state: ElementState::AttributeValue(delim, selector, false),
					},
					None,
				))
			}
			b'\r' => Ok((
				State::Element {
					kind: kind,
					state: ElementState::AttributeValue(delim, selector, true),
				},
				None,
			)),
			other => Err(Error::NotWellFormed(WFError::InvalidChar(
				ERRCTX_ATTVAL,
				other as u32,
			))),
		}
	}

	fn lex_tag(&mut self, kind: ElementKind, state: ElementState, r: &mut &[u8]) -> Result<Step> {
		match state {
			ElementState::Start | ElementState::Name => {
				if self.accum.is_empty() {
					// the first byte is held to the stricter NameStart
					// class; everything after it goes through the bulk
					// accumulation below
					let b = self.require_byte(r, ERRCTX_NAME)?;
					if !CLASS_XML_NAMESTART_BYTE.select(b) {
						return Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_NAME,
							b,
							None,
						)));
					}
					self.reserve_accum();
					self.accum.push(b);
					return Ok((
						State::Element {
							kind: kind,
							state: state,
						},
						None,
					));
				}
				let b = match self.accumulate(
					r,
					&CLASS_XML_NAME_BYTE,
					self.opts.max_token_length,
				)? {
					ScanEnd::Delimiter(b) => b,
					ScanEnd::Limit => return Err(token_length_error()),
					ScanEnd::Eof => return Err(Error::premature_end(ERRCTX_NAME)),
				};
				let next = self.tag_delimiter_state(kind, b)?;
				let name = self.take_name(ERRCTX_NAME)?;
				let tm = self.token_span(1);
				let tok = if state == ElementState::Name {
					Token::Name(tm, name)
				} else {
					match kind {
						ElementKind::Header => Token::ElementHeadStart(tm, name),
						ElementKind::Footer => Token::ElementFootStart(tm, name),
						// the declaration target was consumed before this
						// state was ever entered
						ElementKind::XMLDecl => unreachable!("declaration cannot carry a tag name"),
					}
				};
				Ok((
					State::Element {
						kind: kind,
						state: next,
					},
					Some(tok),
				))
			}
			ElementState::SpaceRequired | ElementState::Blank => {
				let (nskipped, end) = self.skip_selected(r, &CLASS_XML_SPACE_BYTE);
				match end {
					SkipEnd::Delimiter(b) => {
						self.drop_span(1);
						let next = self.tag_delimiter_state(kind, b)?;
						if next == ElementState::Name
							&& state == ElementState::SpaceRequired
							&& nskipped == 0
						{
							return Err(Error::NotWellFormed(WFError::InvalidSyntax(
								"whitespace required before attribute names",
							)));
						}
						Ok((
							State::Element {
								kind: kind,
								state: next,
							},
							None,
						))
					}
					SkipEnd::Depleted => {
						if nskipped > 0 && state == ElementState::SpaceRequired {
							// a single space satisfies the requirement;
							// record that before suspending so behavior
							// does not depend on where the chunk ended
							Ok((
								State::Element {
									kind: kind,
									state: ElementState::Blank,
								},
								None,
							))
						} else {
							Err(Error::Depleted)
						}
					}
					SkipEnd::Eof => Err(Error::premature_end(ERRCTX_ELEMENT)),
				}
			}
			// XML 1.0 § 2.3 [10] AttValue
			ElementState::AttributeValue(delim, selector, false) => {
				match self.accumulate(r, &selector, self.opts.max_token_length)? {
					ScanEnd::Delimiter(b) => self.end_attribute(delim, selector, b, kind),
					ScanEnd::Limit => Err(token_length_error()),
					ScanEnd::Eof => Err(Error::premature_end(ERRCTX_ATTVAL)),
				}
			}
			// CR handling inside an attribute value; separate from the
			// content CRLF machinery because the delimiter and selector
			// have to ride along
			ElementState::AttributeValue(delim, selector, true) => {
				let b = self.require_byte(r, ERRCTX_ATTVAL)?;
				if b == b'\r' {
					self.reserve_accum();
					self.accum.push(b' ');
					Ok((
						State::Element {
							kind: kind,
							state: ElementState::AttributeValue(delim, selector, true),
						},
						None,
					))
				} else {
					self.end_attribute(delim, selector, b, kind)
				}
			}
			ElementState::MaybeXMLDeclEnd => {
				let b = self.require_byte(r, ERRCTX_XML_DECL_END)?;
				if b != b'>' {
					return Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_XML_DECL_END,
						b,
						Some(&[">"]),
					)));
				}
				self.discard_accum();
				Ok((
					State::Content(ContentState::Whitespace),
					Some(Token::XMLDeclEnd(self.token_span(0))),
				))
			}
			ElementState::MaybeHeadClose => {
				let b = self.require_byte(r, ERRCTX_ELEMENT_CLOSE)?;
				if b != b'>' {
					return Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ELEMENT_CLOSE,
						b,
						Some(&[">"]),
					)));
				}
				self.discard_accum();
				Ok((
					State::Content(ContentState::Initial),
					Some(Token::ElementHeadClose(self.token_span(0))),
				))
			}
			// entered after a '=' was read; nothing to consume here, the
			// following Blank state reads (and classifies) the next byte
			ElementState::Eq => Ok((
				State::Element {
					kind: kind,
					state: ElementState::Blank,
				},
				Some(Token::Eq(self.token_span(0))),
			)),
			// entered after a '>' was read; likewise nothing to consume
			ElementState::Close => Ok((
				State::Content(ContentState::Initial),
				Some(Token::ElementHFEnd(self.token_span(0))),
			)),
		}
	}

	/// Expand a complete reference (named or character) into the
	/// accumulator.
	fn expand_reference(&mut self, kind: RefKind, reference: &[u8]) -> Result<()> {
		match kind {
			RefKind::Entity => match lookup_named_entity(reference) {
				Some(replacement) => {
					self.reserve_accum();
					self.accum.push(replacement);
					Ok(())
				}
				None => Err(Error::NotWellFormed(WFError::UndeclaredEntity)),
			},
			RefKind::Char(radix) => {
				// the digit selectors only admit plain ascii
				let digits = unsafe { std::str::from_utf8_unchecked(reference) };
				let ch = decode_char_reference(digits, radix)?;
				let mut utf8 = [0u8; 4];
				let encoded = ch.encode_utf8(&mut utf8[..]);
				self.reserve_accum();
				self.accum.extend_from_slice(encoded.as_bytes());
				Ok(())
			}
		}
	}

	fn lex_reference(&mut self, ret: RefReturnState, kind: RefKind, r: &mut &[u8]) -> Result<Step> {
		let selector: &'static [ByteRange] = match kind {
			RefKind::Entity => CLASS_XML_NAME_BYTE,
			RefKind::Char(CharRefRadix::Decimal) => CLASS_XML_DECIMAL_DIGIT_BYTE,
			RefKind::Char(CharRefRadix::Hexadecimal) => CLASS_XML_HEXADECIMAL_DIGIT_BYTE,
		};
		let b = match self.accumulate(r, &selector, MAX_REFERENCE_LENGTH)? {
			ScanEnd::Delimiter(b) => b,
			// no known reference is this long
			ScanEnd::Limit => return Err(Error::NotWellFormed(WFError::UndeclaredEntity)),
			ScanEnd::Eof => return Err(Error::premature_end(ERRCTX_REF)),
		};
		match (kind, b) {
			// `&#` switches to a decimal character reference...
			(RefKind::Entity, b'#') if self.accum.is_empty() => Ok((
				State::Reference {
					ret: ret,
					kind: RefKind::Char(CharRefRadix::Decimal),
				},
				None,
			)),
			// ...and `&#x` to a hexadecimal one
			(RefKind::Char(CharRefRadix::Decimal), b'x') if self.accum.is_empty() => Ok((
				State::Reference {
					ret: ret,
					kind: RefKind::Char(CharRefRadix::Hexadecimal),
				},
				None,
			)),
			(_, b';') => {
				if self.accum.is_empty() {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"reference with no content",
					)));
				}
				// restore the parked accumulation, then expand into it
				self.stash_accum();
				let reference = self.take_aside();
				self.expand_reference(kind, &reference)?;
				Ok((ret.resume(), None))
			}
			(_, b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_REF,
				b,
				Some(&[";"]),
			))),
		}
	}

	#[cfg(debug_assertions)]
	fn note_progress(&mut self) {
		self.last_state = (self.accum.clone(), self.state);
	}

	#[cfg(debug_assertions)]
	fn assert_progress(&mut self) {
		if self.last_state.0 == self.accum && self.last_state.1 == self.state {
			panic!(
				"lexer made no progress: state {:?}, accum {:?}, last byte {:?}",
				self.state, self.accum, self.last_byte
			);
		}
		self.note_progress();
	}

	fn run(&mut self, r: &mut &[u8]) -> Result<Option<Token>> {
		if let Some(e) = self.err {
			return Err(e);
		}

		loop {
			let step = match self.state {
				State::Bom(offset) => self.lex_bom(offset, r),
				State::Sync => self.lex_sync(r),
				State::Content(substate) => self.lex_content(substate, r),
				State::Element {
					kind,
					state: substate,
				} => self.lex_tag(kind, substate, r),
				State::Pi(substate) => self.lex_pi(substate, r),
				State::Comment(substate) => self.lex_comment(substate, r),
				State::Doctype(substate) => self.lex_doctype(substate, r),
				State::Reference { ret, kind } => self.lex_reference(ret, kind, r),
				State::Eof => return Ok(None),
			};
			let (next, token) = match step {
				Ok(step) => step,
				// running out of buffered data is retriable and therefore
				// never latched
				Err(Error::Depleted) => return Err(Error::Depleted),
				Err(fatal) => {
					self.err = Some(fatal);
					return Err(fatal);
				}
			};
			self.state = next;
			if let Some(token) = token {
				#[cfg(debug_assertions)]
				self.note_progress();
				return Ok(Some(token));
			}
			#[cfg(debug_assertions)]
			self.assert_progress();
		}
	}

	/// Lex bytes from the window, advancing it past everything consumed,
	/// until a token is complete, an error occurs or the window runs dry.
	///
	/// `at_eof` tells the lexer whether the end of this window is the end
	/// of the document. Without it, running out of bytes surfaces as a
	/// retriable [`std::io::ErrorKind::WouldBlock`] I/O error and the call
	/// can be repeated once more data is available; with it, the end of
	/// the window is final and either terminates the document cleanly
	/// (`None`) or is a well-formedness error.
	///
	/// **Note:** Some tokens complete without consuming further input (for
	/// example a `>` whose byte was already processed). Keep calling this
	/// function — with an empty window if need be — until a non-token
	/// result appears.
	#[inline]
	pub fn lex_bytes(&mut self, r: &mut &[u8], at_eof: bool) -> CrateResult<Option<Token>> {
		self.has_eof = at_eof;
		Ok(self.run(r)?)
	}

	/// Lex out of a [`std::io::BufRead`], issuing exactly one `fill_buf()`
	/// call, until a token is complete, an error occurs or the source has
	/// no more data buffered.
	///
	/// An empty `fill_buf()` result is taken as the end of the document. A
	/// [`std::io::ErrorKind::WouldBlock`] error from the source does not
	/// abort the call: the lexer still runs over an empty window, because
	/// a token may complete without consuming input (see
	/// [`Self::lex_bytes`]); any other I/O error is returned as
	/// [`Error::IO`](crate::Error::IO) without touching the lexer state,
	/// so it can be retried.
	///
	/// Returns `None` at a clean end of document, a token when one is
	/// complete, or an error.
	pub fn lex<R: io::BufRead + ?Sized>(&mut self, r: &mut R) -> CrateResult<Option<Token>> {
		let (mut window, at_eof): (&[u8], bool) = match r.fill_buf() {
			Ok(data) => (data, data.is_empty()),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => (&[], false),
			Err(e) => return Err(e.into()),
		};
		let available = window.len();
		let result = self.lex_bytes(&mut window, at_eof);
		let used = available - window.len();
		r.consume(used);
		Ok(result?)
	}

	/// Release all temporary buffers
	///
	/// This is sensible to call when it is expected that no more data will
	/// be processed by the lexer for a while and the memory is better used
	/// elsewhere.
	pub fn release_temporaries(&mut self) {
		self.accum.shrink_to_fit();
		self.aside.shrink_to_fit();
	}
}

impl fmt::Debug for Lexer {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Lexer").field("state", &self.state).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bufq::BufferQueue;
	use crate::error::Error as CrateError;
	use std::io;

	struct VecSink {
		dest: Vec<Token>,
		limit: usize,
	}

	impl VecSink {
		fn new(limit: usize) -> VecSink {
			VecSink {
				dest: Vec::new(),
				limit: limit,
			}
		}

		fn token(&mut self, token: Token) {
			if self.dest.len() >= self.limit {
				panic!("token limit exceeded: {}", self.limit);
			}
			self.dest.push(token);
		}
	}

	/// Stream tokens to the sink until the end of stream is reached.
	fn stream_to_sink<'r, 's, 'l, R: io::BufRead>(
		l: &'l mut Lexer,
		r: &'r mut R,
		s: &'s mut VecSink,
	) -> CrateResult<()> {
		loop {
			match l.lex(r) {
				Ok(Some(tok)) => s.token(tok),
				Ok(None) => break,
				Err(CrateError::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => {
					if let Ok(buf) = r.fill_buf() {
						if buf.len() > 0 {
							continue;
						}
					}
					return Err(CrateError::IO(e));
				}
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}

	fn lex(data: &[u8], token_limit: usize) -> (Vec<Token>, CrateResult<()>) {
		lex_with_options(data, token_limit, LexerOptions::default())
	}

	fn lex_with_options(
		data: &[u8],
		token_limit: usize,
		opts: LexerOptions,
	) -> (Vec<Token>, CrateResult<()>) {
		let mut buff = io::BufReader::new(data);
		let mut lexer = Lexer::with_options(opts);
		let mut sink = VecSink::new(token_limit);
		let result = stream_to_sink(&mut lexer, &mut buff, &mut sink);
		(sink.dest, result)
	}

	fn lex_chunked(data: &[&[u8]], token_limit: usize) -> (Vec<Token>, CrateResult<()>) {
		let mut buff = BufferQueue::new();
		let mut lexer = Lexer::new();
		let mut sink = VecSink::new(token_limit);
		for chunk in data.iter() {
			buff.push(*chunk);
			match stream_to_sink(&mut lexer, &mut buff, &mut sink) {
				Ok(()) => panic!("unexpected end of tokens"),
				Err(CrateError::IO(ioerr)) if ioerr.kind() == io::ErrorKind::WouldBlock => (),
				Err(e) => return (sink.dest, Err(e)),
			}
		}
		buff.push_eof();
		let result = stream_to_sink(&mut lexer, &mut buff, &mut sink);
		(sink.dest, result)
	}

	fn lex_err(data: &[u8], token_limit: usize) -> Option<CrateError> {
		let (_, r) = lex(data, token_limit);
		r.err()
	}

	fn collect_texts(toks: &[Token]) -> String {
		let mut out = String::new();
		for tok in toks.iter() {
			match tok {
				Token::Text(_, t) => out.push_str(t),
				_ => (),
			}
		}
		out
	}

	#[test]
	fn lexer_lex_xml_decl_start() {
		let (toks, r) = lex(b"<?xml version='1.0'?><root/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::XMLDeclStart(tm) if tm.start() == 0 && tm.end() == 5));
	}

	#[test]
	fn lexer_lex_xml_decl_full() {
		let (toks, r) = lex(b"<?xml version='1.0'?><root/>", 128);
		r.unwrap();
		let mut iter = toks.iter();
		assert!(matches!(iter.next().unwrap(), Token::XMLDeclStart(_)));
		assert!(matches!(iter.next().unwrap(), Token::Name(_, name) if name == "version"));
		assert!(matches!(iter.next().unwrap(), Token::Eq(_)));
		assert!(matches!(
			iter.next().unwrap(),
			Token::AttributeValue(_, v, Quote::Single) if v == "1.0"
		));
		assert!(matches!(iter.next().unwrap(), Token::XMLDeclEnd(_)));
	}

	#[test]
	fn lexer_lex_element_head_with_attributes() {
		let (toks, r) = lex(b"<e a=\"1\" b='2'/>", 128);
		r.unwrap();
		let mut iter = toks.iter();
		assert!(matches!(iter.next().unwrap(), Token::ElementHeadStart(_, name) if name == "e"));
		assert!(matches!(iter.next().unwrap(), Token::Name(_, name) if name == "a"));
		assert!(matches!(iter.next().unwrap(), Token::Eq(_)));
		assert!(matches!(
			iter.next().unwrap(),
			Token::AttributeValue(_, v, Quote::Double) if v == "1"
		));
		assert!(matches!(iter.next().unwrap(), Token::Name(_, name) if name == "b"));
		assert!(matches!(iter.next().unwrap(), Token::Eq(_)));
		assert!(matches!(
			iter.next().unwrap(),
			Token::AttributeValue(_, v, Quote::Single) if v == "2"
		));
		assert!(matches!(iter.next().unwrap(), Token::ElementHeadClose(_)));
	}

	#[test]
	fn lexer_lex_element_tree_and_text() {
		let (toks, r) = lex(b"<r><a/><b>x</b></r>", 128);
		r.unwrap();
		let mut iter = toks.iter();
		assert!(matches!(iter.next().unwrap(), Token::ElementHeadStart(_, n) if n == "r"));
		assert!(matches!(iter.next().unwrap(), Token::ElementHFEnd(_)));
		assert!(matches!(iter.next().unwrap(), Token::ElementHeadStart(_, n) if n == "a"));
		assert!(matches!(iter.next().unwrap(), Token::ElementHeadClose(_)));
		assert!(matches!(iter.next().unwrap(), Token::ElementHeadStart(_, n) if n == "b"));
		assert!(matches!(iter.next().unwrap(), Token::ElementHFEnd(_)));
		assert!(matches!(iter.next().unwrap(), Token::Text(_, t) if t == "x"));
		assert!(matches!(iter.next().unwrap(), Token::ElementFootStart(_, n) if n == "b"));
		assert!(matches!(iter.next().unwrap(), Token::ElementHFEnd(_)));
		assert!(matches!(iter.next().unwrap(), Token::ElementFootStart(_, n) if n == "r"));
		assert!(matches!(iter.next().unwrap(), Token::ElementHFEnd(_)));
	}

	#[test]
	fn lexer_lex_generic_pi() {
		let (toks, r) = lex(b"<?pitarget   pidata   ?><r/>", 128);
		r.unwrap();
		let mut iter = toks.iter();
		assert!(matches!(iter.next().unwrap(), Token::PIStart(_, n) if n == "pitarget"));
		// trailing whitespace is part of the raw data; the parser trims it
		assert!(matches!(iter.next().unwrap(), Token::PIEnd(_, d) if d == "pidata   "));
	}

	#[test]
	fn lexer_lex_pi_with_question_marks_in_data() {
		let (toks, r) = lex(b"<?t a?b??c?><r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[1], Token::PIEnd(_, d) if d == "a?b??c"));
	}

	#[test]
	fn lexer_lex_pi_without_data() {
		let (toks, r) = lex(b"<?t?><r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::PIStart(_, n) if n == "t"));
		assert!(matches!(&toks[1], Token::PIEnd(_, d) if d == ""));
	}

	#[test]
	fn lexer_lex_pi_target_must_be_a_name() {
		let err = lex_err(b"<?2fail?>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::UnexpectedByte(ERRCTX_PI_TARGET, b'2', _))
		));
	}

	#[test]
	fn lexer_lex_mixed_case_xml_target_enters_decl_grammar() {
		let (toks, r) = lex(b"<?XML version='1.0'?><r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::XMLDeclStart(_)));
	}

	#[test]
	fn lexer_lex_xmlish_target_is_a_plain_pi() {
		let (toks, r) = lex(b"<?xml-stylesheet href='a.xsl'?><r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::PIStart(_, n) if n == "xml-stylesheet"));
	}

	#[test]
	fn lexer_lex_comment() {
		let (toks, r) = lex(b"<!-- a - b -><- c --><r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::Comment(_, t) if t == " a - b -><- c "));
	}

	#[test]
	fn lexer_lex_empty_comment() {
		let (toks, r) = lex(b"<!----><r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::Comment(_, t) if t == ""));
	}

	#[test]
	fn lexer_rejects_double_dash_inside_comment() {
		let err = lex_err(b"<!-- a -- b --><r/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax("'--' not allowed inside comment"))
		));
	}

	#[test]
	fn lexer_rejects_double_dash_straddling_chunks() {
		let (_, r) = lex_chunked(&[b"<!-- a -", b"- b -->"], 128);
		assert!(matches!(
			r.err().unwrap(),
			CrateError::NotWellFormed(WFError::InvalidSyntax("'--' not allowed inside comment"))
		));
	}

	#[test]
	fn lexer_lex_doctype() {
		let (toks, r) = lex(b"<!DOCTYPE root><root/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::DocType(_, n) if n == "root"));
		assert!(matches!(&toks[1], Token::ElementHeadStart(_, n) if n == "root"));
	}

	#[test]
	fn lexer_lex_doctype_discards_external_id() {
		let (toks, r) = lex(b"<!DOCTYPE root SYSTEM \"some.dtd\"><root/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::DocType(_, n) if n == "root"));
	}

	#[test]
	fn lexer_rejects_doctype_internal_subset() {
		let err = lex_err(b"<!DOCTYPE root [<!ELEMENT root EMPTY>]><root/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax("internal subset not supported"))
		));
	}

	#[test]
	fn lexer_rejects_doctype_without_space() {
		let err = lex_err(b"<!DOCTYPEroot><root/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax(
				"space required after '<!DOCTYPE'"
			))
		));
	}

	#[test]
	fn lexer_rejects_unknown_bang_construct() {
		let err = lex_err(b"<!ELEMENT root EMPTY><root/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::UnexpectedByte(_, b'E', _))
		));
	}

	#[test]
	fn lexer_rejects_misspelled_doctype_literal() {
		let err = lex_err(b"<!DOCTYPO root><root/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax(
				"malformed document type declaration"
			))
		));
	}

	#[test]
	fn lexer_lex_cdata_section() {
		let (toks, r) = lex(b"<r><![CDATA[<not> &markup;]]></r>", 128);
		r.unwrap();
		assert!(matches!(&toks[2], Token::CData(_, t) if t == "<not> &markup;"));
	}

	#[test]
	fn lexer_lex_empty_cdata_section() {
		let (toks, r) = lex(b"<r><![CDATA[]]></r>", 128);
		r.unwrap();
		assert!(matches!(&toks[2], Token::CData(_, t) if t == ""));
	}

	#[test]
	fn lexer_lex_cdata_section_with_brackets() {
		let (toks, r) = lex(b"<r><![CDATA[a]]b]]]></r>", 128);
		r.unwrap();
		assert!(matches!(&toks[2], Token::CData(_, t) if t == "a]]b]"));
	}

	#[test]
	fn lexer_rejects_cdata_end_in_text() {
		let err = lex_err(b"<r>a]]>b</r>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax(
				"']]>' must be escaped in character data"
			))
		));
	}

	#[test]
	fn lexer_lex_entities_in_text() {
		let (toks, r) = lex(b"<r>&amp;&lt;&gt;&apos;&quot;</r>", 128);
		r.unwrap();
		assert_eq!(collect_texts(&toks), "&<>'\"");
	}

	#[test]
	fn lexer_lex_char_references_in_text() {
		let (toks, r) = lex(b"<r>&#65;&#x42;</r>", 128);
		r.unwrap();
		assert_eq!(collect_texts(&toks), "AB");
	}

	#[test]
	fn lexer_lex_entities_in_attribute_value() {
		let (toks, r) = lex(b"<r a='&amp;&#x3c;'/>", 128);
		r.unwrap();
		assert!(matches!(&toks[3], Token::AttributeValue(_, v, _) if v == "&<"));
	}

	#[test]
	fn lexer_rejects_undeclared_entity() {
		let err = lex_err(b"<r>&nbsp;</r>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::UndeclaredEntity)
		));
	}

	#[test]
	fn lexer_folds_crlf_in_text() {
		let (toks, r) = lex(b"<r>a\r\nb\rc</r>", 128);
		r.unwrap();
		assert_eq!(collect_texts(&toks), "a\nb\nc");
	}

	#[test]
	fn lexer_normalizes_whitespace_in_attribute_value() {
		let (toks, r) = lex(b"<r a='x\ty\r\nz'/>", 128);
		r.unwrap();
		assert!(matches!(&toks[3], Token::AttributeValue(_, v, _) if v == "x y z"));
	}

	#[test]
	fn lexer_consumes_bom_silently() {
		let (toks, r) = lex(b"\xef\xbb\xbf<r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::ElementHeadStart(tm, n) if n == "r" && tm.start() == 3));
	}

	#[test]
	fn lexer_consumes_bom_split_across_chunks() {
		let (toks, r) = lex_chunked(&[b"\xef", b"\xbb", b"\xbf<r/>"], 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::ElementHeadStart(_, n) if n == "r"));
	}

	#[test]
	fn lexer_without_bom_lexes_leading_whitespace_as_text() {
		let (toks, r) = lex(b"  <r/>", 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::Text(_, t) if t == "  "));
		assert!(matches!(&toks[1], Token::ElementHeadStart(_, n) if n == "r"));
	}

	#[test]
	fn lexer_synchronization_discards_garbage_before_document() {
		let (toks, r) = lex_with_options(
			b"garbage)(*&<r/>",
			128,
			LexerOptions::default().synchronization(true),
		);
		r.unwrap();
		assert!(matches!(&toks[0], Token::ElementHeadStart(_, n) if n == "r"));
	}

	#[test]
	fn lexer_rejects_invalid_utf8_in_text() {
		let err = lex_err(b"<r>a\xff</r>", 128).unwrap();
		assert!(matches!(err, CrateError::InvalidUtf8Byte(0xff)));
	}

	#[test]
	fn lexer_rejects_control_chars_in_text() {
		let err = lex_err(b"<r>a\x01</r>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidChar(_, 0x01))
		));
	}

	#[test]
	fn lexer_accepts_multibyte_names() {
		let (toks, r) = lex("<träger/>".as_bytes(), 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::ElementHeadStart(_, n) if n == "träger"));
	}

	#[test]
	fn lexer_is_chunking_invariant() {
		let doc: &[u8] =
			b"<?xml version='1.0'?><!DOCTYPE r><r a='1'><!--c--><?p d?><![CDATA[x]]>t</r>";
		let (bulk, r) = lex(doc, 128);
		r.unwrap();
		for size in 1..doc.len() {
			let chunks: Vec<&[u8]> = doc.chunks(size).collect();
			let (chunked, r) = lex_chunked(&chunks[..], 128);
			assert!(r.is_ok(), "chunk size {}: {:?}", size, r);
			assert_eq!(bulk, chunked, "chunk size {}", size);
		}
	}

	#[test]
	fn lexer_latches_errors() {
		let mut buff = io::BufReader::new(&b"<r>\x01</r>"[..]);
		let mut lexer = Lexer::new();
		let mut sink = VecSink::new(128);
		let e1 = stream_to_sink(&mut lexer, &mut buff, &mut sink)
			.err()
			.unwrap();
		let e2 = stream_to_sink(&mut lexer, &mut buff, &mut sink)
			.err()
			.unwrap();
		assert_eq!(e1, e2);
	}

	#[test]
	fn lexer_splits_long_text_tokens() {
		let (toks, r) = lex_with_options(
			b"<r>abcdefghij</r>",
			128,
			LexerOptions::default().max_token_length(4),
		);
		r.unwrap();
		assert_eq!(collect_texts(&toks), "abcdefghij");
		let text_tokens = toks
			.iter()
			.filter(|t| matches!(t, Token::Text(..)))
			.count();
		assert!(text_tokens > 1);
	}

	#[test]
	fn lexer_rejects_overlong_names() {
		let mut buff = io::BufReader::new(&b"<averylongelementname/>"[..]);
		let mut lexer = Lexer::with_options(LexerOptions::default().max_token_length(4));
		let mut sink = VecSink::new(128);
		let err = stream_to_sink(&mut lexer, &mut buff, &mut sink)
			.err()
			.unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax("token length limit exceeded"))
		));
	}

	#[test]
	fn lexer_requires_space_between_attributes() {
		let err = lex_err(b"<r a='1'b='2'/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::InvalidSyntax(
				"whitespace required before attribute names"
			))
		));
	}

	#[test]
	fn lexer_rejects_lt_in_attribute_value() {
		let err = lex_err(b"<r a='<'/>", 128).unwrap();
		assert!(matches!(
			err,
			CrateError::NotWellFormed(WFError::UnexpectedByte(_, b'<', None))
		));
	}

	#[test]
	fn lexer_emits_pi_tokens_for_byte_at_a_time_input() {
		let doc = b"<?pitarget pidata?><r/>";
		let chunks: Vec<&[u8]> = doc.chunks(1).collect();
		let (toks, r) = lex_chunked(&chunks[..], 128);
		r.unwrap();
		assert!(matches!(&toks[0], Token::PIStart(_, n) if n == "pitarget"));
		assert!(matches!(&toks[1], Token::PIEnd(_, d) if d == "pidata"));
	}
}
