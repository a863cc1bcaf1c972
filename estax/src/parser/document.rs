/*!
# Document-level XML 1.0 parser
*/
use std::collections::VecDeque;
use std::fmt;

use crate::error::*;
use crate::lexer::{Quote, Token, TokenMetrics};
use crate::strings::{CData, Name};

use super::common::*;

/**
# The XML declaration

Collected from `<?xml version='1.0' encoding='...' standalone='...'?>`. The
attributes are only accepted in this order; `version` is mandatory, the
other two are optional (individually or together).
*/
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct XmlDeclaration {
	/// XML version number; only 1.0 is accepted.
	pub version: XmlVersion,
	/// Declared encoding name, if any.
	///
	/// The name is validated against the `EncName` production, but the
	/// reader itself always decodes UTF-8.
	pub encoding: Option<CData>,
	/// Declared standalone flag, if any.
	pub standalone: Option<Standalone>,
}

/**
# A processing instruction

The target is a Name whose lowercased form is never `xml` (that sequence
starts the XML declaration instead). The data is everything between the
whitespace after the target and the closing `?>`, with trailing whitespace
removed; it may be empty.
*/
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProcessingInstruction {
	pub target: Name,
	pub data: CData,
}

/// A single attribute of a start tag.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Attribute {
	pub name: Name,
	/// Attribute value with references expanded and whitespace normalized.
	pub value: CData,
	/// Which quotation mark surrounded the value.
	pub quote: Quote,
}

/// The payload of a [`Event::StartElement`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Element {
	pub name: Name,
	/// Attributes in document order. Names are checked for uniqueness
	/// during parsing.
	pub attributes: Vec<Attribute>,
	/// True for empty-element tags (`<foo/>`). An empty element does not
	/// produce a separate [`Event::EndElement`].
	pub empty: bool,
}

/**
# Logical XML document parts

The term *Event* is borrowed from SAX terminology. Each [`Event`] refers to
a logical bit of the XML document which has been parsed.

Each event has [`EventMetrics`] attached which give information about the
number of bytes from the input stream used to generate the event.

## Document event sequence

A well-formed document generates the following sequence of events:

1. Zero or one [`Self::XmlDeclaration`]
2. Zero or more [`Self::ProcessingInstruction`] / [`Self::Comment`],
   zero or one [`Self::DocumentType`] among them
3. One *element sequence*
4. [`Self::EndOfDocument`]
5. Zero or more [`Self::ProcessingInstruction`] / [`Self::Comment`]

An *element sequence* is either a single [`Self::StartElement`] with the
`empty` flag set, or a [`Self::StartElement`] followed by arbitrarily many
nested element sequences, [`Self::Text`], [`Self::CData`],
[`Self::Comment`] and [`Self::ProcessingInstruction`] events and one final
[`Self::EndElement`].
*/
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
	/// The XML declaration.
	XmlDeclaration(EventMetrics, XmlDeclaration),

	/// A processing instruction, either from the prolog, from element
	/// content or from the epilog.
	ProcessingInstruction(EventMetrics, ProcessingInstruction),

	/// The document type declaration, reduced to its name.
	DocumentType(EventMetrics, Name),

	/// A comment; the `<!--` and `-->` delimiters are not included.
	Comment(EventMetrics, CData),

	/// A start tag, including all of its attributes.
	///
	/// For empty-element tags (`<foo/>`) the `empty` flag is set and no
	/// matching [`Self::EndElement`] is generated.
	StartElement(EventMetrics, Element),

	/// An end tag. The name always equals the name of the matching start
	/// tag; mismatches are fatal errors.
	EndElement(EventMetrics, Name),

	/// Character data inside an element.
	///
	/// References are expanded, so that the text in the event exactly
	/// corresponds to the *logical* character data.
	///
	/// **Note:** Multiple consecutive `Text` events may be emitted for
	/// long sections of text or because of implementation details in the
	/// processing.
	Text(EventMetrics, CData),

	/// The contents of a CDATA section inside an element, taken verbatim.
	///
	/// **Note:** Multiple consecutive `CData` events may be emitted for
	/// very long sections.
	CData(EventMetrics, CData),

	/// The root element has been closed.
	///
	/// This event is emitted immediately after the event which closed the
	/// root element; processing instructions and comments may still follow
	/// in the epilog.
	EndOfDocument(EventMetrics),
}

impl Event {
	/// Return the [`EventMetrics`] of the event
	pub fn metrics(&self) -> &EventMetrics {
		match self {
			Self::XmlDeclaration(m, ..) => &m,
			Self::ProcessingInstruction(m, ..) => &m,
			Self::DocumentType(m, ..) => &m,
			Self::Comment(m, ..) => &m,
			Self::StartElement(m, ..) => &m,
			Self::EndElement(m, ..) => &m,
			Self::Text(m, ..) => &m,
			Self::CData(m, ..) => &m,
			Self::EndOfDocument(m) => &m,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum DeclSt {
	VersionName,
	VersionEq,
	VersionValue,
	EncodingName,
	EncodingEq,
	EncodingValue,
	StandaloneName,
	StandaloneEq,
	StandaloneValue,
	Close,
}

/// Prolog progress; this is the spine of the document-phase enforcement
/// before the root element.
#[derive(Clone, Copy, PartialEq, Debug)]
enum PrologSt {
	/// Nothing has been seen yet; the XML declaration is still allowed.
	AwaitXmlDecl,
	/// Something has been seen; the XML declaration is foreclosed, the
	/// document type declaration is still allowed.
	AwaitDoctype,
	/// The document type declaration has been seen; only the root element
	/// (and PIs/comments/whitespace) may follow.
	AwaitRoot,
}

impl PrologSt {
	/// The XML declaration is only permitted as the very first construct
	/// of the document; everything else permanently forecloses it.
	fn downgrade(self) -> PrologSt {
		match self {
			Self::AwaitXmlDecl => Self::AwaitDoctype,
			other => other,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum ElementSt {
	AttrName,
	AttrEq,
	AttrValue,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum DocSt {
	Element(ElementSt),
	Content,
	ElementFoot,
}

/// Where to continue after a processing instruction has been read.
#[derive(Clone, Copy, PartialEq, Debug)]
enum PiRet {
	Prolog(PrologSt),
	Content,
	Epilog,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum State {
	Prolog(PrologSt),
	Decl(DeclSt),
	Pi(PiRet),
	Document(DocSt),
	Epilog,
	Eof,
}

struct PendingElement {
	name: Name,
	attributes: Vec<Attribute>,
}

// XML 1.0 § 4.3.3 [81] EncName
fn validate_encoding_name(s: &str) -> bool {
	let mut bytes = s.as_bytes().iter();
	match bytes.next() {
		None => return false,
		Some(b) => {
			if !b.is_ascii_alphabetic() {
				return false;
			}
		}
	}
	for b in bytes {
		if !(b.is_ascii_alphanumeric() || *b == b'.' || *b == b'_' || *b == b'-') {
			return false;
		}
	}
	true
}

fn is_xml_whitespace_str(s: &str) -> bool {
	s.as_bytes()
		.iter()
		.all(|&c| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r')
}

fn trim_pi_data(data: CData) -> CData {
	let trimmed = data.trim_end_matches(&[' ', '\t', '\n', '\r'][..]);
	if trimmed.len() == data.len() {
		data
	} else {
		// SAFETY: a suffix-trimmed valid CData is still valid CData
		unsafe { CData::from_str_unchecked(trimmed) }
	}
}

/**
# Document reader state machine

The [`Parser`] converts [`crate::lexer::Token`]s into [`Event`]s.

It enforces the document structure (prolog, exactly one root element tree,
epilog), matches start and end tags against each other, assembles start tags
together with their full attribute lists and rejects duplicate attributes.

It is a low-level interface which expects to be driven from a [`TokenRead`]
source; the usual frontends are [`FeedReader`](crate::FeedReader) and
[`PullReader`](crate::PullReader).
*/
pub struct Parser {
	state: State,
	element_stack: Vec<Name>,
	pending_element: Option<PendingElement>,
	attribute_name: Option<Name>,
	pi_target: Option<Name>,
	decl_version: Option<XmlVersion>,
	decl_encoding: Option<CData>,
	decl_standalone: Option<Standalone>,
	/// end position of the last token processed in the event
	event_last_token_end: Option<usize>,
	/// current length of the event
	event_length: usize,
	/// Internal queue for events which will be returned from the current
	/// and potentially future calls to `parse()`.
	///
	/// In contrast to the lexer, the parser may come into situations where
	/// multiple events need to be pushed from a single token, which is why
	/// the queue exists as a buffer.
	eventq: VecDeque<Event>,
	err: Option<Box<Error>>,
}

impl Parser {
	/// Create a new parser
	pub fn new() -> Self {
		Self {
			state: State::Prolog(PrologSt::AwaitXmlDecl),
			element_stack: Vec::new(),
			pending_element: None,
			attribute_name: None,
			pi_target: None,
			decl_version: None,
			decl_encoding: None,
			decl_standalone: None,
			event_last_token_end: None,
			event_length: 0,
			eventq: VecDeque::new(),
			err: None,
		}
	}

	fn start_event(&mut self, tm: &TokenMetrics) {
		debug_assert!(self.event_last_token_end.is_none());
		self.event_last_token_end = Some(tm.end());
		self.event_length = tm.len();
	}

	fn account_token(&mut self, tm: &TokenMetrics) -> Result<usize> {
		let last_end = self.event_last_token_end.unwrap();
		self.event_length = self
			.event_length
			.checked_add(tm.len() + tm.start().saturating_sub(last_end))
			.ok_or_else(|| Error::NotWellFormed(WFError::InvalidSyntax("event too long")))?;
		self.event_last_token_end = Some(tm.end());
		Ok(self.event_length)
	}

	fn finish_event(&mut self) -> EventMetrics {
		debug_assert!(self.event_last_token_end.is_some());
		let len = self.event_length;
		self.event_last_token_end = None;
		self.event_length = 0;
		EventMetrics { len: len }
	}

	fn fixed_event(&self, len: usize) -> EventMetrics {
		debug_assert!(self.event_last_token_end.is_none());
		EventMetrics { len: len }
	}

	fn read_token<'r, R: TokenRead>(&mut self, r: &'r mut R) -> Result<Option<Token>> {
		if self.event_last_token_end.is_none() {
			return r.read();
		}
		match r.read()? {
			Some(tok) => {
				self.account_token(tok.metrics())?;
				Ok(Some(tok))
			}
			None => Ok(None),
		}
	}

	/// Emit an event into the event queue.
	fn emit_event(&mut self, ev: Event) -> () {
		self.eventq.push_back(ev);
	}

	/// Poison the parser, making it return the same error for all
	/// eternity.
	fn poison(&mut self, e: Error) -> () {
		self.err = Some(Box::new(e))
	}

	/// Check if the parser is poisoned and return the corresponding error.
	fn check_poison(&self) -> Result<()> {
		if let Some(e) = self.err.as_ref() {
			Err((**e).clone())
		} else {
			Ok(())
		}
	}

	/// Begin collecting the start tag which has just
	/// been opened.
	fn start_processing_element(&mut self, name: Name) {
		self.element_stack.push(name.clone());
		self.pending_element = Some(PendingElement {
			name: name,
			attributes: Vec::new(),
		});
	}

	/// Emit the assembled start tag; for empty-element tags this also
	/// unwinds the element stack.
	fn finish_element(&mut self, empty: bool) -> Result<State> {
		let sp = self.pending_element.take().unwrap();
		let em = self.finish_event();
		self.emit_event(Event::StartElement(
			em,
			Element {
				name: sp.name,
				attributes: sp.attributes,
				empty: empty,
			},
		));
		if empty {
			debug_assert!(self.element_stack.len() > 0);
			self.element_stack.pop();
			if self.element_stack.len() == 0 {
				self.emit_event(Event::EndOfDocument(self.fixed_event(0)));
				return Ok(State::Epilog);
			}
		}
		Ok(State::Document(DocSt::Content))
	}

	/// Prolog state.
	///
	/// See [`State::Prolog`].
	fn parse_prolog<'r, R: TokenRead>(&mut self, st: PrologSt, r: &'r mut R) -> Result<State> {
		match self.read_token(r)? {
			None => Err(Error::premature_end(ERRCTX_DOCBEGIN)),
			Some(Token::XMLDeclStart(tm)) => {
				if st != PrologSt::AwaitXmlDecl {
					return Err(Error::InvalidStructure(
						StructureError::XmlDeclarationMisplaced,
					));
				}
				self.start_event(&tm);
				self.decl_version = None;
				self.decl_encoding = None;
				self.decl_standalone = None;
				Ok(State::Decl(DeclSt::VersionName))
			}
			Some(Token::PIStart(tm, target)) => {
				self.start_event(&tm);
				self.pi_target = Some(target);
				Ok(State::Pi(PiRet::Prolog(st.downgrade())))
			}
			Some(Token::Comment(tm, text)) => {
				self.start_event(&tm);
				let em = self.finish_event();
				self.emit_event(Event::Comment(em, text));
				Ok(State::Prolog(st.downgrade()))
			}
			Some(Token::DocType(tm, name)) => match st {
				PrologSt::AwaitXmlDecl | PrologSt::AwaitDoctype => {
					self.start_event(&tm);
					let em = self.finish_event();
					self.emit_event(Event::DocumentType(em, name));
					Ok(State::Prolog(PrologSt::AwaitRoot))
				}
				PrologSt::AwaitRoot => {
					Err(Error::InvalidStructure(StructureError::DoctypeMisplaced))
				}
			},
			Some(Token::ElementHeadStart(tm, name)) => {
				self.start_event(&tm);
				self.start_processing_element(name);
				Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
			}
			Some(Token::Text(_, s)) => {
				if is_xml_whitespace_str(&s) {
					// whitespace in the prolog is insignificant; its only
					// effect is that the XML declaration is no longer
					// allowed
					Ok(State::Prolog(st.downgrade()))
				} else {
					Err(Error::NotWellFormed(WFError::UnexpectedToken(
						ERRCTX_DOCBEGIN,
						Token::NAME_TEXT,
						Some(&[
							Token::NAME_ELEMENTHEADSTART,
							Token::NAME_XMLDECLSTART,
							Token::NAME_PISTART,
							Token::NAME_COMMENT,
							Token::NAME_DOCTYPE,
						]),
					)))
				}
			}
			Some(Token::CData(..)) => Err(Error::InvalidStructure(
				StructureError::CDataOutsideElement,
			)),
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_DOCBEGIN,
				tok.name(),
				Some(&[
					Token::NAME_ELEMENTHEADSTART,
					Token::NAME_XMLDECLSTART,
					Token::NAME_PISTART,
					Token::NAME_COMMENT,
					Token::NAME_DOCTYPE,
				]),
			))),
		}
	}

	/// XML declaration state.
	///
	/// See [`State::Decl`].
	fn parse_decl<'r, R: TokenRead>(&mut self, state: DeclSt, r: &'r mut R) -> Result<State> {
		match self.read_token(r)? {
			None => Err(Error::premature_end(ERRCTX_XML_DECL)),
			Some(Token::Name(_, name)) => match state {
				// the pseudo-attributes have a fixed order: version first,
				// then optionally encoding, then optionally standalone
				DeclSt::VersionName => {
					if name == "version" {
						Ok(State::Decl(DeclSt::VersionEq))
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"XML declaration must begin with the version attribute",
						)))
					}
				}
				DeclSt::EncodingName => {
					if name == "encoding" {
						Ok(State::Decl(DeclSt::EncodingEq))
					} else if name == "standalone" {
						Ok(State::Decl(DeclSt::StandaloneEq))
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"after 'version' only 'encoding' or 'standalone' may follow",
						)))
					}
				}
				DeclSt::StandaloneName => {
					if name == "standalone" {
						Ok(State::Decl(DeclSt::StandaloneEq))
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"after 'encoding' only 'standalone' may follow",
						)))
					}
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_NAME,
					None,
				))),
			},
			Some(Token::Eq(_)) => {
				let next = match state {
					DeclSt::VersionEq => DeclSt::VersionValue,
					DeclSt::EncodingEq => DeclSt::EncodingValue,
					DeclSt::StandaloneEq => DeclSt::StandaloneValue,
					_ => {
						return Err(Error::NotWellFormed(WFError::UnexpectedToken(
							ERRCTX_XML_DECL,
							Token::NAME_EQ,
							None,
						)))
					}
				};
				Ok(State::Decl(next))
			}
			Some(Token::AttributeValue(_, v, _)) => match state {
				DeclSt::VersionValue => {
					if v == "1.0" {
						self.decl_version = Some(XmlVersion::V1_0);
						Ok(State::Decl(DeclSt::EncodingName))
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"only XML version 1.0 is supported",
						)))
					}
				}
				DeclSt::EncodingValue => {
					if validate_encoding_name(&v) {
						self.decl_encoding = Some(v);
						Ok(State::Decl(DeclSt::StandaloneName))
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"invalid encoding name",
						)))
					}
				}
				DeclSt::StandaloneValue => {
					self.decl_standalone = if v == "yes" {
						Some(Standalone::Yes)
					} else if v == "no" {
						Some(Standalone::No)
					} else {
						return Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"standalone must be 'yes' or 'no'",
						)));
					};
					Ok(State::Decl(DeclSt::Close))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_ATTRIBUTEVALUE,
					None,
				))),
			},
			Some(Token::XMLDeclEnd(_)) => match state {
				DeclSt::EncodingName | DeclSt::StandaloneName | DeclSt::Close => {
					let em = self.finish_event();
					let decl = XmlDeclaration {
						version: self.decl_version.take().unwrap(),
						encoding: self.decl_encoding.take(),
						standalone: self.decl_standalone.take(),
					};
					self.emit_event(Event::XmlDeclaration(em, decl));
					Ok(State::Prolog(PrologSt::AwaitDoctype))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_XMLDECLEND,
					None,
				))),
			},
			Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_XML_DECL,
				other.name(),
				None,
			))),
		}
	}

	/// Processing instruction state.
	///
	/// See [`State::Pi`].
	fn parse_pi<'r, R: TokenRead>(&mut self, ret: PiRet, r: &'r mut R) -> Result<State> {
		match self.read_token(r)? {
			None => Err(Error::premature_end(ERRCTX_PI)),
			Some(Token::PIEnd(_, data)) => {
				let em = self.finish_event();
				let pi = ProcessingInstruction {
					target: self.pi_target.take().unwrap(),
					data: trim_pi_data(data),
				};
				self.emit_event(Event::ProcessingInstruction(em, pi));
				Ok(match ret {
					PiRet::Prolog(st) => State::Prolog(st),
					PiRet::Content => State::Document(DocSt::Content),
					PiRet::Epilog => State::Epilog,
				})
			}
			Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_PI,
				other.name(),
				Some(&[Token::NAME_PIEND]),
			))),
		}
	}

	/// Element state
	///
	/// See [`DocSt::Element`].
	fn parse_element<'r, R: TokenRead>(&mut self, state: ElementSt, r: &'r mut R) -> Result<State> {
		match self.read_token(r)? {
			None => Err(Error::premature_end(ERRCTX_ELEMENT)),
			Some(Token::Name(_, name)) => match state {
				ElementSt::AttrName => {
					let sp = self.pending_element.as_ref().unwrap();
					if sp.attributes.iter().any(|a| a.name == name) {
						return Err(Error::NotWellFormed(WFError::DuplicateAttribute));
					}
					self.attribute_name = Some(name);
					Ok(State::Document(DocSt::Element(ElementSt::AttrEq)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_NAME,
					None,
				))),
			},
			Some(Token::Eq(_)) => match state {
				ElementSt::AttrEq => Ok(State::Document(DocSt::Element(ElementSt::AttrValue))),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_EQ,
					None,
				))),
			},
			Some(Token::AttributeValue(_, value, quote)) => match state {
				ElementSt::AttrValue => {
					let name = self.attribute_name.take().unwrap();
					let sp = self.pending_element.as_mut().unwrap();
					sp.attributes.push(Attribute {
						name: name,
						value: value,
						quote: quote,
					});
					Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ATTRIBUTEVALUE,
					None,
				))),
			},
			Some(Token::ElementHFEnd(_)) => match state {
				ElementSt::AttrName => self.finish_element(false),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ELEMENTHFEND,
					None,
				))),
			},
			Some(Token::ElementHeadClose(_)) => match state {
				ElementSt::AttrName => self.finish_element(true),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ELEMENTHEADCLOSE,
					None,
				))),
			},
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_ELEMENT,
				tok.name(),
				None,
			))),
		}
	}

	/// Document content state
	///
	/// See [`State::Document`].
	fn parse_document<'r, R: TokenRead>(&mut self, state: DocSt, r: &'r mut R) -> Result<State> {
		match state {
			DocSt::Element(substate) => self.parse_element(substate, r),
			DocSt::Content => match self.read_token(r)? {
				None => Err(Error::premature_end(ERRCTX_TEXT)),
				Some(Token::Text(tm, s)) => {
					self.start_event(&tm);
					let em = self.finish_event();
					self.emit_event(Event::Text(em, s));
					Ok(State::Document(DocSt::Content))
				}
				Some(Token::CData(tm, s)) => {
					self.start_event(&tm);
					let em = self.finish_event();
					self.emit_event(Event::CData(em, s));
					Ok(State::Document(DocSt::Content))
				}
				Some(Token::Comment(tm, text)) => {
					self.start_event(&tm);
					let em = self.finish_event();
					self.emit_event(Event::Comment(em, text));
					Ok(State::Document(DocSt::Content))
				}
				Some(Token::PIStart(tm, target)) => {
					self.start_event(&tm);
					self.pi_target = Some(target);
					Ok(State::Pi(PiRet::Content))
				}
				Some(Token::ElementHeadStart(tm, name)) => {
					self.start_event(&tm);
					self.start_processing_element(name);
					Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
				}
				Some(Token::ElementFootStart(tm, name)) => {
					self.start_event(&tm);
					if self.element_stack[self.element_stack.len() - 1] != name {
						Err(Error::NotWellFormed(WFError::ElementMismatch))
					} else {
						Ok(State::Document(DocSt::ElementFoot))
					}
				}
				Some(Token::DocType(..)) => {
					Err(Error::InvalidStructure(StructureError::DoctypeMisplaced))
				}
				Some(Token::XMLDeclStart(..)) => Err(Error::InvalidStructure(
					StructureError::XmlDeclarationMisplaced,
				)),
				Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_TEXT,
					tok.name(),
					Some(&[
						Token::NAME_TEXT,
						Token::NAME_CDATA,
						Token::NAME_ELEMENTHEADSTART,
						Token::NAME_ELEMENTFOOTSTART,
						Token::NAME_PISTART,
						Token::NAME_COMMENT,
					]),
				))),
			},
			DocSt::ElementFoot => match self.read_token(r)? {
				None => Err(Error::premature_end(ERRCTX_ELEMENT_FOOT)),
				Some(Token::ElementHFEnd(_)) => {
					let name = self.element_stack.pop().unwrap();
					let em = self.finish_event();
					self.emit_event(Event::EndElement(em, name));
					if self.element_stack.len() == 0 {
						self.emit_event(Event::EndOfDocument(self.fixed_event(0)));
						Ok(State::Epilog)
					} else {
						Ok(State::Document(DocSt::Content))
					}
				}
				Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT_FOOT,
					other.name(),
					Some(&[Token::NAME_ELEMENTHFEND]),
				))),
			},
		}
	}

	/// Epilog state.
	///
	/// See [`State::Epilog`].
	fn parse_epilog<'r, R: TokenRead>(&mut self, r: &'r mut R) -> Result<State> {
		match self.read_token(r)? {
			None => Ok(State::Eof),
			// whitespace after the root element is explicitly allowed
			Some(Token::Text(_, s)) if is_xml_whitespace_str(&s) => Ok(State::Epilog),
			Some(Token::PIStart(tm, target)) => {
				self.start_event(&tm);
				self.pi_target = Some(target);
				Ok(State::Pi(PiRet::Epilog))
			}
			Some(Token::Comment(tm, text)) => {
				self.start_event(&tm);
				let em = self.finish_event();
				self.emit_event(Event::Comment(em, text));
				Ok(State::Epilog)
			}
			Some(Token::XMLDeclStart(..)) => Err(Error::InvalidStructure(
				StructureError::XmlDeclarationMisplaced,
			)),
			Some(Token::DocType(..)) => {
				Err(Error::InvalidStructure(StructureError::DoctypeMisplaced))
			}
			Some(Token::CData(..)) => Err(Error::InvalidStructure(
				StructureError::CDataOutsideElement,
			)),
			Some(tok) => Err(Error::InvalidStructure(StructureError::ContentAfterRoot(
				tok.name(),
			))),
		}
	}
}

impl Parse for Parser {
	type Output = Event;

	fn parse<'r, R: TokenRead>(&mut self, r: &'r mut R) -> Result<Option<Self::Output>> {
		self.check_poison()?;
		loop {
			if self.eventq.len() > 0 {
				return Ok(Some(self.eventq.pop_front().unwrap()));
			}

			let result = match self.state {
				State::Prolog(st) => self.parse_prolog(st, r),
				State::Decl(substate) => self.parse_decl(substate, r),
				State::Pi(ret) => self.parse_pi(ret, r),
				State::Document(substate) => self.parse_document(substate, r),
				State::Epilog => self.parse_epilog(r),
				State::Eof => return Ok(None),
			};
			self.state = match result {
				Ok(st) => st,
				// pass through I/O errors without poisoning the parser
				Err(Error::IO(ioerr)) => return Err(Error::IO(ioerr)),
				// poison the parser for everything else to avoid emitting
				// illegal data
				Err(other) => {
					self.poison(other.clone());
					return Err(other);
				}
			};
		}
	}

	fn release_temporaries(&mut self) {
		self.eventq.shrink_to_fit();
		self.element_stack.shrink_to_fit();
	}
}

impl Default for Parser {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Parser {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Parser").field("state", &self.state).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::TokenMetrics;
	use std::convert::TryInto;
	use std::io;

	const DM: TokenMetrics = TokenMetrics::new(0, 0);

	struct TokenSliceReader<'x> {
		base: &'x [Token],
		offset: usize,
	}

	impl<'x> TokenSliceReader<'x> {
		fn new(src: &'x [Token]) -> TokenSliceReader<'x> {
			TokenSliceReader {
				base: src,
				offset: 0,
			}
		}
	}

	impl<'x> TokenRead for TokenSliceReader<'x> {
		fn read(&mut self) -> Result<Option<Token>> {
			match self.base.get(self.offset) {
				Some(x) => {
					self.offset += 1;
					Ok(Some(x.clone()))
				}
				None => Ok(None),
			}
		}
	}

	fn parse(src: &[Token]) -> (Vec<Event>, Result<()>) {
		let mut sink = Vec::new();
		let mut reader = TokenSliceReader::new(src);
		let mut parser = Parser::new();
		loop {
			match parser.parse(&mut reader) {
				Ok(Some(ev)) => sink.push(ev),
				Ok(None) => return (sink, Ok(())),
				Err(e) => return (sink, Err(e)),
			}
		}
	}

	fn parse_err(src: &[Token]) -> Option<Error> {
		let (_, r) = parse(src);
		r.err()
	}

	fn root_toks() -> Vec<Token> {
		vec![
			Token::ElementHeadStart(DM, "root".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::ElementFootStart(DM, "root".try_into().unwrap()),
			Token::ElementHFEnd(DM),
		]
	}

	#[test]
	fn parser_parse_xml_declaration_with_all_attributes() {
		let (evs, r) = parse(&[
			Token::XMLDeclStart(TokenMetrics::new(0, 5)),
			Token::Name(TokenMetrics::new(6, 13), "version".try_into().unwrap()),
			Token::Eq(TokenMetrics::new(13, 14)),
			Token::AttributeValue(
				TokenMetrics::new(14, 19),
				"1.0".try_into().unwrap(),
				Quote::Single,
			),
			Token::Name(TokenMetrics::new(20, 28), "encoding".try_into().unwrap()),
			Token::Eq(TokenMetrics::new(28, 29)),
			Token::AttributeValue(
				TokenMetrics::new(29, 36),
				"UTF-8".try_into().unwrap(),
				Quote::Single,
			),
			Token::Name(TokenMetrics::new(37, 47), "standalone".try_into().unwrap()),
			Token::Eq(TokenMetrics::new(47, 48)),
			Token::AttributeValue(
				TokenMetrics::new(48, 53),
				"yes".try_into().unwrap(),
				Quote::Single,
			),
			Token::XMLDeclEnd(TokenMetrics::new(54, 56)),
			Token::ElementHeadStart(TokenMetrics::new(56, 61), "root".try_into().unwrap()),
			Token::ElementHeadClose(TokenMetrics::new(61, 63)),
		]);
		r.unwrap();
		match &evs[0] {
			Event::XmlDeclaration(em, decl) => {
				assert_eq!(em.len(), 56);
				assert_eq!(decl.version, XmlVersion::V1_0);
				assert_eq!(decl.encoding.as_ref().unwrap(), "UTF-8");
				assert_eq!(decl.standalone, Some(Standalone::Yes));
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_parse_xml_declaration_version_only() {
		let mut toks = vec![
			Token::XMLDeclStart(DM),
			Token::Name(DM, "version".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1.0".try_into().unwrap(), Quote::Single),
			Token::XMLDeclEnd(DM),
		];
		toks.extend(root_toks());
		let (evs, r) = parse(&toks);
		r.unwrap();
		match &evs[0] {
			Event::XmlDeclaration(_, decl) => {
				assert_eq!(decl.version, XmlVersion::V1_0);
				assert!(decl.encoding.is_none());
				assert!(decl.standalone.is_none());
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_parse_xml_declaration_standalone_without_encoding() {
		let mut toks = vec![
			Token::XMLDeclStart(DM),
			Token::Name(DM, "version".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1.0".try_into().unwrap(), Quote::Single),
			Token::Name(DM, "standalone".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "no".try_into().unwrap(), Quote::Single),
			Token::XMLDeclEnd(DM),
		];
		toks.extend(root_toks());
		let (evs, r) = parse(&toks);
		r.unwrap();
		match &evs[0] {
			Event::XmlDeclaration(_, decl) => {
				assert!(decl.encoding.is_none());
				assert_eq!(decl.standalone, Some(Standalone::No));
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_rejects_unsupported_version() {
		let err = parse_err(&[
			Token::XMLDeclStart(DM),
			Token::Name(DM, "version".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1.1".try_into().unwrap(), Quote::Single),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::InvalidSyntax("only XML version 1.0 is supported"))
		));
	}

	#[test]
	fn parser_rejects_decl_without_version() {
		let err = parse_err(&[Token::XMLDeclStart(DM), Token::XMLDeclEnd(DM)]).unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::UnexpectedToken(_, Token::NAME_XMLDECLEND, _))
		));
	}

	#[test]
	fn parser_rejects_invalid_encoding_name() {
		let err = parse_err(&[
			Token::XMLDeclStart(DM),
			Token::Name(DM, "version".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1.0".try_into().unwrap(), Quote::Single),
			Token::Name(DM, "encoding".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "8bit ascii".try_into().unwrap(), Quote::Single),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::InvalidSyntax("invalid encoding name"))
		));
	}

	#[test]
	fn parser_rejects_bad_standalone_value() {
		let err = parse_err(&[
			Token::XMLDeclStart(DM),
			Token::Name(DM, "version".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1.0".try_into().unwrap(), Quote::Single),
			Token::Name(DM, "encoding".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "UTF-8".try_into().unwrap(), Quote::Single),
			Token::Name(DM, "standalone".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "maybe".try_into().unwrap(), Quote::Single),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::InvalidSyntax("standalone must be 'yes' or 'no'"))
		));
	}

	#[test]
	fn parser_parse_element_with_attributes_in_order() {
		let (evs, r) = parse(&[
			Token::ElementHeadStart(DM, "root".try_into().unwrap()),
			Token::Name(DM, "zeta".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1".try_into().unwrap(), Quote::Double),
			Token::Name(DM, "alpha".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "2".try_into().unwrap(), Quote::Single),
			Token::ElementHeadClose(DM),
		]);
		r.unwrap();
		match &evs[0] {
			Event::StartElement(_, el) => {
				assert_eq!(el.name, "root");
				assert!(el.empty);
				assert_eq!(el.attributes.len(), 2);
				assert_eq!(el.attributes[0].name, "zeta");
				assert_eq!(el.attributes[0].value, "1");
				assert_eq!(el.attributes[0].quote, Quote::Double);
				assert_eq!(el.attributes[1].name, "alpha");
				assert_eq!(el.attributes[1].value, "2");
				assert_eq!(el.attributes[1].quote, Quote::Single);
			}
			other => panic!("unexpected event: {:?}", other),
		}
		assert!(matches!(&evs[1], Event::EndOfDocument(_)));
	}

	#[test]
	fn parser_rejects_duplicate_attribute() {
		let err = parse_err(&[
			Token::ElementHeadStart(DM, "e".try_into().unwrap()),
			Token::Name(DM, "a".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1".try_into().unwrap(), Quote::Double),
			Token::Name(DM, "a".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "2".try_into().unwrap(), Quote::Double),
			Token::ElementHeadClose(DM),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::DuplicateAttribute)
		));
	}

	#[test]
	fn parser_parse_nested_elements_with_text() {
		let (evs, r) = parse(&[
			Token::ElementHeadStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::ElementHeadStart(DM, "a".try_into().unwrap()),
			Token::ElementHeadClose(DM),
			Token::ElementHeadStart(DM, "b".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::Text(DM, "x".try_into().unwrap()),
			Token::ElementFootStart(DM, "b".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::ElementFootStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
		]);
		r.unwrap();
		let mut iter = evs.iter();
		assert!(matches!(
			iter.next().unwrap(),
			Event::StartElement(_, el) if el.name == "r" && !el.empty
		));
		assert!(matches!(
			iter.next().unwrap(),
			Event::StartElement(_, el) if el.name == "a" && el.empty
		));
		assert!(matches!(
			iter.next().unwrap(),
			Event::StartElement(_, el) if el.name == "b" && !el.empty
		));
		assert!(matches!(iter.next().unwrap(), Event::Text(_, t) if t == "x"));
		assert!(matches!(iter.next().unwrap(), Event::EndElement(_, n) if n == "b"));
		assert!(matches!(iter.next().unwrap(), Event::EndElement(_, n) if n == "r"));
		assert!(matches!(iter.next().unwrap(), Event::EndOfDocument(_)));
		assert!(iter.next().is_none());
	}

	#[test]
	fn parser_rejects_mismatched_end_tag() {
		let err = parse_err(&[
			Token::ElementHeadStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::ElementFootStart(DM, "nonroot".try_into().unwrap()),
			Token::ElementHFEnd(DM),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::ElementMismatch)
		));
	}

	#[test]
	fn parser_parse_doctype_in_prolog() {
		let mut toks = vec![Token::DocType(DM, "root".try_into().unwrap())];
		toks.extend(root_toks());
		let (evs, r) = parse(&toks);
		r.unwrap();
		assert!(matches!(&evs[0], Event::DocumentType(_, n) if n == "root"));
	}

	#[test]
	fn parser_rejects_second_doctype() {
		let err = parse_err(&[
			Token::DocType(DM, "root".try_into().unwrap()),
			Token::DocType(DM, "root".try_into().unwrap()),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::DoctypeMisplaced)
		));
	}

	#[test]
	fn parser_rejects_doctype_inside_element() {
		let err = parse_err(&[
			Token::ElementHeadStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::DocType(DM, "root".try_into().unwrap()),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::DoctypeMisplaced)
		));
	}

	#[test]
	fn parser_rejects_xml_declaration_after_whitespace() {
		let err = parse_err(&[
			Token::Text(DM, "  ".try_into().unwrap()),
			Token::XMLDeclStart(DM),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::XmlDeclarationMisplaced)
		));
	}

	#[test]
	fn parser_rejects_xml_declaration_after_root() {
		let mut toks = root_toks();
		toks.push(Token::XMLDeclStart(DM));
		let (evs, r) = parse(&toks);
		assert!(matches!(
			r.err().unwrap(),
			Error::InvalidStructure(StructureError::XmlDeclarationMisplaced)
		));
		// the document itself was still parsed completely
		assert!(matches!(
			&evs[evs.len() - 1],
			Event::EndOfDocument(_)
		));
	}

	#[test]
	fn parser_parse_pi_in_prolog_and_trims_data() {
		let mut toks = vec![
			Token::PIStart(DM, "pitarget".try_into().unwrap()),
			Token::PIEnd(DM, "pidata   ".try_into().unwrap()),
		];
		toks.extend(root_toks());
		let (evs, r) = parse(&toks);
		r.unwrap();
		match &evs[0] {
			Event::ProcessingInstruction(_, pi) => {
				assert_eq!(pi.target, "pitarget");
				assert_eq!(pi.data, "pidata");
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_pi_forecloses_xml_declaration() {
		let err = parse_err(&[
			Token::PIStart(DM, "p".try_into().unwrap()),
			Token::PIEnd(DM, "".try_into().unwrap()),
			Token::XMLDeclStart(DM),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::XmlDeclarationMisplaced)
		));
	}

	#[test]
	fn parser_parse_pi_inside_element_content() {
		let (evs, r) = parse(&[
			Token::ElementHeadStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::PIStart(DM, "p".try_into().unwrap()),
			Token::PIEnd(DM, "d".try_into().unwrap()),
			Token::ElementFootStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
		]);
		r.unwrap();
		assert!(matches!(
			&evs[1],
			Event::ProcessingInstruction(_, pi) if pi.target == "p" && pi.data == "d"
		));
	}

	#[test]
	fn parser_rejects_cdata_outside_element() {
		let err = parse_err(&[Token::CData(DM, "x".try_into().unwrap())]).unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::CDataOutsideElement)
		));
	}

	#[test]
	fn parser_parse_cdata_inside_element() {
		let (evs, r) = parse(&[
			Token::ElementHeadStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
			Token::CData(DM, "<raw>".try_into().unwrap()),
			Token::ElementFootStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
		]);
		r.unwrap();
		assert!(matches!(&evs[1], Event::CData(_, t) if t == "<raw>"));
	}

	#[test]
	fn parser_skips_whitespace_in_prolog_and_epilog() {
		let mut toks = vec![Token::Text(DM, " \t\r\n".try_into().unwrap())];
		toks.extend(root_toks());
		toks.push(Token::Text(DM, "\n\r\t ".try_into().unwrap()));
		let (evs, r) = parse(&toks);
		r.unwrap();
		assert!(matches!(&evs[0], Event::StartElement(..)));
		assert!(!evs
			.iter()
			.any(|ev| matches!(ev, Event::Text(..))));
	}

	#[test]
	fn parser_rejects_text_in_prolog() {
		let err = parse_err(&[Token::Text(DM, "garbage".try_into().unwrap())]).unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::UnexpectedToken(_, Token::NAME_TEXT, _))
		));
	}

	#[test]
	fn parser_rejects_text_in_epilog() {
		let mut toks = root_toks();
		toks.push(Token::Text(DM, "trailing".try_into().unwrap()));
		let err = parse_err(&toks).unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::ContentAfterRoot(Token::NAME_TEXT))
		));
	}

	#[test]
	fn parser_rejects_second_root_element() {
		let mut toks = root_toks();
		toks.push(Token::ElementHeadStart(DM, "again".try_into().unwrap()));
		let err = parse_err(&toks).unwrap();
		assert!(matches!(
			err,
			Error::InvalidStructure(StructureError::ContentAfterRoot(_))
		));
	}

	#[test]
	fn parser_allows_pi_and_comment_in_epilog() {
		let mut toks = root_toks();
		toks.push(Token::Comment(DM, "bye".try_into().unwrap()));
		toks.push(Token::PIStart(DM, "p".try_into().unwrap()));
		toks.push(Token::PIEnd(DM, "".try_into().unwrap()));
		let (evs, r) = parse(&toks);
		r.unwrap();
		assert!(matches!(&evs[3], Event::Comment(_, t) if t == "bye"));
		assert!(matches!(&evs[4], Event::ProcessingInstruction(..)));
	}

	#[test]
	fn parser_emits_end_of_document_after_root() {
		let (evs, r) = parse(&root_toks());
		r.unwrap();
		assert!(matches!(&evs[0], Event::StartElement(..)));
		assert!(matches!(&evs[1], Event::EndElement(..)));
		assert!(matches!(&evs[2], Event::EndOfDocument(_)));
	}

	#[test]
	fn parser_repeats_error_after_first_encounter() {
		let toks = &[
			Token::ElementHeadStart(DM, "e".try_into().unwrap()),
			Token::Name(DM, "a".try_into().unwrap()),
			Token::Eq(DM),
			Token::AttributeValue(DM, "1".try_into().unwrap(), Quote::Double),
			Token::Name(DM, "a".try_into().unwrap()),
		];
		let mut reader = TokenSliceReader::new(toks);
		let mut parser = Parser::new();
		let e1 = loop {
			match parser.parse(&mut reader) {
				Ok(_) => continue,
				Err(e) => break e,
			}
		};
		let e2 = parser.parse(&mut reader).err().unwrap();
		assert_eq!(e1, e2);
	}

	#[test]
	fn parser_reports_eof_mid_document_as_error() {
		let err = parse_err(&[
			Token::ElementHeadStart(DM, "r".try_into().unwrap()),
			Token::ElementHFEnd(DM),
		])
		.unwrap();
		assert!(matches!(
			err,
			Error::NotWellFormed(WFError::InvalidEof(_))
		));
	}

	#[test]
	fn parser_forwards_metrics_for_element_events() {
		let (evs, r) = parse(&[
			Token::ElementHeadStart(TokenMetrics::new(0, 5), "root".try_into().unwrap()),
			Token::Name(TokenMetrics::new(6, 7), "a".try_into().unwrap()),
			Token::Eq(TokenMetrics::new(7, 8)),
			Token::AttributeValue(
				TokenMetrics::new(8, 11),
				"1".try_into().unwrap(),
				Quote::Double,
			),
			Token::ElementHFEnd(TokenMetrics::new(11, 12)),
			Token::Text(TokenMetrics::new(12, 17), "hello".try_into().unwrap()),
			Token::ElementFootStart(TokenMetrics::new(17, 23), "root".try_into().unwrap()),
			Token::ElementHFEnd(TokenMetrics::new(23, 24)),
		]);
		r.unwrap();
		let mut iter = evs.iter();
		match iter.next().unwrap() {
			Event::StartElement(em, ..) => assert_eq!(em.len(), 12),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			Event::Text(em, ..) => assert_eq!(em.len(), 5),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			Event::EndElement(em, ..) => assert_eq!(em.len(), 7),
			other => panic!("unexpected event: {:?}", other),
		}
		match iter.next().unwrap() {
			Event::EndOfDocument(em) => assert_eq!(em.len(), 0),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_recovers_from_wouldblock() {
		struct SometimesBlockingTokenSliceReader<'x> {
			base: &'x [Token],
			offset: usize,
			has_blocked: bool,
		}

		impl<'x> TokenRead for SometimesBlockingTokenSliceReader<'x> {
			fn read(&mut self) -> Result<Option<Token>> {
				if !self.has_blocked {
					self.has_blocked = true;
					return Err(Error::io(io::Error::new(
						io::ErrorKind::WouldBlock,
						"noise",
					)));
				}
				match self.base.get(self.offset) {
					Some(x) => {
						self.has_blocked = false;
						self.offset += 1;
						Ok(Some(x.clone()))
					}
					None => Ok(None),
				}
			}
		}

		let toks = root_toks();
		let mut reader = SometimesBlockingTokenSliceReader {
			base: &toks,
			offset: 0,
			has_blocked: false,
		};
		let mut parser = Parser::new();
		let mut evs = Vec::new();
		loop {
			match parser.parse(&mut reader) {
				Err(Error::IO(ioerr)) if ioerr.kind() == io::ErrorKind::WouldBlock => continue,
				Err(other) => panic!("unexpected error: {:?}", other),
				Ok(Some(ev)) => evs.push(ev),
				Ok(None) => break,
			}
		}
		assert_eq!(evs.len(), 3);
	}
}
