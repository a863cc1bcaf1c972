/*!
# Document-level parsing

This module contains the parser which turns the token stream of the
[`Lexer`](crate::Lexer) into document [`Event`]s, as well as the glue
traits connecting the two ([`TokenRead`], [`TokenSource`], [`Parse`]).
*/
mod common;
mod document;

pub use common::{EventMetrics, Parse, Standalone, TokenRead, TokenSource, XmlVersion};
pub use document::{
	Attribute, Element, Event, Parser, ProcessingInstruction, XmlDeclaration,
};
