/*!
# Streaming XML 1.0 reading and writing

This crate provides incremental, pull-based parsing and encoding of XML 1.0
documents, aimed at embedded and other resource-constrained environments: no
DOM is built, the caller feeds bytes in arbitrary portions and pulls typed
events out (StAX style), and every layer can suspend at any byte boundary
and resume when more data arrives.

## Features

* Streamed parsing (the reader emits a subset of SAX-like events)
* Streamed encoding
* Reader can be driven push- and pull-based
* Bounded memory use (token length limit, optionally bounded input buffer)
* UTF-8 only; a leading byte order mark is consumed silently
* No DTD content, no external entities, no namespace processing (qualified
  names are surfaced verbatim)

## Example

```
use estax::EventRead;
let doc = b"<?xml version='1.0'?><hello>World!</hello>";
let mut fr = estax::FeedReader::new();
fr.feed(&doc[..]);
fr.feed_eof();
let result = fr.read_all_eof(|ev| {
	println!("got event: {:?}", ev);
});
// true indicates eof
assert_eq!(result.unwrap(), true);
```

## High-level usage

### Push-based usage

The [`FeedReader`] allows to push bits of XML into the parser as they
arrive in the application and process the resulting [`Event`]s as they
happen. When the buffered data is insufficient for the next event, reading
returns a [`std::io::ErrorKind::WouldBlock`] I/O error; feed more data and
retry.

### Pull-based usage

If the reader should block while waiting for more data to arrive, a
[`PullReader`] can be used instead. The `PullReader` requires a source
which implements [`io::BufRead`].

### Writing

The [`writer::Encoder`] drives the inverse direction: a document
construction state machine which serializes [`writer::Item`]s into a byte
buffer and refuses to produce output which would not reparse.
*/
#[allow(unused_imports)]
use std::io;

mod bufq;
mod driver;
mod errctx;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod strings;
pub mod writer;


#[doc(inline)]
pub use bufq::BufferQueue;
#[doc(inline)]
pub use driver::{
	as_eof_flag, BlockingDriver, EventRead, FeedDriver, FeedReader, PullReader,
};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use lexer::{Lexer, LexerOptions, Quote};
#[doc(inline)]
pub use parser::{
	Attribute, Element, Event, EventMetrics, Parse, Parser, ProcessingInstruction, Standalone,
	XmlDeclaration, XmlVersion,
};
pub use strings::{CData, CDataStr, Name, NameStr};

/// Package version
pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
