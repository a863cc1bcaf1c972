//! Byte range tables for the delimited accumulation states of the lexer.
//!
//! Each table selects the bytes which may be accumulated verbatim in the
//! respective state; everything else is a delimiter which the state machine
//! inspects individually. Bytes >= 0x80 are accepted liberally, precise
//! codepoint validation happens when the token buffer is flushed.

use estax_validation::selectors::ByteRange;

/// Valid bytes for character data minus delimiters (XML 1.0 § 2.4 \[14\])
///
/// The following bytes are excluded:
///
/// - `'\r'`, because that gets folded into a line feed (`\n`) on input
/// - `'&'`, because that may start an entity or character reference
/// - `'<'`, because that may start an element, comment, PI or CDATA section
/// - `']'`, because the sequence `]]>` is not allowed verbatimly in
///   character data
pub static CLASS_XML_TEXT_DELIMITED_BYTE: &'static [ByteRange] = &[
	ByteRange(0x09, 0x0a),
	// excluding CR as that gets folded to LF
	ByteRange(0x20, 0x25), // excludes &
	ByteRange(0x27, 0x3b), // excludes <
	ByteRange(0x3d, 0x5c), // excludes ]
	ByteRange(0x5e, 0xff),
];

/// Valid bytes inside a CDATA section, minus `']'` and CR (XML 1.0 § 2.7)
pub static CLASS_XML_CDATA_SECTION_DELIMITED_BYTE: &'static [ByteRange] = &[
	ByteRange(0x09, 0x0a),
	ByteRange(0x20, 0x5c), // excludes ]
	ByteRange(0x5e, 0xff),
];

// XML 1.0 § 2.3 [10] AttValue; tab/LF/CR are normalized and handled as
// delimiters
pub static CLASS_XML_ATT_QUOT_DELIMITED_BYTE: &'static [ByteRange] = &[
	ByteRange(0x20, 0x21), // excludes "
	ByteRange(0x23, 0x25), // excludes &
	ByteRange(0x27, 0x3b), // excludes <
	ByteRange(0x3d, 0xff),
];

// XML 1.0 § 2.3 [10] AttValue with apostrophe delimiter
pub static CLASS_XML_ATT_APOS_DELIMITED_BYTE: &'static [ByteRange] = &[
	ByteRange(0x20, 0x25), // excludes &, '
	ByteRange(0x28, 0x3b), // excludes <
	ByteRange(0x3d, 0xff),
];

/// Valid bytes of processing instruction data, minus `'?'` and CR
/// (XML 1.0 § 2.6)
pub static CLASS_XML_PI_DELIMITED_BYTE: &'static [ByteRange] = &[
	ByteRange(0x09, 0x0a),
	ByteRange(0x20, 0x3e), // excludes ?
	ByteRange(0x40, 0xff),
];

/// Valid bytes of comment text, minus `'-'` and CR (XML 1.0 § 2.5)
pub static CLASS_XML_COMMENT_DELIMITED_BYTE: &'static [ByteRange] = &[
	ByteRange(0x09, 0x0a),
	ByteRange(0x20, 0x2c), // excludes -
	ByteRange(0x2e, 0xff),
];

/// Bytes accepted (and discarded) between the document type name and the
/// closing `'>'`; excludes `'['` which would start an internal subset.
pub static CLASS_XML_DOCTYPE_TRAILING_BYTE: &'static [ByteRange] = &[
	ByteRange(0x09, 0x0a),
	ByteRange(0x0d, 0x0d),
	ByteRange(0x20, 0x3d), // excludes >
	ByteRange(0x3f, 0x5a), // excludes [
	ByteRange(0x5c, 0xff),
];

/// Everything but `'<'`; used by the resynchronization option to discard
/// bytes until a document boundary.
pub static CLASS_XML_SYNC_SKIP_BYTE: &'static [ByteRange] =
	&[ByteRange(0x00, 0x3b), ByteRange(0x3d, 0xff)];

/// Valid XML decimal digit bytes (for character references)
pub static CLASS_XML_DECIMAL_DIGIT_BYTE: &'static [ByteRange] = &[ByteRange(b'0', b'9')];

/// Valid XML hexadecimal digit bytes (for character references)
pub static CLASS_XML_HEXADECIMAL_DIGIT_BYTE: &'static [ByteRange] = &[
	ByteRange(b'0', b'9'),
	ByteRange(b'A', b'F'),
	ByteRange(b'a', b'f'),
];
