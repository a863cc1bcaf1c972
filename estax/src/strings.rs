/*!
# Strongly-typed strings for use with XML 1.0 documents

This module defines string- and str-like types which represent pieces of
text as they may occur in XML documents. These types are checked to contain
only text which conforms to the respective grammar in the XML specification.

This allows to carry information about the checking which already took place
in the lexer to the application, avoiding the need to execute checks multiple
times.

## Type Overview

- [`Name`] and [`NameStr`] represent the `Name` production and are used for
  element names, attribute names, processing instruction targets and the
  document type name. Qualified names are carried verbatim; no namespace
  processing takes place in this crate.
- [`CData`] and [`CDataStr`] represent strings of XML `Char`s, which are
  slightly more restrictive than Rust `char`. They are used for attribute
  values, text nodes, CDATA section contents, comments and processing
  instruction data.

  Note that [`CData`] strings obtained from the reader do not contain
  references; those are expanded by the lexer.

## Construction

Owned values are constructed using the [`std::convert::TryInto`] mechanism,
from other string types. Supported source types are:

* [`String`]
* [`smartstring::alias::String`]
* [`str`]

In addition, a [`Name`] can be converted into [`CData`] through `.into()`
without extra checking (and likewise for the Str types); the inverse
direction is only available through `try_into`.
*/

use std::borrow::{Borrow, Cow, ToOwned};
use std::cmp::{Ordering, PartialOrd};
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::ops::Deref;

use smartstring::alias::String as SmartString;

use estax_validation::{
	validate_cdata as raw_validate_cdata, validate_name as raw_validate_name,
};

use crate::error::Error;

macro_rules! estax_unsafe_str_construct_doc {
	($name:ident, $other:ident) => {
		concat!(
			"Construct a `",
			stringify!($name),
			"` without enforcing anything\n",
			"\n",
			"# Safety\n",
			"\n",
			"The caller is responsible for ensuring that the passed [`",
			stringify!($other),
			"`] is in fact a valid `",
			stringify!($name),
			"`.\n",
		)
	};
}

macro_rules! estax_safe_str_construct_doc {
	($name:ident, $other:ident) => {
		concat!(
			"Converts a [`",
			stringify!($other),
			"`] to a `",
			stringify!($name),
			"`.\n",
			"\n",
			"If the given `",
			stringify!($other),
			"` does not conform to the restrictions imposed by `",
			stringify!($name),
			"`, an error is returned.\n",
		)
	};
}

macro_rules! estax_string_type {
	(
		$(#[$outer:meta])*
		pub struct $name:ident(SmartString) use $check:ident => $borrowed:ident;
	) => {
		$(#[$outer])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord)]
		#[repr(transparent)]
		pub struct $name(SmartString);

		impl $name {
			/// Extract the inner string and return it.
			pub fn into_inner(self) -> SmartString {
				self.0
			}

			/// Obtain a reference to the inner string slice.
			pub fn as_str(&self) -> &str {
				self.0.as_str()
			}

			#[doc = estax_unsafe_str_construct_doc!($name, str)]
			pub unsafe fn from_str_unchecked<T: AsRef<str>>(s: T) -> Self {
				Self(s.as_ref().into())
			}

			#[doc = estax_unsafe_str_construct_doc!($name, SmartString)]
			pub unsafe fn from_smartstring_unchecked<T: Into<SmartString>>(s: T) -> Self {
				Self(s.into())
			}
		}

		impl Deref for $name {
			type Target = $borrowed;

			fn deref(&self) -> &Self::Target {
				// SAFETY: $borrowed is guarded by the same check; this is
				// enforced by using the pair macro.
				unsafe { $borrowed::from_str_unchecked(&self.0) }
			}
		}

		impl Borrow<$borrowed> for $name {
			fn borrow(&self) -> &$borrowed {
				self.deref()
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}

		impl AsRef<$borrowed> for $name {
			fn as_ref(&self) -> &$borrowed {
				self.deref()
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				&self.0 == other
			}
		}

		impl PartialEq<$name> for str {
			fn eq(&self, other: &$name) -> bool {
				other.0 == self
			}
		}

		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				&self.0 == *other
			}
		}

		impl PartialEq<$name> for &str {
			fn eq(&self, other: &$name) -> bool {
				other.0 == *self
			}
		}

		impl PartialEq<$borrowed> for $name {
			fn eq(&self, other: &$borrowed) -> bool {
				self.0 == other.0
			}
		}

		impl PartialEq<$name> for $borrowed {
			fn eq(&self, other: &$name) -> bool {
				other.0 == self.0
			}
		}

		impl PartialOrd<$name> for $name {
			fn partial_cmp(&self, other: &$name) -> Option<Ordering> {
				self.0.partial_cmp(&other.0)
			}
		}

		impl From<$name> for String {
			fn from(other: $name) -> Self {
				other.0.into()
			}
		}

		impl From<$name> for SmartString {
			fn from(other: $name) -> Self {
				other.0
			}
		}

		impl<'x> From<$name> for Cow<'x, $borrowed> {
			fn from(other: $name) -> Self {
				Self::Owned(other)
			}
		}

		impl<'x> From<Cow<'x, $borrowed>> for $name {
			fn from(other: Cow<'x, $borrowed>) -> Self {
				other.into_owned()
			}
		}

		impl TryFrom<SmartString> for $name {
			type Error = Error;

			#[doc = estax_safe_str_construct_doc!($name, SmartString)]
			fn try_from(other: SmartString) -> Result<Self, Self::Error> {
				$check(&other)?;
				Ok($name(other))
			}
		}

		impl TryFrom<String> for $name {
			type Error = Error;

			#[doc = estax_safe_str_construct_doc!($name, String)]
			fn try_from(other: String) -> Result<Self, Self::Error> {
				$check(&other)?;
				Ok($name(other.into()))
			}
		}

		impl TryFrom<&str> for $name {
			type Error = Error;

			#[doc = estax_safe_str_construct_doc!($name, str)]
			fn try_from(other: &str) -> Result<Self, Self::Error> {
				$check(other)?;
				Ok($name(other.into()))
			}
		}

		impl fmt::Display for $name {
			fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
				f.write_str(&self.0 as &str)
			}
		}
	};
}

macro_rules! estax_str_type {
	(
		$(#[$outer:meta])*
		pub struct $name:ident(str) use $check:ident => $owned:ident;
	) => {
		$(#[$outer])*
		#[derive(Debug, Hash, PartialEq, Eq, Ord)]
		#[repr(transparent)]
		pub struct $name(str);

		impl $name {
			#[doc = estax_safe_str_construct_doc!($name, str)]
			pub fn from_str<'x>(s: &'x str) -> Result<&'x Self, Error> {
				s.try_into()
			}

			#[doc = estax_unsafe_str_construct_doc!($name, str)]
			pub unsafe fn from_str_unchecked<'x>(s: &'x str) -> &'x Self {
				std::mem::transmute(s)
			}
		}

		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				&self.0 == other
			}
		}

		impl PartialEq<$name> for str {
			fn eq(&self, other: &$name) -> bool {
				self == &other.0
			}
		}

		impl PartialOrd<$name> for $name {
			fn partial_cmp(&self, other: &$name) -> Option<Ordering> {
				self.0.partial_cmp(&other.0)
			}
		}

		impl ToOwned for $name {
			type Owned = $owned;

			fn to_owned(&self) -> Self::Owned {
				self.into()
			}
		}

		impl From<&$name> for $owned {
			fn from(other: &$name) -> Self {
				// SAFETY: $owned is guarded by the same check; this is
				// enforced by using the pair macro.
				unsafe { $owned::from_str_unchecked(&other.0) }
			}
		}

		impl<'x> TryFrom<&'x str> for &'x $name {
			type Error = Error;

			fn try_from(other: &'x str) -> Result<Self, Self::Error> {
				$check(other)?;
				// SAFETY: the content check is executed right above and we
				// are transmuting &str into a repr(transparent) of &str.
				Ok(unsafe { std::mem::transmute::<&'x str, &'x $name>(other) })
			}
		}

		impl fmt::Display for $name {
			fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
				f.write_str(&self.0)
			}
		}
	};
}

macro_rules! estax_string_type_pair {
	(
		$(#[$ownedmeta:meta])*
		pub struct $owned:ident(SmartString) use $check:ident;

		$(#[$borrowedmeta:meta])*
		pub struct $borrowed:ident(str);
	) => {
		estax_string_type! {
			$(#[$ownedmeta])*
			pub struct $owned(SmartString) use $check => $borrowed;
		}

		estax_str_type! {
			$(#[$borrowedmeta])*
			pub struct $borrowed(str) use $check => $owned;
		}
	};
}

estax_string_type_pair! {
	/// String which conforms to the Name production of XML 1.0.
	///
	/// [`Name`] corresponds to a (restricted) [`String`]. For a [`str`]-like
	/// type with the same restrictions, see [`NameStr`].
	///
	/// Since [`Name`] (indirectly) derefs to [`str`], all (non-mutable)
	/// methods from [`str`] are available.
	///
	/// # Formal definition
	///
	/// The data inside [`Name`] (and [`NameStr`]) is guaranteed to conform
	/// to the `Name` production of the below grammar, quoted from
	/// [XML 1.0 § 2.3](https://www.w3.org/TR/REC-xml/#NT-NameStartChar):
	///
	/// ```text
	/// [4]  NameStartChar ::= ":" | [A-Z] | "_" | [a-z] | [#xC0-#xD6]
	///                        | [#xD8-#xF6] | [#xF8-#x2FF] | [#x370-#x37D]
	///                        | [#x37F-#x1FFF] | [#x200C-#x200D]
	///                        | [#x2070-#x218F] | [#x2C00-#x2FEF]
	///                        | [#x3001-#xD7FF] | [#xF900-#xFDCF]
	///                        | [#xFDF0-#xFFFD] | [#x10000-#xEFFFF]
	/// [4a] NameChar      ::= NameStartChar | "-" | "." | [0-9] | #xB7
	///                        | [#x0300-#x036F] | [#x203F-#x2040]
	/// [5]  Name          ::= NameStartChar (NameChar)*
	/// ```
	pub struct Name(SmartString) use raw_validate_name;

	/// str which conforms to the Name production of XML 1.0.
	///
	/// [`NameStr`] corresponds to a (restricted) [`str`]. For a
	/// [`String`]-like type with the same restrictions as well as the formal
	/// definition of those restrictions, see [`Name`].
	///
	/// Since [`NameStr`] derefs to [`str`], all (non-mutable) methods from
	/// [`str`] are available.
	pub struct NameStr(str);
}

estax_string_type_pair! {
	/// String which consists only of XML 1.0 Chars.
	///
	/// [`CData`] corresponds to a (restricted) [`String`]. For a
	/// [`str`]-like type with the same restrictions, see [`CDataStr`].
	///
	/// Since [`CData`] (indirectly) derefs to [`str`], all (non-mutable)
	/// methods from [`str`] are available.
	///
	/// # Formal definition
	///
	/// The data inside [`CData`] (and [`CDataStr`]) is guaranteed to conform
	/// to the `Char` production of the below grammar, quoted from
	/// [XML 1.0 § 2.2](https://www.w3.org/TR/REC-xml/#NT-Char):
	///
	/// ```text
	/// [2] Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD]
	///              | [#x10000-#x10FFFF]
	/// ```
	pub struct CData(SmartString) use raw_validate_cdata;

	/// str which consists only of XML 1.0 Chars.
	///
	/// [`CDataStr`] corresponds to a (restricted) [`str`]. For a
	/// [`String`]-like type with the same restrictions as well as the formal
	/// definition of those restrictions, see [`CData`].
	///
	/// Since [`CDataStr`] derefs to [`str`], all (non-mutable) methods from
	/// [`str`] are available.
	pub struct CDataStr(str);
}

impl Name {
	/// Convert the [`Name`] into a [`CData`].
	///
	/// This operation is O(1); every Name consists only of valid XML Chars.
	pub fn as_cdata(self) -> CData {
		// SAFETY: Name chars are a strict subset of XML Chars.
		unsafe { CData::from_smartstring_unchecked(self.0) }
	}
}

impl From<Name> for CData {
	fn from(other: Name) -> Self {
		other.as_cdata()
	}
}

impl NameStr {
	/// Create an owned copy of the string as [`Name`].
	///
	/// This operation is also available as implementation of the `Into`
	/// trait.
	pub fn to_name(&self) -> Name {
		self.into()
	}

	/// Access the string as [`CDataStr`].
	///
	/// This operation is O(1); every Name consists only of valid XML Chars.
	pub fn as_cdatastr<'x>(&'x self) -> &'x CDataStr {
		// SAFETY: Name chars are a strict subset of XML Chars.
		unsafe { CDataStr::from_str_unchecked(&self.0) }
	}
}

impl<'x> From<&'x NameStr> for &'x CDataStr {
	fn from(other: &'x NameStr) -> Self {
		other.as_cdatastr()
	}
}

impl CDataStr {
	/// Create an owned copy of the string as [`CData`].
	///
	/// This operation is also available as implementation of the `Into`
	/// trait.
	pub fn to_cdata(&self) -> CData {
		self.into()
	}
}
