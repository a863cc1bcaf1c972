use estax_validation::selectors::ByteSelect;

/// Why a scan over the input window stopped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ScanEnd {
	/// The window was exhausted.
	Eof,
	/// The byte budget ran out before a delimiter appeared.
	Limit,
	/// A byte outside the selected class was found (and consumed).
	Delimiter(u8),
}

/// Move bytes matched by `selector` from the front of `src` into `into`,
/// copying at most `limit` of them.
///
/// The window is advanced past everything that was inspected; a terminating
/// delimiter is consumed and reported instead of copied. A delimiter sitting
/// exactly on the budget boundary still counts as a delimiter, not as
/// [`ScanEnd::Limit`].
pub fn copy_selected<B: ByteSelect>(
	src: &mut &[u8],
	selector: &B,
	limit: usize,
	into: &mut Vec<u8>,
) -> ScanEnd {
	let budget = src.len().min(limit);
	let mut taken = 0;
	while taken < budget && selector.select(src[taken]) {
		taken += 1;
	}
	into.extend_from_slice(&src[..taken]);
	if taken == src.len() {
		*src = &[];
		return ScanEnd::Eof;
	}
	let b = src[taken];
	if selector.select(b) {
		*src = &src[taken..];
		ScanEnd::Limit
	} else {
		*src = &src[taken + 1..];
		ScanEnd::Delimiter(b)
	}
}

/// Advance `src` past bytes matched by `selector` without copying them.
///
/// Returns how many bytes were skipped, plus the delimiter which stopped the
/// scan (`None` when the window ran out first).
pub fn skip_selected<B: ByteSelect>(src: &mut &[u8], selector: &B) -> (usize, Option<u8>) {
	let mut n = 0;
	while n < src.len() && selector.select(src[n]) {
		n += 1;
	}
	if n == src.len() {
		*src = &[];
		(n, None)
	} else {
		let b = src[n];
		*src = &src[n + 1..];
		(n, Some(b))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use estax_validation::selectors::AnyByte;

	#[test]
	fn copy_selected_stops_at_budget() {
		let mut window = &b"abcdefgh"[..];
		let mut sink = Vec::new();
		assert_eq!(
			copy_selected(&mut window, &AnyByte(), 5, &mut sink),
			ScanEnd::Limit
		);
		assert_eq!(sink, b"abcde");
		assert_eq!(window, b"fgh");
	}

	#[test]
	fn copy_selected_is_byte_oriented_not_utf8_aware() {
		let mut window = &"grün!".as_bytes()[..];
		let mut sink = Vec::new();
		assert_eq!(
			copy_selected(&mut window, &AnyByte(), 3, &mut sink),
			ScanEnd::Limit
		);
		// the ü got cut in half, which is fine at this layer
		assert_eq!(sink, b"gr\xc3");
		assert_eq!(window, b"\xbcn!");
	}

	#[test]
	fn copy_selected_drains_the_window() {
		let mut window = &b"abcdefgh"[..];
		let mut sink = Vec::new();
		assert_eq!(
			copy_selected(&mut window, &AnyByte(), 64, &mut sink),
			ScanEnd::Eof
		);
		assert_eq!(sink, b"abcdefgh");
		assert!(window.is_empty());
	}

	#[test]
	fn copy_selected_consumes_and_reports_the_delimiter() {
		let mut window = &b"aaab_cc"[..];
		let mut sink = Vec::new();
		match copy_selected(&mut window, &b'a', 64, &mut sink) {
			ScanEnd::Delimiter(b'b') => (),
			other => panic!("unexpected scan end: {:?}", other),
		}
		assert_eq!(sink, b"aaa");
		assert_eq!(window, b"_cc");
	}

	#[test]
	fn copy_selected_prefers_delimiter_over_limit_at_the_boundary() {
		let mut window = &b"aaX"[..];
		let mut sink = Vec::new();
		match copy_selected(&mut window, &b'a', 2, &mut sink) {
			ScanEnd::Delimiter(b'X') => (),
			other => panic!("unexpected scan end: {:?}", other),
		}
		assert!(window.is_empty());
	}

	#[test]
	fn skip_selected_reports_eof_and_count() {
		let mut window = &b"      "[..];
		let (n, delim) = skip_selected(&mut window, &b' ');
		assert_eq!(n, 6);
		assert_eq!(delim, None);
		assert!(window.is_empty());
	}

	#[test]
	fn skip_selected_consumes_the_delimiter() {
		let mut window = &b"   <r/>"[..];
		let (n, delim) = skip_selected(&mut window, &b' ');
		assert_eq!(n, 3);
		assert_eq!(delim, Some(b'<'));
		assert_eq!(window, b"r/>");
	}
}
