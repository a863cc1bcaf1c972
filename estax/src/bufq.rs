use std::borrow::Cow;
use std::collections::VecDeque;
use std::io;

pub const ERR_NODATA: &'static str = "no data in buffer";

/**
# Zero-copy buffered reader over a queue of byte chunks.

The BufferQueue is the input buffer of the reader: the caller appends chunks
of bytes with [`BufferQueue::push()`] and the lexer consumes them through the
[`std::io::BufRead`] and [`std::io::Read`] implementations. Chunk memory is
released as soon as a chunk has been consumed completely; reads are cut
short at chunk boundaries but never cross them.

Running dry is reported as a [`std::io::ErrorKind::WouldBlock`] I/O error —
the "need more data" signal of the reader — until [`BufferQueue::push_eof()`]
declares the input complete.

A queue constructed with [`BufferQueue::with_capacity()`] additionally
enforces an upper bound on the unread bytes it holds: [`push()`] then only
accepts as many bytes as fit and reports that count, the way a fixed-size
embedded input buffer would.

   [`push()`]: BufferQueue::push()

## Example

```
use std::io::{Read, ErrorKind};
use estax::BufferQueue;
let mut bq = BufferQueue::new();
let mut out = [0; 8];
bq.push(&b"ab"[..]);
bq.push(&b"cdef"[..]);
// reads stop at chunk boundaries
assert_eq!(bq.read(&mut out).unwrap(), 2);
assert_eq!(bq.read(&mut out).unwrap(), 4);
// drained + no eof marker -> WouldBlock
assert_eq!(bq.read(&mut out).err().unwrap().kind(), ErrorKind::WouldBlock);
// drained + eof marker -> clean zero-length read
bq.push_eof();
assert_eq!(bq.read(&mut out).unwrap(), 0);
```
*/
pub struct BufferQueue<'x> {
	chunks: VecDeque<Cow<'x, [u8]>>,
	/// bytes of the front chunk which have been consumed already
	consumed: usize,
	/// total unread bytes across all chunks
	remaining: usize,
	limit: Option<usize>,
	closed: bool,
}

fn starved() -> io::Error {
	io::Error::new(io::ErrorKind::WouldBlock, ERR_NODATA)
}

impl<'x> BufferQueue<'x> {
	/// Create a new, empty buffer queue without a capacity bound.
	pub fn new() -> BufferQueue<'x> {
		BufferQueue {
			chunks: VecDeque::new(),
			consumed: 0,
			remaining: 0,
			limit: None,
			closed: false,
		}
	}

	/// Create a new, empty buffer queue which will never hold more than
	/// `capacity` unread bytes.
	pub fn with_capacity(capacity: usize) -> BufferQueue<'x> {
		BufferQueue {
			chunks: VecDeque::new(),
			consumed: 0,
			remaining: 0,
			limit: Some(capacity),
			closed: false,
		}
	}

	/// Append a chunk of bytes to the queue.
	///
	/// Accepts anything which converts into a `[u8]` Cow; borrowed chunks
	/// are not copied.
	///
	/// Returns the number of bytes accepted. Without a capacity bound that
	/// is the full chunk length; with one, the chunk is cut down to the
	/// remaining room first.
	///
	/// # Panics
	///
	/// If [`BufferQueue::push_eof`] has been called.
	pub fn push<'a: 'x, T: Into<Cow<'a, [u8]>>>(&mut self, chunk: T) -> usize {
		assert!(!self.closed, "cannot push behind eof");
		let mut chunk = chunk.into();
		if let Some(limit) = self.limit {
			let room = limit.saturating_sub(self.remaining);
			if chunk.len() > room {
				match chunk {
					Cow::Borrowed(ref mut b) => {
						let full: &[u8] = *b;
						*b = &full[..room];
					}
					Cow::Owned(ref mut v) => v.truncate(room),
				}
			}
		}
		let accepted = chunk.len();
		if accepted > 0 {
			self.remaining = self
				.remaining
				.checked_add(accepted)
				.expect("length overflow");
			self.chunks.push_back(chunk);
		}
		accepted
	}

	/// Number of bytes which have been enqueued, but not read yet.
	///
	/// Partially consumed chunks count with their unread remainder only,
	/// even though their full memory is held until the chunk is done.
	pub fn len(&self) -> usize {
		self.remaining
	}

	/// The capacity bound, if any.
	pub fn capacity(&self) -> Option<usize> {
		self.limit
	}

	/// Declare the input complete.
	///
	/// No further chunks may be pushed afterwards. Once the queue is then
	/// drained, readers see a clean end-of-file instead of `WouldBlock`.
	pub fn push_eof(&mut self) {
		self.closed = true;
	}

	/// Return whether the end-of-file marker has been pushed to the queue
	/// already.
	///
	/// [`BufferQueue::push()`] will panic if this function returns true.
	pub fn eof_pushed(&self) -> bool {
		self.closed
	}

	/// Drop all buffered contents immediately
	///
	/// This will effectively reset the length to 0 and cause all future
	/// reads to return either WouldBlock (if [`push_eof`] has not been
	/// called yet) or eof.
	///
	///    [`push_eof`]: BufferQueue::push_eof()
	pub fn clear(&mut self) {
		self.chunks.clear();
		self.consumed = 0;
		self.remaining = 0;
	}

	/// Unread remainder of the front chunk, if there is one.
	fn front_remainder(&self) -> Option<&[u8]> {
		self.chunks.front().map(|chunk| &chunk[self.consumed..])
	}

	/// Book `amt` consumed bytes against the front chunk, releasing it
	/// once it is done.
	fn book_consumed(&mut self, amt: usize) {
		self.consumed += amt;
		self.remaining -= amt;
		let front_done = match self.chunks.front() {
			Some(chunk) => self.consumed == chunk.len(),
			None => false,
		};
		if front_done {
			self.chunks.pop_front();
			self.consumed = 0;
		}
	}
}

impl io::Read for BufferQueue<'_> {
	/// Read from the buffer queue.
	///
	/// At most the unread remainder of the front chunk is returned, so
	/// short reads are routine and say nothing about an impending
	/// end-of-file (which is within the [`std::io::Read`] contract).
	///
	/// An empty queue reads as zero bytes after
	/// [`BufferQueue::push_eof()`], and as a
	/// [`std::io::ErrorKind::WouldBlock`] error before.
	fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
		let n = match self.front_remainder() {
			Some(avail) => {
				let n = avail.len().min(dst.len());
				dst[..n].copy_from_slice(&avail[..n]);
				n
			}
			None if self.closed => return Ok(0),
			None => return Err(starved()),
		};
		self.book_consumed(n);
		Ok(n)
	}
}

impl io::BufRead for BufferQueue<'_> {
	/// Return the unread remainder of the front chunk.
	///
	/// Data never crosses chunk boundaries here, so even a one-byte buffer
	/// is no indicator for an impending end-of-file.
	///
	/// An empty queue yields an empty buffer after
	/// [`BufferQueue::push_eof()`], and a
	/// [`std::io::ErrorKind::WouldBlock`] error before.
	fn fill_buf(&mut self) -> io::Result<&[u8]> {
		match self.chunks.front() {
			Some(chunk) => Ok(&chunk[self.consumed..]),
			None if self.closed => Ok(&[]),
			None => Err(starved()),
		}
	}

	/// Skip forward by `amt` bytes
	///
	/// # Panics
	///
	/// If `amt` is larger than what `fill_buf()` would return.
	fn consume(&mut self, amt: usize) {
		if amt == 0 {
			return;
		}
		let available = self.front_remainder().map(<[u8]>::len).unwrap_or(0);
		if amt > available {
			panic!("consume past end of buffered data");
		}
		self.book_consumed(amt);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{BufRead, Read};

	fn filled(chunks: &[&'static [u8]]) -> BufferQueue<'static> {
		let mut bq = BufferQueue::new();
		for chunk in chunks {
			bq.push(*chunk);
		}
		bq
	}

	#[test]
	fn bufq_tracks_unread_length_across_pushes_and_reads() {
		let mut bq = BufferQueue::new();
		assert_eq!(bq.len(), 0);
		assert_eq!(bq.push(b"push".to_vec()), 4);
		assert_eq!(bq.push(b"pull".to_vec()), 4);
		assert_eq!(bq.len(), 8);
		let mut out = [0; 3];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 3);
		assert_eq!(bq.len(), 5);
	}

	#[test]
	fn bufq_read_stops_at_chunk_edges() {
		let mut bq = filled(&[b"one", b"four"]);
		let mut out = [0; 8];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 3);
		assert_eq!(&out[..3], b"one");
		assert_eq!(bq.read(&mut out[..]).unwrap(), 4);
		assert_eq!(&out[..4], b"four");
	}

	#[test]
	fn bufq_read_splits_large_chunks() {
		let mut bq = filled(&[b"abcdef"]);
		let mut out = [0; 4];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 4);
		assert_eq!(&out[..], b"abcd");
		assert_eq!(bq.read(&mut out[..]).unwrap(), 2);
		assert_eq!(&out[..2], b"ef");
	}

	#[test]
	fn bufq_drained_queue_blocks_without_eof_and_ends_with_it() {
		let mut bq = filled(&[b"xy"]);
		let mut out = [0; 4];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 2);
		assert_eq!(
			bq.read(&mut out[..]).err().unwrap().kind(),
			io::ErrorKind::WouldBlock
		);
		bq.push_eof();
		assert_eq!(bq.read(&mut out[..]).unwrap(), 0);
	}

	#[test]
	fn bufq_reports_eof_flag() {
		let mut bq = BufferQueue::new();
		assert!(!bq.eof_pushed());
		bq.push_eof();
		assert!(bq.eof_pushed());
	}

	#[test]
	#[should_panic(expected = "cannot push behind eof")]
	fn bufq_refuses_pushes_after_eof() {
		let mut bq = filled(&[b"xy"]);
		bq.push_eof();
		bq.push(&b"z"[..]);
	}

	#[test]
	fn bufq_accepts_new_chunks_after_depletion() {
		let mut bq = filled(&[b"ab"]);
		let mut out = [0; 4];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 2);
		assert_eq!(bq.len(), 0);
		bq.push(&b"cd"[..]);
		assert_eq!(bq.read(&mut out[..]).unwrap(), 2);
		assert_eq!(&out[..2], b"cd");
	}

	#[test]
	fn bufq_consume_advances_within_and_across_chunks() {
		let mut bq = filled(&[b"head", b"tail"]);
		bq.consume(2);
		assert_eq!(bq.len(), 6);
		assert_eq!(bq.fill_buf().unwrap(), b"ad");
		bq.consume(2);
		assert_eq!(bq.fill_buf().unwrap(), b"tail");
		bq.consume(4);
		assert_eq!(bq.len(), 0);
	}

	#[test]
	#[should_panic(expected = "consume past end of buffered data")]
	fn bufq_consume_across_a_chunk_edge_panics() {
		let mut bq = filled(&[b"ab", b"cd"]);
		bq.consume(3);
	}

	#[test]
	#[should_panic(expected = "consume past end of buffered data")]
	fn bufq_consume_on_an_empty_queue_panics() {
		let mut bq = BufferQueue::new();
		bq.consume(1);
	}

	#[test]
	fn bufq_zero_sized_consume_is_always_allowed() {
		let mut bq = BufferQueue::new();
		bq.consume(0);
		bq.push_eof();
		bq.consume(0);
	}

	#[test]
	fn bufq_fill_buf_peeks_without_consuming() {
		let mut bq = filled(&[b"peek"]);
		assert_eq!(bq.fill_buf().unwrap(), b"peek");
		assert_eq!(bq.fill_buf().unwrap(), b"peek");
		assert_eq!(bq.len(), 4);
	}

	#[test]
	fn bufq_fill_buf_reflects_queue_state_at_the_end() {
		let mut bq = filled(&[b"zz"]);
		bq.consume(2);
		assert_eq!(
			bq.fill_buf().err().unwrap().kind(),
			io::ErrorKind::WouldBlock
		);
		bq.push_eof();
		assert_eq!(bq.fill_buf().unwrap(), b"");
	}

	#[test]
	fn bufq_clear_discards_everything_buffered() {
		let mut bq = filled(&[b"junk"]);
		bq.clear();
		assert_eq!(bq.len(), 0);
		assert_eq!(
			bq.fill_buf().err().unwrap().kind(),
			io::ErrorKind::WouldBlock
		);
	}

	#[test]
	fn bufq_bounded_push_truncates_and_reports_accepted_bytes() {
		let mut bq = BufferQueue::with_capacity(4);
		assert_eq!(bq.push(b"one".to_vec()), 3);
		assert_eq!(bq.push(b"two".to_vec()), 1);
		assert_eq!(bq.push(b"three".to_vec()), 0);
		assert_eq!(bq.len(), 4);
		let mut out = [0; 4];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 3);
		assert_eq!(&out[..3], b"one");
		assert_eq!(bq.read(&mut out[..]).unwrap(), 1);
		assert_eq!(&out[..1], b"t");
	}

	#[test]
	fn bufq_bounded_capacity_is_freed_by_reads() {
		let mut bq = BufferQueue::with_capacity(4);
		assert_eq!(bq.push(b"full".to_vec()), 4);
		let mut out = [0; 4];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 4);
		assert_eq!(bq.push(b"more".to_vec()), 4);
	}

	#[test]
	fn bufq_bounded_push_of_borrowed_chunk_truncates() {
		let mut bq = BufferQueue::with_capacity(2);
		assert_eq!(bq.push(&b"borrowed"[..]), 2);
		let mut out = [0; 4];
		assert_eq!(bq.read(&mut out[..]).unwrap(), 2);
		assert_eq!(&out[..2], b"bo");
	}
}
