use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;

/// Smallest capacity a pooled buffer ever has (one page).
pub const MIN_FLOOR: usize = 4096;

/// Default number of idle buffers kept around.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Reusable byte buffers for continuous streaming.
///
/// Buffers are handed out as `PooledBuffer` guards which go back to the pool
/// when released or dropped, whatever path the owning task takes.
///
/// # Invariants
/// - A buffer is removed from the free list before it is handed out, so two
///   live guards never share one
/// - Acquired buffers are empty and have at least `floor` bytes of capacity
/// - At most `max_idle` buffers are retained; extras are freed on release
#[derive(Debug)]
pub struct ChunkPool {
	free: Mutex<Vec<BytesMut>>,
	floor: usize,
	max_idle: usize,
	allocated: AtomicUsize,
	reused: AtomicUsize,
}

impl ChunkPool {
	/// Creates a pool whose buffers hold at least `floor` bytes.
	///
	/// `floor` is raised to `MIN_FLOOR` if smaller.
	pub fn new(floor: usize, max_idle: usize) -> Self {
		Self {
			free: Mutex::new(Vec::new()),
			floor: floor.max(MIN_FLOOR),
			max_idle,
			allocated: AtomicUsize::new(0),
			reused: AtomicUsize::new(0),
		}
	}

	/// Takes an empty buffer out of the pool, allocating one if none is idle.
	///
	/// Content left by the previous owner is cleared here, not on release.
	/// Reserving the floor also lets `BytesMut` reclaim an allocation whose
	/// frozen chunks have all been dropped since.
	pub fn acquire(&self) -> PooledBuffer<'_> {
		let recycled = self.free.lock().pop();
		let buf = match recycled {
			Some(mut buf) => {
				self.reused.fetch_add(1, Ordering::Relaxed);
				buf.clear();
				buf.reserve(self.floor);
				buf
			}
			None => {
				self.allocated.fetch_add(1, Ordering::Relaxed);
				BytesMut::with_capacity(self.floor)
			}
		};
		PooledBuffer { buf, pool: self }
	}

	fn put_back(&self, buf: BytesMut) {
		let mut free = self.free.lock();
		if free.len() < self.max_idle {
			free.push(buf);
		}
	}

	/// Capacity floor of every acquired buffer.
	pub fn floor(&self) -> usize {
		self.floor
	}

	/// Number of buffers currently idle in the pool.
	pub fn idle(&self) -> usize {
		self.free.lock().len()
	}

	/// Buffers allocated fresh since creation.
	pub fn allocated(&self) -> usize {
		self.allocated.load(Ordering::Relaxed)
	}

	/// Acquisitions served from the free list since creation.
	pub fn reused(&self) -> usize {
		self.reused.load(Ordering::Relaxed)
	}
}

impl Default for ChunkPool {
	fn default() -> Self {
		Self::new(MIN_FLOOR, DEFAULT_MAX_IDLE)
	}
}

/// Exclusive handle on a pooled buffer.
///
/// Derefs to `BytesMut`. Returned to its pool on `release` or drop.
#[derive(Debug)]
pub struct PooledBuffer<'a> {
	buf: BytesMut,
	pool: &'a ChunkPool,
}

impl PooledBuffer<'_> {
	/// Hands the buffer back to the pool.
	///
	/// Same as dropping the guard; spelled out where the release point matters.
	pub fn release(self) {}
}

impl Deref for PooledBuffer<'_> {
	type Target = BytesMut;

	fn deref(&self) -> &BytesMut {
		&self.buf
	}
}

impl DerefMut for PooledBuffer<'_> {
	fn deref_mut(&mut self) -> &mut BytesMut {
		&mut self.buf
	}
}

impl Drop for PooledBuffer<'_> {
	fn drop(&mut self) {
		// An empty `BytesMut` does not allocate
		let buf = std::mem::take(&mut self.buf);
		self.pool.put_back(buf);
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;
	use std::sync::Arc;
	use std::thread;

	use super::*;

	#[test]
	fn acquire_returns_empty_buffer_above_floor() {
		let pool = ChunkPool::new(4096, 8);
		let buf = pool.acquire();
		assert_eq!(buf.len(), 0);
		assert!(buf.capacity() >= 4096);
	}

	#[test]
	fn floor_is_clamped() {
		let pool = ChunkPool::new(16, 8);
		assert_eq!(pool.floor(), MIN_FLOOR);
		assert!(pool.acquire().capacity() >= MIN_FLOOR);
	}

	#[test]
	fn release_then_acquire_reuses_and_clears() {
		let pool = ChunkPool::new(8192, 8);
		let mut buf = pool.acquire();
		buf.extend_from_slice(b"left over content");
		buf.release();
		assert_eq!(pool.idle(), 1);

		let buf = pool.acquire();
		assert_eq!(buf.len(), 0);
		assert!(buf.capacity() >= 8192);
		assert_eq!(pool.allocated(), 1);
		assert_eq!(pool.reused(), 1);
	}

	#[test]
	fn split_chunks_do_not_shrink_the_floor() {
		let pool = ChunkPool::new(4096, 8);
		let mut buf = pool.acquire();
		buf.extend_from_slice(&[b'x'; 4000]);
		let chunk = buf.split().freeze();
		drop(buf);
		assert_eq!(chunk.len(), 4000);

		let buf = pool.acquire();
		assert_eq!(buf.len(), 0);
		assert!(buf.capacity() >= 4096);
	}

	#[test]
	fn idle_buffers_are_capped() {
		let pool = ChunkPool::new(4096, 2);
		let guards: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
		drop(guards);
		assert_eq!(pool.idle(), 2);
	}

	#[test]
	fn concurrent_owners_never_share_a_buffer() {
		let pool = Arc::new(ChunkPool::new(4096, 64));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let pool = Arc::clone(&pool);
				thread::spawn(move || {
					for round in 0..1000u32 {
						let mut buf = pool.acquire();
						assert!(buf.is_empty());
						buf.extend_from_slice(&round.to_le_bytes());
						assert_eq!(&buf[..], &round.to_le_bytes());
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		let held: Vec<_> = (0..16).map(|_| pool.acquire()).collect();
		let distinct: HashSet<*const u8> = held.iter().map(|b| b.as_ptr()).collect();
		assert_eq!(distinct.len(), held.len());
	}
}
