//! Freelist of fixed 64 KiB I/O buffers (spec.md §3, §4.1).
//!
//! Grounded on the teacher's own `Slab<T>` freelist allocator (`slab.rs`):
//! same "pop the head, else allocate fresh" shape, rebuilt on safe,
//! heap-boxed arrays instead of a hand-rolled `alloc::heap` buffer. The pool
//! lives on `Core` and is only ever touched from the runner thread (§5), so
//! no internal locking is needed.

pub const BUF_SIZE: usize = 65536;

pub type Buf = Box<[u8; BUF_SIZE]>;

#[derive(Debug, Default)]
pub struct BufferPool {
    free: Vec<Buf>,
}

impl BufferPool {
    pub fn new() -> BufferPool {
        BufferPool { free: Vec::new() }
    }

    /// Pops a buffer off the freelist, allocating a fresh zeroed one if
    /// empty. Contents are not otherwise cleared between uses (spec.md
    /// §4.1: "no contents zeroing").
    pub fn get(&mut self) -> Buf {
        self.free.pop().unwrap_or_else(|| Box::new([0u8; BUF_SIZE]))
    }

    /// Returns a buffer to the head of the freelist.
    pub fn put(&mut self, buf: Buf) {
        self.free.push(buf);
    }

    /// Number of buffers currently idle, for diagnostics/tests only.
    pub fn idle_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let mut pool = BufferPool::new();
        let a = pool.get();
        pool.put(a);
        assert_eq!(pool.idle_count(), 1);
        let _b = pool.get();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn allocates_fresh_when_empty() {
        let mut pool = BufferPool::new();
        let buf = pool.get();
        assert_eq!(buf.len(), BUF_SIZE);
    }
}
