//! A growable byte buffer with independent read and write cursors.
//!
//! This is the primitive every stream in the engine is built from: the raw
//! script bytes, the bytes queued to go out to the shell, the bytes read
//! back from it, and the expected-output bytes parsed out of the script.
//! Everything is a cursor advance; nothing is ever copied except when the
//! buffer itself must grow or compact to make room.

/// Buffers below this size are never allocated; the first reservation
/// always grows to at least this many bytes.
const INITIAL_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct ByteQueue {
    buf: Vec<u8>,
    read: usize,
    write: usize,
}

impl ByteQueue {
    pub fn new() -> Self {
        ByteQueue {
            buf: Vec::new(),
            read: 0,
            write: 0,
        }
    }

    /// Returns the full contiguous writable run, at least `n` bytes long,
    /// compacting and then growing the backing buffer as needed. The buffer
    /// grows by doubling (starting from `INITIAL_CAPACITY`) until the
    /// request fits. Callers (a syscall read into this region, say) may use
    /// as much or as little of the returned slice as they like; `commit_write`
    /// only advances by however much was actually filled.
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        let tail = self.buf.len() - self.write;
        if tail < n {
            if self.read > 0 {
                self.buf.drain(0..self.read);
                self.write -= self.read;
                self.read = 0;
            }
            let tail = self.buf.len() - self.write;
            if tail < n {
                let mut new_len = self.buf.len().max(INITIAL_CAPACITY);
                while new_len - self.write < n {
                    new_len *= 2;
                }
                self.buf.resize(new_len, 0);
            }
        }
        &mut self.buf[self.write..]
    }

    pub fn commit_write(&mut self, n: usize) {
        self.write += n;
        debug_assert!(self.write <= self.buf.len());
    }

    pub fn commit_read(&mut self, n: usize) {
        self.read += n;
        debug_assert!(self.read <= self.write);
    }

    /// The currently readable span, `[read, write)`.
    pub fn readable(&self) -> &[u8] {
        &self.buf[self.read..self.write]
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    pub fn len(&self) -> usize {
        self.write - self.read
    }

    /// Resets both cursors to the start, retaining the allocation.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Rewinds `write` by `n` bytes, e.g. to strip a just-detected marker.
    pub fn erase_tail(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.write -= n;
    }

    pub fn append(&mut self, bytes: &[u8]) {
        let dst = self.reserve(bytes.len());
        dst[..bytes.len()].copy_from_slice(bytes);
        self.commit_write(bytes.len());
    }
}
