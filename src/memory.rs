//! Executable code region and the runtime pair heap

use crate::consts::DEFAULT_HEAP_WORDS;
use crate::value::Word;

use tracing::debug;

use std::{mem, ptr, slice};

/// Entry signature of a compiled unit: heap base in `rdi`, tagged word
/// out in `rax`.
pub type EntryFn = unsafe extern "sysv64" fn(*mut u8) -> Word;

/// Protection state of the code region.
///
/// The region transitions `Writable` → `Executable` exactly once, before
/// invocation; writing after the flip is a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Mapped read-write; the emitter may write and patch bytes.
    Writable,
    /// Mapped read-execute; the region may be invoked, never written.
    Executable,
}

/// A fixed-capacity region of page-aligned memory the emitter writes
/// machine code into.
pub struct ExecBuffer {
    address: *mut u8,
    capacity: usize,
    state: BufferState,
}

impl ExecBuffer {
    /// Reserve `capacity` bytes of read-write anonymous private memory.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "code region capacity must be non-zero");

        // Safety: anonymous private mapping, no file descriptor, no
        // required address.
        let address = unsafe {
            libc::mmap(
                ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        assert!(address != libc::MAP_FAILED, "mmap refused the code region");

        Self {
            address: address as *mut u8,
            capacity,
            state: BufferState::Writable,
        }
    }

    /// Current protection state.
    pub const fn state(&self) -> BufferState {
        self.state
    }

    /// Capacity of the region, in bytes.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write one byte at `pos`.
    pub fn at_put(&mut self, pos: usize, byte: u8) {
        assert!(
            matches!(self.state, BufferState::Writable),
            "write into executable region"
        );
        assert!(pos < self.capacity, "write past code region capacity");

        // Safety: `pos` is in bounds and the mapping is writable.
        unsafe { self.address.add(pos).write(byte) }
    }

    /// Flip the region read-write → read-execute. One-way.
    pub fn make_executable(&mut self) {
        assert!(
            matches!(self.state, BufferState::Writable),
            "region is already executable"
        );

        // Safety: the pointer and length come from the original mapping.
        let result = unsafe {
            libc::mprotect(
                self.address as *mut libc::c_void,
                self.capacity,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        assert!(result == 0, "mprotect refused the protection flip");

        self.state = BufferState::Executable;
        debug!("code region flipped to executable");
    }

    /// View of the first `len` bytes of the region.
    pub fn code(&self, len: usize) -> &[u8] {
        assert!(len <= self.capacity, "code view past region capacity");

        // Safety: the mapping stays readable in both states and `len`
        // is in bounds.
        unsafe { slice::from_raw_parts(self.address, len) }
    }

    /// Reinterpret the region base as the compiled entry point.
    ///
    /// # Safety
    ///
    /// The region must hold a complete compiled unit: an entry that
    /// follows the `sysv64` convention, returns with `ret`, and touches
    /// the heap only within the bounds its caller provides.
    pub unsafe fn as_entry(&self) -> EntryFn {
        assert!(
            matches!(self.state, BufferState::Executable),
            "region invoked before the protection flip"
        );

        mem::transmute::<*mut u8, EntryFn>(self.address)
    }
}

impl Drop for ExecBuffer {
    fn drop(&mut self) {
        // Safety: the pointer and length come from the original mapping;
        // the region is never unmapped twice.
        unsafe {
            libc::munmap(self.address as *mut libc::c_void, self.capacity);
        }
    }
}

/// The caller-owned allocation region compiled code bumps `rsi` through.
///
/// Pairs occupy two consecutive words at an 8-aligned address. The
/// emitted code carries no bounds check, so the region must hold two
/// words for every `cons` the executed path performs.
pub struct Heap {
    words: Vec<Word>,
}

impl Heap {
    /// Allocate a zeroed region of `words` machine words.
    pub fn with_words(words: usize) -> Self {
        Self {
            words: vec![0; words],
        }
    }

    /// Base address handed to the compiled entry.
    pub fn base_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr() as *mut u8
    }

    /// Word at `index`, for assertions over allocated cells.
    pub fn word(&self, index: usize) -> Word {
        self.words[index]
    }

    /// Size of the region, in words.
    pub fn len_words(&self) -> usize {
        self.words.len()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::with_words(DEFAULT_HEAP_WORDS)
    }
}
