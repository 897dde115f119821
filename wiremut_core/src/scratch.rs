use std::fmt;
use thiserror::Error;

/// The two operations a mutator instance performs, each with its own buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Fuzz,
    PostProcess,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Fuzz => "fuzz",
            Phase::PostProcess => "post_process",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScratchError {
    /// Growing the buffer failed. The buffer keeps its previous capacity.
    #[error("{phase} scratch buffer could not grow to {requested} bytes")]
    AllocationFailed { phase: Phase, requested: usize },
}

/// A grow-only byte arena reused across calls of one [`Phase`].
///
/// The whole capacity region is initialised: newly grown bytes are zeroed
/// once, reused bytes keep whatever the previous call left there. Only the
/// first [`ScratchBuffer::len`] bytes are meaningful.
#[derive(Debug)]
pub struct ScratchBuffer {
    phase: Phase,
    storage: Vec<u8>,
    len: usize,
}

impl ScratchBuffer {
    /// Creates an empty buffer. Nothing is allocated until the first
    /// [`ScratchBuffer::ensure_capacity`].
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            storage: Vec::new(),
            len: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Usable bytes without growing.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grows the buffer to hold at least `min_bytes`. Never shrinks.
    ///
    /// Growth rounds up to the next power of two to amortise reallocation,
    /// falling back to the exact request if the rounded size cannot be had.
    pub fn ensure_capacity(&mut self, min_bytes: usize) -> Result<(), ScratchError> {
        let current = self.storage.len();
        if current >= min_bytes {
            return Ok(());
        }

        let rounded = min_bytes.checked_next_power_of_two().unwrap_or(min_bytes);
        let target = if self.storage.try_reserve_exact(rounded - current).is_ok() {
            rounded
        } else {
            self.storage
                .try_reserve_exact(min_bytes - current)
                .map_err(|_| ScratchError::AllocationFailed {
                    phase: self.phase,
                    requested: min_bytes,
                })?;
            min_bytes
        };
        self.storage.resize(target, 0);
        Ok(())
    }

    /// The whole capacity region, for writing.
    pub fn region_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Marks the first `len` bytes as the buffer's content.
    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.storage.len());
        self.len = len.min(self.storage.len());
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }
}
