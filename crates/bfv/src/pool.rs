//! Memory pool handles for scratch allocations.

use crate::errors::{Error, Result};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// A cloneable handle over a recycling buffer arena. Every operation of the
/// [`crate::Encryptor`], [`crate::Decryptor`] and [`crate::Evaluator`] draws
/// its scratch buffers from a pool; callers that operate concurrently pass a
/// thread-local pool to each call instead of sharing the default one.
///
/// A handle may deliberately be left uninitialized, in which case every
/// operation given it fails with [`Error::NoPool`].
#[derive(Debug, Clone)]
pub struct MemoryPool {
    inner: Option<Arc<Mutex<Vec<Vec<u64>>>>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    /// Create an initialized pool.
    pub fn new() -> Self {
        Self {
            inner: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Create a handle that is not backed by an arena.
    pub fn uninitialized() -> Self {
        Self { inner: None }
    }

    /// Whether the handle is backed by an arena.
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Fetch a zeroed buffer of `len` words from the arena.
    pub fn allocate(&self, len: usize) -> Result<PoolBuffer> {
        let arena = self.inner.as_ref().ok_or(Error::NoPool)?;
        let mut data = arena
            .lock()
            .expect("pool mutex is never poisoned")
            .pop()
            .unwrap_or_default();
        data.clear();
        data.resize(len, 0);
        Ok(PoolBuffer {
            data,
            home: Arc::clone(arena),
        })
    }
}

/// A scratch buffer borrowed from a [`MemoryPool`]; returns its storage to
/// the arena when dropped.
#[derive(Debug)]
pub struct PoolBuffer {
    data: Vec<u64>,
    home: Arc<Mutex<Vec<Vec<u64>>>>,
}

impl Deref for PoolBuffer {
    type Target = [u64];

    fn deref(&self) -> &[u64] {
        &self.data
    }
}

impl DerefMut for PoolBuffer {
    fn deref_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if let Ok(mut arena) = self.home.lock() {
            arena.push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryPool;
    use crate::errors::Error;

    #[test]
    fn test_allocate() {
        let pool = MemoryPool::new();
        {
            let mut buf = pool.allocate(16).unwrap();
            assert_eq!(buf.len(), 16);
            assert!(buf.iter().all(|x| *x == 0));
            buf[3] = 99;
        }
        // The recycled buffer comes back zeroed.
        let buf = pool.allocate(16).unwrap();
        assert!(buf.iter().all(|x| *x == 0));
    }

    #[test]
    fn test_uninitialized() {
        let pool = MemoryPool::uninitialized();
        assert!(!pool.is_initialized());
        assert_eq!(pool.allocate(8).err(), Some(Error::NoPool));
    }
}
