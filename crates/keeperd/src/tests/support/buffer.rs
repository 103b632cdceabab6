//! In-memory writer shared between a bridge and its test.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Cloneable byte sink whose contents can be inspected after writing.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Non-empty lines written so far.
    pub(crate) fn lines(&self) -> Vec<String> {
        let bytes = self.bytes.lock().expect("buffer mutex poisoned");
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .expect("buffer mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
