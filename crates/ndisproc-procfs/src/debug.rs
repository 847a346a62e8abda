//! Process-wide debug verbosity
//!
//! The level is set once at startup from configuration, may be changed
//! through the root `debug` entry, and is consulted by logging calls that
//! are too chatty for normal operation. An optional observer is told about
//! every accepted change.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::command::{bounded_str, parse_int};
use crate::error::ProcError;

type Observer = Box<dyn Fn(u32) + Send + Sync>;

pub struct DebugLevel {
    level: AtomicU32,
    max: u32,
    on_change: Option<Observer>,
}

impl fmt::Debug for DebugLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugLevel")
            .field("level", &self.get())
            .field("max", &self.max)
            .finish()
    }
}

impl DebugLevel {
    /// Initial level is clamped to `[0, max]`
    pub fn new(level: u32, max: u32) -> Self {
        Self {
            level: AtomicU32::new(level.min(max)),
            max,
            on_change: None,
        }
    }

    pub fn with_observer(mut self, observer: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Box::new(observer));
        self
    }

    pub fn get(&self) -> u32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Whether messages at verbosity `n` should be emitted
    pub fn enabled(&self, n: u32) -> bool {
        self.get() >= n
    }

    pub fn set(&self, level: u32) -> Result<(), ProcError> {
        if level > self.max {
            return Err(ProcError::OutOfRange {
                command: "debug",
                value: i64::from(level),
            });
        }
        self.level.store(level, Ordering::Relaxed);
        if let Some(observer) = &self.on_change {
            observer(level);
        }
        Ok(())
    }

    /// Contents of the `debug` entry
    pub fn render(&self) -> String {
        format!("{}\n", self.get())
    }

    /// Handle a write to the `debug` entry, returning bytes consumed
    pub fn write(&self, input: &[u8]) -> Result<usize, ProcError> {
        let text = bounded_str(input)?;
        let value = parse_int(text);
        if value < 0 || value > i64::from(self.max) {
            return Err(ProcError::OutOfRange {
                command: "debug",
                value,
            });
        }
        self.set(value as u32)?;
        Ok(input.len())
    }
}

impl Default for DebugLevel {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_initial_level_clamped() {
        let level = DebugLevel::new(9, 3);
        assert_eq!(level.get(), 3);
        assert_eq!(level.render(), "3\n");
    }

    #[test]
    fn test_write_accepts_range() {
        let level = DebugLevel::new(0, 3);
        assert_eq!(level.write(b"2\n"), Ok(2));
        assert_eq!(level.get(), 2);
        assert!(level.enabled(1));
        assert!(!level.enabled(3));
    }

    #[test]
    fn test_write_rejects_out_of_range() {
        let level = DebugLevel::new(1, 3);
        assert!(level.write(b"4").is_err());
        assert!(level.write(b"-1").is_err());
        assert!(level.write(&[b'1'; 33]).is_err());
        assert_eq!(level.get(), 1);
    }

    #[test]
    fn test_junk_parses_as_zero() {
        let level = DebugLevel::new(2, 3);
        assert_eq!(level.write(b"loud"), Ok(4));
        assert_eq!(level.get(), 0);
    }

    #[test]
    fn test_observer_sees_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let level = DebugLevel::new(0, 3).with_observer(move |n| sink.lock().unwrap().push(n));
        level.write(b"3").unwrap();
        let _ = level.write(b"7");
        level.set(1).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![3, 1]);
    }
}
