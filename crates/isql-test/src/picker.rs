//! A deterministic [`ReplicaPicker`] for routing tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use isql_db::ReplicaPicker;

/// Returns a fixed sequence of indices, cycling when it runs out.
///
/// Script entries are returned as-is, so they must be below the replica
/// count of the set using the picker. Every `len` the picker was asked with
/// is recorded.
///
/// ```
/// use isql_db::ReplicaPicker;
/// use isql_test::picker::ScriptedPicker;
///
/// let picker = ScriptedPicker::new([2, 0]);
/// assert_eq!(picker.pick(3), 2);
/// assert_eq!(picker.pick(3), 0);
/// assert_eq!(picker.pick(3), 2);
/// assert_eq!(picker.asked(), vec![3, 3, 3]);
/// ```
#[derive(Debug)]
pub struct ScriptedPicker {
    script: Vec<usize>,
    next: AtomicUsize,
    asked: Mutex<Vec<usize>>,
}

impl ScriptedPicker {
    /// Creates a picker that plays `script` in a loop. An empty script
    /// always picks 0.
    pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: script.into_iter().collect(),
            next: AtomicUsize::new(0),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// The `len` argument of every call so far.
    pub fn asked(&self) -> Vec<usize> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReplicaPicker for ScriptedPicker {
    fn pick(&self, len: usize) -> usize {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(len);
        if self.script.is_empty() {
            return 0;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        self.script[n % self.script.len()]
    }
}
