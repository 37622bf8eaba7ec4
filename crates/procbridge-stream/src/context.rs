use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Sink for records decoded from the external process.
pub trait Collector<T> {
    fn collect(&mut self, record: T);
}

impl<T> Collector<T> for Vec<T> {
    fn collect(&mut self, record: T) {
        self.push(record);
    }
}

/// Lookup of broadcast-variable value sequences by name.
pub trait BroadcastVariables<T> {
    fn broadcast_variable(&self, name: &str) -> Option<&[T]>;
}

impl<T> BroadcastVariables<T> for HashMap<String, Vec<T>> {
    fn broadcast_variable(&self, name: &str) -> Option<&[T]> {
        self.get(name).map(Vec::as_slice)
    }
}

impl<T> BroadcastVariables<T> for BTreeMap<String, Vec<T>> {
    fn broadcast_variable(&self, name: &str) -> Option<&[T]> {
        self.get(name).map(Vec::as_slice)
    }
}

/// Diagnostic text captured from the external process's side channel.
///
/// Cloning shares the same buffer; the process layer appends while the
/// streamer snapshots it into failure messages.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Mutex<String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` verbatim.
    pub fn append(&self, text: &str) {
        self.lock().push_str(text);
    }

    /// Append `line` followed by a newline.
    pub fn append_line(&self, line: &str) {
        let mut buf = self.lock();
        buf.push_str(line);
        buf.push('\n');
    }

    /// Copy of everything captured so far.
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // A writer that panicked mid-append still leaves valid UTF-8 behind.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_are_shared_between_clones() {
        let diagnostics = Diagnostics::new();
        let writer = diagnostics.clone();

        writer.append_line("line one");
        writer.append("partial");

        assert_eq!(diagnostics.snapshot(), "line one\npartial");
        diagnostics.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn diagnostics_from_another_thread() {
        let diagnostics = Diagnostics::new();
        let writer = diagnostics.clone();
        std::thread::spawn(move || writer.append_line("from stderr"))
            .join()
            .unwrap();
        assert_eq!(diagnostics.snapshot(), "from stderr\n");
    }

    #[test]
    fn map_lookup() {
        let mut vars = HashMap::new();
        vars.insert("weights".to_string(), vec![1, 2, 3]);
        assert_eq!(vars.broadcast_variable("weights"), Some(&[1, 2, 3][..]));
        assert_eq!(vars.broadcast_variable("missing"), None);
    }

    #[test]
    fn vec_collects_in_order() {
        let mut out: Vec<u8> = Vec::new();
        out.collect(1);
        out.collect(2);
        assert_eq!(out, vec![1, 2]);
    }
}
