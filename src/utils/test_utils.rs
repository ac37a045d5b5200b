//! Test utilities shared across modules.

#[cfg(test)]
pub mod utils {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Returns a unique path in the system temp directory ending with `name`.
    ///
    /// Tests run in parallel, so every call gets a distinct prefix.
    pub fn temp_path(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("dkvm-{}-{n}-{name}", std::process::id()))
    }
}
