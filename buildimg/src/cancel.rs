use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::warn;

/// A token that can be shared between threads to request that running work stops. Clones observe
/// the same state.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancels this token when the process receives Ctrl-C. Can only be installed once per
    /// process.
    pub fn cancel_on_ctrlc(&self) -> Result<(), ctrlc::Error> {
        let cancellation = self.clone();
        ctrlc::set_handler(move || {
            warn!("interrupted, cancelling...");
            cancellation.cancel();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let cancellation = Cancellation::new();
        let clone = cancellation.clone();
        assert!(!clone.is_cancelled());
        cancellation.cancel();
        assert!(clone.is_cancelled());
    }
}
