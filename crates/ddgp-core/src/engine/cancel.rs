use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation token shared between the search and its caller.
///
/// The search polls the token at the top of every sub-arc iteration, inside
/// the refinement retry loop, and after every recursive call returns; it is
/// never awaited. Cloning hands out another handle to the same flag, so an
/// interrupt handler or supervising thread can request cancellation without
/// touching the search state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(other.is_cancelled());
    }
}
