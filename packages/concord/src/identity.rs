use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Identifies the calling thread and supplies monotonic time to a [`Registry`][crate::Registry].
///
/// Thread ids are used as indexes into per-event statistics storage, so implementations
/// should hand out small, dense values starting from zero.
pub trait Identity: Debug + Send + Sync {
    /// The id of the calling thread.
    fn current_thread_id(&self) -> usize;

    /// The current monotonic time.
    fn now(&self) -> Instant;
}

/// The default identity provider.
///
/// Each thread receives a process-wide id on its first call, in the order threads first ask.
/// Ids are never reused, even after a thread exits.
#[derive(Debug, Default)]
pub struct ThreadIdentity;

static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_ID: usize = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

impl Identity for ThreadIdentity {
    #[cfg_attr(test, mutants::skip)] // Any constant would still be a valid (if useless) thread id.
    fn current_thread_id(&self) -> usize {
        THREAD_ID.with(|id| *id)
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}
