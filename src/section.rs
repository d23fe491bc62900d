/// Exclusive region in which slot timing must not be stretched by preemption.
///
/// The driver enters a section right before a bit slot (or a short group of
/// slots) and leaves it right after. Leaving happens when `run` returns, on
/// every path out of `f`.
pub trait AtomicSection {
    fn run<R>(&mut self, f: impl FnOnce() -> R) -> R;
}

/// Atomic section backed by the platform's `critical-section` implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct CriticalSection;

impl AtomicSection for CriticalSection {
    #[inline]
    fn run<R>(&mut self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_| f())
    }
}
