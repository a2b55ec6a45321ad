//! The unit of scheduled work.
//!
//! The original C++ source uses a refcounted erased invocable so that
//! callbacks can be copied and aliased in the selector's registration
//! table. A move-only one-shot closure is the idiomatic Rust
//! equivalent and is strictly better here: "a callback is consumed by
//! invocation; it may not be invoked twice" becomes a type-level
//! property rather than an assertion.

/// A one-shot, movable, erased invocable taking no arguments and
/// returning nothing.
///
/// Moving a `Callback` leaves the source null. The null callback is
/// representable (`Callback::default()` or `Callback::null()`) and
/// distinct from any real callback; invoking it panics.
pub struct Callback(Option<Box<dyn FnOnce() + Send + 'static>>);

impl Callback {
    /// The null callback.
    pub fn null() -> Self {
        Callback(None)
    }

    /// Wraps `f` as a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Callback(Some(Box::new(f)))
    }

    /// True if this is not the null callback.
    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Invokes and consumes the callback.
    ///
    /// # Panics
    ///
    /// Panics if `self` is the null callback.
    pub fn call(self) {
        (self.0.expect("invoked a null cuti::Callback"))()
    }

    /// Takes the callback out of `slot`, leaving `slot` null.
    pub fn take(slot: &mut Callback) -> Callback {
        std::mem::replace(slot, Callback::null())
    }
}

impl Default for Callback {
    fn default() -> Self {
        Callback::null()
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Callback")
            .field(&if self.is_some() { "Some(..)" } else { "None" })
            .finish()
    }
}

/// Wraps a raw pointer so it can cross the `Send` bound [`Callback`]
/// requires of its closures.
///
/// The scheduler, selector, and async buffers are all used from a
/// single thread by contract (spec.md §5), so the `Send` bound on
/// `Callback` itself is cosmetic here — it exists so callbacks
/// constructed elsewhere in the crate (e.g. over `Arc<Mutex<_>>`
/// shared state) aren't accidentally non-portable. Back-edges to a
/// parent struct (buffer → scheduler, buffer → self for its own
/// trampoline) use this wrapper rather than weakening `Callback`'s
/// bound crate-wide.
pub(crate) struct SendPtr<T>(pub *mut T);

unsafe impl<T> Send for SendPtr<T> {}

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        SendPtr(self.0)
    }
}
impl<T> Copy for SendPtr<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn null_is_null() {
        let cb = Callback::null();
        assert!(cb.is_null());
        assert!(!cb.is_some());
    }

    #[test]
    fn fires_exactly_once() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let cb = Callback::new(move || fired2.store(true, Ordering::SeqCst));
        assert!(cb.is_some());
        cb.call();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn move_leaves_source_null() {
        let mut a = Callback::new(|| ());
        let b = Callback::take(&mut a);
        assert!(a.is_null());
        assert!(b.is_some());
    }

    #[test]
    #[should_panic]
    fn invoking_null_panics() {
        Callback::null().call();
    }
}
