use parking_lot::{MappedRwLockWriteGuard, RwLock, RwLockWriteGuard};

/// An `Option<T>` behind a `parking_lot::RwLock`, filled lazily and emptied explicitly.
///
/// Used for GPU objects that are created on first use and dropped when the context that owns
/// them goes away, so holders can keep `&self` methods.
pub struct RwOption<T> {
    inner: RwLock<Option<T>>,
}

impl<T> Default for RwOption<T> {
    fn default() -> Self {
        RwOption::new()
    }
}

impl<T> RwOption<T> {
    pub fn new() -> Self {
        RwOption {
            inner: RwLock::new(None),
        }
    }

    pub fn take(&self) -> Option<T> {
        self.inner.write().take()
    }

    pub fn is_some(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn get_mut_or_insert_with<F>(&self, f: F) -> MappedRwLockWriteGuard<'_, T>
    where
        F: FnOnce() -> T,
    {
        RwLockWriteGuard::map(self.inner.write(), |v| v.get_or_insert_with(f))
    }

    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.read().as_ref().map(f)
    }

    pub fn with_read_or_insert_with<R>(
        &self,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&T) -> R,
    ) -> R {
        // fast path: already initialized
        {
            let read_lock = self.inner.read();
            if let Some(v) = read_lock.as_ref() {
                return f(v);
            }
        }

        let mut write_lock = self.inner.write();
        let v = write_lock.get_or_insert_with(init);
        f(v)
    }
}
