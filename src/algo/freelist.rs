//! Generic pool of reusable per-thread scratch state, built once by a
//! factory closure and recycled across jobs instead of rebuilt every time.

use std::sync::Mutex;

pub struct FactoryFreelist<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    freelist: Mutex<Vec<T>>,
}

impl<T> FactoryFreelist<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        FactoryFreelist {
            factory: Box::new(factory),
            freelist: Mutex::new(Vec::new()),
        }
    }

    /// Takes an instance from the pool, building a new one if none is idle.
    pub fn enter(&self) -> T {
        let mut list = self.freelist.lock().expect("freelist mutex poisoned");
        list.pop().unwrap_or_else(|| (self.factory)())
    }

    /// Returns an instance to the pool for reuse.
    pub fn leave(&self, value: T) {
        self.freelist.lock().expect("freelist mutex poisoned").push(value);
    }
}
