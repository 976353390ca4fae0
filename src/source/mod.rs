//! The source interface.
//!
//! A source is user code that publishes stores through the
//! [`FrameworkDriver`]. Two shapes are accepted: drivers-aware sources
//! implement [`Source::next`] directly, and queue-style sources implement
//! [`SimpleNext`] and get wrapped by [`SimpleSource`]. Exactly one source
//! instance is held for the run.
//!
//! A `next` call that publishes nothing and does not call
//! [`FrameworkDriver::finish`] is treated as exhaustion.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::Configuration;
use crate::core::Result;
use crate::model::ProductStore;
use crate::runtime::FrameworkDriver;

/// A store source driven by the framework.
pub trait Source: Send + 'static {
    /// Publish the next store(s) through the driver, or call
    /// `driver.finish()`.
    fn next(&mut self, driver: &mut FrameworkDriver) -> Result<()>;
}

/// Closures are accepted as sources directly.
impl<F> Source for F
where
    F: FnMut(&mut FrameworkDriver) -> Result<()> + Send + 'static,
{
    fn next(&mut self, driver: &mut FrameworkDriver) -> Result<()> {
        self(driver)
    }
}

/// The queue-style source shape: one store per call, `None` when done.
pub trait SimpleNext: Send + 'static {
    /// The next store, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<Arc<ProductStore>>>;
}

/// Adapter giving [`SimpleNext`] sources the driver-aware shape.
pub struct SimpleSource<T> {
    inner: T,
}

impl<T: SimpleNext> SimpleSource<T> {
    /// Wrap a queue-style source.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: SimpleNext> Source for SimpleSource<T> {
    fn next(&mut self, driver: &mut FrameworkDriver) -> Result<()> {
        match self.inner.next()? {
            Some(store) => driver.yield_store(store),
            None => driver.finish(),
        }
        Ok(())
    }
}

/// A source replaying a fixed sequence of stores; used in tests and demos.
pub struct StoreSequence {
    stores: VecDeque<Arc<ProductStore>>,
}

impl StoreSequence {
    /// Replay the given stores in order.
    pub fn new(stores: impl IntoIterator<Item = Arc<ProductStore>>) -> Self {
        Self {
            stores: stores.into_iter().collect(),
        }
    }
}

impl Source for StoreSequence {
    fn next(&mut self, driver: &mut FrameworkDriver) -> Result<()> {
        match self.stores.pop_front() {
            Some(store) => driver.yield_store(store),
            None => driver.finish(),
        }
        Ok(())
    }
}

/// Factory shape a source plugin exposes: configuration in, source out.
pub type SourceCreator = fn(&Configuration) -> Result<Box<dyn Source>>;
