use crate::error::Result;
use crate::transaction::Data;
use crate::util::FileData;
use crate::HtpStatus;
use std::rc::Rc;

/// A list of callbacks that receive request or response body data as it is
/// parsed out, in order.
///
/// Callbacks are run in registration order and stop on the first error other
/// than `DECLINED`, which just means "not interested" and lets the rest of
/// the chain run. Backed by an `Rc` so a `Config` (and the hook lists it
/// carries) can be cloned onto a transaction without copying every
/// registered closure.
#[derive(Clone)]
pub struct DataHook(Rc<Vec<Box<dyn Fn(&mut Data) -> Result<()>>>>);

impl Default for DataHook {
    fn default() -> Self {
        DataHook(Rc::new(Vec::new()))
    }
}

impl DataHook {
    pub fn new() -> Self {
        DataHook::default()
    }

    /// Registers a new callback, to be run after any already registered.
    ///
    /// Must be called while building a `Config`, before it's shared with any
    /// transaction; panics if this hook has already been cloned.
    pub fn register(&mut self, cb: impl Fn(&mut Data) -> Result<()> + 'static) {
        Rc::get_mut(&mut self.0)
            .expect("hook registered after Config was shared")
            .push(Box::new(cb));
    }

    /// Runs every registered callback against the given data chunk.
    pub fn run_all(&self, data: &mut Data) -> Result<()> {
        for cb in self.0.iter() {
            match cb(data) {
                Ok(()) | Err(HtpStatus::DECLINED) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Same as [`DataHook`], but for file data extracted from PUT request bodies.
#[derive(Clone)]
pub struct FileDataHook(Rc<Vec<Box<dyn Fn(&mut FileData) -> Result<()>>>>);

impl Default for FileDataHook {
    fn default() -> Self {
        FileDataHook(Rc::new(Vec::new()))
    }
}

impl FileDataHook {
    pub fn new() -> Self {
        FileDataHook::default()
    }

    pub fn register(&mut self, cb: impl Fn(&mut FileData) -> Result<()> + 'static) {
        Rc::get_mut(&mut self.0)
            .expect("hook registered after Config was shared")
            .push(Box::new(cb));
    }

    pub fn run_all(&self, data: &mut FileData) -> Result<()> {
        for cb in self.0.iter() {
            match cb(data) {
                Ok(()) | Err(HtpStatus::DECLINED) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
