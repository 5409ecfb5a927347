//! Fault boundary around plugin-provided code
//!
//! A plugin call may fail by returning an error or by panicking, either while
//! building its future or while it is being polled. Both are turned into a
//! [`Fault`] so that nothing a plugin does can unwind through the runtime.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

/// A failure raised by plugin code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub panicked: bool,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.panicked {
            write!(f, "panicked: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl Fault {
    fn from_error(err: anyhow::Error) -> Self {
        Self {
            message: format!("{:#}", err),
            panicked: false,
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self {
            message: panic_message(payload.as_ref()),
            panicked: true,
        }
    }
}

/// Run an asynchronous plugin call inside the fault boundary
pub async fn guard<F, T>(fut: F) -> Result<T, Fault>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Fault::from_error(err)),
        Err(payload) => Err(Fault::from_panic(payload)),
    }
}

/// Run a synchronous plugin call inside the fault boundary
pub fn guard_sync<F, T>(f: F) -> Result<T, Fault>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Fault::from_error(err)),
        Err(payload) => Err(Fault::from_panic(payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
