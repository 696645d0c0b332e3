//! Logging bootstrap and panic reporting.
//!
//! Scope id, pointer and request id travel as structured fields on events
//! and spans. They are never formatted into the message text.

pub mod test_utils;

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

pub use test_utils::{CapturedLogs, capture_logs};

/// Send events to stderr, filtered by `RUST_LOG` or else by `level`.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_subscriber(level: &str) -> bool {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .try_init()
        .is_ok()
}

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Capture a backtrace at every panic site, then run the previously
/// installed hook.
///
/// `catch_unwind` only hands the payload to the catcher; by then the stack
/// is gone. The captured trace is parked per thread until
/// [`take_panic_backtrace`] collects it. Installing more than once is a
/// no-op.
pub fn install_panic_hook() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Backtrace of the latest panic on this thread, if the hook captured one
/// that nobody has taken yet.
pub fn take_panic_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
