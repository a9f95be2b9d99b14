//! Browser backend for `varwatch`.
//!
//! ```ignore
//! let observer = varwatch_zoon::observer(|changesets, _observer| {
//!     for changeset in changesets {
//!         zoon::println!("{:?}", changeset.variables());
//!     }
//! });
//! observer.observe(&card, ObserveOptions::variables(["--accent", "--gap"]));
//! ```

pub mod platform;
pub mod scheduler;
pub mod source;
pub mod style;

pub use platform::DomPlatform;
pub use scheduler::WebScheduler;
pub use source::DomSource;
pub use varwatch::{Changeset, ObserveOptions, ObserverId, Subscription};

use web_sys::HtmlElement;

/// Enables sensor lifecycle and bridge tracing in the browser console.
pub(crate) const LOG_DEBUG: bool = cfg!(feature = "debug-log");

pub type CssVariableObserver = varwatch::Observer<DomPlatform>;

/// An Observer on this thread's document.
pub fn observer(
    callback: impl Fn(Vec<Changeset<HtmlElement>>, &CssVariableObserver) + 'static,
) -> CssVariableObserver {
    varwatch::Observer::new(DomPlatform::current(), callback)
}
