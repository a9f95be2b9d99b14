//! Batched change notifications for custom style properties.
//!
//! Browsers cannot observe `--custom-property` changes directly. A Sensor
//! Agent per observed element turns those changes into signals (in the
//! browser, through invisible detection nodes with a near-zero transition),
//! merges a burst of them into one changeset, and hands it to its Observer.
//! The Observer merges changesets from many elements and calls back once
//! per microtask window.
//!
//! ```
//! use varwatch::synthetic::SyntheticDocument;
//! use varwatch::{ObserveOptions, Observer};
//!
//! let document = SyntheticDocument::new();
//! let card = document.create_element("div");
//! document.root().append_child(&card);
//!
//! let observer = Observer::new(document.clone(), |changesets, _observer| {
//!     for changeset in changesets {
//!         println!("{:?}: {:?}", changeset.element(), changeset.variables());
//!     }
//! });
//! observer.observe(&card, ObserveOptions::variables(["--accent"]));
//!
//! card.set_property("--accent", "rebeccapurple");
//! document.event_loop().run_until_idle();
//! ```

pub mod changeset;
pub mod observer;
pub mod scheduler;
pub mod sensor;
pub mod source;
pub mod synthetic;
pub mod window;

pub use changeset::{Changeset, ObserveOptions, ObserverId, TaggedChangeset};
pub use observer::Observer;
pub use scheduler::{Granularity, Job, ManualScheduler, Scheduler};
pub use sensor::SensorAgent;
pub use source::{ChangeSource, ChangesetHandler, Lifecycle, Platform, SignalSink, Subscription};
pub use window::{Batch, CoalescingWindow};
