//! Capabilities the Observer needs from its host document.
//!
//! The browser backend implements them with invisible detection nodes and
//! `transitionstart`; `synthetic::SyntheticDocument` implements them in
//! memory so the coalescing and ownership logic can be tested without a
//! styling engine.

use std::fmt;
use std::rc::Rc;

use crate::changeset::{ObserverId, TaggedChangeset};
use crate::scheduler::Scheduler;
use crate::sensor::SensorAgent;

/// Receives one notification per detection signal. `None` means the signal
/// did not carry a variable name.
pub type SignalSink = Rc<dyn Fn(Option<&str>)>;

/// Ambient listener for tagged changesets bubbling through the document.
pub type ChangesetHandler<E> = Rc<dyn Fn(&TaggedChangeset<E>)>;

/// Detection infrastructure for one observed element.
pub trait ChangeSource {
    type Element;

    /// The element the detection subtree currently lives in.
    fn host(&self) -> Option<Self::Element>;

    /// Replace all detection nodes with one node per variable.
    fn render(&self, variables: &[String]);

    /// Apply the hidden styling and start delivering signals to `sink`
    /// until the returned subscription is dropped.
    fn subscribe(&self, sink: SignalSink) -> Subscription;

    /// Live computed value of `variable` at the detection subtree. Empty
    /// when the variable is not set.
    fn resolve(&self, variable: &str) -> String;

    /// Let a changeset bubble from the detection subtree to the document.
    fn dispatch(&self, changeset: TaggedChangeset<Self::Element>);

    /// Take the detection subtree out of the tree.
    fn remove(&self);
}

/// Tree-driven lifecycle of a Sensor Agent.
pub trait Lifecycle {
    /// Inserted into a connected tree.
    fn attach(&self);
    /// Removed from the connected tree. Keeps pending state.
    fn detach(&self);
}

/// The host document.
pub trait Platform: Clone + 'static {
    type Element: Clone + PartialEq + fmt::Debug + 'static;
    type Source: ChangeSource<Element = Self::Element> + 'static;

    fn scheduler(&self) -> Rc<dyn Scheduler>;

    /// Build a detached detection subtree stamped with `owner`.
    fn create_source(&self, owner: ObserverId) -> Self::Source;

    /// Insert the agent's detection subtree into `element`, keep the agent
    /// alive for as long as the subtree lives in the tree, and attach it if
    /// `element` is connected.
    fn mount(&self, element: &Self::Element, agent: &Rc<SensorAgent<Self>>);

    /// Detach the agent, remove its detection subtree and release it.
    fn unmount(&self, agent: &Rc<SensorAgent<Self>>);

    /// Install an ambient changeset listener on the document.
    fn listen(&self, handler: ChangesetHandler<Self::Element>) -> Subscription;
}

/// Cancels a listener or signal subscription when dropped.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
