//! Sensor Agent: per-element detection and first-tier coalescing.
//!
//! Turns a burst of detection signals on one element into one changeset.
//! Names are merged in a task-granularity window; values are read when the
//! window flushes, so the last value wins.
//!
//! ```text
//!   unattached --insert--> attached (listening)
//!   attached   --remove--> unattached
//! ```
//!
//! The pending window (`idle` / `flush-scheduled`) is independent of the
//! attach state. A flush that fires after detach still runs.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};

use crate::changeset::{Changeset, ObserverId, TaggedChangeset};
use crate::scheduler::{Granularity, Scheduler};
use crate::source::{ChangeSource, Lifecycle, Platform, SignalSink, Subscription};
use crate::window::CoalescingWindow;

pub struct SensorAgent<P: Platform> {
    owner: ObserverId,
    source: P::Source,
    scheduler: Rc<dyn Scheduler>,
    variables: RefCell<Vec<String>>,
    pending: CoalescingWindow<IndexSet<String>>,
    subscription: RefCell<Option<Subscription>>,
    this: Weak<Self>,
}

impl<P: Platform> SensorAgent<P> {
    pub fn new(owner: ObserverId, source: P::Source, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            owner,
            source,
            scheduler,
            variables: RefCell::new(Vec::new()),
            pending: CoalescingWindow::new(Granularity::Task),
            subscription: RefCell::new(None),
            this: this.clone(),
        })
    }

    pub fn owner(&self) -> ObserverId {
        self.owner
    }

    pub fn source(&self) -> &P::Source {
        &self.source
    }

    pub fn host(&self) -> Option<P::Element> {
        self.source.host()
    }

    pub fn variables(&self) -> Vec<String> {
        self.variables.borrow().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    /// Names signalled since the last flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Rebuild the detection nodes for `variables`. Not additive.
    pub fn set_variables(&self, variables: &[String]) {
        log::trace!("sensor {}: watching {:?}", self.owner, variables);
        self.source.render(variables);
        *self.variables.borrow_mut() = variables.to_vec();
    }

    fn on_signal(&self, variable: Option<&str>) {
        let Some(variable) = variable.filter(|variable| !variable.is_empty()) else {
            log::trace!("sensor {}: signal without a variable name ignored", self.owner);
            return;
        };
        let this = self.this.clone();
        self.pending.add(variable.to_owned(), &*self.scheduler, move || {
            if let Some(agent) = this.upgrade() {
                agent.flush();
            }
        });
    }

    /// Resolve every pending variable and dispatch one changeset.
    ///
    /// No-op when nothing is pending.
    pub fn flush(&self) {
        let Some(names) = self.pending.take() else {
            return;
        };
        let variables: IndexMap<String, String> = names
            .into_iter()
            .map(|name| {
                let value = self.source.resolve(&name);
                (name, value)
            })
            .collect();
        let Some(element) = self.source.host() else {
            log::debug!(
                "sensor {}: detection subtree has no host, dropping {} variable(s)",
                self.owner,
                variables.len()
            );
            return;
        };
        log::debug!("sensor {}: flushing {:?}", self.owner, variables);
        self.source
            .dispatch(TaggedChangeset::new(self.owner, Changeset::new(element, variables)));
    }
}

impl<P: Platform> Lifecycle for SensorAgent<P> {
    /// Subscribe to the detection signals. Attaching again replaces the
    /// previous subscription.
    fn attach(&self) {
        let this = self.this.clone();
        let sink: SignalSink = Rc::new(move |variable| {
            if let Some(agent) = this.upgrade() {
                agent.on_signal(variable);
            }
        });
        let subscription = self.source.subscribe(sink);
        // Drop the old subscription outside the borrow.
        let previous = self.subscription.borrow_mut().replace(subscription);
        drop(previous);
    }

    fn detach(&self) {
        let subscription = self.subscription.borrow_mut().take();
        drop(subscription);
    }
}
