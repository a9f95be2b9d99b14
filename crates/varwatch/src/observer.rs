//! Observer: the public entry point and the second coalescing tier.
//!
//! One Observer owns any number of Sensor Agents, at most one per element.
//! Their changesets reach it through a single ambient listener that drops
//! changesets tagged with another Observer's id. Changesets arriving within
//! one microtask window are delivered to the callback in one call, in
//! arrival order.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::changeset::{Changeset, ObserveOptions, ObserverId, TaggedChangeset};
use crate::scheduler::Granularity;
use crate::sensor::SensorAgent;
use crate::source::{ChangesetHandler, Platform, Subscription};
use crate::window::CoalescingWindow;

/// Cheap to clone; clones are the same Observer.
pub struct Observer<P: Platform> {
    inner: Rc<Inner<P>>,
}

struct Inner<P: Platform> {
    id: ObserverId,
    platform: P,
    callback: Rc<dyn Fn(Vec<Changeset<P::Element>>, &Observer<P>)>,
    /// Agents are owned by the tree. Dead entries are pruned lazily.
    sensors: RefCell<Vec<Weak<SensorAgent<P>>>>,
    pending: CoalescingWindow<Vec<Changeset<P::Element>>>,
    listener: RefCell<Option<Subscription>>,
}

impl<P: Platform> Observer<P> {
    pub fn new(
        platform: P,
        callback: impl Fn(Vec<Changeset<P::Element>>, &Observer<P>) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: ObserverId::new(),
                platform,
                callback: Rc::new(callback),
                sensors: RefCell::new(Vec::new()),
                pending: CoalescingWindow::new(Granularity::Microtask),
                listener: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// Watch `options.variables` on `element`, replacing whatever this
    /// Observer watched on it before.
    pub fn observe(&self, element: &P::Element, options: ObserveOptions) {
        self.ensure_listener();

        if let Some(agent) = self.sensor_for(element) {
            agent.set_variables(&options.variables);
            return;
        }

        let inner = &self.inner;
        let source = inner.platform.create_source(inner.id);
        let agent = SensorAgent::new(inner.id, source, inner.platform.scheduler());
        agent.set_variables(&options.variables);
        inner.sensors.borrow_mut().push(Rc::downgrade(&agent));
        inner.platform.mount(element, &agent);
        log::debug!("observer {}: observing {:?}", inner.id, element);
    }

    /// Stop watching `element` and forget its pending changesets. No-op
    /// when it is not observed.
    pub fn unobserve(&self, element: &P::Element) {
        let Some(agent) = self.sensor_for(element) else {
            return;
        };
        self.inner
            .sensors
            .borrow_mut()
            .retain(|sensor| sensor.upgrade().is_some_and(|sensor| !Rc::ptr_eq(&sensor, &agent)));
        self.inner.platform.unmount(&agent);
        self.inner
            .pending
            .retain(|changeset| changeset.element() != element);
        log::debug!("observer {}: unobserved {:?}", self.inner.id, element);
    }

    /// Remove every detection subtree, stop listening and forget pending
    /// changesets. A later `observe` starts over with a fresh listener.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let sensors = std::mem::take(&mut *inner.sensors.borrow_mut());
        for agent in sensors.iter().filter_map(Weak::upgrade) {
            inner.platform.unmount(&agent);
        }
        let listener = inner.listener.borrow_mut().take();
        drop(listener);
        inner.pending.clear();
        log::debug!("observer {}: disconnected", inner.id);
    }

    /// Flush every Sensor Agent now instead of waiting for its task.
    ///
    /// The changesets join the current microtask window, so they reach the
    /// callback together.
    pub fn flush_sensors(&self) {
        for agent in self.live_sensors() {
            agent.flush();
        }
    }

    /// Flush every Sensor Agent and return the pending changesets instead
    /// of passing them to the callback.
    pub fn take_records(&self) -> Vec<Changeset<P::Element>> {
        self.flush_sensors();
        self.inner.pending.take().unwrap_or_default()
    }

    /// Number of live Sensor Agents.
    pub fn observed_count(&self) -> usize {
        self.live_sensors().len()
    }

    fn ensure_listener(&self) {
        if self.inner.listener.borrow().is_some() {
            return;
        }
        let inner = Rc::downgrade(&self.inner);
        let handler: ChangesetHandler<P::Element> = Rc::new(move |tagged| {
            if let Some(inner) = inner.upgrade() {
                Observer { inner }.accept(tagged);
            }
        });
        let listener = self.inner.platform.listen(handler);
        *self.inner.listener.borrow_mut() = Some(listener);
    }

    fn accept(&self, tagged: &TaggedChangeset<P::Element>) {
        if tagged.owner != self.inner.id {
            return;
        }
        let inner = Rc::downgrade(&self.inner);
        let scheduler = self.inner.platform.scheduler();
        self.inner.pending.add(tagged.changeset.clone(), &*scheduler, move || {
            if let Some(inner) = inner.upgrade() {
                Observer { inner }.flush();
            }
        });
    }

    fn flush(&self) {
        let Some(changesets) = self.inner.pending.take() else {
            return;
        };
        log::debug!(
            "observer {}: delivering {} changeset(s)",
            self.inner.id,
            changesets.len()
        );
        let callback = self.inner.callback.clone();
        callback(changesets, self);
    }

    /// Live agents in creation order. Prunes reclaimed entries.
    fn live_sensors(&self) -> Vec<Rc<SensorAgent<P>>> {
        let mut sensors = self.inner.sensors.borrow_mut();
        let mut live = Vec::with_capacity(sensors.len());
        sensors.retain(|sensor| match sensor.upgrade() {
            Some(agent) => {
                live.push(agent);
                true
            }
            None => false,
        });
        live
    }

    fn sensor_for(&self, element: &P::Element) -> Option<Rc<SensorAgent<P>>> {
        self.live_sensors()
            .into_iter()
            .find(|agent| agent.host().as_ref() == Some(element))
    }
}

impl<P: Platform> Clone for Observer<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Platform> PartialEq for Observer<P> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<P: Platform> Eq for Observer<P> {}

impl<P: Platform> fmt::Debug for Observer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.inner.id)
            .field("sensors", &self.inner.sensors.borrow().len())
            .field("pending", &self.inner.pending.len())
            .field("listening", &self.inner.listener.borrow().is_some())
            .finish()
    }
}
