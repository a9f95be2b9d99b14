//! In-memory document for deterministic tests.
//!
//! Models only what the Observer depends on:
//! - a tree of elements with inherited custom properties,
//! - detection subtrees that signal when a watched variable's resolved
//!   value changes while they are attached,
//! - changesets bubbling to ambient listeners when the host is connected,
//! - a `ManualScheduler` standing in for the browser event loop.
//!
//! Elements own the Sensor Agents mounted in them, so dropping every
//! handle to a removed element reclaims its agents.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::changeset::{ObserverId, TaggedChangeset};
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::sensor::SensorAgent;
use crate::source::{ChangeSource, ChangesetHandler, Lifecycle, Platform, SignalSink, Subscription};

#[derive(Clone)]
pub struct SyntheticDocument {
    shared: Rc<DocumentShared>,
}

struct DocumentShared {
    event_loop: Rc<ManualScheduler>,
    root: SyntheticElement,
    listeners: RefCell<Vec<(u64, ChangesetHandler<SyntheticElement>)>>,
    next_id: Cell<u64>,
}

impl DocumentShared {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn deliver(&self, changeset: &TaggedChangeset<SyntheticElement>) {
        let listeners: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in listeners {
            handler(changeset);
        }
    }
}

impl SyntheticDocument {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(DocumentShared {
                event_loop: Rc::new(ManualScheduler::new()),
                root: SyntheticElement::new(0, "html", true),
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// The document element. Always connected.
    pub fn root(&self) -> SyntheticElement {
        self.shared.root.clone()
    }

    /// A new element outside the tree.
    pub fn create_element(&self, tag: &str) -> SyntheticElement {
        SyntheticElement::new(self.shared.next_id(), tag, false)
    }

    pub fn event_loop(&self) -> Rc<ManualScheduler> {
        self.shared.event_loop.clone()
    }

    /// Ambient changeset listeners currently installed.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.borrow().len()
    }
}

impl Default for SyntheticDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SyntheticDocument {
    type Element = SyntheticElement;
    type Source = SyntheticSource;

    fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.shared.event_loop.clone()
    }

    fn create_source(&self, owner: ObserverId) -> SyntheticSource {
        SyntheticSource {
            node: Rc::new(SensorNode {
                owner,
                host: RefCell::new(Weak::new()),
                variables: RefCell::new(Vec::new()),
                sink: RefCell::new(None),
            }),
            document: Rc::downgrade(&self.shared),
        }
    }

    fn mount(&self, element: &SyntheticElement, agent: &Rc<SensorAgent<Self>>) {
        let node = agent.source().node.clone();
        *node.host.borrow_mut() = Rc::downgrade(&element.0);
        element.0.sensors.borrow_mut().push(MountedSensor {
            node,
            agent: agent.clone(),
        });
        if element.is_connected() {
            agent.attach();
        }
    }

    fn unmount(&self, agent: &Rc<SensorAgent<Self>>) {
        agent.detach();
        agent.source().remove();
    }

    fn listen(&self, handler: ChangesetHandler<SyntheticElement>) -> Subscription {
        let id = self.shared.next_id();
        self.shared.listeners.borrow_mut().push((id, handler));
        let shared = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.listeners.borrow_mut().retain(|(listener, _)| *listener != id);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// Handle to an element. Compares by identity.
#[derive(Clone)]
pub struct SyntheticElement(Rc<ElementNode>);

struct ElementNode {
    id: u64,
    tag: String,
    is_root: bool,
    parent: RefCell<Weak<ElementNode>>,
    children: RefCell<Vec<SyntheticElement>>,
    properties: RefCell<IndexMap<String, String>>,
    sensors: RefCell<Vec<MountedSensor>>,
}

/// A detection subtree living in an element, together with the agent it
/// keeps alive.
struct MountedSensor {
    node: Rc<SensorNode>,
    agent: Rc<dyn Lifecycle>,
}

impl SyntheticElement {
    fn new(id: u64, tag: &str, is_root: bool) -> Self {
        Self(Rc::new(ElementNode {
            id,
            tag: tag.to_owned(),
            is_root,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            properties: RefCell::new(IndexMap::new()),
            sensors: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn parent(&self) -> Option<SyntheticElement> {
        self.0.parent.borrow().upgrade().map(SyntheticElement)
    }

    pub fn children(&self) -> Vec<SyntheticElement> {
        self.0.children.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        let mut current = self.clone();
        loop {
            if current.0.is_root {
                return true;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn is_inclusive_ancestor_of(&self, other: &SyntheticElement) -> bool {
        let mut current = Some(other.clone());
        while let Some(element) = current {
            if element == *self {
                return true;
            }
            current = element.parent();
        }
        false
    }

    /// Move `child` to the end of this element's children.
    pub fn append_child(&self, child: &SyntheticElement) {
        if child.0.is_root || child.is_inclusive_ancestor_of(self) {
            log::warn!("{:?}: refusing to append {:?}, it would create a cycle", self, child);
            return;
        }
        child.remove();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
        if self.is_connected() {
            for agent in child.mounted_agents() {
                agent.attach();
            }
        }
    }

    /// Take this element out of its parent.
    pub fn remove(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        let was_connected = parent.is_connected();
        parent.0.children.borrow_mut().retain(|child| child != self);
        *self.0.parent.borrow_mut() = Weak::new();
        if was_connected {
            for agent in self.mounted_agents() {
                agent.detach();
            }
        }
    }

    pub fn set_property(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.change_property(name, move |properties| {
            properties.insert(name.to_owned(), value);
        });
    }

    pub fn remove_property(&self, name: &str) {
        self.change_property(name, |properties| {
            properties.shift_remove(name);
        });
    }

    /// Resolved value: the nearest inclusive ancestor's own value, or empty.
    pub fn computed_value(&self, name: &str) -> String {
        let mut current = Some(self.clone());
        while let Some(element) = current {
            if let Some(value) = element.0.properties.borrow().get(name) {
                return value.clone();
            }
            current = element.parent();
        }
        String::new()
    }

    /// Detection subtrees mounted directly in this element.
    pub fn sensor_count(&self) -> usize {
        self.0.sensors.borrow().len()
    }

    /// One entry per detection subtree mounted in this element, holding the
    /// variable names it watches.
    pub fn detection_nodes(&self) -> Vec<Vec<String>> {
        self.0
            .sensors
            .borrow()
            .iter()
            .map(|mounted| mounted.node.variables.borrow().clone())
            .collect()
    }

    /// Fire a detection signal that carries no variable name.
    pub fn fire_unnamed_transition(&self) {
        let nodes: Vec<_> = self
            .0
            .sensors
            .borrow()
            .iter()
            .map(|mounted| mounted.node.clone())
            .collect();
        for node in nodes {
            node.signal(None);
        }
    }

    /// Apply `change`, then signal every detection node in the subtree
    /// whose resolved value of `name` changed.
    fn change_property(&self, name: &str, change: impl FnOnce(&mut IndexMap<String, String>)) {
        let watchers: Vec<(Rc<SensorNode>, String)> = self
            .subtree()
            .iter()
            .flat_map(|element| {
                element
                    .0
                    .sensors
                    .borrow()
                    .iter()
                    .filter(|mounted| mounted.node.watches(name))
                    .map(|mounted| (mounted.node.clone(), element.computed_value(name)))
                    .collect::<Vec<_>>()
            })
            .collect();

        change(&mut self.0.properties.borrow_mut());

        for (node, before) in watchers {
            if node.resolve(name) != before {
                node.signal(Some(name));
            }
        }
    }

    fn subtree(&self) -> Vec<SyntheticElement> {
        let mut elements = vec![self.clone()];
        let mut index = 0;
        while index < elements.len() {
            let children = elements[index].children();
            elements.extend(children);
            index += 1;
        }
        elements
    }

    fn mounted_agents(&self) -> Vec<Rc<dyn Lifecycle>> {
        self.subtree()
            .iter()
            .flat_map(|element| {
                element
                    .0
                    .sensors
                    .borrow()
                    .iter()
                    .map(|mounted| mounted.agent.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl PartialEq for SyntheticElement {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SyntheticElement {}

impl Hash for SyntheticElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for SyntheticElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}#{}>", self.0.tag, self.0.id)
    }
}

// ---------------------------------------------------------------------------
// Detection subtrees
// ---------------------------------------------------------------------------

struct SensorNode {
    owner: ObserverId,
    host: RefCell<Weak<ElementNode>>,
    variables: RefCell<Vec<String>>,
    sink: RefCell<Option<SignalSink>>,
}

impl SensorNode {
    fn host(&self) -> Option<SyntheticElement> {
        self.host.borrow().upgrade().map(SyntheticElement)
    }

    fn watches(&self, name: &str) -> bool {
        self.variables.borrow().iter().any(|variable| variable == name)
    }

    fn resolve(&self, name: &str) -> String {
        self.host()
            .map(|host| host.computed_value(name))
            .unwrap_or_default()
    }

    fn signal(&self, name: Option<&str>) {
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink(name);
        }
    }
}

pub struct SyntheticSource {
    node: Rc<SensorNode>,
    document: Weak<DocumentShared>,
}

impl SyntheticSource {
    pub fn owner(&self) -> ObserverId {
        self.node.owner
    }

    pub fn is_listening(&self) -> bool {
        self.node.sink.borrow().is_some()
    }
}

impl ChangeSource for SyntheticSource {
    type Element = SyntheticElement;

    fn host(&self) -> Option<SyntheticElement> {
        self.node.host()
    }

    fn render(&self, variables: &[String]) {
        *self.node.variables.borrow_mut() = variables.to_vec();
    }

    fn subscribe(&self, sink: SignalSink) -> Subscription {
        *self.node.sink.borrow_mut() = Some(sink);
        let node = Rc::downgrade(&self.node);
        Subscription::new(move || {
            if let Some(node) = node.upgrade() {
                node.sink.borrow_mut().take();
            }
        })
    }

    fn resolve(&self, variable: &str) -> String {
        self.node.resolve(variable)
    }

    fn dispatch(&self, changeset: TaggedChangeset<SyntheticElement>) {
        let connected = self.node.host().is_some_and(|host| host.is_connected());
        if !connected {
            log::trace!("detection subtree is disconnected, changeset goes nowhere");
            return;
        }
        if let Some(document) = self.document.upgrade() {
            document.deliver(&changeset);
        }
    }

    fn remove(&self) {
        let Some(host) = self.node.host() else {
            return;
        };
        let removed: Vec<MountedSensor> = {
            let mut sensors = host.0.sensors.borrow_mut();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *sensors)
                .into_iter()
                .partition(|mounted| Rc::ptr_eq(&mounted.node, &self.node));
            *sensors = kept;
            removed
        };
        *self.node.host.borrow_mut() = Weak::new();
        drop(removed);
    }
}
