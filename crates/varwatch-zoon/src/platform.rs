//! The browser document as a varwatch platform.
//!
//! Sensors live in the light DOM of the observed element. Their agents are
//! kept alive by the mount table until unmounted or until their sensor is
//! cleared out of its host. A document-wide `MutationObserver` attaches and
//! detaches them as their sensors enter and leave the document.
//!
//! A host removed from the page stays in the table with its sensor, so it
//! is not collected until `unobserve` or `disconnect`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use js_sys::{Array, Map, Reflect};
use varwatch::{
    Changeset, ChangesetHandler, Lifecycle, ObserverId, Platform, Scheduler, SensorAgent,
    Subscription, TaggedChangeset,
};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue, UnwrapThrowExt};
use web_sys::{CustomEvent, Event, HtmlElement, MutationObserver, MutationObserverInit};

use crate::LOG_DEBUG;
use crate::scheduler::WebScheduler;
use crate::source::DomSource;
use crate::style::CHANGE_EVENT;

thread_local! {
    static CURRENT: DomPlatform = DomPlatform::new();
}

#[derive(Clone)]
pub struct DomPlatform {
    shared: Rc<Shared>,
}

struct Shared {
    scheduler: Rc<WebScheduler>,
    mounted: RefCell<Vec<Mounted>>,
    watcher: RefCell<Option<Watcher>>,
}

struct Mounted {
    sensor: HtmlElement,
    agent: Rc<dyn Lifecycle>,
    attached: Cell<bool>,
}

struct Watcher {
    observer: MutationObserver,
    _callback: Closure<dyn Fn(Array, MutationObserver)>,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

impl DomPlatform {
    /// The platform of this thread's document.
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                scheduler: Rc::new(WebScheduler),
                mounted: RefCell::new(Vec::new()),
                watcher: RefCell::new(None),
            }),
        }
    }

    /// Number of sensors in the mount table.
    pub fn mounted_count(&self) -> usize {
        self.shared.mounted.borrow().len()
    }

    fn ensure_watcher(&self) {
        if self.shared.watcher.borrow().is_some() {
            return;
        }
        let shared = Rc::downgrade(&self.shared);
        let callback: Closure<dyn Fn(Array, MutationObserver)> =
            Closure::new(move |_records: Array, _observer: MutationObserver| {
                if let Some(shared) = shared.upgrade() {
                    reconcile(&shared);
                }
            });
        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(error) => {
                zoon::eprintln!("Failed to create the sensor MutationObserver: {error:?}");
                return;
            }
        };
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        let document = web_sys::window().unwrap_throw().document().unwrap_throw();
        if let Err(error) = observer.observe_with_options(&document, &init) {
            zoon::eprintln!("Failed to watch the document for sensor moves: {error:?}");
            return;
        }
        *self.shared.watcher.borrow_mut() = Some(Watcher {
            observer,
            _callback: callback,
        });
    }
}

/// Attach agents whose sensor entered the document, detach those whose
/// sensor left it, and release agents whose sensor lost its host.
///
/// A sensor without a parent was cleared out of its host by page code
/// (`replaceChildren`, `innerHTML`). Nothing can reach its agent again.
fn reconcile(shared: &Shared) {
    let orphaned: Vec<Mounted> = {
        let mut mounted = shared.mounted.borrow_mut();
        let (orphaned, kept) = mounted
            .drain(..)
            .partition(|entry| entry.sensor.parent_element().is_none());
        *mounted = kept;
        orphaned
    };
    for entry in &orphaned {
        if entry.attached.get() {
            entry.agent.detach();
        }
    }
    if LOG_DEBUG && !orphaned.is_empty() {
        zoon::println!("[varwatch] released {} orphaned sensor(s)", orphaned.len());
    }
    drop(orphaned);

    let mut changed: Vec<(Rc<dyn Lifecycle>, bool)> = Vec::new();
    for mounted in shared.mounted.borrow().iter() {
        let connected = mounted.sensor.is_connected();
        if connected != mounted.attached.get() {
            mounted.attached.set(connected);
            changed.push((mounted.agent.clone(), connected));
        }
    }
    for (agent, connected) in changed {
        if connected {
            agent.attach();
        } else {
            agent.detach();
        }
    }
}

impl Platform for DomPlatform {
    type Element = HtmlElement;
    type Source = DomSource;

    fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.shared.scheduler.clone()
    }

    fn create_source(&self, owner: ObserverId) -> DomSource {
        DomSource::new(owner)
    }

    fn mount(&self, element: &HtmlElement, agent: &Rc<SensorAgent<Self>>) {
        self.ensure_watcher();

        let sensor = agent.source().sensor().clone();
        if let Err(error) = element.append_child(&sensor) {
            zoon::eprintln!("Failed to insert the sensor: {error:?}");
            return;
        }
        let connected = sensor.is_connected();
        let lifecycle: Rc<dyn Lifecycle> = agent.clone();
        self.shared.mounted.borrow_mut().push(Mounted {
            sensor,
            agent: lifecycle,
            attached: Cell::new(connected),
        });
        if connected {
            agent.attach();
        }
        if LOG_DEBUG {
            zoon::println!("[varwatch] {} mounted a sensor", agent.owner());
        }
    }

    fn unmount(&self, agent: &Rc<SensorAgent<Self>>) {
        agent.detach();
        agent.source().remove();
        let sensor = agent.source().sensor();
        let removed: Vec<Mounted> = {
            let mut mounted = self.shared.mounted.borrow_mut();
            let (removed, kept) = mounted
                .drain(..)
                .partition(|entry| &entry.sensor == sensor);
            *mounted = kept;
            removed
        };
        drop(removed);
        if LOG_DEBUG {
            zoon::println!("[varwatch] {} unmounted a sensor", agent.owner());
        }
    }

    fn listen(&self, handler: ChangesetHandler<HtmlElement>) -> Subscription {
        let listener: Closure<dyn Fn(Event)> = Closure::new(move |event: Event| {
            match read_changeset(&event) {
                Some(tagged) => handler(&tagged),
                None => zoon::eprintln!("Ignoring a malformed {CHANGE_EVENT} event"),
            }
        });
        let root = web_sys::window()
            .unwrap_throw()
            .document()
            .unwrap_throw()
            .document_element()
            .unwrap_throw();
        root.add_event_listener_with_callback(CHANGE_EVENT, listener.as_ref().unchecked_ref())
            .unwrap_throw();

        Subscription::new(move || {
            if let Err(error) = root
                .remove_event_listener_with_callback(CHANGE_EVENT, listener.as_ref().unchecked_ref())
            {
                zoon::eprintln!("Failed to remove the {CHANGE_EVENT} listener: {error:?}");
            }
        })
    }
}

/// Rebuild the tagged changeset from a bridge event's detail.
fn read_changeset(event: &Event) -> Option<TaggedChangeset<HtmlElement>> {
    let detail = event.dyn_ref::<CustomEvent>()?.detail();
    let field = |key: &str| Reflect::get(&detail, &JsValue::from_str(key)).ok();

    let owner = ObserverId::from_str(&field("observerId")?.as_string()?).ok()?;
    let element = field("element")?.dyn_into::<HtmlElement>().ok()?;
    let entries = field("variables")?.dyn_into::<Map>().ok()?;

    let mut variables = IndexMap::with_capacity(entries.size() as usize);
    entries.for_each(&mut |value, key| {
        if let (Some(name), Some(value)) = (key.as_string(), value.as_string()) {
            variables.insert(name, value);
        }
    });
    Some(TaggedChangeset::new(owner, Changeset::new(element, variables)))
}
