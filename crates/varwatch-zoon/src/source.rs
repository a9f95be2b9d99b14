use js_sys::{Map, Object, Reflect};
use varwatch::{ChangeSource, ObserverId, SignalSink, Subscription, TaggedChangeset};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue, UnwrapThrowExt};
use web_sys::{
    CssStyleDeclaration, CustomEvent, CustomEventInit, Element, Event, HtmlElement,
    ShadowRootInit, ShadowRootMode,
};

use crate::LOG_DEBUG;
use crate::style::{
    CHANGE_EVENT, HIDDEN_SENSOR_CSS, OWNER_ATTRIBUTE, SENSOR_TAG, SIGNAL_EVENT,
    VARIABLE_ATTRIBUTE, detection_node_css,
};

/// A `<var-sensor>` element: an open shadow root with one container of
/// detection nodes.
pub struct DomSource {
    sensor: HtmlElement,
    container: HtmlElement,
    /// Live; read at flush time.
    computed: CssStyleDeclaration,
}

impl DomSource {
    pub fn new(owner: ObserverId) -> Self {
        let window = web_sys::window().unwrap_throw();
        let document = window.document().unwrap_throw();

        let sensor: HtmlElement = document
            .create_element(SENSOR_TAG)
            .unwrap_throw()
            .unchecked_into();
        sensor
            .set_attribute(OWNER_ATTRIBUTE, &owner.to_string())
            .unwrap_throw();
        let shadow = sensor
            .attach_shadow(&ShadowRootInit::new(ShadowRootMode::Open))
            .unwrap_throw();
        let container: HtmlElement = document
            .create_element("div")
            .unwrap_throw()
            .unchecked_into();
        shadow.append_child(&container).unwrap_throw();

        let computed = window
            .get_computed_style(&sensor)
            .unwrap_throw()
            .unwrap_throw();

        Self {
            sensor,
            container,
            computed,
        }
    }

    pub fn sensor(&self) -> &HtmlElement {
        &self.sensor
    }
}

impl ChangeSource for DomSource {
    type Element = HtmlElement;

    fn host(&self) -> Option<HtmlElement> {
        self.sensor
            .parent_element()
            .and_then(|parent| parent.dyn_into::<HtmlElement>().ok())
    }

    fn render(&self, variables: &[String]) {
        let document = web_sys::window().unwrap_throw().document().unwrap_throw();
        self.container.set_text_content(None);
        for variable in variables {
            let node: HtmlElement = document
                .create_element("div")
                .unwrap_throw()
                .unchecked_into();
            node.set_attribute(VARIABLE_ATTRIBUTE, variable).unwrap_throw();
            node.set_attribute("style", &detection_node_css(variable))
                .unwrap_throw();
            self.container.append_child(&node).unwrap_throw();
        }
    }

    fn subscribe(&self, sink: SignalSink) -> Subscription {
        self.sensor
            .set_attribute("style", HIDDEN_SENSOR_CSS)
            .unwrap_throw();

        let listener: Closure<dyn Fn(Event)> = Closure::new(move |event: Event| {
            let variable = event
                .composed_path()
                .get(0)
                .dyn_into::<Element>()
                .ok()
                .and_then(|node| node.get_attribute(VARIABLE_ATTRIBUTE));
            sink(variable.as_deref());
        });
        self.container
            .add_event_listener_with_callback(SIGNAL_EVENT, listener.as_ref().unchecked_ref())
            .unwrap_throw();

        let container = self.container.clone();
        Subscription::new(move || {
            if let Err(error) = container
                .remove_event_listener_with_callback(SIGNAL_EVENT, listener.as_ref().unchecked_ref())
            {
                zoon::eprintln!("Failed to remove the detection listener: {error:?}");
            }
        })
    }

    fn resolve(&self, variable: &str) -> String {
        self.computed.get_property_value(variable).unwrap_or_default()
    }

    fn dispatch(&self, tagged: TaggedChangeset<HtmlElement>) {
        let TaggedChangeset { owner, changeset } = tagged;

        let variables = Map::new();
        for (name, value) in changeset.variables() {
            variables.set(&JsValue::from_str(name), &JsValue::from_str(value));
        }
        let detail = Object::new();
        let fields: [(&str, JsValue); 3] = [
            ("element", changeset.element().clone().into()),
            ("variables", variables.into()),
            ("observerId", JsValue::from_str(&owner.to_string())),
        ];
        for (key, value) in fields {
            Reflect::set(&detail, &JsValue::from_str(key), &value).unwrap_throw();
        }
        Object::freeze(&detail);

        let init = CustomEventInit::new();
        init.set_bubbles(true);
        init.set_composed(true);
        init.set_detail(&detail);
        let event = match CustomEvent::new_with_event_init_dict(CHANGE_EVENT, &init) {
            Ok(event) => event,
            Err(error) => {
                zoon::eprintln!("Failed to create the {CHANGE_EVENT} event: {error:?}");
                return;
            }
        };
        if LOG_DEBUG {
            zoon::println!("[varwatch] {owner} dispatching {:?}", changeset.variables());
        }
        if let Err(error) = self.sensor.dispatch_event(&event) {
            zoon::eprintln!("Failed to dispatch the {CHANGE_EVENT} event: {error:?}");
        }
    }

    fn remove(&self) {
        self.sensor.remove();
    }
}
