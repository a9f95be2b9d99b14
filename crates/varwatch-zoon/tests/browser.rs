#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use varwatch_zoon::style::{OWNER_ATTRIBUTE, SENSOR_TAG, VARIABLE_ATTRIBUTE};
use varwatch_zoon::{Changeset, CssVariableObserver, DomPlatform, ObserveOptions};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{Document, HtmlElement};
use zoon::Timer;

wasm_bindgen_test_configure!(run_in_browser);

type Calls = Rc<RefCell<Vec<Vec<Changeset<HtmlElement>>>>>;

fn document() -> Document {
    web_sys::window().unwrap().document().unwrap()
}

fn connected_element() -> HtmlElement {
    let element: HtmlElement = document().create_element("div").unwrap().unchecked_into();
    document().body().unwrap().append_child(&element).unwrap();
    element
}

fn recording_observer() -> (CssVariableObserver, Calls) {
    let calls = Calls::default();
    let observer = varwatch_zoon::observer({
        let calls = calls.clone();
        move |changesets, _observer| calls.borrow_mut().push(changesets)
    });
    (observer, calls)
}

fn sensors_in(element: &HtmlElement) -> Vec<HtmlElement> {
    let children = element.children();
    (0..children.length())
        .filter_map(|index| children.item(index))
        .filter(|child| child.tag_name().eq_ignore_ascii_case(SENSOR_TAG))
        .map(|child| child.unchecked_into())
        .collect()
}

/// Long enough for style recalc, the transition and both flush windows.
async fn settle() {
    Timer::sleep(100).await;
}

#[wasm_bindgen_test]
fn observe_builds_a_stamped_sensor() {
    let element = connected_element();
    let (observer, _calls) = recording_observer();

    observer.observe(&element, ObserveOptions::variables(["--a", "--b"]));

    let sensors = sensors_in(&element);
    assert_eq!(sensors.len(), 1);
    assert_eq!(
        sensors[0].get_attribute(OWNER_ATTRIBUTE),
        Some(observer.id().to_string())
    );
    let container = sensors[0].shadow_root().unwrap().first_element_child().unwrap();
    let nodes = container.children();
    let variables: Vec<_> = (0..nodes.length())
        .filter_map(|index| nodes.item(index))
        .filter_map(|node| node.get_attribute(VARIABLE_ATTRIBUTE))
        .collect();
    assert_eq!(variables, ["--a", "--b"]);

    observer.observe(&element, ObserveOptions::variables(["--c"]));
    assert_eq!(sensors_in(&element).len(), 1);

    observer.disconnect();
    element.remove();
}

#[wasm_bindgen_test]
async fn style_change_reaches_the_callback() {
    let element = connected_element();
    let (observer, calls) = recording_observer();
    observer.observe(&element, ObserveOptions::variables(["--gap", "--weight"]));
    settle().await;

    element.style().set_property("--gap", "12px").unwrap();
    element.style().set_property("--weight", "700").unwrap();
    settle().await;

    {
        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
        let changeset = &calls[0][0];
        assert_eq!(changeset.element(), &element);
        assert_eq!(changeset.get("--gap").map(str::trim), Some("12px"));
        assert_eq!(changeset.get("--weight").map(str::trim), Some("700"));
    }

    observer.disconnect();
    element.remove();
}

#[wasm_bindgen_test]
async fn disconnect_removes_sensors_and_silences_the_callback() {
    let element = connected_element();
    let (observer, calls) = recording_observer();
    observer.observe(&element, ObserveOptions::variables(["--gap"]));
    settle().await;

    observer.disconnect();
    assert!(sensors_in(&element).is_empty());
    assert_eq!(observer.observed_count(), 0);

    element.style().set_property("--gap", "3px").unwrap();
    settle().await;
    assert!(calls.borrow().is_empty());

    element.remove();
}

#[wasm_bindgen_test]
async fn observers_only_hear_their_own_sensors() {
    let element = connected_element();
    let (first, first_calls) = recording_observer();
    let (second, second_calls) = recording_observer();
    first.observe(&element, ObserveOptions::variables(["--gap"]));
    second.observe(&element, ObserveOptions::variables(["--size"]));
    settle().await;

    element.style().set_property("--size", "2em").unwrap();
    settle().await;

    assert!(first_calls.borrow().is_empty());
    assert_eq!(second_calls.borrow().len(), 1);

    first.disconnect();
    second.disconnect();
    element.remove();
}

#[wasm_bindgen_test]
async fn take_records_returns_pending_changesets() {
    let element = connected_element();
    let (observer, calls) = recording_observer();
    observer.observe(&element, ObserveOptions::variables(["--gap"]));
    settle().await;

    element.style().set_property("--gap", "5px").unwrap();
    // Let the transition start; the agent flush is a task away.
    Timer::sleep(20).await;
    let records = observer.take_records();
    settle().await;

    // The signal may already have been flushed on a slow runner.
    let delivered = records.len() + calls.borrow().iter().map(Vec::len).sum::<usize>();
    assert_eq!(delivered, 1);

    observer.disconnect();
    element.remove();
}

#[wasm_bindgen_test]
async fn removed_sensor_is_detached_and_reattached() {
    let element = connected_element();
    let (observer, calls) = recording_observer();
    observer.observe(&element, ObserveOptions::variables(["--gap"]));
    settle().await;

    element.remove();
    settle().await;
    element.style().set_property("--gap", "1px").unwrap();
    settle().await;
    assert!(calls.borrow().is_empty());

    document().body().unwrap().append_child(&element).unwrap();
    settle().await;
    element.style().set_property("--gap", "9px").unwrap();
    settle().await;
    let last = calls.borrow().last().cloned().unwrap();
    assert_eq!(last[0].get("--gap").map(str::trim), Some("9px"));

    observer.disconnect();
    element.remove();
    assert_eq!(DomPlatform::current().mounted_count(), 0);
}

#[wasm_bindgen_test]
async fn clearing_the_host_releases_its_sensor() {
    let platform = DomPlatform::current();
    let baseline = platform.mounted_count();
    let element = connected_element();
    let (observer, calls) = recording_observer();
    observer.observe(&element, ObserveOptions::variables(["--gap"]));
    settle().await;

    element.set_inner_html("");
    settle().await;
    assert_eq!(platform.mounted_count(), baseline);
    assert_eq!(observer.observed_count(), 0);

    observer.observe(&element, ObserveOptions::variables(["--gap"]));
    settle().await;
    assert_eq!(platform.mounted_count(), baseline + 1);
    assert_eq!(observer.observed_count(), 1);
    assert_eq!(sensors_in(&element).len(), 1);

    element.style().set_property("--gap", "4px").unwrap();
    settle().await;
    assert_eq!(calls.borrow().len(), 1);

    observer.disconnect();
    element.remove();
}

#[wasm_bindgen_test]
async fn reobserving_right_after_clearing_keeps_one_sensor() {
    let platform = DomPlatform::current();
    let baseline = platform.mounted_count();
    let element = connected_element();
    let (observer, _calls) = recording_observer();
    observer.observe(&element, ObserveOptions::variables(["--gap"]));

    element.set_inner_html("");
    observer.observe(&element, ObserveOptions::variables(["--gap"]));
    settle().await;

    assert_eq!(platform.mounted_count(), baseline + 1);
    assert_eq!(observer.observed_count(), 1);

    observer.disconnect();
    element.remove();
}
