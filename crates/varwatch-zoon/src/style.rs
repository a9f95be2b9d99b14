//! Names and inline styles of the detection subtree.

/// Tag of the element inserted as the last child of every observed element.
pub const SENSOR_TAG: &str = "var-sensor";

/// Stamped on the sensor with the owning Observer's id.
pub const OWNER_ATTRIBUTE: &str = "data-observer-id";

/// Carries the watched variable name on each detection node.
pub const VARIABLE_ATTRIBUTE: &str = "data-variable";

/// Bubbles from the sensor to the document root with one changeset.
pub const CHANGE_EVENT: &str = "varwatch-change";

pub const SIGNAL_EVENT: &str = "transitionstart";

/// Keeps the sensor out of layout, paint and hit testing.
pub const HIDDEN_SENSOR_CSS: &str = "position: absolute; width: 0; height: 0; overflow: hidden; z-index: -1; visibility: hidden;";

/// Inline style of the detection node for `variable`.
///
/// Both properties resolve through the variable, so any change of its value
/// that changes either computed value starts a near-instant transition.
/// `font-size` catches lengths, `font-variation-settings` catches numbers.
pub fn detection_node_css(variable: &str) -> String {
    format!(
        "transition: font-size 0.001ms step-start, font-variation-settings 0.001ms step-start; \
         font-variation-settings: \"wght\" var({variable}, 0); \
         font-size: var({variable}, 0);"
    )
}
