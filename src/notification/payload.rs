use serde::Serialize;
use serde_json::{Map, Value};

// -----------------------------------------------------------------------------
// ----- Payload ---------------------------------------------------------------

/// JSON body of a notification: the `aps` dictionary plus any custom
/// top-level keys the app understands.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Payload {
    pub aps: Aps,

    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,

    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Alert {
    Body(String),
    Dict(AlertDict),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AlertDict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(rename = "action-loc-key", skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,

    #[serde(rename = "loc-key", skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,

    #[serde(rename = "loc-args", skip_serializing_if = "Vec::is_empty")]
    pub loc_args: Vec<String>,

    #[serde(rename = "launch-image", skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- Payload: Builder ------------------------------------------------------

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert(mut self, body: impl Into<String>) -> Self {
        self.aps.alert = Some(Alert::Body(body.into()));
        self
    }

    pub fn alert_dict(mut self, alert: AlertDict) -> Self {
        self.aps.alert = Some(Alert::Dict(alert));
        self
    }

    pub fn badge(mut self, badge: u32) -> Self {
        self.aps.badge = Some(badge);
        self
    }

    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.aps.sound = Some(sound.into());
        self
    }

    pub fn content_available(mut self) -> Self {
        self.aps.content_available = Some(1);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.aps.category = Some(category.into());
        self
    }

    /// Adds a top-level key next to `aps`. A key named `aps` is ignored.
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "aps" {
            self.custom.insert(key, value.into());
        }
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
