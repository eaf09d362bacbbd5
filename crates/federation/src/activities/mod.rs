//! `ActivityPub` activity payloads.
//!
//! Every outbound activity is an [`Activity`]: a JSON object that is checked
//! for the keys remote servers require before it is serialized into the
//! delivery queue. One constructor per activity kind lives in the submodules.

mod follow;
mod like;
mod note;

pub use follow::{accept_follow, follow};
pub use like::like;
pub use note::{NoteObject, Tag, create_note, delete_note, update_note};

use activitypub_federation::kinds::activity::{
    AcceptType, CreateType, DeleteType, FollowType, LikeType, UndoType, UpdateType,
};
use serde_json::{Map, Value, json};
use tern_common::AppError;

/// JSON-LD context of every outbound activity.
pub const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Keys an activity must carry.
pub const REQUIRED_KEYS: [&str; 5] = ["@context", "id", "type", "actor", "object"];

/// Activity payload error.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Activity is missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("Activity must be a JSON object")]
    NotAnObject,
    #[error("Invalid activity JSON: {0}")]
    Json(String),
}

impl From<ActivityError> for AppError {
    fn from(e: ActivityError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Activity types this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ActivityKind {
    Create,
    Update,
    Delete,
    Follow,
    Accept,
    Undo,
    Like,
}

impl ActivityKind {
    /// The `type` value, as the ActivityStreams vocabulary serializes it.
    #[must_use]
    pub fn type_value(self) -> Value {
        match self {
            Self::Create => json!(CreateType::Create),
            Self::Update => json!(UpdateType::Update),
            Self::Delete => json!(DeleteType::Delete),
            Self::Follow => json!(FollowType::Follow),
            Self::Accept => json!(AcceptType::Accept),
            Self::Undo => json!(UndoType::Undo),
            Self::Like => json!(LikeType::Like),
        }
    }
}

/// A validated outbound activity.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity(Map<String, Value>);

impl Activity {
    /// Build the common envelope. `to`/`cc` are omitted when empty.
    fn envelope(
        kind: ActivityKind,
        id: &str,
        actor: &str,
        object: Value,
        to: &[String],
        cc: &[String],
    ) -> Self {
        let mut map = Map::new();
        map.insert("@context".to_string(), json!(AS_CONTEXT));
        map.insert("id".to_string(), json!(id));
        map.insert("type".to_string(), kind.type_value());
        map.insert("actor".to_string(), json!(actor));
        map.insert("object".to_string(), object);
        if !to.is_empty() {
            map.insert("to".to_string(), json!(to));
        }
        if !cc.is_empty() {
            map.insert("cc".to_string(), json!(cc));
        }
        Self(map)
    }

    /// Wrap a JSON value, checking the required keys.
    pub fn from_value(value: Value) -> Result<Self, ActivityError> {
        match value {
            Value::Object(map) => {
                let activity = Self(map);
                activity.validate()?;
                Ok(activity)
            }
            _ => Err(ActivityError::NotAnObject),
        }
    }

    /// Parse a serialized activity, checking the required keys.
    pub fn from_json(text: &str) -> Result<Self, ActivityError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ActivityError::Json(e.to_string()))?;
        Self::from_value(value)
    }

    /// Check that every required key is present and non-null.
    pub fn validate(&self) -> Result<(), ActivityError> {
        for key in REQUIRED_KEYS {
            match self.0.get(key) {
                None | Some(Value::Null) => return Err(ActivityError::MissingKey(key)),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validate and serialize for the queue.
    pub fn to_json(&self) -> Result<String, ActivityError> {
        self.validate()?;
        serde_json::to_string(&self.0).map_err(|e| ActivityError::Json(e.to_string()))
    }

    /// `id`.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    /// `type`.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.str_field("type")
    }

    /// `actor`.
    #[must_use]
    pub fn actor(&self) -> Option<&str> {
        self.str_field("actor")
    }

    /// `object`.
    #[must_use]
    pub fn object(&self) -> Option<&Value> {
        self.0.get("object")
    }

    /// A string field.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Addressees in `to` or `cc`.
    #[must_use]
    pub fn audience(&self, key: &str) -> Vec<&str> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// This activity as an embedded object, without `@context`.
    #[must_use]
    pub fn into_embedded(mut self) -> Value {
        self.0.remove("@context");
        Value::Object(self.0)
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Undo a previously sent activity, embedding it as the object.
#[must_use]
pub fn undo(id: &str, actor: &str, inner: Activity, to: &str) -> Activity {
    Activity::envelope(
        ActivityKind::Undo,
        id,
        actor,
        inner.into_embedded(),
        &[to.to_string()],
        &[],
    )
}
