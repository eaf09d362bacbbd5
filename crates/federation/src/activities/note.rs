//! Note object and the Create, Update and Delete activities around it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use super::{Activity, ActivityKind};

/// Entry of a Note's `tag` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Tag {
    /// `{type: Hashtag, href: https://{domain}/tags/{tag}, name: "#tag"}`.
    Hashtag {
        /// Tag page.
        href: String,
        /// `#tag` as written.
        name: String,
    },
    /// `{type: Mention, href: <actor uri>, name: "@user@host"}`.
    Mention {
        /// Actor URI.
        href: String,
        /// Handle as written.
        name: String,
    },
}

/// `ActivityPub` Note object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteObject {
    /// Note IRI.
    pub id: String,
    /// Author actor URI.
    pub attributed_to: String,
    /// Rendered HTML.
    pub content: String,
    /// Source text.
    #[serde(skip)]
    pub source: String,
    /// Creation time.
    #[serde(serialize_with = "serialize_time")]
    pub published: DateTime<Utc>,
    /// Last edit time.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_time"
    )]
    pub updated: Option<DateTime<Utc>>,
    /// Parent note IRI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Primary audience.
    pub to: Vec<String>,
    /// Secondary audience.
    pub cc: Vec<String>,
    /// Hashtags and mentions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Tag>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_time<S: serde::Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[allow(clippy::ref_option)]
fn serialize_opt_time<S: serde::Serializer>(
    t: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match t {
        Some(t) => serialize_time(t, s),
        None => s.serialize_none(),
    }
}

impl NoteObject {
    /// The object as JSON, with `type` and the Markdown `source` attached.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.insert("type".to_string(), json!("Note"));
            map.insert(
                "source".to_string(),
                json!({"content": self.source, "mediaType": "text/markdown"}),
            );
        }
        value
    }
}

/// Create a note. Addressing is copied from the note.
#[must_use]
pub fn create_note(id: &str, note: &NoteObject) -> Activity {
    Activity::envelope(
        ActivityKind::Create,
        id,
        &note.attributed_to,
        note.to_value(),
        &note.to,
        &note.cc,
    )
}

/// Announce an edit. `note.updated` should be set.
#[must_use]
pub fn update_note(id: &str, note: &NoteObject) -> Activity {
    Activity::envelope(
        ActivityKind::Update,
        id,
        &note.attributed_to,
        note.to_value(),
        &note.to,
        &note.cc,
    )
}

/// Delete a note, referencing it as a Tombstone.
#[must_use]
pub fn delete_note(id: &str, actor: &str, note_uri: &str, to: &[String], cc: &[String]) -> Activity {
    Activity::envelope(
        ActivityKind::Delete,
        id,
        actor,
        json!({"id": note_uri, "type": "Tombstone"}),
        to,
        cc,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tern_common::PUBLIC_COLLECTION;

    fn sample_note() -> NoteObject {
        NoteObject {
            id: "https://example.com/notes/01".to_string(),
            attributed_to: "https://example.com/users/alice".to_string(),
            content: "<p>hi <a href=\"https://example.com/tags/rust\">#rust</a></p>".to_string(),
            source: "hi #rust".to_string(),
            published: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            updated: None,
            in_reply_to: None,
            to: vec![PUBLIC_COLLECTION.to_string()],
            cc: vec!["https://example.com/users/alice/followers".to_string()],
            tag: vec![Tag::Hashtag {
                href: "https://example.com/tags/rust".to_string(),
                name: "#rust".to_string(),
            }],
        }
    }

    #[test]
    fn test_create_note_shape() {
        let activity = create_note("https://example.com/activities/c1", &sample_note());
        let value = activity.clone().into_value();

        assert_eq!(value["@context"], "https://www.w3.org/ns/activitystreams");
        assert_eq!(value["type"], "Create");
        assert_eq!(value["actor"], "https://example.com/users/alice");
        assert_eq!(value["to"][0], PUBLIC_COLLECTION);
        assert_eq!(value["object"]["type"], "Note");
        assert_eq!(value["object"]["attributedTo"], "https://example.com/users/alice");
        assert_eq!(value["object"]["published"], "2025-01-02T03:04:05Z");
        assert_eq!(value["object"]["tag"][0]["type"], "Hashtag");
        assert_eq!(value["object"]["tag"][0]["name"], "#rust");
        assert_eq!(value["object"]["source"]["content"], "hi #rust");
        assert!(value["object"].get("inReplyTo").is_none());
        assert!(value["object"].get("updated").is_none());
        assert!(activity.validate().is_ok());
    }

    #[test]
    fn test_update_note_carries_updated() {
        let mut note = sample_note();
        note.updated = Some(Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap());
        note.in_reply_to = Some("https://remote.example/notes/9".to_string());

        let value = update_note("https://example.com/activities/u1", &note).into_value();
        assert_eq!(value["type"], "Update");
        assert_eq!(value["object"]["updated"], "2025-01-03T00:00:00Z");
        assert_eq!(value["object"]["inReplyTo"], "https://remote.example/notes/9");
    }

    #[test]
    fn test_delete_note_uses_tombstone() {
        let value = delete_note(
            "https://example.com/activities/d1",
            "https://example.com/users/alice",
            "https://example.com/notes/01",
            &[PUBLIC_COLLECTION.to_string()],
            &["https://example.com/users/alice/followers".to_string()],
        )
        .into_value();
        assert_eq!(value["type"], "Delete");
        assert_eq!(value["object"]["type"], "Tombstone");
        assert_eq!(value["object"]["id"], "https://example.com/notes/01");
    }
}
