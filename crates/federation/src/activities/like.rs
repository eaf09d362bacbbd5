//! Like activity.

use serde_json::json;

use super::{Activity, ActivityKind};

/// Like `object_uri`, addressed to its author.
#[must_use]
pub fn like(id: &str, actor: &str, object_uri: &str, author: &str) -> Activity {
    Activity::envelope(
        ActivityKind::Like,
        id,
        actor,
        json!(object_uri),
        &[author.to_string()],
        &[],
    )
}
