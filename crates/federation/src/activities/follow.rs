//! Follow and Accept activities.

use serde_json::json;

use super::{Activity, ActivityKind};

/// Follow `target` as `actor`. The activity id doubles as the follow's uri,
/// so the same call rebuilds the Follow that Accept and Undo embed.
#[must_use]
pub fn follow(id: &str, actor: &str, target: &str) -> Activity {
    Activity::envelope(
        ActivityKind::Follow,
        id,
        actor,
        json!(target),
        &[target.to_string()],
        &[],
    )
}

/// Accept `follow` on behalf of its target.
#[must_use]
pub fn accept_follow(id: &str, actor: &str, follow: Activity) -> Activity {
    let follower = follow.actor().unwrap_or_default().to_string();
    Activity::envelope(
        ActivityKind::Accept,
        id,
        actor,
        follow.into_embedded(),
        &[follower],
        &[],
    )
}
