//! Realtime events delivered to project subscribers.
//!
//! Every presence change and relayed entity mutation is a
//! [`RealtimeEvent`]. Events are transient: they are fanned out to the
//! connections currently subscribed to the project and never persisted.

use serde::{Deserialize, Serialize};

use super::{ProjectId, UserId};

/// Event broadcast to the members of a project room.
///
/// Serializes to the wire format directly: the variant name becomes the
/// `type` field and entity payloads are flattened alongside `projectId`,
/// so a `task:updated` event carries the full updated entity at the top
/// level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    /// A user's connection joined the project room.
    #[serde(rename = "user:joined", rename_all = "camelCase")]
    UserJoined {
        /// The joining user.
        user_id: UserId,
        /// The project whose room was joined.
        project_id: ProjectId,
    },

    /// A user's connection left the project room (or disconnected).
    #[serde(rename = "user:left", rename_all = "camelCase")]
    UserLeft {
        /// The departing user.
        user_id: UserId,
        /// The project whose room was left.
        project_id: ProjectId,
    },

    /// A task belonging to the project changed.
    #[serde(rename = "task:updated", rename_all = "camelCase")]
    TaskUpdated {
        /// The project the task belongs to.
        project_id: ProjectId,
        /// The updated entity, relayed verbatim.
        #[serde(flatten)]
        entity: serde_json::Value,
    },

    /// The project itself changed.
    #[serde(rename = "project:updated", rename_all = "camelCase")]
    ProjectUpdated {
        /// The changed project.
        project_id: ProjectId,
        /// The updated entity, relayed verbatim.
        #[serde(flatten)]
        entity: serde_json::Value,
    },
}

impl RealtimeEvent {
    /// Returns the project this event is scoped to.
    #[must_use]
    pub fn project_id(&self) -> &ProjectId {
        match self {
            Self::UserJoined { project_id, .. }
            | Self::UserLeft { project_id, .. }
            | Self::TaskUpdated { project_id, .. }
            | Self::ProjectUpdated { project_id, .. } => project_id,
        }
    }

    /// Returns the wire `type` tag as a static string slice.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::UserJoined { .. } => "user:joined",
            Self::UserLeft { .. } => "user:left",
            Self::TaskUpdated { .. } => "task:updated",
            Self::ProjectUpdated { .. } => "project:updated",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn user_id() -> UserId {
        UserId::from_uuid(uuid::Uuid::new_v4())
    }

    #[test]
    fn user_joined_wire_shape() {
        let event = RealtimeEvent::UserJoined {
            user_id: user_id(),
            project_id: ProjectId::new("p1"),
        };
        let json = serde_json::to_value(&event).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("user:joined"));
        assert_eq!(json.get("projectId").and_then(|v| v.as_str()), Some("p1"));
        assert!(json.get("userId").is_some());
    }

    #[test]
    fn task_updated_flattens_entity() {
        let event = RealtimeEvent::TaskUpdated {
            project_id: ProjectId::new("p1"),
            entity: serde_json::json!({"id": "t1", "status": "done"}),
        };
        let json = serde_json::to_value(&event).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("task:updated"));
        assert_eq!(json.get("id").and_then(|v| v.as_str()), Some("t1"));
        assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("done"));
    }

    #[test]
    fn project_id_accessor() {
        let event = RealtimeEvent::ProjectUpdated {
            project_id: ProjectId::new("p9"),
            entity: serde_json::json!({}),
        };
        assert_eq!(event.project_id().as_str(), "p9");
        assert_eq!(event.kind_str(), "project:updated");
    }

    #[test]
    fn deserializes_from_wire_format() {
        let json = r#"{"type":"user:left","userId":"7f1e0a54-9161-4c3e-8e9a-0d1c72f2a111","projectId":"p2"}"#;
        let event: Option<RealtimeEvent> = serde_json::from_str(json).ok();
        let Some(RealtimeEvent::UserLeft { project_id, .. }) = event else {
            panic!("expected user:left event");
        };
        assert_eq!(project_id.as_str(), "p2");
    }
}
