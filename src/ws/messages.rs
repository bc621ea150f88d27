//! Client → server WebSocket message types.
//!
//! Server → client traffic is [`crate::domain::RealtimeEvent`] serialized
//! directly; this module holds the inbound command set. All messages are
//! JSON with a `type` tag.

use serde::{Deserialize, Serialize};

use crate::domain::ProjectId;

/// Commands and updates a client can send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to a project's room.
    #[serde(rename = "join-project", rename_all = "camelCase")]
    JoinProject {
        /// The project to join.
        project_id: ProjectId,
    },

    /// Unsubscribe from a project's room.
    #[serde(rename = "leave-project", rename_all = "camelCase")]
    LeaveProject {
        /// The project to leave.
        project_id: ProjectId,
    },

    /// A task changed; relay it to the project's other members.
    #[serde(rename = "task:update", rename_all = "camelCase")]
    TaskUpdate {
        /// The project the task belongs to.
        project_id: ProjectId,
        /// The updated entity, passed through untouched.
        #[serde(flatten)]
        entity: serde_json::Value,
    },

    /// The project changed; relay it to the other members.
    #[serde(rename = "project:update", rename_all = "camelCase")]
    ProjectUpdate {
        /// The changed project.
        project_id: ProjectId,
        /// The updated entity, passed through untouched.
        #[serde(flatten)]
        entity: serde_json::Value,
    },
}

impl ClientMessage {
    /// Returns the project this message targets.
    #[must_use]
    pub fn project_id(&self) -> &ProjectId {
        match self {
            Self::JoinProject { project_id }
            | Self::LeaveProject { project_id }
            | Self::TaskUpdate { project_id, .. }
            | Self::ProjectUpdate { project_id, .. } => project_id,
        }
    }
}
