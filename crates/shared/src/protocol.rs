use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionId, ConnectionStatus, ProfileId, Role, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl BasicUser {
    /// Full name when the account carries one, otherwise the username.
    pub fn display_name(&self) -> String {
        match (self.first_name.trim(), self.last_name.trim()) {
            ("", "") => self.username.clone(),
            (first, "") => first.to_string(),
            ("", last) => last.to_string(),
            (first, last) => format!("{first} {last}"),
        }
    }
}

/// Trimmed profile nested inside connection records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCard {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub requester: BasicUser,
    pub receiver: BasicUser,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requester_profile: Option<ProfileCard>,
    #[serde(default)]
    pub receiver_profile: Option<ProfileCard>,
}

/// The three-way partition served by `GET connections/`. A bucket key the
/// server leaves out deserializes as an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionBuckets {
    #[serde(default)]
    pub incoming: Vec<ConnectionRecord>,
    #[serde(default)]
    pub outgoing: Vec<ConnectionRecord>,
    #[serde(default)]
    pub current: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequestBody {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReviewBody {
    pub action: ReviewDecision,
}

/// Viewer-relative standing reported on discovery/profile payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStanding {
    #[default]
    None,
    #[serde(rename = "self")]
    Own,
    Connected,
    PendingSent,
    PendingReceived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: ProfileId,
    pub user: BasicUser,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub skills_list: Vec<String>,
    #[serde(default)]
    pub interests_list: Vec<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(rename = "connectionStatus", default)]
    pub connection_status: RelationshipStanding,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Own-profile update payload. Skills and interests travel as the backend's
/// comma-separated strings; use [`crate::tags`] to build them from lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

/// DRF-style page envelope returned by list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: i64, username: &str, first: &str, last: &str) -> BasicUser {
        BasicUser {
            id: UserId(id),
            username: username.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    #[test]
    fn display_name_prefers_full_name_then_partials_then_username() {
        assert_eq!(user(1, "ada", "Ada", "Lovelace").display_name(), "Ada Lovelace");
        assert_eq!(user(1, "ada", "Ada", "").display_name(), "Ada");
        assert_eq!(user(1, "ada", "", "Lovelace").display_name(), "Lovelace");
        assert_eq!(user(1, "ada", "", "").display_name(), "ada");
        assert_eq!(user(1, "ada", "  ", " ").display_name(), "ada");
    }

    #[test]
    fn missing_bucket_keys_deserialize_as_empty() {
        let buckets: ConnectionBuckets =
            serde_json::from_value(json!({ "incoming": [] })).expect("buckets");
        assert!(buckets.incoming.is_empty());
        assert!(buckets.outgoing.is_empty());
        assert!(buckets.current.is_empty());
    }

    #[test]
    fn connection_record_parses_backend_shape() {
        let record: ConnectionRecord = serde_json::from_value(json!({
            "id": 7,
            "requester": { "id": 2, "username": "mia", "first_name": "Mia", "last_name": "Wong" },
            "receiver": { "id": 5, "username": "casey", "first_name": "", "last_name": "" },
            "status": "accepted",
            "created_at": "2024-05-01T12:00:00Z",
            "accepted_at": "2024-05-02T09:30:00Z",
            "requester_profile": { "role": "mentor", "profile_picture_url": null },
            "receiver_profile": { "role": null, "profile_picture_url": null }
        }))
        .expect("record");
        assert_eq!(record.id, ConnectionId(7));
        assert_eq!(record.status, ConnectionStatus::Accepted);
        assert!(record.accepted_at.is_some());
        assert_eq!(
            record.requester_profile.and_then(|card| card.role),
            Some(Role::Mentor)
        );
    }

    #[test]
    fn relationship_standing_matches_backend_values() {
        for (raw, expected) in [
            ("none", RelationshipStanding::None),
            ("self", RelationshipStanding::Own),
            ("connected", RelationshipStanding::Connected),
            ("pending_sent", RelationshipStanding::PendingSent),
            ("pending_received", RelationshipStanding::PendingReceived),
        ] {
            let parsed: RelationshipStanding =
                serde_json::from_value(json!(raw)).expect("standing");
            assert_eq!(parsed, expected);
        }
    }

    #[test]
    fn review_body_serializes_action_field() {
        let body = serde_json::to_value(ConnectionReviewBody {
            action: ReviewDecision::Accept,
        })
        .expect("body");
        assert_eq!(body, json!({ "action": "accept" }));
    }

    #[test]
    fn paginated_page_parses_drf_envelope() {
        let page: Paginated<BasicUser> = serde_json::from_value(json!({
            "count": 3,
            "next": "http://testserver/api/users/?page=2",
            "previous": null,
            "results": [
                { "id": 1, "username": "ada", "first_name": "", "last_name": "" }
            ]
        }))
        .expect("page");
        assert_eq!(page.count, 3);
        assert_eq!(page.results.len(), 1);
        assert!(page.previous.is_none());
    }
}
