//! Client for the RTC control plane (Twirp JSON over HTTP).
//!
//! Covers the room directory, agent dispatch, composite recording (egress)
//! and inbound media bridges (ingress). Every operation the reconciler uses
//! sits behind the [`RoomControl`] trait so the engines can be exercised
//! against an in-memory fake.

pub mod token;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::EncodingProfile;
use token::{AccessToken, VideoGrants};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SERVICE_IDENTITY: &str = "roomwarden";

#[derive(Debug, Error)]
pub enum RtcError {
    /// The target of the operation does not exist (already removed, etc).
    #[error("not found")]
    NotFound,
    #[error("control plane returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("failed to sign access token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub type RtcResult<T> = Result<T, RtcError>;

/// A live room as reported by the directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Room {
    pub name: String,
    #[serde(rename = "numParticipants", alias = "num_participants")]
    pub num_participants: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub muted: bool,
}

/// A participant as reported by the directory. `metadata` is an opaque
/// JSON string minted by whoever issued the participant's token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Participant {
    pub identity: String,
    pub name: String,
    pub metadata: String,
    pub tracks: Vec<TrackInfo>,
}

impl Participant {
    pub fn audio_muted(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == "AUDIO" && t.muted)
    }

    pub fn video_muted(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == "VIDEO" && t.muted)
    }
}

/// An inbound media bridge created for a room.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaBridge {
    #[serde(rename = "ingressId", alias = "ingress_id")]
    pub ingress_id: String,
    pub url: String,
    #[serde(rename = "streamKey", alias = "stream_key")]
    pub stream_key: String,
}

impl MediaBridge {
    pub fn rtmp_target(&self) -> String {
        format!("{}/{}", self.url, self.stream_key)
    }
}

/// Control-plane operations used by the reconciliation engines.
#[async_trait]
pub trait RoomControl: Send + Sync {
    async fn list_rooms(&self) -> RtcResult<Vec<Room>>;
    async fn list_participants(&self, room: &str) -> RtcResult<Vec<Participant>>;
    async fn dispatch_agent(&self, room: &str, agent: &str) -> RtcResult<()>;
    async fn remove_participant(&self, room: &str, identity: &str) -> RtcResult<()>;
    async fn start_room_egress(
        &self,
        room: &str,
        filepath: &str,
        profile: &EncodingProfile,
    ) -> RtcResult<String>;
    async fn stop_egress(&self, egress_id: &str) -> RtcResult<()>;
    async fn create_ingress(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
    ) -> RtcResult<MediaBridge>;
    async fn delete_ingress(&self, ingress_id: &str) -> RtcResult<()>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListRoomsResponse {
    rooms: Vec<Room>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListParticipantsResponse {
    participants: Vec<Participant>,
}

#[derive(Debug, Deserialize)]
struct StartEgressResponse {
    #[serde(rename = "egressId", alias = "egress_id")]
    egress_id: String,
}

pub struct RtcClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl RtcClient {
    pub fn new(url: &str, api_key: &str, api_secret: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }

    fn token(&self, identity: &str, grants: VideoGrants) -> RtcResult<String> {
        Ok(AccessToken::new(&self.api_key, &self.api_secret, identity)
            .with_grants(grants)
            .to_jwt()?)
    }

    async fn twirp<B, R>(
        &self,
        path: &str,
        identity: &str,
        grants: VideoGrants,
        body: &B,
    ) -> RtcResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let jwt = self.token(identity, grants)?;
        let response = self
            .http
            .post(format!("{}/twirp/{}", self.base_url, path))
            .bearer_auth(jwt)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<R>().await?);
        }

        let message = response.text().await.unwrap_or_default();
        // Twirp encodes the error code in the body, e.g. {"code":"not_found",...}.
        if message.to_lowercase().contains("not_found") {
            return Err(RtcError::NotFound);
        }
        Err(RtcError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn admin_grants(room: Option<&str>) -> VideoGrants {
        VideoGrants {
            room_admin: true,
            room_list: true,
            room: room.map(str::to_string),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RoomControl for RtcClient {
    async fn list_rooms(&self) -> RtcResult<Vec<Room>> {
        let response: ListRoomsResponse = self
            .twirp(
                "livekit.RoomService/ListRooms",
                SERVICE_IDENTITY,
                Self::admin_grants(None),
                &json!({}),
            )
            .await?;
        Ok(response.rooms)
    }

    async fn list_participants(&self, room: &str) -> RtcResult<Vec<Participant>> {
        let response: ListParticipantsResponse = self
            .twirp(
                "livekit.RoomService/ListParticipants",
                SERVICE_IDENTITY,
                Self::admin_grants(Some(room)),
                &json!({ "room": room }),
            )
            .await?;
        Ok(response.participants)
    }

    async fn dispatch_agent(&self, room: &str, agent: &str) -> RtcResult<()> {
        let _: serde_json::Value = self
            .twirp(
                "livekit.AgentDispatchService/CreateDispatch",
                SERVICE_IDENTITY,
                Self::admin_grants(Some(room)),
                &json!({ "agent_name": agent, "room": room }),
            )
            .await?;
        Ok(())
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> RtcResult<()> {
        let _: serde_json::Value = self
            .twirp(
                "livekit.RoomService/RemoveParticipant",
                SERVICE_IDENTITY,
                Self::admin_grants(Some(room)),
                &json!({ "room": room, "identity": identity }),
            )
            .await?;
        Ok(())
    }

    async fn start_room_egress(
        &self,
        room: &str,
        filepath: &str,
        profile: &EncodingProfile,
    ) -> RtcResult<String> {
        let identity = format!("egress_agent_{room}");
        let grants = VideoGrants {
            room_join: true,
            room_record: true,
            room: Some(room.to_string()),
            ..Default::default()
        };
        let body = json!({
            "room_name": room,
            "file_outputs": [{ "filepath": filepath, "file_type": "MP4" }],
            "advanced": profile,
        });

        let response: StartEgressResponse = self
            .twirp("livekit.Egress/StartRoomCompositeEgress", &identity, grants, &body)
            .await?;
        Ok(response.egress_id)
    }

    async fn stop_egress(&self, egress_id: &str) -> RtcResult<()> {
        let grants = VideoGrants {
            room_record: true,
            ..Default::default()
        };
        let _: serde_json::Value = self
            .twirp(
                "livekit.Egress/StopEgress",
                SERVICE_IDENTITY,
                grants,
                &json!({ "egress_id": egress_id }),
            )
            .await?;
        Ok(())
    }

    async fn create_ingress(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
    ) -> RtcResult<MediaBridge> {
        let grants = VideoGrants {
            ingress_admin: true,
            ..Default::default()
        };
        let body = json!({
            "input_type": "RTMP_INPUT",
            "name": identity,
            "room_name": room,
            "participant_identity": identity,
            "participant_name": display_name,
        });

        self.twirp("livekit.Ingress/CreateIngress", SERVICE_IDENTITY, grants, &body)
            .await
    }

    async fn delete_ingress(&self, ingress_id: &str) -> RtcResult<()> {
        let grants = VideoGrants {
            ingress_admin: true,
            ..Default::default()
        };
        let _: serde_json::Value = self
            .twirp(
                "livekit.Ingress/DeleteIngress",
                SERVICE_IDENTITY,
                grants,
                &json!({ "ingress_id": ingress_id }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_decodes_both_casings() {
        let camel: Participant = serde_json::from_str(
            r#"{"identity":"ingress_agent","name":"Waiting video","metadata":"","tracks":[{"type":"AUDIO","muted":true}]}"#,
        )
        .unwrap();
        assert_eq!(camel.identity, "ingress_agent");
        assert!(camel.audio_muted());
        assert!(!camel.video_muted());

        let room: Room =
            serde_json::from_str(r#"{"name":"ClinicA","num_participants":3}"#).unwrap();
        assert_eq!(room.num_participants, 3);
        let room: Room = serde_json::from_str(r#"{"name":"ClinicA","numParticipants":2}"#).unwrap();
        assert_eq!(room.num_participants, 2);
    }

    #[test]
    fn test_bridge_rtmp_target() {
        let bridge: MediaBridge = serde_json::from_str(
            r#"{"ingressId":"in_123","url":"rtmp://edge.example.net/live","streamKey":"abc"}"#,
        )
        .unwrap();
        assert_eq!(bridge.rtmp_target(), "rtmp://edge.example.net/live/abc");
    }

    #[test]
    fn test_egress_response_accepts_snake_case() {
        let response: StartEgressResponse =
            serde_json::from_str(r#"{"egress_id":"eg_42"}"#).unwrap();
        assert_eq!(response.egress_id, "eg_42");
    }
}
