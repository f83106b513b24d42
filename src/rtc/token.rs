//! Access tokens for the RTC control plane.
//!
//! Every request carries a short-lived HS256 JWT whose video grants are
//! scoped to the operation being performed.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoGrants {
    #[serde(skip_serializing_if = "is_false")]
    pub room_join: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub room_list: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub room_admin: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub room_record: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub ingress_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub iss: String,
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrants,
}

pub struct AccessToken {
    api_key: String,
    api_secret: String,
    identity: String,
    ttl: Duration,
    grants: VideoGrants,
}

impl AccessToken {
    pub fn new(api_key: &str, api_secret: &str, identity: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            identity: identity.to_string(),
            ttl: DEFAULT_TTL,
            grants: VideoGrants::default(),
        }
    }

    pub fn with_grants(mut self, grants: VideoGrants) -> Self {
        self.grants = grants;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn to_jwt(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: self.api_key.clone(),
            sub: self.identity.clone(),
            nbf: now,
            exp: now + self.ttl.as_secs() as i64,
            video: self.grants.clone(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    fn decode_claims(jwt: &str, secret: &str) -> Claims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        decode::<Claims>(jwt, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn test_token_carries_identity_and_grants() {
        let jwt = AccessToken::new("devkey", "devsecret", "egress_agent_ClinicA")
            .with_grants(VideoGrants {
                room_join: true,
                room_record: true,
                room: Some("ClinicA".to_string()),
                ..Default::default()
            })
            .to_jwt()
            .unwrap();

        let claims = decode_claims(&jwt, "devsecret");
        assert_eq!(claims.iss, "devkey");
        assert_eq!(claims.sub, "egress_agent_ClinicA");
        assert!(claims.video.room_join);
        assert!(claims.video.room_record);
        assert!(!claims.video.ingress_admin);
        assert_eq!(claims.video.room.as_deref(), Some("ClinicA"));
    }

    #[test]
    fn test_token_ttl() {
        let jwt = AccessToken::new("k", "s", "roomwarden")
            .with_ttl(Duration::from_secs(120))
            .to_jwt()
            .unwrap();
        let claims = decode_claims(&jwt, "s");
        assert_eq!(claims.exp - claims.nbf, 120);
    }

    #[test]
    fn test_false_grants_are_omitted() {
        let json = serde_json::to_string(&VideoGrants {
            room_list: true,
            ..Default::default()
        })
        .unwrap();
        assert!(json.contains("roomList"));
        assert!(!json.contains("roomRecord"));
        assert!(!json.contains("room\":"));
    }
}
