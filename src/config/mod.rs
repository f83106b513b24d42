use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub routing: RoutingConfig,
    pub classifier: ClassifierConfig,
    pub recording: RecordingConfig,
    pub injection: InjectionConfig,
    pub reaper: ReaperConfig,
    pub service: ServiceConfig,
}

/// RTC control-plane endpoint and credentials.
///
/// Key and secret may be left out of the file and provided via the
/// `LIVEKIT_URL` / `LIVEKIT_API_KEY` / `LIVEKIT_API_SECRET` environment
/// variables instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

/// Resolved control-plane credentials, validated at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl ServerConfig {
    /// Resolve credentials from config and environment. Missing credentials
    /// are fatal at startup; everything downstream assumes they exist.
    pub fn resolve(&self) -> Result<Credentials> {
        let url = std::env::var("LIVEKIT_URL").unwrap_or_else(|_| self.url.clone());
        let api_key = std::env::var("LIVEKIT_API_KEY")
            .ok()
            .or_else(|| self.api_key.clone());
        let api_secret = std::env::var("LIVEKIT_API_SECRET")
            .ok()
            .or_else(|| self.api_secret.clone());

        let Some(api_key) = api_key.filter(|k| !k.is_empty()) else {
            bail!("No control-plane API key configured (set server.api_key or LIVEKIT_API_KEY)");
        };
        let Some(api_secret) = api_secret.filter(|s| !s.is_empty()) else {
            bail!("No control-plane API secret configured (set server.api_secret or LIVEKIT_API_SECRET)");
        };

        Ok(Credentials {
            url,
            api_key,
            api_secret,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7880".to_string(),
            api_key: None,
            api_secret: None,
        }
    }
}

/// Dynamic room registry store (shared key/value hash of online rooms).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub hash_key: String,
    pub timeout_seconds: u64,
    /// Rooms always treated as registered, on top of whatever the store holds.
    pub fixed_rooms: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            hash_key: "room:online".to_string(),
            timeout_seconds: 3,
            fixed_rooms: vec!["clinic".to_string()],
        }
    }
}

/// Maps a room-name prefix to the automated worker dispatched there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub routes: Vec<RouteRule>,
    /// Worker used for rooms known only through the dynamic registry.
    pub registry_agent: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routes: vec![
                RouteRule {
                    prefix: "Registration".to_string(),
                    agent: "medical_agent".to_string(),
                },
                RouteRule {
                    prefix: "Clinic".to_string(),
                    agent: "assistant_agent".to_string(),
                },
                RouteRule {
                    prefix: "Meeting".to_string(),
                    agent: "record_agent".to_string(),
                },
                RouteRule {
                    prefix: "Test".to_string(),
                    agent: "test_agent".to_string(),
                },
            ],
            registry_agent: "assistant_agent".to_string(),
        }
    }
}

/// Naming conventions for the legacy substring classifier. These are owned
/// by the upstream systems that mint identities; we only consume them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub staff_markers: Vec<String>,
    pub worker_suffix: String,
    pub injector_identity: String,
    pub recorder_identities: Vec<String>,
    pub recorder_prefix: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            staff_markers: vec!["dr".to_string()],
            worker_suffix: "_agent".to_string(),
            injector_identity: "ingress_agent".to_string(),
            recorder_identities: vec!["record_agent".to_string(), "record".to_string()],
            recorder_prefix: "EG_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Real participants required before a composite recording starts.
    pub min_real_participants: usize,
    pub output_prefix: String,
    pub profile: EncodingProfile,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            min_real_participants: 2,
            output_prefix: "default/recordings".to_string(),
            profile: EncodingProfile::default(),
        }
    }
}

/// Fixed encoding profile sent verbatim to the egress service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProfile {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub video_codec: String,
    /// kbps
    pub video_bitrate: u32,
    pub key_frame_interval: u32,
    pub audio_codec: String,
    /// kbps
    pub audio_bitrate: u32,
    pub audio_frequency: u32,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30,
            video_codec: "H264_MAIN".to_string(),
            video_bitrate: 1000,
            key_frame_interval: 4,
            audio_codec: "AAC".to_string(),
            audio_bitrate: 96,
            audio_frequency: 22050,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Content-catalog endpoint serving the waiting-room layout.
    pub catalog_url: String,
    /// Seconds to wait after bridge creation before pushing media.
    pub settle_delay_seconds: u64,
    /// Total push budget per injection, in seconds.
    pub max_duration_seconds: u64,
    /// Cooldown before restarting an early-exited push process.
    pub restart_cooldown_seconds: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            catalog_url:
                "https://content.example.net/api/layouts?filters[name][$eq]=WAITINGROOM&populate[banners]=true"
                    .to_string(),
            settle_delay_seconds: 3,
            max_duration_seconds: 3600,
            restart_cooldown_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Delay before removing the automated worker when the injector bot is
    /// also present (hand-off to the waiting-video flow).
    pub worker_handoff_delay_seconds: u64,
    /// Delay before removing the recording worker left alone with one real
    /// participant.
    pub lone_recorder_delay_seconds: u64,
    /// Worker dispatched after the injector bot is removed from a crowded room.
    pub handoff_agent: String,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            worker_handoff_delay_seconds: 5,
            lone_recorder_delay_seconds: 30,
            handoff_agent: "record_agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub poll_interval_ms: u64,
    pub api_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            api_port: 3860,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
