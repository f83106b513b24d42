use crate::api::ApiServer;
use crate::catalog::ContentCatalog;
use crate::config::Config;
use crate::media::{self, FfmpegPusher};
use crate::occupancy::NameClassifier;
use crate::reconcile::injection::Injector;
use crate::reconcile::reaper::Reaper;
use crate::reconcile::recording::RecordingController;
use crate::reconcile::status::StatusHandle;
use crate::reconcile::Reconciler;
use crate::registry::RedisRegistry;
use crate::rtc::RtcClient;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting roomwarden service");

    let config = Config::load()?;
    let credentials = config.server.resolve()?;

    if !media::ffmpeg_available() {
        warn!("ffmpeg not found on PATH; waiting-room video injection will fail");
    }

    let client = Arc::new(RtcClient::new(
        &credentials.url,
        &credentials.api_key,
        &credentials.api_secret,
    ));
    let registry = Arc::new(RedisRegistry::new(&config.registry)?);
    let classifier = Arc::new(NameClassifier::from_config(&config.classifier));
    let catalog = Arc::new(ContentCatalog::new(&config.injection.catalog_url));
    let pusher = Arc::new(FfmpegPusher);
    let status = StatusHandle::default();

    let recording = RecordingController::new(
        client.clone(),
        config.recording.clone(),
        status.clone(),
    );
    let injector = Injector::new(
        client.clone(),
        catalog,
        pusher,
        classifier.clone(),
        config.injection.clone(),
        config.classifier.injector_identity.clone(),
    );
    let reaper = Reaper::new(client.clone(), classifier.clone(), config.reaper.clone());

    let api_server = ApiServer::new(config.service.api_port, status.clone());
    let _ = tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("Status API failed: {}", e);
        }
    });

    info!("Managing rooms at {}", credentials.url);
    let reconciler = Reconciler::new(
        client,
        registry,
        classifier,
        recording,
        injector,
        reaper,
        status,
        &config,
    );

    reconciler.run().await;

    Ok(())
}
