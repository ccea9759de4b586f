use actix_web::rt;
use actix_web::web;
use chrono::Duration;

use crate::config::{MAX_RETENTION_SECS, RetentionConfig};

use super::image_store::ImageStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    pub max_age: Option<Duration>,
    pub sweep_interval: std::time::Duration,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_age: config
                .max_age_secs
                .map(|secs| {
                    i64::try_from(secs)
                        .ok()
                        .and_then(Duration::try_seconds)
                        .unwrap_or(Duration::MAX)
                }),
            sweep_interval: std::time::Duration::from_secs(
                config.sweep_interval_secs.clamp(1, MAX_RETENTION_SECS),
            ),
        }
    }
}

/// Starts the background sweeper when the policy has a max age. Returns
/// whether a sweeper was started.
pub fn spawn_sweeper(store: ImageStore, policy: RetentionPolicy) -> bool {
    let Some(max_age) = policy.max_age else {
        log::info!("Artifact retention: keep forever (no max age configured)");
        return false;
    };

    log::info!(
        "Artifact retention: delete after {}s, sweeping every {}s",
        max_age.num_seconds(),
        policy.sweep_interval.as_secs()
    );

    rt::spawn(async move {
        let mut interval = rt::time::interval(policy.sweep_interval);
        loop {
            interval.tick().await;
            let store = store.clone();
            match web::block(move || store.sweep_expired(max_age)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => log::info!("Retention sweep removed {} files", removed),
                Ok(Err(e)) => log::error!("Retention sweep failed: {}", e),
                Err(e) => log::error!("Retention sweep could not run: {}", e),
            }
        }
    });
    true
}
