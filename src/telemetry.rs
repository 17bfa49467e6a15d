// Zenoh telemetry: sensor snapshots at a fixed rate, progress events as they happen

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{TELEMETRY_HZ, TOPIC_PROGRESS, TOPIC_SENSORS};
use crate::messages::Progress;
use crate::sensors::SensorData;

pub type TelemetryError = Box<dyn std::error::Error + Send + Sync>;

pub async fn run(
    sensors: Arc<SensorData>,
    mut progress: broadcast::Receiver<Progress>,
) -> Result<(), TelemetryError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let pub_sensors = session.declare_publisher(TOPIC_SENSORS).await?;
    let pub_progress = session.declare_publisher(TOPIC_PROGRESS).await?;
    info!("Publishing to: {}, {}", TOPIC_SENSORS, TOPIC_PROGRESS);

    let mut tick = interval(Duration::from_millis(1000 / TELEMETRY_HZ));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let json = serde_json::to_string(&sensors.snapshot())?;
                pub_sensors.put(json).await?;
            }
            event = progress.recv() => match event {
                Ok(event) => {
                    let json = serde_json::to_string(&event)?;
                    pub_progress.put(json).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Telemetry dropped {} progress event(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
