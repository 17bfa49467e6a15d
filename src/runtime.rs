// Process wiring: bus, pollers, controller, sequencer, dispatcher
//
// Motors are braked on startup and left floating on shutdown. The sensor
// pollers run on their own threads; everything else runs on tokio.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{BIND_ADDR, Calibration, I2C_BUS, POLL_INTERVAL};
use crate::control::Controller;
use crate::dispatch::Dispatcher;
use crate::motor::{I2cBus, MockBus, MotorActuator, SharedBus, shared};
use crate::moving::MovingFlag;
use crate::sensors::{SensorData, SensorPollers};
use crate::sequencer::Sequencer;
use crate::telemetry;

pub type RuntimeError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// I2C device the boards are attached to
    pub i2c: String,
    /// Command server address
    pub bind: String,
    pub calibration: Option<PathBuf>,
    /// Run against an in-memory bus instead of the hardware
    pub dry_run: bool,
    /// Publish sensors and progress over zenoh
    pub telemetry: bool,
    /// Skip zeroing the lift encoders at startup
    pub skip_zero: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            i2c: I2C_BUS.to_string(),
            bind: BIND_ADDR.to_string(),
            calibration: None,
            dry_run: false,
            telemetry: false,
            skip_zero: false,
        }
    }
}

fn open_bus(options: &RuntimeOptions) -> Result<SharedBus, RuntimeError> {
    if options.dry_run {
        warn!("Dry run: bus traffic goes to an in-memory mock");
        return Ok(shared(MockBus::dry_run()));
    }
    Ok(shared(I2cBus::open(&options.i2c)?))
}

pub async fn run(options: RuntimeOptions) -> Result<(), RuntimeError> {
    let cal = match &options.calibration {
        Some(path) => {
            info!("Loading calibration from {}", path.display());
            Calibration::from_file(path)?
        }
        None => Calibration::default(),
    };

    let bus = open_bus(&options)?;
    let actuator = MotorActuator::new(bus.clone(), cal.speed_scale);
    let sensors = Arc::new(SensorData::new());
    let pollers = SensorPollers::spawn(
        actuator.clone(),
        bus,
        sensors.clone(),
        cal.ir_model,
        POLL_INTERVAL,
    )?;

    let controller = Arc::new(Controller::new(actuator));
    controller.emergency_stop()?;

    let moving = MovingFlag::new();
    let sequencer = Arc::new(Sequencer::new(
        controller.clone(),
        sensors.clone(),
        moving.clone(),
        cal,
    ));

    if options.telemetry {
        let progress = sequencer.subscribe();
        let sensors = sensors.clone();
        tokio::spawn(async move {
            if let Err(e) = telemetry::run(sensors, progress).await {
                error!("Telemetry stopped: {}", e);
            }
        });
    }

    if options.skip_zero || options.dry_run {
        info!("Skipping encoder zeroing");
    } else if let Err(e) = sequencer.zero().await {
        // stay up so the lifts can be driven by hand
        error!("Startup zeroing failed: {}", e);
    }

    let listener = TcpListener::bind(&options.bind).await?;
    let dispatcher = Dispatcher::new(sequencer);

    info!("Runtime started, press Ctrl-C to stop");
    let result: Result<(), RuntimeError> = tokio::select! {
        served = dispatcher.serve(listener) => served.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
    };

    moving.clear();
    if let Err(e) = controller.float_all() {
        warn!("Failed to float motors: {}", e);
    }
    pollers.stop();
    result
}
