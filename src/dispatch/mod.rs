// Line-based command server
//
// Each client sends one command per line. Replies and sequencer progress are
// sent back as lines; progress and periodic sensor reports go to every client.
// The client that last issued motion is the controlling client: losing its
// connection clears the moving flag and brakes every motor.

mod command;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

pub use command::{Command, ParseCommandError};

use crate::config::SENSOR_REPORT_INTERVAL;
use crate::control::{Controller, Motion};
use crate::error::Result;
use crate::sequencer::Sequencer;

/// Capacity of the per-client broadcast channel
const LINE_CAPACITY: usize = 128;

pub struct Dispatcher {
    sequencer: Arc<Sequencer>,
    lines: broadcast::Sender<String>,
    controlling: Mutex<Option<u64>>,
    next_client: AtomicU64,
}

impl Dispatcher {
    pub fn new(sequencer: Arc<Sequencer>) -> Arc<Self> {
        let (lines, _) = broadcast::channel(LINE_CAPACITY);
        Arc::new(Self {
            sequencer,
            lines,
            controlling: Mutex::new(None),
            next_client: AtomicU64::new(1),
        })
    }

    /// Accept clients forever. Also forwards progress and sensor reports.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!("Command server listening on {}", listener.local_addr()?);
        tokio::spawn(self.clone().forward_progress());
        tokio::spawn(self.clone().report_sensors());

        loop {
            let (stream, addr) = listener.accept().await?;
            let id = self.next_client.fetch_add(1, Ordering::Relaxed);
            let dispatcher = self.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.clone().handle_client(stream, addr, id).await {
                    debug!("Client {} error: {}", addr, e);
                }
                dispatcher.disconnected(id);
                info!("Lost connection from {}", addr);
            });
        }
    }

    /// What a newly connected client is told
    pub fn status(&self) -> String {
        match self.sequencer.active() {
            Some(operation) => format!("Running {}", operation),
            None => "Doing nothing".to_string(),
        }
    }

    async fn handle_client(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        id: u64,
    ) -> io::Result<()> {
        info!("Connection from {}", addr);
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut broadcast = self.lines.subscribe();

        send_line(&mut writer, &self.status()).await?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if let Some(reply) = self.handle_line(id, &line) {
                        send_line(&mut writer, &reply).await?;
                    }
                }
                msg = broadcast.recv() => match msg {
                    Ok(line) => send_line(&mut writer, &line).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged, dropped {} line(s)", addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }

    /// Handle one command line from client `id`, returning the reply if any
    pub fn handle_line(&self, id: u64, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                return Some(e.to_string());
            }
        };
        info!("Client {} requested {}", id, command);

        match command {
            Command::Stop => {
                self.sequencer.moving().clear();
                Some(match self.sequencer.controller().emergency_stop() {
                    Ok(()) => "Stopped".to_string(),
                    Err(e) => format!("Error: {}", e),
                })
            }
            Command::Sensors => Some(self.sensor_line()),
            _ if command.is_manual() => {
                if let Some(operation) = self.sequencer.active() {
                    return Some(format!("Busy: {} in progress", operation));
                }
                *self.controlling.lock() = Some(id);
                Some(match manual(self.sequencer.controller(), command) {
                    Ok(()) => format!("Doing {}", command),
                    Err(e) => {
                        error!("{} failed: {}", command, e);
                        format!("Error: {}", e)
                    }
                })
            }
            _ => {
                let operation = command.operation()?;
                if let Err(e) = self.sequencer.begin(operation) {
                    return Some(e.to_string());
                }
                *self.controlling.lock() = Some(id);
                let sequencer = self.sequencer.clone();
                tokio::spawn(async move {
                    // outcome is reported through progress
                    let _ = sequencer.run(operation).await;
                });
                None
            }
        }
    }

    /// Stop everything if the controlling client went away
    pub fn disconnected(&self, id: u64) {
        let mut controlling = self.controlling.lock();
        if *controlling != Some(id) {
            return;
        }
        *controlling = None;
        warn!("Controlling client {} disconnected, stopping", id);
        self.sequencer.moving().clear();
        if let Err(e) = self.sequencer.controller().emergency_stop() {
            error!("Failed to stop motors: {}", e);
        }
    }

    fn sensor_line(&self) -> String {
        let snapshot = self.sequencer.sensors().snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => format!("sensor {}", json),
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn forward_progress(self: Arc<Self>) {
        let mut progress = self.sequencer.subscribe();
        loop {
            match progress.recv().await {
                Ok(event) => {
                    let _ = self.lines.send(event.to_string());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Progress forwarder dropped {} event(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn report_sensors(self: Arc<Self>) {
        let mut tick = interval(SENSOR_REPORT_INTERVAL);
        loop {
            tick.tick().await;
            if self.lines.receiver_count() > 0 {
                let _ = self.lines.send(self.sensor_line());
            }
        }
    }
}

fn manual(controller: &Controller, command: Command) -> Result<()> {
    match command {
        Command::Forward => controller.forward(),
        Command::Backward => controller.backward(),
        Command::TurnLeft => controller.turn_left(1.0),
        Command::TurnRight => controller.turn_right(1.0),
        Command::StopDrive => controller.stop_drive(),
        Command::LiftFront => controller.lift_front(),
        Command::LowerFront => controller.lower_front(),
        Command::StopFront => controller.stop_front(),
        Command::LiftBack => controller.lift_back(),
        Command::LowerBack => controller.lower_back(),
        Command::StopBack => controller.stop_back(),
        Command::LiftBoth => controller.lift_both(),
        Command::LowerBoth => controller.lower_both(),
        _ => Ok(()),
    }
}

async fn send_line<W: AsyncWriteExt + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}
