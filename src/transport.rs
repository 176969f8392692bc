// src/transport.rs
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use crate::drivers::FlystickError;
use crate::types::Command;

/// Delivery end of the control loop.
pub trait CommandSink {
    fn send(&mut self, command: &Command) -> Result<(), FlystickError>;
}

/// 进程内通道
impl CommandSink for Sender<Command> {
    fn send(&mut self, command: &Command) -> Result<(), FlystickError> {
        Sender::send(self, *command).map_err(|_| FlystickError::Transport("receiver dropped".into()))
    }
}

/// Logs every command instead of sending it.
#[derive(Debug, Default)]
pub struct LogSink;

impl CommandSink for LogSink {
    fn send(&mut self, command: &Command) -> Result<(), FlystickError> {
        info!(
            "yaw {:+.3} alt {:+.3} pitch {:+.3} thr {:+.3} speed {:.3}",
            command.yaw, command.altitude, command.pitch, command.throttle, command.speed
        );
        Ok(())
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// JSON datagram body; axis values rounded to 4 decimals, timestamp untouched.
pub fn encode_command(command: &Command) -> Result<String, FlystickError> {
    let rounded = Command {
        yaw: round4(command.yaw),
        altitude: round4(command.altitude),
        pitch: round4(command.pitch),
        throttle: round4(command.throttle),
        speed: round4(command.speed),
        ..*command
    };
    serde_json::to_string(&rounded).map_err(|e| FlystickError::Transport(e.to_string()))
}

fn resolve(target: &str) -> Result<SocketAddr, FlystickError> {
    target
        .to_socket_addrs()
        .map_err(|e| FlystickError::Transport(format!("cannot resolve {target}: {e}")))?
        .next()
        .ok_or_else(|| FlystickError::Transport(format!("{target} resolved to nothing")))
}

/// Sends each command as one JSON datagram to the primary target and every fan-out target.
pub struct UdpCommandSink {
    socket: UdpSocket,
    targets: Vec<SocketAddr>,
}

impl UdpCommandSink {
    pub fn new(primary: &str, fanout: &[String]) -> Result<Self, FlystickError> {
        let mut targets = vec![resolve(primary)?];
        for extra in fanout {
            let addr = resolve(extra)?;
            if !targets.contains(&addr) {
                targets.push(addr);
            }
        }
        let bind_addr = if targets.iter().all(SocketAddr::is_ipv6) {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| FlystickError::Transport(format!("bind {bind_addr}: {e}")))?;
        info!("UDP output -> {:?}", targets);
        Ok(Self { socket, targets })
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }
}

impl CommandSink for UdpCommandSink {
    fn send(&mut self, command: &Command) -> Result<(), FlystickError> {
        let payload = encode_command(command)?;
        let mut delivered = 0usize;
        for target in &self.targets {
            match self.socket.send_to(payload.as_bytes(), target) {
                Ok(_) => delivered += 1,
                Err(e) => warn!("UDP send to {target} failed: {e}"),
            }
        }
        debug!("sent {payload}");
        if delivered == 0 {
            return Err(FlystickError::Transport("no UDP target reachable".into()));
        }
        Ok(())
    }
}
