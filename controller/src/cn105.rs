//! Mitsubishi CN105 serial framing.
//!
//! Frames are `FC <type> 01 30 <len> <payload..> <checksum>` where the
//! checksum is `0xFC` minus the sum of every preceding byte. The unit must be
//! greeted with a connect packet before it accepts settings.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, info, warn};

use thermostat_common::{ActuationError, HvacCommand, SystemMode};

use crate::actuator::HvacLink;

pub const FRAME_START: u8 = 0xFC;
const HEADER_TAIL: [u8; 2] = [0x01, 0x30];
const HEADER_LEN: usize = 5;
const MAX_PAYLOAD_LEN: usize = 32;

pub const PACKET_CONNECT: u8 = 0x5A;
pub const PACKET_CONNECT_ACK: u8 = 0x7A;
pub const PACKET_SET: u8 = 0x41;
pub const PACKET_SET_ACK: u8 = 0x61;

const CONNECT_PAYLOAD: [u8; 2] = [0xCA, 0x01];
const SET_PAYLOAD_LEN: usize = 16;

const SET_FLAG_POWER: u8 = 0x01;
const SET_FLAG_MODE: u8 = 0x02;
const SET_FLAG_TEMPERATURE: u8 = 0x04;

const POWER_OFF: u8 = 0x00;
const POWER_ON: u8 = 0x01;

const MODE_HEAT: u8 = 0x01;
const MODE_COOL: u8 = 0x03;
const MODE_AUTO: u8 = 0x08;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("serial io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad header {0:02X?}")]
    Header([u8; HEADER_LEN]),
    #[error("payload length {0} exceeds {MAX_PAYLOAD_LEN}")]
    Length(usize),
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: u8,
    pub payload: Vec<u8>,
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(FRAME_START, |acc, byte| acc.wrapping_sub(*byte))
}

pub fn encode_frame(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    frame.extend_from_slice(&[FRAME_START, packet_type]);
    frame.extend_from_slice(&HEADER_TAIL);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}

/// Half-degree steps offset by 128, rounded to the nearest half degree.
pub fn encode_temperature(centi_degrees: i16) -> u8 {
    let halves = (i32::from(centi_degrees) + 25).div_euclid(50) + 128;
    halves.clamp(0, i32::from(u8::MAX)) as u8
}

/// The unit has a single target temperature, so both setpoint kinds land in
/// the same field.
pub fn set_payload(command: &HvacCommand) -> [u8; SET_PAYLOAD_LEN] {
    let mut payload = [0u8; SET_PAYLOAD_LEN];
    payload[0] = 0x01;
    match command {
        HvacCommand::SetMode(SystemMode::Off) => {
            payload[1] = SET_FLAG_POWER;
            payload[3] = POWER_OFF;
        }
        HvacCommand::SetMode(mode) => {
            payload[1] = SET_FLAG_POWER | SET_FLAG_MODE;
            payload[3] = POWER_ON;
            payload[4] = match mode {
                SystemMode::Heat => MODE_HEAT,
                SystemMode::Cool => MODE_COOL,
                SystemMode::Auto | SystemMode::Off => MODE_AUTO,
            };
        }
        HvacCommand::SetCoolSetpoint(value) | HvacCommand::SetHeatSetpoint(value) => {
            payload[1] = SET_FLAG_TEMPERATURE;
            payload[14] = encode_temperature(*value);
        }
    }
    payload
}

/// Reads one frame, skipping line noise ahead of the start byte.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    loop {
        header[0] = reader.read_u8().await?;
        if header[0] == FRAME_START {
            break;
        }
    }
    reader.read_exact(&mut header[1..]).await?;
    if header[2..4] != HEADER_TAIL {
        return Err(FrameError::Header(header));
    }

    let len = usize::from(header[4]);
    if len > MAX_PAYLOAD_LEN {
        return Err(FrameError::Length(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let actual = reader.read_u8().await?;

    let payload_sum = payload.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    let expected = checksum(&header).wrapping_sub(payload_sum);
    if actual != expected {
        return Err(FrameError::Checksum { expected, actual });
    }

    Ok(Frame {
        packet_type: header[1],
        payload,
    })
}

impl From<FrameError> for ActuationError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(_) => ActuationError::LinkDown,
            FrameError::Header(_) | FrameError::Length(_) | FrameError::Checksum { .. } => {
                ActuationError::NotAcknowledged
            }
        }
    }
}

/// CN105 session over any byte stream.
///
/// The gateway cancels `send` when the ack timeout fires, which can leave a
/// reply in flight. The session counts frames written without a reply read
/// and discards that many late replies before the next exchange, waiting at
/// most `settle` for each. `settle` must be shorter than the ack timeout so
/// a lost reply is written off within one attempt.
pub struct Cn105Link<T> {
    io: T,
    connected: bool,
    unanswered: usize,
    settle: Duration,
}

impl<T> Cn105Link<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T, settle: Duration) -> Self {
        Self {
            io,
            connected: false,
            unanswered: 0,
            settle,
        }
    }

    fn drop_session(&mut self) {
        self.connected = false;
        self.unanswered = 0;
    }

    async fn discard_late_replies(&mut self) -> Result<(), ActuationError> {
        if self.unanswered == 0 {
            return Ok(());
        }
        // The unit may have restarted while we were not listening.
        self.connected = false;

        while self.unanswered > 0 {
            match timeout(self.settle, read_frame(&mut self.io)).await {
                Ok(Ok(frame)) => {
                    self.unanswered -= 1;
                    debug!("cn105 discarding late {:#04x} reply", frame.packet_type);
                }
                Ok(Err(FrameError::Io(err))) => {
                    warn!("cn105 read failed: {err}");
                    self.drop_session();
                    return Err(ActuationError::LinkDown);
                }
                Ok(Err(err)) => {
                    self.unanswered -= 1;
                    debug!("cn105 discarding garbled reply: {err}");
                }
                Err(_) => {
                    debug!("cn105 writing off {} lost reply(ies)", self.unanswered);
                    self.unanswered = 0;
                }
            }
        }
        Ok(())
    }

    async fn exchange(
        &mut self,
        packet_type: u8,
        payload: &[u8],
        ack_type: u8,
    ) -> Result<(), ActuationError> {
        let frame = encode_frame(packet_type, payload);
        self.unanswered += 1;
        let written = async {
            self.io.write_all(&frame).await?;
            self.io.flush().await
        }
        .await;
        if let Err(err) = written {
            warn!("cn105 write failed: {err}");
            self.drop_session();
            return Err(ActuationError::LinkDown);
        }

        let reply = read_frame(&mut self.io).await;
        self.unanswered = self.unanswered.saturating_sub(1);
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!("cn105 read failed: {err}");
                if matches!(err, FrameError::Io(_)) {
                    self.drop_session();
                }
                return Err(err.into());
            }
        };

        if reply.packet_type != ack_type {
            debug!(
                "cn105 expected {ack_type:#04x}, got {:#04x}",
                reply.packet_type
            );
            return Err(ActuationError::NotAcknowledged);
        }
        Ok(())
    }

    async fn ensure_connected(&mut self) -> Result<(), ActuationError> {
        if self.connected {
            return Ok(());
        }
        self.exchange(PACKET_CONNECT, &CONNECT_PAYLOAD, PACKET_CONNECT_ACK)
            .await?;
        info!("cn105 unit connected");
        self.connected = true;
        Ok(())
    }
}

#[async_trait]
impl<T> HvacLink for Cn105Link<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, command: &HvacCommand) -> Result<(), ActuationError> {
        self.discard_late_replies().await?;
        self.ensure_connected().await?;
        self.exchange(PACKET_SET, &set_payload(command), PACKET_SET_ACK)
            .await
    }
}

/// CN105 through a serial-to-TCP bridge. Reconnects on the next command
/// after the socket drops.
pub struct TcpBridgeLink {
    addr: String,
    settle: Duration,
    session: Option<Cn105Link<TcpStream>>,
}

impl TcpBridgeLink {
    pub fn new(addr: impl Into<String>, settle: Duration) -> Self {
        Self {
            addr: addr.into(),
            settle,
            session: None,
        }
    }
}

#[async_trait]
impl HvacLink for TcpBridgeLink {
    async fn send(&mut self, command: &HvacCommand) -> Result<(), ActuationError> {
        if self.session.is_none() {
            let stream = TcpStream::connect(&self.addr).await.map_err(|err| {
                warn!("hvac bridge {} unreachable: {err}", self.addr);
                ActuationError::LinkDown
            })?;
            info!("hvac bridge connected at {}", self.addr);
            self.session = Some(Cn105Link::new(stream, self.settle));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ActuationError::LinkDown);
        };

        let result = session.send(command).await;
        if result == Err(ActuationError::LinkDown) {
            self.session = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use thermostat_common::{Actuator, ActuatorConfig};
    use tokio::{
        io::{duplex, DuplexStream},
        sync::mpsc,
        time::sleep,
    };

    use super::*;
    use crate::actuator::{Ack, ActuatorGateway};

    const SETTLE: Duration = Duration::from_millis(50);

    async fn fake_unit(mut io: DuplexStream, replies: Vec<u8>) -> Vec<Frame> {
        let mut seen = Vec::new();
        for ack in replies {
            let Ok(frame) = read_frame(&mut io).await else {
                break;
            };
            seen.push(frame);
            io.write_all(&encode_frame(ack, &[0u8; 16])).await.unwrap();
        }
        seen
    }

    #[test]
    fn connect_frame_bytes() {
        assert_eq!(
            encode_frame(PACKET_CONNECT, &CONNECT_PAYLOAD),
            vec![0xFC, 0x5A, 0x01, 0x30, 0x02, 0xCA, 0x01, 0xA8]
        );
    }

    #[test]
    fn temperature_rounds_to_half_degrees() {
        assert_eq!(encode_temperature(2400), 0xB0);
        assert_eq!(encode_temperature(2450), 0xB1);
        assert_eq!(encode_temperature(2424), 0xB0);
        assert_eq!(encode_temperature(2425), 0xB1);
        assert_eq!(encode_temperature(1600), 0xA0);
    }

    #[test]
    fn set_payload_fields() {
        let heat = set_payload(&HvacCommand::SetMode(SystemMode::Heat));
        assert_eq!(heat[1], SET_FLAG_POWER | SET_FLAG_MODE);
        assert_eq!(heat[3], POWER_ON);
        assert_eq!(heat[4], MODE_HEAT);

        let off = set_payload(&HvacCommand::SetMode(SystemMode::Off));
        assert_eq!(off[1], SET_FLAG_POWER);
        assert_eq!(off[3], POWER_OFF);

        let cool = set_payload(&HvacCommand::SetCoolSetpoint(2600));
        assert_eq!(cool[1], SET_FLAG_TEMPERATURE);
        assert_eq!(cool[14], 0xB4);
        assert_eq!(cool, set_payload(&HvacCommand::SetHeatSetpoint(2600)));
    }

    #[tokio::test]
    async fn read_frame_skips_noise_and_checks_sum() {
        let mut bytes = vec![0x00, 0x13];
        bytes.extend(encode_frame(PACKET_SET_ACK, &[0x01, 0x02]));
        let frame = read_frame(&mut bytes.as_slice()).await.unwrap();
        assert_eq!(frame.packet_type, PACKET_SET_ACK);
        assert_eq!(frame.payload, vec![0x01, 0x02]);

        let mut corrupt = encode_frame(PACKET_SET_ACK, &[0x01]);
        *corrupt.last_mut().unwrap() ^= 0xFF;
        assert!(matches!(
            read_frame(&mut corrupt.as_slice()).await,
            Err(FrameError::Checksum { .. })
        ));
    }

    #[tokio::test]
    async fn handshake_once_then_settings() {
        let (ours, theirs) = duplex(256);
        let unit = tokio::spawn(fake_unit(
            theirs,
            vec![PACKET_CONNECT_ACK, PACKET_SET_ACK, PACKET_SET_ACK],
        ));

        let mut link = Cn105Link::new(ours, SETTLE);
        link.send(&HvacCommand::SetMode(SystemMode::Cool)).await.unwrap();
        link.send(&HvacCommand::SetCoolSetpoint(2400)).await.unwrap();
        drop(link);

        let seen = unit.await.unwrap();
        let types: Vec<u8> = seen.iter().map(|frame| frame.packet_type).collect();
        assert_eq!(types, vec![PACKET_CONNECT, PACKET_SET, PACKET_SET]);
        assert_eq!(seen[1].payload[4], MODE_COOL);
        assert_eq!(seen[2].payload[14], 0xB0);
    }

    #[tokio::test]
    async fn wrong_reply_is_not_acknowledged() {
        let (ours, theirs) = duplex(256);
        let unit = tokio::spawn(fake_unit(theirs, vec![PACKET_CONNECT_ACK, 0x62]));

        let mut link = Cn105Link::new(ours, SETTLE);
        let result = link.send(&HvacCommand::SetHeatSetpoint(2000)).await;

        assert_eq!(result, Err(ActuationError::NotAcknowledged));
        drop(link);
        unit.await.unwrap();
    }

    #[tokio::test]
    async fn closed_stream_is_link_down() {
        let (ours, theirs) = duplex(256);
        drop(theirs);

        let mut link = Cn105Link::new(ours, SETTLE);
        assert_eq!(
            link.send(&HvacCommand::SetMode(SystemMode::Heat)).await,
            Err(ActuationError::LinkDown)
        );
    }

    /// Unit that answers its first frame only after `first_reply_delay` and
    /// refuses temperature changes.
    async fn sluggish_unit(
        mut io: DuplexStream,
        first_reply_delay: Duration,
        seen: Arc<Mutex<Vec<u8>>>,
    ) {
        let mut first = true;
        while let Ok(frame) = read_frame(&mut io).await {
            seen.lock().unwrap().push(frame.packet_type);
            if first {
                first = false;
                sleep(first_reply_delay).await;
            }
            let reply = match frame.packet_type {
                PACKET_CONNECT => PACKET_CONNECT_ACK,
                _ if frame.payload[1] == SET_FLAG_TEMPERATURE => 0x62,
                _ => PACKET_SET_ACK,
            };
            if io.write_all(&encode_frame(reply, &[0u8; 16])).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn reply_after_ack_timeout_is_not_taken_for_the_next_ack() {
        let (ours, theirs) = duplex(256);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let unit = tokio::spawn(sluggish_unit(
            theirs,
            Duration::from_millis(120),
            seen.clone(),
        ));

        let config = ActuatorConfig {
            ack_timeout_ms: 100,
            max_attempts: 3,
            retry_backoff_ms: 0,
            link_addr: None,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let (gateway, worker) = ActuatorGateway::spawn(Cn105Link::new(ours, SETTLE), config, tx);

        gateway.set_mode(SystemMode::Heat).unwrap();
        let outcome = rx.recv().await.unwrap();
        assert_eq!(
            outcome.result,
            Ok(Ack {
                command: HvacCommand::SetMode(SystemMode::Heat),
                attempts: 2,
            })
        );
        // The late connect ack was drained and the handshake repeated.
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PACKET_CONNECT, PACKET_CONNECT, PACKET_SET]
        );

        gateway.submit(HvacCommand::SetCoolSetpoint(2400)).unwrap();
        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.command, HvacCommand::SetCoolSetpoint(2400));
        assert_eq!(outcome.result, Err(ActuationError::NotAcknowledged));

        drop(gateway);
        worker.abort();
        let _ = worker.await;
        unit.await.unwrap();
    }

    #[tokio::test]
    async fn lost_reply_is_written_off_after_settle() {
        let (ours, theirs) = duplex(256);
        let mut link = Cn105Link::new(ours, SETTLE);
        link.unanswered = 1;
        let unit = tokio::spawn(fake_unit(theirs, vec![PACKET_CONNECT_ACK, PACKET_SET_ACK]));

        link.send(&HvacCommand::SetMode(SystemMode::Auto)).await.unwrap();
        assert_eq!(link.unanswered, 0);
        drop(link);

        let types: Vec<u8> = unit
            .await
            .unwrap()
            .iter()
            .map(|frame| frame.packet_type)
            .collect();
        assert_eq!(types, vec![PACKET_CONNECT, PACKET_SET]);
    }
}
