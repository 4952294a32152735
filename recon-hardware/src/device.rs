//! Device polling state machine
//!
//! A running device has two workers:
//!
//! - the **read loop** reads one frame at a time from the transport,
//!   dispatches it into the shared state, then writes at most one queued
//!   outbound frame;
//! - the **controller** re-polls on two tickers and runs a reconciliation
//!   pass whenever a setter signals a change.
//!
//! Shared state sits behind a `RwLock` that is never held across an await on
//! the queue or the transport. The change signal is a `Notify`, so several
//! setter calls between passes collapse into one wake-up and every pass
//! rescans all channels.
//!
//! ```text
//! Stopped ──start──▶ Initializing ──all channels reported──▶ Running
//!    ▲                    │ init window elapsed                │
//!    └────────────────────┴──────────────── stop ──────────────┘
//! ```

use recon_core::{
    BoardInfo, ChannelSnapshot, DevicePhase, DeviceSettings, DeviceSnapshot,
    PollingConfig, ReconError, Result, TemperatureUnit,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::Channel;
use crate::frame::{Frame, FRAME_SIZE};
use crate::protocol::{self, Response};
use crate::transport::FrameTransport;

const INIT_STATUS: u8 = 0x01;
const INIT_SETTINGS: u8 = 0x02;
const INIT_DISPLAY: u8 = 0x04;

/// Mutable device aggregate
#[derive(Debug)]
struct DeviceState {
    phase: DevicePhase,
    channels: Vec<Channel>,
    current_settings: DeviceSettings,
    target_settings: Option<DeviceSettings>,
    display_channel: u8,
    target_display_channel: Option<u8>,
    init: u8,
    stop: Option<CancellationToken>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            phase: DevicePhase::Stopped,
            channels: Vec::new(),
            current_settings: DeviceSettings::default(),
            target_settings: None,
            display_channel: 0,
            target_display_channel: None,
            init: 0,
            stop: None,
        }
    }

    /// Fresh state for a new run
    fn reset(&mut self, channel_count: usize) {
        self.channels = (0..channel_count).map(|_| Channel::new()).collect();
        self.current_settings = DeviceSettings::default();
        self.target_settings = None;
        self.display_channel = 0;
        self.target_display_channel = None;
        self.init = 0;
    }

    fn is_initialized(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(Channel::is_initialized)
    }

    fn channel_mut(&mut self, channel: usize) -> Result<&mut Channel> {
        let channel_count = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(ReconError::InvalidChannel {
                channel,
                channel_count,
            })
    }

    /// Apply one inbound frame
    fn apply(&mut self, frame: &Frame) {
        match Response::classify(frame.control) {
            Response::TempAndSpeed(ch) => match self.channels.get_mut(ch) {
                Some(channel) => channel.ingest_speed_report(&frame.payload),
                None => debug!("Speed report for unknown channel {}", ch),
            },
            Response::AlarmAndSpeed(ch) => match self.channels.get_mut(ch) {
                Some(channel) => channel.ingest_alarm_report(&frame.payload),
                None => debug!("Alarm report for unknown channel {}", ch),
            },
            Response::DisplayChannel(ch) => {
                self.display_channel = ch;
                self.init |= INIT_DISPLAY;
            }
            Response::DeviceStatus => {
                self.init |= INIT_STATUS;
            }
            Response::DeviceSettings => match frame.payload.first() {
                Some(bits) => {
                    self.current_settings = DeviceSettings::from_bits(*bits);
                    self.init |= INIT_SETTINGS;
                }
                None => debug!("Dropping settings report without payload"),
            },
            Response::Ack => debug!("Controller acknowledged command"),
            Response::Nak => warn!("Controller rejected command"),
            Response::Unknown(control) => {
                warn!("Unknown data received: 0x{:02X} {:02X?}", control, frame.payload)
            }
        }
    }

    /// Collect the writes a reconciliation pass must send, marking them
    /// flushed.
    fn pending_commands(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        for (ch, channel) in self.channels.iter_mut().enumerate() {
            if channel.is_dirty() {
                let (alarm, speed) = channel.pending_write();
                debug!(
                    "Channel {}: writing alarm {}F, speed {} RPM",
                    ch, alarm, speed
                );
                frames.push(protocol::set_alarm_and_speed(ch, alarm, speed));
                channel.clear_dirty();
                frames.push(protocol::request_alarm_and_speed(ch));
            }
        }

        // Adopted optimistically; a rejected write is corrected by the next
        // settings poll.
        if let Some(target) = self.target_settings.take() {
            if target != self.current_settings {
                debug!("Writing device settings: {:?}", target);
                frames.push(protocol::set_device_settings(target));
                self.current_settings = target;
            }
        }

        if let Some(target) = self.target_display_channel.take() {
            if target != self.display_channel {
                debug!("Switching display to channel {}", target);
                frames.push(protocol::set_display_channel(target));
                frames.push(protocol::request_display_channel());
            }
        }

        frames
    }

    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            phase: self.phase,
            initialized: self.is_initialized(),
            audio: self.current_settings.audio,
            manual: self.current_settings.manual,
            temp_mode: self.current_settings.temperature_unit(),
            display_channel: self.display_channel,
            channels: self
                .channels
                .iter()
                .enumerate()
                .map(|(i, c)| c.snapshot(i))
                .collect(),
        }
    }
}

/// State shared between the device handle and its workers
struct Shared {
    state: RwLock<DeviceState>,
    change: Notify,
}

/// Enqueues outbound frames; owned by `start` during init and by the
/// controller afterwards.
struct Poller {
    shared: Arc<Shared>,
    queue: mpsc::Sender<Frame>,
    channel_count: usize,
}

impl Poller {
    /// Blocks while the queue is full
    async fn enqueue(&self, frame: Frame) {
        if self.queue.send(frame).await.is_err() {
            debug!("Outbound queue closed, dropping frame");
        }
    }

    async fn request_status(&self) {
        self.enqueue(protocol::request_device_status()).await;
        self.enqueue(protocol::request_device_settings()).await;
        self.enqueue(protocol::request_display_channel()).await;
    }

    async fn request_temp_and_speed(&self) {
        for ch in 0..self.channel_count {
            self.enqueue(protocol::request_temp_and_speed(ch)).await;
        }
    }

    async fn request_alarm_and_speed(&self) {
        for ch in 0..self.channel_count {
            self.enqueue(protocol::request_alarm_and_speed(ch)).await;
        }
    }

    async fn reconcile(&self) {
        let frames = self.shared.state.write().await.pending_commands();
        if !frames.is_empty() {
            debug!("Reconciliation pass: {} frame(s)", frames.len());
        }
        for frame in frames {
            self.enqueue(frame).await;
        }
    }
}

/// A Recon controller and its polling state
///
/// Generic over the transport type, allowing real hardware (`HidDriver`, `SerialDriver`)
/// or mock transports for testing.
pub struct Device<T: FrameTransport + ?Sized = dyn FrameTransport> {
    transport: Arc<Mutex<Box<T>>>,
    shared: Arc<Shared>,
    config: PollingConfig,
    board: BoardInfo,
}

impl<T: FrameTransport + ?Sized + 'static> Device<T> {
    /// Create a device with a boxed transport
    pub fn with_transport(transport: Box<T>, config: PollingConfig, board: BoardInfo) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            shared: Arc::new(Shared {
                state: RwLock::new(DeviceState::new()),
                change: Notify::new(),
            }),
            config,
            board,
        }
    }

    /// Open the transport and poll until [`Device::stop`] is called.
    ///
    /// Returns `ReconError::Timeout` if some channel has not reported both
    /// its speed and alarm state when the init window ends; the device is
    /// back in `Stopped` in that case.
    pub async fn start(&self) -> Result<()> {
        let token = {
            let mut state = self.shared.state.write().await;
            if state.phase != DevicePhase::Stopped {
                return Err(ReconError::AlreadyStarted);
            }
            state.phase = DevicePhase::Initializing;
            state.reset(self.board.channel_count);
            let token = CancellationToken::new();
            state.stop = Some(token.clone());
            token
        };

        info!(
            "Starting {} ({} channels)",
            self.board.name, self.board.channel_count
        );

        if let Err(e) = self.transport.lock().await.open().await {
            error!("Failed to open transport: {}", e);
            self.finish().await;
            return Err(e);
        }

        let (queue, outbound) = mpsc::channel(self.config.queue_capacity.max(1));
        let reader = tokio::spawn(read_loop(
            self.transport.clone(),
            self.shared.clone(),
            outbound,
            token.clone(),
            self.config.verify_checksum,
        ));

        let poller = Poller {
            shared: self.shared.clone(),
            queue,
            channel_count: self.board.channel_count,
        };
        poller.request_status().await;
        poller.request_temp_and_speed().await;
        poller.request_alarm_and_speed().await;

        let init_timeout = self.config.init_timeout();
        let stopped_early = tokio::select! {
            _ = sleep(init_timeout) => false,
            _ = token.cancelled() => true,
        };
        if stopped_early {
            info!("Stop requested during initialization");
            self.teardown(&token, reader, None).await;
            return Ok(());
        }

        if !self.is_initialized().await {
            error!(
                "Device failed to initialize within {}s",
                init_timeout.as_secs()
            );
            self.teardown(&token, reader, None).await;
            return Err(ReconError::Timeout(
                "Device failed to initialize within timeout".to_string(),
            ));
        }

        self.shared.state.write().await.phase = DevicePhase::Running;
        info!("Device initialized, polling");

        let controller = tokio::spawn(control_loop(
            poller,
            token.clone(),
            self.config.speed_interval(),
            self.config.status_interval(),
        ));

        token.cancelled().await;
        self.teardown(&token, reader, Some(controller)).await;
        Ok(())
    }

    /// Request termination; takes effect at the top of each worker iteration
    pub async fn stop(&self) {
        match self.shared.state.read().await.stop.as_ref() {
            Some(token) => {
                info!("Stopping device");
                token.cancel();
            }
            None => debug!("Stop requested while not started"),
        }
    }

    async fn teardown(
        &self,
        token: &CancellationToken,
        reader: JoinHandle<()>,
        controller: Option<JoinHandle<()>>,
    ) {
        token.cancel();
        if let Err(e) = reader.await {
            warn!("Read loop ended abnormally: {}", e);
        }
        if let Some(controller) = controller {
            if let Err(e) = controller.await {
                warn!("Controller ended abnormally: {}", e);
            }
        }
        if let Err(e) = self.transport.lock().await.close().await {
            warn!("Failed to close transport: {}", e);
        }
        self.finish().await;
        info!("Device stopped");
    }

    async fn finish(&self) {
        let mut state = self.shared.state.write().await;
        state.phase = DevicePhase::Stopped;
        state.stop = None;
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> DevicePhase {
        self.shared.state.read().await.phase
    }

    /// Polling is running (initializing or running)
    pub async fn is_started(&self) -> bool {
        self.phase().await != DevicePhase::Stopped
    }

    /// Every channel has received both report kinds
    pub async fn is_initialized(&self) -> bool {
        self.shared.state.read().await.is_initialized()
    }

    /// Point-in-time view of one channel
    pub async fn channel(&self, channel: usize) -> Result<ChannelSnapshot> {
        let state = self.shared.state.read().await;
        state
            .channels
            .get(channel)
            .map(|c| c.snapshot(channel))
            .ok_or(ReconError::InvalidChannel {
                channel,
                channel_count: state.channels.len(),
            })
    }

    /// Channel shown on the controller display
    pub async fn display_channel(&self) -> u8 {
        self.shared.state.read().await.display_channel
    }

    /// Current device settings as last reported (or optimistically written)
    pub async fn settings(&self) -> DeviceSettings {
        self.shared.state.read().await.current_settings
    }

    /// Manual fan mode
    pub async fn is_manual(&self) -> bool {
        self.settings().await.manual
    }

    /// Display in Fahrenheit
    pub async fn is_fahrenheit(&self) -> bool {
        self.settings().await.fahrenheit
    }

    /// Audible alarm enabled
    pub async fn is_audio_enabled(&self) -> bool {
        self.settings().await.audio
    }

    /// Device-level status, settings and display reports have all arrived
    pub async fn has_device_reports(&self) -> bool {
        let init = self.shared.state.read().await.init;
        init & (INIT_STATUS | INIT_SETTINGS | INIT_DISPLAY)
            == (INIT_STATUS | INIT_SETTINGS | INIT_DISPLAY)
    }

    /// Serializable view of the whole device
    pub async fn snapshot(&self) -> DeviceSnapshot {
        self.shared.state.read().await.snapshot()
    }

    /// Set a channel's target speed (RPM)
    pub async fn set_target_speed(&self, channel: usize, rpm: i32) -> Result<()> {
        self.shared
            .state
            .write()
            .await
            .channel_mut(channel)?
            .set_target_speed(rpm)?;
        self.shared.change.notify_one();
        Ok(())
    }

    /// Set a channel's alarm temperature
    pub async fn set_target_alarm(
        &self,
        channel: usize,
        value: i32,
        unit: TemperatureUnit,
    ) -> Result<()> {
        self.shared
            .state
            .write()
            .await
            .channel_mut(channel)?
            .set_target_alarm(value, unit)?;
        self.shared.change.notify_one();
        Ok(())
    }

    /// Switch manual fan mode
    pub async fn set_manual_mode(&self, enabled: bool) {
        self.update_settings(|s| s.manual = enabled).await;
    }

    /// Switch the display between Fahrenheit and Celsius
    pub async fn set_fahrenheit_mode(&self, enabled: bool) {
        self.update_settings(|s| s.fahrenheit = enabled).await;
    }

    /// Switch the audible alarm
    pub async fn set_audio_enabled(&self, enabled: bool) {
        self.update_settings(|s| s.audio = enabled).await;
    }

    /// Show a channel on the controller display
    pub async fn set_display_channel(&self, channel: usize) -> Result<()> {
        self.board.validate_channel(channel)?;
        self.shared.state.write().await.target_display_channel = Some(channel as u8);
        self.shared.change.notify_one();
        Ok(())
    }

    async fn update_settings(&self, update: impl FnOnce(&mut DeviceSettings)) {
        {
            let mut state = self.shared.state.write().await;
            let mut target = state.target_settings.unwrap_or(state.current_settings);
            update(&mut target);
            state.target_settings = Some(target);
        }
        self.shared.change.notify_one();
    }
}

/// Read, dispatch, then write at most one queued frame; repeat until stopped.
async fn read_loop<T: FrameTransport + ?Sized>(
    transport: Arc<Mutex<Box<T>>>,
    shared: Arc<Shared>,
    mut outbound: mpsc::Receiver<Frame>,
    token: CancellationToken,
    verify_checksum: bool,
) {
    debug!("Read loop started");

    while !token.is_cancelled() {
        let mut buf = [0u8; FRAME_SIZE];
        let read = transport.lock().await.read_frame(&mut buf).await;
        let idle = match read {
            Ok(FRAME_SIZE) => {
                handle_inbound(&shared, &buf, verify_checksum).await;
                false
            }
            Ok(n) => {
                debug!("Short read: {} bytes", n);
                true
            }
            Err(ReconError::Timeout(_)) => {
                trace!("Read timed out");
                true
            }
            Err(e) => {
                debug!("Read failed: {}", e);
                true
            }
        };

        if let Ok(mut frame) = outbound.try_recv() {
            match frame.encode() {
                Ok(bytes) => {
                    if let Err(e) = transport.lock().await.write_frame(&bytes).await {
                        debug!("Write of 0x{:02X} failed: {}", frame.control, e);
                    }
                }
                Err(e) => warn!("Dropping outbound frame: {}", e),
            }
        } else if idle {
            tokio::task::yield_now().await;
        }
    }

    debug!("Read loop stopped");
}

async fn handle_inbound(shared: &Shared, buf: &[u8; FRAME_SIZE], verify_checksum: bool) {
    let frame = match Frame::decode(buf) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Error while parsing data: {}", e);
            return;
        }
    };

    if verify_checksum {
        if let Err(e) = frame.verify_checksum() {
            debug!("Dropping frame 0x{:02X}: {}", frame.control, e);
            return;
        }
    }

    shared.state.write().await.apply(&frame);
}

/// Periodic polls plus change-triggered reconciliation
async fn control_loop(
    poller: Poller,
    token: CancellationToken,
    speed_interval: Duration,
    status_interval: Duration,
) {
    let mut speed_tick = interval_at(Instant::now() + speed_interval, speed_interval);
    speed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut status_tick = interval_at(Instant::now() + status_interval, status_interval);
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !token.is_cancelled() {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = speed_tick.tick() => poller.request_temp_and_speed().await,
            _ = status_tick.tick() => {
                poller.request_status().await;
                poller.request_alarm_and_speed().await;
            }
            _ = poller.shared.change.notified() => poller.reconcile().await,
        }
    }

    debug!("Controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(control: u8, payload: &[u8]) -> Frame {
        Frame::new(control, payload.to_vec())
    }

    fn initialized_state(channels: usize) -> DeviceState {
        let mut state = DeviceState::new();
        state.reset(channels);
        for ch in 0..channels as u8 {
            state.apply(&report(0x40 | ch, &[100, 0xE8, 0x03, 0xD0, 0x07]));
            state.apply(&report(0x80 | ch, &[140, 0xDC, 0x05]));
        }
        state
    }

    #[test]
    fn test_stopped_state_is_not_initialized() {
        let state = DeviceState::new();
        assert!(!state.is_initialized());
        assert_eq!(state.phase, DevicePhase::Stopped);
    }

    #[test]
    fn test_apply_routes_channel_reports() {
        let mut state = DeviceState::new();
        state.reset(5);

        state.apply(&report(0x42, &[90, 0x20, 0x03, 0xD0, 0x07]));
        state.apply(&report(0x82, &[130, 0x58, 0x02]));

        assert_eq!(state.channels[2].speed(), 800);
        assert_eq!(state.channels[2].manual_speed(), 600);
        assert!(state.channels[2].is_initialized());
        assert!(!state.channels[1].is_initialized());
        assert!(!state.is_initialized());
    }

    #[test]
    fn test_apply_ignores_unknown_channel() {
        let mut state = DeviceState::new();
        state.reset(5);

        state.apply(&report(0x47, &[90, 0x20, 0x03, 0xD0, 0x07]));
        state.apply(&report(0x8F, &[130, 0x58, 0x02]));

        assert!(state.channels.iter().all(|c| c.speed() == 0));
    }

    #[test]
    fn test_apply_device_reports() {
        let mut state = DeviceState::new();
        state.reset(5);

        state.apply(&report(0x23, &[]));
        state.apply(&report(0xA0, &[0x00]));
        state.apply(&report(0x60, &[0x03]));

        assert_eq!(state.display_channel, 3);
        assert_eq!(state.init, INIT_STATUS | INIT_SETTINGS | INIT_DISPLAY);
        assert!(state.current_settings.manual);
        assert!(state.current_settings.fahrenheit);
        assert!(!state.current_settings.audio);
    }

    #[test]
    fn test_apply_ignores_ack_nak_and_unknown() {
        let mut state = initialized_state(2);
        let before = state.snapshot();

        state.apply(&report(0xF0, &[]));
        state.apply(&report(0xFA, &[]));
        state.apply(&report(0x31, &[1, 2, 3]));
        state.apply(&report(0x60, &[]));

        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_all_channels_initialized() {
        let state = initialized_state(5);
        assert!(state.is_initialized());
    }

    #[test]
    fn test_pending_commands_for_dirty_channel() {
        let mut state = initialized_state(5);
        state.channels[1].set_target_speed(1000).unwrap();

        let frames = state.pending_commands();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].control, 0x81);
        assert_eq!(frames[0].payload, vec![140, 0xE8, 0x03]);
        assert_eq!(frames[1].control, 0x71);
        assert!(frames[1].payload.is_empty());

        assert!(!state.channels[1].is_dirty());
        assert!(state.pending_commands().is_empty());
    }

    #[test]
    fn test_pending_commands_rescans_all_channels() {
        let mut state = initialized_state(5);
        state.channels[0].set_target_speed(500).unwrap();
        state.channels[4]
            .set_target_alarm(50, TemperatureUnit::Celsius)
            .unwrap();

        let controls: Vec<u8> = state
            .pending_commands()
            .iter()
            .map(|f| f.control)
            .collect();
        assert_eq!(controls, vec![0x80, 0x70, 0x84, 0x74]);
    }

    #[test]
    fn test_pending_settings_adopted_optimistically() {
        let mut state = initialized_state(1);
        state.apply(&report(0x60, &[0x01]));
        state.target_settings = Some(DeviceSettings {
            manual: true,
            fahrenheit: false,
            audio: true,
        });

        let frames = state.pending_commands();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].control, 0x60);
        assert_eq!(frames[0].payload, vec![0x05]);
        assert!(state.current_settings.audio);
        assert!(state.target_settings.is_none());
    }

    #[test]
    fn test_unchanged_settings_are_not_written() {
        let mut state = initialized_state(1);
        state.apply(&report(0x60, &[0x02]));
        state.target_settings = Some(DeviceSettings::from_bits(0x02));

        assert!(state.pending_commands().is_empty());
    }

    #[test]
    fn test_pending_display_channel() {
        let mut state = initialized_state(5);
        state.apply(&report(0x20, &[]));
        state.target_display_channel = Some(3);

        let controls: Vec<u8> = state
            .pending_commands()
            .iter()
            .map(|f| f.control)
            .collect();
        assert_eq!(controls, vec![0x23, 0x10]);
        assert!(state.target_display_channel.is_none());
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut state = initialized_state(5);
        state.phase = DevicePhase::Running;
        state.apply(&report(0x60, &[0x04]));
        state.apply(&report(0x22, &[]));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, DevicePhase::Running);
        assert!(snapshot.initialized);
        assert!(snapshot.audio);
        assert!(!snapshot.manual);
        assert_eq!(snapshot.temp_mode, TemperatureUnit::Celsius);
        assert_eq!(snapshot.display_channel, 2);
        assert_eq!(snapshot.channels.len(), 5);
        assert_eq!(snapshot.channels[4].index, 4);
    }
}
