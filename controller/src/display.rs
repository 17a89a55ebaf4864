use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, trace, warn};

use thermostat_common::{
    ConnectivityPhase, DisplayConfig, DisplaySnapshot, Presenter, RenderError, SystemMode,
};

/// Monochrome frame in SSD1306 page order: each byte is a column of eight
/// pixels, least significant bit on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        let pages = height.div_ceil(8);
        Self {
            width,
            height,
            buffer: vec![0; (width * pages) as usize],
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = ((y / 8) * self.width + x) as usize;
        self.buffer[index] & (1 << (y % 8)) != 0
    }

    pub fn lit_pixels(&self) -> u32 {
        self.buffer.iter().map(|byte| byte.count_ones()).sum()
    }

    /// One string per row, `#` for lit pixels.
    pub fn to_ascii(&self) -> Vec<String> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| if self.pixel(x, y) { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Frame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0
                || point.y < 0
                || point.x >= self.width as i32
                || point.y >= self.height as i32
            {
                continue;
            }

            let (x, y) = (point.x as u32, point.y as u32);
            let index = ((y / 8) * self.width + x) as usize;
            let mask = 1u8 << (y % 8);
            match color {
                BinaryColor::On => self.buffer[index] |= mask,
                BinaryColor::Off => self.buffer[index] &= !mask,
            }
        }
        Ok(())
    }
}

fn degrees(centi: i16) -> String {
    format!("{:.1}", f32::from(centi) / 100.0)
}

fn phase_label(phase: ConnectivityPhase) -> &'static str {
    match phase {
        ConnectivityPhase::Idle => "IDLE",
        ConnectivityPhase::AdvertisingForCommissioning => "READY TO PAIR",
        ConnectivityPhase::CommissioningComplete => "PAIRING SUCCESS",
        ConnectivityPhase::CommissioningFailed => "PAIRING TIMEOUT",
        ConnectivityPhase::NetworkOnline => "ONLINE",
        ConnectivityPhase::FabricRemoved => "FABRIC REMOVED",
    }
}

fn target_line(snapshot: &DisplaySnapshot) -> String {
    match snapshot.mode {
        SystemMode::Off => "--.-".to_string(),
        SystemMode::Heat => format!("{}C", degrees(snapshot.heat_setpoint)),
        SystemMode::Cool => format!("{}C", degrees(snapshot.cool_setpoint)),
        SystemMode::Auto => format!(
            "{}-{}",
            degrees(snapshot.heat_setpoint),
            degrees(snapshot.cool_setpoint)
        ),
    }
}

/// Lays out the snapshot: mode line, large target, room temperature and the
/// connectivity line.
pub fn compose(snapshot: &DisplaySnapshot, config: &DisplayConfig) -> Frame {
    let mut frame = Frame::new(config.width, config.height);
    let small = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let large = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);

    let mode_line = format!(
        "{}  RUN {}",
        snapshot.mode.as_str(),
        snapshot.running_mode.as_str()
    );
    let room_line = match snapshot.local_temperature {
        Some(value) => format!("ROOM {}C", degrees(value)),
        None => "ROOM --".to_string(),
    };
    let mut status_line = phase_label(snapshot.phase).to_string();
    if snapshot.network_online {
        status_line.push_str(" NET");
    }

    let lines = [
        (mode_line, small, 0),
        (target_line(snapshot), large, 12),
        (room_line, small, 36),
        (status_line, small, 52),
    ];
    for (text, style, y) in lines {
        if let Err(err) = Text::with_baseline(&text, Point::new(0, y), style, Baseline::Top)
            .draw(&mut frame)
        {
            match err {}
        }
    }
    frame
}

/// Physical panel behind the presenter.
#[async_trait]
pub trait DisplaySurface: Send {
    async fn flush(&mut self, frame: &Frame) -> Result<(), RenderError>;
}

/// Surface for hosts without a panel; logs each flushed frame.
#[derive(Debug, Default)]
pub struct TraceSurface;

#[async_trait]
impl DisplaySurface for TraceSurface {
    async fn flush(&mut self, frame: &Frame) -> Result<(), RenderError> {
        debug!("display flush: {} lit pixels", frame.lit_pixels());
        trace!("frame:\n{}", frame.to_ascii().join("\n"));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DisplayStats {
    renders: AtomicU64,
    flushed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl DisplayStats {
    fn fail(&self, counter: &AtomicU64, err: &RenderError) {
        counter.fetch_add(1, Ordering::Relaxed);
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayDiagnostics {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "renderBudgetMs")]
    pub render_budget_ms: u64,
    pub renders: u64,
    pub flushed: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

/// Composes frames on the caller and hands them to a flush task. Only the
/// newest frame is flushed; one that misses the budget is dropped.
#[derive(Debug, Clone)]
pub struct DisplayPresenter {
    config: DisplayConfig,
    frames: Arc<watch::Sender<Frame>>,
    stats: Arc<DisplayStats>,
}

impl DisplayPresenter {
    pub fn spawn<S>(mut surface: S, config: DisplayConfig) -> (Self, JoinHandle<()>)
    where
        S: DisplaySurface + 'static,
    {
        let (tx, mut rx) = watch::channel(Frame::new(config.width, config.height));
        let stats = Arc::new(DisplayStats::default());
        let budget_ms = config.render_budget_ms;

        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let frame = rx.borrow_and_update().clone();
                match timeout(Duration::from_millis(budget_ms), surface.flush(&frame)).await {
                    Ok(Ok(())) => {
                        task_stats.flushed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(err)) => {
                        warn!("display flush failed: {err}");
                        task_stats.fail(&task_stats.failed, &err);
                    }
                    Err(_) => {
                        let err = RenderError::Timeout { budget_ms };
                        warn!("display frame dropped: {err}");
                        task_stats.fail(&task_stats.skipped, &err);
                    }
                }
            }
            debug!("display presenter closed");
        });

        let presenter = Self {
            config,
            frames: Arc::new(tx),
            stats,
        };
        (presenter, task)
    }

    pub fn current_frame(&self) -> Frame {
        self.frames.borrow().clone()
    }

    pub fn diagnostics(&self) -> DisplayDiagnostics {
        DisplayDiagnostics {
            width: self.config.width,
            height: self.config.height,
            render_budget_ms: self.config.render_budget_ms,
            renders: self.stats.renders.load(Ordering::Relaxed),
            flushed: self.stats.flushed.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            last_error: self
                .stats
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl Presenter for DisplayPresenter {
    fn render(&self, snapshot: &DisplaySnapshot) {
        self.stats.renders.fetch_add(1, Ordering::Relaxed);
        self.frames.send_replace(compose(snapshot, &self.config));
    }
}
