use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::info;

use thermostat_common::IndicatorOutput;

/// Paired LED on hosts without GPIO: tracks the level and logs each edge.
#[derive(Debug, Clone)]
pub struct LoggedIndicator {
    pin: i32,
    level: Arc<AtomicBool>,
}

impl LoggedIndicator {
    pub fn new(pin: i32) -> Self {
        Self {
            pin,
            level: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_on(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }
}

impl IndicatorOutput for LoggedIndicator {
    fn set_paired(&mut self, on: bool) {
        if self.level.swap(on, Ordering::Relaxed) != on {
            info!("paired led (gpio {}) {}", self.pin, if on { "on" } else { "off" });
        }
    }
}
