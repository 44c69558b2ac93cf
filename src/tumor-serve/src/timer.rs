use chrono::{DateTime, Utc};
use log::{debug, info};

/// Wall-clock timer for a single pipeline stage, reported through `log`.
pub struct Timer {
    name: String,
    started: DateTime<Utc>,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("{}: starting", name);

        Timer {
            name: name.to_owned(),
            started: Utc::now(),
        }
    }

    /// Stop the timer, returning the elapsed milliseconds
    pub fn stop(self) -> i64 {
        let msec = (Utc::now() - self.started).num_milliseconds();
        info!("{} duration: {} msec", self.name, msec);
        msec
    }
}
