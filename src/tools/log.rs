use chrono::Local;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

pub enum LogServiceType {
    Register,
    Analysis,
    Render,
    Encoder,
    Store,
    Other
}
impl LogServiceType {
    fn as_str(&self) -> &'static str {
        match self {
            LogServiceType::Register => "REGISTER",
            LogServiceType::Analysis => "ANALYSIS",
            LogServiceType::Render => "RENDER",
            LogServiceType::Encoder => "ENCODER",
            LogServiceType::Store => "STORE",
            LogServiceType::Other => "OTHER"
        }
    }
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Installs the process wide subscriber. Calling it twice is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_target(false)
        .try_init();
}

pub fn log_info(service: LogServiceType, message: String) {
    tracing::info!(service = service.as_str(), "{}", message)
}

pub fn log_warn(service: LogServiceType, message: String) {
    tracing::warn!(service = service.as_str(), "{}", message)
}

pub fn log_error(service: LogServiceType, message: String) {
    tracing::error!(service = service.as_str(), "{}", message)
}
