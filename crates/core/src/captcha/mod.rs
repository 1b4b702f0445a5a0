//! Human-verification tokens: the solver abstraction, the shared solve budget,
//! and the pre-warmed token pool.

mod config;
mod gate;
mod http;
mod pool;
mod settings;
mod traits;
mod types;

pub use config::CaptchaConfig;
pub use gate::SolverGate;
pub use http::HttpCaptchaSolver;
pub use pool::{activation_time, CaptchaPool, MAX_FILL_CONCURRENCY};
pub use settings::CaptchaPoolSettings;
pub use traits::{CaptchaSolver, SolveError, SolveMetrics, SolveOutcome};
pub use types::{
    CaptchaError, CaptchaPoolItem, CaptchaPoolItemView, CaptchaPoolStatus, FillMode, FillReport,
};
