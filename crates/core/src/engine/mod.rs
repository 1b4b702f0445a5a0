//! Task-orchestration engine.
//!
//! The coordinator keeps one execution unit per enabled target and a pool
//! maintainer while running:
//! - **Units**: rush targets wait for their deadline then attempt back-to-back,
//!   scan targets attempt on an interval, both until the quota is met
//! - **Maintainer**: keeps the captcha pool topped up once it is activated

mod config;
mod coordinator;
mod events;
mod maintainer;
mod selection;
mod stop;
mod types;
mod unit;

pub use config::EngineConfig;
pub use coordinator::Engine;
pub use events::EngineEvent;
pub use selection::pick_account;
pub use stop::{StopSource, StopToken};
pub use types::{AutoRunAction, EngineError, NeedCaptcha, SyncReport, TaskState};
