pub mod captcha;
pub mod clock;
pub mod config;
pub mod engine;
pub mod logbus;
pub mod notify;
pub mod provider;
pub mod store;
pub mod testing;

pub use captcha::{
    CaptchaConfig, CaptchaError, CaptchaPool, CaptchaPoolItem, CaptchaPoolSettings,
    CaptchaPoolStatus, CaptchaSolver, FillMode, FillReport, HttpCaptchaSolver, SolveError,
    SolveMetrics, SolveOutcome, SolverGate,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{
    AutoRunAction, Engine, EngineConfig, EngineError, EngineEvent, NeedCaptcha, SyncReport,
    TaskState,
};
pub use logbus::{LogBus, LogEntry};
pub use notify::{create_notifier, Notifier, NotifierWorker, OrderCreatedEvent, WebhookNotifier};
pub use provider::{
    HttpProvider, OrderRequest, OrderResult, PreflightResult, Provider, ProviderError,
    ProviderReply,
};
pub use store::{Account, JsonFileStore, Settings, Store, StoreError, Target, TargetMode};
