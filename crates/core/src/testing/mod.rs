//! Testing utilities and mock collaborators.
//!
//! Every capability the engine consumes has a controllable in-memory
//! implementation here, so the engine can be driven end to end without an
//! upstream shop, a solver sidecar, or a store file.
//!
//! # Example
//!
//! ```rust,ignore
//! use sniper_core::testing::{fixtures, MockProvider, MockStore};
//!
//! let store = MockStore::new();
//! store.set_accounts(vec![fixtures::account("a1")]).await;
//! store.set_targets(vec![fixtures::scan_target("t1")]).await;
//!
//! let provider = MockProvider::new();
//! provider.set_need_captcha(true).await;
//! ```

mod mock_notifier;
mod mock_provider;
mod mock_solver;
mod mock_store;

pub use mock_notifier::MockNotifier;
pub use mock_provider::{MockProvider, RecordedOrder};
pub use mock_solver::MockSolver;
pub use mock_store::MockStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::store::{Account, Target, TargetMode};

    /// A logged-in account with a plausible mobile number.
    pub fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            mobile: "13812345678".to_string(),
            token: format!("token-{}", id),
            device_id: format!("device-{}", id),
            user_agent: "Mozilla/5.0".to_string(),
            proxy: None,
            cookies: None,
        }
    }

    /// An enabled scan-mode target buying one unit.
    pub fn scan_target(id: &str) -> Target {
        Target {
            id: id.to_string(),
            name: format!("Target {}", id),
            item_id: format!("item-{}", id),
            sku_id: format!("sku-{}", id),
            shop_id: "shop-1".to_string(),
            mode: TargetMode::Scan,
            rush_at_ms: 0,
            per_order_qty: 1,
            target_qty: 1,
            enabled: true,
            captcha_verify_param: None,
            updated_at: 1,
        }
    }

    /// An enabled rush-mode target with the given deadline.
    pub fn rush_target(id: &str, rush_at_ms: i64) -> Target {
        Target {
            mode: TargetMode::Rush,
            rush_at_ms,
            ..scan_target(id)
        }
    }
}
