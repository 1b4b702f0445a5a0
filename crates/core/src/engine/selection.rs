//! Account selection.

use rand::seq::SliceRandom;

use crate::store::Account;

/// Uniformly random pick among logged-in accounts.
pub fn pick_account(accounts: &[Account]) -> Option<&Account> {
    let logged_in: Vec<&Account> = accounts.iter().filter(|a| a.is_logged_in()).collect();
    logged_in.choose(&mut rand::thread_rng()).copied()
}

/// Session token used for pool fills: any logged-in account, or empty.
pub fn fill_session_token(accounts: &[Account]) -> String {
    pick_account(accounts)
        .map(|a| a.token.clone())
        .unwrap_or_default()
}
