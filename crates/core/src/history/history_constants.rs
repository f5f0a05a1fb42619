/// Units bought at an explicit rate
pub const TRADE_TYPE_BUY: &str = "BUY";

/// Units sold at an explicit rate
pub const TRADE_TYPE_SELL: &str = "SELL";

/// Untracked units discovered while syncing balances
pub const TRADE_TYPE_RECONCILE_IN: &str = "RECONCILE_IN";

/// Tracked units missing from the observed balance
pub const TRADE_TYPE_RECONCILE_OUT: &str = "RECONCILE_OUT";
