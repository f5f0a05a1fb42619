/// Decimal precision for trade totals (units × rate)
pub const DECIMAL_PRECISION: u32 = 8;

/// Default tolerance when comparing observed and tracked balances
pub const QUANTITY_THRESHOLD: &str = "0.00000001";
