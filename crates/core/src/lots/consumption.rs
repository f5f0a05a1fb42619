//! Lowest-rate-first lot consumption.
//!
//! Planning is pure: it takes a snapshot of a LotSet and returns the actions
//! that would dispose of the requested units. Nothing is mutated until the
//! whole plan is known to be satisfiable.

use log::debug;
use rust_decimal::Decimal;

use super::lots_model::{total_units, Lot, LotAction, LotKey};
use crate::errors::{Error, Result};

/// Returns the lots in consumption order: ascending by rate, ties keep
/// their stored order.
pub fn consumption_order(lots: &[Lot]) -> Vec<&Lot> {
    let mut ordered: Vec<&Lot> = lots.iter().collect();
    // sort_by is stable
    ordered.sort_by(|a, b| a.rate.cmp(&b.rate));
    ordered
}

/// Plans the removal of `units` from `lots`.
///
/// Fails with `InsufficientHoldings` when the set holds fewer units than
/// requested; in that case no action is produced.
pub fn plan_removal(key: &LotKey, lots: &[Lot], units: Decimal) -> Result<Vec<LotAction>> {
    if units <= Decimal::ZERO {
        return Err(Error::InvalidQuantity(format!(
            "Units to remove must be positive, got {} for {}",
            units, key
        )));
    }

    let available = total_units(lots)?;
    if units > available {
        return Err(Error::InsufficientHoldings {
            asset_type: key.asset_type.clone(),
            requested: units,
            available,
        });
    }

    let mut remaining = units;
    let mut actions = Vec::new();

    for lot in consumption_order(lots) {
        if remaining.is_zero() {
            break;
        }

        if lot.units <= remaining {
            debug!(
                "Consuming lot {} of {} entirely ({} @ {})",
                lot.id, key, lot.units, lot.rate
            );
            remaining -= lot.units;
            actions.push(LotAction::Deleted { lot: lot.clone() });
        } else {
            let mut updated = lot.clone();
            updated.units = lot.units - remaining;
            debug!(
                "Consuming {} of lot {} of {} ({} left @ {})",
                remaining, lot.id, key, updated.units, lot.rate
            );
            remaining = Decimal::ZERO;
            actions.push(LotAction::Updated {
                lot: updated,
                previous_units: lot.units,
            });
        }
    }

    Ok(actions)
}

/// Applies planned actions to an in-memory LotSet, preserving stored order.
pub fn apply_actions(lots: &mut Vec<Lot>, actions: &[LotAction]) {
    for action in actions {
        match action {
            LotAction::Created { lot } => lots.push(lot.clone()),
            LotAction::Updated { lot, .. } => {
                if let Some(existing) = lots.iter_mut().find(|l| l.id == lot.id) {
                    existing.units = lot.units;
                }
            }
            LotAction::Deleted { lot } => lots.retain(|l| l.id != lot.id),
        }
    }
}
