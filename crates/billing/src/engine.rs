//! Seat reconciliation engine
//!
//! Pure decision logic shared by every seat workflow. Nothing in here talks
//! to the gateway or the store: each function takes the current ledger state
//! and returns the ledger state to persist plus the line item quantity the
//! gateway must be set to first, if any.
//!
//! ## Threshold crossing
//!
//! | current   | new       | gateway quantity | purchased         | allocated |
//! |-----------|-----------|------------------|-------------------|-----------|
//! | <= min    | <= min    | none             | unchanged         | new       |
//! | <= min    | > min     | new              | new - min         | new       |
//! | > min     | > min     | new              | new - min         | new       |
//! | > min     | <= min    | min              | 0                 | new       |

use std::collections::HashSet;

use seatpool_shared::PlanTier;
use serde::Serialize;

use crate::error::{BillingError, BillingResult};
use crate::ledger::SeatLedger;
use crate::models::SeatMinimumChange;

/// Where a seat change starts and ends relative to the seat minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatQuadrant {
    BelowToBelow,
    BelowToAbove,
    AboveToAbove,
    AboveToBelow,
}

impl SeatQuadrant {
    /// "Below" includes being exactly at the minimum
    pub fn classify(seat_minimum: i32, current_total: i32, new_total: i32) -> Self {
        match (current_total <= seat_minimum, new_total <= seat_minimum) {
            (true, true) => Self::BelowToBelow,
            (true, false) => Self::BelowToAbove,
            (false, false) => Self::AboveToAbove,
            (false, true) => Self::AboveToBelow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelowToBelow => "below_to_below",
            Self::BelowToAbove => "below_to_above",
            Self::AboveToAbove => "above_to_above",
            Self::AboveToBelow => "above_to_below",
        }
    }
}

impl std::fmt::Display for SeatQuadrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying a seat delta to a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatScalingDecision {
    /// `None` when the delta is zero
    pub quadrant: Option<SeatQuadrant>,
    pub current_total: i32,
    pub new_total: i32,
    /// Quantity to set on the tier's line item before persisting
    pub gateway_quantity: Option<i32>,
    /// Ledger state to persist
    pub ledger: SeatLedger,
}

impl SeatScalingDecision {
    pub fn is_noop(&self) -> bool {
        self.quadrant.is_none()
    }
}

/// Apply `seat_delta` to a tier whose occupied seats currently total `current_total`
pub fn scale_seats(
    ledger: &SeatLedger,
    current_total: i32,
    seat_delta: i32,
) -> BillingResult<SeatScalingDecision> {
    let seat_minimum = ledger.configured_minimum()?;

    if seat_delta == 0 {
        return Ok(SeatScalingDecision {
            quadrant: None,
            current_total,
            new_total: current_total,
            gateway_quantity: None,
            ledger: ledger.clone(),
        });
    }

    let new_total = current_total
        .checked_add(seat_delta)
        .filter(|total| *total >= 0)
        .ok_or_else(|| {
            BillingError::Validation(format!(
                "Cannot adjust {} assigned seats by {}: the resulting total must be at least 0",
                current_total, seat_delta
            ))
        })?;

    let quadrant = SeatQuadrant::classify(seat_minimum, current_total, new_total);

    let mut next = ledger.clone();
    next.allocated_seats = new_total;

    let gateway_quantity = match quadrant {
        SeatQuadrant::BelowToBelow => None,
        SeatQuadrant::BelowToAbove | SeatQuadrant::AboveToAbove => {
            next.purchased_seats = new_total - seat_minimum;
            Some(new_total)
        }
        // The floor is billed even when usage drops below it
        SeatQuadrant::AboveToBelow => {
            next.purchased_seats = 0;
            Some(seat_minimum)
        }
    };

    Ok(SeatScalingDecision {
        quadrant: Some(quadrant),
        current_total,
        new_total,
        gateway_quantity,
        ledger: next,
    })
}

/// Whether a seat delta would make the provider buy seats: either crossing
/// the minimum upward or growing further while already above it.
pub fn results_in_purchase(seat_minimum: i32, current_total: i32, seat_delta: i32) -> bool {
    let new_total = current_total.saturating_add(seat_delta);

    match SeatQuadrant::classify(seat_minimum, current_total, new_total) {
        SeatQuadrant::BelowToAbove => true,
        SeatQuadrant::AboveToAbove => new_total > current_total,
        SeatQuadrant::BelowToBelow | SeatQuadrant::AboveToBelow => false,
    }
}

/// New quantity for one tier's line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineItemUpdate {
    pub plan_tier: PlanTier,
    pub quantity: i32,
}

/// Outcome of a batched seat minimum change
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SeatMinimumPlan {
    /// Ledgers whose minimum changed, in request order
    pub ledgers: Vec<SeatLedger>,
    /// Line items whose billed quantity changed; sent in one gateway call
    pub line_items: Vec<LineItemUpdate>,
}

impl SeatMinimumPlan {
    pub fn is_noop(&self) -> bool {
        self.ledgers.is_empty()
    }
}

/// Move one tier to a new seat minimum.
///
/// Returns the updated ledger and, when the billed quantity changes, the new
/// line item quantity. A block of purchased seats is carried over as long as
/// the new minimum fits inside what is already billed.
pub fn change_seat_minimum(
    ledger: &SeatLedger,
    new_seat_minimum: i32,
) -> BillingResult<(SeatLedger, Option<i32>)> {
    if new_seat_minimum < 0 {
        return Err(BillingError::Validation(
            "Provider seat minimums must be at least 0".to_string(),
        ));
    }

    let old_minimum = ledger.configured_minimum()?;

    if old_minimum == new_seat_minimum {
        return Ok((ledger.clone(), None));
    }

    let billed_before = ledger.billed_quantity();
    let mut next = ledger.clone();

    if ledger.purchased_seats == 0 {
        next.purchased_seats = if ledger.allocated_seats > new_seat_minimum {
            ledger.allocated_seats - new_seat_minimum
        } else {
            0
        };
    } else {
        let total_seats_billed = old_minimum + ledger.purchased_seats;

        next.purchased_seats = if new_seat_minimum <= total_seats_billed {
            total_seats_billed - new_seat_minimum
        } else {
            0
        };
    }

    next.seat_minimum = Some(new_seat_minimum);

    let billed_after = next.billed_quantity();
    let quantity = (billed_after != billed_before).then_some(billed_after);

    Ok((next, quantity))
}

/// Reject a batch with a negative minimum, a tier that cannot be pooled or a
/// tier listed twice. Runs before any ledger is read.
pub fn validate_seat_minimum_changes(changes: &[SeatMinimumChange]) -> BillingResult<()> {
    if changes.iter().any(|change| change.seat_minimum < 0) {
        return Err(BillingError::Validation(
            "Provider seat minimums must be at least 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for change in changes {
        if !change.plan_tier.supports_pooled_billing() {
            return Err(BillingError::Validation(format!(
                "Plan tier {} does not support pooled provider billing",
                change.plan_tier
            )));
        }
        if !seen.insert(change.plan_tier) {
            return Err(BillingError::Validation(format!(
                "Plan tier {} appears more than once in the batch",
                change.plan_tier
            )));
        }
    }

    Ok(())
}

/// Plan a batch of seat minimum changes.
///
/// The batch is validated as a whole before any tier is touched: one invalid
/// entry rejects every entry.
pub fn change_seat_minimums(
    ledgers: &[SeatLedger],
    changes: &[SeatMinimumChange],
) -> BillingResult<SeatMinimumPlan> {
    validate_seat_minimum_changes(changes)?;

    let mut plan = SeatMinimumPlan::default();

    for change in changes {
        let ledger = ledgers
            .iter()
            .find(|ledger| ledger.plan_tier == change.plan_tier)
            .ok_or_else(|| {
                BillingError::Configuration(format!(
                    "Provider plan for tier {} is missing",
                    change.plan_tier
                ))
            })?;

        if ledger.configured_minimum()? == change.seat_minimum {
            continue;
        }

        let (next, quantity) = change_seat_minimum(ledger, change.seat_minimum)?;

        if let Some(quantity) = quantity {
            plan.line_items.push(LineItemUpdate {
                plan_tier: change.plan_tier,
                quantity,
            });
        }
        plan.ledgers.push(next);
    }

    Ok(plan)
}
