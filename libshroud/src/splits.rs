//! Coin selection and randomized amount splitting.
//!
//! Splitting a payment into several randomized parts stops an observer from
//! matching a withdrawal to a deposit by amount. Only the sum is exact; the
//! individual shares are fresh random draws on every call.

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fractional digits carried by every split part.
pub const SPLIT_PRECISION: u32 = 9;
pub const DEFAULT_LOW: f64 = 0.5;
pub const DEFAULT_HIGH: f64 = 1.5;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("total must be positive, got {0}")]
    InvalidTotal(Decimal),
    #[error("bounds [{low}, {high}] must satisfy 0 < low <= 1 <= high")]
    InvalidBounds { low: f64, high: f64 },
}

/// A spendable note: an amount plus the fields identifying it on the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub amount: Decimal,
    pub commitment: String,
    pub leaf_index: u64,
}

fn tolerance() -> Decimal {
    Decimal::new(1, SPLIT_PRECISION)
}

/// Pick notes smallest-first until the running total reaches `target`
/// (within a 1e-9 tolerance). An empty selection with zero total is the
/// insufficient-funds signal, a normal outcome rather than an error.
pub fn greedy_coin_select(notes: &[Note], target: Decimal) -> (Vec<Note>, Decimal) {
    let mut candidates = notes.to_vec();
    candidates.sort_by(|a, b| a.amount.cmp(&b.amount));

    let mut chosen = Vec::new();
    let mut total = Decimal::ZERO;
    for note in candidates {
        total += note.amount;
        chosen.push(note);
        if total + tolerance() >= target {
            return (chosen, total);
        }
    }
    (Vec::new(), Decimal::ZERO)
}

/// The ordered parts of a split, plus the facts needed to audit it: the
/// clamp interval each part was held to and the residual folded into one
/// part to keep the sum exact. That adjustment can push a single part
/// outside the interval, which `within_bounds` makes observable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitPlan {
    parts: Vec<Decimal>,
    min_part: Decimal,
    max_part: Decimal,
    residual: Decimal,
}

impl SplitPlan {
    fn empty() -> Self {
        Self { parts: Vec::new(), min_part: Decimal::ZERO, max_part: Decimal::ZERO, residual: Decimal::ZERO }
    }

    pub fn parts(&self) -> &[Decimal] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.parts.iter().sum()
    }

    /// The `[low * avg, high * avg]` interval the parts were clamped into.
    pub fn bounds(&self) -> (Decimal, Decimal) {
        (self.min_part, self.max_part)
    }

    /// The amount added to one part to make the sum exact.
    pub fn residual(&self) -> Decimal {
        self.residual
    }

    pub fn within_bounds(&self) -> bool {
        self.parts.iter().all(|p| *p >= self.min_part && *p <= self.max_part)
    }
}

/// Split `total` into `n` random parts, each clamped to
/// `[low * avg, high * avg]` with `avg = total / n`, truncated to 9 decimal
/// digits. The truncation/clamp residual goes into the final generated part
/// so the plan sums to `total` exactly; part order is then shuffled so
/// position reveals nothing about the draw order.
///
/// The shuffle deliberately takes a plain [`Rng`]: ordering is not
/// security-critical, and the crate reserves its CSPRNG bounds for the
/// operations that are.
pub fn split_bounded<R: Rng + ?Sized>(
    total: Decimal,
    n: usize,
    low: f64,
    high: f64,
    rng: &mut R,
) -> Result<SplitPlan, SplitError> {
    if total <= Decimal::ZERO {
        return Err(SplitError::InvalidTotal(total));
    }
    if !(low > 0.0 && low <= 1.0 && high >= 1.0) {
        return Err(SplitError::InvalidBounds { low, high });
    }
    if n == 0 {
        return Ok(SplitPlan::empty());
    }
    if n == 1 {
        return Ok(SplitPlan { parts: vec![total], min_part: total, max_part: total, residual: Decimal::ZERO });
    }

    let avg = total / Decimal::from(n as u64);
    let bound = |x: f64| Decimal::from_f64(x).ok_or(SplitError::InvalidBounds { low, high });
    let min_part = avg * bound(low)?;
    let max_part = avg * bound(high)?;

    let draws: Vec<f64> = (0..n).map(|_| rng.gen_range(low..=high)).collect();
    let draw_sum: f64 = draws.iter().sum();

    let mut parts = Vec::with_capacity(n);
    for draw in &draws {
        let share = bound(draw / draw_sum)?;
        let scaled = total * share;
        parts.push(scaled.clamp(min_part, max_part).trunc_with_scale(SPLIT_PRECISION));
    }

    let subtotal: Decimal = parts.iter().sum();
    let residual = total - subtotal;
    let last = parts.len() - 1;
    parts[last] = (parts[last] + residual).trunc_with_scale(SPLIT_PRECISION);

    parts.shuffle(rng);
    Ok(SplitPlan { parts, min_part, max_part, residual })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::thread_rng;
    use std::str::FromStr;

    fn note(amount: &str, leaf_index: u64) -> Note {
        Note {
            amount: Decimal::from_str(amount).unwrap(),
            commitment: format!("commitment-{leaf_index}"),
            leaf_index,
        }
    }

    #[test]
    fn selection_prefers_small_notes() {
        let notes = [note("5", 0), note("1", 1), note("3", 2)];
        let (chosen, total) = greedy_coin_select(&notes, Decimal::from_str("3.5").unwrap());
        assert_eq!(total, Decimal::from(4));
        assert_eq!(chosen.iter().map(|n| n.leaf_index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn insufficient_funds_is_an_empty_selection() {
        let notes = [note("1", 0), note("2", 1)];
        let (chosen, total) = greedy_coin_select(&notes, Decimal::from(10));
        assert!(chosen.is_empty());
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn selection_tolerance_absorbs_rounding() {
        let notes = [note("0.9999999995", 0)];
        let (chosen, total) = greedy_coin_select(&notes, Decimal::ONE);
        assert_eq!(chosen.len(), 1);
        assert!(total + tolerance() >= Decimal::ONE);
    }

    #[test]
    fn split_of_ten_into_three_sums_exactly() {
        let total = Decimal::from_str("10.000000000").unwrap();
        let plan = split_bounded(total, 3, 0.5, 1.5, &mut thread_rng()).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.total(), total);
    }

    #[test]
    fn split_conserves_total_across_shapes() {
        let mut rng = thread_rng();
        for total in ["0.000000007", "1", "3.141592653", "250000.5"] {
            let total = Decimal::from_str(total).unwrap();
            for n in 1..=7 {
                let plan = split_bounded(total, n, 0.5, 1.5, &mut rng).unwrap();
                assert_eq!(plan.len(), n, "n={n} total={total}");
                assert_eq!(plan.total(), total, "n={n} total={total}");
            }
        }
    }

    #[test]
    fn at_most_one_part_escapes_the_bounds() {
        let mut rng = thread_rng();
        for _ in 0..50 {
            let plan = split_bounded(Decimal::from(100), 5, 0.5, 1.5, &mut rng).unwrap();
            let (min_part, max_part) = plan.bounds();
            let outside =
                plan.parts().iter().filter(|p| **p < min_part || **p > max_part).count();
            assert!(outside <= 1, "parts {:?} bounds {:?}", plan.parts(), plan.bounds());
            if outside == 1 {
                assert!(!plan.within_bounds());
            }
        }
    }

    #[test]
    fn trivial_part_counts() {
        let mut rng = thread_rng();
        let total = Decimal::from_str("2.5").unwrap();

        let plan = split_bounded(total, 0, 0.5, 1.5, &mut rng).unwrap();
        assert!(plan.is_empty());

        let plan = split_bounded(total, 1, 0.5, 1.5, &mut rng).unwrap();
        assert_eq!(plan.parts(), &[total]);
        assert_eq!(plan.residual(), Decimal::ZERO);
        assert!(plan.within_bounds());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut rng = thread_rng();
        assert!(matches!(
            split_bounded(Decimal::ZERO, 3, 0.5, 1.5, &mut rng),
            Err(SplitError::InvalidTotal(_))
        ));
        assert!(matches!(
            split_bounded(Decimal::from(-4), 3, 0.5, 1.5, &mut rng),
            Err(SplitError::InvalidTotal(_))
        ));
        assert!(matches!(
            split_bounded(Decimal::ONE, 3, 0.0, 1.5, &mut rng),
            Err(SplitError::InvalidBounds { .. })
        ));
        assert!(matches!(
            split_bounded(Decimal::ONE, 3, 0.5, 0.9, &mut rng),
            Err(SplitError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn parts_have_split_precision() {
        let plan = split_bounded(Decimal::from(7), 4, 0.5, 1.5, &mut thread_rng()).unwrap();
        for part in plan.parts() {
            assert!(part.scale() <= SPLIT_PRECISION, "part {part} has scale {}", part.scale());
        }
    }
}
