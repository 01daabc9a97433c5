/// Ledger monetary system
///
/// Amounts are fixed-point values with 28 fractional digits, the precision of a
/// 96-bit decimal. They are stored as a signed `i128` count of base units so a
/// projection can go negative while transactions are replayed out of order,
/// and so the halving schedule keeps a non-zero reward for about 90 eras.
///
/// ## Text form
/// Amounts render as `0.#...#`: every significant fractional digit, no
/// trailing zeros, `.` as separator, no grouping. This is the form embedded in
/// signed transaction payloads, so it must never depend on locale.
///
/// ## Rewards
/// The coinbase reward halves every `halving_interval` blocks:
/// `reward(k) = base / 2^floor(k / interval)`.
use crate::error::{BlockchainError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// Number of base units in one coin
pub const UNITS_PER_COIN: i128 = 10_000_000_000_000_000_000_000_000_000;

/// Fractional digits carried by an [`Amount`]
pub const DECIMAL_PLACES: usize = 28;

/// Default reward for the first halving era (1 coin)
pub const DEFAULT_BASE_REWARD: Amount = Amount(UNITS_PER_COIN);

/// Default number of blocks between halvings
pub const DEFAULT_HALVING_INTERVAL: u64 = 100;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, bincode::Encode, bincode::Decode,
)]
pub struct Amount(i128);

const LOW_64: u128 = u64::MAX as u128;

// Full 256-bit product as (high, low) halves
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_64);
    let (b1, b0) = (b >> 64, b & LOW_64);
    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;
    let mid = (p00 >> 64) + (p01 & LOW_64) + (p10 & LOW_64);
    let low = (p00 & LOW_64) | ((mid & LOW_64) << 64);
    let high = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (high, low)
}

// floor(a * b / divisor), None when the quotient does not fit in 128 bits.
// divisor must stay below 2^127 so the running remainder cannot overflow.
fn mul_div_floor(a: u128, b: u128, divisor: u128) -> Option<u128> {
    let (high, low) = widening_mul(a, b);
    if high >= divisor {
        return None;
    }
    let mut remainder = high;
    let mut quotient = 0u128;
    for bit in (0..128).rev() {
        remainder = (remainder << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if remainder >= divisor {
            remainder -= divisor;
            quotient |= 1;
        }
    }
    Some(quotient)
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: i128) -> Amount {
        Amount(units)
    }

    pub const fn from_coins(coins: i64) -> Amount {
        Amount((coins as i128).saturating_mul(UNITS_PER_COIN))
    }

    pub const fn units(self) -> i128 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul_int(self, factor: i64) -> Option<Amount> {
        self.0.checked_mul(i128::from(factor)).map(Amount)
    }

    /// Multiply by a fixed-point rate, truncating toward zero below the last decimal
    pub fn checked_mul_rate(self, rate: Amount) -> Option<Amount> {
        let magnitude = mul_div_floor(
            self.0.unsigned_abs(),
            rate.0.unsigned_abs(),
            UNITS_PER_COIN as u128,
        )?;
        let magnitude = i128::try_from(magnitude).ok()?;
        if (self.0 < 0) != (rate.0 < 0) {
            Some(Amount(-magnitude))
        } else {
            Some(Amount(magnitude))
        }
    }

    /// Divide by `2^times`, truncating toward zero
    pub fn halved(self, times: u64) -> Amount {
        if times >= 127 {
            return Amount::ZERO;
        }
        Amount(self.0 / (1i128 << times))
    }
}

/// Coinbase reward for the block at `index`
///
/// # Examples
/// ```
/// use roster_chain::core::monetary::{block_reward, Amount};
/// let base = Amount::from_coins(1);
/// assert_eq!(block_reward(99, base, 100), base);
/// assert_eq!(block_reward(100, base, 100).to_string(), "0.5");
/// assert_eq!(block_reward(250, base, 100).to_string(), "0.25");
/// ```
pub fn block_reward(index: u64, base: Amount, halving_interval: u64) -> Amount {
    if halving_interval == 0 {
        return base;
    }
    base.halved(index / halving_interval)
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        *self = *self + rhs;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        *self = *self - rhs;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / UNITS_PER_COIN as u128;
        let frac = abs % UNITS_PER_COIN as u128;
        if frac == 0 {
            write!(f, "{sign}{whole}")
        } else {
            let digits = format!("{frac:0width$}", width = DECIMAL_PLACES);
            write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for Amount {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Amount> {
        let invalid = || BlockchainError::Transaction(format!("Invalid amount: {s:?}"));
        let text = s.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > DECIMAL_PLACES {
            return Err(BlockchainError::Transaction(format!(
                "Amount {s:?} has more than {DECIMAL_PLACES} decimal places"
            )));
        }

        let whole_units: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_units: i128 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<width$}", width = DECIMAL_PLACES)
                .parse()
                .map_err(|_| invalid())?
        };
        let units = whole_units
            .checked_mul(UNITS_PER_COIN)
            .and_then(|u| u.checked_add(frac_units))
            .ok_or_else(invalid)?;
        Ok(Amount(if negative { -units } else { units }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal amount such as \"1.5\" or a whole number of coins")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
        i128::from(v)
            .checked_mul(UNITS_PER_COIN)
            .map(Amount)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
        let coins = i64::try_from(v).map_err(|_| E::custom("amount out of range"))?;
        self.visit_i64(coins)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Amount, E> {
        format!("{v}").parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}
