use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Decimal places represented by one raw unit of [`Price`] / [`Quantity`].
///
/// One raw unit is `10^-8` of the quoted unit, so `Price::from_raw(150)`
/// on a USDT-quoted instrument is `0.00000150 USDT`.
pub const FIXED_POINT_SCALE: u32 = 8;

const SCALE_FACTOR: i64 = 100_000_000;

/// Fixed-point price expressed in raw `10^-8` units.
///
/// Arithmetic operates on raw integers; converting to and from
/// [`Decimal`] is explicit and reserved for venue wire boundaries and
/// display.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    pub const ZERO: Self = Self(0);

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert an exact decimal into raw units, rounding half-up at the
    /// eighth decimal place. Returns `None` if the value overflows `i64`.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        value
            .checked_mul(Decimal::from(SCALE_FACTOR))?
            .round()
            .to_i64()
            .map(Self)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, FIXED_POINT_SCALE)
    }

    /// Largest tick-aligned price `<= self` for the provided tick size.
    pub fn floor_to_tick(self, tick: Price) -> Price {
        debug_assert!(tick.0 > 0);
        Self(self.0.div_euclid(tick.0) * tick.0)
    }

    /// Smallest tick-aligned price `>= self` for the provided tick size.
    pub fn ceil_to_tick(self, tick: Price) -> Price {
        debug_assert!(tick.0 > 0);
        let floored = self.0.div_euclid(tick.0) * tick.0;
        if floored == self.0 {
            Self(floored)
        } else {
            Self(floored + tick.0)
        }
    }

    /// Scale by `1 + bp * 1e-4`, rounding to the nearest raw unit.
    ///
    /// Basis points may be negative (skewed spreads).
    pub fn apply_basis_points(self, bp: f64) -> Price {
        Self(((self.0 as f64) * (1.0 + bp * 1e-4)).round() as i64)
    }

    pub fn checked_add(self, rhs: Price) -> Option<Price> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Price) -> Option<Price> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Price) -> Price {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Price) -> Price {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn min(self, rhs: Price) -> Price {
        Self(self.0.min(rhs.0))
    }

    pub fn max(self, rhs: Price) -> Price {
        Self(self.0.max(rhs.0))
    }
}

impl Add for Price {
    type Output = Price;
    fn add(self, rhs: Price) -> Price {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Price {
    fn add_assign(&mut self, rhs: Price) {
        self.0 += rhs.0;
    }
}

impl Sub for Price {
    type Output = Price;
    fn sub(self, rhs: Price) -> Price {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Price {
    fn sub_assign(&mut self, rhs: Price) {
        self.0 -= rhs.0;
    }
}

impl Neg for Price {
    type Output = Price;
    fn neg(self) -> Price {
        Self(-self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}

/// Fixed-point quantity expressed in raw `10^-8` units.
///
/// Same discipline as [`Price`]: raw-integer arithmetic, explicit decimal
/// conversion at the edges. A zero quantity on a book level denotes level
/// removal.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
)]
#[serde(transparent)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Self = Self(0);

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn from_decimal(value: Decimal) -> Option<Self> {
        value
            .checked_mul(Decimal::from(SCALE_FACTOR))?
            .round()
            .to_i64()
            .map(Self)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, FIXED_POINT_SCALE)
    }

    pub fn saturating_add(self, rhs: Quantity) -> Quantity {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Quantity) -> Quantity {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn min(self, rhs: Quantity) -> Quantity {
        Self(self.0.min(rhs.0))
    }

    pub fn max(self, rhs: Quantity) -> Quantity {
        Self(self.0.max(rhs.0))
    }
}

impl Add for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Quantity) -> Quantity {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl Sub for Quantity {
    type Output = Quantity;
    fn sub(self, rhs: Quantity) -> Quantity {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}
