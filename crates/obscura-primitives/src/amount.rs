use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Number of zatoshis in one coin.
pub const COIN: i64 = 100_000_000;

/// A monetary amount in zatoshis.
///
/// Signed, because fee deltas and insight address deltas are negative for
/// spends. Plain `i64` arithmetic, overflowing only far outside the monetary
/// range the node can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_zat(zat: i64) -> Self {
        Self(zat)
    }

    pub const fn zat(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:08}", abs / COIN as u64, abs % COIN as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_in_coins() {
        assert_eq!(Amount::from_zat(150_000_000).to_string(), "1.50000000");
        assert_eq!(Amount::from_zat(-1).to_string(), "-0.00000001");
        assert_eq!(Amount::ZERO.to_string(), "0.00000000");
    }

    #[test]
    fn arithmetic() {
        let a = Amount::from_zat(70);
        let b = Amount::from_zat(30);
        assert_eq!(a + b, Amount::from_zat(100));
        assert_eq!(a - b, Amount::from_zat(40));
        assert_eq!(-(a - b), Amount::from_zat(-40));
        assert_eq!([a, b].into_iter().sum::<Amount>(), Amount::from_zat(100));
    }
}
