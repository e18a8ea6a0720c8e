use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// An amount in whole currency units.
///
/// Wire values may be fractional; they are rounded to the nearest unit on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "i64")]
pub struct Money(pub i64);

impl Money {
    pub const fn units(self) -> i64 {
        self.0
    }
}

impl From<f64> for Money {
    fn from(amount: f64) -> Self {
        Self(amount.round() as i64)
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ₽", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_amounts_round_to_units() {
        let m: Money = serde_json::from_str("209.5").unwrap();
        assert_eq!(m, Money(210));
        assert_eq!(serde_json::to_string(&Money(450)).unwrap(), "450");
    }
}
