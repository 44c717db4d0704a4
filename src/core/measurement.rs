//! Measurement value object produced by the protocol decoders.

use crate::core::si::{self, Prefix};
use rust_decimal::Decimal;
use std::fmt;

/// One decoded meter reading: displayed value, unit text and SI prefix.
///
/// The value is the number the meter displayed; the prefix scales it.
/// `12.3` with prefix milli and unit `V` means 12.3 millivolt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    value: Decimal,
    unit: String,
    prefix: Prefix,
}

impl Measurement {
    /// Create a measurement.
    pub fn new(value: Decimal, unit: impl Into<String>, prefix: Prefix) -> Self {
        Self {
            value,
            unit: unit.into(),
            prefix,
        }
    }

    /// Displayed numeric value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Unit text, e.g. `V` or `Ω`. Empty when the meter showed none.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// SI prefix the value is scaled by.
    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// This measurement rescaled to another prefix.
    #[must_use]
    pub fn to_prefix(&self, to: Prefix) -> Self {
        Self {
            value: si::convert(self.value, self.prefix, to),
            unit: self.unit.clone(),
            prefix: to,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix == Prefix::None && self.unit.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}{}", self.value, self.prefix.symbol(), self.unit)
        }
    }
}
