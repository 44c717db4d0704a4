//! SI prefix model and exact rescaling between prefixes.
//!
//! Meter readings are display values: what the LCD shows plus the SI
//! prefix annunciator that was lit. Rescaling between prefixes is done
//! on exact decimals so `12.3 mV` converts to `0.0123 V`, not to a
//! binary-float approximation of it.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// SI scale prefix attached to a measurement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Prefix {
    /// 10^9
    Giga,
    /// 10^6
    Mega,
    /// 10^3
    Kilo,
    /// 10^0, the unscaled value
    #[default]
    None,
    /// 10^-3
    Milli,
    /// 10^-6
    Micro,
    /// 10^-9
    Nano,
}

impl Prefix {
    /// Every prefix, largest scale first.
    pub const ALL: [Prefix; 7] = [
        Prefix::Giga,
        Prefix::Mega,
        Prefix::Kilo,
        Prefix::None,
        Prefix::Milli,
        Prefix::Micro,
        Prefix::Nano,
    ];

    /// Exact power-of-ten scale factor.
    pub fn factor(self) -> Decimal {
        match self {
            Self::Giga => Decimal::new(1_000_000_000, 0),
            Self::Mega => Decimal::new(1_000_000, 0),
            Self::Kilo => Decimal::new(1_000, 0),
            Self::None => Decimal::ONE,
            Self::Milli => Decimal::new(1, 3),
            Self::Micro => Decimal::new(1, 6),
            Self::Nano => Decimal::new(1, 9),
        }
    }

    /// Display symbol, e.g. `k` for kilo. Empty for the unscaled prefix.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Giga => "G",
            Self::Mega => "M",
            Self::Kilo => "k",
            Self::None => "",
            Self::Milli => "m",
            Self::Micro => "\u{03bc}",
            Self::Nano => "n",
        }
    }

    /// Lowercase prefix name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Giga => "giga",
            Self::Mega => "mega",
            Self::Kilo => "kilo",
            Self::None => "none",
            Self::Milli => "milli",
            Self::Micro => "micro",
            Self::Nano => "nano",
        }
    }

    /// Look up a prefix by its display symbol. Symbols are
    /// case-sensitive: `m` is milli, `M` is mega.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.symbol() == symbol)
    }
}

impl FromStr for Prefix {
    type Err = String;

    /// Accepts the prefix name or its symbol; `u` is an ASCII alias
    /// for micro.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "giga" | "G" => Ok(Self::Giga),
            "mega" | "M" => Ok(Self::Mega),
            "kilo" | "k" => Ok(Self::Kilo),
            "none" | "" => Ok(Self::None),
            "milli" | "m" => Ok(Self::Milli),
            "micro" | "\u{03bc}" | "u" => Ok(Self::Micro),
            "nano" | "n" => Ok(Self::Nano),
            _ => Err(format!("unknown SI prefix: {s}")),
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::None {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{} ({})", self.name(), self.symbol())
        }
    }
}

/// Rescale `value` from one prefix to another.
///
/// Exact for every value a meter can display. `normalize` strips
/// trailing fractional zeros, so converting and converting back
/// reproduces the input.
pub fn convert(value: Decimal, from: Prefix, to: Prefix) -> Decimal {
    if from == to {
        return value;
    }
    (value * from.factor() / to.factor()).normalize()
}
