//! Serial link parameters a protocol decoder requires from its port.

use std::fmt;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    /// 5 data bits
    Five,
    /// 6 data bits
    Six,
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
}

impl DataBits {
    fn bit_count(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    /// 1 stop bit
    One,
    /// 2 stop bits
    Two,
}

impl StopBits {
    fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

/// Immutable serial-port configuration a decoder requires.
///
/// Each decoder dictates these; they are not user-configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortParameters {
    /// Baud rate in bits per second.
    pub baud_rate: u32,
    /// Data bits per character.
    pub data_bits: DataBits,
    /// Stop bits per character.
    pub stop_bits: StopBits,
    /// Parity mode.
    pub parity: Parity,
    /// DTR line state asserted after opening the port.
    pub dtr: bool,
    /// RTS line state asserted after opening the port.
    pub rts: bool,
}

impl PortParameters {
    /// New parameters with both control lines deasserted.
    pub fn new(baud_rate: u32, data_bits: DataBits, stop_bits: StopBits, parity: Parity) -> Self {
        Self {
            baud_rate,
            data_bits,
            stop_bits,
            parity,
            dtr: false,
            rts: false,
        }
    }

    /// Set the DTR line state.
    #[must_use]
    pub fn dtr(mut self, state: bool) -> Self {
        self.dtr = state;
        self
    }

    /// Set the RTS line state.
    #[must_use]
    pub fn rts(mut self, state: bool) -> Self {
        self.rts = state;
        self
    }
}

impl fmt::Display for PortParameters {
    /// Renders like `600 baud 7N2, DTR+RTS`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} baud {}{}{}",
            self.baud_rate,
            self.data_bits.bit_count(),
            self.parity.letter(),
            self.stop_bits.count()
        )?;
        match (self.dtr, self.rts) {
            (true, true) => write!(f, ", DTR+RTS"),
            (true, false) => write!(f, ", DTR"),
            (false, true) => write!(f, ", RTS"),
            (false, false) => Ok(()),
        }
    }
}
