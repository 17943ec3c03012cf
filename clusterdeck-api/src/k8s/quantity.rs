//! Parsing of Kubernetes resource quantities such as `100m`, `2`, `128Mi`
//! or `1e3`.
//!
//! Values are kept as an integer mantissa with a decimal exponent and a
//! binary (`1024`) exponent, so conversions are exact. Like the Kubernetes
//! API machinery, conversions to integers round up.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("quantity `{0}` has no numeric part")]
    MissingNumber(String),

    #[error("quantity `{0}` has an unknown suffix")]
    UnknownSuffix(String),

    #[error("quantity `{0}` is out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    mantissa: i128,
    decimal_exponent: i32,
    binary_exponent: u32,
}

impl ParsedQuantity {
    /// Value in thousandths of the base unit, e.g. millicores for CPU.
    pub fn milli_value(&self) -> Option<i64> {
        self.scaled(3)
    }

    /// Value in the base unit, e.g. bytes for memory.
    pub fn value(&self) -> Option<i64> {
        self.scaled(0)
    }

    fn scaled(&self, extra_exponent: i32) -> Option<i64> {
        let binary_factor = 1024i128.checked_pow(self.binary_exponent)?;
        let value = self.mantissa.checked_mul(binary_factor)?;
        let exponent = self.decimal_exponent.checked_add(extra_exponent)?;

        let scaled = if exponent >= 0 {
            value.checked_mul(10i128.checked_pow(exponent as u32)?)?
        } else {
            match 10i128.checked_pow(exponent.unsigned_abs()) {
                Some(divisor) => ceil_div(value, divisor),
                // Smaller than any representable unit.
                None => i128::from(value > 0),
            }
        };

        i64::try_from(scaled).ok()
    }
}

fn ceil_div(value: i128, divisor: i128) -> i128 {
    let quotient = value.div_euclid(divisor);
    if value.rem_euclid(divisor) == 0 {
        quotient
    } else {
        quotient + 1
    }
}

pub fn parse_quantity(input: &str) -> Result<ParsedQuantity, QuantityError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(QuantityError::Empty);
    }

    let number_end = input
        .char_indices()
        .find(|&(index, c)| {
            let sign = index == 0 && (c == '+' || c == '-');
            !(sign || c.is_ascii_digit() || c == '.')
        })
        .map(|(index, _)| index)
        .unwrap_or(input.len());
    let (number, suffix) = input.split_at(number_end);

    let (negative, unsigned) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };

    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (integer.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(QuantityError::MissingNumber(input.to_string()));
    }

    let mut mantissa: i128 = 0;
    for digit in integer.chars().chain(fraction.chars()) {
        let digit = digit
            .to_digit(10)
            .ok_or_else(|| QuantityError::MissingNumber(input.to_string()))?;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit)))
            .ok_or_else(|| QuantityError::OutOfRange(input.to_string()))?;
    }
    if negative {
        mantissa = -mantissa;
    }

    let (suffix_exponent, binary_exponent) =
        parse_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix(input.to_string()))?;

    let fraction_digits =
        i32::try_from(fraction.len()).map_err(|_| QuantityError::OutOfRange(input.to_string()))?;

    let decimal_exponent = suffix_exponent
        .checked_sub(fraction_digits)
        .ok_or_else(|| QuantityError::OutOfRange(input.to_string()))?;

    Ok(ParsedQuantity {
        mantissa,
        decimal_exponent,
        binary_exponent,
    })
}

/// Returns the decimal and binary exponents denoted by a suffix.
fn parse_suffix(suffix: &str) -> Option<(i32, u32)> {
    let exponents = match suffix {
        "" => (0, 0),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        "Ki" => (0, 1),
        "Mi" => (0, 2),
        "Gi" => (0, 3),
        "Ti" => (0, 4),
        "Pi" => (0, 5),
        "Ei" => (0, 6),
        other => {
            let exponent = other.strip_prefix(['e', 'E'])?;
            (exponent.parse::<i32>().ok()?, 0)
        }
    };

    Some(exponents)
}
