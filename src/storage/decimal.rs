//! A decimal-fixed number: an integer mantissa plus a scale (number of
//! digits after the point), so `INCRBYFLOAT` accumulates without the
//! rounding drift a plain `f64` add would introduce.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::OutOfRange);
        }
        let (neg, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::OutOfRange);
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(Error::OutOfRange);
        }
        let digits = format!("{int_part}{frac_part}");
        let digits = if digits.is_empty() { "0" } else { &digits };
        let mut mantissa: i128 = digits.parse().map_err(|_| Error::OutOfRange)?;
        if neg {
            mantissa = -mantissa;
        }
        Ok(Decimal {
            mantissa,
            scale: frac_part.len() as u32,
        })
    }

    fn rescale_to(self, scale: u32) -> Option<i128> {
        if scale >= self.scale {
            self.mantissa.checked_mul(10i128.pow(scale - self.scale))
        } else {
            None
        }
    }

    pub fn add(self, other: Decimal) -> Result<Decimal, Error> {
        let scale = self.scale.max(other.scale);
        let a = self.rescale_to(scale).ok_or(Error::OutOfRange)?;
        let b = other.rescale_to(scale).ok_or(Error::OutOfRange)?;
        let mantissa = a.checked_add(b).ok_or(Error::OutOfRange)?;
        Ok(Decimal { mantissa, scale })
    }

    /// Renders in the shortest form that round-trips: trailing zeros and a
    /// trailing `.` are trimmed, matching the outer protocol's float reply
    /// formatting.
    pub fn to_trimmed_string(self) -> String {
        if self.scale == 0 {
            return self.mantissa.to_string();
        }
        let neg = self.mantissa < 0;
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
        } else {
            digits
        };
        let split_at = padded.len() - scale;
        let (int_part, frac_part) = padded.split_at(split_at);
        let frac_trimmed = frac_part.trim_end_matches('0');
        let mut out = String::new();
        if neg {
            out.push('-');
        }
        out.push_str(int_part);
        if !frac_trimmed.is_empty() {
            out.push('.');
            out.push_str(frac_trimmed);
        }
        out
    }
}
