// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{ConfigError, Result};

/// Parse an interval expression such as `1h30m` into total seconds.
///
/// The expression is a concatenation of `N{s|m|h|d}` tokens with no
/// separators; the total must be greater than zero.
pub fn parse_interval(expression: &str) -> Result<u64> {
    let expr = expression.trim();
    let invalid = || ConfigError::IntervalInvalid(expression.to_string());

    if expr.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    let mut chars = expr.chars().peekable();

    while chars.peek().is_some() {
        let mut value: u64 = 0;
        let mut saw_digit = false;
        while let Some(c) = chars.peek().copied() {
            let Some(digit) = c.to_digit(10) else { break };
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or_else(invalid)?;
            saw_digit = true;
            chars.next();
        }
        if !saw_digit {
            return Err(invalid());
        }

        let multiplier = match chars.next().map(|c| c.to_ascii_lowercase()) {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3_600,
            Some('d') => 86_400,
            _ => return Err(invalid()),
        };
        total = total
            .checked_add(value.checked_mul(multiplier).ok_or_else(invalid)?)
            .ok_or_else(invalid)?;
    }

    if total == 0 {
        return Err(invalid());
    }
    Ok(total)
}
