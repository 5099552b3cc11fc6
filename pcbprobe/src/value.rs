//! Engineering-notation values
//!
//! Parses and formats the magnitudes people type while probing a board:
//! resistance (`4k7`, `4.7k`, `470`, `10M`), capacitance (`100n`, `0.1uF`,
//! `22p`) and voltage (`0.65`, `650mV`, `3.3V`). Formatting is canonical, so
//! `format(parse(format(parse(s)))) == format(parse(s))` for every accepted `s`.
//!
//! `TBD`, `DNP`, `NC`, `?` and empty input are not failures: they parse to
//! [`Reading::Unmeasured`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Invalid value '{input}': {reason}")]
    InvalidValue { input: String, reason: String },
    #[error("Ambiguous capacitance '{input}': add a p, n or u unit")]
    AmbiguousUnit { input: String },
}

fn invalid(input: &str, reason: impl Into<String>) -> ValueError {
    ValueError::InvalidValue {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Outcome of parsing a value field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    /// Placeholder text such as `TBD` or `DNP`
    Unmeasured,
    Measured(T),
}

impl<T> Reading<T> {
    pub fn measured(self) -> Option<T> {
        match self {
            Reading::Measured(v) => Some(v),
            Reading::Unmeasured => None,
        }
    }
}

/// Whether `text` is one of the placeholders used for "not measured yet".
pub fn is_unmeasured(text: &str) -> bool {
    let text = text.trim();
    text.is_empty()
        || ["?", "TBD", "DNP", "NC"]
            .iter()
            .any(|p| text.eq_ignore_ascii_case(p))
}

/// Resistance in ohms.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resistance(f64);

impl Resistance {
    const UNITS: [(f64, &'static str); 3] = [(1e6, "M"), (1e3, "k"), (1.0, "R")];

    pub fn from_ohms(ohms: f64) -> Self {
        Self(ohms)
    }

    pub fn ohms(self) -> f64 {
        self.0
    }

    /// Parse `470`, `4.7k`, `4k7`, `10M`, `0R22`, `4.7 kOhm`.
    ///
    /// The unit letter is case-insensitive, so `m` means mega like `M`.
    pub fn parse(input: &str) -> Result<Reading<Self>, ValueError> {
        if is_unmeasured(input) {
            return Ok(Reading::Unmeasured);
        }
        let compact = compact(input);
        let body = strip_word(&compact, &["ohms", "ohm", "Ω", "Ω"]);

        let (number, multiplier) = match find_unit(body) {
            None => (body.to_string(), 1.0),
            Some((pos, unit)) => {
                let multiplier = match unit.to_ascii_lowercase() {
                    'r' => 1.0,
                    'k' => 1e3,
                    'm' => 1e6,
                    _ => return Err(invalid(input, format!("unknown resistance unit '{unit}'"))),
                };
                let tail = &body[pos + unit.len_utf8()..];
                (embed_decimal(input, &body[..pos], tail)?, multiplier)
            }
        };

        let magnitude = parse_magnitude(input, &number)?;
        Ok(Reading::Measured(Self(magnitude * multiplier)))
    }
}

impl fmt::Display for Resistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.0, &Self::UNITS))
    }
}

/// Capacitance, stored in nanofarads.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capacitance(f64);

impl Capacitance {
    const UNITS: [(f64, &'static str); 3] = [(1e3, "uF"), (1.0, "nF"), (1e-3, "pF")];

    pub fn from_nanofarads(nf: f64) -> Self {
        Self(nf)
    }

    pub fn nanofarads(self) -> f64 {
        self.0
    }

    /// Parse `100n`, `100nF`, `0.1u`, `22pF`, `4n7`.
    ///
    /// A bare number is rejected with [`ValueError::AmbiguousUnit`].
    pub fn parse(input: &str) -> Result<Reading<Self>, ValueError> {
        if is_unmeasured(input) {
            return Ok(Reading::Unmeasured);
        }
        let compact = compact(input);
        let body = compact.as_str();

        let Some((pos, unit)) = find_unit(body) else {
            parse_magnitude(input, body)?;
            return Err(ValueError::AmbiguousUnit {
                input: input.to_string(),
            });
        };
        let scale = match unit {
            'p' | 'P' => 1e-3,
            'n' | 'N' => 1.0,
            'u' | 'U' | 'µ' | 'μ' => 1e3,
            'f' | 'F' => return Err(invalid(input, "farads need a p, n or u prefix")),
            _ => return Err(invalid(input, format!("unknown capacitance unit '{unit}'"))),
        };
        let rest = &body[pos + unit.len_utf8()..];
        let tail = rest
            .strip_suffix(|c: char| c.eq_ignore_ascii_case(&'f'))
            .unwrap_or(rest);
        let number = embed_decimal(input, &body[..pos], tail)?;

        let magnitude = parse_magnitude(input, &number)?;
        Ok(Reading::Measured(Self(magnitude * scale)))
    }
}

impl fmt::Display for Capacitance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.0, &Self::UNITS))
    }
}

/// Voltage in volts (diode forward voltage, Vbe/Vth).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Voltage(f64);

impl Voltage {
    pub fn from_volts(volts: f64) -> Self {
        Self(volts)
    }

    pub fn volts(self) -> f64 {
        self.0
    }

    /// Parse `0.65`, `0.65V`, `650m`, `650mV`. A bare number is volts.
    pub fn parse(input: &str) -> Result<Reading<Self>, ValueError> {
        if is_unmeasured(input) {
            return Ok(Reading::Unmeasured);
        }
        let compact = compact(input);
        let body = compact
            .strip_suffix(|c: char| c.eq_ignore_ascii_case(&'v'))
            .unwrap_or(&compact);
        let (number, scale) = match body.strip_suffix(|c: char| c.eq_ignore_ascii_case(&'m')) {
            Some(number) => (number, 1e-3),
            None => (body, 1.0),
        };
        let magnitude = parse_magnitude(input, number)?;
        Ok(Reading::Measured(Self(magnitude * scale)))
    }
}

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millivolts = (self.0 * 1000.0).round();
        if millivolts < 1000.0 {
            write!(f, "{millivolts:.0}mV")
        } else {
            write!(f, "{:.2}V", millivolts / 1000.0)
        }
    }
}

fn compact(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

fn strip_word<'a>(s: &'a str, words: &[&str]) -> &'a str {
    for word in words {
        if s.len() < word.len() || !s.is_char_boundary(s.len() - word.len()) {
            continue;
        }
        let (head, tail) = s.split_at(s.len() - word.len());
        if tail.eq_ignore_ascii_case(word) {
            return head;
        }
    }
    s
}

/// First letter in `s` and its byte offset.
fn find_unit(s: &str) -> Option<(usize, char)> {
    s.char_indices().find(|(_, c)| c.is_alphabetic())
}

/// Join the digits around a unit letter: `4` + `7` is `4.7` (from `4k7`).
fn embed_decimal(input: &str, head: &str, tail: &str) -> Result<String, ValueError> {
    if tail.is_empty() {
        if head.is_empty() {
            return Err(invalid(input, "no digits"));
        }
        return Ok(head.to_string());
    }
    if !tail.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(input, format!("unexpected '{tail}' after unit")));
    }
    if head.contains('.') {
        return Err(invalid(input, "decimal point and embedded unit both given"));
    }
    let head = if head.is_empty() { "0" } else { head };
    Ok(format!("{head}.{tail}"))
}

fn parse_magnitude(input: &str, number: &str) -> Result<f64, ValueError> {
    if number.starts_with('-') {
        return Err(invalid(input, "negative magnitude"));
    }
    let mut digits = 0;
    let mut points = 0;
    for c in number.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return Err(invalid(input, format!("unexpected character '{c}'"))),
        }
    }
    if points > 1 {
        return Err(invalid(input, "multiple decimal points"));
    }
    if digits == 0 {
        return Err(invalid(input, "no digits"));
    }
    number
        .parse::<f64>()
        .map_err(|e| invalid(input, e.to_string()))
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Render `value` in the largest unit that keeps it at or above 1.
///
/// `units` is ordered largest first, each step a factor of 1000; the last
/// entry also takes everything below its scale.
fn render(value: f64, units: &[(f64, &str)]) -> String {
    let mut idx = units
        .iter()
        .position(|(scale, _)| value >= *scale)
        .unwrap_or(units.len() - 1);
    let mut shown = round3(value / units[idx].0);
    // 999.9996 rounds to 1000 and has to move up a unit to stay canonical
    while idx > 0 && shown >= 1000.0 {
        idx -= 1;
        shown = round3(value / units[idx].0);
    }
    let text = format!("{shown:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", text, units[idx].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohms(s: &str) -> f64 {
        Resistance::parse(s).unwrap().measured().unwrap().ohms()
    }

    fn nf(s: &str) -> f64 {
        Capacitance::parse(s).unwrap().measured().unwrap().nanofarads()
    }

    fn canonical_r(s: &str) -> String {
        Resistance::parse(s).unwrap().measured().unwrap().to_string()
    }

    fn canonical_c(s: &str) -> String {
        Capacitance::parse(s).unwrap().measured().unwrap().to_string()
    }

    #[test]
    fn test_parse_resistance() {
        assert!((ohms("4700") - 4700.0).abs() < 1e-9);
        assert!((ohms("4.7k") - 4700.0).abs() < 1e-6);
        assert!((ohms("4k7") - 4700.0).abs() < 1e-6);
        assert!((ohms("4K7") - 4700.0).abs() < 1e-6);
        assert!((ohms("10M") - 10e6).abs() < 1e-3);
        assert!((ohms("10m") - 10e6).abs() < 1e-3);
        assert!((ohms("0R22") - 0.22).abs() < 1e-9);
        assert!((ohms("470R") - 470.0).abs() < 1e-9);
        assert!((ohms("4.7 kOhm") - 4700.0).abs() < 1e-6);
    }

    #[test]
    fn test_format_resistance() {
        assert_eq!(canonical_r("4700"), "4.7k");
        assert_eq!(canonical_r("4k7"), "4.7k");
        assert_eq!(canonical_r("470"), "470R");
        assert_eq!(canonical_r("1000000"), "1M");
        assert_eq!(canonical_r("2.20k"), "2.2k");
        assert_eq!(canonical_r("0"), "0R");
        assert_eq!(canonical_r("999.9999"), "1k");
    }

    #[test]
    fn test_parse_capacitance() {
        assert!((nf("100n") - 100.0).abs() < 1e-9);
        assert!((nf("0.1u") - 100.0).abs() < 1e-9);
        assert!((nf("0.1uF") - 100.0).abs() < 1e-9);
        assert!((nf("22p") - 0.022).abs() < 1e-12);
        assert!((nf("4n7") - 4.7).abs() < 1e-9);
        assert!((nf("10µF") - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_format_capacitance() {
        assert_eq!(canonical_c("0.1u"), "100nF");
        assert_eq!(canonical_c("100000n"), "100uF");
        assert_eq!(canonical_c("95n"), "95nF");
        assert_eq!(canonical_c("0.5n"), "500pF");
        assert_eq!(canonical_c("22pF"), "22pF");
        assert_eq!(canonical_c("4.7uF"), "4.7uF");
    }

    #[test]
    fn test_bare_capacitance_is_ambiguous() {
        assert_eq!(
            Capacitance::parse("100"),
            Err(ValueError::AmbiguousUnit {
                input: "100".to_string()
            })
        );
        // a malformed number is still reported as invalid, not ambiguous
        assert!(matches!(
            Capacitance::parse("1.0.0"),
            Err(ValueError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_values() {
        for bad in ["abc", "-10k", "1.2.3", "4.7k7", "10x", "k", "4k7k"] {
            assert!(
                matches!(Resistance::parse(bad), Err(ValueError::InvalidValue { .. })),
                "{bad} should be rejected"
            );
        }
        for bad in ["-1n", "1.2.3u", "10F", "10nFF", "x"] {
            assert!(
                matches!(Capacitance::parse(bad), Err(ValueError::InvalidValue { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_unmeasured_sentinels() {
        for text in ["", "  ", "TBD", "tbd", "DNP", "?", "NC"] {
            assert_eq!(Resistance::parse(text), Ok(Reading::Unmeasured));
            assert_eq!(Capacitance::parse(text), Ok(Reading::Unmeasured));
            assert_eq!(Voltage::parse(text), Ok(Reading::Unmeasured));
        }
    }

    #[test]
    fn test_canonical_form_is_stable() {
        let resistances = ["4700", "4k7", "0.47", "1M5", "12345678", "999.9996", "33R", "0R1"];
        for s in resistances {
            let once = canonical_r(s);
            assert_eq!(canonical_r(&once), once, "resistance {s}");
        }
        let capacitances = ["0.1u", "4n7", "100000n", "1p", "0.0004n", "999.9999n", "47uF"];
        for s in capacitances {
            let once = canonical_c(s);
            assert_eq!(canonical_c(&once), once, "capacitance {s}");
        }
    }

    #[test]
    fn test_voltage() {
        let v = |s: &str| Voltage::parse(s).unwrap().measured().unwrap();
        assert_eq!(v("0.65").to_string(), "650mV");
        assert_eq!(v("650m").to_string(), "650mV");
        assert_eq!(v("650mV").to_string(), "650mV");
        assert_eq!(v("3.3V").to_string(), "3.30V");
        assert_eq!(v("0.9996").to_string(), "1.00V");
        assert!(Voltage::parse("-0.7").is_err());
    }
}
