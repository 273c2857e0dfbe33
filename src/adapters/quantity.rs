//! Kubernetes resource quantity validation
//!
//! Accepts the same grammar as the API server:
//!
//! ```text
//! <quantity>     ::= <signedNumber><suffix>
//! <number>       ::= <digits> | <digits>.<digits> | <digits>. | .<digits>
//! <suffix>       ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI>     ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI>    ::= m | "" | k | M | G | T | P | E
//! <decimalExponent> ::= "e" <signedNumber> | "E" <signedNumber>
//! ```

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::{Error, Result};

const BINARY_SI: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SI: [&str; 8] = ["m", "", "k", "M", "G", "T", "P", "E"];

/// Parse a quota quantity, rejecting malformed and negative values.
///
/// `field` names the spec field in the error message.
pub fn parse_quantity(field: &str, raw: &str) -> Result<Quantity> {
    let value = raw.trim();
    let invalid = || {
        Error::ValidationError(format!(
            "{} must be a valid resource quantity, got {:?}",
            field, raw
        ))
    };

    let (negative, unsigned) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        Some(_) => (false, value),
        None => return Err(invalid()),
    };

    let number_len = number_prefix_len(unsigned);
    let (number, suffix) = unsigned.split_at(number_len);
    if !is_number(number) || !is_suffix(suffix) {
        return Err(invalid());
    }

    if negative && number.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        return Err(Error::ValidationError(format!(
            "{} must not be negative, got {:?}",
            field, raw
        )));
    }

    Ok(Quantity(value.to_string()))
}

/// Length of the leading run of digits and dots
fn number_prefix_len(s: &str) -> usize {
    s.bytes()
        .take_while(|b| b.is_ascii_digit() || *b == b'.')
        .count()
}

fn is_number(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    match parts.next() {
        None => is_digits(whole),
        Some(frac) => {
            !frac.contains('.')
                && (whole.is_empty() || is_digits(whole))
                && (frac.is_empty() || is_digits(frac))
                && !(whole.is_empty() && frac.is_empty())
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_suffix(s: &str) -> bool {
    if BINARY_SI.contains(&s) || DECIMAL_SI.contains(&s) {
        return true;
    }
    match s.strip_prefix('e').or_else(|| s.strip_prefix('E')) {
        Some(exp) => {
            let digits = exp
                .strip_prefix('-')
                .or_else(|| exp.strip_prefix('+'))
                .unwrap_or(exp);
            is_digits(digits)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_quantities() {
        for raw in ["10", "500m", "20Gi", "1.5", ".5", "2.", "128974848", "1e3", "1E-2", "12k", "1E", "+4"] {
            assert!(parse_quantity("quota.cpu", raw).is_ok(), "{} should parse", raw);
        }
    }

    #[test]
    fn preserves_the_value() {
        assert_eq!(parse_quantity("quota.memory", " 20Gi ").unwrap().0, "20Gi");
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "not-a-number", "Gi", "1.2.3", ".", "10 Gi", "1Xi", "1e", "1ee3", "0x10"] {
            let err = parse_quantity("quota.cpu", raw).unwrap_err();
            assert!(!err.is_transient());
            assert!(err.to_string().contains("quota.cpu"), "{}", err);
        }
    }

    #[test]
    fn rejects_negative_values() {
        let err = parse_quantity("quota.memory", "-1Gi").unwrap_err();
        assert!(err.to_string().contains("negative"));
        assert!(parse_quantity("quota.memory", "-0").is_ok());
    }
}
