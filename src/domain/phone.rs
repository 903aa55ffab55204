//! Phone number handling for Indian mobile numbers as the WhatsApp
//! provider expects them: `91` followed by exactly ten digits.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a plausible mobile number inside free-form email text.
static PHONE_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+?91[\s-]?)?0?[6-9]\d{4}[\s-]?\d{5}").unwrap());

/// Normalizes a raw phone string to the canonical `91XXXXXXXXXX` form.
///
/// Accepts ten digits (prefixes `91`), eleven digits with a leading zero
/// (drops the zero), and anything already in canonical form. Longer
/// inputs keep their last twelve digits. Returns `None` when no valid
/// number can be derived.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let candidate = if digits.len() == 12 && digits.starts_with("91") {
        digits
    } else if digits.len() == 10 {
        format!("91{digits}")
    } else if digits.len() == 11 && digits.starts_with('0') {
        format!("91{}", &digits[1..])
    } else if digits.len() > 12 {
        digits[digits.len() - 12..].to_string()
    } else {
        return None;
    };

    if candidate.len() == 12 && candidate.starts_with("91") {
        Some(candidate)
    } else {
        None
    }
}

/// Pulls the first normalizable phone number out of an email body.
pub fn extract_phone(body: &str) -> Option<String> {
    PHONE_CANDIDATE
        .find_iter(body)
        .find_map(|m| normalize_phone(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_digits_get_country_code() {
        assert_eq!(normalize_phone("9876543210").as_deref(), Some("919876543210"));
    }

    #[test]
    fn leading_zero_is_dropped() {
        assert_eq!(normalize_phone("09876543210").as_deref(), Some("919876543210"));
    }

    #[test]
    fn canonical_form_passes_through() {
        assert_eq!(normalize_phone("919876543210").as_deref(), Some("919876543210"));
    }

    #[test]
    fn punctuation_is_stripped() {
        assert_eq!(normalize_phone("+91 98765-43210").as_deref(), Some("919876543210"));
    }

    #[test]
    fn overlong_input_keeps_last_twelve_digits() {
        assert_eq!(
            normalize_phone("919876543210919876543210").as_deref(),
            Some("919876543210")
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(normalize_phone("abc"), None);
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("12345"), None);
    }

    #[test]
    fn extracts_from_email_body() {
        let body = "Hi, I saw your listing.\nPlease call me on +91 98765 43210 after 6pm.";
        assert_eq!(extract_phone(body).as_deref(), Some("919876543210"));
    }

    #[test]
    fn body_without_number_yields_none() {
        assert_eq!(extract_phone("no contact details here"), None);
    }
}
