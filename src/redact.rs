/// PII helpers for patient documents
///
/// CPF numbers and phone numbers are masked before they reach logs or the
/// attendant tables, keeping just enough to tell patients apart.

/// Strip everything but ASCII digits: "123.456.789-01" -> "12345678901"
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// A CPF is accepted when it has exactly 11 digits once punctuation is removed
pub fn is_valid_cpf(cpf: &str) -> bool {
    digits_only(cpf).len() == 11
}

/// Mask a CPF, keeping the first three and the two check digits.
/// Example: "12345678901" -> "123.***.**-01"
/// Malformed values keep only their last two digits: "12345" -> "***45".
/// Empty (or digit-free) values become "-".
pub fn cpf(cpf: &str) -> String {
    let digits = digits_only(cpf);
    if digits.is_empty() {
        return "-".to_string();
    }

    if digits.len() >= 11 {
        format!("{}.***.**-{}", &digits[..3], &digits[9..11])
    } else if digits.len() <= 2 {
        "*".repeat(digits.len())
    } else {
        format!("{}{}", "*".repeat(digits.len() - 2), &digits[digits.len() - 2..])
    }
}

/// Redact a phone number, keeping only the last 4 digits visible.
/// Example: "11987654321" -> "*******4321"
pub fn phone_number(phone: &str) -> String {
    let digits = digits_only(phone);

    if digits.len() <= 4 {
        // Too short to meaningfully redact
        return "*".repeat(digits.len());
    }

    let visible = &digits[digits.len() - 4..];
    format!("{}{}", "*".repeat(digits.len() - 4), visible)
}



#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    #[kani::unwind(16)]
    fn cpf_mask_never_panics() {
        let data: [u8; 14] = kani::any();
        if let Ok(s) = std::str::from_utf8(&data) {
            let _ = cpf(s);
        }
    }

    #[kani::proof]
    #[kani::unwind(14)]
    fn phone_redaction_never_panics() {
        let data: [u8; 12] = kani::any();
        if let Ok(s) = std::str::from_utf8(&data) {
            let _ = phone_number(s);
        }
    }
}
