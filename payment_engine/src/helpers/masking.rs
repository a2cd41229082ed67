/// Masks a card number, keeping the first six and last four digits (`411111******1111`). Spaces and dashes are
/// stripped first. Numbers that are too short to mask safely are masked entirely.
pub fn mask_pan(pan: &str) -> String {
    let digits: String = pan.chars().filter(|c| c.is_ascii_digit()).collect();
    let len = digits.len();
    if len < 12 {
        return "*".repeat(len);
    }
    format!("{}{}{}", &digits[..6], "*".repeat(len - 10), &digits[len - 4..])
}

/// Best-effort card brand detection from the leading digits.
pub fn card_brand(pan: &str) -> Option<&'static str> {
    let digits: String = pan.chars().filter(|c| c.is_ascii_digit()).take(4).collect();
    let prefix2 = digits.get(..2).and_then(|p| p.parse::<u32>().ok())?;
    let prefix4 = digits.get(..4).and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
    match (digits.chars().next(), prefix2, prefix4) {
        (Some('4'), _, _) => Some("VISA"),
        (_, 51..=55, _) | (_, _, 2221..=2720) => Some("MASTERCARD"),
        (_, _, 2200..=2204) => Some("MIR"),
        (_, 34 | 37, _) => Some("AMEX"),
        (_, 62, _) => Some("UNIONPAY"),
        _ => None,
    }
}
