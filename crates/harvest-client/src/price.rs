/// Parse a storefront price label into a number.
///
/// Labels use `.` for thousands and `,` for decimals, surrounded by a
/// currency sign and other text: `"$ 1.234,50"` is `1234.5`, `"+ $300"` is
/// `300.0`. The first run of digits and separators is used. Returns `None`
/// when the label holds no digits (e.g. `"Gratis"`).
pub fn normalize_price(label: &str) -> Option<f64> {
    let start = label.find(|c: char| c.is_ascii_digit())?;
    let number: String = label[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    number.trim_end_matches('.').parse().ok()
}

/// Parse a price published in structured data, where `.` is the decimal
/// separator. Falls back to [`normalize_price`] for display labels.
pub fn parse_structured_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    trimmed.parse().ok().or_else(|| normalize_price(trimmed))
}
