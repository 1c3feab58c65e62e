//! UK postcode parsing. Accepts complete postcodes ("E8 3RH") and bare
//! outcodes ("E8"), in any case and with any internal spacing.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Postcode {
    Full { outcode: String, incode: String },
    Outcode(String),
}

impl Postcode {
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        if (5..=7).contains(&compact.len()) {
            let (outcode, incode) = compact.split_at(compact.len() - 3);
            if is_outcode(outcode) && is_incode(incode) {
                return Some(Postcode::Full {
                    outcode: outcode.to_string(),
                    incode: incode.to_string(),
                });
            }
        }

        is_outcode(&compact).then(|| Postcode::Outcode(compact))
    }

    pub fn outcode(&self) -> &str {
        match self {
            Postcode::Full { outcode, .. } => outcode,
            Postcode::Outcode(outcode) => outcode,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Postcode::Full { .. })
    }
}

impl fmt::Display for Postcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Postcode::Full { outcode, incode } => write!(f, "{outcode} {incode}"),
            Postcode::Outcode(outcode) => f.write_str(outcode),
        }
    }
}

/// One or two letters, a digit, then an optional letter or digit.
fn is_outcode(s: &str) -> bool {
    let letters = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if !(1..=2).contains(&letters) {
        return false;
    }
    let rest: Vec<char> = s.chars().skip(letters).collect();
    match rest.as_slice() {
        [d] => d.is_ascii_digit(),
        [d, tail] => d.is_ascii_digit() && tail.is_ascii_alphanumeric(),
        _ => false,
    }
}

fn is_incode(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    matches!(chars.as_slice(), [d, a, b] if d.is_ascii_digit() && a.is_ascii_alphabetic() && b.is_ascii_alphabetic())
}

/// Uppercase, single internal space. `None` when the input is not postcode-shaped.
pub fn normalize_postcode(raw: &str) -> Option<String> {
    Postcode::parse(raw).map(|p| p.to_string())
}

pub fn is_full_postcode(raw: Option<&str>) -> bool {
    raw.and_then(Postcode::parse).is_some_and(|p| p.is_full())
}

pub fn extract_outcode(raw: Option<&str>) -> Option<String> {
    raw.and_then(Postcode::parse).map(|p| p.outcode().to_string())
}

/// Scan free-text (typically an address line) for a postcode. Complete
/// postcodes may appear anywhere; a bare outcode is only accepted as the
/// final token, since short alphanumerics elsewhere are usually flat or
/// road numbers.
pub fn find_postcode_in(text: &str) -> Option<Postcode> {
    let tokens: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    for window in tokens.windows(2).rev() {
        if let Some(p @ Postcode::Full { .. }) = Postcode::parse(&format!("{}{}", window[0], window[1])) {
            if is_outcode(&window[0].to_ascii_uppercase()) {
                return Some(p);
            }
        }
    }
    for token in tokens.iter().rev() {
        if let Some(p @ Postcode::Full { .. }) = Postcode::parse(token) {
            return Some(p);
        }
    }
    tokens
        .last()
        .and_then(|t| Postcode::parse(t))
        .filter(|p| !p.is_full())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_and_partial_postcodes() {
        assert!(is_full_postcode(Some("E8 3RH")));
        assert!(is_full_postcode(Some("e83rh")));
        assert!(is_full_postcode(Some("SW1A 1AA")));
        assert!(!is_full_postcode(Some("E8")));
        assert!(!is_full_postcode(None));
        assert!(!is_full_postcode(Some("not a postcode")));
    }

    #[test]
    fn normalizes_spacing_and_case() {
        assert_eq!(normalize_postcode(" n16   7ux ").as_deref(), Some("N16 7UX"));
        assert_eq!(normalize_postcode("e3").as_deref(), Some("E3"));
        assert_eq!(extract_outcode(Some("E3 4AA")).as_deref(), Some("E3"));
        assert_eq!(extract_outcode(Some("")), None);
    }

    #[test]
    fn finds_postcode_inside_address() {
        let p = find_postcode_in("Flat 2, 14 Mare Street, London E8 3RH").unwrap();
        assert_eq!(p.to_string(), "E8 3RH");

        let p = find_postcode_in("Roman Road, Bow, London, E3").unwrap();
        assert_eq!(p, Postcode::Outcode("E3".into()));

        assert!(find_postcode_in("Flat 3, 12 Mare Street").is_none());
    }
}
