//! Cleanup and validation of OCR output for Indian registration plates.

/// State and union territory codes. Order matters: it breaks ties when
/// correcting a misread prefix.
pub const STATE_CODES: [&str; 37] = [
    "AP", "AR", "AS", "BR", "CG", "GA", "GJ", "HR", "HP", "JH", "KA", "KL", "MP", "MH", "MN", "ML",
    "MZ", "NL", "OD", "PB", "RJ", "SK", "TN", "TS", "TR", "UK", "UP", "WB", "AN", "CH", "DN", "DD",
    "DL", "JK", "LA", "LD", "PY",
];

// Mismatched lengths count as infinitely far.
fn hamming(a: &str, b: &str) -> usize {
    strsim::hamming(a, b).unwrap_or(usize::MAX)
}

/// Returns the state code closest to `prefix`, first in list order on ties.
pub fn nearest_state_code(prefix: &str) -> &'static str {
    let prefix = prefix.to_ascii_uppercase();
    if let Some(code) = STATE_CODES.iter().find(|code| **code == prefix) {
        return *code;
    }
    // min_by_key keeps the last minimum, we want the first.
    let mut best = STATE_CODES[0];
    let mut best_distance = hamming(&prefix, best);
    for code in STATE_CODES.iter().skip(1) {
        let distance = hamming(&prefix, code);
        if distance < best_distance {
            best = *code;
            best_distance = distance;
        }
    }
    best
}

/// Turns raw OCR text into a plate candidate. The result may still fail
/// `is_valid`.
pub fn normalize(raw: &str) -> String {
    let cleaned: Vec<char> = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    let mut plate: String = cleaned
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let between_digits = i > 0
                && i + 1 < cleaned.len()
                && cleaned[i - 1].is_ascii_digit()
                && cleaned[i + 1].is_ascii_digit();
            if c == 'O' && between_digits {
                '0'
            } else {
                c
            }
        })
        .collect();

    if plate.len() >= 2 {
        let code = nearest_state_code(&plate[..2]);
        plate.replace_range(..2, code);
    }
    plate
}

/// `^[A-Z]{2}[0-9]{2}[A-Z]{2}[0-9]{4}$`
pub fn is_valid(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes[4..6].iter().all(u8::is_ascii_uppercase)
        && bytes[6..].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_canonical_format() {
        assert!(is_valid("KA05MJ1234"));
        assert!(!is_valid("KA5MJ1234"));
        assert!(!is_valid("ka05mj1234"));
        assert!(!is_valid("KA05MJ12345"));
        assert!(!is_valid("XKA05MJ1234"));
        assert!(!is_valid("KA05M11234"));
        assert!(!is_valid(""));
    }

    #[test]
    fn normalizes_lowercase_and_punctuation() {
        assert_eq!(normalize("ka05mj1234"), "KA05MJ1234");
        assert!(is_valid(&normalize("ka05mj1234")));
        assert_eq!(normalize(" KA-05 MJ.1234\n"), "KA05MJ1234");
    }

    #[test]
    fn rewrites_o_only_between_digits() {
        assert_eq!(normalize("KA05MJ1O3O"), "KA05MJ103O");
        // Letter position after a digit stays a letter.
        assert_eq!(normalize("KA05OJ1234"), "KA05OJ1234");
        // Trailing O has no digit after it.
        assert_eq!(normalize("KA05MJ123O"), "KA05MJ123O");
        // Both neighbours are judged before any substitution.
        assert_eq!(normalize("KA1OO1"), "KA1OO1");
    }

    #[test]
    fn corrects_state_code_prefix() {
        assert_eq!(nearest_state_code("KA"), "KA");
        assert_eq!(nearest_state_code("MX"), "MP");
        assert_eq!(nearest_state_code("M1"), "MP");
        assert_eq!(nearest_state_code("8R"), "AR");
        assert_eq!(nearest_state_code("ZZ"), "MZ");
        // Every code is two substitutions away; the first one listed wins.
        assert_eq!(nearest_state_code("Q9"), "AP");
        assert_eq!(normalize("MX12AB1234"), "MP12AB1234");
        assert_eq!(normalize("K405MJ1234"), "KA05MJ1234");
    }

    #[test]
    fn short_input_keeps_prefix_untouched() {
        assert_eq!(normalize("x"), "X");
        assert_eq!(normalize("!!"), "");
    }

    #[test]
    fn normalize_is_stable_for_validity() {
        let samples = [
            "ka05mj1234",
            "MX12AB1234",
            "KA 05 MJ 1O34",
            "1105MJ1234",
            "garbage",
            "DL8CAF5O31",
            "TN-O9-BZ-99OO",
            "",
        ];
        for s in samples.iter() {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(is_valid(&once), is_valid(&twice), "input {:?}", s);
            let cleaned = s
                .to_uppercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .count();
            assert!(once.len() <= cleaned, "input {:?}", s);
        }
    }

    #[test]
    fn valid_plates_start_with_a_state_code() {
        for s in ["xx05mj1234", "1105MJ1234", "K405MJ1234"].iter() {
            let plate = normalize(s);
            assert!(is_valid(&plate));
            assert!(STATE_CODES.contains(&&plate[..2]));
        }
    }
}
