//! Spanish tax identifier (NIF / NIE / CIF) checksum predicate.

const DNI_LETTERS: &[u8; 23] = b"TRWAGMYFPDXBNJZSQVHLCKE";
const CIF_LETTERS: &[u8; 10] = b"JABCDEFGHI";

/// Check whether `value` is a well-formed Spanish tax ID with a valid
/// control character.
///
/// Accepts personal NIFs (`12345678Z`, plus the `K`/`L`/`M` variants),
/// foreigner NIEs (`X1234567L`) and entity NIFs formerly called CIF
/// (`B12345674`). Case and surrounding whitespace are ignored.
pub fn is_valid_tax_id(value: &str) -> bool {
    let id = value.trim().to_ascii_uppercase();
    let bytes = id.as_bytes();
    if bytes.len() != 9 || !bytes.iter().all(u8::is_ascii_alphanumeric) {
        return false;
    }

    match bytes[0] {
        b'0'..=b'9' => dni_letter_matches(&id[..8], bytes[8]),
        b'X' | b'Y' | b'Z' => {
            let prefix = match bytes[0] {
                b'X' => '0',
                b'Y' => '1',
                _ => '2',
            };
            let digits = format!("{prefix}{}", &id[1..8]);
            dni_letter_matches(&digits, bytes[8])
        }
        b'K' | b'L' | b'M' => dni_letter_matches(&id[1..8], bytes[8]),
        b'A'..=b'W' if b"ABCDEFGHJNPQRSUVW".contains(&bytes[0]) => entity_control_matches(bytes),
        _ => false,
    }
}

fn dni_letter_matches(digits: &str, letter: u8) -> bool {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match digits.parse::<u32>() {
        Ok(n) => DNI_LETTERS[(n % 23) as usize] == letter,
        Err(_) => false,
    }
}

fn entity_control_matches(bytes: &[u8]) -> bool {
    let body = &bytes[1..8];
    if !body.iter().all(u8::is_ascii_digit) {
        return false;
    }

    let mut sum = 0u32;
    for (i, b) in body.iter().enumerate() {
        let d = u32::from(b - b'0');
        if i % 2 == 0 {
            // odd positions (1st, 3rd, ...) are doubled and their digits summed
            let doubled = d * 2;
            sum += doubled / 10 + doubled % 10;
        } else {
            sum += d;
        }
    }
    let control = (10 - sum % 10) % 10;
    let digit = b'0' + control as u8;
    let letter = CIF_LETTERS[control as usize];
    let actual = bytes[8];

    match bytes[0] {
        // entities whose control must be a letter
        b'N' | b'P' | b'Q' | b'R' | b'S' | b'W' => actual == letter,
        // entities whose control must be a digit
        b'A' | b'B' | b'E' | b'H' => actual == digit,
        _ => actual == digit || actual == letter,
    }
}
