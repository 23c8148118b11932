//! Fixed-header templating, variable-field tokenization primitives, the
//! boolean/timestamp formatters, and the checksum (§4.1).

use chrono::{DateTime, Utc};

/// "YYYYMMDD    HHMMSS", four spaces standing in for the timezone slot
/// (§3: positions 9-12 are blank in UTC form).
pub fn timestamp(now: DateTime<Utc>) -> String {
    format!("{}    {}", now.format("%Y%m%d"), now.format("%H%M%S"))
}

pub fn timestamp_now() -> String {
    timestamp(Utc::now())
}

/// 'Y' | 'N'.
pub fn sipbool(x: bool) -> char {
    if x {
        'Y'
    } else {
        'N'
    }
}

/// Inverted sense used for patron-status bits 0-3: ' ' if truthy, 'Y' if
/// falsy.
pub fn denied(x: bool) -> char {
    if x {
        ' '
    } else {
        'Y'
    }
}

/// Sense used for patron-status bits 4-13: 'Y' if truthy, ' ' if falsy.
pub fn boolspace(x: bool) -> char {
    if x {
        'Y'
    } else {
        ' '
    }
}

/// `"{id}{value}{delimiter}"`, always emitted even for an empty value.
pub fn add_field(delimiter: char, id: &str, value: &str) -> String {
    let mut s = String::with_capacity(id.len() + value.len() + 1);
    s.push_str(id);
    s.push_str(value);
    s.push(delimiter);
    s
}

/// Like [`add_field`], but emits nothing at all when `value` is absent or
/// empty.
pub fn maybe_add(delimiter: char, id: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => add_field(delimiter, id, v),
        _ => String::new(),
    }
}

/// Zero-padded four-char decimal count.
pub fn add_count(n: usize) -> String {
    format!("{:04}", n.min(9999))
}

/// Sum-of-bytes two's complement such that appending it to `data` and
/// summing everything yields 0 mod 0x10000 (§4.1, §6.2).
pub fn compute_checksum(data: &[u8]) -> u16 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (0x10000u32.wrapping_sub(sum & 0xFFFF) & 0xFFFF) as u16
}

pub fn checksum_hex(data: &[u8]) -> String {
    format!("{:04X}", compute_checksum(data))
}

/// A frame (including its trailing `AY{seq}AZ{hhhh}`) is valid iff the sum
/// of all its bytes is 0 mod 0x10000.
pub fn verify_checksum(frame_with_trailer: &[u8]) -> bool {
    let sum: u32 = frame_with_trailer.iter().map(|&b| b as u32).sum();
    (sum & 0xFFFF) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_has_blank_timezone_slot() {
        let now = "2024-03-05T08:42:37Z".parse::<DateTime<Utc>>().unwrap();
        let ts = timestamp(now);
        assert_eq!(ts.len(), 18);
        assert_eq!(&ts[8..12], "    ");
        assert_eq!(&ts[0..8], "20240305");
        assert_eq!(&ts[12..18], "084237");
    }

    #[test]
    fn bool_encodings_match_prescribed_senses() {
        assert_eq!(sipbool(true), 'Y');
        assert_eq!(sipbool(false), 'N');
        assert_eq!(denied(true), ' ');
        assert_eq!(denied(false), 'Y');
        assert_eq!(boolspace(true), 'Y');
        assert_eq!(boolspace(false), ' ');
    }

    #[test]
    fn add_field_always_emits_even_when_empty() {
        assert_eq!(add_field('|', "AO", "inst"), "AOinst|");
        assert_eq!(add_field('|', "AO", ""), "AO|");
    }

    #[test]
    fn maybe_add_is_empty_string_for_missing_values() {
        assert_eq!(maybe_add('|', "AF", None), "");
        assert_eq!(maybe_add('|', "AF", Some("")), "");
        assert_eq!(maybe_add('|', "AF", Some("hi")), "AFhi|");
    }

    #[test]
    fn add_count_is_zero_padded_to_four() {
        assert_eq!(add_count(0), "0000");
        assert_eq!(add_count(7), "0007");
        assert_eq!(add_count(12345), "9999");
    }

    #[test]
    fn checksum_round_trips_for_every_sequence_digit() {
        for seq in 0..10u8 {
            let body = format!("99                              AY{}AZ", seq);
            let cksum = checksum_hex(body.as_bytes());
            let full = format!("{}{}", body, cksum);
            assert!(verify_checksum(full.as_bytes()));
        }
    }

    #[test]
    fn tampered_frame_fails_checksum() {
        let body = "99                              AY3AZ";
        let cksum = checksum_hex(body.as_bytes());
        let mut full = format!("{}{}", body, cksum);
        // Flip one character in the body, trailer unchanged.
        full.replace_range(2..3, "X");
        assert!(!verify_checksum(full.as_bytes()));
    }
}
