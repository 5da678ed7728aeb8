// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Normalize a name to lowercase alphanumeric.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Normalize an RFID UID to uppercase hex without separators
/// (`"04:a1:b2"` → `"04A1B2"`).
pub fn normalize_uid(uid: &str) -> String {
    uid.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Stranger-Things"), "strangerthings");
        assert_eq!(normalize_name("LOST"), "lost");
        assert_eq!(normalize_name("foo_bar-baz"), "foobarbaz");
    }

    #[test]
    fn test_normalize_uid() {
        assert_eq!(normalize_uid("04:a1:b2:c3"), "04A1B2C3");
        assert_eq!(normalize_uid(" 04 A1 "), "04A1");
        assert_eq!(normalize_uid(""), "");
    }
}
