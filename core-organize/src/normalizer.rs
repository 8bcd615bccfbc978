//! Name Normalizer
//!
//! Copies of the same archive usually differ only by a disambiguation suffix
//! added by browsers or file managers: `123.ab (1).zip`, `123.ab(2).zip`.
//! Normalizing strips every trailing `(n)` group from the stem so that all
//! copies share one key.

use regex::Regex;
use std::sync::LazyLock;

/// One or more `(digits)` groups, each optionally preceded by whitespace,
/// at the very end of a stem.
static DISAMBIGUATION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s*\(\d+\))+$").unwrap());

/// Strip disambiguation suffixes from `name`, keeping the extension.
///
/// A name that would become empty is returned unchanged.
///
/// ```ignore
/// assert_eq!(normalize("123.ab (1).zip"), "123.ab.zip");
/// assert_eq!(normalize("123.ab.zip"), "123.ab.zip");
/// ```
pub fn normalize(name: &str) -> String {
    let (stem, extension) = split_extension(name);
    let cleaned = DISAMBIGUATION_SUFFIX.replace(stem, "");

    if cleaned.is_empty() {
        return name.to_string();
    }

    format!("{}{}", cleaned, extension)
}

/// Whether `name` carries a disambiguation suffix.
pub fn has_suffix(name: &str) -> bool {
    normalize(name) != name
}

/// Split at the last dot, keeping the dot with the extension. A leading dot
/// (hidden file) does not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_suffix_variants() {
        assert_eq!(normalize("123.ab (1).zip"), "123.ab.zip");
        assert_eq!(normalize("123.ab(2).zip"), "123.ab.zip");
        assert_eq!(normalize("123.ab (1) (3).rar"), "123.ab.rar");
        assert_eq!(normalize("chair (12)"), "chair");
    }

    #[test]
    fn test_leaves_clean_names_alone() {
        assert_eq!(normalize("123.ab.zip"), "123.ab.zip");
        assert_eq!(normalize("table (old).zip"), "table (old).zip");
        assert_eq!(normalize("(1)v2.zip"), "(1)v2.zip");
        assert_eq!(normalize(".hidden"), ".hidden");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_never_empties_a_name() {
        assert_eq!(normalize("(1).zip"), "(1).zip");
        assert_eq!(normalize("(1)"), "(1)");
    }

    #[test]
    fn test_idempotent() {
        let names = [
            "123.ab (1).zip",
            "123.ab (1)(2).zip",
            "a  (1) (2) (3).7z",
            "(1).zip",
            "x(1) .zip",
            "no_extension (4)",
            "plain.zip",
            "..",
            "weird..(5)..zip",
        ];

        for name in names {
            let once = normalize(name);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_has_suffix() {
        assert!(has_suffix("123.ab (1).zip"));
        assert!(!has_suffix("123.ab.zip"));
    }
}
