use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Decompose, drop combining marks and uppercase.
///
/// Length in characters is preserved for the precomposed accented letters
/// the games use ("È" becomes "E"), so positions stay aligned.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Equality that ignores case, accents, punctuation and whitespace, but
/// not transposed or substituted letters. Only ASCII letters survive the
/// comparison, so letters without a decomposition (Ø, Ł) are dropped.
pub fn relaxed_equal(a: &str, b: &str) -> bool {
    letters_only(&normalize(a)) == letters_only(&normalize(b))
}

fn letters_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

/// Normalized single character, used to compare letter guesses with the
/// solution position by position.
pub fn normalize_char(c: char) -> String {
    let mut buf = [0u8; 4];
    normalize(c.encode_utf8(&mut buf))
}
