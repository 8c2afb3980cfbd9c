/// Strip exactly one leading underscore, the C symbol prefix on Darwin.
pub fn beautify_name(name: &str) -> &str {
    name.strip_prefix('_').unwrap_or(name)
}

/// Parse a number the way rizin prints them: `0x` hex, `0o` octal, `0b`
/// binary, or plain decimal. Surrounding whitespace is ignored.
pub fn parse_number(text: &str) -> Option<u64> {
    let s = text.trim();
    let (digits, radix) = if let Some(h) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (h, 16)
    } else if let Some(o) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (o, 8)
    } else if let Some(b) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (b, 2)
    } else {
        (s, 10)
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}
