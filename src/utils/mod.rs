pub mod time;

/// Generate a url-safe unique id.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Turn a display name into an identifier usable in `{{...}}` expressions.
///
/// Lowercases ascii letters and collapses every run of other characters into a single `-`.
pub fn normalize_id(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
