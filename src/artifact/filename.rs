//! Local file names derived from untrusted remote names.

/// Reduce `name` to a single path component made of `[A-Za-z0-9._-]`.
///
/// Directory parts are dropped (a trailing separator names the directory
/// itself), every run of other characters becomes `_`, and a leading dot is
/// neutralized so the result can be neither hidden nor `..`. Falls back to
/// `fallback` when nothing usable remains.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let base = name
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .replace('\0', "");

    let mut out = String::with_capacity(base.len());
    let mut in_run = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    if out.is_empty() {
        return fallback.to_string();
    }
    if out.starts_with('.') {
        out = format!("_{}", out.trim_start_matches('.'));
    }
    out
}
