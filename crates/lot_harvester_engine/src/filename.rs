use lot_harvester_core::Identifier;

/// Portable per-batch artifact name: `{stem}-{run_label}-{first}-{last}.csv`.
pub fn artifact_filename(
    stem: &str,
    run_label: &str,
    first: Identifier,
    last: Identifier,
    id_width: usize,
) -> String {
    let stem = sanitize_component(stem, "lots");
    let label = sanitize_component(run_label, "run");
    format!(
        "{stem}-{label}-{}-{}.csv",
        first.token(id_width),
        last.token(id_width)
    )
}

/// Replaces characters that are illegal in file names on common platforms
/// and collapses runs of underscores.
pub fn sanitize_component(input: &str, fallback: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    if compacted.chars().count() > 64 {
        compacted = compacted.chars().take(64).collect();
    }
    if compacted.is_empty() {
        compacted = fallback.to_string();
    }
    if is_reserved_windows_name(&compacted) {
        compacted.push('_');
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
