//! Preparing locally written source text for execution in the guest.

/// Strip the indentation of the first line from every line.
///
/// Source captured from inside a nested block (a test body, an `impl`, a
/// raw string literal) carries the indentation of its surroundings. The guest
/// parses it standalone, so the first non-blank line's leading whitespace is
/// removed from every line while relative nesting is preserved. Leading blank
/// lines are dropped; lines indented less than the first line lose only the
/// whitespace they have.
pub fn normalize_indentation(code: &str) -> String {
    let lines: Vec<&str> = code
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .collect();

    let Some(first) = lines.first() else {
        return String::new();
    };
    let prefix = &first[..first.len() - first.trim_start().len()];

    lines
        .iter()
        .map(|line| match line.strip_prefix(prefix) {
            Some(rest) => rest,
            None => line.trim_start(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Name of the function defined by `source`, if it starts with a `def`.
pub fn function_name(source: &str) -> Option<&str> {
    let header = source.lines().find(|line| !line.trim().is_empty())?.trim();
    let rest = header.strip_prefix("def ")?;
    let name = rest[..rest.find('(')?].trim();
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    valid.then_some(name)
}
