//! Static import extraction from Python source text.
//!
//! Source is first folded into logical lines: comments are dropped, bracketed
//! and backslash-continued lines are joined, and every string literal is
//! collapsed to `"..."` whose body survives only when it is a dotted
//! identifier (so literal `import_module("x")` calls stay visible while
//! docstrings cannot masquerade as statements). Statements are then matched
//! textually; no code is executed.

use regex::Regex;
use std::sync::LazyLock;

use crate::bundler::settings::is_identifier;

/// `importlib.import_module("a.b")` / `__import__("a.b")` with a literal name.
static DYNAMIC_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:import_module|__import__)\(\s*"([A-Za-z_][A-Za-z0-9_.]*)""#)
        .expect("dynamic import pattern is valid")
});

/// Compound statement keywords that may carry an import after their colon.
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "try", "except", "finally", "with", "for", "while", "def", "class",
    "async",
];

/// One import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// Dotted module after `import` / `from` (without leading dots).
    pub module: String,
    /// Number of leading dots; `0` for absolute imports.
    pub level: usize,
    /// Names after `from ... import`; empty for plain `import`.
    pub names: Vec<String>,
    /// 1-based line the statement starts on.
    pub line: usize,
    /// Found through `import_module` / `__import__`.
    pub dynamic: bool,
}

impl ImportRecord {
    fn absolute(module: &str, line: usize, dynamic: bool) -> Self {
        Self {
            module: module.to_string(),
            level: 0,
            names: Vec::new(),
            line,
            dynamic,
        }
    }
}

/// Extracts every import statement from `source`.
pub fn extract_imports(source: &str) -> Vec<ImportRecord> {
    let mut records = Vec::new();
    for (line, text) in logical_lines(source) {
        for caps in DYNAMIC_IMPORT_RE.captures_iter(&text) {
            records.push(ImportRecord::absolute(&caps[1], line, true));
        }
        for statement in text.split(';') {
            parse_statement(statement.trim(), line, &mut records);
        }
    }
    records
}

fn parse_statement(statement: &str, line: usize, out: &mut Vec<ImportRecord>) {
    let statement = strip_block_header(statement);

    if let Some(rest) = keyword_rest(statement, "import") {
        for part in rest.split(',') {
            let name = strip_alias(part);
            if is_dotted(name) {
                out.push(ImportRecord::absolute(name, line, false));
            }
        }
    } else if let Some(rest) = keyword_rest(statement, "from") {
        let Some((target, names)) = split_from(rest) else {
            return;
        };
        let level = target.chars().take_while(|&c| c == '.').count();
        let module = target[level..].trim();
        if !module.is_empty() && !is_dotted(module) {
            return;
        }
        if level == 0 && module.is_empty() {
            return;
        }
        let names = names
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(strip_alias)
            .filter(|n| is_identifier(n))
            .map(str::to_string)
            .collect();
        out.push(ImportRecord {
            module: module.to_string(),
            level,
            names,
            line,
            dynamic: false,
        });
    }
}

/// `try: import x` -> `import x`, `def f(a: int): import y` -> `import y`
fn strip_block_header(statement: &str) -> &str {
    let first = statement
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    if BLOCK_KEYWORDS.contains(&first) {
        if let Some(colon) = header_colon(statement) {
            return strip_block_header(statement[colon + 1..].trim());
        }
    }
    statement
}

/// Byte offset of the first `:` outside brackets. Literals are already
/// collapsed, so only brackets can hide a colon.
fn header_colon(statement: &str) -> Option<usize> {
    let mut depth: usize = 0;
    for (i, c) in statement.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Text after a leading keyword followed by whitespace.
fn keyword_rest<'a>(statement: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = statement.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim_start())
}

/// Splits `..pkg.mod import a, b` at the `import` keyword.
fn split_from(rest: &str) -> Option<(&str, &str)> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while let Some(pos) = rest[i..].find("import") {
        let start = i + pos;
        let end = start + "import".len();
        let before_ok = start == 0 || bytes[start - 1].is_ascii_whitespace() || bytes[start - 1] == b'.';
        let after_ok = end < bytes.len() && (bytes[end].is_ascii_whitespace() || bytes[end] == b'(');
        if before_ok && after_ok {
            return Some((rest[..start].trim(), &rest[end..]));
        }
        i = end;
    }
    None
}

fn strip_alias(part: &str) -> &str {
    let part = part.trim();
    match part.split_once(char::is_whitespace) {
        Some((name, rest)) if rest.trim_start().starts_with("as") => name,
        _ => part,
    }
}

fn is_dotted(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

/// Folds source into `(first_line, text)` logical lines.
fn logical_lines(source: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut depth: usize = 0;
    let source = source.replace("\r\n", "\n");
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '\\' if chars.peek() == Some(&'\n') => {
                chars.next();
                line += 1;
                current.push(' ');
            }
            '\'' | '"' => {
                let triple = {
                    let mut ahead = chars.clone();
                    ahead.next() == Some(c) && ahead.next() == Some(c)
                };
                if triple {
                    chars.next();
                    chars.next();
                }
                let mut body = String::new();
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                if escaped == '\n' {
                                    line += 1;
                                }
                            }
                        }
                        '\n' => {
                            line += 1;
                            if !triple {
                                // Unterminated literal; recover at end of line.
                                break;
                            }
                            body.push(s);
                        }
                        _ if s == c && !triple => break,
                        _ if s == c && triple => {
                            let mut ahead = chars.clone();
                            if ahead.next() == Some(c) && ahead.next() == Some(c) {
                                chars.next();
                                chars.next();
                                break;
                            }
                            body.push(s);
                        }
                        _ => body.push(s),
                    }
                }
                current.push('"');
                if is_dotted(&body) {
                    current.push_str(&body);
                }
                current.push('"');
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '\n' => {
                line += 1;
                if depth > 0 {
                    current.push(' ');
                } else {
                    if !current.trim().is_empty() {
                        lines.push((start_line, std::mem::take(&mut current)));
                    }
                    current.clear();
                    start_line = line;
                }
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        lines.push((start_line, current));
    }
    lines
}
