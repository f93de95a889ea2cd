//! Key/value reader for the marker files a portal checkout scatters around.
//!
//! `bnd.bnd` and `MANIFEST.MF` use `Key: value`, `.gitrepo` uses `key = value` inside an
//! ini section, and `gradle.properties` is the plain Java grammar. One lenient reader
//! covers all of them: section headers, comments and blank lines are skipped, a trailing
//! unescaped backslash joins the next physical line, and the usual `\t`/`\n`/`\uXXXX`
//! escapes are decoded.

use std::collections::BTreeMap;

/// One `key`/`value` pair and the 1-based line it started on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// Every entry of a file, in declaration order. Repeated keys are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertiesFile {
    pub entries: Vec<Property>,
}

impl PropertiesFile {
    /// Last value declared for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rfind(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read every entry from `text`. Never fails; lines that are not entries are ignored.
#[must_use]
pub fn parse(text: &str) -> PropertiesFile {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((index, first)) = lines.next() {
        let mut logical = first.trim_start_matches(is_blank).to_string();
        while has_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start_matches(is_blank)),
                None => break,
            }
        }

        if let Some((key, value)) = split_entry(&logical) {
            entries.push(Property {
                key,
                value,
                line: index + 1,
            });
        }
    }

    PropertiesFile { entries }
}

fn split_entry(line: &str) -> Option<(String, String)> {
    if line.is_empty() || line.starts_with(['#', '!', '[']) {
        return None;
    }

    let mut escaped = false;
    let mut key_end = line.len();
    for (at, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || is_blank(c) {
            key_end = at;
            break;
        }
    }

    let rest = line[key_end..].trim_start_matches(is_blank);
    let rest = rest
        .strip_prefix(['=', ':'])
        .map_or(rest, |r| r.trim_start_matches(is_blank));

    Some((unescape(&line[..key_end]), unescape(rest)))
}

// An odd run of trailing backslashes means the last one escapes the newline.
fn has_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 1
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0C')
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0C'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        chars.nth(3);
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
        }
    }

    out
}
