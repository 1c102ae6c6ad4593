//! Text formatting for terminal output.

use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};

use crate::npm::PackageInfo;

/// Applies colors when enabled, passes text through otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn paint(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn strong(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn bold(&self, text: &str) -> String {
        if self.enabled {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn italic(&self, text: &str) -> String {
        if self.enabled {
            text.italic().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Compact count: `1.2M`, `3.4K`, or the plain number.
pub fn format_number(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// Age of `date` relative to `now`: `3d ago`, `2w ago`, `5m ago`, `1y ago`.
pub fn format_relative(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - date).num_seconds().unsigned_abs();
    // Partial days round up.
    let days = seconds.div_ceil(86_400);

    if days < 7 {
        format!("{days}d ago")
    } else if days < 30 {
        format!("{}w ago", days / 7)
    } else if days < 365 {
        format!("{}m ago", days / 30)
    } else {
        format!("{}y ago", days / 365)
    }
}

const TABLE_COLUMNS: [(&str, usize); 7] = [
    ("Package", 20),
    ("Version", 12),
    ("Downloads/week", 15),
    ("Stars", 8),
    ("Last Update", 12),
    ("TypeScript", 12),
    ("License", 10),
];

/// Fit `text` into `width` columns, truncating with an ellipsis.
fn fit(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        format!("{text:<width$}")
    } else {
        let head: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

/// Package comparison table.
pub fn package_table(packages: &[PackageInfo], now: DateTime<Utc>, palette: Palette) -> String {
    let separator = TABLE_COLUMNS
        .iter()
        .map(|(_, width)| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join("-+-");

    let header = TABLE_COLUMNS
        .iter()
        .map(|(title, width)| palette.bold(&fit(title, *width)))
        .collect::<Vec<_>>()
        .join(" | ");

    let mut lines = vec![header, separator];
    for pkg in packages {
        let widths: Vec<usize> = TABLE_COLUMNS.iter().map(|(_, w)| *w).collect();
        let stars = pkg
            .github_stars
            .map(format_number)
            .unwrap_or_else(|| "N/A".to_string());
        let updated = pkg
            .last_publish
            .map(|d| format_relative(d, now))
            .unwrap_or_else(|| "N/A".to_string());
        let types = if pkg.has_types {
            palette.paint(&fit("✓", widths[5]), Color::Green)
        } else {
            palette.paint(&fit("✗", widths[5]), Color::Red)
        };

        let row = [
            palette.paint(&fit(&pkg.name, widths[0]), Color::Cyan),
            fit(&pkg.version, widths[1]),
            fit(&format_number(pkg.weekly_downloads), widths[2]),
            fit(&stars, widths[3]),
            fit(&updated, widths[4]),
            types,
            fit(&pkg.license, widths[6]),
        ];
        lines.push(row.join(" | "));
    }
    lines.join("\n")
}

/// Two-column command/description listing.
pub fn command_table(commands: &[(&str, &str)], palette: Palette) -> String {
    commands
        .iter()
        .map(|(command, description)| {
            format!("  {} {description}", palette.paint(&fit(command, 16), Color::Yellow))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Light markdown rendering for assistant replies.
///
/// Handles headers, bullet and numbered lists, fenced code, inline code,
/// bold, and emphasis. Everything else passes through.
pub fn render_markdown(text: &str, palette: Palette) -> String {
    let mut out = Vec::new();
    let mut in_code = false;

    for line in text.lines() {
        if let Some(lang) = line.trim_start().strip_prefix("```") {
            if in_code {
                out.push(palette.paint("--- End ---", Color::Cyan));
                out.push(String::new());
            } else {
                let lang = if lang.trim().is_empty() { "Code" } else { lang.trim() };
                out.push(String::new());
                out.push(palette.paint(&format!("--- {lang} ---"), Color::Cyan));
            }
            in_code = !in_code;
            continue;
        }

        if in_code {
            out.push(palette.paint(&format!("  {line}"), Color::Green));
            continue;
        }

        if let Some(title) = line.strip_prefix("# ") {
            out.push(String::new());
            out.push(palette.strong(&format!("=== {} ===", title.to_uppercase()), Color::Blue));
            out.push(String::new());
        } else if let Some(title) = line.strip_prefix("## ") {
            out.push(String::new());
            out.push(palette.strong(&format!(">> {title}"), Color::Cyan));
        } else if let Some(title) = line.strip_prefix("### ") {
            out.push(palette.strong(&format!("  * {title}"), Color::White));
        } else if let Some((indent, content)) = bullet(line) {
            out.push(format!(
                "{indent}{}{}",
                palette.paint("• ", Color::Yellow),
                inline(content, palette)
            ));
        } else if let Some((indent, number, content)) = numbered(line) {
            out.push(format!(
                "{indent}{}{}",
                palette.paint(&format!("{number}. "), Color::Yellow),
                inline(content, palette)
            ));
        } else {
            out.push(inline(line, palette));
        }
    }

    out.join("\n")
}

fn bullet(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    let rest = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))?;
    Some((indent, rest))
}

fn numbered(line: &str) -> Option<(&str, &str, &str)> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = trimmed[digits..].strip_prefix(". ")?;
    Some((indent, &trimmed[..digits], rest))
}

/// Inline code, bold, and emphasis. Code spans are rendered verbatim.
fn inline(line: &str, palette: Palette) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(start) = rest.find('`') {
        let after = &rest[start + 1..];
        match after.find('`') {
            Some(end) if end > 0 => {
                out.push_str(&emphasis(&rest[..start], palette));
                out.push_str(&palette.paint(&format!("[{}]", &after[..end]), Color::Cyan));
                rest = &after[end + 1..];
            }
            _ => break,
        }
    }
    out.push_str(&emphasis(rest, palette));
    out
}

fn emphasis(text: &str, palette: Palette) -> String {
    let text = replace_delimited(text, "**", |inner| palette.bold(inner));
    replace_delimited(&text, "*", |inner| palette.italic(inner))
}

/// Replace every `delim…delim` span with `render(inner)`. The inner text
/// must not start or end with whitespace, so `2 * 3 * 4` is left alone.
/// Unpaired delimiters are kept as written.
fn replace_delimited(line: &str, delim: &str, render: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(start) = rest.find(delim) {
        let after = &rest[start + delim.len()..];
        let Some(end) = after.find(delim) else {
            break;
        };
        let inner = &after[..end];
        if inner.is_empty()
            || inner.starts_with(char::is_whitespace)
            || inner.ends_with(char::is_whitespace)
        {
            out.push_str(&rest[..start + delim.len()]);
            rest = after;
            continue;
        }
        out.push_str(&rest[..start]);
        out.push_str(&render(inner));
        rest = &after[end + delim.len()..];
    }
    out.push_str(rest);
    out
}
