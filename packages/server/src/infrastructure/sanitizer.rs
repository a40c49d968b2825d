//! チャット本文の HTML 変換とサニタイズ
//!
//! 入力はまず HTML エスケープし、インラインの Markdown（強調、コード、
//! 打ち消し線、URL の自動リンク）だけをタグに変換する。最後に ammonia の
//! 許可リストで掃除してから配送する。

use std::collections::HashSet;

use ammonia::Builder;

use crate::domain::MessageRenderer;

const ALLOWED_TAGS: [&str; 7] = ["p", "br", "em", "strong", "del", "code", "a"];

/// (区切り記号, タグ, 内側も変換するか)
const SPANS: [(&str, &str, bool); 4] = [
    ("`", "code", false),
    ("**", "strong", true),
    ("~~", "del", true),
    ("*", "em", true),
];

pub struct MarkdownRenderer {
    cleaner: Builder<'static>,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut cleaner = Builder::empty();
        cleaner
            .add_tags(ALLOWED_TAGS)
            .add_tag_attributes("a", ["href"])
            .url_schemes(HashSet::from(["http", "https", "mailto"]))
            .link_rel(Some("noopener noreferrer nofollow"));
        Self { cleaner }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRenderer for MarkdownRenderer {
    fn render(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        let escaped = escape_html(trimmed);
        let lines: Vec<String> = escaped.lines().map(render_line).collect();
        let html = format!("<p>{}</p>", lines.join("<br>"));
        self.cleaner.clean(&html).to_string()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn find_url_start(text: &str) -> Option<usize> {
    ["https://", "http://"]
        .iter()
        .filter_map(|scheme| text.find(scheme))
        .min()
}

/// URL 部分はリンクに、それ以外は強調記法を変換する
fn render_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = find_url_start(rest) {
        out.push_str(&render_spans(&rest[..start]));
        let tail = &rest[start..];
        let len = tail.find(char::is_whitespace).unwrap_or(tail.len());
        let url = &tail[..len];
        out.push_str(&format!("<a href=\"{url}\">{url}</a>"));
        rest = &tail[len..];
    }
    out.push_str(&render_spans(rest));
    out
}

fn render_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some((idx, ch)) = rest
        .char_indices()
        .find(|(_, c)| matches!(c, '`' | '*' | '~'))
    {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        match try_span(tail) {
            Some((consumed, html)) => {
                out.push_str(&html);
                rest = &tail[consumed..];
            }
            None => {
                out.push(ch);
                rest = &tail[ch.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `tail` の先頭から始まる強調記法を 1 つ変換し、消費したバイト数と HTML を返す
fn try_span(tail: &str) -> Option<(usize, String)> {
    for (delimiter, tag, nested) in SPANS {
        let Some(after_open) = tail.strip_prefix(delimiter) else {
            continue;
        };
        if after_open.is_empty() || after_open.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(close) = after_open.find(delimiter) else {
            continue;
        };
        let inner = &after_open[..close];
        if inner.is_empty() || inner.ends_with(char::is_whitespace) {
            continue;
        }
        let inner_html = if nested {
            render_spans(inner)
        } else {
            inner.to_string()
        };
        let consumed = delimiter.len() * 2 + close;
        return Some((consumed, format!("<{tag}>{inner_html}</{tag}>")));
    }
    None
}
