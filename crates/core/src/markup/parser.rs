//! Forgiving HTML tokenizer and tree builder.
//!
//! Pages scraped from torrent sites are routinely malformed. The builder
//! never fails: unknown constructs become text, unclosed elements are closed
//! at end of input and an end tag only closes something when a matching
//! element is open.

use super::node::{MarkupNode, NodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Deepest element nesting kept. Deeper start tags close the innermost
/// element first, so the tree depth stays bounded on hostile pages.
pub const MAX_DEPTH: usize = 512;

/// Parse a page into a document node.
pub fn parse_html(input: &str) -> MarkupNode {
    let mut builder = TreeBuilder::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            let end = find_from(input, pos, "<").unwrap_or(bytes.len());
            builder.text(decode(&input[pos..end]));
            pos = end;
            continue;
        }

        let rest = &input[pos..];
        if rest.starts_with("<!--") {
            let (body, next) = until(input, pos + 4, "-->");
            builder.leaf(NodeKind::Comment, body.to_string());
            pos = next;
        } else if starts_with_ignore_case(rest, "<![CDATA[") {
            let (body, next) = until(input, pos + 9, "]]>");
            builder.text(body.to_string());
            pos = next;
        } else if rest.starts_with("<!") {
            let (body, next) = until(input, pos + 2, ">");
            builder.leaf(NodeKind::Declaration, body.trim().to_string());
            pos = next;
        } else if rest.starts_with("<?") {
            let (body, next) = until(input, pos + 2, ">");
            let body = body.trim().trim_end_matches('?').trim_end();
            builder.leaf(NodeKind::ProcessingInstruction, body.to_string());
            pos = next;
        } else if rest.starts_with("</") && next_is_alpha(bytes, pos + 2) {
            let (body, next) = until(input, pos + 2, ">");
            let name = tag_name(body);
            builder.close(&name);
            pos = next;
        } else if next_is_alpha(bytes, pos + 1) {
            let tag = read_start_tag(input, pos + 1);
            pos = tag.end;
            let name = tag.name.clone();
            if VOID_ELEMENTS.contains(&name.as_str()) || tag.self_closing {
                builder.element_leaf(tag.name, tag.attrs);
            } else if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                builder.open(tag.name, tag.attrs);
                let closing = format!("</{}", name);
                let body_end = find_ignore_case(input, pos, &closing).unwrap_or(bytes.len());
                if body_end > pos {
                    builder.text(input[pos..body_end].to_string());
                }
                builder.close(&name);
                pos = if body_end < bytes.len() {
                    until(input, body_end, ">").1
                } else {
                    body_end
                };
            } else {
                builder.open(tag.name, tag.attrs);
            }
        } else {
            // A lone '<' is plain text.
            builder.text("<".to_string());
            pos += 1;
        }
    }

    builder.finish()
}

struct TreeBuilder {
    stack: Vec<MarkupNode>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![MarkupNode::document()],
        }
    }

    fn current(&mut self) -> &mut MarkupNode {
        // The document node is never popped before `finish`.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let current = self.current();
        if let Some(last) = current.children.last_mut() {
            if last.kind == NodeKind::Text {
                last.text.push_str(&text);
                return;
            }
        }
        current.children.push(MarkupNode::text_node(text));
    }

    fn leaf(&mut self, kind: NodeKind, text: String) {
        self.current()
            .children
            .push(MarkupNode::with_kind(kind, String::new(), text));
    }

    fn element_leaf(&mut self, name: String, attrs: Vec<(String, String)>) {
        self.current().children.push(MarkupNode::element(name, attrs));
    }

    fn open(&mut self, name: String, attrs: Vec<(String, String)>) {
        if self.stack.len() > MAX_DEPTH {
            self.pop();
        }
        self.stack.push(MarkupNode::element(name, attrs));
    }

    /// Close the innermost open element called `name`, and everything inside it.
    fn close(&mut self, name: &str) {
        let Some(index) = self
            .stack
            .iter()
            .rposition(|n| n.kind == NodeKind::Element && n.name == name)
        else {
            return;
        };
        while self.stack.len() > index {
            self.pop();
        }
    }

    fn pop(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some(node) = self.stack.pop() {
            self.current().children.push(node);
        }
    }

    fn finish(mut self) -> MarkupNode {
        while self.stack.len() > 1 {
            self.pop();
        }
        self.stack.pop().unwrap_or_else(MarkupNode::document)
    }
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    end: usize,
}

fn read_start_tag(input: &str, start: usize) -> StartTag {
    let bytes = input.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && is_name_byte(bytes[pos]) {
        pos += 1;
    }
    let name = input[start..pos].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        match bytes[pos] {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' => {
                if bytes.get(pos + 1) == Some(&b'>') {
                    self_closing = true;
                    pos += 2;
                    break;
                }
                pos += 1;
                continue;
            }
            _ => {}
        }

        let name_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>' | b'/')
        {
            pos += 1;
        }
        let attr_name = input[name_start..pos].to_ascii_lowercase();
        if attr_name.is_empty() {
            pos += 1;
            continue;
        }

        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let mut value = String::new();
        if bytes.get(pos) == Some(&b'=') {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            match bytes.get(pos) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let value_start = pos + 1;
                    let value_end = input[value_start..]
                        .find(quote as char)
                        .map(|i| value_start + i)
                        .unwrap_or(bytes.len());
                    value = decode(&input[value_start..value_end]);
                    pos = (value_end + 1).min(bytes.len());
                }
                _ => {
                    let value_start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && bytes[pos] != b'>'
                    {
                        pos += 1;
                    }
                    value = decode(&input[value_start..pos]);
                }
            }
        }
        attrs.push((attr_name, value));
    }

    StartTag {
        name,
        attrs,
        self_closing,
        end: pos,
    }
}

fn decode(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

fn tag_name(body: &str) -> String {
    body.trim()
        .split(|c: char| c.is_ascii_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn next_is_alpha(bytes: &[u8], pos: usize) -> bool {
    bytes.get(pos).is_some_and(|b| b.is_ascii_alphabetic())
}

fn find_from(input: &str, from: usize, needle: &str) -> Option<usize> {
    input[from..].find(needle).map(|i| from + i)
}

/// Text between `from` and `terminator`, plus the position after the terminator.
fn until<'a>(input: &'a str, from: usize, terminator: &str) -> (&'a str, usize) {
    let from = from.min(input.len());
    match find_from(input, from, terminator) {
        Some(end) => (&input[from..end], end + terminator.len()),
        None => (&input[from..], input.len()),
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn find_ignore_case(input: &str, from: usize, needle: &str) -> Option<usize> {
    let lower = input[from..].to_ascii_lowercase();
    lower.find(needle).map(|i| from + i)
}
