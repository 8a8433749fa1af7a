//! YIN <-> YANG conversion (spec.md §6.4).
//!
//! YANG statements (`keyword argument { substatements }` or `keyword
//! argument;`) map one-for-one onto YIN elements in the `urn:ietf:params:
//! xml:ns:yang:yin:1` namespace: the keyword becomes the element name and
//! the argument becomes either an attribute or a child element, per a
//! small per-keyword table (most arguments are attributes; a handful of
//! well-known ones such as `description`/`reference`/`contact`/`organization`
//! render their argument as a `<text>` child instead, matching `yin.c`'s
//! `arg_is_elem` table). This module only implements that mechanical
//! mapping and its inverse; it does no schema semantic checking.

use crate::error::TokenError;
use crate::token::{tokenize, SourceKind, Token, TokenChain, TokenKind};

const YIN_NAMESPACE: &str = "urn:ietf:params:xml:ns:yang:yin:1";

/// Keywords whose argument is rendered as a `<text>` child element instead
/// of an XML attribute, because their argument text is typically multi-line
/// prose that would be awkward to carry as an attribute value.
const ARG_AS_ELEMENT: &[&str] = &["description", "reference", "contact", "organization", "error-message"];

fn arg_is_element(keyword: &str) -> bool {
    ARG_AS_ELEMENT.contains(&keyword)
}

struct Statement {
    keyword: String,
    argument: Option<String>,
    children: Vec<Statement>,
}

/// Parse a YANG token chain into a tree of statements. Only the brace/
/// semicolon/identifier/string shape is used; YIN conversion does not care
/// about which keywords are well-known YANG statements versus extensions.
fn parse_statements(tokens: &[Token], pos: &mut usize) -> Vec<Statement> {
    let mut out = Vec::new();
    while *pos < tokens.len() {
        if matches!(tokens[*pos].kind, TokenKind::Newline) {
            *pos += 1;
            continue;
        }
        if matches!(tokens[*pos].kind, TokenKind::RBrace) {
            break;
        }
        let keyword = tokens[*pos].value.clone();
        *pos += 1;
        let mut argument = None;
        while *pos < tokens.len() && !matches!(tokens[*pos].kind, TokenKind::LBrace | TokenKind::Semicolon | TokenKind::Newline) {
            argument.get_or_insert_with(String::new);
            if let Some(a) = argument.as_mut() {
                if !a.is_empty() {
                    a.push(' ');
                }
                a.push_str(&tokens[*pos].value);
            }
            *pos += 1;
        }
        while *pos < tokens.len() && matches!(tokens[*pos].kind, TokenKind::Newline) {
            *pos += 1;
        }
        let children = if *pos < tokens.len() && matches!(tokens[*pos].kind, TokenKind::LBrace) {
            *pos += 1;
            let kids = parse_statements(tokens, pos);
            if *pos < tokens.len() && matches!(tokens[*pos].kind, TokenKind::RBrace) {
                *pos += 1;
            }
            kids
        } else {
            if *pos < tokens.len() && matches!(tokens[*pos].kind, TokenKind::Semicolon) {
                *pos += 1;
            }
            Vec::new()
        };
        out.push(Statement { keyword, argument, children });
    }
    out
}

fn escape_xml_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn escape_xml_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn write_statement(stmt: &Statement, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(&stmt.keyword);

    let arg_as_elem = stmt.argument.is_some() && arg_is_element(&stmt.keyword);
    if let Some(arg) = &stmt.argument {
        if !arg_as_elem {
            out.push_str(&format!(" name=\"{}\"", escape_xml_attr(arg)));
        }
    }

    if stmt.children.is_empty() && !arg_as_elem {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    if arg_as_elem {
        let arg = stmt.argument.as_deref().unwrap_or("");
        out.push_str(&"  ".repeat(depth + 1));
        out.push_str(&format!("<text>{}</text>\n", escape_xml_text(arg)));
    }
    for child in &stmt.children {
        write_statement(child, out, depth + 1);
    }
    out.push_str(&indent);
    out.push_str(&format!("</{}>\n", stmt.keyword));
}

/// Render a tokenized YANG module as a YIN XML document.
pub fn yang_to_yin(chain: &TokenChain) -> String {
    let tokens = chain.tokens();
    let mut pos = 0;
    let statements = parse_statements(tokens, &mut pos);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    if let Some(module) = statements.first() {
        out.push_str(&format!(
            "<{} name=\"{}\" xmlns=\"{}\">\n",
            module.keyword,
            module.argument.as_deref().unwrap_or(""),
            YIN_NAMESPACE
        ));
        for child in &module.children {
            write_statement(child, &mut out, 1);
        }
        out.push_str(&format!("</{}>\n", module.keyword));
    }
    out
}

/// Minimal hand-rolled XML element reader sufficient for round-tripping
/// YIN produced by [`yang_to_yin`]; not a general-purpose XML parser.
struct XmlCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl<'a> XmlCursor<'a> {
    fn new(s: &'a str) -> Self {
        XmlCursor { bytes: s.as_bytes(), pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && (self.bytes[self.pos] as char).is_whitespace() {
            self.pos += 1;
        }
    }

    fn skip_prolog(&mut self) {
        self.skip_ws();
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b'<' && self.bytes.get(self.pos + 1) == Some(&b'?') {
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b'>' {
                self.pos += 1;
            }
            self.pos += 1;
            self.skip_ws();
        }
    }

    fn parse_element(&mut self) -> Option<XmlElement> {
        self.skip_ws();
        if self.pos >= self.bytes.len() || self.bytes[self.pos] != b'<' {
            return None;
        }
        self.pos += 1;
        let name_start = self.pos;
        while self.pos < self.bytes.len() && !(self.bytes[self.pos] as char).is_whitespace() && self.bytes[self.pos] != b'>' && self.bytes[self.pos] != b'/' {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.bytes[name_start..self.pos]).unwrap_or("").to_string();

        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            if self.pos >= self.bytes.len() {
                break;
            }
            if self.bytes[self.pos] == b'/' || self.bytes[self.pos] == b'>' {
                break;
            }
            let key_start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b'=' {
                self.pos += 1;
            }
            let key = std::str::from_utf8(&self.bytes[key_start..self.pos]).unwrap_or("").trim().to_string();
            self.pos += 1; // '='
            self.pos += 1; // opening quote
            let val_start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b'"' {
                self.pos += 1;
            }
            let val = std::str::from_utf8(&self.bytes[val_start..self.pos]).unwrap_or("").to_string();
            self.pos += 1; // closing quote
            if key != "xmlns" {
                attrs.push((key, unescape_xml(&val)));
            }
        }

        if self.bytes.get(self.pos) == Some(&b'/') {
            self.pos += 2; // "/>"
            return Some(XmlElement { name, attrs, text: String::new(), children: Vec::new() });
        }
        self.pos += 1; // '>'

        let mut children = Vec::new();
        let mut text = String::new();
        loop {
            self.skip_ws();
            if self.pos >= self.bytes.len() {
                break;
            }
            if self.bytes[self.pos] == b'<' {
                if self.bytes.get(self.pos + 1) == Some(&b'/') {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'>' {
                        self.pos += 1;
                    }
                    self.pos += 1;
                    break;
                }
                if let Some(child) = self.parse_element() {
                    children.push(child);
                }
            } else {
                let text_start = self.pos;
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'<' {
                    self.pos += 1;
                }
                text.push_str(std::str::from_utf8(&self.bytes[text_start..self.pos]).unwrap_or(""));
            }
        }
        Some(XmlElement { name, attrs, text: unescape_xml(text.trim()), children })
    }
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&quot;", "\"").replace("&amp;", "&")
}

fn element_to_yang(el: &XmlElement, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push_str(&el.keyword_name());
    if let Some((_, v)) = el.attrs.iter().find(|(k, _)| k == "name") {
        out.push(' ');
        out.push('"');
        out.push_str(v);
        out.push('"');
    } else if let Some(text_child) = el.children.iter().find(|c| c.name == "text") {
        out.push(' ');
        out.push('"');
        out.push_str(&text_child.text.replace('"', "\\\""));
        out.push('"');
    }
    let real_children: Vec<&XmlElement> = el.children.iter().filter(|c| c.name != "text").collect();
    if real_children.is_empty() {
        out.push_str(";\n");
        return;
    }
    out.push_str(" {\n");
    for child in real_children {
        element_to_yang(child, out, depth + 1);
    }
    out.push_str(&indent);
    out.push_str("}\n");
}

impl XmlElement {
    fn keyword_name(&self) -> String {
        self.name.clone()
    }
}

/// Recover a YANG token chain from a YIN document produced by
/// [`yang_to_yin`] (or one shaped the same way): render it back to YANG
/// surface syntax, then re-tokenize with [`tokenize`] so the result is
/// indistinguishable from direct-YANG tokenization.
pub fn yin_to_yang(xml: &str) -> Result<TokenChain, TokenError> {
    let mut cursor = XmlCursor::new(xml);
    cursor.skip_prolog();
    let root = cursor.parse_element().ok_or(TokenError::EmptyRetokenize { pos: crate::error::Position::default() })?;

    let mut out = String::new();
    out.push_str(&root.keyword_name());
    if let Some((_, v)) = root.attrs.iter().find(|(k, _)| k == "name") {
        out.push_str(&format!(" \"{v}\""));
    }
    out.push_str(" {\n");
    for child in root.children.iter().filter(|c| c.name != "text") {
        element_to_yang(child, &mut out, 1);
    }
    out.push_str("}\n");

    tokenize(&out, SourceKind::Yang, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_container() {
        let src = "module ex { container top { leaf name { type string; } } }";
        let chain = tokenize(src, SourceKind::Yang, false).unwrap();
        let yin = yang_to_yin(&chain);
        assert!(yin.contains("<module name=\"ex\""));
        assert!(yin.contains("<container name=\"top\">"));
        assert!(yin.contains("<leaf name=\"name\">"));

        let back = yin_to_yang(&yin).unwrap();
        let kinds: Vec<&str> = back.tokens().iter().map(|t| t.value.as_str()).collect();
        assert!(kinds.contains(&"container"));
        assert!(kinds.contains(&"leaf"));
    }

    #[test]
    fn description_argument_renders_as_text_child() {
        let src = r#"module ex { description "hello world"; }"#;
        let chain = tokenize(src, SourceKind::Yang, false).unwrap();
        let yin = yang_to_yin(&chain);
        assert!(yin.contains("<description>"));
        assert!(yin.contains("<text>hello world</text>"));
    }
}
