//! Allow-list filter for the processor's initiation response.
//!
//! Herepay answers the initiate call with an HTML/script payload that
//! forwards the shopper to the hosted payment page. That payload is
//! relayed to the browser verbatim, so it is reduced to the tags and
//! attributes the official redirect snippet needs: the auto-submitting
//! form, its inputs, `script[src]`, and basic structural markup.
//! Everything else — unknown tags, event-handler attributes, comments,
//! declarations — is dropped. Text content always passes through.

/// Tags the redirect payload may contain, with their permitted attributes.
const ALLOWED_TAGS: &[(&str, &[&str])] = &[
    ("script", &["type", "src", "charset", "async", "defer"]),
    (
        "form",
        &["action", "method", "name", "id", "class", "target", "enctype"],
    ),
    (
        "input",
        &["type", "name", "value", "id", "class", "hidden", "readonly", "disabled"],
    ),
    ("button", &["type", "name", "value", "id", "class", "onclick"]),
    ("div", &["id", "class", "style"]),
    ("span", &["id", "class", "style"]),
    ("p", &["id", "class", "style"]),
    ("a", &["href", "target", "id", "class", "onclick"]),
    ("img", &["src", "alt", "width", "height", "id", "class"]),
    ("br", &[]),
    ("hr", &[]),
    ("strong", &[]),
    ("em", &[]),
    ("b", &[]),
    ("i", &[]),
    ("u", &[]),
    ("h1", &["id", "class"]),
    ("h2", &["id", "class"]),
    ("h3", &["id", "class"]),
    ("h4", &["id", "class"]),
    ("h5", &["id", "class"]),
    ("h6", &["id", "class"]),
    ("ul", &["id", "class"]),
    ("ol", &["id", "class"]),
    ("li", &["id", "class"]),
    ("table", &["id", "class"]),
    ("tr", &["id", "class"]),
    ("td", &["id", "class"]),
    ("th", &["id", "class"]),
    ("meta", &["name", "content", "http-equiv"]),
    ("noscript", &[]),
    ("style", &["type"]),
];

fn allowed_attributes(tag: &str) -> Option<&'static [&'static str]> {
    ALLOWED_TAGS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, attrs)| *attrs)
}

/// Reduces a processor response to the allow-listed markup.
///
/// Disallowed tags are removed but their text content is kept, matching
/// how the original integration relayed the payload.
pub fn sanitize_redirect_payload(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('<') {
        out.push_str(&rest[..idx]);
        let tag_start = &rest[idx..];

        if let Some(after_comment) = tag_start.strip_prefix("<!--") {
            match after_comment.find("-->") {
                Some(end) => {
                    rest = &after_comment[end + 3..];
                    continue;
                }
                None => return out, // unterminated comment swallows the rest
            }
        }

        match tag_end(tag_start) {
            Some(end) => {
                if let Some(clean) = rebuild_tag(&tag_start[1..end]) {
                    out.push_str(&clean);
                }
                rest = &tag_start[end + 1..];
            }
            None => return out, // unterminated tag: drop the remainder
        }
    }

    out.push_str(rest);
    out
}

/// Byte offset of the closing `>`, honoring quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in tag.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Re-emits a tag if its name is allowed, keeping only permitted attributes.
/// Returns None for disallowed tags and declarations.
fn rebuild_tag(inner: &str) -> Option<String> {
    let inner = inner.trim();
    if inner.is_empty() || inner.starts_with('!') || inner.starts_with('?') {
        return None;
    }

    if let Some(name) = inner.strip_prefix('/') {
        let name = name.trim().to_ascii_lowercase();
        allowed_attributes(&name)?;
        return Some(format!("</{}>", name));
    }

    let (body, self_closing) = match inner.strip_suffix('/') {
        Some(stripped) => (stripped.trim_end(), true),
        None => (inner, false),
    };

    let name_len = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_len].to_ascii_lowercase();
    let permitted = allowed_attributes(&name)?;

    let mut tag = String::with_capacity(body.len() + 2);
    tag.push('<');
    tag.push_str(&name);

    for (attr_name, attr_value) in parse_attributes(&body[name_len..]) {
        let attr_name = attr_name.to_ascii_lowercase();
        if !permitted.contains(&attr_name.as_str()) {
            continue;
        }
        tag.push(' ');
        tag.push_str(&attr_name);
        if let Some(value) = attr_value {
            tag.push_str("=\"");
            tag.push_str(&value.replace('"', "&quot;"));
            tag.push('"');
        }
    }

    if self_closing {
        tag.push_str(" /");
    }
    tag.push('>');
    Some(tag)
}

/// Splits a tag body into (name, optional value) attribute pairs.
/// Handles double-quoted, single-quoted, and bare values.
fn parse_attributes(mut rest: &str) -> Vec<(String, Option<String>)> {
    let mut attrs = Vec::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        if name_len == 0 {
            // Stray '=' or similar; skip one char to make progress.
            rest = &rest[rest.char_indices().nth(1).map(|(i, _)| i).unwrap_or(rest.len())..];
            continue;
        }
        let name = rest[..name_len].to_string();
        rest = rest[name_len..].trim_start();

        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remainder) = match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &after_eq[1..];
                    match inner.find(q) {
                        Some(end) => (inner[..end].to_string(), &inner[end + 1..]),
                        None => (inner.to_string(), ""),
                    }
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(after_eq.len());
                    (after_eq[..end].to_string(), &after_eq[end..])
                }
            };
            attrs.push((name, Some(value)));
            rest = remainder;
        } else {
            attrs.push((name, None));
        }
    }

    attrs
}
