//! The chat view's markdown subset: `**bold**` spans and line breaks.
//!
//! Everything is HTML-escaped before newlines become `<br>`, so agent text
//! can never inject markup.

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

/// Render agent text as safe HTML.
///
/// A `**` without a closing `**` on the same line is kept literally.
pub fn render_markdown(text: &str) -> String {
    let mut html = String::with_capacity(text.len() + 16);
    let mut rest = text;
    while let Some(open) = rest.find("**") {
        let after = &rest[open + 2..];
        let close = after
            .find("**")
            .filter(|end| !after[..*end].contains('\n'));
        match close {
            Some(end) => {
                escape_into(&mut html, &rest[..open]);
                html.push_str("<strong>");
                escape_into(&mut html, &after[..end]);
                html.push_str("</strong>");
                rest = &after[end + 2..];
            },
            None => {
                escape_into(&mut html, &rest[..open + 2]);
                rest = after;
            },
        }
    }
    escape_into(&mut html, rest);
    html.replace("\r\n", "<br>").replace('\n', "<br>")
}
