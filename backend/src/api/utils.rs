//! API utility functions
//!
//! Small HTML helpers shared by the OAuth and SAML pages.

use axum::response::Html;
use quick_xml::escape::escape;

/// Wrap a body fragment into a minimal HTML page
pub fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}\n</body></html>\n",
        title = escape(title),
        body = body
    ))
}

/// Escape untrusted text for an HTML body or attribute
pub fn esc(text: &str) -> String {
    escape(text).into_owned()
}

/// `<pre>` block holding escaped text
pub fn pre(text: &str) -> String {
    format!("<pre>{}</pre>", esc(text))
}

/// Two-column table from (key, value) rows; both sides are escaped
pub fn table<'a, I>(headers: (&str, &str), rows: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut html = format!(
        "<table border=\"1\">\n<tr><th>{}</th><th>{}</th></tr>\n",
        esc(headers.0),
        esc(headers.1)
    );
    for (key, value) in rows {
        html.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>\n", esc(key), esc(&value)));
    }
    html.push_str("</table>");
    html
}

/// Paragraph of links
pub fn links(items: &[(&str, &str)]) -> String {
    items
        .iter()
        .map(|(href, label)| format!("<p><a href=\"{}\">{}</a></p>", esc(href), esc(label)))
        .collect::<Vec<_>>()
        .join("\n")
}
