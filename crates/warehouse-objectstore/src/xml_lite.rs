//! Minimal tag-value extraction for the handful of XML response shapes
//! the S3/GCS REST APIs return (upload ids, ETags, listed keys). Not a
//! general XML parser: it assumes the well-formed, non-nested-repeat
//! shape these specific endpoints are documented to return.

pub(crate) fn first_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

pub(crate) fn all_tags<'a>(body: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(&open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(&close) else {
            break;
        };
        out.push(after_open[..end].trim());
        rest = &after_open[end + close.len()..];
    }
    out
}
