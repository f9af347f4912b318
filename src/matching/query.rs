//! URI splitting and query-string parsing

/// Split a URI into the part before `?` and the raw query, dropping any
/// fragment.
pub(crate) fn split_uri(uri: &str) -> (&str, Option<&str>) {
    let uri = uri.split_once('#').map_or(uri, |(head, _)| head);
    match uri.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (uri, None),
    }
}

/// Decode a query string into `(name, value)` pairs in order.
///
/// Undecodable components are kept verbatim.
pub(crate) fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name), decode(value))
        })
        .collect()
}

fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Rebuild a URI with only the query pairs `keep` accepts.
///
/// Kept pairs are written back verbatim so their encoding is preserved.
pub(crate) fn filter_query(uri: &str, mut keep: impl FnMut(&str) -> bool) -> String {
    let (base, Some(query)) = split_uri(uri) else {
        return uri.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let name = pair.split_once('=').map_or(*pair, |(name, _)| name);
            keep(&decode(name))
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_uri() {
        assert_eq!(split_uri("http://h/a?x=1#frag"), ("http://h/a", Some("x=1")));
        assert_eq!(split_uri("http://h/a"), ("http://h/a", None));
    }

    #[test]
    fn test_parse_query_decodes() {
        let pairs = parse_query("a=1&b=hello%20world&c&d=x+y");
        assert_eq!(
            pairs,
            [
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "hello world".to_string()),
                ("c".to_string(), String::new()),
                ("d".to_string(), "x y".to_string()),
            ]
        );
    }

    #[test]
    fn test_filter_query() {
        assert_eq!(
            filter_query("http://h/a?sig=abc&x=1&sig=def", |name| name != "sig"),
            "http://h/a?x=1"
        );
        assert_eq!(filter_query("http://h/a?sig=abc", |name| name != "sig"), "http://h/a");
        assert_eq!(filter_query("http://h/a", |_| false), "http://h/a");
    }
}
