//! Minimal tag/attribute scanning for login pages.
//!
//! Campus login pages are third-party HTML; only `<input>` attributes and the
//! `value` of an element looked up by id are ever needed.

use std::sync::OnceLock;

use regex::Regex;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>").expect("valid tag regex"))
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attribute regex")
    })
}

/// Parse the attributes of one tag body into lowercase-name/value pairs
fn attributes(tag_body: &str) -> Vec<(String, String)> {
    attr_regex()
        .captures_iter(tag_body)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Decode the handful of entities that show up in form values
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/")
        .replace("&#x2f;", "/")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Every named `<input type="hidden">` in document order.
/// Inputs without a `value` attribute contribute an empty string.
pub fn hidden_inputs(html: &str) -> Vec<(String, String)> {
    tag_regex()
        .captures_iter(html)
        .filter(|caps| caps[1].eq_ignore_ascii_case("input"))
        .filter_map(|caps| {
            let attrs = attributes(&caps[2]);
            let is_hidden = attr(&attrs, "type")
                .map(|t| t.eq_ignore_ascii_case("hidden"))
                .unwrap_or(false);
            if !is_hidden {
                return None;
            }
            let name = attr(&attrs, "name").filter(|n| !n.is_empty())?;
            Some((name.to_string(), attr(&attrs, "value").unwrap_or_default().to_string()))
        })
        .collect()
}

/// The `value` attribute of the first element with the given id
pub fn element_value_by_id(html: &str, id: &str) -> Option<String> {
    tag_regex().captures_iter(html).find_map(|caps| {
        let attrs = attributes(&caps[2]);
        if attr(&attrs, "id") == Some(id) {
            attr(&attrs, "value").map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <form id="casLoginForm" method="post">
          <input id="username" name="username" type="text" placeholder="Student ID"/>
          <input id="password" name="password" type="password"/>
          <input type="hidden" name="lt" value="LT-4471-abc"/>
          <input type="hidden" name="dllt" value="userNamePasswordLogin"/>
          <INPUT TYPE='hidden' NAME='execution' VALUE='e1s1'>
          <input type="hidden" name="_eventId" value="submit">
          <input type="hidden" name="rmShown">
          <input type="hidden" value="orphan">
        </form>"#;

    #[test]
    fn test_hidden_inputs_in_document_order() {
        let fields = hidden_inputs(LOGIN_PAGE);
        assert_eq!(
            fields,
            vec![
                ("lt".to_string(), "LT-4471-abc".to_string()),
                ("dllt".to_string(), "userNamePasswordLogin".to_string()),
                ("execution".to_string(), "e1s1".to_string()),
                ("_eventId".to_string(), "submit".to_string()),
                ("rmShown".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_hidden_inputs_skip_visible_fields() {
        let fields = hidden_inputs(LOGIN_PAGE);
        assert!(fields.iter().all(|(name, _)| name != "username" && name != "password"));
    }

    #[test]
    fn test_hidden_inputs_decode_entities() {
        let html = r#"<input type="hidden" name="execution" value="a&amp;b&#x2F;c">"#;
        assert_eq!(hidden_inputs(html), vec![("execution".to_string(), "a&b/c".to_string())]);
    }

    #[test]
    fn test_hidden_inputs_empty_document() {
        assert!(hidden_inputs("<html><body>Service unavailable</body></html>").is_empty());
    }

    #[test]
    fn test_element_value_by_id() {
        let html = r#"<div><input type="hidden" id="ticket" value="ST-9-xyz-cas"/></div>"#;
        assert_eq!(element_value_by_id(html, "ticket").as_deref(), Some("ST-9-xyz-cas"));
        assert_eq!(element_value_by_id(html, "missing"), None);
    }

    #[test]
    fn test_element_value_by_id_without_value() {
        let html = r#"<span id="ticket"></span>"#;
        assert_eq!(element_value_by_id(html, "ticket"), None);
    }
}
