use url::Url;

/// Whether two URLs name the same page: same origin and same path, ignoring
/// a trailing slash, the query and the fragment.
pub fn same_page(a: &Url, b: &Url) -> bool {
    same_host(a, b)
        && a.scheme() == b.scheme()
        && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}

/// Whether two URLs point at the same host and port
pub fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Resolve `path` below `base` and append query pairs.
///
/// `base` is treated as a directory even without a trailing slash, so a
/// configured `https://sso.campus.edu/cas` yields `/cas/authserver/login`.
pub fn endpoint(base: &Url, path: &str, query: &[(&str, &str)]) -> Url {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let with_slash = format!("{}/", dir.path());
        dir.set_path(&with_slash);
    }
    dir.set_query(None);
    dir.set_fragment(None);

    let mut url = match dir.join(path.trim_start_matches('/')) {
        Ok(url) => url,
        // Only reachable for paths that are not relative references
        Err(_) => dir,
    };
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter().copied());
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_same_page() {
        assert!(same_page(&u("https://a.edu/x/"), &u("https://a.edu/x")));
        assert!(same_page(&u("https://a.edu/x?ticket=1"), &u("https://a.edu/x")));
        assert!(same_page(&u("https://A.edu/"), &u("https://a.edu")));
        assert!(!same_page(&u("http://a.edu/x"), &u("https://a.edu/x")));
        assert!(!same_page(&u("https://a.edu:8443/x"), &u("https://a.edu/x")));
        assert!(!same_page(&u("https://b.edu/x"), &u("https://a.edu/x")));
    }

    #[test]
    fn test_same_host() {
        assert!(same_host(&u("https://sso.a.edu/login"), &u("https://sso.a.edu/")));
        assert!(same_host(&u("https://sso.a.edu:443/"), &u("https://sso.a.edu/")));
        assert!(!same_host(&u("https://jwc.a.edu/"), &u("https://sso.a.edu/")));
    }

    #[test]
    fn test_endpoint_joins_below_base() {
        assert_eq!(
            endpoint(&u("https://sso.a.edu"), "authserver/login", &[]).as_str(),
            "https://sso.a.edu/authserver/login"
        );
        assert_eq!(
            endpoint(&u("https://sso.a.edu/cas"), "/authserver/login", &[]).as_str(),
            "https://sso.a.edu/cas/authserver/login"
        );
    }

    #[test]
    fn test_endpoint_encodes_query() {
        let url = endpoint(
            &u("https://sso.a.edu/"),
            "authserver/login",
            &[("service", "https://jwc.a.edu/grades?term=1")],
        );
        assert_eq!(
            url.as_str(),
            "https://sso.a.edu/authserver/login?service=https%3A%2F%2Fjwc.a.edu%2Fgrades%3Fterm%3D1"
        );
    }
}
