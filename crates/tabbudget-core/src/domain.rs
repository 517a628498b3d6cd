//! Hostname classification against the tracked-site list.
//!
//! A hostname is tracked when, after dropping one leading `www.`, it
//! equals a tracked entry or ends with `.` + entry. URLs are parsed
//! strictly; anything unparsable has no hostname and never matches.

use url::Url;

const WWW_PREFIX: &str = "www.";

/// Strip a single leading `www.` label.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix(WWW_PREFIX).unwrap_or(host)
}

/// Extract the normalized hostname of `url`, or `None` for malformed
/// URLs and URLs without a host (`about:blank`, `data:` ...).
pub fn hostname_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(strip_www(host).to_ascii_lowercase())
}

/// Whether `hostname` is one of `sites` or a subdomain of one.
pub fn is_tracked(hostname: &str, sites: &[String]) -> bool {
    if hostname.is_empty() {
        return false;
    }
    let host = strip_www(hostname);
    sites.iter().any(|site| {
        !site.is_empty()
            && (host == site
                || (host.len() > site.len()
                    && host.ends_with(site.as_str())
                    && host.as_bytes()[host.len() - site.len() - 1] == b'.'))
    })
}

/// Convenience: resolve `url` to a hostname and classify it.
pub fn url_is_tracked(url: &str, sites: &[String]) -> bool {
    hostname_from_url(url)
        .map(|host| is_tracked(&host, sites))
        .unwrap_or(false)
}

/// Reduce a user-entered site to a bare registrable domain.
///
/// Accepts `https://www.Example.com/path`, `example.com:8080`, or
/// `www.example.com` and returns `example.com`. Returns `None` when
/// nothing usable remains.
pub fn normalize_site(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let host = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?.host_str()?.to_string()
    } else {
        let end = trimmed
            .find(|c| c == '/' || c == ':' || c == '?' || c == '#')
            .unwrap_or(trimmed.len());
        trimmed[..end].to_string()
    };
    let host = strip_www(host.trim_matches('.')).to_ascii_lowercase();
    if host.is_empty() || host.contains(char::is_whitespace) {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sites() -> Vec<String> {
        vec!["facebook.com".to_string(), "x.com".to_string()]
    }

    #[test]
    fn exact_and_subdomain_match() {
        assert!(is_tracked("facebook.com", &sites()));
        assert!(is_tracked("m.facebook.com", &sites()));
        assert!(is_tracked("www.facebook.com", &sites()));
        assert!(is_tracked("x.com", &sites()));
    }

    #[test]
    fn suffix_without_dot_does_not_match() {
        assert!(!is_tracked("notfacebook.com", &sites()));
        assert!(!is_tracked("box.com", &sites()));
        assert!(!is_tracked("facebook.com.evil.org", &sites()));
    }

    #[test]
    fn hostname_extraction() {
        assert_eq!(
            hostname_from_url("https://www.facebook.com/feed?x=1").as_deref(),
            Some("facebook.com")
        );
        assert_eq!(
            hostname_from_url("http://Reddit.com:8080/r/rust").as_deref(),
            Some("reddit.com")
        );
        assert_eq!(hostname_from_url("about:blank"), None);
        assert_eq!(hostname_from_url("not a url"), None);
        assert_eq!(hostname_from_url(""), None);
    }

    #[test]
    fn malformed_urls_never_match() {
        assert!(!url_is_tracked("facebook.com", &sites()));
        assert!(!url_is_tracked("::::", &sites()));
        assert!(url_is_tracked("https://facebook.com", &sites()));
    }

    #[test]
    fn normalize_site_strips_decoration() {
        assert_eq!(
            normalize_site("https://www.Example.com/path").as_deref(),
            Some("example.com")
        );
        assert_eq!(normalize_site("www.reddit.com").as_deref(), Some("reddit.com"));
        assert_eq!(normalize_site("x.com:443").as_deref(), Some("x.com"));
        assert_eq!(normalize_site("   "), None);
    }

    #[test]
    fn empty_site_entries_match_nothing() {
        let list = vec![String::new()];
        assert!(!is_tracked("example.com", &list));
    }

    proptest! {
        #[test]
        fn www_prefix_is_transparent(host in "[a-z]{1,8}(\\.[a-z]{1,6}){0,3}") {
            let list = vec![
                "facebook.com".to_string(),
                "abc.de".to_string(),
                "a.b".to_string(),
            ];
            let bare = is_tracked(&host, &list);
            let prefixed = is_tracked(&format!("www.{host}"), &list);
            prop_assert_eq!(bare, prefixed);
        }
    }
}
