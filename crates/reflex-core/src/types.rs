use uuid::Uuid;

/// Unique identifier for an agent session.
pub type SessionId = Uuid;

/// Unique identifier for a persisted trajectory.
pub type TrajectoryId = String;

/// Unique identifier for a persisted skill.
pub type SkillId = String;

/// Extract the domain (lower-cased host, without a leading `www.`) from a URL.
///
/// Accepts bare hosts such as `news.ycombinator.com/item?id=1` as well as full
/// URLs. Returns `None` when nothing host-like can be found.
pub fn domain_of(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // `host:port/path` parses as a URL with scheme `host` and no host, so only
    // trust the parser when it actually found one.
    let host = match url::Url::parse(raw) {
        Ok(parsed) if parsed.host_str().is_some() => parsed.host_str().map(|h| h.to_string()),
        _ => {
            let without_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
            let host = without_scheme
                .split(['/', '?', '#'])
                .next()
                .unwrap_or("")
                .split('@')
                .next_back()
                .unwrap_or("")
                .split(':')
                .next()
                .unwrap_or("");
            Some(host.to_string())
        }
    }?;

    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() || host.contains(char::is_whitespace) {
        None
    } else {
        Some(host)
    }
}

/// Normalize a URL for exact-match comparison: lower-cased scheme and host,
/// no trailing slash, no fragment.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let s = parsed.to_string();
            s.trim_end_matches('/').to_string()
        }
        Err(_) => raw.trim_end_matches('/').to_lowercase(),
    }
}

/// Normalize task text for exact-match comparison: trimmed, whitespace
/// collapsed, lower-cased.
pub fn normalize_task(task: &str) -> String {
    task.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Second-level labels under which sites register (co.uk, com.au and friends).
const SECOND_LEVEL: &[&str] = &["co", "com", "org", "net", "ac", "gov"];

/// The part of a domain a site registers, e.g. `ycombinator.com` for
/// `news.ycombinator.com` and `example.co.uk` for `shop.example.co.uk`.
pub fn registrable_domain(domain: &str) -> &str {
    let domain = domain.trim_matches('.');
    let parts: Vec<&str> = domain.split('.').collect();
    let n = parts.len();
    let keep = if n >= 3 && SECOND_LEVEL.contains(&parts[n - 2]) { 3 } else { 2 };
    if n <= keep {
        return domain;
    }
    let skip: usize = parts[..n - keep].iter().map(|p| p.len() + 1).sum();
    &domain[skip..]
}

/// The registrable label of a domain, e.g. `ycombinator` for `news.ycombinator.com`.
pub fn site_label(domain: &str) -> &str {
    let registrable = registrable_domain(domain);
    registrable.split('.').next().unwrap_or(registrable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_from_full_url() {
        assert_eq!(domain_of("https://news.ycombinator.com").as_deref(), Some("news.ycombinator.com"));
        assert_eq!(domain_of("https://www.GitHub.com/login").as_deref(), Some("github.com"));
        assert_eq!(domain_of("http://localhost:8080/x").as_deref(), Some("localhost"));
    }

    #[test]
    fn domain_from_bare_host() {
        assert_eq!(domain_of("github.com/rust-lang").as_deref(), Some("github.com"));
        assert_eq!(domain_of("www.example.org").as_deref(), Some("example.org"));
        assert_eq!(domain_of("news.ycombinator.com:443/news").as_deref(), Some("news.ycombinator.com"));
    }

    #[test]
    fn domain_of_garbage() {
        assert_eq!(domain_of(""), None);
        assert_eq!(domain_of("   "), None);
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("https://News.YCombinator.com/"), "https://news.ycombinator.com");
        assert_eq!(normalize_url("https://example.com/a/#top"), "https://example.com/a");
    }

    #[test]
    fn task_normalization() {
        assert_eq!(normalize_task("  Search   for Rust \n"), "search for rust");
    }

    #[test]
    fn site_labels() {
        assert_eq!(site_label("news.ycombinator.com"), "ycombinator");
        assert_eq!(site_label("github.com"), "github");
        assert_eq!(site_label("bbc.co.uk"), "bbc");
        assert_eq!(site_label("localhost"), "localhost");
    }

    #[test]
    fn registrable_domains() {
        assert_eq!(registrable_domain("news.ycombinator.com"), "ycombinator.com");
        assert_eq!(registrable_domain("shop.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("github.com"), "github.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }
}
