//! Request-target canonicalization and the transport rule for proofs.
//!
//! Issuer, operator and verifier may be written in different languages, so the
//! `htm`/`htu` comparison is done on a canonical form every side can reproduce:
//! scheme and host lower-cased, default port removed, path and query exactly
//! as written, fragment dropped.
use crate::{LicenseError, LicenseResult};
use url::{Host, Url};

/// Upper-case an HTTP method after checking it is a valid token.
pub fn canonical_method(method: &str) -> LicenseResult<String> {
    let method = method.trim();
    if method.is_empty() || !method.bytes().all(is_token_byte) {
        return Err(LicenseError::InvalidRequest(format!(
            "invalid HTTP method {method:?}"
        )));
    }
    Ok(method.to_ascii_uppercase())
}

/// Canonical absolute URL used for `htu`.
///
/// ```rust
/// use turnstile_authz::canonical_target;
///
/// let canonical = canonical_target("HTTPS://A.Example:443/Path?q=1#frag").unwrap();
/// assert_eq!(canonical, "https://a.example/Path?q=1");
/// ```
pub fn canonical_target(url: &str) -> LicenseResult<String> {
    let raw = url.trim();
    let parsed = parse_absolute(raw)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| LicenseError::InvalidRequest(format!("url {raw:?} has no host")))?;

    // `Url` normalizes the path (dot segments, percent-encoding); the proof
    // must carry the path as the client sent it, so slice it from the input.
    let (_, after_scheme) = raw
        .split_once("://")
        .ok_or_else(|| LicenseError::InvalidRequest(format!("url {raw:?} is not absolute")))?;
    let authority_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let rest = &after_scheme[authority_end..];
    let path_and_query = rest.split_once('#').map_or(rest, |(before, _)| before);

    let mut canonical = format!("{}://{}", parsed.scheme(), host.to_ascii_lowercase());
    // `port()` is already `None` when the port is the scheme default.
    if let Some(port) = parsed.port() {
        canonical.push_str(&format!(":{port}"));
    }
    if !path_and_query.starts_with('/') {
        canonical.push('/');
    }
    canonical.push_str(path_and_query);
    Ok(canonical)
}

/// Reject plaintext request targets, except loopback hosts during development.
pub fn ensure_secure_transport(url: &str) -> LicenseResult<()> {
    let parsed = parse_absolute(url.trim())?;
    let host = parsed.host_str().unwrap_or_default();
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_loopback_host(host) => Ok(()),
        scheme => Err(LicenseError::InsecureTransport(format!("{scheme}://{host}"))),
    }
}

/// `localhost`, any `*.localhost` name, `127.0.0.0/8`, or `::1`.
pub fn is_loopback_host(host: &str) -> bool {
    match Host::parse(host) {
        Ok(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Ok(Host::Ipv4(addr)) => addr.is_loopback(),
        Ok(Host::Ipv6(addr)) => addr.is_loopback(),
        Err(_) => false,
    }
}

fn parse_absolute(raw: &str) -> LicenseResult<Url> {
    // Backslashes and whitespace are silently rewritten by WHATWG parsing,
    // which would let two different raw targets share one canonical form.
    if raw.is_empty() || raw.contains(['\\', ' ', '\t', '\r', '\n']) {
        return Err(LicenseError::InvalidRequest(format!("invalid url {raw:?}")));
    }
    if !raw.contains("://") {
        return Err(LicenseError::InvalidRequest(format!(
            "url {raw:?} is not absolute"
        )));
    }
    let parsed = Url::parse(raw)
        .map_err(|err| LicenseError::InvalidRequest(format!("url {raw:?}: {err}")))?;
    // Userinfo is not part of the canonical form, so it is refused rather than dropped.
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(LicenseError::InvalidRequest(format!(
            "url {raw:?} carries credentials"
        )));
    }
    Ok(parsed)
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}
