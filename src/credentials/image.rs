//! Image reference domains
//!
//! Resolves the registry domain of a free-form container image reference,
//! applying the usual normalization: a first path component is only a
//! domain if it looks like a host (`.` or `:` in it, or `localhost`),
//! otherwise the image lives on the public registry.

use crate::error::{Error, Result};

/// Canonical domain of the public registry
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Long-form alias credentials are registered under
pub const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";

const OFFICIAL_REPO_NAME: &str = "library";
const NAME_TOTAL_LENGTH_MAX: usize = 255;
const TAG_LENGTH_MAX: usize = 128;

/// Registry domain used to look up pull secrets for `image`.
///
/// The public registry resolves to [`LEGACY_DEFAULT_DOMAIN`]. Unparsable
/// references are logged and resolve to `""`.
pub fn registry_domain(image: &str) -> String {
    match parse_normalized_domain(image) {
        Ok(domain) if domain == DEFAULT_DOMAIN => LEGACY_DEFAULT_DOMAIN.to_string(),
        Ok(domain) => domain,
        Err(err) => {
            tracing::debug!(error = %err, "skipping image domain");
            String::new()
        },
    }
}

/// Parse `image` and return its normalized domain (`docker.io` for the
/// public registry).
pub fn parse_normalized_domain(image: &str) -> Result<String> {
    let malformed = |reason: &str| Error::MalformedImageReference {
        image: image.to_string(),
        reason: reason.to_string(),
    };

    if image.is_empty() {
        return Err(malformed("empty reference"));
    }
    if image.len() == 64 && image.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
        return Err(malformed("cannot specify 64-byte hexadecimal strings"));
    }

    let (domain, remainder) = split_domain(image);

    let remote_name = remainder.split(':').next().unwrap_or("");
    if remote_name.to_lowercase() != remote_name {
        return Err(malformed("repository name must be lowercase"));
    }

    let (name_and_tag, digest) = match remainder.split_once('@') {
        Some((name, digest)) => (name, Some(digest)),
        None => (remainder.as_str(), None),
    };
    let (path, tag) = match name_and_tag.rsplit_once(':') {
        Some((path, tag)) => (path, Some(tag)),
        None => (name_and_tag, None),
    };

    if !valid_domain(&domain) {
        return Err(malformed("invalid domain"));
    }
    if path.is_empty() || !path.split('/').all(valid_path_component) {
        return Err(malformed("invalid repository path"));
    }
    if domain.len() + 1 + path.len() > NAME_TOTAL_LENGTH_MAX {
        return Err(malformed("repository name too long"));
    }
    if let Some(tag) = tag {
        if !valid_tag(tag) {
            return Err(malformed("invalid tag"));
        }
    }
    if let Some(digest) = digest {
        if !valid_digest(digest) {
            return Err(malformed("invalid digest"));
        }
    }

    Ok(domain)
}

/// Split into `(domain, remainder)`, defaulting to the public registry
fn split_domain(name: &str) -> (String, String) {
    let (mut domain, mut remainder) = match name.split_once('/') {
        Some((first, rest))
            if first.contains(['.', ':']) || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        },
        _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
    };

    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{}/{}", OFFICIAL_REPO_NAME, remainder);
    }

    (domain, remainder)
}

/// `host(.host)*(:port)?` where each host label is alphanumeric with
/// inner hyphens
fn valid_domain(domain: &str) -> bool {
    let (host, port) = match domain.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };

    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }

    !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}

/// Lowercase alphanumeric runs joined by `.`, `_`, `__` or any number of `-`
fn valid_path_component(component: &str) -> bool {
    let is_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let chars: Vec<char> = component.chars().collect();

    match (chars.first(), chars.last()) {
        (Some(&first), Some(&last)) if is_alnum(first) && is_alnum(last) => {},
        _ => return false,
    }

    let mut i = 0;
    while i < chars.len() {
        if is_alnum(chars[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !is_alnum(chars[i]) {
            i += 1;
        }
        let separator: String = chars[start..i].iter().collect();
        let ok = matches!(separator.as_str(), "." | "_" | "__")
            || separator.chars().all(|c| c == '-');
        if !ok {
            return false;
        }
    }

    true
}

/// `[\w][\w.-]{0,127}`
fn valid_tag(tag: &str) -> bool {
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if word(first) => {},
        _ => return false,
    }
    tag.len() <= TAG_LENGTH_MAX && chars.all(|c| word(c) || c == '.' || c == '-')
}

/// `algorithm:hex` with at least 32 hex characters
fn valid_digest(digest: &str) -> bool {
    let Some((algorithm, encoded)) = digest.split_once(':') else {
        return false;
    };

    valid_digest_algorithm(algorithm)
        && encoded.len() >= 32
        && encoded.chars().all(|c| c.is_ascii_hexdigit())
}

/// Components of `[A-Za-z][A-Za-z0-9]*` joined by one of `-_+.`
fn valid_digest_algorithm(algorithm: &str) -> bool {
    algorithm.split(['+', '.', '_', '-']).all(|part| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric())
    })
}
