use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Root segment every generated package name starts with.
pub const PACKAGE_ROOT: &str = "com";

/// Prepended to labels that would otherwise start with a digit.
const NUMERIC_LABEL_PREFIX: &str = "domain";

/// Package name used when no label survives sanitizing, before the hash.
const FALLBACK_PACKAGE: &str = "com.generated.domain";

const MAX_PACKAGE_LEN: usize = 50;
const TRUNCATED_PACKAGE_LEN: usize = 42;
const HASH_SUFFIX_LEN: usize = 8;

const PASSWORD_LEN: usize = 16;
const MAX_ALIAS_LEN: usize = 20;

/// Extract the normalized domain from a URL or bare hostname.
///
/// The domain is the network location of the URL taken verbatim (host,
/// port and any user info), with a leading `www.` removed, then lowercased.
/// Inputs without an authority (`example.com`, `localhost:8080`) are
/// reparsed with `http://` prepended. An empty result is allowed.
pub fn url_to_domain(input: &str) -> Result<String> {
    let input = input.trim();
    let mut netloc = network_location(input)?;
    if netloc.is_empty() {
        netloc = network_location(&format!("http://{input}"))?;
    }

    let domain = netloc.strip_prefix("www.").unwrap_or(&netloc);
    Ok(domain.to_lowercase())
}

/// Authority component of `input`: the text between `scheme://` (or a
/// leading `//`) and the first `/`, `?` or `#`. Empty when there is none.
fn network_location(input: &str) -> Result<String> {
    let rest = match input.split_once(':') {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => input,
    };
    let Some(authority) = rest.strip_prefix("//") else {
        return Ok(String::new());
    };
    let end = authority.find(['/', '?', '#']).unwrap_or(authority.len());
    let netloc = &authority[..end];

    let invalid = |reason: &str| Error::InvalidUrl {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    if netloc.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("whitespace in network location"));
    }
    if netloc.contains('[') != netloc.contains(']') {
        return Err(invalid("unbalanced brackets in IPv6 literal"));
    }
    Ok(netloc.to_string())
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Map a domain to a reverse-DNS Java package name.
///
/// `example.com` becomes `com.example`; labels starting with a digit get a
/// `domain` prefix. The result never exceeds 50 characters: longer names
/// are cut to 42 characters and suffixed with a hash of the domain.
pub fn domain_to_package_name(domain: &str) -> String {
    let cleaned: String = domain
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();

    let labels: Vec<String> = cleaned
        .split('.')
        .rev()
        .filter(|label| !label.is_empty())
        .map(sanitize_label)
        .filter(|label| !label.is_empty())
        .collect();

    let package_name = if labels.is_empty() {
        format!("{FALLBACK_PACKAGE}{}", domain_hash(domain))
    } else {
        format!("{PACKAGE_ROOT}.{}", labels.join("."))
    };

    if package_name.len() > MAX_PACKAGE_LEN {
        // Only ASCII survives sanitizing, so byte slicing is on a char boundary.
        format!(
            "{}{}",
            &package_name[..TRUNCATED_PACKAGE_LEN],
            domain_hash(domain)
        )
    } else {
        package_name
    }
}

fn sanitize_label(label: &str) -> String {
    let label = if label.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{NUMERIC_LABEL_PREFIX}{label}")
    } else {
        label.to_string()
    };
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// First eight hex characters of the MD5 of `domain`.
fn domain_hash(domain: &str) -> String {
    let digest = hex::encode(Md5::digest(domain.as_bytes()));
    digest[..HASH_SUFFIX_LEN].to_string()
}

/// Store and key password for `domain`: a truncated SHA-256 hex digest.
pub fn derive_password(domain: &str) -> String {
    let digest = hex::encode(Sha256::digest(domain.as_bytes()));
    digest[..PASSWORD_LEN].to_string()
}

/// Key alias for `domain`: separators removed, at most 20 characters.
pub fn derive_alias(domain: &str) -> String {
    domain
        .chars()
        .filter(|c| *c != '.' && *c != '-')
        .take(MAX_ALIAS_LEN)
        .collect()
}

/// File name of the keystore generated for `domain`.
pub fn keystore_file_name(domain: &str) -> String {
    format!("{}.jks", domain.replace('.', "_"))
}
