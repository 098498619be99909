use anyhow::{Result, anyhow};

/// Normalizes a DNS name before it enters a certificate target: trims
/// whitespace and the trailing dot, converts IDN labels to ASCII and
/// lowercases the result.
pub fn normalize_host(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("host name is required"));
    }
    if let Some(stripped) = trimmed.strip_prefix("*.") {
        let ascii = idna::domain_to_ascii(stripped)
            .map_err(|err| anyhow!("invalid host name: {err}"))?;
        return Ok(format!("*.{}", ascii.to_lowercase()));
    }
    let ascii =
        idna::domain_to_ascii(trimmed).map_err(|err| anyhow!("invalid host name: {err}"))?;
    Ok(ascii.to_lowercase())
}

/// Normalizes a comma- or space-separated host list, dropping empty entries
/// and duplicates while preserving first-seen order. The first entry becomes
/// the primary host of the target.
pub fn normalize_host_list(raw: &str) -> Result<Vec<String>> {
    let mut hosts: Vec<String> = Vec::new();
    for part in raw.split([',', ' ']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let host = normalize_host(part)?;
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    if hosts.is_empty() {
        return Err(anyhow!("no valid host names provided"));
    }
    Ok(hosts)
}

pub fn is_wildcard(host: &str) -> bool {
    host.starts_with("*.")
}
