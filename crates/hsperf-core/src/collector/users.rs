//! Resolution of the effective user, which names the per-user perfdata directory.

use std::collections::HashMap;
use std::path::Path;

use crate::collector::traits::FileSystem;

/// Parses `/etc/passwd` content into a UID -> username map.
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        // Skip comments and empty lines
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3
            && let Ok(uid) = parts[2].parse::<u32>()
        {
            map.insert(uid, parts[0].to_string());
        }
    }
    map
}

/// Extracts the effective UID from `/proc/[pid]/status` content.
///
/// The `Uid:` line has the format: real effective saved fs.
pub fn parse_status_euid(content: &str) -> Option<u32> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().nth(1))
        .and_then(|euid| euid.parse().ok())
}

/// Name of the user this process runs as.
///
/// Reads the effective UID from `/proc/self/status` and maps it through
/// `/etc/passwd`; falls back to `$USER` where `/proc` is unavailable.
pub fn current_user<F: FileSystem>(fs: &F) -> Option<String> {
    let euid = fs
        .read_to_string(Path::new("/proc/self/status"))
        .ok()
        .and_then(|status| parse_status_euid(&status));

    if let Some(euid) = euid
        && let Ok(passwd) = fs.read_to_string(Path::new("/etc/passwd"))
        && let Some(name) = parse_passwd(&passwd).remove(&euid)
    {
        return Some(name);
    }

    std::env::var("USER").ok().filter(|u| !u.is_empty())
}
