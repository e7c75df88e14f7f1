//! Small helpers shared by the render rules

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// The "humanish" part of a git URI, i.e. what `git clone` would name the
/// checkout directory: the basename with any `.git` suffix removed.
pub fn git_repo_humanish_part(git_uri: &str) -> &str {
    let mut uri = git_uri.trim_end_matches('/');
    if let Some(stripped) = uri.strip_suffix("/.git") {
        uri = stripped;
    } else if let Some(stripped) = uri.strip_suffix(".git") {
        uri = stripped;
    }
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Derive an image-stream-tag from a base-image reference.
///
/// Drops the registry part if one is present, replaces `/` (stream names
/// cannot contain it) and appends `:latest` when no tag is given.
pub fn imagestream_tag_from_image(image: &str) -> String {
    let parts: Vec<&str> = image.splitn(3, '/').collect();
    let mut tag = match parts.as_slice() {
        [registry, rest] if registry.contains('.') || registry.contains(':') => {
            (*rest).to_string()
        }
        [_, name, rest] => format!("{}/{}", name, rest),
        _ => image.to_string(),
    };

    tag = tag.replace('/', "-");

    if !tag.contains(':') {
        tag.push_str(":latest");
    }

    tag
}

/// Rewrite the authority of `url` to carry `user` as its userinfo,
/// replacing any userinfo already present. Everything outside the
/// authority component is left untouched.
pub fn insert_userinfo(url: &str, user: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    // Drop any existing userinfo
    let host = authority.split_once('@').map_or(authority, |(_, h)| h);

    match scheme {
        Some(scheme) => format!("{}://{}@{}{}", scheme, user, host, tail),
        None => format!("{}@{}{}", user, host, tail),
    }
}

/// Target-platform version, ordered component-wise.
///
/// The orchestrator changed its secret-mounting API shape at 1.0.6; render
/// rules compare the configured version against that threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlatformVersion(pub [u32; 3]);

/// First version using the `secrets` array instead of `sourceSecret`.
pub const SECRETS_ARRAY_MIN_VERSION: PlatformVersion = PlatformVersion([1, 0, 6]);

impl PlatformVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self([major, minor, patch])
    }
}

impl Default for PlatformVersion {
    /// Oldest platform version the renderer supports.
    fn default() -> Self {
        Self([0, 5, 4])
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for PlatformVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut components = [0u32; 3];
        let mut count = 0;
        for part in s.split('.') {
            if count >= 3 {
                return Err(Error::validation(format!(
                    "platform version '{}' has more than three components",
                    s
                )));
            }
            components[count] = part.parse().map_err(|_| {
                Error::validation(format!("invalid platform version '{}'", s))
            })?;
            count += 1;
        }
        if count == 0 {
            return Err(Error::validation("empty platform version"));
        }
        Ok(Self(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = {"https://git.example.com/cockpit", "cockpit"},
        dot_git = {"https://git.example.com/cockpit.git", "cockpit"},
        slash_dot_git = {"https://git.example.com/cockpit/.git", "cockpit"},
        trailing_slash = {"https://git.example.com/cockpit/", "cockpit"},
        bare = {"cockpit", "cockpit"},
    )]
    fn test_git_repo_humanish_part(uri: &str, expected: &str) {
        assert_eq!(git_repo_humanish_part(uri), expected);
    }

    #[parameterized(
        bare = {"fedora", "fedora:latest"},
        tagged = {"fedora:24", "fedora:24"},
        namespaced = {"spam/fedora", "spam-fedora:latest"},
        with_registry = {"registry.example.com:5000/spam/fedora:24", "spam-fedora:24"},
        registry_no_namespace = {"registry.example.com/fedora", "fedora:latest"},
    )]
    fn test_imagestream_tag_from_image(image: &str, expected: &str) {
        assert_eq!(imagestream_tag_from_image(image), expected);
    }

    #[test]
    fn test_insert_userinfo() {
        assert_eq!(
            insert_userinfo("git://git.example.com/spam.git", "example"),
            "git://example@git.example.com/spam.git"
        );
    }

    #[test]
    fn test_insert_userinfo_replaces_existing() {
        assert_eq!(
            insert_userinfo("ssh://old@git.example.com:22/spam?x=1", "new"),
            "ssh://new@git.example.com:22/spam?x=1"
        );
    }

    #[test]
    fn test_platform_version_parse_and_order() {
        let v: PlatformVersion = "1.0.6".parse().unwrap();
        assert_eq!(v, SECRETS_ARRAY_MIN_VERSION);
        assert!(PlatformVersion::new(1, 0, 5) < SECRETS_ARRAY_MIN_VERSION);
        assert!(PlatformVersion::new(1, 1, 0) >= SECRETS_ARRAY_MIN_VERSION);

        let short: PlatformVersion = "1.0".parse().unwrap();
        assert_eq!(short, PlatformVersion::new(1, 0, 0));
        assert!("1.x.0".parse::<PlatformVersion>().is_err());
        assert!("1.0.6.2".parse::<PlatformVersion>().is_err());
    }
}
