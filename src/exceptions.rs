//! Path exclusion.
//!
//! An [`ExceptionSet`] combines the platform's trash/recycle-bin locations with
//! user supplied fragments. Fragments are matched against whole path
//! components by default, so a directory called `MyTrash` is not mistaken for
//! the `Trash` folder. [`MatchMode::Substring`] reproduces plain substring
//! matching on the full path string for setups that rely on it.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Trash folders on POSIX desktops and removable media
pub const POSIX_TRASH: &[&str] = &[".Trash", ".Trash-*", "Trash"];

/// Recycle bin present at the root of every Windows volume
pub const WINDOWS_RECYCLE_BIN: &[&str] = &["$RECYCLE.BIN"];

const POSIX_TRASH_SUBSTRINGS: &[&str] = &["/.Trash", "/Trash"];
const WINDOWS_RECYCLE_BIN_SUBSTRINGS: &[&str] = &[":\\$RECYCLE.BIN"];

/// How exception fragments are compared against paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Fragments name whole path components (`*` allowed within a component)
    #[default]
    Component,
    /// A path is excepted when its string form contains the fragment anywhere
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// Consecutive components found anywhere below the tree root
    Floating(Vec<String>),
    /// Components that must start the path relative to the tree root
    Rooted(Vec<String>),
    /// Absolute prefix that lies outside the source tree
    Absolute(PathBuf),
    Substring(String),
    /// Substring of an absolute source path, kept as a prefix of the path
    /// relative to the tree root
    RootedSubstring(String),
}

/// Ordered collection of exception fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionSet {
    mode: MatchMode,
    fragments: Vec<String>,
    patterns: Vec<Pattern>,
}

impl ExceptionSet {
    /// Build a set from explicit fragments
    pub fn new<I, S>(mode: MatchMode, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            mode,
            fragments: Vec::new(),
            patterns: Vec::new(),
        };
        set.extend(fragments);
        set
    }

    /// The host platform's built-in trash/recycle-bin set
    pub fn platform_defaults(mode: MatchMode) -> Self {
        Self::new(mode, platform_fragments(mode).iter().copied())
    }

    /// Platform defaults followed by the caller's fragments
    pub fn with_user_fragments(mode: MatchMode, user: &[String]) -> Self {
        let mut set = Self::platform_defaults(mode);
        set.extend(user.iter().cloned());
        set
    }

    pub fn extend<I, S>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fragment in fragments {
            let fragment = fragment.into();
            if fragment.is_empty() {
                continue;
            }
            if let Some(pattern) = compile(self.mode, &fragment) {
                self.patterns.push(pattern);
                self.fragments.push(fragment);
            }
        }
    }

    /// Rewrite absolute fragments inside `source_root` as root-relative ones so
    /// the same set applies to both the source and the backup tree.
    pub fn anchored_at(mut self, source_root: &Path) -> Self {
        for pattern in &mut self.patterns {
            match pattern {
                Pattern::Absolute(prefix) => {
                    if let Ok(relative) = prefix.strip_prefix(source_root) {
                        *pattern = Pattern::Rooted(component_strings(relative));
                    }
                }
                Pattern::Substring(fragment) if Path::new(fragment.as_str()).is_absolute() => {
                    if let Ok(relative) = Path::new(fragment.as_str()).strip_prefix(source_root) {
                        let relative = relative.to_string_lossy().into_owned();
                        *pattern = Pattern::RootedSubstring(relative);
                    }
                }
                _ => {}
            }
        }
        self
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path`, found while walking the tree rooted at `root`, is excepted
    pub fn is_excepted(&self, root: &Path, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let stripped = path.strip_prefix(root).unwrap_or(path);
        let relative = component_strings(stripped);
        let full = path.to_string_lossy();

        self.patterns.iter().any(|pattern| match pattern {
            Pattern::Floating(parts) => {
                relative.len() >= parts.len()
                    && relative
                        .windows(parts.len())
                        .any(|window| components_match(parts, window))
            }
            Pattern::Rooted(parts) => {
                relative.len() >= parts.len() && components_match(parts, &relative[..parts.len()])
            }
            Pattern::Absolute(prefix) => path.starts_with(prefix),
            Pattern::Substring(fragment) => full.contains(fragment.as_str()),
            Pattern::RootedSubstring(prefix) => {
                stripped.to_string_lossy().starts_with(prefix.as_str())
            }
        })
    }
}

fn platform_fragments(mode: MatchMode) -> &'static [&'static str] {
    match (cfg!(windows), mode) {
        (true, MatchMode::Component) => WINDOWS_RECYCLE_BIN,
        (true, MatchMode::Substring) => WINDOWS_RECYCLE_BIN_SUBSTRINGS,
        (false, MatchMode::Component) => POSIX_TRASH,
        (false, MatchMode::Substring) => POSIX_TRASH_SUBSTRINGS,
    }
}

fn compile(mode: MatchMode, fragment: &str) -> Option<Pattern> {
    if mode == MatchMode::Substring {
        return Some(Pattern::Substring(fragment.to_string()));
    }

    let path = Path::new(fragment);
    if path.is_absolute() {
        return Some(Pattern::Absolute(path.to_path_buf()));
    }

    let parts: Vec<String> = fragment
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_string)
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(Pattern::Floating(parts))
    }
}

fn component_strings(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn components_match(patterns: &[String], components: &[String]) -> bool {
    patterns
        .iter()
        .zip(components)
        .all(|(pattern, component)| matches_component(pattern, component))
}

/// Single component match supporting one `*` wildcard
fn matches_component(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some((prefix, suffix)) = pattern.split_once('*') {
        return text.len() >= prefix.len() + suffix.len()
            && starts_with(text, prefix)
            && ends_with(text, suffix);
    }

    same_name(text, pattern)
}

#[cfg(windows)]
fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(not(windows))]
fn same_name(a: &str, b: &str) -> bool {
    a == b
}

fn starts_with(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| same_name(head, prefix))
}

fn ends_with(text: &str, suffix: &str) -> bool {
    text.len()
        .checked_sub(suffix.len())
        .and_then(|start| text.get(start..))
        .is_some_and(|tail| same_name(tail, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(fragments: &[&str]) -> ExceptionSet {
        ExceptionSet::new(MatchMode::Component, fragments.iter().copied())
    }

    #[test]
    fn test_component_match_ignores_partial_names() {
        let root = Path::new("/data");
        let exceptions = set(&["Trash"]);

        assert!(exceptions.is_excepted(root, Path::new("/data/Trash")));
        assert!(exceptions.is_excepted(root, Path::new("/data/a/Trash/file.txt")));
        assert!(!exceptions.is_excepted(root, Path::new("/data/MyTrash/file.txt")));
        assert!(!exceptions.is_excepted(root, Path::new("/data/Trashcan")));
    }

    #[test]
    fn test_multi_component_fragment() {
        let root = Path::new("/data");
        let exceptions = set(&["build/cache"]);

        assert!(exceptions.is_excepted(root, Path::new("/data/app/build/cache/x.o")));
        assert!(!exceptions.is_excepted(root, Path::new("/data/app/build/x.o")));
        assert!(!exceptions.is_excepted(root, Path::new("/data/cache/build")));
    }

    #[test]
    fn test_wildcard_component() {
        let root = Path::new("/media/usb");
        let exceptions = set(&[".Trash-*", "*.tmp"]);

        assert!(exceptions.is_excepted(root, Path::new("/media/usb/.Trash-1000/files/a")));
        assert!(exceptions.is_excepted(root, Path::new("/media/usb/docs/draft.tmp")));
        assert!(!exceptions.is_excepted(root, Path::new("/media/usb/.Trash/files/a")));
        assert!(!exceptions.is_excepted(root, Path::new("/media/usb/docs/draft.txt")));
    }

    #[test]
    fn test_root_itself_is_never_matched_by_relative_fragment() {
        let root = Path::new("/home/me/Trash/source");
        let exceptions = set(&["Trash"]);

        assert!(!exceptions.is_excepted(root, Path::new("/home/me/Trash/source/a.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_fragment_applies_to_both_trees() {
        let exceptions = set(&["/src/private"]).anchored_at(Path::new("/src"));

        assert!(exceptions.is_excepted(Path::new("/src"), Path::new("/src/private/key")));
        assert!(exceptions.is_excepted(Path::new("/bak"), Path::new("/bak/private/key")));
        assert!(!exceptions.is_excepted(Path::new("/bak"), Path::new("/bak/public/private")));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_fragment_outside_source_stays_absolute() {
        let exceptions = set(&["/elsewhere"]).anchored_at(Path::new("/src"));

        assert!(exceptions.is_excepted(Path::new("/"), Path::new("/elsewhere/file")));
        assert!(!exceptions.is_excepted(Path::new("/src"), Path::new("/src/elsewhere")));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_substring_fragment_applies_to_both_trees() {
        let exceptions = ExceptionSet::new(MatchMode::Substring, ["/src/private"])
            .anchored_at(Path::new("/src"));

        assert!(exceptions.is_excepted(Path::new("/src"), Path::new("/src/private/key")));
        assert!(exceptions.is_excepted(Path::new("/bak"), Path::new("/bak/private/key")));
        assert!(exceptions.is_excepted(Path::new("/bak"), Path::new("/bak/privateer")));
        assert!(!exceptions.is_excepted(Path::new("/bak"), Path::new("/bak/public/private")));
    }

    #[test]
    fn test_substring_mode_matches_anywhere() {
        let exceptions = ExceptionSet::new(MatchMode::Substring, ["Trash"]);
        let root = Path::new("/data");

        assert!(exceptions.is_excepted(root, Path::new("/data/MyTrash/file.txt")));
        assert!(!exceptions.is_excepted(root, Path::new("/data/keep/file.txt")));
    }

    #[test]
    fn test_user_fragments_follow_platform_defaults() {
        let user = vec!["node_modules".to_string(), String::new()];
        let exceptions = ExceptionSet::with_user_fragments(MatchMode::Component, &user);

        let defaults = ExceptionSet::platform_defaults(MatchMode::Component);
        assert_eq!(exceptions.fragments().len(), defaults.fragments().len() + 1);
        assert_eq!(exceptions.fragments().last().map(String::as_str), Some("node_modules"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_posix_defaults_skip_trash() {
        let exceptions = ExceptionSet::platform_defaults(MatchMode::Component);
        let root = Path::new("/home/me");

        assert!(exceptions.is_excepted(root, Path::new("/home/me/.local/share/Trash/files/a")));
        assert!(exceptions.is_excepted(root, Path::new("/home/me/.Trash-1000/a")));
        assert!(!exceptions.is_excepted(root, Path::new("/home/me/Documents/a")));
    }

    #[test]
    fn test_empty_set_excepts_nothing() {
        let exceptions = set(&[]);
        assert!(exceptions.is_empty());
        assert!(!exceptions.is_excepted(Path::new("/"), Path::new("/anything")));
    }
}
