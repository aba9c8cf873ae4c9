// Glob matching for `@cache`/`@watch` patterns and file-recipe dependencies (spec §4.5). Built on
// `walkdir` the way the teacher walks directory trees for Docker build contexts, generalized to
// support `*`, `**`, `?`, and `[...]`/`[!...]` character classes.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Expands a single glob pattern, rooted at `root`, into a sorted, deduplicated list of matching
// paths. Patterns without any glob metacharacter are treated as a literal path and returned as-is
// (existence is the caller's concern).
#[must_use]
pub fn expand(root: &Path, pattern: &str) -> Vec<PathBuf> {
    if !is_glob_pattern(pattern) {
        return vec![root.join(pattern)];
    }

    let mut matches: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?.to_path_buf();
            let relative_str = relative.to_string_lossy().replace('\\', "/");
            if matches_glob(pattern, &relative_str) {
                Some(entry.path().to_path_buf())
            } else {
                None
            }
        })
        .collect();

    matches.sort();
    matches.dedup();
    matches
}

#[must_use]
pub fn expand_all(root: &Path, patterns: &[String]) -> Vec<PathBuf> {
    let mut all: Vec<PathBuf> = patterns.iter().flat_map(|p| expand(root, p)).collect();
    all.sort();
    all.dedup();
    all
}

#[must_use]
pub fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

// Translates a glob pattern into segments and matches them against a `/`-separated path. `**`
// matches any number of path segments (including zero); `*` and `?` stay within a single segment.
#[must_use]
pub fn matches_glob(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=path.len()).any(|skip| match_segments(&pattern[1..], &path[skip..]))
        }
        Some(&segment) => {
            if let Some((first_path, rest_path)) = path.split_first() {
                match_segment(segment, first_path) && match_segments(&pattern[1..], rest_path)
            } else {
                false
            }
        }
    }
}

fn match_segment(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_chars(&p, &t)
}

fn match_chars(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => (0..=t.len()).any(|skip| match_chars(&p[1..], &t[skip..])),
        Some('?') => !t.is_empty() && match_chars(&p[1..], &t[1..]),
        Some('[') => {
            let Some(close) = p.iter().position(|&c| c == ']') else {
                return !t.is_empty() && p[0] == t[0] && match_chars(&p[1..], &t[1..]);
            };
            if t.is_empty() {
                return false;
            }
            let class = &p[1..close];
            let (negate, class) = if class.first() == Some(&'!') {
                (true, &class[1..])
            } else {
                (false, class)
            };
            let hit = class_matches(class, t[0]);
            (hit != negate) && match_chars(&p[close + 1..], &t[1..])
        }
        Some(&c) => !t.is_empty() && c == t[0] && match_chars(&p[1..], &t[1..]),
    }
}

fn class_matches(class: &[char], c: char) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            if c >= class[i] && c <= class[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if class[i] == c {
                return true;
            }
            i += 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::matches_glob;

    #[test]
    fn star_matches_within_segment() {
        assert!(matches_glob("src/*.rs", "src/main.rs"));
        assert!(!matches_glob("src/*.rs", "src/nested/main.rs"));
    }

    #[test]
    fn double_star_matches_across_segments() {
        assert!(matches_glob("src/**/*.rs", "src/nested/deep/main.rs"));
        assert!(matches_glob("src/**/*.rs", "src/main.rs"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(matches_glob("a?c", "abc"));
        assert!(!matches_glob("a?c", "abbc"));
    }

    #[test]
    fn character_class_matches_range() {
        assert!(matches_glob("file[0-9].txt", "file5.txt"));
        assert!(!matches_glob("file[0-9].txt", "filea.txt"));
    }

    #[test]
    fn negated_character_class() {
        assert!(matches_glob("file[!0-9].txt", "filea.txt"));
        assert!(!matches_glob("file[!0-9].txt", "file5.txt"));
    }

    #[test]
    fn literal_pattern_without_wildcards_matches_exactly() {
        assert!(matches_glob("README.md", "README.md"));
        assert!(!matches_glob("README.md", "README.txt"));
    }
}
