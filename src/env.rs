// Environment assembly: process environment, `.env` files loaded via `@dotenv`, `@export`/
// `@require` handling, and the `~/.config/jake/jake.conf` settings file (SPEC_FULL.md A.3).
// Grounded on the host's own config discovery (`dirs::config_dir`) the way the teacher resolves
// its own config path.

use crate::failure::{system_error, Failure};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    // Loads a `.env`-style file and merges it in, without overwriting variables already present
    // (the process environment always wins over a dotenv file). Double-quoted values interpret
    // `\n \t \r \" \\` escapes and `$VAR`/`${VAR}` references against the environment collected so
    // far (spec §4.4); `\$` is deliberately NOT treated as an escape, per the open question
    // resolved in DESIGN.md.
    pub fn load_dotenv(&mut self, path: &Path) -> Result<(), Failure> {
        let contents = fs::read_to_string(path).map_err(system_error(&format!(
            "Couldn't read dotenv file `{}`.",
            path.display()
        )))?;

        for (key, raw) in parse_dotenv_entries(&contents) {
            let value = match raw {
                DotenvValue::Double(inner) => self.expand_dotenv_double(&inner),
                DotenvValue::Single(inner) | DotenvValue::Bare(inner) => inner,
            };
            self.vars.entry(key).or_insert(value);
        }

        Ok(())
    }

    // Escape + expansion pass for a double-quoted `.env` value's raw inner text. `\$` is left as a
    // literal backslash followed by a `$` that is then itself eligible for `$VAR`/`${VAR}`
    // expansion — see the spec §9 open question this resolves.
    fn expand_dotenv_double(&self, raw: &str) -> String {
        let mut result = String::with_capacity(raw.len());
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '\\' && i + 1 < chars.len() {
                match chars[i + 1] {
                    'n' => {
                        result.push('\n');
                        i += 2;
                        continue;
                    }
                    't' => {
                        result.push('\t');
                        i += 2;
                        continue;
                    }
                    'r' => {
                        result.push('\r');
                        i += 2;
                        continue;
                    }
                    '"' => {
                        result.push('"');
                        i += 2;
                        continue;
                    }
                    '\\' => {
                        result.push('\\');
                        i += 2;
                        continue;
                    }
                    _ => {} // notably `\$`: not an escape, fall through to the `$` handling below
                }
            }
            if chars[i] == '$' && i + 1 < chars.len() {
                if chars[i + 1] == '{' {
                    if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                        let name: String = chars[i + 2..i + 2 + end].iter().collect();
                        if let Some(value) = self.get(&name) {
                            result.push_str(value);
                        }
                        i += end + 3;
                        continue;
                    }
                } else if chars[i + 1].is_alphabetic() || chars[i + 1] == '_' {
                    let mut end = i + 1;
                    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().collect();
                    if let Some(value) = self.get(&name) {
                        result.push_str(value);
                    }
                    i = end;
                    continue;
                }
            }
            result.push(chars[i]);
            i += 1;
        }

        result
    }

    // Applies an `@export KEY=value` assignment, always overwriting, with `{{...}}`-free `$VAR`/
    // `${VAR}` expansion against the environment collected so far. A bare `@export KEY` (no `=`)
    // with KEY undefined is a silent no-op.
    pub fn apply_export(&mut self, assignment: &str) {
        let assignment = assignment.trim();
        if let Some((key, value)) = assignment.split_once('=') {
            let key = key.trim().to_owned();
            let value = self.expand_references(value.trim());
            self.vars.insert(key, value);
        }
        // A bare `@export KEY` re-exports an already-defined variable into the subprocess
        // environment; since every variable here is already visible to children, this is a
        // deliberate no-op when KEY is undefined.
    }

    pub fn require(&self, variable: &str) -> Result<(), crate::failure::ErrorKind> {
        if self.contains(variable) {
            Ok(())
        } else {
            Err(crate::failure::ErrorKind::MissingRequiredEnv {
                variable: variable.to_owned(),
            })
        }
    }

    // Expands `$VAR` and `${VAR}` references found in `text` against the current variable set.
    // Unknown variables expand to the empty string. `\$` escapes a literal `$`, used for the
    // command-line expansion pass (spec §4.4/§4.8 step 6); callers that want the old
    // no-escape-handling behavior for a single `.env`-style value can still call this directly.
    #[must_use]
    pub fn expand_references(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '\\' && chars.get(i + 1) == Some(&'$') {
                result.push('$');
                i += 2;
                continue;
            }
            if chars[i] == '$' && i + 1 < chars.len() {
                if chars[i + 1] == '{' {
                    if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                        let name: String = chars[i + 2..i + 2 + end].iter().collect();
                        if let Some(value) = self.get(&name) {
                            result.push_str(value);
                        }
                        i += end + 3;
                        continue;
                    }
                } else if chars[i + 1].is_alphabetic() || chars[i + 1] == '_' {
                    let mut end = i + 1;
                    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().collect();
                    if let Some(value) = self.get(&name) {
                        result.push_str(value);
                    }
                    i = end;
                    continue;
                }
            }
            result.push(chars[i]);
            i += 1;
        }

        result
    }

    #[must_use]
    pub fn as_process_vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    // The command-line `$VAR`/`${VAR}` expansion pass named in spec §4.4/§4.8 step 6, applied to a
    // shell command line before the `{{...}}` Jake-expansion pass runs over the result.
    #[must_use]
    pub fn expand_command(&self, line: &str) -> String {
        self.expand_references(line)
    }
}

// The raw (pre-escape, pre-expansion) value of a single `.env` entry, tagged by how it was quoted
// — the quoting style determines what `load_dotenv` does with it next.
enum DotenvValue {
    Double(String),
    Single(String),
    Bare(String),
}

// Parses full `.env` syntax (spec §4.4): `KEY=value` entries, `#`-prefixed comments, blank lines
// ignored, an optional leading `export `, and three value forms — double-quoted (may span
// multiple lines, closed by the first unescaped `"`), single-quoted (literal, single line), and
// bare (trimmed, single line). Escape interpretation and `$VAR` expansion of double-quoted values
// happen in `Environment::expand_dotenv_double`, not here.
fn parse_dotenv_entries(contents: &str) -> Vec<(String, DotenvValue)> {
    let mut entries = Vec::new();
    let mut rest = contents;

    loop {
        rest = rest.trim_start_matches([' ', '\t', '\n', '\r']);
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('#') {
            let idx = rest.find('\n').map_or(rest.len(), |i| i + 1);
            rest = &rest[idx..];
            continue;
        }

        let stripped = rest.strip_prefix("export ").unwrap_or(rest);
        let Some(eq_idx) = stripped.find(['=', '\n']) else {
            break;
        };
        if stripped.as_bytes().get(eq_idx) != Some(&b'=') {
            // a line with no `=` at all; skip past it
            rest = &stripped[eq_idx..];
            continue;
        }

        let key = stripped[..eq_idx].trim().to_owned();
        let after_eq = stripped[eq_idx + 1..].trim_start_matches([' ', '\t']);

        if let Some(val_rest) = after_eq.strip_prefix('"') {
            let mut escaped = false;
            let mut end_byte = None;
            for (idx, ch) in val_rest.char_indices() {
                if escaped {
                    escaped = false;
                    continue;
                }
                if ch == '\\' {
                    escaped = true;
                    continue;
                }
                if ch == '"' {
                    end_byte = Some(idx);
                    break;
                }
            }
            let end = end_byte.unwrap_or(val_rest.len());
            entries.push((key, DotenvValue::Double(val_rest[..end].to_owned())));
            rest = val_rest.get(end + 1..).unwrap_or("");
        } else if let Some(val_rest) = after_eq.strip_prefix('\'') {
            let end = val_rest.find('\'').unwrap_or(val_rest.len());
            entries.push((key, DotenvValue::Single(val_rest[..end].to_owned())));
            rest = val_rest.get(end + 1..).unwrap_or("");
        } else {
            let end = after_eq.find('\n').unwrap_or(after_eq.len());
            let value = after_eq[..end].trim_end_matches('\r').trim().to_owned();
            entries.push((key, DotenvValue::Bare(value)));
            rest = &after_eq[end..];
        }

        // Discard any trailing comment/garbage up to the end of the line.
        if let Some(nl) = rest.find('\n') {
            rest = &rest[nl + 1..];
        } else {
            rest = "";
        }
    }

    entries
}

// Parses `.env`-style `KEY=value` syntax for the simpler config-file grammar (SPEC_FULL.md A.3):
// one entry per line, `#`-prefixed comments, blank lines ignored, optional surrounding
// single/double quotes, no escape interpretation or variable expansion.
fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_owned();
            let mut value = value.trim();
            if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
                || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
            {
                value = &value[1..value.len() - 1];
            }
            pairs.push((key, value.to_owned()));
        }
    }

    pairs
}

// The optional `~/.config/jake/jake.conf` settings file: `KEY=value` lines controlling defaults
// like the worker pool size or default shell. Silently absent is not an error.
#[derive(Clone, Debug, Default)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    pub fn load() -> Result<Self, Failure> {
        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .map_err(system_error(&format!("Couldn't read config file `{}`.", path.display())))?;

        Ok(Self {
            values: parse_dotenv(&contents).into_iter().collect(),
        })
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jake").join("jake.conf"))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_dotenv, parse_dotenv_entries, Config, DotenvValue, Environment};
    use std::{collections::HashMap, io::Write as _};

    #[test]
    fn parse_dotenv_skips_comments_and_blanks() {
        let pairs = parse_dotenv("# comment\n\nFOO=bar\n");
        assert_eq!(pairs, vec![("FOO".to_owned(), "bar".to_owned())]);
    }

    #[test]
    fn parse_dotenv_strips_quotes() {
        let pairs = parse_dotenv("FOO=\"bar baz\"\n");
        assert_eq!(pairs, vec![("FOO".to_owned(), "bar baz".to_owned())]);
    }

    #[test]
    fn parse_dotenv_does_not_interpret_backslash_escapes() {
        let pairs = parse_dotenv(r"FOO=a\nb");
        assert_eq!(pairs, vec![("FOO".to_owned(), r"a\nb".to_owned())]);
    }

    #[test]
    fn expand_references_substitutes_braced_and_bare_vars() {
        let mut env = Environment::default();
        env.set("NAME", "world");
        assert_eq!(env.expand_references("hello ${NAME}!"), "hello world!");
        assert_eq!(env.expand_references("hello $NAME!"), "hello world!");
    }

    #[test]
    fn expand_references_replaces_unknown_vars_with_empty_string() {
        let env = Environment::default();
        assert_eq!(env.expand_references("$UNSET"), "");
        assert_eq!(env.expand_references("a${UNSET}b"), "ab");
    }

    #[test]
    fn expand_references_backslash_dollar_is_literal() {
        let mut env = Environment::default();
        env.set("NAME", "world");
        assert_eq!(env.expand_references(r"\$NAME"), "$NAME");
        assert_eq!(env.expand_command("price: \\$5, name: $NAME"), "price: $5, name: world");
    }

    #[test]
    fn apply_export_bare_key_on_undefined_variable_is_noop() {
        let mut env = Environment::default();
        env.apply_export("UNDEFINED");
        assert!(!env.contains("UNDEFINED"));
    }

    #[test]
    fn parse_dotenv_entries_splits_quote_kinds() {
        let entries = parse_dotenv_entries("A=\"double\"\nB='single'\nC=bare\n");
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0].1, DotenvValue::Double(s) if s == "double"));
        assert!(matches!(&entries[1].1, DotenvValue::Single(s) if s == "single"));
        assert!(matches!(&entries[2].1, DotenvValue::Bare(s) if s == "bare"));
    }

    #[test]
    fn parse_dotenv_entries_double_quoted_value_spans_multiple_lines() {
        let entries = parse_dotenv_entries("KEY=\"line one\nline two\"\n");
        assert!(matches!(&entries[0].1, DotenvValue::Double(s) if s == "line one\nline two"));
    }

    #[test]
    fn load_dotenv_expands_double_quoted_escapes_and_vars() {
        let mut dir_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(dir_file, "NAME=world").unwrap();
        writeln!(dir_file, "GREETING=\"hello\\n${{NAME}}\"").unwrap();
        let mut env = Environment::default();
        env.load_dotenv(dir_file.path()).unwrap();
        assert_eq!(env.get("NAME"), Some("world"));
        assert_eq!(env.get("GREETING"), Some("hello\nworld"));
    }

    #[test]
    fn load_dotenv_double_quoted_backslash_dollar_is_not_an_escape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PRICE=\"cost: \\$5\"").unwrap();
        let mut env = Environment::default();
        env.load_dotenv(file.path()).unwrap();
        // `\$` is not collapsed to a literal `$`; the backslash is kept and the bare `$5` that
        // follows is parsed as a (non-alphabetic) reference that doesn't match any variable name,
        // so it's left untouched.
        assert_eq!(env.get("PRICE"), Some("cost: \\$5"));
    }

    #[test]
    fn load_dotenv_single_quoted_value_is_literal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "RAW='a\\nb ${{NOPE}}'").unwrap();
        let mut env = Environment::default();
        env.load_dotenv(file.path()).unwrap();
        assert_eq!(env.get("RAW"), Some("a\\nb ${NOPE}"));
    }

    #[test]
    fn require_missing_variable_errors() {
        let env = Environment::default();
        assert!(env.require("MISSING").is_err());
    }

    #[test]
    fn config_get_returns_known_key() {
        let config = Config {
            values: [("jobs".to_owned(), "4".to_owned())].into_iter().collect::<HashMap<_, _>>(),
        };
        assert_eq!(config.get("jobs"), Some("4"));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn config_load_reads_key_value_pairs_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("jake.conf"), "jobs=4\nverbose=true\n").unwrap();

        let contents = std::fs::read_to_string(dir.path().join("jake.conf")).unwrap();
        let config = Config {
            values: parse_dotenv(&contents).into_iter().collect(),
        };
        assert_eq!(config.get("jobs"), Some("4"));
        assert_eq!(config.get("verbose"), Some("true"));
    }

    #[test]
    fn config_default_path_is_under_a_jake_directory() {
        if let Some(path) = Config::default_path() {
            assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("jake.conf"));
            assert_eq!(
                path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()),
                Some("jake")
            );
        }
    }
}
