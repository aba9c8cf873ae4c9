// The `{{...}}` expansion engine (spec §5): variable references, positional arguments, and the
// closed built-in function table. Grounded on the teacher's own templating pass in
// `toastfile.rs::Toastfile::expand_run_script`, generalized from a single fixed substitution to a
// small function-call grammar.

use crate::{context::RuntimeContext, env::Environment};
use std::path::Path;
use typed_path::Utf8UnixPath;

// One parsed `{{...}}` reference: a bare name, a positional argument, or a function call.
enum Reference {
    Name(String),
    Positional(usize),
    AllPositional,
    Call { name: String, arg: String },
}

pub fn expand_command(
    text: &str,
    params: &[(String, String)],
    positional: &[String],
    ctx: &RuntimeContext,
    env: &Environment,
) -> String {
    let mut result = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' && chars.get(i + 1) == Some(&'{') {
            if let Some(end) = find_close(&chars, i + 2) {
                let inner: String = chars[i + 2..end].iter().collect();
                result.push_str(&resolve(&inner, params, positional, ctx, env));
                i = end + 2;
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}

fn find_close(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 1 < chars.len() {
        if chars[i] == '}' && chars[i + 1] == '}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

// An unresolved or malformed reference is left exactly as written, braces and all (spec §4.5:
// unknown names/functions "remain literal"; `{{ name }}` padding is "not a valid variable
// reference" and so falls through to this same passthrough).
fn literal(inner: &str) -> String {
    format!("{{{{{inner}}}}}")
}

fn resolve(
    inner: &str,
    params: &[(String, String)],
    positional: &[String],
    ctx: &RuntimeContext,
    env: &Environment,
) -> String {
    match parse_reference(inner) {
        Some(Reference::Name(name)) => params
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
            .or_else(|| env.get(&name).map(str::to_owned))
            .unwrap_or_else(|| literal(inner)),
        Some(Reference::Positional(n)) => {
            if n == 0 {
                String::new()
            } else {
                positional.get(n - 1).cloned().unwrap_or_default()
            }
        }
        Some(Reference::AllPositional) => positional.join(" "),
        Some(Reference::Call { name, arg }) => {
            if is_known_function(&name) {
                let arg = resolve_call_argument(&arg, params, positional, ctx, env);
                call_builtin(&name, &arg, ctx, env)
            } else {
                literal(inner)
            }
        }
        None => literal(inner),
    }
}

// A function-call argument is either a quoted string literal (used as-is, quotes stripped) or a
// reference to resolve (a variable name, positional, or nested call).
fn resolve_call_argument(
    arg: &str,
    params: &[(String, String)],
    positional: &[String],
    ctx: &RuntimeContext,
    env: &Environment,
) -> String {
    let trimmed = arg.trim();
    if (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
        || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
    {
        trimmed[1..trimmed.len() - 1].to_owned()
    } else {
        resolve(trimmed, params, positional, ctx, env)
    }
}

// Whitespace inside `{{...}}` is only trimmed for function calls; a bare name or positional
// reference with any surrounding padding (e.g. `{{ name }}`) is not a valid reference at all, so
// `raw` is only accepted as one when it carries no padding to begin with (spec §4.5).
fn parse_reference(raw: &str) -> Option<Reference> {
    let trimmed = raw.trim();

    if let Some(open) = trimmed.find('(') {
        if trimmed.ends_with(')') {
            let name = trimmed[..open].trim().to_owned();
            let arg = trimmed[open + 1..trimmed.len() - 1].to_owned();
            return Some(Reference::Call { name, arg });
        }
    }

    if raw != trimmed {
        return None;
    }

    if let Some(rest) = raw.strip_prefix('$') {
        if rest == "@" {
            return Some(Reference::AllPositional);
        }
        if let Ok(n) = rest.parse::<usize>() {
            return Some(Reference::Positional(n));
        }
    }

    Some(Reference::Name(raw.to_owned()))
}

// The closed set of `{{fn(arg)}}` names `call_builtin` actually implements; anything else leaves
// the expression literal (spec §4.5: "Unknown functions leave the expression literal").
fn is_known_function(name: &str) -> bool {
    matches!(
        name,
        "uppercase"
            | "lowercase"
            | "trim"
            | "dirname"
            | "basename"
            | "extension"
            | "without_extension"
            | "without_extensions"
            | "absolute_path"
            | "abs_path"
            | "home"
            | "local_bin"
            | "shell_config"
            | "launch"
            | "env"
            | "exists"
            | "command"
            | "is_watching"
            | "is_dry_run"
            | "is_verbose"
            | "is_platform"
            | "is_macos"
            | "is_linux"
            | "is_windows"
            | "is_unix"
    )
}

fn call_builtin(name: &str, arg: &str, ctx: &RuntimeContext, env: &Environment) -> String {
    match name {
        "uppercase" => arg.to_uppercase(),
        "lowercase" => arg.to_lowercase(),
        "trim" => arg.trim().to_owned(),
        // Jakefile paths are always forward-slash, whatever host OS `jake` itself was built for,
        // so these four operate on `typed_path`'s explicit Unix path semantics rather than `std`'s
        // host-dependent `Path` (which would split `a\b` on Windows).
        "dirname" => Utf8UnixPath::new(arg)
            .parent()
            .map(|p| p.as_str().to_owned())
            .unwrap_or_default(),
        "basename" => Utf8UnixPath::new(arg)
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default(),
        "extension" => Utf8UnixPath::new(arg)
            .extension()
            .map(|e| format!(".{}", e))
            .unwrap_or_default(),
        "without_extension" => Utf8UnixPath::new(arg).with_extension("").as_str().to_owned(),
        "without_extensions" => {
            let mut path = Utf8UnixPath::new(arg).with_extension("");
            while path.extension().is_some() {
                path = path.with_extension("");
            }
            path.as_str().to_owned()
        }
        "absolute_path" | "abs_path" => std::fs::canonicalize(arg)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| arg.to_owned()),
        "home" => dirs::home_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "local_bin" => dirs::home_dir()
            .map(|p| {
                p.join(".local")
                    .join("bin")
                    .join(arg)
                    .to_string_lossy()
                    .into_owned()
            })
            .unwrap_or_default(),
        "shell_config" => dirs::home_dir()
            .map(|p| p.join(shell_config_basename()).to_string_lossy().into_owned())
            .unwrap_or_default(),
        "launch" => launch_command(arg),
        "env" => env.get(arg).unwrap_or_default().to_owned(),
        "exists" => bool_str(Path::new(arg).exists()),
        "command" => bool_str(which(arg)),
        "is_watching" => bool_str(ctx.watch_mode),
        "is_dry_run" => bool_str(ctx.dry_run),
        "is_verbose" => bool_str(ctx.verbose),
        "is_platform" => bool_str(current_os() == arg),
        "is_macos" => bool_str(current_os() == "macos"),
        "is_linux" => bool_str(current_os() == "linux"),
        "is_windows" => bool_str(current_os() == "windows"),
        "is_unix" => bool_str(current_os() != "windows"),
        _ => String::new(),
    }
}

// `eq`/`neq` take two comma-separated arguments rather than one; handled specially since they
// don't fit the single-arg `call_builtin` shape used elsewhere.
#[must_use]
pub fn eval_eq(args: &str) -> bool {
    let mut parts = split_top_level_commas(args);
    if parts.len() == 2 {
        parts.pop().unwrap() == parts.pop().unwrap()
    } else {
        false
    }
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    text.split(',').map(|s| s.trim().trim_matches('"').to_owned()).collect()
}

fn bool_str(b: bool) -> String {
    if b {
        "true".to_owned()
    } else {
        String::new()
    }
}

// Picks the rc file for `$SHELL`'s basename (`zsh` -> `.zshrc`, `bash` -> `.bashrc`, etc.),
// falling back to `.profile` for an unrecognized or unset shell.
fn shell_config_basename() -> &'static str {
    let shell = std::env::var("SHELL").unwrap_or_default();
    let basename = Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match basename {
        "zsh" => ".zshrc",
        "bash" => ".bashrc",
        "fish" => ".config/fish/config.fish",
        "ksh" => ".kshrc",
        "tcsh" => ".tcshrc",
        _ => ".profile",
    }
}

fn which(command: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(command).is_file())
        })
        .unwrap_or(false)
}

// The shell command that opens `target` with the platform's default file/URL handler, used by
// `{{launch(target)}}` and the `@launch` directive alike.
#[must_use]
pub fn launch_command(target: &str) -> String {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "start"
    } else {
        "xdg-open"
    };
    format!("{} {}", opener, shell_quote(target))
}

// Single-quotes `arg` for embedding in an `sh -c` line, escaping any embedded single quote the
// usual POSIX way: close the quote, emit an escaped quote, reopen.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[must_use]
pub fn current_os() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        "unix"
    }
}

#[cfg(test)]
mod tests {
    use super::{eval_eq, expand_command};
    use crate::{context::RuntimeContext, env::Environment};

    #[test]
    fn expand_bare_name_from_params() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let params = vec![("name".to_owned(), "World".to_owned())];
        assert_eq!(
            expand_command("Hello, {{name}}!", &params, &[], &ctx, &env),
            "Hello, World!"
        );
    }

    #[test]
    fn expand_positional_argument() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let positional = vec!["first".to_owned(), "second".to_owned()];
        assert_eq!(
            expand_command("{{$1}} {{$2}}", &[], &positional, &ctx, &env),
            "first second"
        );
    }

    #[test]
    fn expand_all_positional() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let positional = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(expand_command("{{$@}}", &[], &positional, &ctx, &env), "a b");
    }

    #[test]
    fn expand_function_call_uppercase() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let params = vec![("name".to_owned(), "world".to_owned())];
        assert_eq!(
            expand_command("{{uppercase(name)}}", &params, &[], &ctx, &env),
            "WORLD"
        );
    }

    #[test]
    fn expand_dirname_and_basename() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        assert_eq!(
            expand_command("{{dirname(\"a/b/c.txt\")}}", &[], &[], &ctx, &env),
            "a/b"
        );
    }

    #[test]
    fn expand_unknown_name_is_left_literal() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        assert_eq!(
            expand_command("Hello, {{typo}}!", &[], &[], &ctx, &env),
            "Hello, {{typo}}!"
        );
    }

    #[test]
    fn expand_unknown_function_is_left_literal() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        assert_eq!(
            expand_command("{{frobnicate(x)}}", &[], &[], &ctx, &env),
            "{{frobnicate(x)}}"
        );
    }

    #[test]
    fn expand_padded_name_is_not_a_valid_reference() {
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let params = vec![("name".to_owned(), "World".to_owned())];
        assert_eq!(
            expand_command("Hello, {{ name }}!", &params, &[], &ctx, &env),
            "Hello, {{ name }}!"
        );
    }

    #[test]
    fn eval_eq_matches_equal_strings() {
        assert!(eval_eq("\"a\",\"a\""));
        assert!(!eval_eq("\"a\",\"b\""));
    }

    #[test]
    fn launch_command_quotes_its_target() {
        let line = super::launch_command("a file.txt");
        assert!(line.ends_with("'a file.txt'"));
    }

    #[test]
    fn shell_quote_escapes_embedded_single_quotes() {
        assert_eq!(super::shell_quote("it's"), "'it'\\''s'");
    }
}
