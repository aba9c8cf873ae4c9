// Evaluates `@if`/`@elif`/`@else` conditions (spec §4.4), splitting a flat `if`-block child list
// into the one branch that actually runs. Predicates reuse the same built-in names as the
// expansion engine's boolean-returning functions.

use crate::{
    ast::{Command, DirectiveTag},
    context::RuntimeContext,
    env::Environment,
    expand::{self, current_os, expand_command},
};
use std::path::Path;

#[must_use]
pub fn evaluate(condition: &str, ctx: &RuntimeContext, env: &Environment) -> bool {
    let condition = condition.trim();

    if let Some(open) = condition.find('(') {
        if condition.ends_with(')') {
            let name = condition[..open].trim();
            let arg = &condition[open + 1..condition.len() - 1];
            return evaluate_call(name, arg, ctx, env);
        }
    }

    // A bare name is true when non-empty in the environment.
    env.get(condition).is_some_and(|v| !v.is_empty())
}

fn evaluate_call(name: &str, arg: &str, ctx: &RuntimeContext, env: &Environment) -> bool {
    match name {
        "eq" => expand::eval_eq(arg),
        "neq" => !expand::eval_eq(arg),
        "env" => env
            .get(arg.trim().trim_matches('"'))
            .is_some_and(|v| !v.is_empty()),
        "exists" => Path::new(arg.trim().trim_matches('"')).exists(),
        "command" => which(arg.trim().trim_matches('"')),
        "is_watching" => ctx.watch_mode,
        "is_dry_run" => ctx.dry_run,
        "is_verbose" => ctx.verbose,
        "is_platform" => current_os() == arg.trim().trim_matches('"'),
        "is_macos" => current_os() == "macos",
        "is_linux" => current_os() == "linux",
        "is_windows" => current_os() == "windows",
        "is_unix" => current_os() != "windows",
        _ => false,
    }
}

// `command(N)` is true iff `N` resolves in `$PATH`, or, when `N` is an absolute path, iff it
// exists and is executable (spec §4.7).
fn which(command: &str) -> bool {
    if let Some(stripped) = command.strip_prefix('/') {
        let path = Path::new("/").join(stripped);
        return is_executable_file(&path);
    }

    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

// Splits an `if`/`elif`/`else` block's flat children into the commands belonging to the one
// branch whose condition is true (the first match wins; `else` always matches if reached).
// Condition text is `{{...}}`-expanded before evaluation (spec §4.7), so a condition can
// reference recipe parameters or positional arguments.
#[must_use]
pub fn select_branch<'a>(
    children: &'a [Command],
    params: &[(String, String)],
    positional: &[String],
    ctx: &RuntimeContext,
    env: &Environment,
) -> Vec<&'a Command> {
    let mut selected = Vec::new();
    let mut taking = false;
    let mut resolved = false;

    for child in children {
        match &child.directive {
            Some(DirectiveTag::If { condition }) => {
                let condition = expand_command(condition, params, positional, ctx, env);
                taking = !resolved && evaluate(&condition, ctx, env);
                resolved = resolved || taking;
            }
            Some(DirectiveTag::Elif { condition }) => {
                let condition = expand_command(condition, params, positional, ctx, env);
                taking = !resolved && evaluate(&condition, ctx, env);
                resolved = resolved || taking;
            }
            Some(DirectiveTag::Else) => {
                taking = !resolved;
                resolved = true;
            }
            _ => {
                if taking {
                    selected.push(child);
                }
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::{evaluate, select_branch};
    use crate::{
        ast::{Command, DirectiveTag, Location},
        context::RuntimeContext,
        env::Environment,
    };

    #[test]
    fn evaluate_eq_true() {
        let env = Environment::default();
        let ctx = RuntimeContext::for_test();
        assert!(evaluate("eq(\"a\",\"a\")", &ctx, &env));
    }

    #[test]
    fn evaluate_env_checks_presence() {
        let mut env = Environment::default();
        env.set("CI", "true");
        let ctx = RuntimeContext::for_test();
        assert!(evaluate("env(CI)", &ctx, &env));
        assert!(!evaluate("env(MISSING)", &ctx, &env));
    }

    #[test]
    fn evaluate_env_is_false_when_set_but_empty() {
        let mut env = Environment::default();
        env.set("EMPTY", "");
        let ctx = RuntimeContext::for_test();
        assert!(!evaluate("env(EMPTY)", &ctx, &env));
    }

    #[test]
    fn evaluate_command_resolves_absolute_path() {
        let env = Environment::default();
        let ctx = RuntimeContext::for_test();
        assert!(evaluate("command(/bin/sh)", &ctx, &env));
        assert!(!evaluate("command(/definitely/not/a/real/binary)", &ctx, &env));
    }

    #[test]
    fn select_branch_picks_if_when_true() {
        let loc = Location::new(1, 1);
        let children = vec![
            Command {
                directive: Some(DirectiveTag::If {
                    condition: "eq(\"a\",\"a\")".to_owned(),
                }),
                ..Command::shell("", loc)
            },
            Command::shell("echo yes", loc),
            Command {
                directive: Some(DirectiveTag::Else),
                ..Command::shell("", loc)
            },
            Command::shell("echo no", loc),
        ];
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let selected = select_branch(&children, &[], &[], &ctx, &env);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text, "echo yes");
    }

    #[test]
    fn select_branch_falls_to_else_when_false() {
        let loc = Location::new(1, 1);
        let children = vec![
            Command {
                directive: Some(DirectiveTag::If {
                    condition: "eq(\"a\",\"b\")".to_owned(),
                }),
                ..Command::shell("", loc)
            },
            Command::shell("echo yes", loc),
            Command {
                directive: Some(DirectiveTag::Else),
                ..Command::shell("", loc)
            },
            Command::shell("echo no", loc),
        ];
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let selected = select_branch(&children, &[], &[], &ctx, &env);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text, "echo no");
    }

    #[test]
    fn select_branch_expands_jake_references_in_condition() {
        let loc = Location::new(1, 1);
        let children = vec![
            Command {
                directive: Some(DirectiveTag::If {
                    condition: "eq({{mode}},\"release\")".to_owned(),
                }),
                ..Command::shell("", loc)
            },
            Command::shell("echo releasing", loc),
        ];
        let ctx = RuntimeContext::for_test();
        let env = Environment::default();
        let params = vec![("mode".to_owned(), "\"release\"".to_owned())];
        let selected = select_branch(&children, &params, &[], &ctx, &env);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text, "echo releasing");
    }
}
