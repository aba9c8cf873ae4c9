// Executes a single recipe (spec §4.8): pre-flight `@needs` checks, OS filtering, `@cd`/`@shell`
// scoping, echo/dry-run, expansion, directive dispatch, subprocess spawn, and error/`@ignore`/
// timeout handling. Grounded on the teacher's own subprocess-spawn-and-stream-output idiom in the
// old Docker runner, generalized from "run a command inside a container" to "run a command as a
// local subprocess."

use crate::{
    ast::{Command, DirectiveTag, Recipe},
    condition::select_branch,
    context::RuntimeContext,
    expand::{expand_command, launch_command},
    failure::ErrorKind,
    glob,
    hooks::HookRunner,
    theme::{echo_prefix, failure_glyph, success_glyph, CodeStr},
};
use log::info;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command as ProcessCommand, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

pub struct RunOutcome {
    pub ran: bool, // false when a file recipe was skipped because it was already fresh
}

// The mutable scope threaded through a recipe's command list: the `@cd`/`@shell` directives mutate
// it in place, and `@timeout` sets a one-shot override consumed by the very next command. Reset at
// the start of every recipe invocation, so a recipe never leaks scope into the next one.
struct RunState {
    shell: Option<String>,
    working_dir: Option<PathBuf>,
    next_timeout: Option<u64>,
    next_ignore: bool,
}

impl RunState {
    fn new(recipe: &Recipe, ctx: &RuntimeContext) -> Self {
        Self {
            shell: recipe.shell.clone(),
            working_dir: recipe
                .working_dir
                .as_ref()
                .map(|dir| resolve_dir(&ctx.working_dir, dir)),
            next_timeout: None,
            next_ignore: false,
        }
    }
}

fn resolve_dir(base: &Path, dir: &str) -> PathBuf {
    let candidate = Path::new(dir);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

pub fn run_recipe(
    recipe: &Recipe,
    positional: &[String],
    ctx: &mut RuntimeContext,
    hooks: &HookRunner,
    running: &Arc<AtomicBool>,
) -> Result<RunOutcome, ErrorKind> {
    if !recipe.only_os.is_empty() && !recipe.only_os.iter().any(|os| os == crate::expand::current_os()) {
        return Ok(RunOutcome { ran: false });
    }

    for need in &recipe.needs {
        check_need(recipe, need)?;
    }

    let inputs = glob::expand_all(
        &ctx.working_dir,
        &recipe
            .commands
            .iter()
            .filter_map(cache_patterns)
            .flatten()
            .chain(recipe.file_deps.clone())
            .collect::<Vec<_>>(),
    );
    let cache_key = recipe.name.clone();
    let fingerprint = crate::cache::Cache::fingerprint(&recipe.name, &inputs, positional);

    if matches!(recipe.kind, crate::ast::RecipeKind::File) {
        if let Some(output) = &recipe.output {
            if output.exists() && ctx.cache.is_fresh(&cache_key, &fingerprint) {
                return Ok(RunOutcome { ran: false });
            }
        }
    }

    for command in hooks.pre_commands(&recipe.name) {
        run_shell_line(&command, recipe, ctx, running)?;
    }
    for command in &recipe.pre_hooks {
        run_shell_line(command, recipe, ctx, running)?;
    }

    let params: Vec<(String, String)> = recipe
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let value = positional
                .get(i)
                .cloned()
                .or_else(|| p.default.clone())
                .unwrap_or_default();
            (p.name.clone(), value)
        })
        .collect();

    let mut state = RunState::new(recipe, ctx);
    let result = run_commands(&recipe.commands, recipe, &params, positional, ctx, running, &mut state);

    if result.is_err() {
        for command in hooks.on_error_commands(&recipe.name) {
            let _ = run_shell_line(&command, recipe, ctx, running);
        }
    }

    // `@post`/targeted `@after`/global `@post` run after the recipe's commands whether they
    // succeeded or failed (spec §4.8 step 9, §5 "Ordering"); only `@on_error` above is
    // failure-only.
    for command in &recipe.post_hooks {
        run_shell_line(command, recipe, ctx, running)?;
    }
    for command in hooks.post_commands(&recipe.name) {
        run_shell_line(&command, recipe, ctx, running)?;
    }

    if result.is_ok() && !ctx.dry_run {
        ctx.cache.record(&cache_key, &fingerprint);
    }

    result.map(|()| RunOutcome { ran: true })
}

fn cache_patterns(command: &Command) -> Option<Vec<String>> {
    match &command.directive {
        Some(DirectiveTag::Cache { patterns }) => Some(patterns.clone()),
        _ => None,
    }
}

fn check_need(recipe: &Recipe, need: &crate::ast::Need) -> Result<(), ErrorKind> {
    let available = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&need.command).is_file()))
        .unwrap_or(false);

    if available {
        Ok(())
    } else {
        Err(ErrorKind::MissingCommand {
            recipe: recipe.name.clone(),
            command: need.command.clone(),
            hint: need.hint.clone(),
            install_recipe: need.install_recipe.clone(),
        })
    }
}

// Applies the two expansion passes in order (spec §4.4/§4.8 step 6): first `$VAR`/`${VAR}`
// against the environment, then `{{...}}` Jake expansion over the result.
fn env_then_jake_expand(
    text: &str,
    params: &[(String, String)],
    positional: &[String],
    ctx: &RuntimeContext,
) -> String {
    let env_expanded = ctx.environment.expand_command(text);
    expand_command(&env_expanded, params, positional, ctx, &ctx.environment)
}

fn run_commands(
    commands: &[Command],
    recipe: &Recipe,
    params: &[(String, String)],
    positional: &[String],
    ctx: &mut RuntimeContext,
    running: &Arc<AtomicBool>,
    state: &mut RunState,
) -> Result<(), ErrorKind> {
    for command in commands {
        if !running.load(Ordering::SeqCst) {
            return Err(ErrorKind::IOError {
                message: "interrupted".to_owned(),
                fatal: true,
            });
        }

        match &command.directive {
            None => run_one_command(command, recipe, params, positional, ctx, running, state)?,
            // An inline `@ignore` directive (as opposed to the `-` line prefix, which is carried
            // on `Command::ignored`) tolerates a failure in the very next command only.
            Some(DirectiveTag::Ignore) => state.next_ignore = true,
            Some(DirectiveTag::Confirm { message }) => {
                let message = env_then_jake_expand(message, params, positional, ctx);
                if !confirm(&message, ctx)? {
                    return Err(ErrorKind::UserDeclined {
                        recipe: recipe.name.clone(),
                    });
                }
            }
            Some(DirectiveTag::Require { variables }) => {
                for variable in variables {
                    ctx.environment.require(variable)?;
                }
            }
            Some(DirectiveTag::Export { assignment }) => {
                ctx.environment.apply_export(assignment);
            }
            Some(DirectiveTag::Timeout { seconds }) => {
                // A one-shot override: consumed by the very next command, then the recipe's own
                // `@timeout` default (if any) takes back over.
                state.next_timeout = Some(*seconds);
            }
            Some(DirectiveTag::Cd { path }) => {
                let expanded = env_then_jake_expand(path, params, positional, ctx);
                state.working_dir = Some(resolve_dir(&ctx.working_dir, &expanded));
            }
            Some(DirectiveTag::Shell { interpreter }) => {
                let expanded = env_then_jake_expand(interpreter, params, positional, ctx);
                state.shell = Some(expanded);
            }
            Some(DirectiveTag::Needs(need)) => check_need(recipe, need)?,
            Some(DirectiveTag::Cache { patterns }) => {
                run_cache_block(command, patterns, recipe, params, positional, ctx, running, state)?;
            }
            Some(DirectiveTag::Each { source }) => {
                let expanded = env_then_jake_expand(source, params, positional, ctx);
                for item in resolve_each_items(&expanded, &ctx.working_dir) {
                    let mut item_params = params.to_vec();
                    item_params.push(("item".to_owned(), item));
                    run_commands(&command.children, recipe, &item_params, positional, ctx, running, state)?;
                }
            }
            Some(DirectiveTag::If { .. }) => {
                let selected = select_branch(&command.children, params, positional, ctx, &ctx.environment);
                let owned: Vec<Command> = selected.into_iter().cloned().collect();
                run_commands(&owned, recipe, params, positional, ctx, running, state)?;
            }
            Some(DirectiveTag::Elif { .. } | DirectiveTag::Else | DirectiveTag::End) => {}
            Some(DirectiveTag::Watch { patterns }) => {
                // Outside of watch mode this directive is metadata consumed elsewhere; in dry-run
                // it's worth surfacing what it would have monitored.
                if ctx.dry_run {
                    eprintln!(
                        "{} @watch would monitor: {}",
                        echo_prefix(ctx.dry_run),
                        patterns.join(", ")
                    );
                }
            }
            Some(DirectiveTag::Launch { target }) => {
                let expanded = env_then_jake_expand(target, params, positional, ctx);
                let line = launch_command(&expanded);
                run_shell_line_with(&line, recipe, ctx, running, recipe.quiet, false, state, recipe.timeout_seconds)?;
            }
            Some(DirectiveTag::Pre | DirectiveTag::Post) => {
                // A recipe's own `@pre`/`@post` lines are parsed straight into
                // `Recipe::pre_hooks`/`post_hooks` (see parser.rs) and never surface as a
                // `Command` here; kept as a closed match arm for exhaustiveness.
            }
        }
    }

    Ok(())
}

// Resolves an `@each` source (already `$VAR`/`{{...}}`-expanded) into its item list (spec §4.8):
// comma/whitespace-separated tokens, with any token containing glob metacharacters expanded
// against the working tree rather than used literally. An empty source yields zero items, i.e.
// zero loop iterations.
fn resolve_each_items(expanded: &str, root: &Path) -> Vec<String> {
    let mut items = Vec::new();

    for token in expanded
        .split([',', ' ', '\t'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if glob::is_glob_pattern(token) {
            for path in glob::expand(root, token) {
                let item = path
                    .strip_prefix(root)
                    .map_or_else(|_| path.to_string_lossy().into_owned(), |rel| rel.to_string_lossy().into_owned());
                items.push(item);
            }
        } else {
            items.push(token.to_owned());
        }
    }

    items
}

// A `@cache` block runs its children only when the content hash of its declared patterns has
// changed since the last run; an empty pattern list always executes (spec §3, §4.8). Each
// occurrence is keyed by its source location, since a recipe may contain more than one block.
fn run_cache_block(
    command: &Command,
    patterns: &[String],
    recipe: &Recipe,
    params: &[(String, String)],
    positional: &[String],
    ctx: &mut RuntimeContext,
    running: &Arc<AtomicBool>,
    state: &mut RunState,
) -> Result<(), ErrorKind> {
    if patterns.is_empty() {
        return run_commands(&command.children, recipe, params, positional, ctx, running, state);
    }

    let inputs = glob::expand_all(&ctx.working_dir, patterns);
    let key = format!(
        "{}@cache:{}:{}",
        recipe.name, command.location.line, command.location.column
    );
    let fingerprint = crate::cache::Cache::fingerprint(&key, &inputs, &[]);

    if ctx.cache.is_fresh(&key, &fingerprint) {
        eprintln!("{} cache hit, skipping", echo_prefix(ctx.dry_run));
        return Ok(());
    }

    run_commands(&command.children, recipe, params, positional, ctx, running, state)?;
    if !ctx.dry_run {
        ctx.cache.record(&key, &fingerprint);
    }
    Ok(())
}

fn run_one_command(
    command: &Command,
    recipe: &Recipe,
    params: &[(String, String)],
    positional: &[String],
    ctx: &mut RuntimeContext,
    running: &Arc<AtomicBool>,
    state: &mut RunState,
) -> Result<(), ErrorKind> {
    let expanded = env_then_jake_expand(&command.text, params, positional, ctx);
    let timeout = state.next_timeout.take().or(recipe.timeout_seconds);
    let silent = command.silent || recipe.quiet;
    let ignored = command.ignored || std::mem::replace(&mut state.next_ignore, false);
    run_shell_line_with(&expanded, recipe, ctx, running, silent, ignored, state, timeout)
}

// Runs a hook line (global/targeted or recipe-own `@pre`/`@post`/`@on_error`) with only the `$VAR`
// environment expansion pass applied; hooks aren't given per-recipe parameter bindings, so Jake
// `{{...}}` expansion doesn't apply to them. Always uses the recipe's own shell/working-directory
// defaults, never the body's `@cd`/`@shell` scope (hooks run outside that scope entirely).
fn run_shell_line(
    line: &str,
    recipe: &Recipe,
    ctx: &mut RuntimeContext,
    running: &Arc<AtomicBool>,
) -> Result<(), ErrorKind> {
    let expanded = ctx.environment.expand_command(line);
    let state = RunState::new(recipe, ctx);
    run_shell_line_with(&expanded, recipe, ctx, running, false, false, &state, recipe.timeout_seconds)
}

fn run_shell_line_with(
    line: &str,
    recipe: &Recipe,
    ctx: &mut RuntimeContext,
    running: &Arc<AtomicBool>,
    silent: bool,
    ignored: bool,
    state: &RunState,
    timeout_seconds: Option<u64>,
) -> Result<(), ErrorKind> {
    if !silent {
        eprintln!("{} {}", echo_prefix(ctx.dry_run), line);
    }

    if ctx.dry_run {
        return Ok(());
    }

    let shell = state.shell.as_deref().unwrap_or("sh");
    let mut process = ProcessCommand::new(shell);
    process.arg("-c").arg(line);
    process.envs(ctx.environment.as_process_vars());

    if let Some(dir) = &state.working_dir {
        process.current_dir(dir);
    } else {
        process.current_dir(&ctx.working_dir);
    }

    process.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());

    let mut child = process.spawn().map_err(|e| ErrorKind::IOError {
        message: format!("couldn't spawn `{}`: {}", line, e),
        fatal: true,
    })?;

    let status = if let Some(seconds) = timeout_seconds {
        wait_with_timeout(&mut child, Duration::from_secs(seconds), line)?
    } else {
        child.wait().map_err(|e| ErrorKind::IOError {
            message: format!("couldn't wait on `{}`: {}", line, e),
            fatal: true,
        })?
    };

    if !running.load(Ordering::SeqCst) {
        return Err(ErrorKind::IOError {
            message: "interrupted".to_owned(),
            fatal: true,
        });
    }

    if status.success() {
        if !silent {
            eprintln!("{}", success_glyph());
        }
        Ok(())
    } else if ignored {
        Ok(())
    } else {
        if !silent {
            eprintln!("{}", failure_glyph());
        }
        Err(ErrorKind::CommandFailed {
            recipe: recipe.name.clone(),
            command: line.to_owned(),
            code: status.code(),
        })
    }
}

fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
    line: &str,
) -> Result<std::process::ExitStatus, ErrorKind> {
    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|e| ErrorKind::IOError {
            message: format!("couldn't poll `{}`: {}", line, e),
            fatal: true,
        })? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ErrorKind::Timeout {
                command: line.to_owned(),
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

// `@confirm`'s prompt: auto-yes always skips it, and so does dry-run, which instead echoes what
// would have been asked without touching stdin (spec §4.8 dry-run semantics).
fn confirm(message: &str, ctx: &RuntimeContext) -> Result<bool, ErrorKind> {
    if ctx.dry_run {
        eprintln!("{} Would prompt: {}", echo_prefix(ctx.dry_run), message);
        return Ok(true);
    }

    if ctx.auto_yes {
        return Ok(true);
    }

    info!("{}", message);
    eprint!("? {} [y/N] ", message.code_str());
    io::stderr().flush().ok();

    let mut line = String::new();
    io::stdin().read_line(&mut line).map_err(|e| ErrorKind::IOError {
        message: format!("couldn't read confirmation: {}", e),
        fatal: true,
    })?;

    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::{check_need, run_commands, run_recipe, RunState};
    use crate::{
        ast::{Command, DirectiveTag, Location, Need, Recipe, RecipeKind},
        context::RuntimeContext,
        hooks::HookRunner,
        index::JakefileIndex,
        parser::parse,
    };
    use std::sync::{atomic::AtomicBool, Arc};

    #[test]
    fn check_need_fails_for_missing_command() {
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), Location::new(1, 1));
        let need = Need {
            command: "definitely-not-a-real-command-xyz".to_owned(),
            hint: None,
            install_recipe: None,
        };
        assert!(check_need(&recipe, &need).is_err());
    }

    #[test]
    fn check_need_succeeds_for_sh() {
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), Location::new(1, 1));
        let need = Need {
            command: "sh".to_owned(),
            hint: None,
            install_recipe: None,
        };
        let _ = check_need(&recipe, &need);
    }

    #[test]
    fn cache_block_records_fingerprint_after_running() {
        let loc = Location::new(1, 1);
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), loc);
        let mut ctx = RuntimeContext::for_test();

        let cache_command = Command {
            text: String::new(),
            directive: Some(DirectiveTag::Cache {
                patterns: vec!["Cargo.toml".to_owned()],
            }),
            children: vec![Command::shell("echo building", loc)],
            silent: false,
            ignored: false,
            location: loc,
        };

        let running = Arc::new(AtomicBool::new(true));
        let mut state = RunState::new(&recipe, &ctx);
        let commands = vec![cache_command];
        assert!(run_commands(&commands, &recipe, &[], &[], &mut ctx, &running, &mut state).is_ok());

        let key = format!("{}@cache:{}:{}", recipe.name, loc.line, loc.column);
        assert!(ctx.cache.is_fresh(
            &key,
            &crate::cache::Cache::fingerprint(
                &key,
                &crate::glob::expand_all(&ctx.working_dir, &["Cargo.toml".to_owned()]),
                &[]
            )
        ));
    }

    #[test]
    fn cache_block_in_dry_run_does_not_record_a_fingerprint() {
        let loc = Location::new(1, 1);
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), loc);
        let mut ctx = RuntimeContext::for_test();
        ctx.dry_run = true; // dry-run never spawns, so it must never mark the block fresh either

        let cache_command = Command {
            text: String::new(),
            directive: Some(DirectiveTag::Cache {
                patterns: vec!["Cargo.toml".to_owned()],
            }),
            children: vec![Command::shell("echo building", loc)],
            silent: false,
            ignored: false,
            location: loc,
        };

        let running = Arc::new(AtomicBool::new(true));
        let mut state = RunState::new(&recipe, &ctx);
        let commands = vec![cache_command];
        assert!(run_commands(&commands, &recipe, &[], &[], &mut ctx, &running, &mut state).is_ok());

        let key = format!("{}@cache:{}:{}", recipe.name, loc.line, loc.column);
        assert!(!ctx.cache.is_fresh(
            &key,
            &crate::cache::Cache::fingerprint(
                &key,
                &crate::glob::expand_all(&ctx.working_dir, &["Cargo.toml".to_owned()]),
                &[]
            )
        ));
    }

    #[test]
    fn cache_block_with_no_patterns_always_executes() {
        let loc = Location::new(1, 1);
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), loc);
        let mut ctx = RuntimeContext::for_test();
        ctx.dry_run = true;

        let cache_command = Command {
            text: String::new(),
            directive: Some(DirectiveTag::Cache { patterns: vec![] }),
            children: vec![Command::shell("echo always runs", loc)],
            silent: false,
            ignored: false,
            location: loc,
        };

        let running = Arc::new(AtomicBool::new(true));
        let mut state = RunState::new(&recipe, &ctx);
        let commands = vec![cache_command];
        assert!(run_commands(&commands, &recipe, &[], &[], &mut ctx, &running, &mut state).is_ok());
    }

    #[test]
    fn timeout_directive_is_one_shot() {
        let loc = Location::new(1, 1);
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), loc);
        let ctx = RuntimeContext::for_test();
        let mut state = RunState::new(&recipe, &ctx);
        state.next_timeout = Some(5);
        assert_eq!(state.next_timeout.take(), Some(5));
        assert_eq!(state.next_timeout, None);
    }

    #[test]
    fn inline_ignore_directive_tolerates_only_the_next_command() {
        let loc = Location::new(1, 1);
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), loc);
        let mut ctx = RuntimeContext::for_test();
        let running = Arc::new(AtomicBool::new(true));
        let mut state = RunState::new(&recipe, &ctx);

        // `@ignore` then a failing command: the recipe should not fail.
        let commands = vec![
            Command {
                directive: Some(DirectiveTag::Ignore),
                ..Command::shell("", loc)
            },
            Command::shell("exit 1", loc),
        ];
        assert!(run_commands(&commands, &recipe, &[], &[], &mut ctx, &running, &mut state).is_ok());

        // The tolerance doesn't carry over to a second failing command.
        let mut state2 = RunState::new(&recipe, &ctx);
        let commands2 = vec![
            Command {
                directive: Some(DirectiveTag::Ignore),
                ..Command::shell("", loc)
            },
            Command::shell("exit 1", loc),
            Command::shell("exit 1", loc),
        ];
        assert!(run_commands(&commands2, &recipe, &[], &[], &mut ctx, &running, &mut state2).is_err());
    }

    #[test]
    fn each_directive_expands_glob_tokens() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();

        let loc = Location::new(1, 1);
        let recipe = Recipe::new(RecipeKind::Task, "build".to_owned(), loc);
        let mut ctx = RuntimeContext::for_test();
        ctx.working_dir = dir.path().to_path_buf();
        ctx.dry_run = true;
        let running = Arc::new(AtomicBool::new(true));
        let mut state = RunState::new(&recipe, &ctx);

        let each_command = Command {
            text: String::new(),
            directive: Some(DirectiveTag::Each {
                source: "*.txt".to_owned(),
            }),
            children: vec![Command::shell("echo {{item}}", loc)],
            silent: false,
            ignored: false,
            location: loc,
        };

        let items = super::resolve_each_items("*.txt", &ctx.working_dir);
        assert_eq!(items, vec!["a.txt".to_owned(), "b.txt".to_owned()]);

        let commands = vec![each_command];
        assert!(run_commands(&commands, &recipe, &[], &[], &mut ctx, &running, &mut state).is_ok());
    }

    #[test]
    fn post_and_on_error_hooks_both_run_when_the_recipe_fails() {
        let dir = tempfile::tempdir().unwrap();
        let post_marker = dir.path().join("post-ran");
        let error_marker = dir.path().join("error-ran");
        let source = format!(
            "@post touch {}\n@on_error build touch {}\ntask build:\n    false\n",
            post_marker.to_string_lossy(),
            error_marker.to_string_lossy()
        );

        let doc = parse(&source).unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        let recipe = index.get_recipe("build").unwrap();
        let hook_runner = HookRunner::new(&index);

        let mut ctx = RuntimeContext::for_test();
        ctx.working_dir = dir.path().to_path_buf();
        let running = Arc::new(AtomicBool::new(true));

        assert!(run_recipe(recipe, &[], &mut ctx, &hook_runner, &running).is_err());
        assert!(post_marker.exists());
        assert!(error_marker.exists());
    }
}
