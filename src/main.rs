#![deny(clippy::all, clippy::pedantic, warnings)]

mod ast;
mod cache;
mod condition;
mod context;
mod env;
mod expand;
mod failure;
mod glob;
mod hooks;
mod import;
mod index;
mod lexer;
mod parser;
mod runner;
mod schedule;
mod theme;
mod watch;

use {
    crate::{
        context::RuntimeContext,
        env::Config,
        failure::{system_error, user_error, ErrorKind, Failure},
        index::JakefileIndex,
        theme::{number, series, CodeStr},
    },
    atty::Stream,
    clap::{App, AppSettings, Arg},
    env_logger::{fmt::Color, Builder},
    log::{Level, LevelFilter},
    std::{
        env::{current_dir, var, var_os},
        fs,
        io::{stdout, Write},
        path::{Path, PathBuf},
        process::exit,
        str::FromStr,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
};

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

// The program version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

const JAKEFILE_DEFAULT_NAME: &str = "Jakefile";
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

const FILE_OPTION: &str = "file";
const LIST_OPTION: &str = "list";
const DRY_RUN_OPTION: &str = "dry-run";
const VERBOSE_OPTION: &str = "verbose";
const YES_OPTION: &str = "yes";
const WATCH_OPTION: &str = "watch";
const JOBS_OPTION: &str = "jobs";
const TARGET_OPTION: &str = "target";
const ARGS_OPTION: &str = "args";

fn set_up_logging() {
    Builder::new()
        .filter_module(
            module_path!(),
            LevelFilter::from_str(&var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()))
                .unwrap_or(DEFAULT_LOG_LEVEL),
        )
        .format(|buf, record| {
            let mut style = buf.style();
            style.set_bold(true);
            match record.level() {
                Level::Error => {
                    style.set_color(Color::Red);
                }
                Level::Warn => {
                    style.set_color(Color::Yellow);
                }
                Level::Info => {
                    style.set_color(Color::Green);
                }
                Level::Debug | Level::Trace => {
                    style.set_color(Color::Blue);
                }
            }

            writeln!(
                buf,
                "{} {}",
                style.value(format!("[{}]", record.level())),
                record.args()
            )
        })
        .init();
}

fn set_up_signal_handlers(running: Arc<AtomicBool>) -> Result<(), Failure> {
    ctrlc::set_handler(move || {
        if running.swap(false, Ordering::SeqCst) {
            drop(stdout().write(b"\n"));
        }
    })
    .map_err(system_error("Error installing signal handler."))
}

pub struct Settings {
    jakefile_path: PathBuf,
    list: bool,
    dry_run: bool,
    verbose: bool,
    auto_yes: bool,
    watch_mode: bool,
    jobs: Option<usize>,
    target: Option<String>,
    args: Vec<String>,
}

fn settings() -> Result<Settings, Failure> {
    let matches = App::new("Jake")
        .version(VERSION)
        .version_short("v")
        .author("Stephan Boyer <stephan@stephanboyer.com>")
        .about("Jake is a command runner and incremental build driver.")
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::NextLineHelp)
        .setting(AppSettings::UnifiedHelpMessage)
        .arg(
            Arg::with_name(FILE_OPTION)
                .value_name("PATH")
                .short("f")
                .long(FILE_OPTION)
                .help("Sets the path to the Jakefile"),
        )
        .arg(
            Arg::with_name(LIST_OPTION)
                .short("l")
                .long(LIST_OPTION)
                .help("Lists the available recipes"),
        )
        .arg(
            Arg::with_name(DRY_RUN_OPTION)
                .short("n")
                .long(DRY_RUN_OPTION)
                .help("Prints commands without executing them"),
        )
        .arg(
            Arg::with_name(VERBOSE_OPTION)
                .short("v")
                .long(VERBOSE_OPTION)
                .help("Enables verbose logging"),
        )
        .arg(
            Arg::with_name(YES_OPTION)
                .short("y")
                .long(YES_OPTION)
                .help("Automatically answers yes to `@confirm` prompts"),
        )
        .arg(
            Arg::with_name(WATCH_OPTION)
                .short("w")
                .long(WATCH_OPTION)
                .help("Re-runs the target recipe whenever its inputs change"),
        )
        .arg(
            Arg::with_name(JOBS_OPTION)
                .value_name("N")
                .short("j")
                .long(JOBS_OPTION)
                .help("Sets the number of parallel workers"),
        )
        .arg(
            Arg::with_name(TARGET_OPTION)
                .value_name("RECIPE")
                .help("Sets the recipe to run"),
        )
        .arg(
            Arg::with_name(ARGS_OPTION)
                .value_name("ARGS")
                .help("Positional arguments passed to the recipe")
                .multiple(true),
        )
        .get_matches();

    let jakefile_path = matches.value_of(FILE_OPTION).map_or_else(
        || {
            let mut candidate_dir =
                current_dir().map_err(system_error("Unable to determine working directory."))?;
            loop {
                let candidate_path = candidate_dir.join(JAKEFILE_DEFAULT_NAME);
                if let Ok(metadata) = fs::metadata(&candidate_path) {
                    if metadata.file_type().is_file() {
                        return Ok(candidate_path);
                    }
                }
                if !candidate_dir.pop() {
                    return Err(Failure::User(
                        format!("Unable to locate file {}.", JAKEFILE_DEFAULT_NAME.code_str()),
                        None,
                        3,
                    ));
                }
            }
        },
        |x| Ok(Path::new(x).to_owned()),
    )?;

    // `~/.config/jake/jake.conf` (SPEC_FULL.md §A.3) supplies defaults for the flags below; any
    // flag actually given on the command line always overrides it.
    let config = Config::load()?;

    let jobs = matches
        .value_of(JOBS_OPTION)
        .map(ToOwned::to_owned)
        .or_else(|| config.get(JOBS_OPTION).map(ToOwned::to_owned))
        .map(|s| {
            s.parse::<usize>()
                .map_err(user_error(&format!("{} is not a valid number.", s.code_str())))
        })
        .transpose()?;

    Ok(Settings {
        jakefile_path,
        list: matches.is_present(LIST_OPTION),
        dry_run: matches.is_present(DRY_RUN_OPTION) || config_flag(&config, DRY_RUN_OPTION),
        verbose: matches.is_present(VERBOSE_OPTION) || config_flag(&config, VERBOSE_OPTION),
        auto_yes: matches.is_present(YES_OPTION) || config_flag(&config, YES_OPTION),
        watch_mode: matches.is_present(WATCH_OPTION),
        jobs,
        target: matches.value_of(TARGET_OPTION).map(ToOwned::to_owned),
        args: matches
            .values_of(ARGS_OPTION)
            .map_or_else(Vec::new, |values| values.map(ToOwned::to_owned).collect()),
    })
}

// A `jake.conf` boolean default is anything but unset/empty/`false`/`0` (matching the `.env`-style
// grammar the config file shares with dotenv parsing).
fn config_flag(config: &Config, key: &str) -> bool {
    matches!(config.get(key), Some(v) if !v.is_empty() && v != "false" && v != "0")
}

fn load_index(jakefile_path: &Path) -> Result<JakefileIndex, Failure> {
    let doc = import::resolve(jakefile_path).map_err(|kind: ErrorKind| {
        Failure::User(
            format!("Unable to parse file {}: {}", jakefile_path.to_string_lossy().code_str(), kind),
            None,
            kind.exit_code(),
        )
    })?;
    JakefileIndex::build(doc).map_err(Failure::from)
}

fn list_recipes(index: &JakefileIndex) {
    info!("Here are the available recipes:");
    let mut recipes: Vec<_> = index.recipes().iter().filter(|r| r.description.is_some()).collect();
    recipes.sort_by(|a, b| a.name.cmp(&b.name));

    for recipe in recipes {
        println!(
            "* {} \u{2014} {}",
            recipe.name.as_str().code_str(),
            recipe.description.as_deref().unwrap_or(""),
        );
    }
}

fn entry() -> Result<(), Failure> {
    colored::control::set_override(theme::color_enabled());
    set_up_logging();

    let running = Arc::new(AtomicBool::new(true));
    let settings = settings()?;

    set_up_signal_handlers(running.clone())?;

    let index = load_index(&settings.jakefile_path)?;

    if settings.list {
        list_recipes(&index);
        return Ok(());
    }

    for variable in index.required_env() {
        if var_os(variable).is_none() {
            return Err(ErrorKind::MissingRequiredEnv {
                variable: variable.clone(),
            }
            .into());
        }
    }

    let target = settings
        .target
        .clone()
        .or_else(|| index.default_recipe().map(|r| r.name.clone()))
        .ok_or_else(|| {
            Failure::User("No recipe was given and there is no default recipe.".to_owned(), None, 3)
        })?;

    index.get_recipe_result(&target).map_err(Failure::from)?;

    let working_dir = settings
        .jakefile_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let cache = cache::Cache::load(&working_dir)?;
    let mut ctx = RuntimeContext::new(working_dir, cache);
    ctx.dry_run = settings.dry_run;
    ctx.verbose = settings.verbose;
    ctx.auto_yes = settings.auto_yes;
    if let Some(jobs) = settings.jobs {
        ctx.jobs = jobs;
    }

    for path in index.dotenv_paths() {
        ctx.environment
            .load_dotenv(&ctx.working_dir.join(path))
            .unwrap_or_else(|e| warn!("{}", e));
    }
    for assignment in index.exports() {
        ctx.environment.apply_export(assignment);
    }
    for (name, value) in index.variables_iter() {
        if !ctx.environment.contains(name) {
            ctx.environment.set(name, value);
        }
    }

    let roots = vec![target.clone()];
    let order = schedule::topological_order(&index, &roots).map_err(Failure::from)?;

    if !order.is_empty() {
        info!(
            "Ready to run {}: {}.",
            number(order.len(), "recipe"),
            series(
                &order
                    .iter()
                    .map(|name| name.code_str().to_string())
                    .collect::<Vec<_>>()
            ),
        );
    }

    let result = if settings.watch_mode {
        watch::watch(&index, &roots, &settings.args, &mut ctx, &running)
    } else if ctx.jobs > 1 {
        schedule::run_parallel(&index, &roots, &settings.args, &ctx, &running, ctx.jobs)
    } else {
        schedule::run_sequential(&index, &roots, &settings.args, &mut ctx, &running)
    };

    if !settings.dry_run {
        if let Err(e) = ctx.cache.persist() {
            warn!("{}", e);
        }
    }

    result.map_err(Failure::from)
}

fn main() {
    if let Err(e) = entry() {
        error!("{}", e);
        let code = e.exit_code();
        exit(code);
    }
}
