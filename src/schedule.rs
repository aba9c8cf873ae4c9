// Builds the dependency graph over a set of target recipes and schedules them (spec §4.7): a
// sequential DFS post-order traversal, or a parallel OS-thread worker pool sharing the same graph.
// The DFS walk and reversal are grounded on the teacher's own `compute` in the original
// `schedule.rs`, generalized from a flat dependency list to separately tracking in-degree and
// dependents for the parallel scheduler.

use crate::{
    context::RuntimeContext,
    failure::ErrorKind,
    hooks::HookRunner,
    index::JakefileIndex,
    runner::run_recipe,
    theme::CodeStr,
};
use crossbeam::channel;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

// Topologically sorts the transitive closure of `roots` over the recipe dependency graph. Input
// order doesn't affect the result; ties are broken lexicographically. Detects cycles via
// white/gray/black DFS coloring, mirroring the import-graph cycle detector.
pub fn topological_order(index: &JakefileIndex, roots: &[String]) -> Result<Vec<String>, ErrorKind> {
    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut order = Vec::new();

    let mut sorted_roots = roots.to_vec();
    sorted_roots.sort();

    for root in sorted_roots {
        visit(index, &root, &mut colors, &mut order)?;
    }

    Ok(order)
}

fn visit(
    index: &JakefileIndex,
    name: &str,
    colors: &mut HashMap<String, Color>,
    order: &mut Vec<String>,
) -> Result<(), ErrorKind> {
    match colors.get(name) {
        Some(Color::Black) => return Ok(()),
        Some(Color::Gray) => {
            return Err(ErrorKind::CyclicDependency {
                recipe: name.to_owned(),
            });
        }
        _ => {}
    }

    colors.insert(name.to_owned(), Color::Gray);

    let recipe = index.get_recipe_result(name)?;
    let mut dependencies = recipe.dependencies.clone();

    // File recipes additionally depend on whichever other file recipe produces each of their
    // `file_deps` paths, so that producer builds before consumer (spec §4.9 graph construction).
    if matches!(recipe.kind, crate::ast::RecipeKind::File) {
        for file_dep in &recipe.file_deps {
            if let Some(producer) = index.recipe_producing(file_dep) {
                if producer != name {
                    dependencies.push(producer.to_owned());
                }
            }
        }
    }

    dependencies.sort();
    dependencies.dedup();

    for dependency in &dependencies {
        visit(index, dependency, colors, order)?;
    }

    colors.insert(name.to_owned(), Color::Black);
    order.push(name.to_owned());
    Ok(())
}

// Runs every recipe in `roots` (and their transitive dependencies) one at a time, in topological
// order.
pub fn run_sequential(
    index: &JakefileIndex,
    roots: &[String],
    positional: &[String],
    ctx: &mut RuntimeContext,
    running: &Arc<AtomicBool>,
) -> Result<(), ErrorKind> {
    let order = topological_order(index, roots)?;
    let hooks = HookRunner::new(index);

    for name in order {
        if !running.load(Ordering::SeqCst) {
            return Err(ErrorKind::IOError {
                message: "interrupted".to_owned(),
                fatal: true,
            });
        }

        let recipe = index.get_recipe_result(&name)?;
        log::info!("Running recipe {}...", name.as_str().code_str());
        run_recipe(recipe, positional, ctx, &hooks, running)?;
    }

    Ok(())
}

struct GraphNode {
    in_degree: usize,
    dependents: Vec<String>,
}

// Runs every recipe in `roots` (and their transitive dependencies) using a fixed-size worker pool
// of OS threads. Recipes become eligible to run once their in-degree drops to zero; a ready queue
// and a condvar-backed mutex coordinate workers pulling the next eligible recipe. Grounded on the
// teacher's choice to use `crossbeam` channels for cross-thread coordination rather than async.
pub fn run_parallel(
    index: &JakefileIndex,
    roots: &[String],
    positional: &[String],
    ctx: &RuntimeContext,
    running: &Arc<AtomicBool>,
    jobs: usize,
) -> Result<(), ErrorKind> {
    let order = topological_order(index, roots)?;
    let mut graph: HashMap<String, GraphNode> = HashMap::new();

    for name in &order {
        graph.entry(name.clone()).or_insert_with(|| GraphNode {
            in_degree: 0,
            dependents: Vec::new(),
        });
    }

    for name in &order {
        let recipe = index.get_recipe_result(name)?;
        let mut dependencies = recipe.dependencies.clone();

        // Mirror `visit()`'s file-producer edges (spec §4.9 graph construction) so a file recipe
        // can't start in parallel mode before whichever other file recipe produces one of its
        // `file_deps` has finished.
        if matches!(recipe.kind, crate::ast::RecipeKind::File) {
            for file_dep in &recipe.file_deps {
                if let Some(producer) = index.recipe_producing(file_dep) {
                    if producer != name {
                        dependencies.push(producer.to_owned());
                    }
                }
            }
        }

        dependencies.sort();
        dependencies.dedup();

        for dependency in &dependencies {
            graph.entry(dependency.clone()).or_insert_with(|| GraphNode {
                in_degree: 0,
                dependents: Vec::new(),
            });
            graph.get_mut(dependency).unwrap().dependents.push(name.clone());
            graph.get_mut(name).unwrap().in_degree += 1;
        }
    }

    let ready: Vec<String> = graph
        .iter()
        .filter(|(_, node)| node.in_degree == 0)
        .map(|(name, _)| name.clone())
        .collect();

    let graph = Arc::new(Mutex::new(graph));
    let completed = Arc::new(Mutex::new(HashSet::<String>::new()));
    let failure: Arc<Mutex<Option<ErrorKind>>> = Arc::new(Mutex::new(None));

    let (sender, receiver) = channel::unbounded::<String>();
    for name in ready {
        sender.send(name).ok();
    }

    let remaining = Arc::new(Mutex::new(order.len()));

    std::thread::scope(|scope| {
        for _ in 0..jobs.max(1) {
            let receiver = receiver.clone();
            let sender = sender.clone();
            let graph = Arc::clone(&graph);
            let completed = Arc::clone(&completed);
            let failure = Arc::clone(&failure);
            let remaining = Arc::clone(&remaining);
            let running = Arc::clone(running);

            scope.spawn(move || {
                let hooks = HookRunner::new(index);

                while let Ok(name) = receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                    if !running.load(Ordering::SeqCst) || failure.lock().unwrap().is_some() {
                        break;
                    }

                    log::info!("Running recipe {}...", name.as_str().code_str());

                    let outcome = {
                        let mut local_ctx = RuntimeContext {
                            environment: ctx.environment.clone(),
                            // `Cache` clones share the same underlying entries (spec §5: the
                            // runtime cache is synchronized for the parallel worker path), so a
                            // fingerprint recorded by one worker is visible to, and persisted
                            // alongside, every other worker's.
                            cache: ctx.cache.clone(),
                            working_dir: ctx.working_dir.clone(),
                            dry_run: ctx.dry_run,
                            verbose: ctx.verbose,
                            auto_yes: ctx.auto_yes,
                            watch_mode: ctx.watch_mode,
                            jobs: ctx.jobs,
                        };
                        let recipe = match index.get_recipe_result(&name) {
                            Ok(r) => r,
                            Err(e) => {
                                *failure.lock().unwrap() = Some(e);
                                break;
                            }
                        };
                        run_recipe(recipe, positional, &mut local_ctx, &hooks, &running)
                    };

                    if let Err(e) = outcome {
                        *failure.lock().unwrap() = Some(e);
                        break;
                    }

                    completed.lock().unwrap().insert(name.clone());
                    *remaining.lock().unwrap() -= 1;

                    let mut graph_guard = graph.lock().unwrap();
                    if let Some(node) = graph_guard.remove(&name) {
                        for dependent in node.dependents {
                            if let Some(dep_node) = graph_guard.get_mut(&dependent) {
                                dep_node.in_degree -= 1;
                                if dep_node.in_degree == 0 {
                                    sender.send(dependent).ok();
                                }
                            }
                        }
                    }
                    drop(graph_guard);

                    if *remaining.lock().unwrap() == 0 {
                        break;
                    }
                }
            });
        }
    });

    let failure = Arc::try_unwrap(failure).ok().and_then(|m| m.into_inner().ok()).flatten();
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
