// Resolves `@import "path" [as ns]` directives (spec §4.10): parses the imported file, prefixes
// its recipe names/aliases/dependencies with the given namespace, and merges it into the
// importing document. Cycle detection uses the same white/gray/black DFS coloring as the
// dependency-graph scheduler, applied here to the import graph instead.

use crate::{
    ast::{Jakefile, Origin, Recipe},
    failure::ErrorKind,
    parser,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

pub fn resolve(root_path: &Path) -> Result<Jakefile, ErrorKind> {
    let mut colors: HashMap<PathBuf, Color> = HashMap::new();
    let mut chain: Vec<String> = Vec::new();
    let mut merged = Jakefile::new();

    visit(root_path, &mut colors, &mut chain, &mut merged, None)?;
    Ok(merged)
}

fn visit(
    path: &Path,
    colors: &mut HashMap<PathBuf, Color>,
    chain: &mut Vec<String>,
    merged: &mut Jakefile,
    namespace: Option<&str>,
) -> Result<(), ErrorKind> {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    match colors.get(&canonical) {
        Some(Color::Gray) => {
            chain.push(path.display().to_string());
            return Err(ErrorKind::ImportError {
                chain: chain.clone(),
                message: "cyclic import".to_owned(),
            });
        }
        Some(Color::Black) => return Ok(()),
        _ => {}
    }

    colors.insert(canonical.clone(), Color::Gray);
    chain.push(path.display().to_string());

    let contents = fs::read_to_string(path).map_err(|e| ErrorKind::ImportError {
        chain: chain.clone(),
        message: format!("couldn't read `{}`: {}", path.display(), e),
    })?;

    let doc = parser::parse(&contents).map_err(|e| ErrorKind::ImportError {
        chain: chain.clone(),
        message: e.to_string(),
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    for import in &doc.imports {
        let import_path = base_dir.join(&import.path);
        let child_namespace = combine_namespace(namespace, import.namespace.as_deref());
        visit(&import_path, colors, chain, merged, child_namespace.as_deref())?;
    }

    for recipe in doc.recipes {
        merged.recipes.push(apply_namespace(recipe, namespace));
    }
    merged.variables.extend(doc.variables);
    merged.directives.extend(doc.directives);
    // A hook's `target` names a recipe, which was just renamed by `apply_namespace` above (if
    // namespaced) — rewrite the target the same way so `@before`/`@after`/`@on_error NAME` keep
    // pointing at the right recipe. An untargeted (global) hook has no name to rewrite and stays
    // global, per spec (imported `@post` with no namespace still fires for everything).
    merged.pre_hooks.extend(doc.pre_hooks.into_iter().map(|h| namespace_hook(h, namespace)));
    merged.post_hooks.extend(doc.post_hooks.into_iter().map(|h| namespace_hook(h, namespace)));
    merged
        .on_error_hooks
        .extend(doc.on_error_hooks.into_iter().map(|h| namespace_hook(h, namespace)));

    colors.insert(canonical, Color::Black);
    chain.pop();
    Ok(())
}

fn combine_namespace(outer: Option<&str>, inner: Option<&str>) -> Option<String> {
    match (outer, inner) {
        (Some(o), Some(i)) => Some(format!("{}.{}", o, i)),
        (Some(o), None) => Some(o.to_owned()),
        (None, Some(i)) => Some(i.to_owned()),
        (None, None) => None,
    }
}

fn namespace_hook(mut hook: crate::ast::Hook, namespace: Option<&str>) -> crate::ast::Hook {
    if let (Some(ns), Some(target)) = (namespace, &hook.target) {
        hook.target = Some(format!("{}.{}", ns, target));
    }
    hook
}

fn apply_namespace(mut recipe: Recipe, namespace: Option<&str>) -> Recipe {
    let Some(ns) = namespace else {
        return recipe;
    };

    let original_name = recipe.name.clone();
    recipe.name = format!("{}.{}", ns, recipe.name);
    recipe.aliases = recipe.aliases.iter().map(|a| format!("{}.{}", ns, a)).collect();
    recipe.dependencies = recipe
        .dependencies
        .iter()
        .map(|d| format!("{}.{}", ns, d))
        .collect();
    recipe.origin = Some(Origin {
        namespace: Some(ns.to_owned()),
        original_name,
    });
    recipe
}

#[cfg(test)]
mod tests {
    use super::{combine_namespace, resolve};
    use std::fs;

    #[test]
    fn combine_namespace_nests_dotted() {
        assert_eq!(
            combine_namespace(Some("outer"), Some("inner")),
            Some("outer.inner".to_owned())
        );
    }

    #[test]
    fn combine_namespace_passes_through_single() {
        assert_eq!(combine_namespace(None, Some("ns")), Some("ns".to_owned()));
        assert_eq!(combine_namespace(Some("ns"), None), Some("ns".to_owned()));
    }

    #[test]
    fn resolve_prefixes_recipe_names_and_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lib.jake"),
            "task build: test\n    echo building\ntask test:\n    echo testing\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Jakefile"),
            "@import \"lib.jake\" as lib\ntask all: lib.build\n    echo all\n",
        )
        .unwrap();

        let doc = resolve(&dir.path().join("Jakefile")).unwrap();
        let build = doc.recipes.iter().find(|r| r.name == "lib.build").unwrap();
        assert_eq!(build.dependencies, vec!["lib.test".to_owned()]);
        assert_eq!(build.origin.as_ref().unwrap().original_name, "build");
    }

    #[test]
    fn resolve_namespaces_targeted_hooks_but_not_global_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lib.jake"),
            "@before build echo preparing\n@post echo done\ntask build:\n    echo building\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Jakefile"),
            "@import \"lib.jake\" as lib\ntask all: lib.build\n    echo all\n",
        )
        .unwrap();

        let doc = resolve(&dir.path().join("Jakefile")).unwrap();
        assert_eq!(doc.pre_hooks[0].target.as_deref(), Some("lib.build"));
        assert_eq!(doc.post_hooks[0].target, None);
    }

    #[test]
    fn resolve_detects_cyclic_imports() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jake"), "@import \"b.jake\"\ntask a:\n    echo a\n").unwrap();
        fs::write(dir.path().join("b.jake"), "@import \"a.jake\"\ntask b:\n    echo b\n").unwrap();

        assert!(resolve(&dir.path().join("a.jake")).is_err());
    }
}
