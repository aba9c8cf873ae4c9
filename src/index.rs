// Builds an O(1) lookup structure over a parsed `Jakefile` (spec §4.3): recipes by name or alias,
// variables by name, directives grouped by kind, and the resolved default recipe.

use crate::{
    ast::{GlobalDirective, Hook, Jakefile, Recipe},
    failure::ErrorKind,
};
use std::collections::HashMap;

pub struct JakefileIndex {
    recipes: Vec<Recipe>,
    name_to_index: HashMap<String, usize>,
    output_to_name: HashMap<String, String>,
    variables: HashMap<String, String>,
    imports: Vec<crate::ast::Import>,
    dotenv_paths: Vec<String>,
    required_env: Vec<String>,
    exports: Vec<String>,
    default_name: Option<String>,
    pre_hooks: Vec<Hook>,
    post_hooks: Vec<Hook>,
    on_error_hooks: Vec<Hook>,
}

impl JakefileIndex {
    pub fn build(doc: Jakefile) -> Result<Self, ErrorKind> {
        let mut name_to_index = HashMap::new();
        let mut variables = HashMap::new();
        let mut dotenv_paths = Vec::new();
        let mut required_env = Vec::new();
        let mut exports = Vec::new();
        let mut default_name = None;

        for variable in &doc.variables {
            variables.insert(variable.name.clone(), variable.value.clone());
        }

        for directive in &doc.directives {
            match directive {
                GlobalDirective::Dotenv { path } => dotenv_paths.push(path.clone()),
                GlobalDirective::Require { variables } => required_env.extend(variables.clone()),
                GlobalDirective::Export { assignment } => exports.push(assignment.clone()),
                GlobalDirective::Default { name } => default_name = Some(name.clone()),
                GlobalDirective::Import { .. } => {}
            }
        }

        let mut output_to_name = HashMap::new();
        let mut recipes = doc.recipes;
        for (i, recipe) in recipes.iter().enumerate() {
            insert_unique(&mut name_to_index, &recipe.name, i)?;
            for alias in &recipe.aliases {
                insert_unique(&mut name_to_index, alias, i)?;
            }
            if let Some(output) = &recipe.output {
                output_to_name.insert(output.to_string_lossy().into_owned(), recipe.name.clone());
            }
            if recipe.is_default {
                default_name = Some(recipe.name.clone());
            }
        }

        // A recipe literally named `default` wins over an explicit `@default` directive only if
        // no directive was given; an explicit directive always takes precedence.
        if default_name.is_none() {
            if let Some(first) = recipes.first() {
                default_name = Some(first.name.clone());
            }
        }

        // Stamp `is_default` onto whichever recipe the directive (or the source-order fallback)
        // resolved to, so `Recipe::is_default` reflects the real answer for any caller that reads
        // it directly off a `Recipe` rather than going through `default_recipe()`.
        if let Some(name) = &default_name {
            if let Some(&i) = name_to_index.get(name) {
                recipes[i].is_default = true;
            }
        }

        Ok(Self {
            recipes,
            name_to_index,
            output_to_name,
            variables,
            imports: doc.imports,
            dotenv_paths,
            required_env,
            exports,
            default_name,
            pre_hooks: doc.pre_hooks,
            post_hooks: doc.post_hooks,
            on_error_hooks: doc.on_error_hooks,
        })
    }

    #[must_use]
    pub fn get_recipe(&self, name: &str) -> Option<&Recipe> {
        self.name_to_index.get(name).map(|&i| &self.recipes[i])
    }

    pub fn get_recipe_result(&self, name: &str) -> Result<&Recipe, ErrorKind> {
        self.get_recipe(name).ok_or_else(|| ErrorKind::RecipeNotFound {
            name: name.to_owned(),
            suggestion: self.suggest(name),
        })
    }

    // Resolves a `file_deps` entry that happens to equal another `file` recipe's declared
    // `output` to that recipe's name, so the scheduler can add a dependency edge for it
    // (spec §4.9 graph construction).
    #[must_use]
    pub fn recipe_producing(&self, path: &str) -> Option<&str> {
        self.output_to_name.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn variables_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn default_recipe(&self) -> Option<&Recipe> {
        self.default_name.as_deref().and_then(|name| self.get_recipe(name))
    }

    #[must_use]
    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    #[must_use]
    pub fn imports(&self) -> &[crate::ast::Import] {
        &self.imports
    }

    #[must_use]
    pub fn dotenv_paths(&self) -> &[String] {
        &self.dotenv_paths
    }

    #[must_use]
    pub fn required_env(&self) -> &[String] {
        &self.required_env
    }

    #[must_use]
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    #[must_use]
    pub fn pre_hooks_for(&self, recipe: &str) -> Vec<&Hook> {
        self.pre_hooks
            .iter()
            .filter(|h| h.target.as_deref().map_or(true, |t| t == recipe))
            .collect()
    }

    #[must_use]
    pub fn post_hooks_for(&self, recipe: &str) -> Vec<&Hook> {
        self.post_hooks
            .iter()
            .filter(|h| h.target.as_deref().map_or(true, |t| t == recipe))
            .collect()
    }

    #[must_use]
    pub fn on_error_hooks_for(&self, recipe: &str) -> Vec<&Hook> {
        self.on_error_hooks
            .iter()
            .filter(|h| h.target.as_deref().map_or(true, |t| t == recipe))
            .collect()
    }

    // A cheap Levenshtein-free suggestion: the shortest-edit-distance name among known recipes,
    // used for the `did you mean` hint on `RecipeNotFound`.
    fn suggest(&self, name: &str) -> Option<String> {
        self.name_to_index
            .keys()
            .min_by_key(|candidate| edit_distance(name, candidate))
            .filter(|candidate| edit_distance(name, candidate) <= 3)
            .cloned()
    }
}

fn insert_unique(map: &mut HashMap<String, usize>, name: &str, index: usize) -> Result<(), ErrorKind> {
    if map.contains_key(name) {
        return Err(ErrorKind::ParseError {
            line: 0,
            column: 0,
            message: format!("duplicate recipe name or alias `{}`", name),
        });
    }
    map.insert(name.to_owned(), index);
    Ok(())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + row[j].min(row[j - 1]).min(prev_diag)
            };
            prev_diag = temp;
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::JakefileIndex;
    use crate::parser::parse;

    #[test]
    fn build_looks_up_recipe_by_name() {
        let doc = parse("task build:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        assert!(index.get_recipe("build").is_some());
    }

    #[test]
    fn build_looks_up_recipe_by_alias() {
        let doc = parse("@alias b\ntask build:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        assert!(index.get_recipe("b").is_some());
    }

    #[test]
    fn build_detects_duplicate_names() {
        let doc = parse("task build:\n    echo one\ntask build:\n    echo two\n").unwrap();
        assert!(JakefileIndex::build(doc).is_err());
    }

    #[test]
    fn default_recipe_falls_back_to_first() {
        let doc = parse("task build:\n    echo hi\ntask test:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        assert_eq!(index.default_recipe().unwrap().name, "build");
    }

    #[test]
    fn default_directive_overrides_first_recipe() {
        let doc = parse("@default test\ntask build:\n    echo hi\ntask test:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        assert_eq!(index.default_recipe().unwrap().name, "test");
    }

    #[test]
    fn default_directive_stamps_is_default_on_the_resolved_recipe() {
        let doc = parse("@default test\ntask build:\n    echo hi\ntask test:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        assert!(index.get_recipe("test").unwrap().is_default);
        assert!(!index.get_recipe("build").unwrap().is_default);
    }

    #[test]
    fn recipe_producing_resolves_file_output_to_recipe_name() {
        let doc = parse("file out.txt: in.txt\n    cp in.txt out.txt\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        assert_eq!(index.recipe_producing("out.txt"), Some("out.txt"));
        assert_eq!(index.recipe_producing("missing.txt"), None);
    }

    #[test]
    fn recipe_not_found_suggests_close_name() {
        let doc = parse("task build:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        let err = index.get_recipe_result("biuld").unwrap_err();
        match err {
            crate::failure::ErrorKind::RecipeNotFound { suggestion, .. } => {
                assert_eq!(suggestion, Some("build".to_owned()));
            }
            _ => panic!("expected RecipeNotFound"),
        }
    }
}
