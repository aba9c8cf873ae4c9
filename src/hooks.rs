// Orders and exposes `@pre`/`@post`/`@before`/`@after`/`@on_error` hooks across global and
// recipe scope (spec §4.9), including import-namespace-aware targeting. Grounded on the teacher's
// ordering of setup/teardown steps around each scheduled job in `schedule.rs`.

use crate::{ast::Hook, index::JakefileIndex};

pub struct HookRunner<'a> {
    index: &'a JakefileIndex,
}

impl<'a> HookRunner<'a> {
    #[must_use]
    pub fn new(index: &'a JakefileIndex) -> Self {
        Self { index }
    }

    // Pre-hooks run untargeted `@pre` hooks first, then any `@before NAME` hooks specifically
    // targeting this recipe, regardless of the order they were declared in the source.
    #[must_use]
    pub fn pre_commands(&self, recipe_name: &str) -> Vec<String> {
        let mut untargeted: Vec<String> = Vec::new();
        let mut targeted: Vec<String> = Vec::new();

        for hook in self.index.pre_hooks_for(recipe_name) {
            if hook.target.is_some() {
                targeted.push(hook.command.clone());
            } else {
                untargeted.push(hook.command.clone());
            }
        }

        untargeted.extend(targeted);
        untargeted
    }

    // Post-hooks run in reverse of pre-hooks: targeted `@after NAME` first, then untargeted
    // `@post` hooks, mirroring a teardown stack.
    #[must_use]
    pub fn post_commands(&self, recipe_name: &str) -> Vec<String> {
        let mut targeted: Vec<String> = Vec::new();
        let mut untargeted: Vec<String> = Vec::new();

        for hook in self.index.post_hooks_for(recipe_name) {
            if hook.target.is_some() {
                targeted.push(hook.command.clone());
            } else {
                untargeted.push(hook.command.clone());
            }
        }

        targeted.extend(untargeted);
        targeted
    }

    #[must_use]
    pub fn on_error_commands(&self, recipe_name: &str) -> Vec<String> {
        self.index
            .on_error_hooks_for(recipe_name)
            .into_iter()
            .map(|h: &Hook| h.command.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::HookRunner;
    use crate::{index::JakefileIndex, parser::parse};

    #[test]
    fn untargeted_pre_hook_applies_to_every_recipe() {
        let doc = parse("@pre echo setup\ntask build:\n    echo hi\n").unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        let runner = HookRunner::new(&index);
        assert_eq!(runner.pre_commands("build"), vec!["echo setup".to_owned()]);
    }

    #[test]
    fn untargeted_pre_hook_runs_before_targeted_even_when_declared_after_it() {
        let doc = parse(
            "@before build echo preparing\n@pre echo setup\ntask build:\n    echo hi\n",
        )
        .unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        let runner = HookRunner::new(&index);
        assert_eq!(
            runner.pre_commands("build"),
            vec!["echo setup".to_owned(), "echo preparing".to_owned()]
        );
    }

    #[test]
    fn before_hook_targets_one_recipe() {
        let doc = parse(
            "@before build echo preparing build\ntask build:\n    echo hi\ntask test:\n    echo hi\n",
        )
        .unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        let runner = HookRunner::new(&index);
        assert_eq!(runner.pre_commands("build"), vec!["echo preparing build".to_owned()]);
        assert!(runner.pre_commands("test").is_empty());
    }

    #[test]
    fn on_error_hook_is_recipe_scoped() {
        let doc = parse(
            "@on_error build echo build failed\ntask build:\n    echo hi\n",
        )
        .unwrap();
        let index = JakefileIndex::build(doc).unwrap();
        let runner = HookRunner::new(&index);
        assert_eq!(runner.on_error_commands("build"), vec!["echo build failed".to_owned()]);
    }
}
