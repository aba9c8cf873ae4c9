// The Jakefile AST (data model, spec ast.rs). The document is built once by the parser and never
// mutated afterward; everything is addressed by index into the vectors below rather than by
// pointer, per the "arena + index vs. pointer graphs" design note.

use std::path::PathBuf;

// A source location, used for diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

// A recipe is one of three kinds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecipeKind {
    Task,
    File,
    Simple,
}

// A parameter declaration (`name` or `name="default"`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<String>,
}

// An external command requirement (`@needs`), with optional hint and install-recipe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Need {
    pub command: String,
    pub hint: Option<String>,
    pub install_recipe: Option<String>,
}

// The closed directive-tag enumeration (spec §3 table). Block directives (`if`/`each`/`cache`)
// carry their nested command list as `children`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DirectiveTag {
    Ignore,
    Cache { patterns: Vec<String> },
    Watch { patterns: Vec<String> },
    Cd { path: String },
    Shell { interpreter: String },
    Needs(Need),
    Confirm { message: String },
    Each { source: String },
    If { condition: String },
    Elif { condition: String },
    Else,
    End,
    Require { variables: Vec<String> },
    Export { assignment: String },
    Launch { target: String },
    Timeout { seconds: u64 },
    Pre,
    Post,
}

// A single line in a recipe body: either a plain shell command or a directive. Block directives
// own their nested lines in `children`; everything else leaves `children` empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    pub text: String,
    pub directive: Option<DirectiveTag>,
    pub children: Vec<Command>,
    pub silent: bool,  // preceded by `@`
    pub ignored: bool, // preceded by `-`
    pub location: Location,
}

impl Command {
    #[must_use]
    pub fn shell(text: impl Into<String>, location: Location) -> Self {
        Self {
            text: text.into(),
            directive: None,
            children: Vec::new(),
            silent: false,
            ignored: false,
            location,
        }
    }
}

// The importing origin of a recipe merged in from another Jakefile, if any.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Origin {
    pub namespace: Option<String>,
    pub original_name: String,
}

// A recipe: a task (always runs), a file target (stale-only), or a keyword-less simple task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Recipe {
    pub kind: RecipeKind,
    pub name: String,
    pub output: Option<PathBuf>,
    pub dependencies: Vec<String>,
    pub file_deps: Vec<String>,
    pub params: Vec<Param>,
    pub commands: Vec<Command>,
    pub aliases: Vec<String>,
    pub pre_hooks: Vec<String>,
    pub post_hooks: Vec<String>,
    pub group: Option<String>,
    pub description: Option<String>,
    pub doc_comment: Option<String>,
    pub shell: Option<String>,
    pub working_dir: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub only_os: Vec<String>,
    pub needs: Vec<Need>,
    pub is_default: bool,
    pub quiet: bool,
    pub origin: Option<Origin>,
    pub location: Location,
}

impl Recipe {
    #[must_use]
    pub fn new(kind: RecipeKind, name: String, location: Location) -> Self {
        Self {
            kind,
            name,
            output: None,
            dependencies: Vec::new(),
            file_deps: Vec::new(),
            params: Vec::new(),
            commands: Vec::new(),
            aliases: Vec::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            group: None,
            description: None,
            doc_comment: None,
            shell: None,
            working_dir: None,
            timeout_seconds: None,
            only_os: Vec::new(),
            needs: Vec::new(),
            is_default: false,
            quiet: false,
            origin: None,
            location,
        }
    }
}

// A global directive that isn't recipe-metadata (`@import`, `@dotenv`, `@require`, `@export`,
// `@default`, `@pre`, `@post`, `@before NAME`, `@after NAME`, `@on_error [NAME]`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GlobalDirective {
    Import { path: String, namespace: Option<String> },
    Dotenv { path: String },
    Require { variables: Vec<String> },
    Export { assignment: String },
    Default { name: String },
}

// A hook line targeted at a recipe name, or untargeted (applies to every recipe).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hook {
    pub target: Option<String>,
    pub command: String,
    pub location: Location,
}

// A variable assignment (`NAME = value`) from the Jakefile top level.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

// An `@import` directive, recorded separately from `GlobalDirective` so the import resolver can
// walk them without re-scanning every directive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Import {
    pub path: String,
    pub namespace: Option<String>,
    pub location: Location,
}

// The top-level Jakefile document. Immutable after parsing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Jakefile {
    pub variables: Vec<Variable>,
    pub recipes: Vec<Recipe>,
    pub directives: Vec<GlobalDirective>,
    pub imports: Vec<Import>,
    pub pre_hooks: Vec<Hook>,
    pub post_hooks: Vec<Hook>,
    pub on_error_hooks: Vec<Hook>,
}

impl Jakefile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
