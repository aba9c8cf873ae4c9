// The Jakefile parser (spec §4.2). Recursive descent, single pass, built on top of the token
// stream from `lexer`. Structural tokens (keywords, symbols, identifiers) drive the grammar;
// free-form text (assignment values, directive arguments, shell command lines) is recovered from
// the original source by line, since the lexer does not attempt to tokenize shell syntax.

use crate::{
    ast::{
        Command, DirectiveTag, GlobalDirective, Hook, Import, Jakefile, Location, Need, Param,
        Recipe, RecipeKind,
    },
    failure::ErrorKind,
    lexer::{self, Token, TokenKind},
};

pub fn parse(source: &str) -> Result<Jakefile, ErrorKind> {
    let tokens = lexer::lex(source).map_err(|e| ErrorKind::ParseError {
        line: e.location.line,
        column: e.location.column,
        message: e.message,
    })?;

    let lines: Vec<&str> = source.lines().collect();
    let mut parser = Parser {
        tokens,
        pos: 0,
        lines,
        doc_comment: None,
        last_comment_line: None,
        just_saw_comment: false,
        pending: PendingMetadata::default(),
    };

    parser.parse_document()
}

#[derive(Default)]
struct PendingMetadata {
    group: Option<String>,
    description: Option<String>,
    aliases: Vec<String>,
    quiet: bool,
    only_os: Vec<String>,
    needs: Vec<Need>,
    timeout_seconds: Option<u64>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lines: Vec<&'a str>,
    doc_comment: Option<String>,
    last_comment_line: Option<usize>,
    just_saw_comment: bool,
    pending: PendingMetadata,
}

impl<'a> Parser<'a> {
    fn parse_document(&mut self) -> Result<Jakefile, ErrorKind> {
        let mut doc = Jakefile::new();

        loop {
            self.skip_blank_lines();

            match &self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Comment(text) => {
                    self.accumulate_doc_comment(text.clone());
                    self.advance();
                    self.just_saw_comment = true;
                }
                TokenKind::Symbol('@') => {
                    self.parse_top_level_directive(&mut doc)?;
                }
                TokenKind::Keyword(kw) if kw == "task" || kw == "file" => {
                    let recipe = self.parse_recipe()?;
                    doc.recipes.push(recipe);
                }
                TokenKind::Identifier(_) => {
                    if self.is_assignment_ahead() {
                        let variable = self.parse_variable()?;
                        doc.variables.push(variable);
                    } else {
                        let recipe = self.parse_recipe()?;
                        doc.recipes.push(recipe);
                    }
                }
                other => {
                    return Err(self.error(&format!("unexpected token {:?}", other)));
                }
            }
        }

        Ok(doc)
    }

    // Recipe-metadata directives attach only to the very next recipe; everything else resets the
    // accumulator once consumed by a recipe header.
    fn parse_top_level_directive(&mut self, doc: &mut Jakefile) -> Result<(), ErrorKind> {
        let at_location = self.peek().location;
        self.advance(); // '@'

        let name = match &self.peek().kind {
            TokenKind::Keyword(k) => k.clone(),
            TokenKind::Identifier(i) => i.clone(),
            other => return Err(self.error(&format!("expected directive name, found {:?}", other))),
        };
        self.advance();

        match name.as_str() {
            "import" => {
                let path = self.rest_of_line_string()?;
                let namespace = if self.eat_keyword_word("as") {
                    Some(self.expect_identifier_or_word()?)
                } else {
                    None
                };
                self.expect_newline()?;
                doc.imports.push(Import {
                    path: path.clone(),
                    namespace: namespace.clone(),
                    location: at_location,
                });
                doc.directives.push(GlobalDirective::Import { path, namespace });
            }
            "dotenv" => {
                let path = self.rest_of_line_string()?;
                self.expect_newline()?;
                doc.directives.push(GlobalDirective::Dotenv { path });
            }
            "require" => {
                let variables = self.rest_of_line_words()?;
                self.expect_newline()?;
                doc.directives.push(GlobalDirective::Require { variables });
            }
            "export" => {
                let assignment = self.rest_of_line_raw()?;
                self.expect_newline()?;
                doc.directives.push(GlobalDirective::Export { assignment });
            }
            "default" => {
                let target = self.expect_identifier_or_word()?;
                self.expect_newline()?;
                doc.directives.push(GlobalDirective::Default { name: target });
            }
            "pre" => {
                let command = self.rest_of_line_raw()?;
                self.expect_newline()?;
                doc.pre_hooks.push(Hook {
                    target: None,
                    command,
                    location: at_location,
                });
            }
            "post" => {
                let command = self.rest_of_line_raw()?;
                self.expect_newline()?;
                doc.post_hooks.push(Hook {
                    target: None,
                    command,
                    location: at_location,
                });
            }
            "before" => {
                let target = self.expect_identifier_or_word()?;
                let command = self.rest_of_line_raw()?;
                self.expect_newline()?;
                doc.pre_hooks.push(Hook {
                    target: Some(target),
                    command,
                    location: at_location,
                });
            }
            "after" => {
                let target = self.expect_identifier_or_word()?;
                let command = self.rest_of_line_raw()?;
                self.expect_newline()?;
                doc.post_hooks.push(Hook {
                    target: Some(target),
                    command,
                    location: at_location,
                });
            }
            "on_error" => {
                let target = if self.at_end_of_line() {
                    None
                } else {
                    Some(self.expect_identifier_or_word()?)
                };
                let command = if self.at_end_of_line() {
                    String::new()
                } else {
                    self.rest_of_line_raw()?
                };
                self.expect_newline()?;
                doc.on_error_hooks.push(Hook {
                    target,
                    command,
                    location: at_location,
                });
            }
            "group" => {
                self.pending.group = Some(self.rest_of_line_string()?);
                self.expect_newline()?;
            }
            "desc" | "description" => {
                self.pending.description = Some(self.rest_of_line_string()?);
                self.expect_newline()?;
            }
            "alias" => {
                self.pending.aliases.extend(self.rest_of_line_words()?);
                self.expect_newline()?;
            }
            "quiet" => {
                self.pending.quiet = true;
                self.expect_newline()?;
            }
            "only" | "only-os" | "platform" => {
                self.pending.only_os.extend(self.rest_of_line_words()?);
                self.expect_newline()?;
            }
            "needs" => {
                let need = self.parse_needs_arguments()?;
                self.expect_newline()?;
                self.pending.needs.push(need);
            }
            "timeout" => {
                let seconds = self.rest_of_line_string()?.trim().parse::<u64>().unwrap_or(0);
                self.expect_newline()?;
                self.pending.timeout_seconds = Some(seconds);
            }
            other => {
                return Err(self.error(&format!("unknown directive '@{}'", other)));
            }
        }

        Ok(())
    }

    fn parse_needs_arguments(&mut self) -> Result<Need, ErrorKind> {
        let words = self.rest_of_line_words()?;
        let mut iter = words.into_iter();
        let command = iter.next().unwrap_or_default();
        let hint = iter.next();
        let install_recipe = iter.next();
        Ok(Need {
            command,
            hint,
            install_recipe,
        })
    }

    fn parse_variable(&mut self) -> Result<crate::ast::Variable, ErrorKind> {
        let name = self.expect_identifier_or_word()?;
        self.expect_symbol('=')?;
        let value = self.rest_of_line_string()?;
        self.expect_newline()?;
        Ok(crate::ast::Variable { name, value })
    }

    fn parse_recipe(&mut self) -> Result<Recipe, ErrorKind> {
        let location = self.peek().location;

        let kind = match &self.peek().kind {
            TokenKind::Keyword(k) if k == "task" => {
                self.advance();
                RecipeKind::Task
            }
            TokenKind::Keyword(k) if k == "file" => {
                self.advance();
                RecipeKind::File
            }
            _ => RecipeKind::Simple,
        };

        let name = match &self.peek().kind {
            TokenKind::Identifier(n) | TokenKind::Keyword(n) => n.clone(),
            TokenKind::Glob(n) => n.clone(),
            other => {
                return Err(self.error(&format!("expected recipe name, found {:?}", other)));
            }
        };
        self.advance();

        let mut recipe = Recipe::new(kind.clone(), name.clone(), location);
        if matches!(kind, RecipeKind::File) {
            recipe.output = Some(std::path::PathBuf::from(&name));
        }

        // Aliases via `task NAME | a | b:`.
        while matches!(self.peek().kind, TokenKind::Symbol('|')) {
            self.advance();
            let alias = self.expect_identifier_or_word()?;
            recipe.aliases.push(alias);
        }

        // Parameters (task form only): `name` or `name="default"`, up to `:`.
        if matches!(kind, RecipeKind::Task) {
            loop {
                match &self.peek().kind {
                    TokenKind::Identifier(param_name) => {
                        let param_name = param_name.clone();
                        self.advance();
                        let default = if matches!(self.peek().kind, TokenKind::Symbol('=')) {
                            self.advance();
                            Some(self.expect_string()?)
                        } else {
                            None
                        };
                        recipe.params.push(Param {
                            name: param_name,
                            default,
                        });
                    }
                    TokenKind::Symbol(':') => break,
                    other => {
                        return Err(self.error(&format!(
                            "expected ':' after task name, found {:?}",
                            other
                        )));
                    }
                }
            }
        }

        self.expect_symbol(':')?;

        // Dependencies / file_deps: comma-separated identifiers or globs, to end of line, or a
        // bracketed list `[a, b]`.
        let deps = self.parse_dependency_list()?;
        match kind {
            RecipeKind::File => recipe.file_deps = deps,
            _ => recipe.dependencies = deps,
        }
        self.expect_newline()?;

        // Apply pending recipe-metadata directives and the doc comment, then reset the
        // accumulator (it attaches only to this one recipe).
        recipe.group = self.pending.group.take();
        recipe.description = self.pending.description.take();
        recipe.aliases.extend(std::mem::take(&mut self.pending.aliases));
        recipe.quiet = self.pending.quiet;
        recipe.only_os = std::mem::take(&mut self.pending.only_os);
        recipe.needs = std::mem::take(&mut self.pending.needs);
        recipe.timeout_seconds = self.pending.timeout_seconds.take();
        recipe.doc_comment = self.doc_comment.take();
        self.pending = PendingMetadata::default();

        // Body: an Indent block, or none at all (an empty recipe is valid).
        if matches!(self.peek().kind, TokenKind::Indent) {
            self.advance();
            let commands = self.parse_command_block(&mut recipe)?;
            recipe.commands = commands;
            self.expect_dedent()?;
        }

        Ok(recipe)
    }

    fn parse_dependency_list(&mut self) -> Result<Vec<String>, ErrorKind> {
        let mut deps = Vec::new();

        let bracketed = matches!(self.peek().kind, TokenKind::Symbol('['));
        if bracketed {
            self.advance();
            loop {
                if matches!(self.peek().kind, TokenKind::Symbol(']')) {
                    self.advance();
                    break;
                }
                deps.push(self.expect_identifier_or_word_or_glob()?);
                if matches!(self.peek().kind, TokenKind::Symbol(',')) {
                    self.advance();
                }
            }
            return Ok(deps);
        }

        while !self.at_end_of_line() {
            deps.push(self.expect_identifier_or_word_or_glob()?);
            if matches!(self.peek().kind, TokenKind::Symbol(',')) {
                self.advance();
            }
        }

        Ok(deps)
    }

    // Parses a sequence of body lines until a `Dedent`/`Eof`, including nested block directives.
    // A recipe's own `@pre`/`@post` lines are a distinct mechanism from global/targeted hooks
    // (spec §4.9): rather than becoming `Command`s in the returned list, they're pushed straight
    // into the owning recipe's `pre_hooks`/`post_hooks`.
    fn parse_command_block(&mut self, recipe: &mut Recipe) -> Result<Vec<Command>, ErrorKind> {
        let mut commands = Vec::new();

        loop {
            self.skip_blank_lines();
            if matches!(self.peek().kind, TokenKind::Dedent | TokenKind::Eof) {
                break;
            }
            if self.is_recipe_hook_ahead() {
                self.parse_recipe_hook_line(recipe)?;
                continue;
            }
            commands.push(self.parse_command_line()?);
        }

        Ok(commands)
    }

    fn is_recipe_hook_ahead(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Symbol('@'))
            && matches!(
                &self.peek_at(1).kind,
                TokenKind::Keyword(k) | TokenKind::Identifier(k) if k == "pre" || k == "post"
            )
    }

    fn parse_recipe_hook_line(&mut self, recipe: &mut Recipe) -> Result<(), ErrorKind> {
        self.advance(); // '@'

        let name = match &self.peek().kind {
            TokenKind::Keyword(k) | TokenKind::Identifier(k) => k.clone(),
            other => return Err(self.error(&format!("expected directive name, found {:?}", other))),
        };
        self.advance();

        let command = self.rest_of_line_raw()?;
        self.expect_newline()?;

        match name.as_str() {
            "pre" => recipe.pre_hooks.push(command),
            "post" => recipe.post_hooks.push(command),
            _ => unreachable!("is_recipe_hook_ahead only matches pre/post"),
        }

        Ok(())
    }

    fn parse_command_line(&mut self) -> Result<Command, ErrorKind> {
        let location = self.peek().location;

        if matches!(self.peek().kind, TokenKind::Symbol('@')) {
            return self.parse_directive_line();
        }

        let mut silent = false;
        let mut ignored = false;

        if matches!(self.peek().kind, TokenKind::Symbol('-')) {
            ignored = true;
            self.advance();
        }

        let text = self.rest_of_line_raw()?;
        let text = if let Some(stripped) = text.strip_prefix('@') {
            silent = true;
            stripped.trim_start().to_owned()
        } else {
            text
        };
        self.expect_newline()?;

        Ok(Command {
            text,
            directive: None,
            children: Vec::new(),
            silent,
            ignored,
            location,
        })
    }

    fn parse_directive_line(&mut self) -> Result<Command, ErrorKind> {
        let location = self.peek().location;
        self.advance(); // '@'

        let name = match &self.peek().kind {
            TokenKind::Keyword(k) => k.clone(),
            TokenKind::Identifier(i) => i.clone(),
            other => return Err(self.error(&format!("expected directive name, found {:?}", other))),
        };
        self.advance();

        let directive = match name.as_str() {
            "ignore" => {
                self.expect_newline()?;
                DirectiveTag::Ignore
            }
            "cd" => {
                let path = self.rest_of_line_string()?;
                self.expect_newline()?;
                DirectiveTag::Cd { path }
            }
            "shell" => {
                let interpreter = self.rest_of_line_string()?;
                self.expect_newline()?;
                DirectiveTag::Shell { interpreter }
            }
            "needs" => {
                let need = self.parse_needs_arguments()?;
                self.expect_newline()?;
                DirectiveTag::Needs(need)
            }
            "confirm" => {
                let message = self.rest_of_line_string()?;
                self.expect_newline()?;
                DirectiveTag::Confirm { message }
            }
            "require" => {
                let variables = self.rest_of_line_words()?;
                self.expect_newline()?;
                DirectiveTag::Require { variables }
            }
            "export" => {
                let assignment = self.rest_of_line_raw()?;
                self.expect_newline()?;
                DirectiveTag::Export { assignment }
            }
            "launch" => {
                let target = self.rest_of_line_string()?;
                self.expect_newline()?;
                DirectiveTag::Launch { target }
            }
            "timeout" => {
                let seconds = self.rest_of_line_string()?.trim().parse::<u64>().unwrap_or(0);
                self.expect_newline()?;
                DirectiveTag::Timeout { seconds }
            }
            "watch" => {
                let patterns = self.rest_of_line_words()?;
                self.expect_newline()?;
                DirectiveTag::Watch { patterns }
            }
            "cache" => {
                let patterns = self.rest_of_line_words()?;
                self.expect_newline()?;
                let children = self.parse_block_until_end()?;
                return Ok(Command {
                    text: String::new(),
                    directive: Some(DirectiveTag::Cache { patterns }),
                    children,
                    silent: false,
                    ignored: false,
                    location,
                });
            }
            "each" => {
                let source = self.rest_of_line_raw()?;
                self.expect_newline()?;
                let children = self.parse_block_until_end()?;
                return Ok(Command {
                    text: String::new(),
                    directive: Some(DirectiveTag::Each { source }),
                    children,
                    silent: false,
                    ignored: false,
                    location,
                });
            }
            "if" => {
                let condition = self.rest_of_line_raw()?;
                self.expect_newline()?;
                let children = self.parse_block_until_end()?;
                return Ok(Command {
                    text: String::new(),
                    directive: Some(DirectiveTag::If { condition }),
                    children,
                    silent: false,
                    ignored: false,
                    location,
                });
            }
            "elif" => {
                let condition = self.rest_of_line_raw()?;
                self.expect_newline()?;
                DirectiveTag::Elif { condition }
            }
            "else" => {
                self.expect_newline()?;
                DirectiveTag::Else
            }
            "end" => {
                return Err(self.error("unmatched @end"));
            }
            other => return Err(self.error(&format!("unknown directive '@{}'", other))),
        };

        Ok(Command {
            text: String::new(),
            directive: Some(directive),
            children: Vec::new(),
            silent: false,
            ignored: false,
            location,
        })
    }

    // Reads lines until a matching `@end`, recursing into nested `if`/`each`/`cache` blocks so
    // their own `@end` doesn't prematurely close the outer block. `elif`/`else` are left in the
    // flat child list as markers for the condition evaluator to split on.
    fn parse_block_until_end(&mut self) -> Result<Vec<Command>, ErrorKind> {
        let mut children = Vec::new();

        loop {
            self.skip_blank_lines();

            if matches!(self.peek().kind, TokenKind::Dedent | TokenKind::Eof) {
                return Err(self.error("unmatched block: expected '@end'"));
            }

            if self.is_end_directive_ahead() {
                self.advance(); // '@'
                self.advance(); // 'end'
                self.expect_newline()?;
                break;
            }

            children.push(self.parse_command_line()?);
        }

        Ok(children)
    }

    fn is_end_directive_ahead(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Symbol('@'))
            && matches!(&self.peek_at(1).kind, TokenKind::Keyword(k) if k == "end")
    }

    // --- token-stream helpers -------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    // A `Newline` that directly terminates a just-consumed comment's own source line merely ends
    // that line, not a blank line between the comment and what follows; only skip the doc-comment
    // reset for that first newline. Any further `Newline` is a genuine blank line and breaks the
    // contiguity a doc comment requires.
    fn skip_blank_lines(&mut self) {
        let mut first = true;
        while matches!(self.peek().kind, TokenKind::Newline) {
            if !(first && self.just_saw_comment) {
                self.last_comment_line = None;
                self.doc_comment = None;
            }
            self.advance();
            first = false;
        }
        self.just_saw_comment = false;
    }

    fn accumulate_doc_comment(&mut self, text: String) {
        let line = self.peek().location.line;
        let body = text.trim_start_matches('#').trim().to_owned();

        let contiguous = self
            .last_comment_line
            .map(|prev| prev + 1 == line)
            .unwrap_or(true);

        if contiguous {
            match &mut self.doc_comment {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&body);
                }
                None => self.doc_comment = Some(body),
            }
        } else {
            self.doc_comment = Some(body);
        }

        self.last_comment_line = Some(line);
    }

    fn is_assignment_ahead(&self) -> bool {
        matches!(self.peek_at(1).kind, TokenKind::Symbol('='))
    }

    fn at_end_of_line(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn expect_newline(&mut self) -> Result<(), ErrorKind> {
        match self.peek().kind {
            TokenKind::Newline | TokenKind::Eof => {
                if matches!(self.peek().kind, TokenKind::Newline) {
                    self.advance();
                }
                Ok(())
            }
            _ => Err(self.error("expected end of line")),
        }
    }

    fn expect_dedent(&mut self) -> Result<(), ErrorKind> {
        match self.peek().kind {
            TokenKind::Dedent => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.error("expected end of recipe body")),
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), ErrorKind> {
        if matches!(self.peek().kind, TokenKind::Symbol(c) if c == symbol) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", symbol)))
        }
    }

    fn expect_identifier_or_word(&mut self) -> Result<String, ErrorKind> {
        let result = match &self.peek().kind {
            TokenKind::Identifier(s) | TokenKind::Keyword(s) => s.clone(),
            TokenKind::String(s) => s.clone(),
            other => return Err(self.error(&format!("expected a name, found {:?}", other))),
        };
        self.advance();
        Ok(result)
    }

    fn expect_identifier_or_word_or_glob(&mut self) -> Result<String, ErrorKind> {
        let result = match &self.peek().kind {
            TokenKind::Identifier(s) | TokenKind::Keyword(s) | TokenKind::Glob(s) => s.clone(),
            TokenKind::String(s) => s.clone(),
            other => return Err(self.error(&format!("expected a name, found {:?}", other))),
        };
        self.advance();
        Ok(result)
    }

    fn expect_string(&mut self) -> Result<String, ErrorKind> {
        match &self.peek().kind {
            TokenKind::String(s) => {
                let value = s.clone();
                self.advance();
                Ok(value)
            }
            other => Err(self.error(&format!("expected a quoted string, found {:?}", other))),
        }
    }

    fn eat_keyword_word(&mut self, word: &str) -> bool {
        let matches = match &self.peek().kind {
            TokenKind::Keyword(k) | TokenKind::Identifier(k) => k == word,
            _ => false,
        };
        if matches {
            self.advance();
        }
        matches
    }

    // Returns the remainder of the current source line, starting at the current token's column,
    // trimmed. Used for directive arguments and command text, which are free-form shell/condition
    // text rather than Jakefile grammar.
    fn rest_of_line_raw(&mut self) -> Result<String, ErrorKind> {
        let location = self.peek().location;
        let line_index = location.line - 1;
        let line = self.lines.get(line_index).copied().unwrap_or("");
        let byte_col = column_to_byte_offset(line, location.column);
        let text = line.get(byte_col..).unwrap_or("").trim().to_owned();

        // Advance the token cursor past every token that belongs to this source line.
        while self.peek().location.line == location.line
            && !matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
        {
            self.advance();
        }

        Ok(text)
    }

    // Like `rest_of_line_raw`, but strips a single layer of surrounding quotes if present (for
    // directive arguments that are conventionally quoted, e.g. `@group "Build"`).
    fn rest_of_line_string(&mut self) -> Result<String, ErrorKind> {
        let raw = self.rest_of_line_raw()?;
        let trimmed = raw.trim();
        if (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        {
            Ok(trimmed[1..trimmed.len() - 1].to_owned())
        } else {
            Ok(trimmed.to_owned())
        }
    }

    // Splits the remainder of the line on commas and/or whitespace.
    fn rest_of_line_words(&mut self) -> Result<Vec<String>, ErrorKind> {
        let raw = self.rest_of_line_raw()?;
        Ok(raw
            .split([',', ' ', '\t'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    fn error(&self, message: &str) -> ErrorKind {
        let location = self.peek().location;
        ErrorKind::ParseError {
            line: location.line,
            column: location.column,
            message: message.to_owned(),
        }
    }
}

// Converts a 1-based column (as tracked by the lexer, one unit per byte/char scanned) into a byte
// offset into `line`. The lexer counts one column per `char`, so we walk chars to find the byte
// boundary.
fn column_to_byte_offset(line: &str, column: usize) -> usize {
    let mut col = 1usize;
    for (byte_idx, _) in line.char_indices() {
        if col == column {
            return byte_idx;
        }
        col += 1;
    }
    line.len()
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::ast::RecipeKind;

    #[test]
    fn parse_minimal_task() {
        let doc = parse("task hello:\n    echo \"Hello from Jake!\"\n").unwrap();
        assert_eq!(doc.recipes.len(), 1);
        assert_eq!(doc.recipes[0].name, "hello");
        assert_eq!(doc.recipes[0].kind, RecipeKind::Task);
        assert_eq!(doc.recipes[0].commands.len(), 1);
        assert_eq!(doc.recipes[0].commands[0].text, "echo \"Hello from Jake!\"");
    }

    #[test]
    fn parse_dependencies() {
        let doc = parse("task build:\n    echo build\ntask test: build\n    echo test\n").unwrap();
        assert_eq!(doc.recipes[1].dependencies, vec!["build".to_owned()]);
    }

    #[test]
    fn parse_bracketed_dependencies() {
        let doc =
            parse("task all: [frontend, backend]\ntask frontend:\n    echo fe\ntask backend:\n    echo be\n")
                .unwrap();
        assert_eq!(
            doc.recipes[0].dependencies,
            vec!["frontend".to_owned(), "backend".to_owned()]
        );
    }

    #[test]
    fn parse_file_recipe() {
        let doc = parse("file out.txt: in.txt\n    cp in.txt out.txt\n").unwrap();
        assert_eq!(doc.recipes[0].kind, RecipeKind::File);
        assert_eq!(doc.recipes[0].file_deps, vec!["in.txt".to_owned()]);
        assert_eq!(
            doc.recipes[0].output,
            Some(std::path::PathBuf::from("out.txt"))
        );
    }

    #[test]
    fn parse_simple_recipe_without_keyword() {
        let doc = parse("greet:\n    echo hi\n").unwrap();
        assert_eq!(doc.recipes[0].kind, RecipeKind::Simple);
    }

    #[test]
    fn parse_param_with_default() {
        let doc = parse("task greet name=\"World\":\n    echo \"Hello, {{name}}!\"\n").unwrap();
        assert_eq!(doc.recipes[0].params[0].name, "name");
        assert_eq!(doc.recipes[0].params[0].default, Some("World".to_owned()));
    }

    #[test]
    fn parse_doc_comment_attaches_to_next_recipe() {
        let doc = parse("# Builds the project.\ntask build:\n    echo hi\n").unwrap();
        assert_eq!(doc.recipes[0].doc_comment, Some("Builds the project.".to_owned()));
    }

    #[test]
    fn parse_doc_comment_resets_after_blank_line() {
        let doc = parse("# Stale comment.\n\ntask build:\n    echo hi\n").unwrap();
        assert_eq!(doc.recipes[0].doc_comment, None);
    }

    #[test]
    fn parse_group_and_alias_directives() {
        let doc = parse("@group \"CI\"\n@alias b\ntask build:\n    echo hi\n").unwrap();
        assert_eq!(doc.recipes[0].group, Some("CI".to_owned()));
        assert_eq!(doc.recipes[0].aliases, vec!["b".to_owned()]);
    }

    #[test]
    fn parse_variable_assignment() {
        let doc = parse("NAME = \"world\"\ntask greet:\n    echo hi\n").unwrap();
        assert_eq!(doc.variables[0].name, "NAME");
        assert_eq!(doc.variables[0].value, "world");
    }

    #[test]
    fn parse_if_block() {
        let doc = parse(
            "task build:\n    @if eq(\"a\",\"a\")\n    echo yes\n    @else\n    echo no\n    @end\n",
        )
        .unwrap();
        assert_eq!(doc.recipes[0].commands.len(), 1);
    }

    #[test]
    fn parse_unmatched_end_is_error() {
        let result = parse("task build:\n    @end\n");
        assert!(result.is_err());
    }

    #[test]
    fn parse_unknown_directive_is_error() {
        let result = parse("@frob\ntask build:\n    echo hi\n");
        assert!(result.is_err());
    }

    #[test]
    fn parse_duplicate_recipe_names_both_parse() {
        // Duplicate-name detection is the index's job (structural error at index-build time), not
        // the parser's; the parser accepts both and lets `index::build` reject the collision.
        let doc = parse("task build:\n    echo one\ntask build:\n    echo two\n").unwrap();
        assert_eq!(doc.recipes.len(), 2);
    }

    #[test]
    fn parse_recipe_scoped_pre_and_post_hooks() {
        let doc = parse(
            "task build:\n    @pre echo starting\n    echo hi\n    @post echo done\n",
        )
        .unwrap();
        assert_eq!(doc.recipes[0].pre_hooks, vec!["echo starting".to_owned()]);
        assert_eq!(doc.recipes[0].post_hooks, vec!["echo done".to_owned()]);
        assert_eq!(doc.recipes[0].commands.len(), 1);
        assert_eq!(doc.recipes[0].commands[0].text, "echo hi");
    }

    #[test]
    fn parse_import_with_namespace() {
        let doc = parse("@import \"other.jake\" as ns\ntask build:\n    echo hi\n").unwrap();
        assert_eq!(doc.imports[0].path, "other.jake");
        assert_eq!(doc.imports[0].namespace, Some("ns".to_owned()));
    }
}
