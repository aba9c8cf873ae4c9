use std::{error, fmt};

// We distinguish between two kinds of failures:
// 1. Some system operation (e.g., spawning a subprocess) failed
// 2. There was a problem with the user's input (e.g., a Jakefile error or a failed recipe)
//
// There is no separate "interrupted" kind: SIGINT/SIGTERM just flip the cooperative `running`
// flag the scheduler/runner already poll, and an interruption mid-run surfaces through that same
// path as an ordinary `ErrorKind::IOError` (exit code 1) — spec §6 only defines exit codes 0-3,
// so there's no 130-style signal-exit-code convention to preserve here.
#[derive(Debug)]
pub enum Failure {
    System(String, Option<Box<dyn error::Error + 'static>>),
    // The third field is the process exit code (spec CLI surface: 1 execution failure, 2
    // parse/structural error, 3 recipe not found or invalid CLI). Plain `Failure::User` call
    // sites that aren't wrapping an `ErrorKind` (e.g. CLI-usage errors in `main`) use 3.
    User(String, Option<Box<dyn error::Error + 'static>>, i32),
}

impl Failure {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Failure::System(_, _) => 1,
            Failure::User(_, _, code) => *code,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Failure::System(message, None) | Failure::User(message, None, _) => {
                write!(f, "{}", message)
            }
            Failure::System(message, Some(source)) | Failure::User(message, Some(source), _) => {
                write!(f, "{} Reason: {}", message, source)
            }
        }
    }
}

impl error::Error for Failure {
    fn source<'a>(&'a self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Failure::System(_, source) | Failure::User(_, source, _) => source.as_ref().map(|e| &**e),
        }
    }
}

// This is a helper function to convert a `std::error::Error` into a system failure. It's written
// in a curried style so it can be used in a higher-order fashion, e.g.,
// `foo.map_err(system_error("Error doing foo."))`.
pub fn system_error<E: error::Error + 'static>(message: &str) -> impl FnOnce(E) -> Failure {
    let message = message.to_owned();
    move |error: E| Failure::System(message, Some(Box::new(error)))
}

// This is a helper function to convert a `std::error::Error` into a user failure. It's written in a
// curried style so it can be used in a higher-order fashion, e.g.,
// `foo.map_err(user_error("Error doing foo."))`.
pub fn user_error<E: error::Error + 'static>(message: &str) -> impl FnOnce(E) -> Failure {
    let message = message.to_owned();
    move |error: E| Failure::User(message, Some(Box::new(error)), 3)
}

// The closed error-kind enumeration. Each variant carries what it needs to render a one-line
// `error:` message plus an optional `hint:`/`run:` line. An `ErrorKind` becomes a `Failure::User`
// via `From`, and a process exit code via `exit_code`.
#[derive(Debug)]
pub enum ErrorKind {
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },
    ImportError {
        chain: Vec<String>,
        message: String,
    },
    RecipeNotFound {
        name: String,
        suggestion: Option<String>,
    },
    CyclicDependency {
        recipe: String,
    },
    MissingRequiredEnv {
        variable: String,
    },
    MissingCommand {
        recipe: String,
        command: String,
        hint: Option<String>,
        install_recipe: Option<String>,
    },
    CommandFailed {
        recipe: String,
        command: String,
        code: Option<i32>,
    },
    Timeout {
        command: String,
        seconds: u64,
    },
    UserDeclined {
        recipe: String,
    },
    IOError {
        message: String,
        fatal: bool,
    },
}

impl ErrorKind {
    // Exit codes per the CLI surface contract: 0 success, 1 execution failure, 2 parse/structural
    // error, 3 recipe not found or invalid CLI usage.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::ParseError { .. } | ErrorKind::ImportError { .. } => 2,
            ErrorKind::RecipeNotFound { .. } => 3,
            ErrorKind::CyclicDependency { .. }
            | ErrorKind::MissingRequiredEnv { .. }
            | ErrorKind::MissingCommand { .. }
            | ErrorKind::CommandFailed { .. }
            | ErrorKind::Timeout { .. }
            | ErrorKind::UserDeclined { .. }
            | ErrorKind::IOError { .. } => 1,
        }
    }

    // Whether this error should abort the run outright, versus being logged as a warning and
    // survived (e.g., a non-fatal cache-persist failure during watch mode).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::IOError { fatal: false, .. })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::ParseError {
                line,
                column,
                message,
            } => write!(f, "{}:{}: {}", line, column, message),
            ErrorKind::ImportError { chain, message } => {
                write!(f, "{} (imported via {})", message, chain.join(" -> "))
            }
            ErrorKind::RecipeNotFound { name, suggestion } => {
                write!(f, "No recipe named `{}`.", name)?;
                if let Some(suggestion) = suggestion {
                    write!(f, "\nhint: did you mean `{}`?", suggestion)?;
                }
                Ok(())
            }
            ErrorKind::CyclicDependency { recipe } => {
                write!(f, "CyclicDependency: recipe `{}` depends on itself.", recipe)
            }
            ErrorKind::MissingRequiredEnv { variable } => write!(
                f,
                "Required environment variable `{}` is not set.\nhint: set it in the \
                 environment or a `.env` file loaded via `@dotenv`.",
                variable
            ),
            ErrorKind::MissingCommand {
                recipe,
                command,
                hint,
                install_recipe,
            } => {
                write!(
                    f,
                    "recipe `{}` requires `{}` but it's not installed",
                    recipe, command
                )?;
                if let Some(hint) = hint {
                    write!(f, "\nhint: {}", hint)?;
                }
                if let Some(install_recipe) = install_recipe {
                    write!(f, "\nrun: jake {}", install_recipe)?;
                }
                Ok(())
            }
            ErrorKind::CommandFailed {
                recipe,
                command,
                code,
            } => match code {
                Some(code) => write!(
                    f,
                    "Command `{}` in recipe `{}` exited with status {}.",
                    command, recipe, code
                ),
                None => write!(
                    f,
                    "Command `{}` in recipe `{}` terminated by a signal.",
                    command, recipe
                ),
            },
            ErrorKind::Timeout { command, seconds } => {
                write!(f, "command killed after {}s timeout: {}", seconds, command)
            }
            ErrorKind::UserDeclined { recipe } => {
                write!(f, "Recipe `{}` was not confirmed by the user.", recipe)
            }
            ErrorKind::IOError { message, .. } => write!(f, "{}", message),
        }
    }
}

impl error::Error for ErrorKind {}

impl From<ErrorKind> for Failure {
    fn from(kind: ErrorKind) -> Self {
        let code = kind.exit_code();
        Failure::User(kind.to_string(), None, code)
    }
}

#[cfg(test)]
mod tests {
    use crate::failure::{ErrorKind, Failure};

    #[test]
    fn failure_from_error_kind_preserves_exit_code() {
        let kind = ErrorKind::RecipeNotFound {
            name: "foo".to_owned(),
            suggestion: None,
        };
        let failure: Failure = kind.into();
        assert_eq!(failure.exit_code(), 3);
    }

    #[test]
    fn exit_code_parse_error_is_two() {
        let kind = ErrorKind::ParseError {
            line: 1,
            column: 1,
            message: "bad".to_owned(),
        };
        assert_eq!(kind.exit_code(), 2);
    }

    #[test]
    fn exit_code_recipe_not_found_is_three() {
        let kind = ErrorKind::RecipeNotFound {
            name: "foo".to_owned(),
            suggestion: None,
        };
        assert_eq!(kind.exit_code(), 3);
    }

    #[test]
    fn exit_code_command_failed_is_one() {
        let kind = ErrorKind::CommandFailed {
            recipe: "build".to_owned(),
            command: "false".to_owned(),
            code: Some(1),
        };
        assert_eq!(kind.exit_code(), 1);
    }

    #[test]
    fn non_fatal_io_error_is_not_fatal() {
        let kind = ErrorKind::IOError {
            message: "couldn't persist cache".to_owned(),
            fatal: false,
        };
        assert!(!kind.is_fatal());
    }

    #[test]
    fn parse_error_is_fatal() {
        let kind = ErrorKind::ParseError {
            line: 1,
            column: 1,
            message: "bad".to_owned(),
        };
        assert!(kind.is_fatal());
    }
}
