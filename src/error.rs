use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// A failure of the reflection pipeline itself. The assertion verdict never
/// depends on these: the driver degrades to a plain failure message.
#[derive(Debug)]
pub enum ReflectError {
    Io(std::io::Error),
    Parser(String),

    MalformedSource {
        path: PathBuf,
        line: usize,
        attempted: usize,
    },
    UnsupportedConstruct {
        kind: String,
        row: usize,
        column: usize,
    },
    BlockNotFound {
        name: String,
    },
}

impl fmt::Display for ReflectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReflectError::Io(e) => write!(f, "I/O error: {e}"),
            ReflectError::Parser(msg) => write!(f, "parser error: {msg}"),

            ReflectError::MalformedSource { path, line, attempted } => write!(
                f,
                "no parseable source window at {}:{line} after {attempted} line(s)",
                path.display()
            ),
            ReflectError::UnsupportedConstruct { kind, row, column } => {
                write!(f, "unsupported construct '{kind}' at {row}:{column}")
            }
            ReflectError::BlockNotFound { name } => {
                write!(f, "no '{name}' call with a block in the located source")
            }
        }
    }
}

impl Error for ReflectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReflectError::Io(e) => Some(e),

            ReflectError::Parser(_)
            | ReflectError::MalformedSource { .. }
            | ReflectError::UnsupportedConstruct { .. }
            | ReflectError::BlockNotFound { .. } => None,
        }
    }
}

impl From<std::io::Error> for ReflectError {
    fn from(e: std::io::Error) -> Self {
        ReflectError::Io(e)
    }
}

impl From<tree_sitter::LanguageError> for ReflectError {
    fn from(e: tree_sitter::LanguageError) -> Self {
        ReflectError::Parser(e.to_string())
    }
}

/// A failure while evaluating one fragment. Only the variant matters to the
/// capture collector; the payload is the Ruby-style message shown inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A name with no value in the caller's scope. Surfaced.
    MissingBinding(String),
    /// The fragment needs context that does not exist outside the original
    /// call site: bare references to methods, methods we do not model,
    /// blocks we cannot run, `super`. Suppressed silently.
    InsufficientBindings(String),
    /// Any other evaluation failure. Surfaced.
    Raised(String),
}

impl EvalError {
    pub fn undefined_name(name: &str) -> EvalError {
        EvalError::MissingBinding(format!("undefined local variable or method '{name}'"))
    }

    pub fn uninitialized_constant(name: &str) -> EvalError {
        EvalError::MissingBinding(format!("uninitialized constant {name}"))
    }

    pub fn unknown_method(receiver_type: &str, name: &str) -> EvalError {
        EvalError::InsufficientBindings(format!("undefined method '{name}' for {receiver_type}"))
    }

    /// The bare-reference case: a known method named with none of its
    /// required arguments, which is what a reference artifact looks like.
    pub fn bare_reference(name: &str, expected: usize) -> EvalError {
        EvalError::InsufficientBindings(format!(
            "wrong number of arguments calling '{name}' (given 0, expected {expected})"
        ))
    }

    pub fn raised(message: impl Into<String>) -> EvalError {
        EvalError::Raised(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            EvalError::MissingBinding(m) | EvalError::InsufficientBindings(m) | EvalError::Raised(m) => m,
        }
    }

    /// True for failures the capture collector omits without a trace.
    pub fn is_silent(&self) -> bool {
        matches!(self, EvalError::InsufficientBindings(_))
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl Error for EvalError {}
