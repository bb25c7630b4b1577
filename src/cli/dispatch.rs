//! Invocation-name dispatch.
//!
//! The tools are also installed under short names (`taskget`, `taskfql`,
//! ...). The name the binary was started as is looked up once, here, and
//! turned into the equivalent `twtools <subcommand>` argument list.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Full command surface
    Twtools,
    Get,
    Fql,
    Check,
    Reconcile,
    ImportUndo,
}

/// Installed names and what they run.
pub const INVOCATIONS: [(&str, Operation); 6] = [
    ("twtools", Operation::Twtools),
    ("taskget", Operation::Get),
    ("taskfql", Operation::Fql),
    ("taskcheck", Operation::Check),
    ("tasksync", Operation::Reconcile),
    ("task2to3", Operation::ImportUndo),
];

impl Operation {
    /// Look up the program name (path and extension ignored).
    /// Unknown names get the full command surface.
    pub fn from_program(program: &str) -> Self {
        let stem = Path::new(program)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(program);
        INVOCATIONS
            .iter()
            .find(|(name, _)| *name == stem)
            .map(|(_, operation)| *operation)
            .unwrap_or(Operation::Twtools)
    }

    pub fn subcommand(self) -> Option<&'static str> {
        match self {
            Operation::Twtools => None,
            Operation::Get => Some("get"),
            Operation::Fql => Some("fql"),
            Operation::Check => Some("check"),
            Operation::Reconcile => Some("reconcile"),
            Operation::ImportUndo => Some("import-undo"),
        }
    }
}

/// Rewrite `argv` so an aliased invocation parses as `twtools <subcommand>`.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let program = args.next().unwrap_or_else(|| "twtools".to_string());
    let operation = Operation::from_program(&program);

    let mut out = vec!["twtools".to_string()];
    if let Some(sub) = operation.subcommand() {
        out.push(sub.to_string());
    }
    out.extend(args);
    out
}
