//! Intent classification
//!
//! Decides whether a message is plain arithmetic that can be answered by
//! running a one-line Python statement in the sandbox, or must go to a model.
//! Only two narrow shapes are recognised, and the whole (trimmed,
//! lower-cased) message must match:
//!
//! - `what is <digits and + - * / ( ) . spaces>?`
//! - `what is <int> divided by <int>?`
//!
//! The generated statement is never evaluated in-process; it only ever runs
//! inside the sandbox.

use lazy_static::lazy_static;
use regex::Regex;

/// Context sent to the model for anything that is not direct computation
pub const MODEL_SYSTEM_INSTRUCTION: &str = "You are Cody, a modular coding agent. \
Answer clearly and concisely. Code you suggest is executed only inside an isolated \
container sandbox with no network access.";

lazy_static! {
    static ref DIVIDED_BY: Regex =
        Regex::new(r"^what is ([0-9]+) divided by ([0-9]+)\?$").expect("valid divided-by regex");
    static ref ARITHMETIC: Regex =
        Regex::new(r"^what is ([0-9+\-*/(). ]*[0-9][0-9+\-*/(). ]*)\?$").expect("valid arithmetic regex");
    // a run of zeros opening an integer part ("08", "(007"), not a fraction ("1.05")
    static ref LEADING_ZEROS: Regex =
        Regex::new(r"(^|[^0-9.])0+([0-9])").expect("valid leading-zeros regex");
}

/// Result of classifying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Directly computable; the payload is the statement to run
    DirectExec { code: String },
    /// Needs a model; the payload is the fixed system instruction
    Model { instruction: &'static str },
}

impl Intent {
    pub fn can_run_directly(&self) -> bool {
        matches!(self, Intent::DirectExec { .. })
    }

    /// The code to run, or the instruction for the model
    pub fn payload(&self) -> &str {
        match self {
            Intent::DirectExec { code } => code,
            Intent::Model { instruction } => instruction,
        }
    }
}

/// Classify a message. Pure and total over any input.
pub fn classify(message: &str) -> Intent {
    let normalized = message.trim().to_lowercase();

    if let Some(caps) = DIVIDED_BY.captures(&normalized) {
        return Intent::DirectExec {
            code: format!(
                "print({} / {})",
                strip_leading_zeros(&caps[1]),
                strip_leading_zeros(&caps[2])
            ),
        };
    }

    if let Some(caps) = ARITHMETIC.captures(&normalized) {
        let expr = caps[1].trim();
        return Intent::DirectExec {
            code: format!("print({})", strip_leading_zeros(expr)),
        };
    }

    Intent::Model {
        instruction: MODEL_SYSTEM_INSTRUCTION,
    }
}

/// Python 3 rejects integer literals such as `08`
fn strip_leading_zeros(expr: &str) -> String {
    LEADING_ZEROS.replace_all(expr, "${1}${2}").into_owned()
}
