use std::io::{self, Write};

use crate::model::EvaluationResult;

const RULE: &str = "--------------------------------------------------";

/// Render an evaluation result. A non-alert result still prints a status
/// line so every run's outcome is visible.
pub fn report<W: Write>(result: &EvaluationResult, out: &mut W) -> io::Result<()> {
    let tag = if result.alert { "ALERT" } else { "OK" };

    writeln!(out, "{RULE}")?;
    writeln!(out, "[{tag}] {}", result.message)?;
    writeln!(out, "{RULE}")?;
    out.flush()
}
