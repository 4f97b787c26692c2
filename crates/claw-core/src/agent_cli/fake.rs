//! Canned agent responses used when no process should be spawned.

use super::{result_body, CliRunResult};

/// Pick a deterministic response from the invocation's step name.
pub(crate) fn canned_result(step_name: &str) -> CliRunResult {
    let lowered = step_name.to_ascii_lowercase();

    if lowered.contains("rule-select") {
        return CliRunResult::completed("[]");
    }
    if step_name == "memory-generator" {
        return CliRunResult::completed("# MEMORY\nFake memory");
    }
    if lowered.contains("needs-input") {
        return CliRunResult::completed(result_body("needs_input", "fake input request"));
    }
    if lowered.contains("fail") {
        return CliRunResult::completed(result_body("fail", "fake failure"));
    }
    CliRunResult::completed(result_body("success", "fake run"))
}
