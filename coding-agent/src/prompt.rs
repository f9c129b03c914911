//! Prompt assembly for patch generation.

use pipeline_contracts::CodingTask;

pub const SYSTEM: &str = "You are Coding-Agent. Generate a unified diff patch to accomplish the task.\n\
Return JSON with:\n\
- diff: the unified diff patch (git format)\n\
- reasoning: brief explanation of changes";

pub fn build_user(task: &CodingTask, context: &str) -> String {
    format!(
        "TASK GOAL:\n{}\n\nFILE PATH:\n{}\n\nTASK KIND:\n{}\n\nCONTEXT (read-only reference):\n{}\n\nGenerate a minimal, focused patch that accomplishes the goal.",
        task.goal,
        task.path.as_deref().unwrap_or("N/A"),
        task.kind.as_str(),
        context
    )
}
