//! Prompt assembly for the planning call.

use pipeline_contracts::ChangeRequest;

pub const SYSTEM: &str = "You are Request-Planner v1. Return ONLY valid JSON with keys: \
steps: [{goal, kind, path}], rationale: [...]";

pub fn build_prompt(cr: &ChangeRequest, snippets: &[String]) -> String {
    let ctx = snippets.join("\n\n");
    format!(
        "# CHANGE REQUEST\n{}\n\n# CONTEXT\n{}\n\nReturn plan JSON.",
        cr.description, ctx
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_description_and_context() {
        let cr = ChangeRequest {
            id: "r".into(),
            requester: "dev".into(),
            repo: "demo".into(),
            branch: "main".into(),
            description: "add greet()".into(),
        };
        let prompt = build_prompt(&cr, &["def other(): pass".into()]);
        assert!(prompt.contains("add greet()"));
        assert!(prompt.contains("def other(): pass"));
        assert!(prompt.starts_with("# CHANGE REQUEST"));
    }
}
