//! Reflective Reviewer — a static heuristic pass plus an optional
//! model-driven review/repair pass.

use regex::Regex;

use crate::model::ModelAdapter;
use crate::task::{CodeArtifact, ReflectionResult};
use crate::validator::ValidationReport;

const REVIEW_PROMPT_TEMPLATE: &str = "You are a senior code reviewer. Analyze this Rust code critically:\n\n```rust\n{code}\n```\n\n{validation_info}\n\nProvide your analysis in this exact format:\n\nISSUES:\n- List specific code issues (if any)\n- Focus on: logic errors, security issues, performance problems, maintainability\n- Be specific and actionable\n\nSUGGESTIONS:\n- List improvement suggestions\n- Include best practices\n- Suggest refactoring opportunities\n\nCAN_FIX: [yes/no] (can the issues be automatically fixed?)\n\nCONFIDENCE: [0.0-1.0] (how confident are you in your assessment?)\n\nBe thorough but concise.";

const FIX_PROMPT_TEMPLATE: &str = "Fix the following Rust code based on the identified issues:\n\nOriginal Code:\n```rust\n{code}\n```\n\nIssues to Fix:\n{issues}\n\nSuggestions:\n{suggestions}\n\nRequirements:\n1. Fix ALL the issues listed above\n2. Maintain the original functionality\n3. Follow Rust idioms\n4. Propagate errors with Result rather than panicking\n5. Add doc comments where missing\n\nReturn ONLY the fixed code, no explanations:";

struct LlmFeedback {
    issues: Vec<String>,
    suggestions: Vec<String>,
    can_fix: bool,
    confidence: f64,
}

impl Default for LlmFeedback {
    fn default() -> Self {
        Self {
            issues: Vec::new(),
            suggestions: Vec::new(),
            can_fix: false,
            confidence: 0.5,
        }
    }
}

pub struct Reflector;

impl Reflector {
    pub fn new() -> Self {
        Self
    }

    /// Combine the static pass with an optional model pass. Never returns an
    /// error: model failures collapse into a low-confidence issue.
    pub async fn reflect(
        &self,
        artifacts: &[CodeArtifact],
        validation: Option<&ValidationReport>,
        model: Option<&ModelAdapter>,
    ) -> ReflectionResult {
        let Some(main) = crate::validator::find_main_artifact(artifacts) else {
            return ReflectionResult {
                has_issues: true,
                issues: vec!["No code artifacts generated".to_string()],
                suggestions: vec!["Generate code first".to_string()],
                confidence: 1.0,
                improved_code: None,
            };
        };

        let code = &main.content;
        let auto_issues = Self::static_analysis(code);

        let llm_feedback = match model {
            Some(model) => Self::llm_analysis(model, code, validation).await,
            None => LlmFeedback::default(),
        };

        let mut all_issues = auto_issues;
        for issue in llm_feedback.issues {
            if !all_issues.contains(&issue) {
                all_issues.push(issue);
            }
        }

        let improved_code = if !all_issues.is_empty() && llm_feedback.can_fix {
            if let Some(model) = model {
                Self::generate_fix(model, code, &all_issues, &llm_feedback.suggestions).await
            } else {
                None
            }
        } else {
            None
        };

        ReflectionResult {
            has_issues: !all_issues.is_empty(),
            issues: all_issues,
            suggestions: llm_feedback.suggestions,
            confidence: llm_feedback.confidence,
            improved_code,
        }
    }

    /// Fast heuristic pass: structure, error handling, docs, over-long
    /// functions, suspected magic strings.
    fn static_analysis(code: &str) -> Vec<String> {
        let parse = crate::ast::RustParse::parse(code);
        if parse.has_error {
            return vec![format!(
                "Syntax error: {}",
                parse.error_message.unwrap_or_else(|| "unparseable".to_string())
            )];
        }

        let mut issues = Vec::new();

        if !parse.has_function_or_type() {
            issues.push("Code lacks structure: no functions or types defined".to_string());
        }

        if !parse.has_try_operator && !code.contains("-> Result") {
            issues.push("Missing error handling: consider propagating Result instead of panicking".to_string());
        }

        if !crate::ast::has_doc_comment(code) {
            issues.push("Missing doc comments: add documentation to public items".to_string());
        }

        for func in parse.functions() {
            let statement_count = func.end_line.saturating_sub(func.start_line);
            if statement_count > 50 {
                issues.push(format!(
                    "Function '{}' is very long ({} lines), consider refactoring",
                    func.name, statement_count
                ));
            }
        }

        if Self::has_hardcoded_strings(code) {
            issues.push("Consider extracting hardcoded strings to constants".to_string());
        }

        issues
    }

    fn has_hardcoded_strings(code: &str) -> bool {
        let string_re = Regex::new(r#""([^"\\]|\\.)*""#).unwrap();
        string_re.find_iter(code).any(|m| {
            let literal = m.as_str();
            let inner = &literal[1..literal.len().saturating_sub(1)];
            inner.len() > 10 && !inner.starts_with("http") && !inner.starts_with('/') && !inner.starts_with("./")
        })
    }

    async fn llm_analysis(model: &ModelAdapter, code: &str, validation: Option<&ValidationReport>) -> LlmFeedback {
        let validation_info = validation
            .map(|v| {
                format!(
                    "Validation Results:\n- Passed: {}\n- Score: {}/100\n- Errors: {:?}\n- Warnings: {:?}",
                    v.passed, v.score, v.errors, v.warnings
                )
            })
            .unwrap_or_default();

        let prompt = REVIEW_PROMPT_TEMPLATE
            .replace("{code}", code)
            .replace("{validation_info}", &validation_info);

        match model.generate("You are reviewing autonomously generated code.", &prompt).await {
            Ok(response) => Self::parse_llm_response(&response),
            Err(e) => LlmFeedback {
                issues: vec![format!("LLM analysis failed: {e}")],
                suggestions: Vec::new(),
                can_fix: false,
                confidence: 0.0,
            },
        }
    }

    /// Strict-but-forgiving section grammar: `ISSUES:`/`SUGGESTIONS:` collect
    /// bulleted or bare lines; `CAN_FIX:`/`CONFIDENCE:` are scalar lines.
    /// Any parse anomaly degrades to whatever was already collected.
    fn parse_llm_response(response: &str) -> LlmFeedback {
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        let mut can_fix = false;
        let mut confidence = 0.5;
        let mut current_section: Option<&str> = None;

        for raw_line in response.split('\n') {
            let line = raw_line.trim();

            if line.starts_with("ISSUES:") {
                current_section = Some("issues");
                continue;
            }
            if line.starts_with("SUGGESTIONS:") {
                current_section = Some("suggestions");
                continue;
            }
            if line.starts_with("CAN_FIX:") {
                can_fix = line.to_lowercase().contains("yes");
                current_section = None;
                continue;
            }
            if line.starts_with("CONFIDENCE:") {
                confidence = line
                    .split(':')
                    .nth(1)
                    .and_then(|rest| rest.trim().split_whitespace().next())
                    .and_then(|token| token.parse::<f64>().ok())
                    .unwrap_or(0.5);
                current_section = None;
                continue;
            }

            if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
                let item = item.trim();
                if !item.is_empty() {
                    match current_section {
                        Some("issues") => issues.push(item.to_string()),
                        Some("suggestions") => suggestions.push(item.to_string()),
                        _ => {}
                    }
                }
            } else if !line.is_empty() && current_section.is_some() && !line.ends_with(':') {
                match current_section {
                    Some("issues") => issues.push(line.to_string()),
                    Some("suggestions") => suggestions.push(line.to_string()),
                    _ => {}
                }
            }
        }

        LlmFeedback {
            issues,
            suggestions,
            can_fix,
            confidence,
        }
    }

    async fn generate_fix(model: &ModelAdapter, code: &str, issues: &[String], suggestions: &[String]) -> Option<String> {
        let issues_text = issues.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n");
        let suggestions_text = suggestions.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");
        let prompt = FIX_PROMPT_TEMPLATE
            .replace("{code}", code)
            .replace("{issues}", &issues_text)
            .replace("{suggestions}", &suggestions_text);

        let response = model.generate("You are repairing autonomously generated code.", &prompt).await.ok()?;
        Some(Self::clean_code(&response))
    }

    fn clean_code(code: &str) -> String {
        let mut code = code.trim();
        if let Some(rest) = code.strip_prefix("```rust") {
            code = rest;
        } else if let Some(rest) = code.strip_prefix("```") {
            code = rest;
        }
        code.trim().trim_end_matches("```").trim().to_string()
    }
}

impl Default for Reflector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::ScriptedModel;

    fn artifact(content: &str) -> Vec<CodeArtifact> {
        vec![CodeArtifact {
            filename: "main.rs".to_string(),
            content: content.to_string(),
        }]
    }

    #[tokio::test]
    async fn static_pass_alone_finds_missing_structure() {
        let reflection = Reflector::new().reflect(&artifact("const X: i32 = 1;"), None, None).await;
        assert!(reflection.has_issues);
        assert!(reflection.issues.iter().any(|i| i.contains("structure")));
    }

    #[tokio::test]
    async fn no_artifacts_is_itself_an_issue() {
        let reflection = Reflector::new().reflect(&[], None, None).await;
        assert!(reflection.has_issues);
        assert_eq!(reflection.confidence, 1.0);
    }

    #[tokio::test]
    async fn model_response_is_parsed_and_drives_repair() {
        let response = "ISSUES:\n- bad naming\nSUGGESTIONS:\n- rename vars\nCAN_FIX: yes\nCONFIDENCE: 0.9";
        let fixed = "```rust\nfn f() {}\n```";
        let model = ModelAdapter::Completion(Box::new(ScriptedModel::new(vec![response, fixed])));
        let reflection = Reflector::new()
            .reflect(&artifact("fn f() {}"), None, Some(&model))
            .await;
        assert!(reflection.issues.iter().any(|i| i == "bad naming"));
        assert_eq!(reflection.confidence, 0.9);
        assert_eq!(reflection.improved_code.as_deref(), Some("fn f() {}"));
    }

    #[tokio::test]
    async fn model_failure_collapses_to_low_confidence_issue() {
        let model = ModelAdapter::Completion(Box::new(ScriptedModel::with_results(vec![Err(
            crate::error::CoreError::model_failed("timeout"),
        )])));
        let reflection = Reflector::new()
            .reflect(&artifact("fn f() {}"), None, Some(&model))
            .await;
        assert!(reflection.issues.iter().any(|i| i.contains("LLM analysis failed")));
    }

    #[test]
    fn parse_grammar_tolerates_unbulleted_lines() {
        let response = "ISSUES:\nunbulleted issue\nCONFIDENCE: not-a-number";
        let feedback = Reflector::parse_llm_response(response);
        assert_eq!(feedback.issues, vec!["unbulleted issue".to_string()]);
        assert_eq!(feedback.confidence, 0.5);
    }
}
