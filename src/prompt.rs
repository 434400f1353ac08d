//! Prompt Composer — assembles the system prompt from identity, tools,
//! rule-based guidelines, optional docs/context/skills sections, and
//! environment info; composes per-iteration user prompts with repair hints.

use std::path::{Path, PathBuf};

use chrono::Local;

fn tool_description(tool: &str) -> String {
    match tool {
        "read" => "Read the contents of a file. Supports text files. Use offset/limit to read partial content.".to_string(),
        "write" => "Write content to a file. Creates the file if it doesn't exist, overwrites if it does. Automatically creates parent directories.".to_string(),
        "edit" => "Edit a file by replacing exact text. The old_text must match exactly (including whitespace and indentation). Use this for precise, surgical edits.".to_string(),
        "bash" => "Execute bash commands in the current working directory. Use for file operations, running scripts, installing packages, etc.".to_string(),
        "grep" => "Search file contents for patterns using regular expressions. Respects .gitignore.".to_string(),
        "find" => "Find files by name pattern. Respects .gitignore.".to_string(),
        "ls" => "List directory contents.".to_string(),
        other => format!("Tool: {other}"),
    }
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    pub custom_prompt: Option<String>,
    pub selected_tools: Option<Vec<String>>,
    pub append_prompt: Option<String>,
    pub context_files: Vec<ContextFile>,
    pub skills: Vec<Skill>,
    pub cwd: Option<PathBuf>,
    pub docs_path: Option<String>,
}

pub struct PromptComposer {
    options: PromptOptions,
}

impl PromptComposer {
    pub fn new(options: PromptOptions) -> Self {
        Self { options }
    }

    pub fn build(&self) -> String {
        if self.options.custom_prompt.is_some() {
            self.build_custom()
        } else {
            self.build_default()
        }
    }

    fn build_default(&self) -> String {
        let mut parts = vec![self.base_description(), self.tools_section(), self.guidelines_section()];

        if self.options.docs_path.is_some() {
            parts.push(self.docs_section());
        }
        if !self.options.context_files.is_empty() {
            parts.push(self.context_section());
        }
        if !self.options.skills.is_empty() {
            parts.push(self.skills_section());
        }
        parts.push(self.environment_section());
        if let Some(append) = &self.options.append_prompt {
            parts.push(append.clone());
        }

        parts.join("\n\n")
    }

    fn build_custom(&self) -> String {
        let mut prompt = self.options.custom_prompt.clone().unwrap_or_default();

        if !self.options.context_files.is_empty() {
            prompt.push_str("\n\n# Project Context\n\n");
            for cf in &self.options.context_files {
                prompt.push_str(&format!("## {}\n\n{}\n\n", cf.path, cf.content));
            }
        }

        let has_read = self
            .options
            .selected_tools
            .as_ref()
            .is_some_and(|tools| tools.iter().any(|t| t == "read"));
        if !self.options.skills.is_empty() && has_read {
            prompt.push_str(&self.skills_section());
        }

        prompt.push_str(&format!("\n\nCurrent date and time: {}", Self::datetime()));
        prompt.push_str(&format!("\nCurrent working directory: {}", self.cwd_display()));

        if let Some(append) = &self.options.append_prompt {
            prompt.push_str(&format!("\n\n{append}"));
        }

        prompt
    }

    fn base_description(&self) -> String {
        "You are an expert coding assistant operating inside an autonomous coding agent framework. You help by reading files, executing commands, editing code, writing new files, and generating tools.\n\nYour core philosophy: \"If you need a capability, don't ask for it - write code to achieve it.\" You can extend yourself by writing new tools and extensions.".to_string()
    }

    fn tools(&self) -> Vec<String> {
        self.options
            .selected_tools
            .clone()
            .unwrap_or_else(|| vec!["read".to_string(), "bash".to_string(), "edit".to_string(), "write".to_string()])
    }

    fn tools_section(&self) -> String {
        let mut lines = vec!["Available tools:".to_string()];
        for tool in self.tools() {
            lines.push(format!("- {}: {}", tool, tool_description(&tool)));
        }
        lines.push(String::new());
        lines.push("You may also have access to custom tools depending on the project.".to_string());
        lines.join("\n")
    }

    fn guidelines_section(&self) -> String {
        let tools = self.tools();
        let has = |name: &str| tools.iter().any(|t| t == name);
        let has_bash = has("bash");
        let has_grep_find_ls = has("grep") || has("find") || has("ls");
        let has_read = has("read");
        let has_edit = has("edit");
        let has_write = has("write");

        let mut guidelines = Vec::new();

        if has_bash && !has_grep_find_ls {
            guidelines.push("Use bash for file operations like ls, grep, find".to_string());
        } else if has_bash && has_grep_find_ls {
            guidelines.push(
                "Prefer grep/find/ls tools over bash for file exploration (faster, respects .gitignore)".to_string(),
            );
        }

        if has_read && has_edit {
            guidelines.push("Use read to examine files before editing. You must use this tool instead of cat or sed.".to_string());
        }

        if has_edit {
            guidelines.push("Use edit for precise changes (old_text must match exactly including whitespace)".to_string());
        }

        if has_write {
            guidelines.push("Use write only for new files or complete rewrites".to_string());
        }

        if has_edit || has_write {
            guidelines.push(
                "When summarizing your actions, output plain text directly - do NOT use cat or bash to display what you did".to_string(),
            );
        }

        guidelines.push("Be concise in your responses".to_string());
        guidelines.push("Show file paths clearly when working with files".to_string());
        guidelines.push("Think step by step, but keep the thought process internal".to_string());
        guidelines.push("If you need a tool that doesn't exist, consider writing it yourself".to_string());

        let mut lines = vec!["Guidelines:".to_string()];
        for g in guidelines {
            lines.push(format!("- {g}"));
        }
        lines.join("\n")
    }

    fn docs_section(&self) -> String {
        let docs_path = self.options.docs_path.clone().unwrap_or_else(|| "./docs".to_string());
        format!(
            "Framework documentation (read only when the user asks about the framework itself, extensions, or internals):\n- Main documentation: {docs_path}/README.md\n- API reference: {docs_path}/API.md\n- Architecture: {docs_path}/ARCHITECTURE.md\n- Tutorial: {docs_path}/TUTORIAL.md\n\nWhen working on framework topics, read the docs and follow cross-references before implementing."
        )
    }

    fn context_section(&self) -> String {
        let mut lines = vec!["# Project Context".to_string(), String::new(), "Project-specific instructions and guidelines:".to_string(), String::new()];
        for cf in &self.options.context_files {
            lines.push(format!("## {}", cf.path));
            lines.push(String::new());
            lines.push(cf.content.clone());
            lines.push(String::new());
        }
        lines.join("\n")
    }

    fn skills_section(&self) -> String {
        let mut lines = vec!["# Skills".to_string(), String::new(), "When relevant, follow these skill instructions:".to_string(), String::new()];
        for skill in &self.options.skills {
            lines.push(format!("## {}", skill.name));
            lines.push(String::new());
            lines.push(format!("Use when: {}", skill.description));
            lines.push(String::new());
            lines.push(skill.content.clone());
            lines.push(String::new());
        }
        lines.join("\n")
    }

    fn environment_section(&self) -> String {
        format!("Current date and time: {}\nCurrent working directory: {}", Self::datetime(), self.cwd_display())
    }

    fn cwd_display(&self) -> String {
        self.options
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string())
    }

    fn datetime() -> String {
        Local::now().format("%A, %B %d, %Y at %I:%M:%S %p %Z").to_string()
    }

    pub fn for_task(task_description: &str, tools: Option<Vec<String>>, cwd: Option<PathBuf>) -> Self {
        Self::new(PromptOptions {
            selected_tools: tools,
            append_prompt: Some(format!("\nYour current task: {task_description}")),
            cwd,
            ..Default::default()
        })
    }

    pub fn for_extension_writing(extension_capability: &str, cwd: Option<PathBuf>, docs_path: Option<String>) -> Self {
        Self::new(PromptOptions {
            selected_tools: Some(vec!["read".to_string(), "write".to_string(), "edit".to_string(), "bash".to_string()]),
            append_prompt: Some(format!(
                "\nYou are writing an extension to enable: {extension_capability}\n\nExtension requirements:\n1. Expose a public type implementing the execute(args) capability\n2. Handle errors gracefully, returning Result rather than panicking\n3. Return a structured success/error payload\n4. Include doc comments\n5. Be self-contained\n\nRead the framework documentation before implementing."
            )),
            cwd,
            docs_path,
            ..Default::default()
        })
    }

    pub fn with_agents_md(agents_md_path: &Path, tools: Option<Vec<String>>) -> std::io::Result<Self> {
        let mut context_files = Vec::new();
        if agents_md_path.exists() {
            let content = std::fs::read_to_string(agents_md_path)?;
            context_files.push(ContextFile {
                path: "AGENTS.md".to_string(),
                content,
            });
        }
        Ok(Self::new(PromptOptions {
            selected_tools: tools,
            context_files,
            cwd: agents_md_path.parent().map(Path::to_path_buf),
            ..Default::default()
        }))
    }
}

/// Per-iteration user prompt: the task plus, from the second iteration
/// onward, a hint that previous attempts had issues.
pub fn iteration_user_prompt(task_prompt: &str, iteration: u32) -> String {
    if iteration <= 1 {
        task_prompt.to_string()
    } else {
        format!("{task_prompt}\n\n(This is iteration {iteration}. Previous attempts had issues — review the repair context carefully.)")
    }
}
