//! Task analysis and plan generation on top of a context packet.
//!
//! The crate owns the prompts and the post-processing of model output; the
//! model itself is supplied by the caller through [`LanguageModel`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::TreeRootsResult;

/// Text-generation collaborator.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str) -> TreeRootsResult<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    pub files_to_modify: Vec<String>,
    pub blast_radius: Vec<String>,
    pub actions: Vec<String>,
    pub dependencies: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task: String,
    pub semantic_matches: usize,
    pub related_files: Vec<String>,
    /// Raw model output.
    pub analysis: String,
    pub structured: StructuredAnalysis,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn build_analysis_prompt(task: &str, xml_context: &str) -> String {
    format!(
        "You are a senior software engineer analyzing a codebase. Based on the user's request \
below, provide actionable insights about what needs to be modified, the blast radius, and \
step-by-step actions.

USER REQUEST:
{task}

CODEBASE CONTEXT:
{xml_context}

Based on the semantic search results and graph relationships above, analyze the user's request \
and provide a comprehensive analysis in the following format:

## Files to Modify
[List the specific files that need to be changed, ordered by priority]

## Blast Radius
[Identify all files that will be affected by these changes, including:
- Direct dependencies (files that import the modified files)
- Indirect dependencies (files that depend on the dependents)
- Callers (functions that call modified functions)
- Callees (functions called by modified code)]

## Step-by-Step Actions
[Provide a numbered list of specific actions needed to complete this task]

## Dependencies to Consider
[List any external dependencies, imports, or relationships that need attention]

## Risks & Breaking Changes
[Identify potential breaking changes, test files that need updates, and areas of risk]

## Additional Context
[Any other relevant insights about the codebase structure or relationships]

Be specific and actionable. Reference actual file paths and function names from the context \
provided.
"
    )
}

pub const DEFAULT_PLAN_TEMPLATE: &str = r#"You are a senior software engineer creating a detailed execution plan for AI coding tools.

TASK:
{task}

CODEBASE CONTEXT:
{xml_context}

STATISTICS:
- Found {semantic_matches_count} semantically relevant code definitions
- Identified {related_files_count} related files through graph traversal

Generate a comprehensive execution plan in XML format. The plan should be:
1. Highly detailed with specific code references
2. Ordered by dependencies (prerequisites first)
3. Include validation criteria for each step
4. Include rollback instructions

Follow this XML structure exactly:

<execution_plan>
  <task>
    <title>[Task Title]</title>
    <description>[Task Description]</description>
    <estimated_effort>[low|medium|high]</estimated_effort>
  </task>
  <context>
    <relevant_files>
      <file path="[path]" reason="[reason]"/>
    </relevant_files>
  </context>
  <phases>
    <phase id="1" name="[Phase Name]">
      <step id="1.1" order="1">
        <title>[Step Title]</title>
        <description>[Step Description]</description>
        <files>
          <create path="[path]"/>
          <modify path="[path]" action="[action]"/>
        </files>
        <code_references>
          <reference file="[path]" function="[name]"/>
        </code_references>
        <instructions>
          <instruction>[Detailed instruction]</instruction>
        </instructions>
        <validation>
          <check>[Validation check]</check>
        </validation>
      </step>
    </phase>
  </phases>
  <impact_analysis>
    <affected_files>
      <file path="[path]" impact="[direct|indirect]" reason="[reason]"/>
    </affected_files>
  </impact_analysis>
  <rollback>
    <step>[Rollback instruction]</step>
  </rollback>
</execution_plan>

Output ONLY valid XML. Do not include markdown formatting.
"#;

/// Load a custom plan template, falling back to the default when the file
/// is missing or unreadable.
pub fn load_plan_template(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_PLAN_TEMPLATE.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(template) => template,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "plan template unreadable, using default");
            DEFAULT_PLAN_TEMPLATE.to_string()
        }
    }
}

/// Fill the four plan placeholders. The substituted values are inserted
/// verbatim in one pass, so braces inside the context are left alone.
pub fn render_plan_prompt(
    template: &str,
    task: &str,
    xml_context: &str,
    semantic_matches_count: usize,
    related_files_count: usize,
) -> String {
    let matches = semantic_matches_count.to_string();
    let related = related_files_count.to_string();
    let placeholders: [(&str, &str); 4] = [
        ("{task}", task),
        ("{xml_context}", xml_context),
        ("{semantic_matches_count}", &matches),
        ("{related_files_count}", &related),
    ];

    let mut out = String::with_capacity(template.len() + xml_context.len());
    let mut rest = template;
    'scan: while let Some(open) = rest.find('{') {
        for (key, value) in &placeholders {
            if rest[open..].starts_with(key) {
                out.push_str(&rest[..open]);
                out.push_str(value);
                rest = &rest[open + key.len()..];
                continue 'scan;
            }
        }
        out.push_str(&rest[..=open]);
        rest = &rest[open + 1..];
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Section {
    Files,
    BlastRadius,
    Actions,
    Dependencies,
    Risks,
}

fn section_for(heading: &str) -> Option<Section> {
    if heading.starts_with("## Files to Modify") {
        Some(Section::Files)
    } else if heading.starts_with("## Blast Radius") {
        Some(Section::BlastRadius)
    } else if heading.starts_with("## Step-by-Step Actions") {
        Some(Section::Actions)
    } else if heading.starts_with("## Dependencies") {
        Some(Section::Dependencies)
    } else if heading.starts_with("## Risks") {
        Some(Section::Risks)
    } else {
        None
    }
}

/// Strip one leading `- `, `* `, or `N. ` list marker.
fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return rest.trim();
    }
    if line.starts_with(|c: char| c.is_ascii_digit()) {
        if let Some((_, rest)) = line.split_once(". ") {
            return rest.trim();
        }
    }
    line
}

/// Pull the `## ` sections of an analysis into lists.
pub fn extract_structured(analysis: &str) -> StructuredAnalysis {
    let mut structured = StructuredAnalysis::default();
    let mut current: Option<Section> = None;
    for raw in analysis.lines() {
        let line = raw.trim();
        if line.starts_with("##") {
            current = section_for(line);
            continue;
        }
        let Some(section) = current else {
            continue;
        };
        let content = strip_list_marker(line);
        if content.is_empty() {
            continue;
        }
        let target = match section {
            Section::Files => &mut structured.files_to_modify,
            Section::BlastRadius => &mut structured.blast_radius,
            Section::Actions => &mut structured.actions,
            Section::Dependencies => &mut structured.dependencies,
            Section::Risks => &mut structured.risks,
        };
        target.push(content.to_string());
    }
    structured
}

/// Remove a surrounding ```` ```xml ```` / ```` ``` ```` fence.
pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```xml") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
