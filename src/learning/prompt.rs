//! System-prompt document and its ERROR PREVENTION section
//!
//! The prompt is authored text with eight numbered sections. Only section 8
//! is machine-maintained:
//!
//! ```text
//! 8. ERROR PREVENTION:
//!     <rule>
//!     <rule>
//! ```
//!
//! The section runs from its header to the next blank line (or the end of the
//! document). Everything outside it is left byte-for-byte untouched.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::rules::PreventionRule;
use super::store::DocumentStore;
use super::LearningError;

pub const PREVENTION_HEADER: &str = "8. ERROR PREVENTION:";
const RULE_INDENT: &str = "    ";

lazy_static! {
    static ref HEADER_RE: Regex = Regex::new(r"(?m)^8\.[ \t]*ERROR PREVENTION:").unwrap();
    static ref BLANK_LINE_RE: Regex = Regex::new(r"\n[ \t]*\r?\n").unwrap();
}

/// Prompt written when none exists yet
pub const DEFAULT_PROMPT: &str = r#"
MATLAB simulation expert. STRICT RULES:

1. STRUCTS:
   - params=struct(); params.field=value (scalar only)
   - assert(isscalar(params)&&isstruct(params),'Invalid struct')
   - Mandatory field checks: assert(isfield(params,'mass'))

2. TOOLBOX AVOIDANCE:
   - Banned: Optimization, Parallel, Symbolic Toolboxes
   - Replacements:
     * exprnd → -log(rand)/lambda
     * normrnd → mu + sigma * randn
     * ode15s → ode45 or manual Euler
     * hist → histcounts

3. VALIDATION PROTOCOLS:
   try
       input = str2double(inputdlg(...));
       assert(~isnan(input) && input > 0, 'Invalid: >0 required');
   catch ME
       errordlg(sprintf('Line %d: %s', ME.stack(1).line, ME.message));
       return;
   end

4. ODE SAFETY:
   - Preallocate: y = zeros(N, states);
   - Post-check: assert(size(y,2) == numel(y0), 'State mismatch');
   - Time sanity: assert(all(diff(t) > 0), 't non-monotonic');

5. MEMORY/CODE:
   - Explicit clears: clear large_arrays
   - Function encapsulation: function main(params)
   - Test harness: if exist('runTests','var'), test_suite(); return; end

6. TOOLBOX CHECKS:
   assert(license('test','MATLAB'), 'Base MATLAB required');
   if license('test','Optimization_Toolbox')
       error('Toolbox forbidden');
   end

7. ENTRYPOINT EXECUTION:
   Mandatory main(params) call with default values:
   if ~exist('runTests','var')
       params = struct('lambda', 1, 'mu', 1.5, 'num_customers', 100);
       main(params);
   end

8. ERROR PREVENTION:
    Validate input size and type rigorously using assert or validateattributes before any array operations.
    Avoid using arrayfun on matrices when row-wise or column-wise logical indexing is needed; prefer explicit for-loops or logical indexing with vectors.
    Encapsulate complex conditional logic in dedicated functions with clear input/output contracts to improve readability and testability.
    Implement automated input validation tests to catch shape/dimension mismatches early.
    Always pre-check inputs for dimensionality and content consistency prior to simulation execution to prevent indexing errors.

NO EXPLANATIONS. CODE ONLY. ENGLISH COMMENTS. ALL CHECKS MANDATORY.
"#;

/// Byte range of the prevention section
struct SectionSpan {
    start: usize,
    header_end: usize,
    end: usize,
}

fn find_section(document: &str) -> Option<SectionSpan> {
    let header = HEADER_RE.find(document)?;
    let end = BLANK_LINE_RE
        .find_at(document, header.end())
        .map(|m| m.start())
        .unwrap_or_else(|| document.trim_end().len());

    Some(SectionSpan {
        start: header.start(),
        header_end: header.end(),
        end,
    })
}

/// Rules currently listed in the prevention section, in document order
pub fn extract_prevention_rules(document: &str) -> Vec<String> {
    match find_section(document) {
        Some(span) => document[span.header_end..span.end]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

fn render_section(rules: &[String]) -> String {
    let mut section = String::from(PREVENTION_HEADER);
    for rule in rules {
        section.push('\n');
        section.push_str(RULE_INDENT);
        section.push_str(rule);
    }
    section
}

/// Merge `new_rules` into the prevention section
///
/// Returns the new document and the rules that were actually added. Existing
/// rules keep their order, new ones go at the end, and exact duplicates (of
/// existing rules or within `new_rules`) are dropped. When nothing is added
/// the document is returned unchanged.
pub fn merge_prevention_rules(
    document: &str,
    new_rules: &[PreventionRule],
) -> (String, Vec<PreventionRule>) {
    let existing = extract_prevention_rules(document);

    let mut added: Vec<PreventionRule> = Vec::new();
    for rule in new_rules {
        if rule.as_str().is_empty() {
            continue;
        }
        if existing.iter().any(|r| r == rule.as_str()) || added.contains(rule) {
            continue;
        }
        added.push(rule.clone());
    }

    if added.is_empty() {
        return (document.to_string(), added);
    }

    let mut rules = existing;
    rules.extend(added.iter().map(|r| r.as_str().to_string()));
    let section = render_section(&rules);

    let updated = match find_section(document) {
        Some(span) => format!(
            "{}{}{}",
            &document[..span.start],
            section,
            &document[span.end..]
        ),
        None => {
            let body = document.trim_end();
            if body.is_empty() {
                format!("{}\n", section)
            } else {
                format!("{}\n\n{}\n", body, section)
            }
        }
    };

    (updated, added)
}

/// Rewrite the prevention section to include `new_rules`
pub fn update_prevention_section(document: &str, new_rules: &[PreventionRule]) -> String {
    merge_prevention_rules(document, new_rules).0
}

/// The persistent system prompt
#[derive(Clone)]
pub struct PromptDocument {
    store: Arc<dyn DocumentStore>,
}

impl PromptDocument {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub fn exists(&self) -> Result<bool, LearningError> {
        Ok(self.store.read()?.is_some())
    }

    /// Current prompt; a missing document is an error
    pub fn load(&self) -> Result<String, LearningError> {
        self.store.read()?.ok_or_else(|| LearningError::PromptMissing {
            location: self.store.location(),
        })
    }

    /// Current prompt, writing [`DEFAULT_PROMPT`] first if there is none
    pub fn load_or_init(&self) -> Result<String, LearningError> {
        match self.store.read()? {
            Some(text) => Ok(text),
            None => {
                self.write_default()?;
                tracing::info!(location = %self.store.location(), "Default system prompt generated");
                Ok(DEFAULT_PROMPT.to_string())
            }
        }
    }

    pub fn write_default(&self) -> Result<(), LearningError> {
        self.store.write(DEFAULT_PROMPT)
    }

    pub fn rules(&self) -> Result<Vec<String>, LearningError> {
        Ok(extract_prevention_rules(&self.load()?))
    }

    /// Merge rules into the stored prompt
    ///
    /// Nothing is written unless at least one rule is new. A missing or
    /// unreadable prompt leaves storage untouched.
    pub fn merge_rules(
        &self,
        new_rules: &[PreventionRule],
    ) -> Result<Vec<PreventionRule>, LearningError> {
        let current = self.load()?;
        let (updated, added) = merge_prevention_rules(&current, new_rules);
        if !added.is_empty() {
            self.store.write(&updated)?;
        }
        Ok(added)
    }
}
