//! GBNF grammar helpers for constrained decoding.
//!
//! [`multiple_choice_grammar`] generates a grammar that restricts model
//! output to a fixed set of literal answers, optionally preceded by a
//! thinking block so reasoning models can deliberate before committing to
//! a choice. The generated `.gbnf` file is passed to llama-server via the
//! `grammar` request field (see [`crate::client::ChatRequest::grammar`]).

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

static RULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

// Opening/closing sentinel pairs for the two thinking conventions the
// grammar accepts: Harmony-style channels and <think> tags.
const HARMONY_THINK_START: &str = "<|channel|>analysis<|message|>";
const HARMONY_THINK_END: &str = "<|end|><|start|>assistant<|channel|>final<|message|>";
const TAGGED_THINK_START: &str = "<think>";
const TAGGED_THINK_END: &str = "</think>";

/// Errors from grammar generation and loading.
#[derive(Debug, Error)]
pub enum GrammarError {
    /// The choice set was empty.
    #[error("choices must be non-empty")]
    EmptyChoices,

    /// The rule name is not a valid GBNF identifier.
    #[error("'{name}' is not a valid rule identifier")]
    InvalidRuleName { name: String },

    /// Reading or writing the grammar file failed.
    #[error("grammar file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Escape a choice literal for embedding in a GBNF terminal.
///
/// Backslashes are escaped first so the later replacements cannot be
/// double-escaped.
fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

/// Generate a grammar enumerating `choices` and save it under `save_dir`.
///
/// The grammar's root expands to a rule named `name` whose alternation
/// lists every choice as an escaped quoted terminal, in order. With
/// `thinking` enabled the root first accepts a thinking block (either
/// sentinel convention, any characters except `<` inside), and the file is
/// prefixed `thinking_`.
///
/// The target directory is created recursively if absent; an existing file
/// is overwritten silently. Returns the grammar text.
///
/// Fails with [`GrammarError::EmptyChoices`] or
/// [`GrammarError::InvalidRuleName`] before anything is written.
pub fn multiple_choice_grammar<S: AsRef<str>>(
    choices: &[S],
    save_dir: impl AsRef<Path>,
    name: &str,
    thinking: bool,
) -> Result<String, GrammarError> {
    if choices.is_empty() {
        return Err(GrammarError::EmptyChoices);
    }
    if !RULE_NAME_RE.is_match(name) {
        return Err(GrammarError::InvalidRuleName {
            name: name.to_string(),
        });
    }

    let alts = choices
        .iter()
        .map(|c| format!("\"{}\"", escape_literal(c.as_ref())))
        .collect::<Vec<_>>()
        .join(" | ");

    let (content, filename) = if thinking {
        (
            format!(
                "root ::=  thinkingBlock {name}\n\
                 thinkingBlock ::= thinkingStart anychar* thinkingEnd\n\
                 thinkingStart ::= \"{HARMONY_THINK_START}\" | \"{TAGGED_THINK_START}\"\n\
                 thinkingEnd ::= \"{HARMONY_THINK_END}\\n\" | \"{TAGGED_THINK_END}\\n\"\n\
                 {name} ::= {alts}\n\
                 anychar ::= [^<]\n"
            ),
            format!("thinking_{name}.gbnf"),
        )
    } else {
        (
            format!("root ::=  {name}\n{name} ::= {alts}\n"),
            format!("{name}.gbnf"),
        )
    };

    let dir = save_dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, &content)?;
    debug!("wrote grammar to {}", path.display());

    Ok(content)
}

/// Load a `.gbnf` grammar file into a string.
pub fn load_grammar(path: impl AsRef<Path>) -> Result<String, GrammarError> {
    Ok(fs::read_to_string(path)?)
}

/// Strip a thinking envelope from a model response, returning the final
/// answer.
///
/// Everything through the last closing sentinel (either convention) is
/// dropped; a response without one is returned trimmed.
pub fn strip_thinking(response: &str) -> &str {
    for marker in [HARMONY_THINK_END, TAGGED_THINK_END] {
        if let Some(idx) = response.rfind(marker) {
            return response[idx + marker.len()..].trim();
        }
    }
    response.trim()
}
