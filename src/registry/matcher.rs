//! The command registry: registration, lookup, and typo suggestions
//!
//! Every name and alias shares one flat, case-insensitive key space.
//! A failed lookup falls back to edit distance over all registered
//! names; a close-enough candidate comes back as a suggestion, never
//! auto-executed.

use crate::registry::command::{CommandSpec, ParamKind};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registration failures. Both are startup bugs, not runtime conditions.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate command name or alias `{0}`")]
    DuplicateName(String),

    #[error("invalid argument schema for `{command}`: {message}")]
    InvalidSchema { command: String, message: String },
}

/// Resolution failures surfaced per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("empty invocation")]
    Empty,

    #[error("unknown command `{input}`")]
    Unknown {
        input: String,
        suggestion: Option<String>,
    },
}

/// Registry of command specs, keyed by lowercase name and alias.
pub struct CommandRegistry {
    commands: HashMap<String, Arc<CommandSpec>>,
    suggestion_distance: usize,
}

impl CommandRegistry {
    /// `suggestion_distance` is the maximum edit distance at which a
    /// near miss still produces a suggestion.
    #[must_use]
    pub fn new(suggestion_distance: usize) -> Self {
        Self {
            commands: HashMap::new(),
            suggestion_distance,
        }
    }

    /// Register a command under its name and all aliases.
    ///
    /// # Errors
    /// `DuplicateName` when the name or any alias collides with an
    /// existing entry (or with itself); `InvalidSchema` when a required
    /// parameter follows an optional one, or a rest parameter is not
    /// last.
    pub fn register(&mut self, spec: CommandSpec) -> Result<(), RegistryError> {
        validate_schema(&spec)?;

        let mut keys = Vec::with_capacity(1 + spec.aliases.len());
        keys.push(spec.name.to_lowercase());
        keys.extend(spec.aliases.iter().map(|alias| alias.to_lowercase()));

        for (index, key) in keys.iter().enumerate() {
            if key.is_empty() || self.commands.contains_key(key) || keys[..index].contains(key) {
                return Err(RegistryError::DuplicateName(key.clone()));
            }
        }

        let spec = Arc::new(spec);
        for key in keys {
            self.commands.insert(key, Arc::clone(&spec));
        }
        Ok(())
    }

    /// Split `text` into a command and its raw argument tail.
    ///
    /// Lookup is case-insensitive for both names and aliases. On a miss
    /// the closest registered name within the configured distance comes
    /// back as a suggestion.
    ///
    /// # Errors
    /// `Empty` for blank input, `Unknown` when nothing matches.
    pub fn resolve<'t>(&self, text: &'t str) -> Result<(Arc<CommandSpec>, &'t str), ResolveError> {
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return Err(ResolveError::Empty);
        }

        let (name, tail) = match trimmed.find(char::is_whitespace) {
            Some(boundary) => (&trimmed[..boundary], &trimmed[boundary..]),
            None => (trimmed, ""),
        };

        match self.commands.get(&name.to_lowercase()) {
            Some(spec) => Ok((Arc::clone(spec), tail)),
            None => Err(ResolveError::Unknown {
                input: name.to_owned(),
                suggestion: self.suggest(name),
            }),
        }
    }

    /// The closest registered name or alias within the configured edit
    /// distance. Ties go to the lexicographically smallest candidate.
    #[must_use]
    pub fn suggest(&self, input: &str) -> Option<String> {
        let input = input.to_lowercase();
        let mut best: Option<(usize, &str)> = None;

        for key in self.commands.keys() {
            let distance = edit_distance(&input, key);
            if distance > self.suggestion_distance {
                continue;
            }
            let closer = match best {
                None => true,
                Some((best_distance, best_key)) => {
                    distance < best_distance
                        || (distance == best_distance && key.as_str() < best_key)
                }
            };
            if closer {
                best = Some((distance, key));
            }
        }

        best.map(|(_, key)| key.to_owned())
    }

    /// All registered specs, deduplicated, sorted by name.
    #[must_use]
    pub fn specs(&self) -> Vec<Arc<CommandSpec>> {
        let mut seen: Vec<&str> = Vec::new();
        let mut specs: Vec<Arc<CommandSpec>> = Vec::new();
        for spec in self.commands.values() {
            if !seen.contains(&spec.name.as_str()) {
                seen.push(spec.name.as_str());
                specs.push(Arc::clone(spec));
            }
        }
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

fn validate_schema(spec: &CommandSpec) -> Result<(), RegistryError> {
    let invalid = |message: &str| RegistryError::InvalidSchema {
        command: spec.name.clone(),
        message: message.to_owned(),
    };

    let mut saw_optional = false;
    for (index, param) in spec.params.iter().enumerate() {
        if param.required && saw_optional {
            return Err(invalid("required parameter follows an optional one"));
        }
        if !param.required {
            saw_optional = true;
        }
        if param.kind == ParamKind::Rest && index + 1 != spec.params.len() {
            return Err(invalid("rest parameter must be last"));
        }
    }
    Ok(())
}

/// Levenshtein distance over chars, two rolling rows.
fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_ch) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, b_ch) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(a_ch != *b_ch);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}
