// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{name}` placeholder substitution for agent prompt templates,
//! backed by `handlebars` in strict mode.
//!
//! `{identifier}` occurrences are rewritten to Handlebars' `{{identifier}}`
//! syntax before rendering, so a missing input surfaces as a `validation`
//! error, while still routing through a real templating crate rather than
//! hand-rolled string splitting.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

/// A compiled `{name}`-style prompt template.
pub struct PromptTemplate {
    handlebars_source: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            handlebars_source: to_handlebars_syntax(&template.into()),
        }
    }

    /// Renders the template against `inputs`. A placeholder with no
    /// matching entry in `inputs` is a `validation` error.
    pub fn render(&self, inputs: &HashMap<String, Value>) -> Result<String> {
        let mut engine = handlebars::Handlebars::new();
        engine.set_strict_mode(true);
        engine
            .render_template(&self.handlebars_source, inputs)
            .map_err(|err| {
                Error::validation(format!(
                    "missing or invalid template input: {err}"
                ))
            })
    }
}

/// Rewrites `{identifier}` to `{{identifier}}`, leaving any already-doubled
/// braces (`{{`, `}}`) untouched.
fn to_handlebars_syntax(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' {
            if chars.get(i + 1) == Some(&'{') {
                // Already Handlebars syntax; copy through untouched until
                // the matching `}}`.
                out.push('{');
                out.push('{');
                i += 2;
                while i < chars.len() && !(chars[i] == '}' && chars.get(i + 1) == Some(&'}')) {
                    out.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    out.push('}');
                    out.push('}');
                    i += 2;
                }
                continue;
            }
            // Look for a matching single `}` bounding an identifier.
            if let Some(close) = chars[i + 1..].iter().position(|&c| c == '}') {
                let ident: String = chars[i + 1..i + 1 + close].iter().collect();
                if is_identifier(&ident) {
                    out.push_str("{{");
                    out.push_str(&ident);
                    out.push_str("}}");
                    i += close + 2;
                    continue;
                }
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
