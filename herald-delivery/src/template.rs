//! Template resolution and `{{var}}` substitution.
//!
//! Unresolved placeholders are left literal in the output: a
//! `{{first_name}}` reaching a customer inbox is an incident you can see
//! and grep for, a silently blanked one is not.

use ahash::AHashMap;
use parking_lot::RwLock;

/// A stored message template. Any of the three parts may be absent; the
/// request's own fields take precedence over template parts.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
}

/// Source of templates, keyed by template identifier.
pub trait TemplateStore: Send + Sync {
    fn resolve(&self, key: &str) -> Option<EmailTemplate>;
}

/// In-memory template store for tests and embedders without a backing
/// database.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<AHashMap<String, EmailTemplate>>,
}

impl MemoryTemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, template: EmailTemplate) {
        self.templates.write().insert(key.into(), template);
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn resolve(&self, key: &str) -> Option<EmailTemplate> {
        self.templates.read().get(key).cloned()
    }
}

/// Substitutes `{{name}}` placeholders from `variables`.
///
/// Placeholder names are trimmed, so `{{ name }}` and `{{name}}` are
/// equivalent. Names with no matching variable stay exactly as written.
#[must_use]
pub fn render(template: &str, variables: &AHashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        match after_open.find("}}") {
            Some(end) => {
                let name = after_open[..end].trim();
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after_open[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit as-is
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
