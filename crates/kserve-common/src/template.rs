//! Domain and path template rendering
//!
//! Templates in the ingress configuration use Go template field syntax
//! (`{{ .Name }}-{{ .Namespace }}.{{ .IngressDomain }}`) and `index` lookups
//! into annotations and labels (`{{ index .Annotations "team" }}`). They are
//! normalized to minijinja syntax before rendering, with strict undefined
//! handling so a typo in a field name fails instead of rendering empty.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::Error;

/// Maximum length of a DNS-1123 subdomain
const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

/// Values available to domain and path templates
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateValues {
    /// Object name (InferenceService or component)
    pub name: String,
    /// Namespace of the InferenceService
    pub namespace: String,
    /// Configured ingress domain
    pub ingress_domain: String,
    /// InferenceService annotations
    pub annotations: BTreeMap<String, String>,
    /// InferenceService labels
    pub labels: BTreeMap<String, String>,
}

/// Renders ingress templates
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create an engine with strict undefined handling
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render a template against the given values
    pub fn render(&self, template: &str, values: &TemplateValues) -> Result<String, Error> {
        let normalized = normalize_go_template(template);
        self.env
            .render_str(&normalized, values)
            .map_err(|e| Error::config("ingress", format!("invalid template '{template}': {e}")))
    }

    /// Render a domain template and check the result is a DNS-1123 subdomain
    pub fn render_domain(&self, template: &str, values: &TemplateValues) -> Result<String, Error> {
        let domain = self.render(template, values)?;
        validate_dns1123_subdomain(&domain).map_err(|msg| {
            Error::config(
                "ingress",
                format!("domain '{domain}' rendered from '{template}' is invalid: {msg}"),
            )
        })?;
        Ok(domain)
    }
}

/// Rewrite Go template expressions (`{{ .Name }}`, `{{ index .Labels "k" }}`)
/// as minijinja expressions
fn normalize_go_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let expr = after[..end].trim();
                out.push_str("{{ ");
                out.push_str(&normalize_expr(expr));
                out.push_str(" }}");
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn normalize_expr(expr: &str) -> String {
    let mut tokens = expr.split_whitespace();
    if tokens.next() == Some("index") {
        if let Some(target) = tokens.next() {
            let mut out = field(target).to_string();
            for key in tokens {
                out.push('[');
                out.push_str(&string_literal(key));
                out.push(']');
            }
            return out;
        }
    }
    field(expr).to_string()
}

fn field(expr: &str) -> &str {
    expr.strip_prefix('.').unwrap_or(expr)
}

/// Go raw strings (`` `k` ``) become quoted strings; other tokens pass through
fn string_literal(token: &str) -> String {
    match token.strip_prefix('`').and_then(|t| t.strip_suffix('`')) {
        Some(raw) => serde_json::Value::String(raw.to_string()).to_string(),
        None => token.to_string(),
    }
}

/// Check a name against RFC 1123 subdomain rules
pub fn validate_dns1123_subdomain(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        return Err(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LEN} characters"
        ));
    }
    for label in value.split('.') {
        let valid_chars = label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        let alnum_edges = label
            .chars()
            .next()
            .zip(label.chars().last())
            .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());
        if !valid_chars || !alnum_edges {
            return Err(
                "must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character"
                    .to_string(),
            );
        }
    }
    Ok(())
}
