// ABOUTME: Placeholder rendering for migration SQL
// ABOUTME: Substitutes {{name}} variables without HTML-escaping the output

use crate::error::{MigrationError, Result};
use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use std::collections::BTreeMap;

/// Flat mapping of template variable names to values
pub type TemplateVars = BTreeMap<String, serde_json::Value>;

/// Renders `{{name}}` placeholders in migration files
///
/// Output is never escaped, so quotes in variable values reach ClickHouse
/// as written. Unknown variables render as an empty string. Only `{{ }}` is
/// template syntax: block and comment tags use `{%% %%}` and `{## ##}` so
/// that `{%` and `{#` in SQL (regex quantifiers, string literals) stay text.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_syntax(
            SyntaxConfig::builder()
                .block_delimiters("{%%", "%%}")
                .comment_delimiters("{##", "##}")
                .build()
                .expect("valid template delimiters"),
        );
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render `content`, attributing failures to `migration`
    pub fn render(&self, migration: &str, content: &str, vars: &TemplateVars) -> Result<String> {
        self.env
            .render_str(content, vars)
            .map_err(|e| MigrationError::Template {
                migration: migration.to_string(),
                message: e.to_string(),
            })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a single template with a throwaway renderer
///
/// # Examples
///
/// ```
/// # use clickhouse_migrator::migration::{render_template, TemplateVars};
/// let mut vars = TemplateVars::new();
/// vars.insert("ttl".to_string(), serde_json::json!(30));
/// let sql = render_template("ALTER TABLE t MODIFY TTL d + INTERVAL {{ttl}} DAY", &vars).unwrap();
/// assert_eq!(sql, "ALTER TABLE t MODIFY TTL d + INTERVAL 30 DAY");
/// ```
pub fn render_template(content: &str, vars: &TemplateVars) -> Result<String> {
    TemplateRenderer::new().render("<inline>", content, vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_keeps_sql_quotes_in_templated_options() {
        let rendered = render_template(
            "CREATE TABLE t {{create_table_options}} (id UInt8)",
            &vars(&[("create_table_options", json!("ON CLUSTER \"default\""))]),
        )
        .unwrap();

        assert_eq!(rendered, "CREATE TABLE t ON CLUSTER \"default\" (id UInt8)");
        assert!(!rendered.contains("&quot;"));
    }

    #[test]
    fn test_keeps_single_quotes_and_ampersands() {
        let rendered = render_template(
            "SELECT {{expr}}",
            &vars(&[("expr", json!("'a' || '<b>' & 1"))]),
        )
        .unwrap();
        assert_eq!(rendered, "SELECT 'a' || '<b>' & 1");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let rendered = render_template("CREATE TABLE t {{missing}}(x UInt8)", &TemplateVars::new())
            .unwrap();
        assert_eq!(rendered, "CREATE TABLE t (x UInt8)");
    }

    #[test]
    fn test_non_string_values_use_display_form() {
        let rendered = render_template(
            "TTL {{days}} {{flag}}",
            &vars(&[("days", json!(30)), ("flag", json!(true))]),
        )
        .unwrap();
        assert_eq!(rendered, "TTL 30 true");
    }

    #[test]
    fn test_trailing_newline_is_preserved() {
        let rendered = render_template("SELECT 1;\n", &TemplateVars::new()).unwrap();
        assert_eq!(rendered, "SELECT 1;\n");
    }

    #[test]
    fn test_text_without_placeholders_is_unchanged() {
        let sql = "-- comment\nSELECT \"a\", 'b' FROM t;";
        assert_eq!(render_template(sql, &TemplateVars::new()).unwrap(), sql);
    }

    #[test]
    fn test_jinja_block_and_comment_openers_are_plain_sql() {
        let sql = "SELECT match(s, '^[0-9]{#}'), '{%x', '#}', '%}' FROM {{table}}";
        let rendered = render_template(sql, &vars(&[("table", json!("events"))])).unwrap();
        assert_eq!(
            rendered,
            "SELECT match(s, '^[0-9]{#}'), '{%x', '#}', '%}' FROM events"
        );
    }

    #[test]
    fn test_broken_template_names_migration() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("001_init", "SELECT {{ unclosed", &TemplateVars::new());
        match result {
            Err(MigrationError::Template { migration, .. }) => assert_eq!(migration, "001_init"),
            other => panic!("expected template error, got {:?}", other),
        }
    }
}
