use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// Process-wide, read-only settings. Built once at startup and shared by all
/// handlers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub puppetdb: PuppetDbSettings,
    pub default_environment: String,
    pub enable_catalog: bool,
    pub normal_table_count: u64,
    pub unresponsive_hours: u64,
    pub inventory_facts: Vec<InventoryFact>,
    pub inventory_fact_templates: FactTemplates,
    pub server_side_queries: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuppetDbSettings {
    pub proto: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl PuppetDbSettings {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.proto, self.host, self.port)
    }
}

impl Default for PuppetDbSettings {
    fn default() -> Self {
        PuppetDbSettings {
            proto: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            timeout: Duration::from_secs(20),
        }
    }
}

/// A column of the inventory table: header label and the fact it shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryFact {
    pub label: String,
    pub name: String,
}

impl InventoryFact {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        InventoryFact {
            label: label.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for InventoryFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.name)
    }
}

pub fn default_inventory_facts() -> Vec<InventoryFact> {
    vec![
        InventoryFact::new("Hostname", "fqdn"),
        InventoryFact::new("IP Address", "ipaddress"),
        InventoryFact::new("OS", "lsbdistdescription"),
        InventoryFact::new("Architecture", "hardwaremodel"),
        InventoryFact::new("Kernel Version", "kernelrelease"),
        InventoryFact::new("Puppet Version", "puppetversion"),
    ]
}

/// Parses `label:fact`. The label may not contain `:`; the fact name may.
pub fn parse_inventory_fact(value: &str) -> Result<InventoryFact, String> {
    let (label, name) = value
        .split_once(':')
        .ok_or_else(|| format!("expected `label:fact`, got `{value}`"))?;
    let (label, name) = (label.trim(), name.trim());
    if label.is_empty() || name.is_empty() {
        return Err(format!("expected `label:fact`, got `{value}`"));
    }
    Ok(InventoryFact::new(label, name))
}

/// Per-fact display templates for the inventory table.
///
/// A template is HTML with `{{value}}` and `{{current_env}}` placeholders;
/// whitespace inside the braces is allowed. Every rendered cell is markup:
/// substituted values and untemplated facts are HTML-escaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactTemplates(HashMap<String, String>);

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(value|current_env)\s*\}\}").expect("placeholder pattern is valid")
});

impl FactTemplates {
    pub fn new(templates: HashMap<String, String>) -> Self {
        FactTemplates(templates)
    }

    pub fn get(&self, fact_name: &str) -> Option<&str> {
        self.0.get(fact_name).map(String::as_str)
    }

    /// Renders a raw fact value for display. Facts without a template are
    /// shown as their escaped string form.
    ///
    /// Placeholders are replaced in a single pass over the template, so
    /// placeholder text inside a fact value is never expanded.
    pub fn render(&self, fact_name: &str, raw: &Value, current_env: &str) -> String {
        let value = escape_html(&fact_value_to_string(raw));
        match self.get(fact_name) {
            None => value,
            Some(template) => {
                let env = escape_html(current_env);
                PLACEHOLDER
                    .replace_all(template, |caps: &Captures| match &caps[1] {
                        "value" => value.clone(),
                        _ => env.clone(),
                    })
                    .into_owned()
            }
        }
    }
}

/// Parses a JSON object mapping fact names to display templates.
pub fn parse_fact_templates(value: &str) -> Result<FactTemplates, String> {
    serde_json::from_str::<HashMap<String, String>>(value)
        .map(FactTemplates::new)
        .map_err(|err| format!("expected a JSON object of fact templates: {err}"))
}

pub fn fact_value_to_string(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            puppetdb: PuppetDbSettings::default(),
            default_environment: "production".to_string(),
            enable_catalog: false,
            normal_table_count: 100,
            unresponsive_hours: 2,
            inventory_facts: default_inventory_facts(),
            inventory_fact_templates: FactTemplates::default(),
            server_side_queries: false,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn inventory_fact_names(&self) -> Vec<String> {
        self.inventory_facts.iter().map(|f| f.name.clone()).collect()
    }

    pub fn inventory_fact_labels(&self) -> Vec<String> {
        self.inventory_facts.iter().map(|f| f.label.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_label_and_fact() {
        let fact = parse_inventory_fact("IP Address:ipaddress").unwrap();
        assert_eq!(fact, InventoryFact::new("IP Address", "ipaddress"));
        assert!(parse_inventory_fact("no-separator").is_err());
        assert!(parse_inventory_fact(":fqdn").is_err());
    }

    #[test]
    fn renders_template_with_value_and_env() {
        let templates =
            parse_fact_templates(r#"{"fqdn": "<a href=\"/{{ current_env }}/node/{{value}}\">{{value}}</a>"}"#)
                .unwrap();
        let rendered = templates.render("fqdn", &json!("web01"), "production");
        assert_eq!(rendered, "<a href=\"/production/node/web01\">web01</a>");
    }

    #[test]
    fn escapes_substituted_values() {
        let templates = parse_fact_templates(r#"{"motd": "<b>{{value}}</b>"}"#).unwrap();
        let rendered = templates.render("motd", &json!("<script>"), "*");
        assert_eq!(rendered, "<b>&lt;script&gt;</b>");
    }

    #[test]
    fn untemplated_values_are_stringified() {
        let templates = FactTemplates::default();
        assert_eq!(templates.render("os", &json!("linux"), "*"), "linux");
        assert_eq!(templates.render("cpus", &json!(4), "*"), "4");
        assert_eq!(templates.render("missing", &Value::Null, "*"), "");
        assert_eq!(
            templates.render("os", &json!({"family": "Debian"}), "*"),
            "{&#34;family&#34;:&#34;Debian&#34;}"
        );
    }

    #[test]
    fn untemplated_values_are_escaped() {
        let templates = FactTemplates::default();
        assert_eq!(
            templates.render("motd", &json!("<img src=x onerror=alert(1)>"), "*"),
            "&lt;img src=x onerror=alert(1)&gt;"
        );
    }

    #[test]
    fn placeholders_allow_any_inner_whitespace() {
        let templates = parse_fact_templates(
            r#"{"a": "OS: {{value }}", "b": "OS: {{  value  }}", "c": "{{\tcurrent_env}}/{{ value}}"}"#,
        )
        .unwrap();
        assert_eq!(templates.render("a", &json!("linux"), "*"), "OS: linux");
        assert_eq!(templates.render("b", &json!("linux"), "*"), "OS: linux");
        assert_eq!(templates.render("c", &json!("linux"), "staging"), "staging/linux");
    }

    #[test]
    fn placeholder_text_in_values_is_not_expanded() {
        let templates = parse_fact_templates(r#"{"motd": "{{value}} in {{current_env}}"}"#).unwrap();
        assert_eq!(
            templates.render("motd", &json!("x{{current_env}}y"), "production"),
            "x{{current_env}}y in production"
        );
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let templates = parse_fact_templates(r#"{"os": "{{ other }} {{value}}"}"#).unwrap();
        assert_eq!(templates.render("os", &json!("linux"), "*"), "{{ other }} linux");
    }

    #[test]
    fn rejects_non_object_templates() {
        assert!(parse_fact_templates("[1, 2]").is_err());
    }
}
