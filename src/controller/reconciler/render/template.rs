//! Template rendering for `*.yaml.template` files.
//!
//! Placeholders have the form `{{ .dotted.path }}` (`{{ . }}` is the whole
//! context). A placeholder that is the entire scalar of a line, such as
//! `replicas: {{ .app.replicas }}` or `- {{ .item }}`, is replaced by the
//! value itself in YAML flow form so numbers, booleans, lists and maps keep
//! their type. Any other placeholder is replaced by the value's string form.
//! Lines inside block scalars (`key: |`) always get the string form.

use super::RenderError;
use regex::Regex;
use serde_yaml::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*\.([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)?\s*-?\}\}").ok()
});

static STANDALONE_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:-\s+)*(?:[^\s"'#\-][^"'#]*:\s+)?$"#).ok());

static STANDALONE_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:#.*)?$").ok());

static BLOCK_SCALAR_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^\s*-|:)\s+[|>][-+0-9]*\s*(?:#.*)?$").ok());

/// Render `template` against `context` and parse the result as a YAML map
///
/// An empty result renders to an empty map.
pub fn render_template(path: &str, template: &str, context: &Value) -> Result<Value, RenderError> {
    let rendered = substitute(path, template, context)?;
    parse_map(path, &rendered)
}

/// Parse a document that must be a map; an empty document is an empty map
pub fn parse_map(path: &str, content: &str) -> Result<Value, RenderError> {
    let value: Value = serde_yaml::from_str(content).map_err(|source| RenderError::Parse {
        path: path.to_string(),
        source,
    })?;

    match value {
        Value::Null => Ok(Value::Mapping(serde_yaml::Mapping::new())),
        Value::Mapping(_) => Ok(value),
        _ => Err(RenderError::NotAMap {
            path: path.to_string(),
        }),
    }
}

/// Look up a dotted path; the empty path is the whole context
#[must_use]
pub fn lookup<'a>(context: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(context);
    }
    key.split('.')
        .try_fold(context, |current, segment| current.as_mapping()?.get(segment))
}

fn substitute(path: &str, template: &str, context: &Value) -> Result<String, RenderError> {
    let (Some(placeholder), Some(prefix_re), Some(suffix_re), Some(block_re)) = (
        PLACEHOLDER.as_ref(),
        STANDALONE_PREFIX.as_ref(),
        STANDALONE_SUFFIX.as_ref(),
        BLOCK_SCALAR_HEADER.as_ref(),
    ) else {
        return Err(RenderError::Template {
            path: path.to_string(),
            key: String::new(),
            message: "failed to compile template patterns".to_string(),
        });
    };

    let mut output = String::with_capacity(template.len());
    // Indentation of the line that opened the current block scalar
    let mut block_parent_indent: Option<usize> = None;

    for line in template.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        let indent = content.len() - content.trim_start().len();

        if let Some(parent) = block_parent_indent {
            if !content.trim().is_empty() && indent <= parent {
                block_parent_indent = None;
            }
        }
        let in_block = block_parent_indent.is_some();

        let matches: Vec<_> = placeholder.captures_iter(content).collect();
        if matches.is_empty() {
            output.push_str(line);
        } else {
            let standalone = !in_block
                && matches.len() == 1
                && matches[0].get(0).is_some_and(|whole| {
                    prefix_re.is_match(&content[..whole.start()])
                        && suffix_re.is_match(&content[whole.end()..])
                });

            let mut rendered_line = String::with_capacity(line.len());
            let mut last = 0;
            for captures in &matches {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                let key = captures.get(1).map_or("", |m| m.as_str());
                let value = lookup(context, key).ok_or_else(|| RenderError::MissingKey {
                    path: path.to_string(),
                    key: if key.is_empty() { ".".to_string() } else { key.to_string() },
                })?;

                rendered_line.push_str(&content[last..whole.start()]);
                let replacement = if standalone {
                    flow_form(value)
                } else {
                    string_form(value)
                }
                .map_err(|message| RenderError::Template {
                    path: path.to_string(),
                    key: key.to_string(),
                    message,
                })?;
                rendered_line.push_str(&replacement);
                last = whole.end();
            }
            rendered_line.push_str(&content[last..]);
            rendered_line.push_str(&line[content.len()..]);
            output.push_str(&rendered_line);
        }

        if !in_block && !content.trim_start().starts_with('#') && block_re.is_match(content) {
            block_parent_indent = Some(indent);
        }
    }

    Ok(output)
}

/// Inline YAML for a whole-scalar placeholder; JSON is valid YAML flow syntax
fn flow_form(value: &Value) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

/// Text for a placeholder embedded in a larger scalar
fn string_form(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => flow_form(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_whole_scalar_keeps_type() {
        let context = yaml("replicas: 3\nenabled: true\nitems: [a, b]\nname: web\n");
        let rendered = render_template(
            "t",
            "replicas: {{ .replicas }}\nenabled: {{ .enabled }}\nlist: {{ .items }}\nname: {{ .name }}\n",
            &context,
        )
        .unwrap();
        assert_eq!(
            rendered,
            yaml("replicas: 3\nenabled: true\nlist: [a, b]\nname: web\n")
        );
    }

    #[test]
    fn test_embedded_placeholder_is_string() {
        let context = yaml("cluster:\n  name: golem\n  port: 8443\n");
        let rendered = render_template(
            "t",
            "url: https://{{ .cluster.name }}.example.com:{{ .cluster.port }}\n",
            &context,
        )
        .unwrap();
        assert_eq!(rendered, yaml("url: https://golem.example.com:8443\n"));
    }

    #[test]
    fn test_quoted_placeholder_is_string() {
        let context = yaml("port: 8443\n");
        let rendered = render_template("t", "port: \"{{ .port }}\"\n", &context).unwrap();
        assert_eq!(rendered, yaml("port: \"8443\"\n"));
    }

    #[test]
    fn test_sequence_item_and_nested_map() {
        let context = yaml("first: one\nmeta:\n  a: 1\n");
        let rendered = render_template(
            "t",
            "list:\n  - {{ .first }}\n  - two\nmeta: {{ .meta }}\n",
            &context,
        )
        .unwrap();
        assert_eq!(rendered, yaml("list: [one, two]\nmeta:\n  a: 1\n"));
    }

    #[test]
    fn test_block_scalar_uses_string_form() {
        let context = yaml("name: golem\n");
        let rendered = render_template(
            "t",
            "script: |\n  echo {{ .name }}\n  {{ .name }}\nafter: {{ .name }}\n",
            &context,
        )
        .unwrap();
        assert_eq!(
            rendered,
            yaml("script: |\n  echo golem\n  golem\nafter: golem\n")
        );
    }

    #[test]
    fn test_block_scalar_header_needs_indicator_position() {
        let context = yaml("port: \"8080\"\n");

        let commented = substitute("t", "# ports: |\n  port: {{ .port }}\n", &context).unwrap();
        assert_eq!(commented, "# ports: |\n  port: \"8080\"\n");

        let arrow = substitute("t", "- a ->\n  - {{ .port }}\n", &context).unwrap();
        assert_eq!(arrow, "- a ->\n  - \"8080\"\n");

        let item = substitute("t", "- |\n  {{ .port }}\n", &context).unwrap();
        assert_eq!(item, "- |\n  8080\n");
    }

    #[test]
    fn test_missing_key_is_error() {
        let context = yaml("a: 1\n");
        let err = render_template("default/apps/x/t", "b: {{ .a.b }}\n", &context).unwrap_err();
        match err {
            RenderError::MissingKey { path, key } => {
                assert_eq!(path, "default/apps/x/t");
                assert_eq!(key, "a.b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_and_non_map_documents() {
        assert_eq!(render_template("t", "", &Value::Null).unwrap(), yaml("{}"));
        assert!(matches!(
            render_template("t", "- a\n- b\n", &Value::Null),
            Err(RenderError::NotAMap { .. })
        ));
    }

    #[test]
    fn test_lookup() {
        let context = yaml("a:\n  b:\n    c: 1\n");
        assert_eq!(lookup(&context, "a.b.c"), Some(&yaml("1")));
        assert_eq!(lookup(&context, ""), Some(&context));
        assert!(lookup(&context, "a.x").is_none());
        assert!(lookup(&context, "a.b.c.d").is_none());
    }
}
