use anyhow::Result;
use colored::Colorize;
use declarative::field::FieldSpec;
use declarative::{Coercion, FieldDefault, FieldKind, Registry, Template};

use crate::ui;

/// One line per field: `name: list (default, per-host via `via`)`
pub fn describe_field(field: &FieldSpec) -> String {
    let kind = match field.kind {
        FieldKind::Value => "value",
        FieldKind::List => "list",
        FieldKind::Block => "block",
    };

    let mut notes = Vec::new();
    match &field.default {
        FieldDefault::None => {}
        FieldDefault::Literal(value) => notes.push(format!("default {:?}", value.to_string())),
        FieldDefault::Computed(_) => notes.push("computed default".to_string()),
    }
    if field.default_block.is_some() {
        notes.push("default block".to_string());
    }
    if field.coercion == Coercion::Basename {
        notes.push("basename".to_string());
    }
    if let Some(chooser) = &field.choose_with {
        notes.push(format!("per-host via `{chooser}`"));
    }

    if notes.is_empty() {
        format!("{}: {kind}", field.name)
    } else {
        format!("{}: {kind} ({})", field.name, notes.join(", "))
    }
}

pub fn run(registry: &Registry) -> Result<()> {
    let mut templates: Vec<&Template> = registry.templates.iter().map(AsRef::as_ref).collect();
    templates.sort_by(|a, b| (!a.is_builtin(), a.name()).cmp(&(!b.is_builtin(), b.name())));

    ui::header("Templates");
    for template in templates {
        let origin = if template.is_builtin() { "built-in" } else { "user" };
        println!("  {} {}", template.name().bold(), origin.dimmed());
        for field in template.definer().fields() {
            println!("    {}", describe_field(field));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Template {
        Template::new("pkg")
            .with_fields(|d| {
                d.accepts_list_for("installs", FieldDefault::None, Coercion::None, Some("via"))?;
                d.accepts_value_for("prefix", "/usr/local")?;
                d.accepts_list_for(
                    "provides",
                    FieldDefault::computed(|f| f.get("installs").cloned()),
                    Coercion::Basename,
                    None,
                )?;
                d.accepts_block_for("otherwise", None)?;
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn test_describe_fields() {
        let template = template();
        let lines: Vec<String> = template.definer().fields().iter().map(describe_field).collect();
        assert_eq!(
            lines,
            vec![
                "installs: list (per-host via `via`)",
                "prefix: value (default \"/usr/local\")",
                "provides: list (computed default, basename)",
                "otherwise: block",
            ]
        );
    }
}
