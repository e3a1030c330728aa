use anyhow::Result;
use colored::Colorize;
use declarative::Registry;

use crate::Context;
use crate::ui;

/// A loaded dep as listed
#[derive(Debug, PartialEq, Eq)]
pub struct Listed {
    pub name: String,
    pub template: Option<String>,
}

/// Every dep whose `source:name` contains `filter`, in precedence order.
pub fn matching(registry: &Registry, filter: Option<&str>) -> Vec<Listed> {
    registry
        .sources
        .iter()
        .flat_map(|source| {
            source.deps().iter().map(move |dep| Listed {
                name: format!("{}:{}", source.name(), dep.name()),
                template: dep.bound_template().map(|t| t.name().to_string()),
            })
        })
        .filter(|listed| filter.is_none_or(|f| listed.name.contains(f)))
        .collect()
}

pub fn run(ctx: &Context, registry: &Registry, filter: Option<&str>) -> Result<()> {
    let deps = matching(registry, filter);
    if deps.is_empty() {
        if !ctx.quiet {
            ui::info("No deps match");
        }
        return Ok(());
    }

    for dep in &deps {
        match &dep.template {
            Some(template) => println!("{} {}", dep.name, format!("({template})").dimmed()),
            None => println!("{}", dep.name),
        }
    }
    if !ctx.quiet {
        println!();
        ui::dim(&format!("{} deps", deps.len()));
    }
    Ok(())
}
