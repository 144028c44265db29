//! `promptstore` - prompt-template store and application CLI
//!
//! This binary is a thin front over `promptstore-core`: it lists and shows
//! templates, renders one against a JSON record, and runs the static
//! validation pass meant for CI.

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use std::path::PathBuf;

use crate::cli::{Cli, Commands};
use promptstore_core::validate::{normalized_schema, validate_dataset};
use promptstore_core::{store, Example, TemplateCollection};

mod cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = resolve_root(&cli);
    let mut collection = TemplateCollection::new(&root)
        .with_context(|| format!("failed to read template store at {}", root.display()))?;

    match cli.command {
        Commands::Counts => {
            let heading = Style::new().bold();
            println!("{}", heading.apply_to("Templates per dataset"));
            let counts = collection.counts_by_dataset();
            if counts.is_empty() {
                println!("(store is empty)");
            }
            for (dataset, count) in &counts {
                println!("{:>6}  {}", count, dataset);
            }
            println!("\nTotal: {}", collection.len());
        }

        Commands::List { dataset, subset } => {
            let store = collection.get_dataset(&dataset, subset.as_deref())?;
            for name in store.all_template_names() {
                println!("{}", name);
            }
        }

        Commands::Show {
            dataset,
            name,
            subset,
        } => {
            let store = collection.get_dataset(&dataset, subset.as_deref())?;
            let template = store.get_template(&name)?;
            let label = Style::new().bold().blue();
            println!("{} {}", label.apply_to("name:"), template.name);
            println!("{} {}", label.apply_to("id:"), template.id());
            println!("{} {}", label.apply_to("reference:"), template.reference);
            println!(
                "{} {}",
                label.apply_to("task template:"),
                template.task_template
            );
            if let Some(choices) = template.fixed_answer_choices_list() {
                println!("{} {}", label.apply_to("answer choices:"), choices.join(", "));
            }
            println!("{}\n{}", label.apply_to("jinja:"), template.jinja);
        }

        Commands::Apply {
            dataset,
            name,
            example,
            subset,
            no_truncate,
            highlight,
        } => {
            let record = read_example(&example)?;
            let store = collection.get_dataset(&dataset, subset.as_deref())?;
            let parts = store.apply_template(&name, &record, !no_truncate, highlight)?;

            let label = Style::new().bold().green();
            if parts.len() == 1 {
                println!("{}", Style::new().yellow().apply_to(
                    "template produced no prompt/target separator; raw render below",
                ));
            }
            println!("{}\n{}", label.apply_to("prompt:"), parts[0]);
            for part in &parts[1..] {
                println!("{}\n{}", label.apply_to("target:"), part);
            }
        }

        Commands::Validate {
            dataset,
            subset,
            fields,
        } => {
            let store = collection.get_dataset(&dataset, subset.as_deref())?;
            let schema = normalized_schema(&fields);
            let issues = validate_dataset(store, &schema);
            if issues.is_empty() {
                println!("{}", Style::new().green().apply_to("all templates clean"));
            } else {
                for issue in &issues {
                    eprintln!("{}", Style::new().red().apply_to(issue.to_string()));
                }
                std::process::exit(1);
            }
        }

        Commands::Summaries => {
            let summaries = collection.summaries();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
    }

    Ok(())
}

fn resolve_root(cli: &Cli) -> PathBuf {
    cli.store_root
        .clone()
        .unwrap_or_else(store::default_store_root)
}

fn read_example(path: &PathBuf) -> Result<Example> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read example file {}", path.display()))?;
    let record: Example = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON object", path.display()))?;
    Ok(record)
}
