//! Terminal presentation: result grids, spinners and the interactive menu.

use super::commands::{App, Commands, CopyArgs, GenerateArgs};
use crate::error::Result;
use crate::models::{Table, Value};
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table as Grid};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

/// Renders a table as a bordered grid. `Null` cells are shown as `NULL`.
pub fn render_table(table: &Table) -> String {
    let mut grid = Grid::new();
    grid.load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(table.columns().iter().map(Cell::new));

    for row in table.rows() {
        grid.add_row(row.iter().map(|value| match value {
            Value::Null => Cell::new("NULL"),
            other => Cell::new(other.to_string()),
        }));
    }
    grid.to_string()
}

/// A steadily ticking spinner with `message`.
pub fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn prompt_text(prompt: &str) -> Result<String> {
    Ok(Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()?)
}

fn prompt_confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

/// Asks for the inputs of the chosen menu entry. `None` means exit.
fn prompt_command(selection: usize) -> Result<Option<Commands>> {
    let command = match selection {
        0 => Commands::Select {
            query: prompt_text("SELECT statement")?,
            json: false,
        },
        1 => Commands::Insert {
            query: prompt_text("INSERT statement")?,
            returning: prompt_confirm("Fetch the RETURNING value?")?,
        },
        2 => Commands::Update {
            query: prompt_text("UPDATE statement")?,
        },
        3 => Commands::Generate(GenerateArgs {
            input: PathBuf::from(prompt_text("JSON table file")?),
            table: prompt_text("Target table")?,
            columns: Vec::new(),
        }),
        4 => Commands::Copy(CopyArgs {
            query: prompt_text("SELECT statement")?,
            table: prompt_text("Target table")?,
            execute: prompt_confirm("Insert the rows now instead of printing SQL?")?,
        }),
        _ => return Ok(None),
    };
    Ok(Some(command))
}

/// Main interactive loop. Command failures are reported and the loop continues.
pub async fn run_interactive(app: &mut App) -> Result<()> {
    println!("{}", "pgwrap interactive session".cyan().bold());

    let options = &[
        "Run SELECT",
        "Run INSERT",
        "Run UPDATE",
        "Generate INSERT from JSON table file",
        "Copy SELECT result as INSERT",
        "Exit",
    ];

    loop {
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What would you like to do?")
            .items(options)
            .default(0)
            .interact_opt()?
            .unwrap_or(options.len() - 1); // Esc / Ctrl+C exits

        println!();

        let command = match prompt_command(selection) {
            Ok(Some(command)) => command,
            Ok(None) => {
                println!("{}", "Goodbye!".green());
                break;
            },
            Err(e) => {
                println!("{} {}", "Failed to get input:".red(), e);
                continue;
            },
        };

        if let Err(e) = app.run_command(command).await {
            error!("Command execution failed: {:?}", e);
            println!(
                "{} {}",
                "Error executing command:".red(),
                e.to_string().red()
            );
        }

        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table() {
        let table = Table::with_rows(
            ["id", "name"],
            vec![
                vec![Value::Int(1), Value::from("Alice")],
                vec![Value::Int(2), Value::Null],
            ],
        )
        .unwrap();

        let rendered = render_table(&table);
        let header = rendered.lines().find(|l| l.contains("id")).unwrap();
        assert!(header.find("id").unwrap() < header.find("name").unwrap());
        assert!(rendered.contains("Alice"));
        assert!(rendered.contains("NULL"));
    }

    #[test]
    fn test_render_empty_table_keeps_header() {
        let rendered = render_table(&Table::new(["only_column"]));
        assert!(rendered.contains("only_column"));
    }

    #[test]
    fn test_spinner_template_is_valid() {
        let pb = spinner("working").unwrap();
        assert_eq!(pb.message(), "working");
        pb.finish_and_clear();
    }
}
