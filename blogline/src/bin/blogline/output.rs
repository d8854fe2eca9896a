use anyhow::Result;
use blogline::comments::{CommentVisitor, Controls, NodeRef, Promotion};
use chrono::Local;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use serde::Serialize;
use std::io::Write;

use crate::theme::{GLYPHS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Trait for data that can be displayed as a table
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
    fn to_compact(&self) -> String;
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.options.output_format, OutputFormat::Json)
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(&self.options);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    /// `glyph message`, tinted unless color is off.
    fn status_line(&self, glyph: &str, color: colored::Color, message: &str) -> String {
        if self.options.no_color {
            format!("{glyph} {message}")
        } else {
            format!("{} {}", glyph.color(color), message.color(color))
        }
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.status_line(GLYPHS.success, THEME.status.success, message));
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.status_line(GLYPHS.warning, THEME.status.warning, message));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.status_line(GLYPHS.info, THEME.status.info, message));
        }
    }

    /// Diagnostics on stderr, shown with `--verbose` only
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{}", self.status_line(GLYPHS.hint, THEME.status.muted, message));
        }
    }

    /// Display a heading
    pub fn heading(&self, text: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("\n{text}\n{}", "=".repeat(text.chars().count()))
            } else {
                format!("\n{}", text.color(THEME.thread.title).bold())
            };
            println!("{output}");
        }
    }

    /// Display a key-value pair
    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("{key}: {value}")
            } else {
                format!("{}: {}", key.color(THEME.thread.field).bold(), value.color(THEME.thread.value))
            };
            println!("{output}");
        }
    }

    /// Indented list line, e.g. an empty-thread notice
    pub fn bullet(&self, text: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("  {} {text}", GLYPHS.top_level)
            } else {
                format!("  {} {text}", GLYPHS.top_level.color(THEME.status.muted))
            };
            println!("{output}");
        }
    }

    /// Print a pre-rendered block as is
    pub fn block(&self, text: &str) {
        if !self.options.quiet {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
    }

    /// Create a themed table
    pub fn create_table(options: &GlobalOptions) -> Table {
        let mut table = Table::new();

        if !options.no_color {
            table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
        } else {
            table.load_preset(comfy_table::presets::ASCII_FULL);
        }

        table
    }

    /// Add themed header to table
    pub fn add_table_header(options: &GlobalOptions, table: &mut Table, headers: &[&str]) {
        let header_cells: Vec<Cell> = headers
            .iter()
            .map(|h| {
                let cell = Cell::new(h).add_attribute(Attribute::Bold);
                if options.no_color { cell } else { cell.fg(TableColor::Cyan) }
            })
            .collect();
        table.set_header(header_cells);
    }

    /// Display progress indicator
    pub fn progress(&self, message: &str) {
        if self.options.quiet || self.is_json() {
            return;
        }

        let output = if self.options.no_color {
            format!("{} {message}...", GLYPHS.progress)
        } else {
            format!(
                "{} {}...",
                GLYPHS.progress.color(THEME.status.progress).bold(),
                message.color(THEME.status.progress)
            )
        };

        print!("\r{output}");
        std::io::stdout().flush().ok();
    }

    /// Clear the current line (useful after progress indicators)
    pub fn clear_line(&self) {
        if self.options.quiet || self.is_json() {
            return;
        }

        print!("\r{}", " ".repeat(80));
        print!("\r");
        std::io::stdout().flush().ok();
    }
}

/// Themed terminal rendering of a comment forest.
pub struct CommentPrinter {
    no_color: bool,
    output: String,
}

impl CommentPrinter {
    pub fn new(options: &GlobalOptions) -> Self {
        Self {
            no_color: options.no_color,
            output: String::new(),
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn paint(&self, text: &str, color: colored::Color) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.color(color).to_string()
        }
    }
}

impl CommentVisitor for CommentPrinter {
    fn enter(&mut self, node: NodeRef<'_>, depth: usize, controls: Controls) {
        use std::fmt::Write as _;

        let colors = &THEME.thread;
        let pad = GLYPHS.indent.repeat(depth);
        let comment = node.comment();
        let marker = match (depth, node.promotion()) {
            (_, Some(_)) => self.paint(GLYPHS.promoted, colors.promoted),
            (0, None) => GLYPHS.top_level.to_string(),
            _ => GLYPHS.reply.to_string(),
        };
        let id = self.paint(&format!("#{}", comment.id), colors.comment_id);
        let _ = writeln!(self.output, "{pad}{marker} {id} {}", comment.content);

        let timestamp = comment.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let byline = self.paint(&format!("By User: {}, at {timestamp}", comment.user_id), colors.byline);
        let note = match node.promotion() {
            Some(Promotion::Orphan) => format!(" {}", self.paint("(reply to a removed comment)", colors.promoted)),
            Some(Promotion::BrokenCycle) => format!(" {}", self.paint("(reply chain broken)", colors.promoted)),
            None => String::new(),
        };
        let _ = writeln!(self.output, "{pad}  {byline}{note}");

        let mut actions = Vec::new();
        if controls.can_delete {
            actions.push(self.paint("[delete]", colors.delete_action));
        }
        if controls.can_reply {
            actions.push(self.paint("[reply]", colors.reply_action));
        }
        if !actions.is_empty() {
            let _ = writeln!(self.output, "{pad}  {}", actions.join(" "));
        }
    }
}
