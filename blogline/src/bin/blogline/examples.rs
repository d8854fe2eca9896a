use std::fmt::Write;

use colored::Colorize;

use crate::commands::{auth, comments, posts};
use crate::theme::{GLYPHS, THEME};

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct CommandExample {
    pub name: &'static str,
    pub groups: &'static [ExampleGroup],
}

pub fn command_examples() -> &'static [CommandExample] {
    &[
        CommandExample {
            name: "auth",
            groups: auth::EXAMPLES,
        },
        CommandExample {
            name: "posts",
            groups: posts::EXAMPLES,
        },
        CommandExample {
            name: "comments",
            groups: comments::EXAMPLES,
        },
    ]
}

/// Example block appended to a subcommand's long help.
pub fn render(groups: &[ExampleGroup]) -> String {
    let mut buffer = format!("{}\n", "Examples:".color(THEME.thread.title).bold());
    for (index, group) in groups.iter().enumerate() {
        if index > 0 {
            buffer.push('\n');
        }
        let _ = writeln!(buffer, "  {}", group.title.bold());
        for command in group.commands {
            let _ = writeln!(buffer, "    {} {command}", GLYPHS.hint.color(THEME.status.muted));
        }
    }
    buffer
}

/// Environment variable list appended to the top-level long help.
pub fn render_environment(variables: &[(&str, &str)]) -> String {
    let width = variables.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut buffer = format!("{}\n", "Environment:".color(THEME.thread.title).bold());
    for (name, description) in variables {
        let padded = format!("{name:width$}");
        let _ = writeln!(buffer, "  {}  {description}", padded.color(THEME.thread.field));
    }
    let _ = write!(
        buffer,
        "\n{} Run 'blogline <command> --help' for examples.",
        GLYPHS.info.color(THEME.status.info)
    );
    buffer
}
