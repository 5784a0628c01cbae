use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some()
        || std::env::var_os("OFFLINE_UPGRADE_NO_COLOR").is_some();
    resolve_output_style(no_color, std::io::stdout().is_terminal())
}

pub(crate) fn resolve_output_style(no_color: bool, is_terminal: bool) -> OutputStyle {
    if no_color || !is_terminal {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => match status {
            "error" => format!("error: {message}"),
            _ => message.to_string(),
        },
        OutputStyle::Rich => {
            let badge = format!("[{}]", status.to_ascii_uppercase());
            format!("{} {message}", colorize(status_style(status), &badge))
        }
    }
}

/// Spinner for host commands that run long enough to look hung.
pub(crate) fn start_spinner(style: OutputStyle, message: &str) -> Option<ProgressBar> {
    if style == OutputStyle::Plain {
        return None;
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {pos} {elapsed}")
    {
        spinner.set_style(template.tick_chars("|/-\\ "));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "error" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
