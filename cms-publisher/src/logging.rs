use std::sync::OnceLock;

use owo_colors::OwoColorize;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let ansi = *ANSI_ENABLED.get_or_init(detect_ansi);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn category_access() -> String {
    category(
        "ACCESS",
        ansi_enabled(),
        |text| format!("{}", text.bright_cyan().bold()),
    )
}

pub fn category_endpoint() -> String {
    category(
        "ENDPOINT",
        ansi_enabled(),
        |text| format!("{}", text.bright_green().bold()),
    )
}

pub fn category_openapi() -> String {
    category(
        "OPENAPI",
        ansi_enabled(),
        |text| format!("{}", text.bright_blue().bold()),
    )
}

pub fn category_runtime() -> String {
    category(
        "RUNTIME",
        ansi_enabled(),
        |text| format!("{}", text.bright_magenta().bold()),
    )
}

pub fn method_label(method: &str) -> String {
    paint_method(method, ansi_enabled())
}

pub fn status_label(status: u16) -> String {
    paint_status(status, ansi_enabled())
}

fn paint_method(method: &str, ansi: bool) -> String {
    if !ansi {
        return method.to_string();
    }

    match method {
        "GET" => format!("{}", method.bright_blue()),
        "POST" => format!("{}", method.bright_green()),
        _ => format!("{}", method.bright_white()),
    }
}

fn paint_status(status: u16, ansi: bool) -> String {
    let text = status.to_string();
    if !ansi {
        return text;
    }

    match status {
        100..=199 => format!("{}", text.bright_blue()),
        200..=299 => format!("{}", text.bright_green()),
        300..=399 => format!("{}", text.bright_cyan()),
        400..=499 => format!("{}", text.bright_yellow()),
        _ => format!("{}", text.bright_red()),
    }
}

fn category(label: &str, ansi: bool, paint: fn(&str) -> String) -> String {
    if ansi {
        paint(label)
    } else {
        label.to_string()
    }
}

fn ansi_enabled() -> bool {
    *ANSI_ENABLED.get_or_init(detect_ansi)
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    supports_color::on_cached(Stream::Stdout).is_some()
}
