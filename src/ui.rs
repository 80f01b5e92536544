//! Status lines for human-facing command output
//!
//! Styled glyphs on a terminal, bracketed tags when piped or under CI so
//! logs stay greppable.

use console::{style, Style};

/// Whether output goes to a person or a machine
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    fancy: bool,
}

impl UiContext {
    /// Detect from the terminal and common CI variables
    pub fn detect() -> Self {
        let ci = ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE"]
            .iter()
            .any(|v| std::env::var_os(v).is_some());
        Self {
            fancy: console::user_attended() && !ci,
        }
    }

    pub fn plain() -> Self {
        Self { fancy: false }
    }

    pub fn is_fancy(&self) -> bool {
        self.fancy
    }
}

fn tag(ctx: &UiContext, glyph: &str, text: &str, color: Style) -> String {
    if ctx.fancy {
        color.apply_to(glyph).to_string()
    } else {
        color.apply_to(format!("[{}]", text)).to_string()
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    println!("  {} {}", tag(ctx, "✔", "OK", Style::new().green()), message);
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    println!(
        "  {} {} ({})",
        tag(ctx, "✔", "OK", Style::new().green()),
        message,
        style(detail).dim()
    );
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    println!(
        "  {} {} - {}",
        tag(ctx, "▲", "WARN", Style::new().yellow()),
        message,
        style(hint).dim()
    );
}

/// `key: value`, value colored by health
pub fn key_value_status(ctx: &UiContext, key: &str, value: &str, ok: bool) {
    let color = if ok {
        Style::new().green()
    } else {
        Style::new().yellow()
    };
    if ctx.fancy {
        println!("  {}: {}", style(key).dim(), color.apply_to(value));
    } else {
        let prefix = if ok { "[OK]" } else { "[WARN]" };
        println!("  {} {}: {}", prefix, key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn plain_context_uses_tags() {
        let ctx = UiContext::plain();
        assert!(!ctx.is_fancy());
        assert!(console::strip_ansi_codes(&tag(&ctx, "✔", "OK", Style::new())).contains("[OK]"));
        // Must not panic without a terminal
        step_ok(&ctx, "done");
        key_value_status(&ctx, "backend", "file", true);
    }

    #[test]
    #[serial]
    fn ci_forces_plain_output() {
        let previous = std::env::var_os("CI");
        std::env::set_var("CI", "true");
        let ctx = UiContext::detect();
        match previous {
            Some(value) => std::env::set_var("CI", value),
            None => std::env::remove_var("CI"),
        }
        assert!(!ctx.is_fancy());
    }
}
