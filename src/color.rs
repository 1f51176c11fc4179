//! ANSI styling for intermediate-representation dumps
//!
//! Dumps are colored only when the caller asks for it; every helper is a
//! no-op otherwise so the same printer serves `--no-color`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Keyword,
    Node,
    Name,
    Literal,
    Type,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Keyword => "\x1b[1;35m",
            Style::Node => "\x1b[1;34m",
            Style::Name => "\x1b[1;36m",
            Style::Literal => "\x1b[1;32m",
            Style::Type => "\x1b[1;33m",
        }
    }
}

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub struct Painter {
    pub enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn paint(&self, style: Style, text: &str) -> String {
        if self.enabled {
            format!("{}{}{}", style.code(), text, RESET)
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_when_disabled() {
        assert_eq!(Painter::new(false).paint(Style::Node, "Print"), "Print");
    }

    #[test]
    fn test_wraps_when_enabled() {
        let s = Painter::new(true).paint(Style::Literal, "1");
        assert!(s.starts_with("\x1b["));
        assert!(s.ends_with(RESET));
    }
}
