// Stage 1: synchronous math substitution

use crate::error::MathError;
use latex2mathml::{DisplayStyle, latex_to_mathml};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

// Block alternative first so `$$x$$` is never split into two inline matches.
static MATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$([^$]+)\$\$|\$([^$]+)\$").expect("math pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathDisplay {
    Block,
    Inline,
}

/// Converts one TeX expression into displayable markup.
pub trait MathRenderer: Send + Sync {
    fn render(&self, expr: &str, display: MathDisplay) -> Result<String, MathError>;
}

/// TeX to MathML.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathMlRenderer;

impl MathRenderer for MathMlRenderer {
    fn render(&self, expr: &str, display: MathDisplay) -> Result<String, MathError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(MathError::Empty);
        }
        let style = match display {
            MathDisplay::Block => DisplayStyle::Block,
            MathDisplay::Inline => DisplayStyle::Inline,
        };
        latex_to_mathml(expr, style).map_err(|e| MathError::Syntax(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MathSummary {
    pub rendered: usize,
    pub failed: usize,
}

/// Replace every math expression in `html` in a single left-to-right pass.
///
/// A malformed expression becomes a visible error fragment; the rest of the
/// document is still substituted.
pub fn substitute_math(html: &str, renderer: &dyn MathRenderer) -> (String, MathSummary) {
    let mut summary = MathSummary::default();

    let output = MATH_PATTERN.replace_all(html, |caps: &Captures| {
        let (expr, display) = match (caps.get(1), caps.get(2)) {
            (Some(block), _) => (block.as_str(), MathDisplay::Block),
            (None, Some(inline)) => (inline.as_str(), MathDisplay::Inline),
            (None, None) => return caps[0].to_string(),
        };

        match renderer.render(expr, display) {
            Ok(markup) => {
                summary.rendered += 1;
                markup
            }
            Err(e) => {
                debug!("Math expression failed to render: {}", e);
                summary.failed += 1;
                math_error_fragment(&e)
            }
        }
    });

    (output.into_owned(), summary)
}

pub fn math_error_fragment(error: &MathError) -> String {
    format!(
        "<span class=\"math-error\">LaTeX Error: {}</span>",
        escape_html(&error.to_string())
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the expression so matches are easy to see.
    struct Echo;

    impl MathRenderer for Echo {
        fn render(&self, expr: &str, display: MathDisplay) -> Result<String, MathError> {
            if expr.contains("bad") {
                return Err(MathError::Syntax(format!("cannot parse <{}>", expr)));
            }
            Ok(match display {
                MathDisplay::Block => format!("[B:{}]", expr),
                MathDisplay::Inline => format!("[I:{}]", expr),
            })
        }
    }

    #[test]
    fn test_block_before_inline() {
        let (out, summary) = substitute_math("<p>$$x^2$$ and $y$</p>", &Echo);
        assert_eq!(out, "<p>[B:x^2] and [I:y]</p>");
        assert_eq!(summary, MathSummary { rendered: 2, failed: 0 });
    }

    #[test]
    fn test_output_not_rescanned() {
        struct Dollar;
        impl MathRenderer for Dollar {
            fn render(&self, _: &str, _: MathDisplay) -> Result<String, MathError> {
                Ok("$z$".to_string())
            }
        }
        let (out, summary) = substitute_math("$a$", &Dollar);
        assert_eq!(out, "$z$");
        assert_eq!(summary.rendered, 1);
    }

    #[test]
    fn test_error_fragment_is_escaped() {
        let (out, summary) = substitute_math("$bad$", &Echo);
        assert_eq!(
            out,
            "<span class=\"math-error\">LaTeX Error: cannot parse &lt;bad&gt;</span>"
        );
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_pattern_requires_a_body() {
        assert!(MATH_PATTERN.is_match("$$x$$"));
        assert!(MATH_PATTERN.is_match("$x$"));
        assert!(!MATH_PATTERN.is_match("$$$$"));
    }

    #[test]
    fn test_no_math_is_untouched() {
        let (out, summary) = substitute_math("<p>costs 5 dollars</p>", &Echo);
        assert_eq!(out, "<p>costs 5 dollars</p>");
        assert_eq!(summary, MathSummary::default());
    }

    #[test]
    fn test_mathml_renderer() {
        let markup = MathMlRenderer.render("x^2", MathDisplay::Inline).unwrap();
        assert!(markup.contains("<math"));
        assert_eq!(
            MathMlRenderer.render("  ", MathDisplay::Block),
            Err(MathError::Empty)
        );
    }
}
