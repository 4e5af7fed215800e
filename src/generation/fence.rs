//! Removal of a single wrapping code fence from model output.

use std::sync::LazyLock;

use regex::Regex;

static WRAPPING_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\A```[a-zA-Z]*\n(.*?)\n```\z").ok());

/// Return the inner content when the trimmed text is exactly one fenced
/// block (optionally language-tagged); otherwise return `text` unchanged.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    WRAPPING_FENCE
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().to_owned())
        .unwrap_or_else(|| text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_fence_is_stripped() {
        let input = "```texsauce\n\\begin{document}\nX\n\\end{document}\n```";
        assert_eq!(
            strip_code_fence(input),
            "\\begin{document}\nX\n\\end{document}"
        );
    }

    #[test]
    fn untagged_fence_with_surrounding_whitespace_is_stripped() {
        assert_eq!(strip_code_fence("\n  ```\na + b\n```\n\n"), "a + b");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(strip_code_fence("hello"), "hello");
        assert_eq!(strip_code_fence("  hello  "), "  hello  ");
    }

    #[test]
    fn prose_around_fence_is_unchanged() {
        let input = "Here you go:\n```tex\nx\n```";
        assert_eq!(strip_code_fence(input), input);
    }

    #[test]
    fn only_outermost_wrapper_is_removed() {
        let input = "```markdown\nouter\n```tex\ninner\n```\n```";
        assert_eq!(strip_code_fence(input), "outer\n```tex\ninner\n```");
    }

    #[test]
    fn tag_with_digits_or_dashes_is_not_a_fence() {
        let input = "```c++\nint x;\n```";
        assert_eq!(strip_code_fence(input), input);
    }

    #[test]
    fn empty_body_needs_two_newlines() {
        assert_eq!(strip_code_fence("```\n\n```"), "");
        assert_eq!(strip_code_fence("```\n```"), "```\n```");
    }
}
