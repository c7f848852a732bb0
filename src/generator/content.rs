//! Post-processing of generated text
//!
//! The generative service answers with free text: a `제목:` (title) line
//! followed by an HTML body that is often wrapped in markdown fences and
//! trailed by a notes section. These helpers turn that into a clean
//! [`GeneratedContent`] and compose the final body with backlinks.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::GeneratedContent;

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"제목:\s*(.+)").expect("Invalid regex pattern"))
}

/// Split the first `제목:` line off the response
///
/// A response without a title line yields an empty title; the caller decides
/// whether that is acceptable.
pub fn split_title(text: &str) -> GeneratedContent {
    let Some(caps) = title_re().captures(text) else {
        return GeneratedContent {
            title: String::new(),
            content: text.trim().to_string(),
        };
    };

    let title = caps
        .get(1)
        .map(|m| m.as_str().trim().trim_matches('*').trim().to_string())
        .unwrap_or_default();
    let content = title_re().replace(text, "").trim().to_string();

    GeneratedContent { title, content }
}

/// Strip outline preamble, code fences, notes tail and long blank runs
pub fn filter_content(content: &str) -> String {
    static PREAMBLE: OnceLock<Regex> = OnceLock::new();
    static OPEN_FENCE: OnceLock<Regex> = OnceLock::new();
    static BLANK_RUN: OnceLock<Regex> = OnceLock::new();
    static CLOSE_FENCE: OnceLock<Regex> = OnceLock::new();
    static NOTES: OnceLock<Regex> = OnceLock::new();

    let preamble = PREAMBLE.get_or_init(|| {
        Regex::new(r"## 1\.[\s\S]*?## 2\. 워드프레스 글 \(HTML\)\n\n```html")
            .expect("Invalid regex pattern")
    });
    let open_fence =
        OPEN_FENCE.get_or_init(|| Regex::new(r"^\s*```(?:html)?[ \t]*\n").expect("Invalid regex pattern"));
    let blank_run = BLANK_RUN.get_or_init(|| Regex::new(r"\n{15,}").expect("Invalid regex pattern"));
    let close_fence = CLOSE_FENCE.get_or_init(|| Regex::new(r"```\n*$").expect("Invalid regex pattern"));
    let notes = NOTES.get_or_init(|| Regex::new(r"\*\*참고:\*[\s\S]*$").expect("Invalid regex pattern"));

    let text = preamble.replace(content, "");
    let text = open_fence.replace(&text, "");
    let text = blank_run.replace_all(&text, "\n\n");
    let text = notes.replace(&text, "");
    let text = close_fence.replace(&text, "");
    text.trim().to_string()
}

/// Append recently published URLs (newest first) as backlinks
pub fn compose_with_backlinks(content: &str, recent_urls: &[String]) -> String {
    if recent_urls.is_empty() {
        return content.to_string();
    }
    format!("{content}\n\n{}\n.\n", recent_urls.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_title() {
        let parsed = split_title("제목: **봄철 캠핑 준비물 총정리**\n\n<h1>캠핑</h1>\n<p>본문</p>");
        assert_eq!(parsed.title, "봄철 캠핑 준비물 총정리");
        assert_eq!(parsed.content, "<h1>캠핑</h1>\n<p>본문</p>");
    }

    #[test]
    fn test_split_title_missing() {
        let parsed = split_title("<p>only body</p>");
        assert!(parsed.title.is_empty());
        assert_eq!(parsed.content, "<p>only body</p>");
        assert!(!parsed.is_complete());
    }

    #[test]
    fn test_filter_content_strips_wrapping() {
        let raw = "## 1. 제목\n내용\n## 2. 워드프레스 글 (HTML)\n\n```html\n<h1>A</h1>\n```\n\n**참고:* 이 글은...";
        assert_eq!(filter_content(raw), "<h1>A</h1>");
    }

    #[test]
    fn test_filter_content_plain_fence() {
        assert_eq!(filter_content("```html\n<p>x</p>\n```"), "<p>x</p>");
    }

    #[test]
    fn test_filter_content_collapses_blank_runs() {
        let raw = format!("<p>a</p>{}<p>b</p>", "\n".repeat(20));
        assert_eq!(filter_content(&raw), "<p>a</p>\n\n<p>b</p>");

        let short = "<p>a</p>\n\n\n<p>b</p>";
        assert_eq!(filter_content(short), short);
    }

    #[test]
    fn test_compose_with_backlinks() {
        assert_eq!(compose_with_backlinks("<p>x</p>", &[]), "<p>x</p>");

        let urls = vec![
            "https://blog.example/3".to_string(),
            "https://blog.example/2".to_string(),
        ];
        assert_eq!(
            compose_with_backlinks("<p>x</p>", &urls),
            "<p>x</p>\n\nhttps://blog.example/3\nhttps://blog.example/2\n.\n"
        );
    }
}
