//! Inline HTML to formatted runs.
//!
//! Only `b`/`strong`, `i`/`em` and `u` carry formatting. Everything else that
//! looks like a tag is dropped, and text is flushed into a new run at every tag
//! boundary so nested and overlapping ranges come out as separate runs.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::decode_entities;

lazy_static! {
    static ref RE_BR: Regex = Regex::new(r"(?i)<br\s?/?>").unwrap();
    static ref RE_P_OPEN: Regex = Regex::new(r"(?i)<p(\s[^>]*)?>").unwrap();
    static ref RE_P_CLOSE: Regex = Regex::new(r"(?i)</p\s*>").unwrap();
    static ref RE_FORMATTING_PAIRS: Vec<Regex> = ["b", "strong", "i", "em", "u"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}(\s[^>]*)?>.*?</{tag}\s*>")).unwrap())
        .collect();
}

/// One span of text sharing a single formatting state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedRun {
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
}

impl FormattedRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn is_plain(&self) -> bool {
        !(self.bold || self.italic || self.underline)
    }
}

/// Nesting depth per formatting axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatStack {
    pub bold: u32,
    pub italic: u32,
    pub underline: u32,
}

impl FormatStack {
    pub fn apply(&mut self, tag: TagKind) {
        match tag {
            TagKind::BoldOpen => self.bold += 1,
            TagKind::BoldClose => self.bold = self.bold.saturating_sub(1),
            TagKind::ItalicOpen => self.italic += 1,
            TagKind::ItalicClose => self.italic = self.italic.saturating_sub(1),
            TagKind::UnderlineOpen => self.underline += 1,
            TagKind::UnderlineClose => self.underline = self.underline.saturating_sub(1),
            TagKind::Other => {}
        }
    }

    fn run(&self, text: String) -> FormattedRun {
        FormattedRun {
            text,
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: self.underline > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    BoldOpen,
    BoldClose,
    ItalicOpen,
    ItalicClose,
    UnderlineOpen,
    UnderlineClose,
    Other,
}

impl TagKind {
    /// Classify the inside of a tag, i.e. the text between `<` and `>`.
    pub fn classify(inner: &str) -> Self {
        let (is_end, body) = match inner.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, inner),
        };

        let name_end = body
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(body.len());
        let (name, rest) = body.split_at(name_end);

        // Opening tags may carry attributes; closing tags carry nothing.
        let well_formed = if is_end {
            rest.trim().is_empty()
        } else {
            rest.is_empty() || rest.starts_with(char::is_whitespace)
        };
        if !well_formed {
            return TagKind::Other;
        }

        match (is_end, name.to_ascii_lowercase().as_str()) {
            (false, "b" | "strong") => TagKind::BoldOpen,
            (true, "b" | "strong") => TagKind::BoldClose,
            (false, "i" | "em") => TagKind::ItalicOpen,
            (true, "i" | "em") => TagKind::ItalicClose,
            (false, "u") => TagKind::UnderlineOpen,
            (true, "u") => TagKind::UnderlineClose,
            _ => TagKind::Other,
        }
    }
}

/// Whether `text` holds at least one complete bold, italic or underline element.
pub fn has_html_formatting(text: &str) -> bool {
    RE_FORMATTING_PAIRS.iter().any(|re| re.is_match(text))
}

fn normalize_blocks(html: &str) -> String {
    let html = RE_BR.replace_all(html, "\n");
    let html = RE_P_OPEN.replace_all(&html, "");
    let html = RE_P_CLOSE.replace_all(&html, "\n");
    decode_entities(&html)
}

/// Parse inline HTML into runs. Never fails and never returns an empty vector.
pub fn parse_to_runs(html: &str) -> Vec<FormattedRun> {
    let html = normalize_blocks(html);

    let mut runs: Vec<FormattedRun> = Vec::new();
    let mut pending = String::new();
    let mut stack = FormatStack::default();
    let mut rest = html.as_str();

    while let Some(lt) = rest.find('<') {
        pending.push_str(&rest[..lt]);
        let tag_and_after = &rest[lt..];

        let Some(gt) = tag_and_after.find('>') else {
            // No `>` anywhere ahead: the remainder is literal text.
            pending.push_str(tag_and_after);
            rest = "";
            break;
        };

        if !pending.is_empty() {
            runs.push(stack.run(std::mem::take(&mut pending)));
        }

        let tag = TagKind::classify(&tag_and_after[1..gt]);
        if tag == TagKind::Other {
            log::trace!("dropping tag {:?}", &tag_and_after[..=gt]);
        }
        stack.apply(tag);
        rest = &tag_and_after[gt + 1..];
    }

    pending.push_str(rest);
    if !pending.is_empty() {
        runs.push(stack.run(pending));
    }

    if runs.is_empty() {
        runs.push(FormattedRun::default());
    }
    runs
}

/// Like [`parse_to_runs`], but for arbitrary JSON values.
///
/// `null` is treated as an empty string; other non-string values are
/// stringified into a single plain run.
pub fn parse_value_to_runs(value: &Value) -> Vec<FormattedRun> {
    match value {
        Value::String(s) => parse_to_runs(s),
        Value::Null => vec![FormattedRun::default()],
        other => vec![FormattedRun::plain(other.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(text: &str, bold: bool, italic: bool, underline: bool) -> FormattedRun {
        FormattedRun {
            text: text.to_string(),
            bold,
            italic,
            underline,
        }
    }

    #[test]
    fn text_without_tags_is_one_plain_run() {
        assert_eq!(parse_to_runs("hello"), vec![FormattedRun::plain("hello")]);
    }

    #[test]
    fn empty_input_yields_one_empty_run() {
        assert_eq!(parse_to_runs(""), vec![FormattedRun::default()]);
        assert_eq!(parse_to_runs("<span></span>"), vec![FormattedRun::default()]);
        assert_eq!(parse_value_to_runs(&Value::Null), vec![FormattedRun::default()]);
    }

    #[test]
    fn non_string_values_are_stringified() {
        assert_eq!(parse_value_to_runs(&json!(42)), vec![FormattedRun::plain("42")]);
        assert_eq!(parse_value_to_runs(&json!(true)), vec![FormattedRun::plain("true")]);
        assert_eq!(
            parse_value_to_runs(&json!("<i>x</i>")),
            vec![run("x", false, true, false)]
        );
    }

    #[test]
    fn single_bold() {
        assert_eq!(parse_to_runs("<b>x</b>"), vec![run("x", true, false, false)]);
    }

    #[test]
    fn nested_tags_combine() {
        assert_eq!(
            parse_to_runs("<b>a<i>b</i>c</b>"),
            vec![
                run("a", true, false, false),
                run("b", true, true, false),
                run("c", true, false, false),
            ]
        );
    }

    #[test]
    fn overlapping_tags_use_depth_counters() {
        assert_eq!(
            parse_to_runs("<b>a<i>b</b>c</i>"),
            vec![
                run("a", true, false, false),
                run("b", true, true, false),
                run("c", false, true, false),
            ]
        );
    }

    #[test]
    fn same_kind_nesting() {
        assert_eq!(
            parse_to_runs("<b>a<strong>b</strong>c</b>d"),
            vec![
                run("a", true, false, false),
                run("b", true, false, false),
                run("c", true, false, false),
                run("d", false, false, false),
            ]
        );
    }

    #[test]
    fn unmatched_close_is_absorbed() {
        assert_eq!(parse_to_runs("</b>x"), vec![FormattedRun::plain("x")]);
        assert_eq!(
            parse_to_runs("</u></u><u>x</u>"),
            vec![run("x", false, false, true)]
        );
    }

    #[test]
    fn tags_with_attributes_and_any_case() {
        assert_eq!(
            parse_to_runs(r#"<STRONG class="x">a</Strong><EM>b</em>"#),
            vec![run("a", true, false, false), run("b", false, true, false)]
        );
    }

    #[test]
    fn lookalike_tags_are_other() {
        // `<br>` is normalized before the scan; `<bdi>`/`<b/>` are not bold.
        assert_eq!(
            parse_to_runs("<bdi>a</bdi><b/>b<ul>c</ul>"),
            vec![
                FormattedRun::plain("a"),
                FormattedRun::plain("b"),
                FormattedRun::plain("c"),
            ]
        );
    }

    #[test]
    fn unknown_tags_split_but_keep_state() {
        assert_eq!(
            parse_to_runs("<b>a<span>b</span></b>"),
            vec![run("a", true, false, false), run("b", true, false, false)]
        );
    }

    #[test]
    fn unterminated_tag_is_literal() {
        assert_eq!(
            parse_to_runs("<b>1 < 2"),
            vec![run("1 < 2", true, false, false)]
        );
        assert_eq!(parse_to_runs("a <"), vec![FormattedRun::plain("a <")]);
    }

    #[test]
    fn breaks_and_paragraphs_become_newlines() {
        assert_eq!(
            parse_to_runs(r#"<p class="lead">one<BR>two<br />three</p><p>four</P>"#),
            vec![FormattedRun::plain("one\ntwo\nthree\nfour\n")]
        );
    }

    #[test]
    fn entities_decoded_before_scan() {
        // Entity-encoded angle brackets still end up as tags, as the scan runs last.
        assert_eq!(
            parse_to_runs("Tom &amp; Jerry &lt;b&gt;x"),
            vec![FormattedRun::plain("Tom & Jerry "), run("x", true, false, false)]
        );
        assert_eq!(
            parse_to_runs("<u>&copy;</u>"),
            vec![run("\u{a9}", false, false, true)]
        );
        assert_eq!(
            parse_to_runs("&amp;#65; &amp;lt;"),
            vec![FormattedRun::plain("A <")]
        );
    }

    #[test]
    fn whitespace_runs_are_kept() {
        assert_eq!(
            parse_to_runs("<b>a</b> <i>b</i>"),
            vec![
                run("a", true, false, false),
                FormattedRun::plain(" "),
                run("b", false, true, false),
            ]
        );
    }

    #[test]
    fn detects_paired_formatting_tags() {
        assert!(has_html_formatting("<b>x</b>"));
        assert!(has_html_formatting("a <strong class='k'>x\ny</strong>"));
        assert!(has_html_formatting("<EM>x</em>"));
        assert!(has_html_formatting("<u></u>"));
        assert!(!has_html_formatting("<b>x"));
        assert!(!has_html_formatting("<b>x</strong>"));
        assert!(!has_html_formatting("<p>plain</p>"));
        assert!(!has_html_formatting("<br>"));
        assert!(!has_html_formatting("no tags"));
    }

    #[test]
    fn serialized_shape_omits_false_flags() {
        let value = serde_json::to_value(parse_to_runs("a<b>b</b>")).unwrap();
        assert_eq!(value, json!([{"text": "a"}, {"text": "b", "bold": true}]));
    }
}
