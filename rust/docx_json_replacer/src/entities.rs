use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Named entities understood by the template renderer, applied in this order.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&copy;", "\u{a9}"),
    ("&reg;", "\u{ae}"),
    ("&trade;", "\u{2122}"),
    ("&mdash;", "\u{2014}"),
    ("&ndash;", "\u{2013}"),
    ("&hellip;", "..."),
    ("&laquo;", "\u{ab}"),
    ("&raquo;", "\u{bb}"),
    ("&ldquo;", "\u{201c}"),
    ("&rdquo;", "\u{201d}"),
    ("&lsquo;", "\u{2018}"),
    ("&rsquo;", "\u{2019}"),
];

lazy_static! {
    static ref RE_DECIMAL: Regex = Regex::new(r"&#([0-9]+);").unwrap();
    static ref RE_HEX: Regex = Regex::new(r"&#[xX]([0-9a-fA-F]+);").unwrap();
}

fn replace_numeric(s: &str, re: &Regex, radix: u32) -> String {
    re.replace_all(s, |caps: &Captures| {
        u32::from_str_radix(&caps[1], radix)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// Decode the named entities of the static table plus `&#NNN;` / `&#xHHH;`.
///
/// Decoding is staged: every named entity is replaced in table order, then
/// decimal references, then hex references. A later stage sees the output of
/// an earlier one, so `&amp;lt;` ends up as `<`. Unknown, unterminated or
/// out-of-range entities are kept literally.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = s.to_string();
    for (entity, replacement) in NAMED_ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    let out = replace_numeric(&out, &RE_DECIMAL, 10);
    replace_numeric(&out, &RE_HEX, 16)
}

/// Escape `&`, `<` and `>` for XML or HTML text content. Quotes are left alone.
pub fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;tag&gt;"), "<tag>");
        assert_eq!(decode_entities("&copy; 2024 &mdash; x"), "\u{a9} 2024 \u{2014} x");
        assert_eq!(decode_entities("wait&hellip;"), "wait...");
        assert_eq!(decode_entities("&nbsp;"), " ");
    }

    #[test]
    fn numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;&#X43;"), "ABC");
        assert_eq!(decode_entities("&#8364;"), "\u{20ac}");
        assert_eq!(decode_entities("&#39;quoted&#39;"), "'quoted'");
    }

    #[test]
    fn decoded_ampersand_feeds_later_stages() {
        assert_eq!(decode_entities("&amp;lt;"), "<");
        assert_eq!(decode_entities("&amp;#65;"), "A");
        assert_eq!(decode_entities("&amp;#x42;"), "B");
        // Each named entity is replaced once.
        assert_eq!(decode_entities("&amp;amp;"), "&amp;");
    }

    #[test]
    fn malformed_kept_literal() {
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
        assert_eq!(decode_entities("&#xZZ;"), "&#xZZ;");
        assert_eq!(decode_entities("&#1114112;"), "&#1114112;");
        assert_eq!(decode_entities("&#99999999999999999999;"), "&#99999999999999999999;");
        assert_eq!(decode_entities("tail &amp"), "tail &amp");
        assert_eq!(decode_entities("&&amp;"), "&&");
    }

    #[test]
    fn escapes_markup_but_not_quotes() {
        assert_eq!(xml_escape_text("a<b>&\"c\""), "a&lt;b&gt;&amp;\"c\"");
        assert_eq!(decode_entities(&xml_escape_text("1 < 2 & 3")), "1 < 2 & 3");
    }

    #[test]
    fn preserves_utf8() {
        assert_eq!(decode_entities("привет &amp; 日本"), "привет & 日本");
    }
}
