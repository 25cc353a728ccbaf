//! Property-based tests for the run parser and base64 decoding.

use base64::Engine;
use docx_json_replacer::{decode_base64_image, parse_to_runs, FormattedRun};
use proptest::prelude::*;

// Text without markup characters, so tags are the only structure.
fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,\n]{0,12}"
}

fn tag_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["b", "strong", "i", "em", "u", "span", "code"])
}

// Balanced markup built from nested (tag, text) pairs, plus its stripped text.
fn markup_strategy() -> impl Strategy<Value = (String, String)> {
    let leaf = text_strategy().prop_map(|t| (t.clone(), t));
    leaf.prop_recursive(4, 32, 4, |inner| {
        (tag_strategy(), prop::collection::vec(inner, 1..4)).prop_map(|(tag, children)| {
            let mut html = format!("<{tag}>");
            let mut text = String::new();
            for (child_html, child_text) in children {
                html.push_str(&child_html);
                text.push_str(&child_text);
            }
            html.push_str(&format!("</{tag}>"));
            (html, text)
        })
    })
}

fn concat(runs: &[FormattedRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

proptest! {
    #[test]
    fn prop_runs_concatenate_to_stripped_text((html, text) in markup_strategy()) {
        let runs = parse_to_runs(&html);
        prop_assert_eq!(concat(&runs), text);
    }

    #[test]
    fn prop_never_empty_and_no_empty_runs(input in ".{0,40}") {
        let runs = parse_to_runs(&input);
        prop_assert!(!runs.is_empty());
        if runs.len() > 1 {
            prop_assert!(runs.iter().all(|r| !r.text.is_empty()));
        }
    }

    #[test]
    fn prop_balanced_markup_ends_unformatted((html, _text) in markup_strategy()) {
        let tail = parse_to_runs(&format!("{html}<span>tail</span>"));
        let last = tail.last().unwrap();
        prop_assert_eq!(last.text.as_str(), "tail");
        prop_assert!(last.is_plain());
    }

    #[test]
    fn prop_base64_round_trip(
        bytes in prop::collection::vec(any::<u8>(), 0..256),
        with_prefix in any::<bool>(),
        wrap_at in 1usize..80,
    ) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        // Line-wrapped payloads must decode the same as compact ones.
        let wrapped: String = encoded
            .as_bytes()
            .chunks(wrap_at)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let payload = if with_prefix {
            format!("data:image/png;base64,{wrapped}")
        } else {
            wrapped
        };
        prop_assert_eq!(decode_base64_image(&payload).unwrap(), bytes);
    }
}
