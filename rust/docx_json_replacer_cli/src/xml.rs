//! Small helpers over quick-xml events for WordprocessingML fragments.

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Writer;

pub type Events = Vec<Event<'static>>;

/// Schema order of `w:rPr` children.
pub const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
];

/// Schema order of `w:pPr` children.
pub const PPR_ORDER: &[&str] = &[
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

/// An element with everything inside it, or a single non-element event.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub events: Events,
}

impl Node {
    pub fn empty(name: &'static str, attrs: &[(&str, &str)]) -> Self {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        Self {
            events: vec![Event::Empty(start)],
        }
    }

    pub fn name(&self) -> Option<&[u8]> {
        match self.events.first()? {
            Event::Start(e) | Event::Empty(e) => Some(e.name().into_inner()),
            _ => None,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name() == Some(name.as_bytes())
    }

    pub fn is_blank_text(&self) -> bool {
        match self.events.as_slice() {
            [Event::Text(t)] => t.iter().all(u8::is_ascii_whitespace),
            _ => false,
        }
    }

    /// Events between the start and end tag.
    pub fn inner(&self) -> &[Event<'static>] {
        match self.events.as_slice() {
            [Event::Start(_), inner @ .., Event::End(_)] => inner,
            _ => &[],
        }
    }

    pub fn children(&self) -> Vec<Node> {
        split_nodes(self.inner())
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        self.children().into_iter().find(|c| c.is(name))
    }

    /// Any descendant start or empty tag matching `pred`.
    pub fn contains(&self, pred: impl Fn(&[u8]) -> bool) -> bool {
        self.inner().iter().any(|ev| match ev {
            Event::Start(e) | Event::Empty(e) => pred(e.name().as_ref()),
            _ => false,
        })
    }
}

/// Group a flat event list into top-level nodes.
pub fn split_nodes(events: &[Event<'static>]) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for ev in events {
        match ev {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push(ev.clone());
        if depth == 0 {
            nodes.push(Node {
                events: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        nodes.push(Node { events: current });
    }
    nodes
}

/// Drop `remove`d and blank children, add `add`, and sort into `order`.
/// Unknown elements keep their relative order after known ones.
pub fn merge_ordered(base: &[Node], remove: &[&str], add: Vec<Node>, order: &[&str]) -> Vec<Node> {
    let mut merged: Vec<Node> = base
        .iter()
        .filter(|n| !n.is_blank_text() && !remove.iter().any(|name| n.is(name)))
        .cloned()
        .chain(add)
        .collect();
    merged.sort_by_key(|n| {
        n.name()
            .and_then(|name| order.iter().position(|o| o.as_bytes() == name))
            .unwrap_or(order.len())
    });
    merged
}

pub fn write_events<'a>(
    writer: &mut Writer<Vec<u8>>,
    events: impl IntoIterator<Item = &'a Event<'static>>,
) -> Result<()> {
    for ev in events {
        writer.write_event(ev)?;
    }
    Ok(())
}

pub fn nodes_to_string(nodes: &[Node]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    for node in nodes {
        write_events(&mut writer, &node.events)?;
    }
    Ok(String::from_utf8(writer.into_inner())?)
}
