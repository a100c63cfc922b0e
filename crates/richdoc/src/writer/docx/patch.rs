//! A streaming finishing pass over `word/document.xml`.
//!
//! The document builder cannot express a few properties: paragraph and run
//! direction, paragraph shading and borders, visual column order of tables
//! and repeated header rows. The writer records them per element, in the
//! order the elements are emitted, and this pass inserts them into the
//! property element of each container at the position the schema requires.

use ecow::EcoString;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};

use crate::Result;

/// Child order of `w:pPr`, up to the children this pass inserts.
const PPR_ORDER: &[&str] = &[
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
];

/// Child order of `w:rPr`, up to `w:rtl`.
const RPR_ORDER: &[&str] = &[
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
];

/// Child order of `w:tblPr`, up to `w:bidiVisual`.
const TBLPR_ORDER: &[&str] = &["w:tblStyle", "w:tblpPr", "w:tblOverlap", "w:bidiVisual"];

/// Child order of `w:trPr`, up to `w:tblHeader`.
const TRPR_ORDER: &[&str] = &[
    "w:cnfStyle",
    "w:divId",
    "w:gridBefore",
    "w:gridAfter",
    "w:wBefore",
    "w:wAfter",
    "w:cantSplit",
    "w:trHeight",
    "w:tblHeader",
];

/// Child order of `w:settings`, up to `w:embedTrueTypeFonts`.
pub(crate) const SETTINGS_ORDER: &[&str] = &[
    "w:writeProtection",
    "w:view",
    "w:zoom",
    "w:removePersonalInformation",
    "w:removeDateAndTime",
    "w:doNotDisplayPageBoundaries",
    "w:displayBackgroundShape",
    "w:printPostScriptOverText",
    "w:printFractionalCharacterWidth",
    "w:printFormsData",
    "w:embedTrueTypeFonts",
];

/// Properties added to one paragraph.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParagraphPatch {
    /// Lay the paragraph out right to left.
    pub bidi: bool,
    /// Mark the runs of the paragraph right to left.
    pub rtl_runs: bool,
    /// Background fill, as 6 hex digits.
    pub shading: Option<&'static str>,
    /// Draw a rule under the paragraph.
    pub bottom_border: bool,
}

/// Everything the finishing pass adds, in emission order per element kind.
#[derive(Debug, Default)]
pub(crate) struct DocumentPatches {
    /// One entry per `w:p`.
    pub paragraphs: Vec<ParagraphPatch>,
    /// Whether each `w:tbl` has right-to-left column order.
    pub tables: Vec<bool>,
    /// Whether each `w:tr` repeats as a header row.
    pub rows: Vec<bool>,
    /// The alternative text of each picture.
    pub images: Vec<Option<EcoString>>,
}

impl DocumentPatches {
    /// Whether the pass would leave the document unchanged.
    pub fn is_noop(&self) -> bool {
        self.paragraphs.iter().all(|p| *p == ParagraphPatch::default())
            && !self.tables.iter().any(|rtl| *rtl)
            && !self.rows.iter().any(|header| *header)
            && self.images.iter().all(Option::is_none)
    }
}

/// An element to insert, ranked by its position in the parent's child order.
#[derive(Debug, Clone)]
pub(crate) struct Injection {
    rank: usize,
    events: Vec<Event<'static>>,
}

impl Injection {
    /// An empty element with attributes.
    pub fn empty(order: &[&str], name: &'static str, attrs: &[(&str, &str)]) -> Self {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        Self {
            rank: rank_of(order, name),
            events: vec![Event::Empty(start)],
        }
    }

    /// Prebuilt events, placed after every existing child.
    pub fn raw(events: Vec<Event<'static>>) -> Self {
        Self {
            rank: usize::MAX,
            events,
        }
    }

    /// An element wrapping one empty child.
    fn nested(
        order: &[&str],
        name: &'static str,
        child: &'static str,
        attrs: &[(&str, &str)],
    ) -> Self {
        let child = BytesStart::new(child).with_attributes(attrs.iter().copied());
        Self {
            rank: rank_of(order, name),
            events: vec![
                Event::Start(BytesStart::new(name)),
                Event::Empty(child),
                Event::End(BytesEnd::new(name)),
            ],
        }
    }
}

fn rank_of(order: &[&str], name: &str) -> usize {
    order
        .iter()
        .position(|known| *known == name)
        .unwrap_or(usize::MAX)
}

/// Interleaves injections with the existing children of an element.
pub(crate) struct ChildMerge {
    order: &'static [&'static str],
    pending: Vec<Injection>,
    depth: usize,
}

impl ChildMerge {
    pub fn new(order: &'static [&'static str], mut pending: Vec<Injection>) -> Self {
        pending.sort_by_key(|inj| inj.rank);
        Self {
            order,
            pending,
            depth: 0,
        }
    }

    /// Feeds one event from inside the element. Returns `false` once the
    /// element has ended.
    pub fn feed(&mut self, event: Event<'_>, writer: &mut Writer<Vec<u8>>) -> Result<bool> {
        match &event {
            Event::Start(e) | Event::Empty(e) if self.depth == 0 => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                self.flush_before(rank_of(self.order, &name), writer)?;
                if matches!(event, Event::Start(_)) {
                    self.depth += 1;
                }
            }
            Event::Start(_) => self.depth += 1,
            Event::End(_) if self.depth == 0 => {
                self.flush_remaining(writer)?;
                writer.write_event(event)?;
                return Ok(false);
            }
            Event::End(_) => self.depth -= 1,
            _ => {}
        }
        writer.write_event(event)?;
        Ok(true)
    }

    /// Writes the pending injections ranked before `rank` and drops those
    /// that the element already has.
    fn flush_before(&mut self, rank: usize, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let split = self.pending.partition_point(|inj| inj.rank < rank);
        for inj in self.pending.drain(..split) {
            write_all(writer, &inj.events)?;
        }
        if rank != usize::MAX {
            self.pending.retain(|inj| inj.rank != rank);
        }
        Ok(())
    }

    fn flush_remaining(&mut self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        for inj in self.pending.drain(..) {
            write_all(writer, &inj.events)?;
        }
        Ok(())
    }

    /// Writes every pending injection.
    pub fn flush_all(mut self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        self.flush_remaining(writer)
    }
}

fn write_all(writer: &mut Writer<Vec<u8>>, events: &[Event<'static>]) -> Result<()> {
    for event in events {
        writer.write_event(event.clone())?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Container {
    Paragraph,
    Run,
    Table,
    Row,
}

impl Container {
    fn properties(self) -> &'static str {
        match self {
            Self::Paragraph => "w:pPr",
            Self::Run => "w:rPr",
            Self::Table => "w:tblPr",
            Self::Row => "w:trPr",
        }
    }

    fn order(self) -> &'static [&'static str] {
        match self {
            Self::Paragraph => PPR_ORDER,
            Self::Run => RPR_ORDER,
            Self::Table => TBLPR_ORDER,
            Self::Row => TRPR_ORDER,
        }
    }
}

fn paragraph_injections(patch: &ParagraphPatch) -> Vec<Injection> {
    let mut injections = Vec::new();
    if patch.bottom_border {
        injections.push(Injection::nested(
            PPR_ORDER,
            "w:pBdr",
            "w:bottom",
            &[
                ("w:val", "single"),
                ("w:sz", "6"),
                ("w:space", "1"),
                ("w:color", "auto"),
            ],
        ));
    }
    if let Some(fill) = patch.shading {
        injections.push(Injection::empty(
            PPR_ORDER,
            "w:shd",
            &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", fill)],
        ));
    }
    if patch.bidi {
        injections.push(Injection::empty(PPR_ORDER, "w:bidi", &[]));
    }
    injections
}

/// What the pass is doing with the next event.
enum Mode {
    /// Copying events through.
    Copy,
    /// A container just started; its property element may follow.
    Awaiting(Container, Vec<Injection>),
    /// Inside a property element.
    Merging(ChildMerge),
}

/// Applies the recorded patches to the document part.
pub(crate) fn patch_document(xml: &str, patches: &DocumentPatches) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + xml.len() / 8));

    let mut mode = Mode::Copy;
    let (mut paragraphs, mut tables, mut rows, mut images) = (0, 0, 0, 0);
    let mut rtl_runs: Vec<bool> = Vec::new();

    loop {
        let event = reader.read_event()?;
        if matches!(event, Event::Eof) {
            break;
        }

        match std::mem::replace(&mut mode, Mode::Copy) {
            Mode::Copy => {}
            Mode::Merging(mut merge) => {
                if merge.feed(event, &mut writer)? {
                    mode = Mode::Merging(merge);
                }
                continue;
            }
            Mode::Awaiting(container, injections) => {
                let props = container.properties();
                match &event {
                    Event::Start(e) if e.name().as_ref() == props.as_bytes() => {
                        writer.write_event(event)?;
                        mode = Mode::Merging(ChildMerge::new(container.order(), injections));
                        continue;
                    }
                    Event::Empty(e) if e.name().as_ref() == props.as_bytes() => {
                        let start = e.to_owned();
                        writer.write_event(Event::Start(start))?;
                        ChildMerge::new(container.order(), injections).flush_all(&mut writer)?;
                        writer.write_event(Event::End(BytesEnd::new(props)))?;
                        continue;
                    }
                    _ => {
                        writer.write_event(Event::Start(BytesStart::new(props)))?;
                        ChildMerge::new(container.order(), injections).flush_all(&mut writer)?;
                        writer.write_event(Event::End(BytesEnd::new(props)))?;
                    }
                }
            }
        }

        let (is_start, name) = match &event {
            Event::Start(e) => (true, e.name().as_ref().to_vec()),
            Event::Empty(e) => (false, e.name().as_ref().to_vec()),
            Event::End(e) => {
                if e.name().as_ref() == b"w:p" {
                    rtl_runs.pop();
                }
                writer.write_event(event)?;
                continue;
            }
            _ => {
                writer.write_event(event)?;
                continue;
            }
        };

        let injections = match name.as_slice() {
            b"w:p" => {
                let patch = patches.paragraphs.get(paragraphs).cloned().unwrap_or_default();
                paragraphs += 1;
                if is_start {
                    rtl_runs.push(patch.rtl_runs);
                }
                Some((Container::Paragraph, paragraph_injections(&patch)))
            }
            b"w:r" if rtl_runs.last() == Some(&true) => Some((
                Container::Run,
                vec![Injection::empty(RPR_ORDER, "w:rtl", &[])],
            )),
            b"w:tbl" => {
                let rtl = patches.tables.get(tables).copied().unwrap_or_default();
                tables += 1;
                let injections = match rtl {
                    true => vec![Injection::empty(TBLPR_ORDER, "w:bidiVisual", &[])],
                    false => Vec::new(),
                };
                Some((Container::Table, injections))
            }
            b"w:tr" => {
                let header = patches.rows.get(rows).copied().unwrap_or_default();
                rows += 1;
                let injections = match header {
                    true => vec![Injection::empty(TRPR_ORDER, "w:tblHeader", &[])],
                    false => Vec::new(),
                };
                Some((Container::Row, injections))
            }
            b"wp:docPr" => {
                let alt = patches.images.get(images).cloned().flatten();
                images += 1;
                if let (Some(alt), Event::Start(e) | Event::Empty(e)) = (alt, &event) {
                    let mut start = BytesStart::new(String::from_utf8_lossy(&name).into_owned());
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() != b"descr" {
                            start.push_attribute(attr);
                        }
                    }
                    start.push_attribute(("descr", alt.as_str()));
                    writer.write_event(match is_start {
                        true => Event::Start(start),
                        false => Event::Empty(start),
                    })?;
                    continue;
                }
                None
            }
            _ => None,
        };

        match injections {
            Some((container, injections)) if !injections.is_empty() => {
                if is_start {
                    writer.write_event(event)?;
                    mode = Mode::Awaiting(container, injections);
                } else if let Event::Empty(e) = &event {
                    // A self-closed container gets a property element of its own.
                    let props = container.properties();
                    writer.write_event(Event::Start(e.to_owned()))?;
                    writer.write_event(Event::Start(BytesStart::new(props)))?;
                    ChildMerge::new(container.order(), injections).flush_all(&mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new(props)))?;
                    writer.write_event(Event::End(e.to_end().into_owned()))?;
                }
            }
            _ => writer.write_event(event)?,
        }
    }

    if paragraphs != patches.paragraphs.len() {
        log::warn!(
            "finishing pass saw {paragraphs} paragraphs but {} were recorded",
            patches.paragraphs.len()
        );
    }

    String::from_utf8(writer.into_inner()).map_err(|_| "patched document is not UTF-8".into())
}

/// Inserts children into the first `parent` element of an XML part, at the
/// positions given by `order`. A ranked child is not inserted when the
/// element already has one of the same name.
pub(crate) fn insert_children(
    xml: &str,
    parent: &str,
    order: &'static [&'static str],
    children: Vec<Injection>,
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 64));
    let mut merge: Option<ChildMerge> = None;
    let mut done = false;

    loop {
        let event = reader.read_event()?;
        if matches!(event, Event::Eof) {
            break;
        }
        if let Some(active) = merge.as_mut() {
            if !active.feed(event, &mut writer)? {
                merge = None;
                done = true;
            }
            continue;
        }
        match &event {
            Event::Start(e) if !done && e.name().as_ref() == parent.as_bytes() => {
                writer.write_event(event)?;
                merge = Some(ChildMerge::new(order, children.clone()));
            }
            Event::Empty(e) if !done && e.name().as_ref() == parent.as_bytes() => {
                writer.write_event(Event::Start(e.to_owned()))?;
                ChildMerge::new(order, children.clone()).flush_all(&mut writer)?;
                writer.write_event(Event::End(e.to_end().into_owned()))?;
                done = true;
            }
            _ => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|_| "patched part is not UTF-8".into())
}
