//! Body assembler: walks the classified paragraphs from the title onwards and
//! emits the TEI lines that go inside `<div type="Texto">`.
//!
//! Open blocks are tracked as independent flags. A speech may sit inside an
//! act; the cast list and the dedication never contain a speech.

use std::fmt;

use tracing::{debug, warn};

use crate::docx::{Footnotes, Paragraph};
use crate::inline::{FootnoteKind, format_paragraph};
use crate::notes::{AnnotationContext, NoteTable, resolve_annotations};
use crate::numbering::{NumberedLine, PendingSplit, SplitPart, VerseLabel, VerseNumbering};
use crate::speaker::CastMap;
use crate::style::{Role, classify_paragraph};

/// Indentation of the body root (children of `<div type="Texto">`).
pub const BODY_INDENT: usize = 8;
const STEP: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyWarning {
    /// A split verse never got its final part.
    IncompleteSplit { base: u32 },
    /// A middle or final part with no initial part before it.
    OrphanSplitPart { paragraph: usize, part: SplitPart },
}

impl fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyWarning::IncompleteSplit { base } => {
                write!(f, "split verse {} has no final part", base)
            }
            AssemblyWarning::OrphanSplitPart { paragraph, part } => write!(
                f,
                "paragraph {}: split part {} without an initial part",
                paragraph,
                part.attr()
            ),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct OpenBlocks {
    act: bool,
    cast_list: bool,
    dedication: bool,
    speech: bool,
}

impl OpenBlocks {
    fn depth(&self) -> usize {
        // the cast list is a <div> wrapping a <castList>
        self.act as usize + 2 * self.cast_list as usize + self.dedication as usize + self.speech as usize
    }
}

/// Result of a body walk.
#[derive(Debug)]
pub struct Assembly {
    pub lines: Vec<String>,
    pub warnings: Vec<AssemblyWarning>,
    pub cast: CastMap,
    /// Last verse number handed out.
    pub last_verse: u32,
}

pub struct Assembler<'a> {
    general: &'a NoteTable,
    apparatus: &'a NoteTable,
    footnotes: &'a Footnotes,
    open: OpenBlocks,
    acts: u32,
    numbering: VerseNumbering,
    stanza: Option<String>,
    annotations: AnnotationContext,
    cast: CastMap,
    title_seen: bool,
    lines: Vec<String>,
    warnings: Vec<AssemblyWarning>,
}

impl<'a> Assembler<'a> {
    pub fn new(general: &'a NoteTable, apparatus: &'a NoteTable, footnotes: &'a Footnotes) -> Self {
        Assembler {
            general,
            apparatus,
            footnotes,
            open: OpenBlocks::default(),
            acts: 0,
            numbering: VerseNumbering::new(),
            stanza: None,
            annotations: AnnotationContext::new(),
            cast: CastMap::new(),
            title_seen: false,
            lines: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Processes one paragraph; `index` is its position in the source
    /// document and only shows up in warnings.
    pub fn feed(&mut self, index: usize, paragraph: &Paragraph) {
        if paragraph.is_blank() {
            return;
        }
        let role = classify_paragraph(paragraph);
        debug!(index, ?role, "body paragraph");

        let markup = format_paragraph(paragraph, self.footnotes, FootnoteKind::Body);
        match role {
            Role::Milestone(label) => self.stanza = Some(label),
            Role::Title => self.title(&markup),
            Role::Subtitle => {
                let text = self.annotate(&markup, "subtitle");
                self.emit(format!(r#"<head type="subTitle">{}</head>"#, text));
            }
            Role::Act => self.act(&markup),
            Role::CastListHeading => self.cast_list_heading(&markup),
            Role::CastListEntry => self.cast_entry(paragraph, &markup),
            Role::DedicationHeading => {
                self.close_all();
                let text = self.annotate(&markup, "head");
                self.emit(r#"<div type="dedicatoria">"#);
                self.open.dedication = true;
                self.emit(format!("<head>{}</head>", text));
            }
            Role::Speaker => self.speaker(paragraph, &markup),
            Role::Verse => self.verse(&markup),
            Role::SplitInitial => self.split_initial(paragraph, &markup),
            Role::SplitMiddle => self.split_part(index, SplitPart::Middle, paragraph, &markup),
            Role::SplitFinal => self.split_part(index, SplitPart::Final, paragraph, &markup),
            Role::StageDirection => {
                self.close_cast_list();
                let text = self.annotate(&markup, "stage");
                self.emit(format!("<stage>{}</stage>", text));
            }
            Role::Prose => self.prose(&markup),
            Role::Gap => {
                self.close_cast_list();
                self.emit(r#"<gap reason="lacuna"/>"#);
            }
            Role::Trailer => {
                let text = self.annotate(&markup, "trailer");
                if !text.is_empty() {
                    self.close_speech();
                    self.close_cast_list();
                    self.emit(format!("<trailer>{}</trailer>", text));
                }
            }
            Role::Unstyled | Role::Unrecognized(_) => {
                debug!(index, style = paragraph.style_name(), "paragraph produces no output");
            }
        }
    }

    pub fn finish(mut self) -> Assembly {
        if let Some(pending) = self.numbering.finish() {
            self.incomplete(pending);
        }
        self.close_all();
        Assembly {
            lines: self.lines,
            warnings: self.warnings,
            cast: self.cast,
            last_verse: self.numbering.last_number(),
        }
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        let pad = BODY_INDENT + STEP * self.open.depth();
        self.lines.push(format!("{:pad$}{}", "", line.as_ref(), pad = pad));
    }

    fn annotate(&mut self, markup: &str, section: &str) -> String {
        resolve_annotations(markup, self.general, self.apparatus, &mut self.annotations, section)
    }

    fn title(&mut self, markup: &str) {
        if self.title_seen {
            debug!("repeated title paragraph skipped");
            return;
        }
        self.title_seen = true;
        let text = self.annotate(markup, "head");
        self.emit(format!(r#"<head type="mainTitle">{}</head>"#, text));
    }

    fn act(&mut self, markup: &str) {
        self.close_all();
        self.acts += 1;
        let text = self.annotate(markup, "head");
        self.emit(format!(r#"<div type="subsection" subtype="ACTO" n="{}">"#, self.acts));
        self.open.act = true;
        self.emit(format!(r#"<head type="acto">{}</head>"#, text));
    }

    fn cast_list_heading(&mut self, markup: &str) {
        self.close_all();
        let text = self.annotate(markup, "head");
        self.emit(r#"<div type="castList">"#);
        self.emit(format!("  <head>{}</head>", text));
        self.emit("  <castList>");
        self.open.cast_list = true;
    }

    fn cast_entry(&mut self, paragraph: &Paragraph, markup: &str) {
        let name = paragraph.text().replace('@', "");
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if !self.open.cast_list {
            self.close_speech();
            self.close_dedication();
            self.emit(r#"<div type="castList">"#);
            self.emit("  <castList>");
            self.open.cast_list = true;
        }
        let id = self.cast.declare(name);
        let label = markup.replace('@', "");
        self.emit(format!(r#"<castItem><role xml:id="{}">{}</role></castItem>"#, id, label));
    }

    fn speaker(&mut self, paragraph: &Paragraph, markup: &str) {
        self.close_speech();
        self.close_cast_list();
        self.close_dedication();

        let name = paragraph.text().replace('@', "");
        let text = self.annotate(markup, "speaker");
        match self.cast.resolve(&name).map(str::to_string) {
            Some(id) => self.emit(format!(r##"<sp who="#{}">"##, id)),
            None => {
                if !self.cast.is_empty() {
                    debug!(speaker = name.trim(), "speaker without a cast entry");
                }
                self.emit("<sp>");
            }
        }
        self.open.speech = true;
        self.emit(format!("<speaker>{}</speaker>", text));
    }

    fn flush_stanza(&mut self) {
        if let Some(label) = self.stanza.take() {
            self.emit(format!(r#"<milestone unit="stanza" type="{}"/>"#, label));
        }
    }

    fn verse(&mut self, markup: &str) {
        if self.open.dedication {
            let text = self.annotate(markup, "l");
            self.emit(format!("<l>{}</l>", text));
            return;
        }
        self.close_cast_list();
        self.flush_stanza();
        let NumberedLine { label, interrupted } = self.numbering.verse();
        if let Some(pending) = interrupted {
            self.incomplete(pending);
        }
        self.numbered_line(label, None, markup);
    }

    fn split_initial(&mut self, paragraph: &Paragraph, markup: &str) {
        self.close_cast_list();
        self.flush_stanza();
        let NumberedLine { label, interrupted } = self.numbering.split_initial(&paragraph.text());
        if let Some(pending) = interrupted {
            self.incomplete(pending);
        }
        self.numbered_line(label, Some(SplitPart::Initial), markup);
    }

    fn split_part(&mut self, index: usize, part: SplitPart, paragraph: &Paragraph, markup: &str) {
        self.close_cast_list();
        match self.numbering.split_part(part, &paragraph.text()) {
            Some(label) => self.numbered_line(label, Some(part), markup),
            None => {
                warn!(paragraph = index, part = part.attr(), "split verse part without an initial part");
                self.warnings.push(AssemblyWarning::OrphanSplitPart { paragraph: index, part });
                let text = self.annotate(markup, "l");
                self.emit(format!(r#"<l part="{}">{}</l>"#, part.attr(), text));
            }
        }
    }

    fn numbered_line(&mut self, label: VerseLabel, part: Option<SplitPart>, markup: &str) {
        let text = self.annotate(markup, "l");
        let n = label.to_string();
        let notes = self
            .annotations
            .verse_notes(&label.note_keys(), &n, self.general, self.apparatus);
        let line = match part {
            Some(part) => format!(r#"<l part="{}" n="{}">{}{}</l>"#, part.attr(), n, text, notes),
            None => format!(r#"<l n="{}">{}{}</l>"#, n, text, notes),
        };
        self.emit(line);
    }

    fn prose(&mut self, markup: &str) {
        let text = self.annotate(markup, "p");
        if text.is_empty() {
            return;
        }
        if self.open.cast_list {
            self.emit(format!("<castItem>{}</castItem>", text));
        } else {
            self.emit(format!("<p>{}</p>", text));
        }
    }

    fn incomplete(&mut self, pending: PendingSplit) {
        warn!(verse = pending.base, "split verse left without a final part");
        self.warnings.push(AssemblyWarning::IncompleteSplit { base: pending.base });
    }

    fn close_speech(&mut self) {
        if self.open.speech {
            self.open.speech = false;
            self.emit("</sp>");
        }
    }

    fn close_cast_list(&mut self) {
        if self.open.cast_list {
            self.open.cast_list = false;
            self.emit("  </castList>");
            self.emit("</div>");
        }
    }

    fn close_dedication(&mut self) {
        if self.open.dedication {
            self.open.dedication = false;
            self.emit("</div>");
        }
    }

    fn close_act(&mut self) {
        if self.open.act {
            self.open.act = false;
            self.emit("</div>");
        }
    }

    fn close_all(&mut self) {
        self.close_speech();
        self.close_cast_list();
        self.close_dedication();
        self.close_act();
    }
}

/// Runs a whole body walk over `(index, paragraph)` pairs.
pub fn assemble<'p, I>(
    paragraphs: I,
    general: &NoteTable,
    apparatus: &NoteTable,
    footnotes: &Footnotes,
) -> Assembly
where
    I: IntoIterator<Item = (usize, &'p Paragraph)>,
{
    let mut assembler = Assembler::new(general, apparatus, footnotes);
    for (index, paragraph) in paragraphs {
        assembler.feed(index, paragraph);
    }
    assembler.finish()
}
