//! Reader for the parts of a DOCX package the converter cares about.
//!
//! The package is flattened into a [`SourceDocument`]: top-level paragraphs
//! and tables in document order, each paragraph carrying its style name and
//! its runs (text + italic flag, or a footnote anchor), plus the footnote
//! table from `word/footnotes.xml`.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;
use zip::result::ZipError;

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const FOOTNOTES_PART: &str = "word/footnotes.xml";

/// Footnote id → footnote runs.
pub type Footnotes = BTreeMap<String, Vec<Run>>;

#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid DOCX package: {0}")]
    Zip(#[from] ZipError),
    #[error("malformed XML in {part}: {source}")]
    Xml {
        part: &'static str,
        #[source]
        source: quick_xml::Error,
    },
    #[error("package has no {0} part")]
    MissingPart(&'static str),
}

/// A run of text sharing one formatting, or a footnote anchor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Run {
    pub text: String,
    pub italic: bool,
    /// Id of the referenced footnote when this run is an anchor.
    pub footnote: Option<String>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Run { text: text.into(), italic: false, footnote: None }
    }

    pub fn italic(text: impl Into<String>) -> Self {
        Run { text: text.into(), italic: true, footnote: None }
    }

    pub fn footnote(id: impl Into<String>) -> Self {
        Run { text: String::new(), italic: false, footnote: Some(id.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Paragraph {
    /// Style name (not id). `None` when the paragraph uses the default style.
    pub style: Option<String>,
    pub runs: Vec<Run>,
    pub in_table: bool,
}

impl Paragraph {
    pub fn new(style: Option<&str>, runs: Vec<Run>) -> Self {
        Paragraph { style: style.map(str::to_string), runs, in_table: false }
    }

    /// Paragraph with a single plain run.
    pub fn styled(style: &str, text: &str) -> Self {
        Paragraph::new(Some(style), vec![Run::plain(text)])
    }

    pub fn unstyled(text: &str) -> Self {
        Paragraph::new(None, vec![Run::plain(text)])
    }

    /// Style name with the word-processor default filled in.
    pub fn style_name(&self) -> &str {
        self.style.as_deref().unwrap_or("Normal")
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
    pub paragraphs: Vec<Paragraph>,
}

impl Cell {
    pub fn text(&self) -> String {
        self.paragraphs.iter().map(Paragraph::text).join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDocument {
    pub blocks: Vec<Block>,
    pub footnotes: Footnotes,
}

impl SourceDocument {
    pub fn new(blocks: Vec<Block>, footnotes: Footnotes) -> Self {
        SourceDocument { blocks, footnotes }
    }

    /// Document made of top-level paragraphs only.
    pub fn from_paragraphs(paragraphs: Vec<Paragraph>) -> Self {
        SourceDocument {
            blocks: paragraphs.into_iter().map(Block::Paragraph).collect(),
            footnotes: Footnotes::new(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DocxError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, DocxError> {
        let mut archive = ZipArchive::new(reader)?;

        let document = read_part(&mut archive, DOCUMENT_PART)?
            .ok_or(DocxError::MissingPart(DOCUMENT_PART))?;
        let style_names = match read_part(&mut archive, STYLES_PART)? {
            Some(xml) => parse_style_names(&xml)?,
            None => HashMap::new(),
        };
        let footnotes = match read_part(&mut archive, FOOTNOTES_PART)? {
            Some(xml) => {
                let mut part = PartReader::new(&style_names);
                part.read(&xml, FOOTNOTES_PART)?;
                part.footnotes
            }
            None => Footnotes::new(),
        };

        let mut part = PartReader::new(&style_names);
        part.read(&document, DOCUMENT_PART)?;

        Ok(SourceDocument { blocks: part.blocks, footnotes })
    }

    /// Top-level paragraphs (table contents excluded).
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            Block::Table(_) => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            Block::Paragraph(_) => None,
        })
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &'static str,
) -> Result<Option<String>, DocxError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)?;
            Ok(Some(xml))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn attribute(e: &BytesStart, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `w:val` toggles: absent or anything but an explicit "off" means on.
fn toggle_on(e: &BytesStart) -> bool {
    !matches!(attribute(e, b"val").as_deref(), Some("0" | "false" | "off"))
}

fn parse_style_names(xml: &str) -> Result<HashMap<String, String>, DocxError> {
    let mut names = HashMap::new();
    let mut reader = Reader::from_str(xml);
    let mut current: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|source| DocxError::Xml { part: STYLES_PART, source })?;
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"style" => {
                current = attribute(&e, b"styleId");
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"name" => {
                if let (Some(id), Some(name)) = (&current, attribute(&e, b"val")) {
                    names.insert(id.clone(), name);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"style" => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(names)
}

#[derive(Default)]
struct RunBuilder {
    italic: bool,
    text: String,
}

#[derive(Default)]
struct ParagraphBuilder {
    style_id: Option<String>,
    runs: Vec<Run>,
}

/// Event-driven reader shared by the document and footnotes parts.
struct PartReader<'s> {
    style_names: &'s HashMap<String, String>,
    blocks: Vec<Block>,
    tables: Vec<Table>,
    paragraph: Option<ParagraphBuilder>,
    /// Open `<w:p>` elements; text boxes nest paragraphs inside a run.
    paragraph_depth: usize,
    /// Open `<mc:Fallback>` elements, whose content duplicates the preceding choice.
    fallback_depth: usize,
    run: Option<RunBuilder>,
    in_ppr: bool,
    in_rpr: bool,
    in_text: bool,
    footnote: Option<(String, Vec<Run>)>,
    footnotes: Footnotes,
}

impl<'s> PartReader<'s> {
    fn new(style_names: &'s HashMap<String, String>) -> Self {
        PartReader {
            style_names,
            blocks: Vec::new(),
            tables: Vec::new(),
            paragraph: None,
            paragraph_depth: 0,
            fallback_depth: 0,
            run: None,
            in_ppr: false,
            in_rpr: false,
            in_text: false,
            footnote: None,
            footnotes: Footnotes::new(),
        }
    }

    fn read(&mut self, xml: &str, part: &'static str) -> Result<(), DocxError> {
        let mut reader = Reader::from_str(xml);
        loop {
            let event = reader
                .read_event()
                .map_err(|source| DocxError::Xml { part, source })?;
            match event {
                Event::Start(e) if e.local_name().as_ref() == b"Fallback" => self.fallback_depth += 1,
                Event::End(e) if e.local_name().as_ref() == b"Fallback" => {
                    self.fallback_depth = self.fallback_depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ if self.fallback_depth > 0 => {}
                Event::Start(e) => self.handle_open(&e, false),
                Event::Empty(e) => {
                    self.handle_open(&e, true);
                    self.handle_close(e.local_name().as_ref());
                }
                Event::End(e) => self.handle_close(e.local_name().as_ref()),
                Event::Text(t) => {
                    if self.in_text {
                        let text = t
                            .unescape()
                            .map_err(|source| DocxError::Xml { part, source })?;
                        self.push_text(&text);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_open(&mut self, e: &BytesStart, empty: bool) {
        match e.local_name().as_ref() {
            b"footnote" => {
                let kind = attribute(e, b"type");
                let regular = !matches!(
                    kind.as_deref(),
                    Some("separator" | "continuationSeparator" | "continuationNotice")
                );
                if regular && !empty {
                    if let Some(id) = attribute(e, b"id") {
                        self.footnote = Some((id, Vec::new()));
                    }
                }
            }
            b"tbl" => self.tables.push(Table::default()),
            b"tr" => {
                if let Some(table) = self.tables.last_mut() {
                    table.rows.push(Vec::new());
                }
            }
            b"tc" => {
                if let Some(row) = self.tables.last_mut().and_then(|t| t.rows.last_mut()) {
                    row.push(Cell::default());
                }
            }
            b"p" => {
                // paragraphs of a text box add their runs to the enclosing one
                self.paragraph_depth += 1;
                if self.paragraph.is_none() {
                    self.paragraph = Some(ParagraphBuilder::default());
                }
            }
            b"pPr" => self.in_ppr = true,
            b"pStyle" if self.in_ppr && self.paragraph_depth == 1 => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.style_id = attribute(e, b"val");
                }
            }
            b"r" if self.paragraph.is_some() => {
                self.flush_run_text();
                self.run = Some(RunBuilder::default());
            }
            b"rPr" => self.in_rpr = true,
            b"i" if self.in_rpr => {
                if let Some(run) = self.run.as_mut() {
                    run.italic = toggle_on(e);
                }
            }
            b"t" if self.run.is_some() => self.in_text = !empty,
            b"tab" if self.run.is_some() && !self.in_ppr => self.push_text("\t"),
            b"br" | b"cr" if self.run.is_some() => self.push_text("\n"),
            b"noBreakHyphen" if self.run.is_some() => self.push_text("-"),
            b"footnoteReference" => {
                if let Some(id) = attribute(e, b"id") {
                    self.flush_run_text();
                    if let Some(p) = self.paragraph.as_mut() {
                        p.runs.push(Run::footnote(id));
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_close(&mut self, local: &[u8]) {
        match local {
            b"t" => self.in_text = false,
            b"rPr" => self.in_rpr = false,
            b"pPr" => self.in_ppr = false,
            b"r" => {
                self.flush_run_text();
                self.run = None;
            }
            b"p" => {
                self.paragraph_depth = self.paragraph_depth.saturating_sub(1);
                if self.paragraph_depth == 0 {
                    self.finish_paragraph();
                }
            }
            b"tbl" => {
                if let Some(table) = self.tables.pop() {
                    match self.tables.last_mut().and_then(|t| t.rows.last_mut()).and_then(|r| r.last_mut()) {
                        // nested tables are flattened into the enclosing cell
                        Some(cell) => cell
                            .paragraphs
                            .extend(table.rows.into_iter().flatten().flat_map(|c| c.paragraphs)),
                        None => self.blocks.push(Block::Table(table)),
                    }
                }
            }
            b"footnote" => {
                if let Some((id, runs)) = self.footnote.take() {
                    if runs.iter().any(|r| !r.text.trim().is_empty()) {
                        self.footnotes.insert(id, runs);
                    }
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(run) = self.run.as_mut() {
            run.text.push_str(text);
        }
    }

    /// Moves the pending run text into the paragraph, keeping the run open.
    fn flush_run_text(&mut self) {
        let (Some(run), Some(p)) = (self.run.as_mut(), self.paragraph.as_mut()) else {
            return;
        };
        if !run.text.is_empty() {
            p.runs.push(Run {
                text: std::mem::take(&mut run.text),
                italic: run.italic,
                footnote: None,
            });
        }
    }

    fn finish_paragraph(&mut self) {
        let Some(builder) = self.paragraph.take() else {
            return;
        };
        let style = builder
            .style_id
            .map(|id| self.style_names.get(&id).cloned().unwrap_or(id));
        let mut paragraph = Paragraph { style, runs: builder.runs, in_table: false };

        if let Some((_, runs)) = self.footnote.as_mut() {
            if !runs.is_empty() && !paragraph.runs.is_empty() {
                runs.push(Run::plain(" "));
            }
            runs.append(&mut paragraph.runs);
            return;
        }

        if let Some(cell) = self
            .tables
            .last_mut()
            .and_then(|t| t.rows.last_mut())
            .and_then(|r| r.last_mut())
        {
            paragraph.in_table = true;
            cell.paragraphs.push(paragraph);
        } else {
            self.blocks.push(Block::Paragraph(paragraph));
        }
    }
}
