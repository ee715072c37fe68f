//! Note tables (general notes and critical apparatus) and the `@word`
//! annotation resolver.
//!
//! A note file holds one entry per paragraph, either `12: body` (verse note,
//! optionally `12a:` for a part of a split verse) or `@word: body`. Each key
//! keeps every body it was given, in file order; the text consumes them one
//! at a time as the key recurs.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::docx::{DocxError, SourceDocument};
use crate::inline::{FootnoteKind, escape_xml, format_paragraph, merge_adjacent_italics};

static VERSE_ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([a-z])?\s*:\s*(.*)$").unwrap());
static WORD_ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@([^@:]+?)@?\s*:\s*(.*)$").unwrap());
static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());

/// Which of the two note categories a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteCategory {
    General,
    Apparatus,
}

impl NoteCategory {
    pub fn subtype(self) -> &'static str {
        match self {
            NoteCategory::General => "nota",
            NoteCategory::Apparatus => "aparato",
        }
    }

    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            NoteCategory::General => "notes",
            NoteCategory::Apparatus => "apparatus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoteKey {
    Verse { number: u32, part: Option<char> },
    Word(String),
}

impl NoteKey {
    pub fn verse(number: u32) -> Self {
        NoteKey::Verse { number, part: None }
    }

    pub fn verse_part(number: u32, part: char) -> Self {
        NoteKey::Verse { number, part: Some(part) }
    }

    /// Word key, normalized the same way markers are.
    pub fn word(raw: &str) -> Self {
        NoteKey::Word(normalize_word(raw))
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteKey::Verse { number, part: Some(c) } => write!(f, "{}{}", number, c),
            NoteKey::Verse { number, part: None } => write!(f, "{}", number),
            NoteKey::Word(w) => write!(f, "@{}", w),
        }
    }
}

/// Decomposes, drops diacritics and case-folds.
pub fn normalize_word(word: &str) -> String {
    word.trim()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteLineIssue {
    /// Matches neither `N:` nor `@word:`.
    Malformed,
    EmptyBody(NoteKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLineProblem {
    /// 1-based paragraph/line number in the note file.
    pub line: usize,
    pub text: String,
    pub issue: NoteLineIssue,
}

#[derive(Debug, Clone, Default)]
pub struct NoteTable {
    entries: BTreeMap<NoteKey, Vec<String>>,
    problems: Vec<NoteLineProblem>,
}

impl NoteTable {
    pub fn new() -> Self {
        NoteTable::default()
    }

    /// Builds a table from plain text, one entry per line.
    pub fn parse(text: &str) -> Self {
        let mut table = NoteTable::new();
        for (i, line) in text.lines().enumerate() {
            table.push_entry(i + 1, line, &escape_xml(line));
        }
        table
    }

    /// Builds a table from a note document; bodies keep their italics.
    pub fn from_document(doc: &SourceDocument) -> Self {
        let mut table = NoteTable::new();
        for (i, paragraph) in doc.paragraphs().enumerate() {
            let markup = format_paragraph(paragraph, &doc.footnotes, FootnoteKind::Body);
            table.push_entry(i + 1, &paragraph.text(), &markup);
        }
        table
    }

    /// Loads `.txt` files as plain text and anything else as DOCX.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DocxError> {
        let path = path.as_ref();
        let is_text = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if is_text {
            Ok(Self::parse(&std::fs::read_to_string(path)?))
        } else {
            Ok(Self::from_document(&SourceDocument::open(path)?))
        }
    }

    fn push_entry(&mut self, line: usize, plain: &str, markup: &str) {
        let plain = plain.trim();
        if plain.is_empty() {
            return;
        }

        let key = if let Some(caps) = VERSE_ENTRY.captures(plain) {
            match caps[1].parse::<u32>() {
                Ok(number) => NoteKey::Verse {
                    number,
                    part: caps.get(2).and_then(|m| m.as_str().chars().next()),
                },
                Err(_) => return self.reject(line, plain, NoteLineIssue::Malformed),
            }
        } else if let Some(caps) = WORD_ENTRY.captures(plain) {
            NoteKey::word(&caps[1])
        } else {
            return self.reject(line, plain, NoteLineIssue::Malformed);
        };

        let body = body_after_colon(markup).trim();
        if body.is_empty() {
            return self.reject(line, plain, NoteLineIssue::EmptyBody(key));
        }
        self.entries.entry(key).or_default().push(body.to_string());
    }

    fn reject(&mut self, line: usize, text: &str, issue: NoteLineIssue) {
        self.problems.push(NoteLineProblem { line, text: text.to_string(), issue });
    }

    pub fn notes(&self, key: &NoteKey) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &NoteKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&NoteKey, &[String])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn problems(&self) -> &[NoteLineProblem] {
        &self.problems
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything after the first `:` that is not inside a tag.
fn body_after_colon(markup: &str) -> &str {
    let mut in_tag = false;
    for (i, c) in markup.char_indices() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            ':' if !in_tag => return &markup[i + 1..],
            _ => {}
        }
    }
    ""
}

/// Notes due at one occurrence of a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueNotes<'t> {
    pub general: Option<&'t str>,
    pub apparatus: Option<&'t str>,
}

impl DueNotes<'_> {
    pub fn is_empty(&self) -> bool {
        self.general.is_none() && self.apparatus.is_none()
    }

    fn write_notes(&self, out: &mut String, attr: &str) {
        for (category, body) in [
            (NoteCategory::General, self.general),
            (NoteCategory::Apparatus, self.apparatus),
        ] {
            if let Some(body) = body {
                let _ = write!(out, r#"<note subtype="{}" {}>{}</note>"#, category.subtype(), attr, body);
            }
        }
    }
}

/// Occurrence counters owned by one conversion.
#[derive(Debug, Default)]
pub struct AnnotationContext {
    consumed: HashMap<NoteKey, usize>,
    ids: HashMap<(String, NoteKey), usize>,
}

impl AnnotationContext {
    pub fn new() -> Self {
        AnnotationContext::default()
    }

    /// Takes the next unconsumed note for `key` from each table.
    pub fn take<'t>(
        &mut self,
        key: &NoteKey,
        general: &'t NoteTable,
        apparatus: &'t NoteTable,
    ) -> DueNotes<'t> {
        if !general.contains(key) && !apparatus.contains(key) {
            return DueNotes::default();
        }
        let index = self.consumed.entry(key.clone()).or_insert(0);
        let due = DueNotes {
            general: general.notes(key).get(*index).map(String::as_str),
            apparatus: apparatus.notes(key).get(*index).map(String::as_str),
        };
        *index += 1;
        due
    }

    /// How many times `key` has been consumed so far.
    pub fn consumed(&self, key: &NoteKey) -> usize {
        self.consumed.get(key).copied().unwrap_or(0)
    }

    fn next_id(&mut self, section: &str, key: &NoteKey) -> String {
        let count = self.ids.entry((section.to_string(), key.clone())).or_insert(0);
        *count += 1;
        let raw = match key {
            NoteKey::Word(w) => format!("{}_{}_{}", w, section, count),
            other => format!("{}_{}_{}", other, section, count),
        };
        sanitize_id(&raw)
    }

    /// Verse notes for one numbered line, as `<note n="label">` elements.
    pub fn verse_notes(
        &mut self,
        keys: &[NoteKey],
        label: &str,
        general: &NoteTable,
        apparatus: &NoteTable,
    ) -> String {
        let mut out = String::new();
        let attr = format!(r#"n="{}""#, escape_xml(label));
        for key in keys {
            self.take(key, general, apparatus).write_notes(&mut out, &attr);
        }
        out
    }
}

/// Normalized keys of the `@word` markers in `text`, in order.
pub fn marker_keys(text: &str) -> Vec<NoteKey> {
    MARKER
        .captures_iter(text)
        .map(|caps| NoteKey::word(&caps[1]))
        .collect()
}

/// Keeps letters and digits of any script, which XML names allow.
fn sanitize_id(raw: &str) -> String {
    let id: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();
    if !id.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        format!("n{}", id)
    } else {
        id
    }
}

/// Replaces `@word` markers in `text` with the word followed by its notes.
///
/// Markers without any note lose their sigil; markers whose notes are all
/// consumed degrade the same way.
pub fn resolve_annotations(
    text: &str,
    general: &NoteTable,
    apparatus: &NoteTable,
    ctx: &mut AnnotationContext,
    section: &str,
) -> String {
    if text.is_empty() {
        return String::new();
    }
    let replaced = MARKER.replace_all(text, |caps: &Captures| {
        let word = &caps[1];
        let key = NoteKey::word(word);
        let due = ctx.take(&key, general, apparatus);
        if due.is_empty() {
            if general.contains(&key) || apparatus.contains(&key) {
                debug!(%key, "more markers than notes; leaving plain text");
            }
            return word.to_string();
        }
        let id = ctx.next_id(section, &key);
        let mut out = word.to_string();
        due.write_notes(&mut out, &format!(r#"xml:id="{}""#, id));
        out
    });
    merge_adjacent_italics(replaced.trim())
}
