//! Validator for manuscripts and their note files.
//!
//! Walks the same paragraph stream as the assembler and reports problems
//! without stopping the conversion. Numbering follows [`VerseNumbering`], so
//! "after verse N" matches the numbers in the generated XML.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::docx::{Block, SourceDocument};
use crate::notes::{NoteCategory, NoteKey, NoteLineIssue, NoteTable, marker_keys};
use crate::numbering::{PendingSplit, SplitPart, VerseNumbering};
use crate::style::{self, Role, classify_paragraph, is_bracket_only, is_punctuation_only};
use crate::{ConversionError, open_main};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Error: should be fixed before converting
    Error,
    /// Warning: recommended to fix
    Warning,
    /// Info: informational only
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Kind of diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    // === document structure ===
    /// No `Titulo_comedia` paragraph
    MissingTitle,
    /// A style outside the vocabulary
    UnknownStyle(String),
    /// Body text without a style
    UnstyledParagraph,

    // === verse numbering ===
    /// Split verse without its final part
    MissingFinalPart { base: u32 },
    /// Middle or final part with no initial part
    SplitPartWithoutInitial(SplitPart),
    /// `Laguna` holding only brackets
    BracketOnlyGap,
    /// `Verso` holding only brackets
    BracketOnlyVerse,

    // === note files ===
    AuxiliaryUnavailable(NoteCategory),
    MalformedNote(NoteCategory),
    EmptyNote(NoteCategory, NoteKey),
    MultipleNotes(NoteCategory, NoteKey),
    MarkerCountMismatch(NoteCategory, NoteKey),
    OrphanVerseNote(NoteCategory, NoteKey),
}

/// A diagnostic with location and message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Block index in the main document, or line in a note file.
    pub location: Option<usize>,
    /// Last verse number seen before the paragraph.
    pub after_verse: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            location: None,
            after_verse: None,
            message: message.into(),
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    fn at(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    fn after(mut self, verse: u32) -> Self {
        self.after_verse = Some(verse);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        match (self.location, self.after_verse) {
            (Some(at), Some(verse)) => write!(f, " (paragraph {}, after verse {})", at, verse),
            (Some(at), None) => write!(f, " (paragraph {})", at),
            (None, Some(verse)) => write!(f, " (after verse {})", verse),
            (None, None) => Ok(()),
        }
    }
}

const SNIPPET_CHARS: usize = 60;

fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > SNIPPET_CHARS {
        format!("{}…", text.chars().take(SNIPPET_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// What the body walk learned, for the note-file checks.
#[derive(Default)]
struct BodyFacts {
    labels: HashSet<NoteKey>,
    markers: HashMap<NoteKey, usize>,
}

/// Validates the main document and the optional note tables.
pub fn validate(
    doc: &SourceDocument,
    apparatus: Option<&NoteTable>,
    notes: Option<&NoteTable>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let body = check_body(doc, &mut diagnostics);

    for (category, table) in [
        (NoteCategory::Apparatus, apparatus),
        (NoteCategory::General, notes),
    ] {
        if let Some(table) = table {
            check_note_table(category, table, body.as_ref(), &mut diagnostics);
        }
    }

    debug!(count = diagnostics.len(), "validation finished");
    diagnostics
}

fn check_body(doc: &SourceDocument, diagnostics: &mut Vec<Diagnostic>) -> Option<BodyFacts> {
    let title = doc.blocks.iter().position(|block| {
        matches!(block, Block::Paragraph(p) if p.style.as_deref() == Some(style::TITLE))
    });
    let Some(title) = title else {
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::MissingTitle,
            "no paragraph with style 'Titulo_comedia'; the body cannot be located",
        ));
        return None;
    };

    let mut facts = BodyFacts::default();
    let mut numbering = VerseNumbering::new();
    let mut in_dedication = false;
    let mut title_seen = false;

    let missing_final = |pending: PendingSplit| {
        Diagnostic::warning(
            DiagnosticKind::MissingFinalPart { base: pending.base },
            format!("split verse {} has an initial part but no final part", pending.base),
        )
    };

    for (index, block) in doc.blocks.iter().enumerate().skip(title) {
        let Block::Paragraph(paragraph) = block else {
            continue;
        };
        if paragraph.in_table || paragraph.is_blank() {
            continue;
        }
        let text = paragraph.text();
        let after = numbering.last_number();
        let role = classify_paragraph(paragraph);
        // only the first title is emitted
        let repeated_title = role == Role::Title && std::mem::replace(&mut title_seen, true);
        if role.carries_annotations() && !repeated_title {
            for key in marker_keys(&text) {
                *facts.markers.entry(key).or_insert(0) += 1;
            }
        }

        match role {
            Role::Milestone(_) => {}
            Role::Unstyled => {
                if !is_punctuation_only(&text) && !text.trim_start().starts_with('*') {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::UnstyledParagraph,
                            format!("paragraph without style: «{}»", snippet(&text)),
                        )
                        .at(index)
                        .after(after),
                    );
                }
            }
            Role::Unrecognized(name) => {
                let tolerated = style::SKIPPED_STYLES.contains(&name.as_str())
                    || is_punctuation_only(&text)
                    || text.trim_start().starts_with('*');
                if !tolerated {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::UnknownStyle(name.clone()),
                            format!("unknown style '{}': «{}»", name, snippet(&text)),
                        )
                        .at(index)
                        .after(after),
                    );
                }
            }
            Role::DedicationHeading => in_dedication = true,
            Role::Act | Role::CastListHeading | Role::CastListEntry | Role::Speaker => {
                in_dedication = false;
            }
            Role::Verse => {
                if is_bracket_only(&text) {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::BracketOnlyVerse,
                            "verse holds only brackets; it may be a lacuna styled as 'Verso'",
                        )
                        .at(index)
                        .after(after),
                    );
                }
                if !in_dedication {
                    let line = numbering.verse();
                    if let Some(pending) = line.interrupted {
                        diagnostics.push(missing_final(pending).at(index).after(after));
                    }
                    facts.labels.extend(line.label.note_keys());
                }
            }
            Role::SplitInitial => {
                let line = numbering.split_initial(&text);
                if let Some(pending) = line.interrupted {
                    diagnostics.push(missing_final(pending).at(index).after(after));
                }
                facts.labels.extend(line.label.note_keys());
            }
            role @ (Role::SplitMiddle | Role::SplitFinal) => {
                let part = if role == Role::SplitMiddle { SplitPart::Middle } else { SplitPart::Final };
                match numbering.split_part(part, &text) {
                    Some(label) => facts.labels.extend(label.note_keys()),
                    None => diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::SplitPartWithoutInitial(part),
                            format!("split part '{}' has no initial part: «{}»", part.attr(), snippet(&text)),
                        )
                        .at(index)
                        .after(after),
                    ),
                }
            }
            Role::Gap => {
                if is_bracket_only(&text) {
                    diagnostics.push(
                        Diagnostic::info(
                            DiagnosticKind::BracketOnlyGap,
                            "lacuna holds only brackets; check whether it stands for a lost verse that should be counted",
                        )
                        .at(index)
                        .after(after),
                    );
                }
            }
            Role::Title
            | Role::Subtitle
            | Role::Prose
            | Role::StageDirection
            | Role::Trailer => {}
        }
    }

    if let Some(pending) = numbering.finish() {
        diagnostics.push(missing_final(pending).after(numbering.last_number()));
    }

    Some(facts)
}

fn check_note_table(
    category: NoteCategory,
    table: &NoteTable,
    body: Option<&BodyFacts>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let file = category.name();

    for problem in table.problems() {
        let diagnostic = match &problem.issue {
            NoteLineIssue::Malformed => Diagnostic::error(
                DiagnosticKind::MalformedNote(category),
                format!("{}: entry is neither 'N:' nor '@word:': «{}»", file, snippet(&problem.text)),
            ),
            NoteLineIssue::EmptyBody(key) => Diagnostic::warning(
                DiagnosticKind::EmptyNote(category, key.clone()),
                format!("{}: note '{}' has no text", file, key),
            ),
        };
        diagnostics.push(diagnostic.at(problem.line));
    }

    for (key, notes) in table.entries() {
        if notes.len() > 1 {
            diagnostics.push(Diagnostic::info(
                DiagnosticKind::MultipleNotes(category, key.clone()),
                format!("{}: '{}' has {} notes; they are used in order", file, key, notes.len()),
            ));
        }

        let Some(body) = body else {
            continue;
        };
        match key {
            NoteKey::Word(_) => {
                let markers = body.markers.get(key).copied().unwrap_or(0);
                if markers != notes.len() {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::MarkerCountMismatch(category, key.clone()),
                        format!(
                            "{}: '{}' has {} note(s) but the text has {} marker(s)",
                            file,
                            key,
                            notes.len(),
                            markers
                        ),
                    ));
                }
            }
            NoteKey::Verse { .. } => {
                if !body.labels.contains(key) {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::OrphanVerseNote(category, key.clone()),
                        format!("{}: note for verse {} but the text has no such line", file, key),
                    ));
                }
            }
        }
    }
}

fn load_auxiliary(
    category: NoteCategory,
    path: Option<&Path>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<NoteTable> {
    let path = path?;
    if !path.exists() {
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::AuxiliaryUnavailable(category),
            format!("{} file does not exist: {}", category.name(), path.display()),
        ));
        return None;
    }
    match NoteTable::load(path) {
        Ok(table) => Some(table),
        Err(e) => {
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::AuxiliaryUnavailable(category),
                format!("{} file cannot be read: {}: {}", category.name(), path.display(), e),
            ));
            None
        }
    }
}

/// Validates documents on disk. Fails only when the main document cannot be
/// used; a missing auxiliary file is reported as a diagnostic.
pub fn validate_files(
    main: &Path,
    apparatus: Option<&Path>,
    notes: Option<&Path>,
) -> Result<Vec<Diagnostic>, ConversionError> {
    let doc = open_main(main)?;
    let mut diagnostics = Vec::new();
    let apparatus = load_auxiliary(NoteCategory::Apparatus, apparatus, &mut diagnostics);
    let notes = load_auxiliary(NoteCategory::General, notes, &mut diagnostics);
    diagnostics.extend(validate(&doc, apparatus.as_ref(), notes.as_ref()));
    Ok(diagnostics)
}

/// [`validate_files`] rendered as human-readable lines.
pub fn validate_documents(
    main: &Path,
    apparatus: Option<&Path>,
    notes: Option<&Path>,
) -> Result<Vec<String>, ConversionError> {
    Ok(validate_files(main, apparatus, notes)?
        .iter()
        .map(Diagnostic::to_string)
        .collect())
}
