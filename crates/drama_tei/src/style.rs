//! Paragraph style vocabulary and the role classifier.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::Paragraph;

pub const TITLE: &str = "Titulo_comedia";
pub const SUBTITLE: &str = "Subtitulo_comedia";
pub const ACT: &str = "Acto";
pub const PROSE: &str = "Prosa";
pub const VERSE: &str = "Verso";
pub const SPLIT_INITIAL: &str = "Partido_incial";
pub const SPLIT_MIDDLE: &str = "Partido_medio";
pub const SPLIT_FINAL: &str = "Partido_final";
pub const GAP: &str = "Laguna";
pub const SPEAKER: &str = "Personaje";
pub const STAGE_DIRECTION: &str = "Acot";
pub const DEDICATION_HEADING: &str = "Epigr_Dedic";
pub const CAST_LIST_HEADING: &str = "Epigr_Dramatis";
pub const CAST_LIST_ENTRY: &str = "Dramatis_lista";
pub const TRAILER: &str = "Epigr_final";
/// Block quotation, only meaningful before the title.
pub const QUOTE: &str = "Cita";

/// Styles the word processor assigns when the author picked none.
pub const DEFAULT_STYLES: &[&str] = &["Normal", "Default Paragraph Style"];

/// Styles tolerated in the body without being part of the vocabulary.
pub const SKIPPED_STYLES: &[&str] = &[QUOTE, "Heading 1", "Heading 2", "Heading 3"];

pub const MILESTONE_SIGIL: char = '$';

static MILESTONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$(\w+)").unwrap());
static PUNCTUATION_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[\s.,;:!?¡¿()"'«»“”‘’\-–—…]+$"#).unwrap());
static BRACKET_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\[\]().…_\-–—]*\[[\s\[\]().…_\-–—]*\][\s\[\]().…_\-–—]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Title,
    Subtitle,
    Act,
    Prose,
    Verse,
    SplitInitial,
    SplitMiddle,
    SplitFinal,
    Gap,
    Speaker,
    StageDirection,
    DedicationHeading,
    CastListHeading,
    CastListEntry,
    Trailer,
    /// Stanza label for the next numbered line.
    Milestone(String),
    /// No style, or the default one.
    Unstyled,
    /// A style outside the vocabulary.
    Unrecognized(String),
}

impl Role {
    /// Roles that take part in verse numbering.
    pub fn is_verse_line(&self) -> bool {
        matches!(self, Role::Verse | Role::SplitInitial | Role::SplitMiddle | Role::SplitFinal)
    }

    /// Roles whose text has its `@word` markers turned into notes. Cast
    /// entries only lose the sigil.
    pub fn carries_annotations(&self) -> bool {
        !matches!(
            self,
            Role::CastListEntry | Role::Gap | Role::Milestone(_) | Role::Unstyled | Role::Unrecognized(_)
        )
    }
}

pub fn role_for_style(style: &str) -> Option<Role> {
    let role = match style {
        TITLE => Role::Title,
        SUBTITLE => Role::Subtitle,
        ACT => Role::Act,
        PROSE => Role::Prose,
        VERSE => Role::Verse,
        SPLIT_INITIAL => Role::SplitInitial,
        SPLIT_MIDDLE => Role::SplitMiddle,
        SPLIT_FINAL => Role::SplitFinal,
        GAP => Role::Gap,
        SPEAKER => Role::Speaker,
        STAGE_DIRECTION => Role::StageDirection,
        DEDICATION_HEADING => Role::DedicationHeading,
        CAST_LIST_HEADING => Role::CastListHeading,
        CAST_LIST_ENTRY => Role::CastListEntry,
        TRAILER => Role::Trailer,
        _ => return None,
    };
    Some(role)
}

/// Classifies a paragraph from its style and raw text.
///
/// A leading `$label` wins over any style.
pub fn classify(style: Option<&str>, text: &str) -> Role {
    if let Some(label) = milestone_label(text) {
        return Role::Milestone(label);
    }
    match style {
        None => Role::Unstyled,
        Some(s) if DEFAULT_STYLES.contains(&s) => Role::Unstyled,
        Some(s) => role_for_style(s).unwrap_or_else(|| Role::Unrecognized(s.to_string())),
    }
}

pub fn classify_paragraph(paragraph: &Paragraph) -> Role {
    classify(paragraph.style.as_deref(), &paragraph.text())
}

pub fn milestone_label(text: &str) -> Option<String> {
    MILESTONE
        .captures(text.trim())
        .map(|caps| caps[1].to_string())
}

pub fn is_punctuation_only(text: &str) -> bool {
    PUNCTUATION_ONLY.is_match(text.trim())
}

/// `[…]`, `[ ]`, `[...]` and similar: brackets with nothing legible inside.
pub fn is_bracket_only(text: &str) -> bool {
    BRACKET_ONLY.is_match(text.trim())
}
