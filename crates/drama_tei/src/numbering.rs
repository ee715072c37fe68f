//! Verse numbering, shared by the assembler and the validator so both see
//! the same numbers.
//!
//! A normal verse and the initial part of a split verse each take the next
//! number. Middle and final parts reuse the base number of the pending split
//! with a letter suffix (`7a`, `7b`, `7c`, ...).

use std::fmt;

use crate::notes::NoteKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerseLabel {
    pub number: u32,
    pub part: Option<char>,
}

impl VerseLabel {
    /// Note keys due at this line. The initial part also takes the notes
    /// keyed by the bare verse number.
    pub fn note_keys(&self) -> Vec<NoteKey> {
        match self.part {
            None => vec![NoteKey::verse(self.number)],
            Some('a') => vec![NoteKey::verse_part(self.number, 'a'), NoteKey::verse(self.number)],
            Some(c) => vec![NoteKey::verse_part(self.number, c)],
        }
    }
}

impl fmt::Display for VerseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part {
            Some(c) => write!(f, "{}{}", self.number, c),
            None => write!(f, "{}", self.number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPart {
    Initial,
    Middle,
    Final,
}

impl SplitPart {
    /// Value of the TEI `part` attribute.
    pub fn attr(self) -> &'static str {
        match self {
            SplitPart::Initial => "I",
            SplitPart::Middle => "M",
            SplitPart::Final => "F",
        }
    }
}

/// A split verse whose final part has not been seen yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSplit {
    pub base: u32,
    /// Index of the letter the next part will get (`1` → `b`).
    pub next_part: usize,
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedLine {
    pub label: VerseLabel,
    /// A split verse left without its final part by this line.
    pub interrupted: Option<PendingSplit>,
}

fn part_letter(index: usize) -> char {
    (b'a' + index.min(25) as u8) as char
}

#[derive(Debug, Clone)]
pub struct VerseNumbering {
    next: u32,
    pending: Option<PendingSplit>,
}

impl Default for VerseNumbering {
    fn default() -> Self {
        VerseNumbering::starting_at(1)
    }
}

impl VerseNumbering {
    pub fn new() -> Self {
        VerseNumbering::default()
    }

    pub fn starting_at(first: u32) -> Self {
        VerseNumbering { next: first, pending: None }
    }

    /// Number the next verse-incrementing line will get.
    pub fn next_number(&self) -> u32 {
        self.next
    }

    /// Last number handed out, `0` before the first verse.
    pub fn last_number(&self) -> u32 {
        self.next.saturating_sub(1)
    }

    pub fn pending(&self) -> Option<&PendingSplit> {
        self.pending.as_ref()
    }

    pub fn verse(&mut self) -> NumberedLine {
        let interrupted = self.pending.take();
        let label = VerseLabel { number: self.next, part: None };
        self.next += 1;
        NumberedLine { label, interrupted }
    }

    pub fn split_initial(&mut self, text: &str) -> NumberedLine {
        let interrupted = self.pending.take();
        let base = self.next;
        self.next += 1;
        self.pending = Some(PendingSplit { base, next_part: 1, parts: vec![text.to_string()] });
        NumberedLine { label: VerseLabel { number: base, part: Some('a') }, interrupted }
    }

    /// Labels a middle or final part. `None` when no split verse is pending.
    pub fn split_part(&mut self, part: SplitPart, text: &str) -> Option<VerseLabel> {
        let pending = self.pending.as_mut()?;
        let label = VerseLabel { number: pending.base, part: Some(part_letter(pending.next_part)) };
        pending.next_part += 1;
        pending.parts.push(text.to_string());
        if part == SplitPart::Final {
            self.pending = None;
        }
        Some(label)
    }

    /// Drains the pending split verse, if any.
    pub fn finish(&mut self) -> Option<PendingSplit> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[derive(Clone, Copy, Debug)]
    enum Line {
        Verse,
        Initial,
        Middle,
        Final,
    }

    #[test]
    fn test_split_verse_shares_base_number() {
        let mut numbering = VerseNumbering::starting_at(7);
        let initial = numbering.split_initial("Y yo");
        let last = numbering.split_part(SplitPart::Final, "también.").unwrap();

        assert_eq!(initial.label.to_string(), "7a");
        assert_eq!(last.to_string(), "7b");
        assert_eq!(numbering.next_number(), 8);
        assert!(numbering.pending().is_none());
    }

    #[test]
    fn test_three_part_split() {
        let mut numbering = VerseNumbering::new();
        numbering.split_initial("¿Vos?");
        let middle = numbering.split_part(SplitPart::Middle, "Yo.").unwrap();
        let last = numbering.split_part(SplitPart::Final, "Vos.").unwrap();
        assert_eq!((middle.to_string(), last.to_string()), ("1b".to_string(), "1c".to_string()));
        assert_eq!(numbering.verse().label.to_string(), "2");
    }

    #[test]
    fn test_orphan_part_is_rejected() {
        let mut numbering = VerseNumbering::new();
        assert_eq!(numbering.split_part(SplitPart::Final, "x"), None);
        assert_eq!(numbering.next_number(), 1);
    }

    #[test]
    fn test_interrupted_split_is_reported() {
        let mut numbering = VerseNumbering::starting_at(10);
        numbering.split_initial("Mas");
        let line = numbering.verse();
        assert_eq!(line.label.number, 11);
        assert_eq!(line.interrupted.map(|p| p.base), Some(10));
    }

    #[test]
    fn test_numbering_is_monotonic_for_every_short_sequence() {
        let alphabet = [Line::Verse, Line::Initial, Line::Middle, Line::Final];
        for sequence in (0..6).map(|_| alphabet.iter()).multi_cartesian_product() {
            let mut numbering = VerseNumbering::new();
            let mut expected = 1;
            for line in sequence {
                let before = numbering.next_number();
                match line {
                    Line::Verse => {
                        assert_eq!(numbering.verse().label.number, expected);
                        expected += 1;
                    }
                    Line::Initial => {
                        assert_eq!(numbering.split_initial("").label.number, expected);
                        expected += 1;
                    }
                    Line::Middle | Line::Final => {
                        let part = if matches!(line, Line::Middle) { SplitPart::Middle } else { SplitPart::Final };
                        if let Some(label) = numbering.split_part(part, "") {
                            assert_eq!(label.number, before - 1);
                        }
                        assert_eq!(numbering.next_number(), before);
                    }
                }
                assert_eq!(numbering.next_number(), expected);
            }
        }
    }
}
