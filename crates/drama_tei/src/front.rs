//! Front matter: everything before the title paragraph, rendered inside
//! `<div type="Introducción">`.

use itertools::Itertools;
use tracing::debug;

use crate::docx::{Block, Cell, Footnotes, Paragraph, Run, Table};
use crate::inline::{FootnoteKind, format_paragraph};
use crate::style;

/// Indentation of the children of `<div type="Introducción">`.
pub const FRONT_INDENT: usize = 8;
const STEP: usize = 2;

const HEADING_SIGIL: char = '#';

pub fn process_front(blocks: &[Block], footnotes: &Footnotes) -> Vec<String> {
    let mut walker = FrontWalker::new(footnotes);
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => walker.paragraph(paragraph),
            Block::Table(table) => {
                walker.close_speech();
                for line in table_to_tei(table, footnotes) {
                    walker.emit(line);
                }
            }
        }
    }
    walker.finish()
}

struct FrontWalker<'a> {
    footnotes: &'a Footnotes,
    lines: Vec<String>,
    /// Levels of the open sub-sections, outermost first.
    sections: Vec<usize>,
    next_section: u32,
    prologue_seen: bool,
    speech: bool,
}

impl<'a> FrontWalker<'a> {
    fn new(footnotes: &'a Footnotes) -> Self {
        FrontWalker {
            footnotes,
            lines: Vec::new(),
            sections: Vec::new(),
            next_section: 1,
            prologue_seen: false,
            speech: false,
        }
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        let pad = FRONT_INDENT + STEP * (self.sections.len() + self.speech as usize);
        self.lines.push(format!("{:pad$}{}", "", line.as_ref(), pad = pad));
    }

    fn format(&self, paragraph: &Paragraph) -> String {
        format_paragraph(paragraph, self.footnotes, FootnoteKind::Intro)
    }

    fn paragraph(&mut self, paragraph: &Paragraph) {
        let text = paragraph.text();
        let text = text.trim();
        if text.is_empty() || text.to_lowercase() == "introducción" {
            return;
        }

        if !self.prologue_seen && text.to_lowercase().contains("prólogo") {
            self.close_speech();
            self.prologue_seen = true;
            let (_, heading) = strip_heading_marks(paragraph);
            let markup = self.format(&heading);
            self.emit(format!(r#"<head type="divTitle" subtype="MenuLevel_1">{}</head>"#, markup));
            return;
        }

        if text.starts_with(HEADING_SIGIL) {
            self.close_speech();
            let (level, heading) = strip_heading_marks(paragraph);
            if heading.text().trim().to_lowercase() == "prólogo" {
                debug!("duplicate prologue heading skipped");
                return;
            }
            self.open_section(level, &heading);
            return;
        }

        match paragraph.style.as_deref() {
            Some(style::QUOTE) => {
                self.close_speech();
                let markup = self.format(paragraph);
                self.emit(r#"<cit rend="blockquote">"#);
                self.emit(format!("  <quote>{}</quote>", markup));
                self.emit("</cit>");
            }
            Some(style::SPEAKER) => {
                self.close_speech();
                let markup = self.format(paragraph);
                self.emit("<sp>");
                self.speech = true;
                self.emit(format!("<speaker>{}</speaker>", markup));
            }
            Some(style::VERSE) if self.speech => {
                let markup = self.format(paragraph);
                self.emit(format!("<l>{}</l>", markup));
            }
            Some(style::PROSE) if self.speech => {
                let markup = self.format(paragraph);
                self.emit(format!("<p>{}</p>", markup));
            }
            _ => {
                self.close_speech();
                let markup = self.format(paragraph);
                if !markup.is_empty() {
                    self.emit(format!("<p>{}</p>", markup));
                }
            }
        }
    }

    fn open_section(&mut self, level: usize, heading: &Paragraph) {
        while self.sections.last().is_some_and(|open| *open >= level) {
            self.sections.pop();
            self.emit("</div>");
        }
        let markup = self.format(heading);
        self.emit(format!(r#"<div type="subsection" n="{}">"#, self.next_section));
        self.next_section += 1;
        self.sections.push(level);
        self.emit(format!(
            r#"<head type="divTitle" subtype="MenuLevel_{}">{}</head>"#,
            level + 1,
            markup
        ));
    }

    fn close_speech(&mut self) {
        if self.speech {
            self.speech = false;
            self.emit("</sp>");
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.close_speech();
        while self.sections.pop().is_some() {
            self.emit("</div>");
        }
        self.lines
    }
}

/// Removes the leading `#` marks and returns how many there were.
fn strip_heading_marks(paragraph: &Paragraph) -> (usize, Paragraph) {
    let mut level = 0;
    let mut stripping = true;
    let mut runs = Vec::with_capacity(paragraph.runs.len());
    for run in &paragraph.runs {
        if !stripping || run.footnote.is_some() {
            stripping = false;
            runs.push(run.clone());
            continue;
        }
        let trimmed = run.text.trim_start();
        let rest = trimmed.trim_start_matches(HEADING_SIGIL);
        level += trimmed.len() - rest.len();
        let rest = rest.trim_start();
        if rest.is_empty() {
            continue;
        }
        stripping = false;
        runs.push(Run { text: rest.to_string(), ..run.clone() });
    }
    let stripped = Paragraph { style: paragraph.style.clone(), runs, in_table: paragraph.in_table };
    (level.max(1), stripped)
}

const SUMMARY_KEYS: &[&str] = &["total", "resumen"];

/// Renders a table as `<table rend="rules">`. Lines are indented relative to
/// the `<table>` element.
///
/// The first row is a header, followed by an empty spacer row. A row whose
/// only text is in its first cell is a section row spanning every column.
/// Rows starting with `Total` or `Resumen` (all cells filled) are summary
/// rows and are set in bold.
pub fn table_to_tei(table: &Table, footnotes: &Footnotes) -> Vec<String> {
    let columns = table.column_count();
    let cell_markup = |cell: &Cell| {
        cell.paragraphs
            .iter()
            .map(|p| format_paragraph(p, footnotes, FootnoteKind::Intro))
            .filter(|m| !m.is_empty())
            .join("<lb/>")
    };

    let mut lines = vec![r#"<table rend="rules">"#.to_string()];
    let Some((header, rows)) = table.rows.split_first() else {
        lines.push("</table>".to_string());
        return lines;
    };

    lines.push(r#"  <row role="label">"#.to_string());
    for cell in header {
        lines.push(format!(
            r#"    <cell rend="both"><hi rend="italic" style="font-weight:bold">{}</hi></cell>"#,
            cell_markup(cell)
        ));
    }
    lines.push("  </row>".to_string());

    lines.push("  <row>".to_string());
    for _ in 0..columns {
        lines.push(r#"    <cell rend="both"> </cell>"#.to_string());
    }
    lines.push("  </row>".to_string());

    for row in rows {
        let texts: Vec<String> = row.iter().map(|c| c.text().trim().to_string()).collect();
        let first = texts.first().map(String::as_str).unwrap_or("");

        if !first.is_empty() && texts.iter().skip(1).all(String::is_empty) {
            lines.push("  <row>".to_string());
            lines.push(format!(
                r#"    <cell rend="both" cols="{}"><hi rend="italic" style="font-weight:bold">{}</hi></cell>"#,
                columns,
                cell_markup(&row[0])
            ));
            lines.push("  </row>".to_string());
            continue;
        }

        let key = first.to_lowercase();
        let summary = SUMMARY_KEYS.contains(&key.as_str()) && texts.iter().all(|t| !t.is_empty());

        lines.push("  <row>".to_string());
        for (i, (cell, text)) in row.iter().zip(&texts).enumerate() {
            if text.is_empty() {
                lines.push(r#"    <cell rend="both"> </cell>"#.to_string());
                continue;
            }
            let markup = cell_markup(cell);
            let line = if !summary {
                format!(r#"    <cell rend="both">{}</cell>"#, markup)
            } else if key == "total" && i > 0 {
                format!(r#"    <cell rend="both"><hi style="font-weight:bold">{}</hi></cell>"#, markup)
            } else {
                format!(
                    r#"    <cell rend="both"><hi rend="italic" style="font-weight:bold">{}</hi></cell>"#,
                    markup
                )
            };
            lines.push(line);
        }
        lines.push("  </row>".to_string());
    }

    lines.push("</table>".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front(blocks: Vec<Block>) -> Vec<String> {
        process_front(&blocks, &Footnotes::new())
    }

    fn para(style: Option<&str>, text: &str) -> Block {
        Block::Paragraph(Paragraph::new(style, vec![Run::plain(text)]))
    }

    fn trimmed(lines: &[String]) -> Vec<&str> {
        lines.iter().map(|l| l.trim()).collect()
    }

    fn table(rows: &[&[&str]]) -> Table {
        Table {
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|t| Cell { paragraphs: vec![Paragraph::unstyled(t)] })
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn test_prologue_and_sections() {
        let lines = front(vec![
            para(None, "Introducción"),
            para(None, "PRÓLOGO"),
            para(None, "# La comedia"),
            para(None, "Texto."),
            para(None, "## Fecha"),
            para(None, "Hacia 1613."),
            para(None, "# Prólogo"),
            para(None, "# Esta edición"),
        ]);

        assert_eq!(
            lines,
            vec![
                r#"        <head type="divTitle" subtype="MenuLevel_1">PRÓLOGO</head>"#,
                r#"        <div type="subsection" n="1">"#,
                r#"          <head type="divTitle" subtype="MenuLevel_2">La comedia</head>"#,
                r#"          <p>Texto.</p>"#,
                r#"          <div type="subsection" n="2">"#,
                r#"            <head type="divTitle" subtype="MenuLevel_3">Fecha</head>"#,
                r#"            <p>Hacia 1613.</p>"#,
                r#"          </div>"#,
                r#"        </div>"#,
                r#"        <div type="subsection" n="3">"#,
                r#"          <head type="divTitle" subtype="MenuLevel_2">Esta edición</head>"#,
                r#"        </div>"#,
            ]
        );
    }

    #[test]
    fn test_heading_marks_inside_italics() {
        let lines = front(vec![Block::Paragraph(Paragraph::new(
            None,
            vec![Run::italic("# "), Run::italic("Sinopsis")],
        ))]);
        assert_eq!(
            lines[1].trim(),
            r#"<head type="divTitle" subtype="MenuLevel_2"><hi rend="italic">Sinopsis</hi></head>"#
        );
    }

    #[test]
    fn test_quote_and_dialogue() {
        let lines = front(vec![
            para(Some("Cita"), "Todo es comedia."),
            para(Some("Personaje"), "FINEA"),
            para(Some("Verso"), "¿Qué es esto?"),
            para(Some("Prosa"), "Dice."),
            para(None, "Comentario."),
        ]);
        assert_eq!(
            trimmed(&lines),
            vec![
                r#"<cit rend="blockquote">"#,
                "<quote>Todo es comedia.</quote>",
                "</cit>",
                "<sp>",
                "<speaker>FINEA</speaker>",
                "<l>¿Qué es esto?</l>",
                "<p>Dice.</p>",
                "</sp>",
                "<p>Comentario.</p>",
            ]
        );
        assert_eq!(lines[5], "          <l>¿Qué es esto?</l>");
    }

    #[test]
    fn test_intro_footnotes() {
        let mut footnotes = Footnotes::new();
        footnotes.insert("1".to_string(), vec![Run::plain("Véase la edición de 1617.")]);
        let blocks = vec![Block::Paragraph(Paragraph::new(
            None,
            vec![Run::plain("Texto"), Run::footnote("1"), Run::plain(".")],
        ))];
        let lines = process_front(&blocks, &footnotes);
        assert_eq!(
            lines[0].trim(),
            r#"<p>Texto<note type="intro" n="1">Véase la edición de 1617.</note>.</p>"#
        );
    }

    #[test]
    fn test_table_rows() {
        let lines = table_to_tei(
            &table(&[
                &["Acto", "Versos", "Estrofa"],
                &["Acto primero", "", ""],
                &["1-20", "20", "redondillas"],
                &["Total", "20", "100%"],
            ]),
            &Footnotes::new(),
        );
        let lines = trimmed(&lines);

        assert_eq!(lines[0], r#"<table rend="rules">"#);
        assert_eq!(lines[1], r#"<row role="label">"#);
        assert_eq!(lines[2], r#"<cell rend="both"><hi rend="italic" style="font-weight:bold">Acto</hi></cell>"#);
        assert_eq!(lines[6], "<row>");
        assert_eq!(lines[7], r#"<cell rend="both"> </cell>"#);
        assert!(lines.contains(&r#"<cell rend="both" cols="3"><hi rend="italic" style="font-weight:bold">Acto primero</hi></cell>"#));
        assert!(lines.contains(&r#"<cell rend="both">redondillas</cell>"#));
        assert!(lines.contains(&r#"<cell rend="both"><hi rend="italic" style="font-weight:bold">Total</hi></cell>"#));
        assert!(lines.contains(&r#"<cell rend="both"><hi style="font-weight:bold">100%</hi></cell>"#));
        assert_eq!(lines.last(), Some(&"</table>"));
    }

    #[test]
    fn test_table_inside_section_is_indented() {
        let lines = front(vec![para(None, "# Sinopsis"), Block::Table(table(&[&["A"], &["x"]]))]);
        assert_eq!(lines[2], r#"          <table rend="rules">"#);
        assert_eq!(lines.last().map(String::as_str), Some("        </div>"));
    }
}
