use crate::docx::{Footnotes, Paragraph, Run};

const ITALIC_OPEN: &str = r#"<hi rend="italic">"#;
const ITALIC_CLOSE: &str = "</hi>";

/// Where a footnote is spliced; decides the `type` of the emitted `<note>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootnoteKind {
    Intro,
    Body,
}

impl FootnoteKind {
    fn as_str(self) -> &'static str {
        match self {
            FootnoteKind::Intro => "intro",
            FootnoteKind::Body => "footnote",
        }
    }
}

enum Piece {
    Plain(String),
    Italic(String),
    Markup(String),
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn format_paragraph(paragraph: &Paragraph, footnotes: &Footnotes, kind: FootnoteKind) -> String {
    format_runs(&paragraph.runs, footnotes, kind)
}

/// Renders runs as inline TEI: escaped text, `<hi rend="italic">` spans and
/// footnotes spliced at their anchor position.
pub fn format_runs(runs: &[Run], footnotes: &Footnotes, kind: FootnoteKind) -> String {
    let mut pieces: Vec<Piece> = Vec::new();

    for run in runs {
        if let Some(id) = &run.footnote {
            // Footnotes cannot nest, so the body is rendered without a table.
            let body = footnotes
                .get(id)
                .map(|note| format_runs(note, &Footnotes::new(), kind))
                .unwrap_or_default();
            pieces.push(Piece::Markup(format!(
                r#"<note type="{}" n="{}">{}</note>"#,
                kind.as_str(),
                escape_xml(id),
                body
            )));
            continue;
        }
        if run.text.is_empty() {
            continue;
        }
        match (pieces.last_mut(), run.italic) {
            (Some(Piece::Italic(s)), true) | (Some(Piece::Plain(s)), false) => s.push_str(&run.text),
            (_, true) => pieces.push(Piece::Italic(run.text.clone())),
            (_, false) => pieces.push(Piece::Plain(run.text.clone())),
        }
    }

    let mut out = String::new();
    for piece in &pieces {
        match piece {
            Piece::Plain(s) => out.push_str(&escape_xml(s)),
            Piece::Markup(s) => out.push_str(s),
            Piece::Italic(s) => push_italic(&mut out, s),
        }
    }
    out.trim().to_string()
}

/// Emphasis never starts or ends on whitespace: it is moved outside the tag.
fn push_italic(out: &mut String, s: &str) {
    let core = s.trim();
    if core.is_empty() {
        out.push_str(&escape_xml(s));
        return;
    }
    let leading = &s[..s.len() - s.trim_start().len()];
    let trailing = &s[s.trim_end().len()..];
    out.push_str(leading);
    out.push_str(ITALIC_OPEN);
    out.push_str(&escape_xml(core));
    out.push_str(ITALIC_CLOSE);
    out.push_str(trailing);
}

/// Fuses italic spans that touch with zero characters between them.
pub fn merge_adjacent_italics(markup: &str) -> String {
    markup.replace(&format!("{}{}", ITALIC_CLOSE, ITALIC_OPEN), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(spec: &[(&str, bool)]) -> Vec<Run> {
        spec.iter()
            .map(|(t, i)| if *i { Run::italic(*t) } else { Run::plain(*t) })
            .collect()
    }

    #[test]
    fn test_escapes_literal_text() {
        let out = format_runs(&runs(&[("Tom & \"Jerry\" <'x'>", false)]), &Footnotes::new(), FootnoteKind::Body);
        assert_eq!(out, "Tom &amp; &quot;Jerry&quot; &lt;&apos;x&apos;&gt;");
    }

    #[test]
    fn test_hoists_whitespace_out_of_italics() {
        let out = format_runs(&runs(&[("dijo", false), (" bobo ", true), ("y", false)]), &Footnotes::new(), FootnoteKind::Body);
        assert_eq!(out, r#"dijo <hi rend="italic">bobo</hi> y"#);
    }

    #[test]
    fn test_adjacent_italic_runs_merge() {
        let out = format_runs(&runs(&[("La ", true), ("dama", true)]), &Footnotes::new(), FootnoteKind::Body);
        assert_eq!(out, r#"<hi rend="italic">La dama</hi>"#);
    }

    #[test]
    fn test_separated_italic_runs_stay_apart() {
        let out = format_runs(&runs(&[("La", true), (" ", false), ("dama", true)]), &Footnotes::new(), FootnoteKind::Body);
        assert_eq!(out, r#"<hi rend="italic">La</hi> <hi rend="italic">dama</hi>"#);
    }

    #[test]
    fn test_footnote_spliced_in_place() {
        let mut footnotes = Footnotes::new();
        footnotes.insert("3".to_string(), vec![Run::plain(" Véase "), Run::italic("Arte nuevo")]);
        let input = vec![Run::plain("Lope"), Run::footnote("3"), Run::plain(" escribe")];

        let out = format_runs(&input, &footnotes, FootnoteKind::Intro);
        assert_eq!(
            out,
            r#"Lope<note type="intro" n="3">Véase <hi rend="italic">Arte nuevo</hi></note> escribe"#
        );
    }

    #[test]
    fn test_unknown_footnote_has_empty_body() {
        let out = format_runs(&[Run::plain("x"), Run::footnote("99")], &Footnotes::new(), FootnoteKind::Body);
        assert_eq!(out, r#"x<note type="footnote" n="99"></note>"#);
    }

    #[test]
    fn test_merge_only_touching_spans() {
        let touching = r#"<hi rend="italic">a</hi><hi rend="italic">b</hi>"#;
        assert_eq!(merge_adjacent_italics(touching), r#"<hi rend="italic">ab</hi>"#);
        let spaced = r#"<hi rend="italic">a</hi> <hi rend="italic">b</hi>"#;
        assert_eq!(merge_adjacent_italics(spaced), spaced);
    }
}
