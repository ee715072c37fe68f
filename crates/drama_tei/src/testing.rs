//! Test helpers: builds small but real DOCX packages in memory.

use std::fmt::Write as FmtWrite;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::docx::Run;
use crate::inline::escape_xml;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

#[derive(Default)]
pub struct DocxBuilder {
    styles: Vec<(String, String)>,
    body: String,
    footnotes: String,
}

impl DocxBuilder {
    pub fn new() -> Self {
        DocxBuilder::default()
    }

    /// Declares a style whose id differs from its display name.
    pub fn style(mut self, id: &str, name: &str) -> Self {
        self.styles.push((id.to_string(), name.to_string()));
        self
    }

    pub fn paragraph(mut self, style: Option<&str>, runs: &[Run]) -> Self {
        let xml = paragraph_xml(style, runs);
        self.body.push_str(&xml);
        self
    }

    /// Shorthand for a styled paragraph with one plain run.
    pub fn styled(self, style: &str, text: &str) -> Self {
        self.paragraph(Some(style), &[Run::plain(text)])
    }

    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        self.body.push_str("<w:tbl>");
        for row in rows {
            self.body.push_str("<w:tr>");
            for cell in *row {
                write!(self.body, "<w:tc>{}</w:tc>", paragraph_xml(None, &[Run::plain(*cell)])).unwrap();
            }
            self.body.push_str("</w:tr>");
        }
        self.body.push_str("</w:tbl>");
        self
    }

    pub fn footnote(mut self, id: &str, runs: &[Run]) -> Self {
        write!(
            self.footnotes,
            r#"<w:footnote w:id="{}"><w:p><w:r><w:footnoteRef/></w:r>{}</w:p></w:footnote>"#,
            id,
            runs_xml(runs)
        )
        .unwrap();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#,
        )
        .unwrap();

        zip.start_file("word/document.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="{}"><w:body>{}<w:sectPr/></w:body></w:document>"#,
            W_NS, self.body
        )
        .unwrap();

        zip.start_file("word/styles.xml", options).unwrap();
        let mut styles = String::new();
        for (id, name) in &self.styles {
            write!(
                styles,
                r#"<w:style w:type="paragraph" w:styleId="{}"><w:name w:val="{}"/></w:style>"#,
                escape_xml(id),
                escape_xml(name)
            )
            .unwrap();
        }
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:styles xmlns:w="{}">{}</w:styles>"#,
            W_NS, styles
        )
        .unwrap();

        if !self.footnotes.is_empty() {
            zip.start_file("word/footnotes.xml", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?><w:footnotes xmlns:w="{}"><w:footnote w:type="separator" w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote>{}</w:footnotes>"#,
                W_NS, self.footnotes
            )
            .unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    pub fn write_to(self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

fn paragraph_xml(style: Option<&str>, runs: &[Run]) -> String {
    let ppr = style
        .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#, escape_xml(s)))
        .unwrap_or_default();
    format!("<w:p>{}{}</w:p>", ppr, runs_xml(runs))
}

fn runs_xml(runs: &[Run]) -> String {
    let mut xml = String::new();
    for run in runs {
        if let Some(id) = &run.footnote {
            write!(xml, r#"<w:r><w:footnoteReference w:id="{}"/></w:r>"#, id).unwrap();
            continue;
        }
        let rpr = if run.italic { "<w:rPr><w:i/></w:rPr>" } else { "" };
        write!(
            xml,
            r#"<w:r>{}<w:t xml:space="preserve">{}</w:t></w:r>"#,
            rpr,
            escape_xml(&run.text)
        )
        .unwrap();
    }
    xml
}
