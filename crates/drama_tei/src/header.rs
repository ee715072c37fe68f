//! `<teiHeader>` generation from the metadata document.
//!
//! The metadata document holds three tables: main metadata (key/value),
//! the source description (key/value) and the witness list, whose first row
//! is a caption.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::docx::{Cell, DocxError, Footnotes, SourceDocument, Table};
use crate::inline::{FootnoteKind, escape_xml, format_paragraph};

const INDENT: usize = 2;

const GROUP_NAME: &str = "Grupo de investigación PROLOPE, de la Universitat Autònoma de Barcelona";
const GROUP_REF: &str = "https://datos.bne.es/entidad/XX4849774.html";
const SERIES_TITLE: &str = "Biblioteca Digital PROLOPE";
const SERIES_URI: &str = "https://bibdigitalprolope.com/";
const SERIES_DIRECTOR: &str =
    r#"<persName ref="https://orcid.org/0000-0002-7429-9709"><forename>Ramón</forename> <surname>Valdés Gázquez</surname></persName>"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Full attribution: responsibilities, series and encoding description.
    #[default]
    Prolope,
    /// Title statement, publication statement and source description only.
    Minimal,
}

impl FromStr for HeaderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prolope" | "full" => Ok(HeaderMode::Prolope),
            "minimal" => Ok(HeaderMode::Minimal),
            other => Err(format!("unknown header mode '{}' (expected 'prolope' or 'minimal')", other)),
        }
    }
}

impl fmt::Display for HeaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderMode::Prolope => write!(f, "prolope"),
            HeaderMode::Minimal => write!(f, "minimal"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Docx(#[from] DocxError),
    #[error("metadata document has {0} table(s); at least 3 are required")]
    TooFewTables(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub siglum: String,
    /// Description as inline markup (italics kept).
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct EditionMetadata {
    main: Vec<(String, String)>,
    source: Vec<(String, String)>,
    pub witnesses: Vec<Witness>,
}

impl EditionMetadata {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        Self::from_document(&SourceDocument::open(path)?)
    }

    pub fn from_document(doc: &SourceDocument) -> Result<Self, MetadataError> {
        let tables: Vec<&Table> = doc.tables().collect();
        let [main, source, witnesses, ..] = tables.as_slice() else {
            return Err(MetadataError::TooFewTables(tables.len()));
        };

        let witnesses = witnesses
            .rows
            .iter()
            .skip(1)
            .filter_map(|row| {
                let [siglum, description, ..] = row.as_slice() else {
                    return None;
                };
                let siglum = siglum.text().trim().to_string();
                let description = cell_markup(description, &doc.footnotes);
                (!siglum.is_empty() && !description.is_empty()).then_some(Witness { siglum, description })
            })
            .collect();

        Ok(EditionMetadata {
            main: key_values(main),
            source: key_values(source),
            witnesses,
        })
    }

    /// Value of a main-table key, empty when absent.
    pub fn main(&self, key: &str) -> &str {
        lookup(&self.main, &[key]).unwrap_or("")
    }

    pub fn source(&self, key: &str) -> &str {
        lookup(&self.source, &[key]).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        lookup(&self.main, &["Título comedia", "Titulo comedia"]).unwrap_or("")
    }
}

fn key_values(table: &Table) -> Vec<(String, String)> {
    table
        .rows
        .iter()
        .filter_map(|row| match row.as_slice() {
            [key, value, ..] => Some((key.text().trim().to_string(), value.text().trim().to_string())),
            _ => None,
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn lookup<'m>(pairs: &'m [(String, String)], keys: &[&str]) -> Option<&'m str> {
    keys.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    })
}

fn cell_markup(cell: &Cell, footnotes: &Footnotes) -> String {
    cell.paragraphs
        .first()
        .map(|p| format_paragraph(p, footnotes, FootnoteKind::Intro))
        .unwrap_or_default()
}

#[derive(Default)]
struct HeaderWriter {
    lines: Vec<String>,
}

impl HeaderWriter {
    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        let pad = INDENT * (depth + 1);
        self.lines.push(format!("{:pad$}{}", "", text.as_ref(), pad = pad));
    }

    /// `<tag>escaped value</tag>`.
    fn element(&mut self, depth: usize, tag: &str, value: &str) {
        self.line(depth, format!("<{}>{}</{}>", tag, escape_xml(value), tag));
    }

    /// A respStmt listing comma-separated names, skipped when none are given.
    fn responsibility(&mut self, depth: usize, resp: &str, names: &str) {
        let names: Vec<&str> = names.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        if names.is_empty() {
            return;
        }
        self.line(depth, "<respStmt>");
        self.element(depth + 1, "resp", resp);
        for name in names {
            self.element(depth + 1, "persName", name);
        }
        self.line(depth, "</respStmt>");
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// Renders the header, indented as a child of `<TEI>`.
pub fn render_header(meta: &EditionMetadata, mode: HeaderMode) -> String {
    let mut w = HeaderWriter::default();
    let full = mode == HeaderMode::Prolope;

    w.line(0, "<teiHeader>");
    w.line(1, "<fileDesc>");

    w.line(2, "<titleStmt>");
    w.element(3, "title", meta.title());
    w.line(3, format!("<author><name>{}</name></author>", escape_xml(meta.main("Autor"))));
    if !meta.main("Editor").is_empty() {
        w.element(3, "editor", meta.main("Editor"));
    }
    if full {
        w.responsibility(
            3,
            "Edición crítica digital revisada filológicamente por",
            meta.main("Responsable/s revisión"),
        );
        w.responsibility(3, "Marcado XML-TEI automático revisado por", meta.main("Responsable marcado automático"));
        w.line(3, "<respStmt>");
        w.element(4, "resp", "Codificado según los criterios de");
        w.line(4, format!(r#"<name ref="{}">{}</name>"#, GROUP_REF, escape_xml(GROUP_NAME)));
        w.line(3, "</respStmt>");
    }
    w.line(2, "</titleStmt>");

    if full {
        w.line(2, "<editionStmt>");
        let edition = format!("Versión {}", meta.main("Versión"));
        w.element(3, "edition", edition.trim());
        w.line(2, "</editionStmt>");
    }

    w.line(2, "<publicationStmt>");
    w.element(3, "publisher", meta.main("Publicado por"));
    w.element(3, "pubPlace", meta.main("Lugar publicación"));
    w.element(3, "date", meta.main("Fecha publicación"));
    if full {
        w.line(3, r#"<availability status="restricted">"#);
        w.element(4, "p", "Todos los derechos reservados.");
        w.line(3, "</availability>");
    }
    w.line(2, "</publicationStmt>");

    if full {
        w.line(2, "<seriesStmt>");
        w.element(3, "title", SERIES_TITLE);
        w.line(3, "<respStmt>");
        w.element(4, "resp", "Dirección de");
        w.line(4, SERIES_DIRECTOR);
        w.line(3, "</respStmt>");
        w.line(3, format!(r#"<idno type="URI">{}</idno>"#, SERIES_URI));
        w.line(2, "</seriesStmt>");
    }

    w.line(2, "<sourceDesc>");
    w.line(3, r#"<biblStruct xml:lang="es">"#);
    w.line(4, "<monogr>");
    w.line(5, format!("<author>{}</author>", escape_xml(meta.main("Autor"))));
    let source_title = lookup(&meta.source, &["Titulo comedia", "Título comedia"]).unwrap_or("");
    w.line(5, format!(r#"<title type="main">{}</title>"#, escape_xml(source_title)));
    if !meta.source("Subtítulo").is_empty() {
        w.line(5, format!(r#"<title type="alt">{}</title>"#, escape_xml(meta.source("Subtítulo"))));
    }
    if !meta.main("Editor").is_empty() {
        w.element(5, "editor", meta.main("Editor"));
    }
    if !meta.source("Título volumen").is_empty() {
        w.line(5, format!(r#"<title type="s">{}</title>"#, escape_xml(meta.source("Título volumen"))));
    }
    if !meta.source("Parte").is_empty() {
        w.line(5, format!(r#"<title type="a">Parte {}</title>"#, escape_xml(meta.source("Parte"))));
    }
    if full {
        w.responsibility(5, "Coordinación del volumen a cargo de", meta.source("Coordinadores volumen"));
    }
    w.line(5, "<imprint>");
    w.element(6, "pubPlace", meta.source("Lugar publicación"));
    w.element(6, "publisher", meta.source("Publicado por"));
    w.element(6, "date", meta.source("Fecha publicación"));
    let volume = escape_xml(meta.source("Volumen"));
    if !volume.is_empty() {
        w.line(6, format!(r#"<biblScope unit="volume" n="{}">vol. {}</biblScope>"#, volume, volume));
    }
    if !meta.source("Páginas").is_empty() {
        w.line(6, format!(r#"<biblScope unit="page">{}</biblScope>"#, escape_xml(meta.source("Páginas"))));
    }
    w.line(5, "</imprint>");
    w.line(4, "</monogr>");
    w.line(3, "</biblStruct>");
    w.line(3, "<listWit>");
    for witness in &meta.witnesses {
        w.line(4, format!(r#"<witness xml:id="{}">"#, escape_xml(&witness.siglum)));
        w.line(5, format!("<label>{}</label>", witness.description));
        w.line(4, "</witness>");
    }
    w.line(3, "</listWit>");
    w.line(2, "</sourceDesc>");
    w.line(1, "</fileDesc>");

    if full {
        w.line(1, "<encodingDesc>");
        w.line(2, "<editorialDecl>");
        w.element(3, "p", "Marcado generado a partir de los estilos de párrafo del original DOCX.");
        w.line(2, "</editorialDecl>");
        w.line(1, "</encodingDesc>");
    }

    w.line(0, "</teiHeader>");
    w.finish()
}

/// Header used when no metadata document is available.
pub fn placeholder_header(title: &str) -> String {
    let mut w = HeaderWriter::default();
    w.line(0, "<teiHeader>");
    w.line(1, "<fileDesc>");
    w.line(2, "<titleStmt>");
    w.element(3, "title", title);
    w.line(2, "</titleStmt>");
    w.line(2, "<publicationStmt>");
    w.element(3, "p", "Sin datos de publicación.");
    w.line(2, "</publicationStmt>");
    w.line(2, "<sourceDesc>");
    w.element(3, "p", "Documento DOCX sin metadatos asociados.");
    w.line(2, "</sourceDesc>");
    w.line(1, "</fileDesc>");
    w.line(0, "</teiHeader>");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::DocxBuilder;
    use quick_xml::Reader;
    use quick_xml::events::Event;
    use std::io::Cursor;

    fn metadata_doc() -> SourceDocument {
        let bytes = DocxBuilder::new()
            .table(&[
                &["Título comedia", "La dama boba"],
                &["Autor", "Lope de Vega"],
                &["Editor", "Marco Presotto"],
                &["Responsable/s revisión", "Ana Pérez, Luis Gil"],
                &["Versión", "1.0"],
                &["Publicado por", "PROLOPE & UAB"],
            ])
            .table(&[
                &["Titulo comedia", "La dama boba"],
                &["Parte", "IX"],
                &["Volumen", "2"],
            ])
            .table(&[
                &["SIGLA TESTIMONIO", "DESCRIPCIÓN"],
                &["A", "Novena parte, Madrid, 1617"],
                &["", "fila vacía"],
            ])
            .build();
        SourceDocument::from_reader(Cursor::new(bytes)).unwrap()
    }

    fn assert_well_formed(xml: &str) {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed header: {}\n{}", e, xml),
            }
        }
    }

    #[test]
    fn test_reads_three_tables() {
        let meta = EditionMetadata::from_document(&metadata_doc()).unwrap();
        assert_eq!(meta.title(), "La dama boba");
        assert_eq!(meta.source("Parte"), "IX");
        assert_eq!(
            meta.witnesses,
            vec![Witness { siglum: "A".to_string(), description: "Novena parte, Madrid, 1617".to_string() }]
        );
    }

    #[test]
    fn test_too_few_tables() {
        let bytes = DocxBuilder::new().table(&[&["Autor", "Lope"]]).build();
        let doc = SourceDocument::from_reader(Cursor::new(bytes)).unwrap();
        assert!(matches!(EditionMetadata::from_document(&doc), Err(MetadataError::TooFewTables(1))));
    }

    #[test]
    fn test_full_header() {
        let meta = EditionMetadata::from_document(&metadata_doc()).unwrap();
        let xml = render_header(&meta, HeaderMode::Prolope);

        assert!(xml.starts_with("  <teiHeader>"));
        assert!(xml.contains("<persName>Ana Pérez</persName>"));
        assert!(xml.contains("<persName>Luis Gil</persName>"));
        assert!(xml.contains("<publisher>PROLOPE &amp; UAB</publisher>"));
        assert!(xml.contains("<edition>Versión 1.0</edition>"));
        assert!(xml.contains(r#"<biblScope unit="volume" n="2">vol. 2</biblScope>"#));
        assert!(xml.contains(r#"<witness xml:id="A">"#));
        assert!(xml.contains("<seriesStmt>"));
        assert_well_formed(&xml);
    }

    #[test]
    fn test_minimal_header() {
        let meta = EditionMetadata::from_document(&metadata_doc()).unwrap();
        let xml = render_header(&meta, HeaderMode::Minimal);

        assert!(xml.contains("<title>La dama boba</title>"));
        assert!(xml.contains("<editor>Marco Presotto</editor>"));
        assert!(!xml.contains("<seriesStmt>"));
        assert!(!xml.contains("<respStmt>"));
        assert!(!xml.contains("<encodingDesc>"));
        assert_well_formed(&xml);
    }

    #[test]
    fn test_placeholder_header() {
        let xml = placeholder_header("Amar & callar");
        assert!(xml.contains("<title>Amar &amp; callar</title>"));
        assert_well_formed(&xml);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("minimal".parse::<HeaderMode>(), Ok(HeaderMode::Minimal));
        assert_eq!(" Prolope ".parse::<HeaderMode>(), Ok(HeaderMode::Prolope));
        assert!("tei".parse::<HeaderMode>().is_err());
        assert_eq!(HeaderMode::default().to_string(), "prolope");
    }
}
