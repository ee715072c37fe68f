//! # drama_tei
//!
//! Converts theatrical manuscripts written in a word processor with a fixed
//! set of paragraph styles into TEI XML.
//!
//! ## Quick Start
//!
//! ```ignore
//! use drama_tei::{convert, ConvertOptions, ConversionOutput};
//!
//! let options = ConvertOptions {
//!     notes: Some("notas.docx".into()),
//!     ..ConvertOptions::default()
//! };
//! if let ConversionOutput::Xml(xml) = convert("comedia.docx", &options)? {
//!     println!("{}", xml);
//! }
//! ```
//!
//! Before converting, [`validate_files`] reports style and note problems as
//! [`Diagnostic`]s.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub mod assembler;
pub mod config;
pub mod docx;
pub mod front;
pub mod header;
pub mod inline;
pub mod notes;
pub mod numbering;
pub mod preview;
pub mod speaker;
pub mod style;
pub mod validator;

#[cfg(test)]
mod testing;

pub use assembler::{Assembly, AssemblyWarning, assemble};
pub use config::{ConfigError, EditionConfig};
pub use docx::{Block, DocxError, Paragraph, SourceDocument};
pub use header::{EditionMetadata, HeaderMode, MetadataError};
pub use notes::{NoteCategory, NoteKey, NoteTable};
pub use preview::{PreviewError, render_preview};
pub use validator::{Diagnostic, DiagnosticKind, Severity, validate, validate_documents, validate_files};

use crate::front::process_front;
use crate::header::{placeholder_header, render_header};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const XML_MODEL: &str = r#"<?xml-model href="http://www.tei-c.org/release/xml/tei/custom/schema/relaxng/tei_all.rng" schematypens="http://relaxng.org/ns/structure/1.0"?>"#;
const TEI_NAMESPACE: &str = "http://www.tei-c.org/ns/1.0";

/// Error type for the conversion entry points.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("main document {} does not exist", .0.display())]
    MainNotFound(PathBuf),
    #[error("{} is not a .docx document", .0.display())]
    NotDocx(PathBuf),
    #[error("cannot read {}: {source}", .path.display())]
    Docx {
        path: PathBuf,
        #[source]
        source: DocxError,
    },
    #[error("no paragraph with style 'Titulo_comedia'; the body cannot be located")]
    MissingTitle,
    #[error("metadata document {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Opens the main manuscript, rejecting anything that is not a `.docx` file.
pub fn open_main(path: &Path) -> Result<SourceDocument, ConversionError> {
    if !path.exists() {
        return Err(ConversionError::MainNotFound(path.to_path_buf()));
    }
    let is_docx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
    if !is_docx {
        return Err(ConversionError::NotDocx(path.to_path_buf()));
    }
    SourceDocument::open(path).map_err(|source| ConversionError::Docx {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub notes: Option<PathBuf>,
    pub apparatus: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    /// Ready-made `<teiHeader>` markup used instead of the metadata document.
    pub header_override: Option<String>,
    pub output: Option<PathBuf>,
    /// Write the result to disk instead of returning it.
    pub persist: bool,
    pub header_mode: HeaderMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutput {
    Xml(String),
    Written(PathBuf),
}

fn load_notes(category: NoteCategory, path: Option<&Path>) -> NoteTable {
    let Some(path) = path else {
        return NoteTable::new();
    };
    if !path.exists() {
        warn!(file = %path.display(), "{} file not found, continuing without it", category.name());
        return NoteTable::new();
    }
    match NoteTable::load(path) {
        Ok(table) => table,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "{} file unreadable, continuing without it", category.name());
            NoteTable::new()
        }
    }
}

fn title_position(doc: &SourceDocument) -> Option<usize> {
    doc.blocks.iter().position(|block| {
        matches!(block, Block::Paragraph(p) if p.style.as_deref() == Some(style::TITLE))
    })
}

/// Plain text of the first title paragraph.
pub fn play_title(doc: &SourceDocument) -> Option<String> {
    match doc.blocks.get(title_position(doc)?) {
        Some(Block::Paragraph(p)) => Some(p.text().trim().to_string()),
        _ => None,
    }
}

/// `LA DAMA BOBA, comedia` → `LA_DAMA_BOBA.xml`.
pub fn default_output_name(title: &str) -> String {
    let words: Vec<String> = title
        .split_whitespace()
        .map(|w| w.replace([',', '.'], ""))
        .filter(|w| !w.is_empty())
        .take(3)
        .collect();
    if words.is_empty() {
        "output.xml".to_string()
    } else {
        format!("{}.xml", words.join("_"))
    }
}

fn resolve_header(
    doc: &SourceDocument,
    options: &ConvertOptions,
) -> Result<String, ConversionError> {
    if let Some(header) = &options.header_override {
        return Ok(header.clone());
    }
    let title = play_title(doc).unwrap_or_default();
    let Some(path) = options.metadata.as_deref() else {
        return Ok(placeholder_header(&title));
    };
    if !path.exists() {
        warn!(file = %path.display(), "metadata file not found, using a placeholder header");
        return Ok(placeholder_header(&title));
    }
    let meta = EditionMetadata::load(path).map_err(|source| ConversionError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(render_header(&meta, options.header_mode))
}

/// Builds the whole TEI document in memory.
pub fn document_to_tei(
    doc: &SourceDocument,
    general: &NoteTable,
    apparatus: &NoteTable,
    header: &str,
) -> Result<String, ConversionError> {
    let title = title_position(doc).ok_or(ConversionError::MissingTitle)?;
    let (front_blocks, body_blocks) = doc.blocks.split_at(title);

    let front = process_front(front_blocks, &doc.footnotes);
    let body = body_blocks
        .iter()
        .enumerate()
        .filter_map(|(offset, block)| match block {
            Block::Paragraph(p) if !p.in_table => Some((title + offset, p)),
            _ => None,
        });
    let assembly = assemble(body, general, apparatus, &doc.footnotes);
    for warning in &assembly.warnings {
        warn!("{}", warning);
    }

    let mut lines: Vec<String> = vec![
        XML_DECLARATION.to_string(),
        XML_MODEL.to_string(),
        format!(r#"<TEI xmlns="{}">"#, TEI_NAMESPACE),
    ];
    if !header.is_empty() {
        lines.push(header.to_string());
    }
    lines.push("  <text>".to_string());
    lines.push("    <front>".to_string());
    lines.push(r#"      <div type="Introducción">"#.to_string());
    lines.extend(front);
    lines.push("      </div>".to_string());
    lines.push("    </front>".to_string());
    lines.push("    <body>".to_string());
    lines.push(r#"      <div type="Texto" subtype="TEXTO">"#.to_string());
    lines.extend(assembly.lines);
    lines.push("      </div>".to_string());
    lines.push("    </body>".to_string());
    lines.push("  </text>".to_string());
    lines.push("</TEI>".to_string());

    info!(verses = assembly.last_verse, roles = assembly.cast.members().len(), "document assembled");
    Ok(lines.join("\n"))
}

/// Converts the main manuscript with its optional companions.
///
/// Missing note files and a missing metadata file degrade the output instead
/// of failing; see [`ConversionError`] for what does fail.
pub fn convert<P: AsRef<Path>>(
    main: P,
    options: &ConvertOptions,
) -> Result<ConversionOutput, ConversionError> {
    let main = main.as_ref();
    info!(file = %main.display(), "converting");
    let doc = open_main(main)?;
    if title_position(&doc).is_none() {
        return Err(ConversionError::MissingTitle);
    }

    let general = load_notes(NoteCategory::General, options.notes.as_deref());
    let apparatus = load_notes(NoteCategory::Apparatus, options.apparatus.as_deref());
    let header = resolve_header(&doc, options)?;
    let xml = document_to_tei(&doc, &general, &apparatus, &header)?;

    if !options.persist {
        return Ok(ConversionOutput::Xml(xml));
    }

    let path = match &options.output {
        Some(path) => path.clone(),
        None => {
            let name = default_output_name(&play_title(&doc).unwrap_or_default());
            main.with_file_name(name)
        }
    };
    write_atomically(&path, &xml)?;
    info!(file = %path.display(), "written");
    Ok(ConversionOutput::Written(path))
}

/// Writes next to the target and renames, so a failed write leaves no
/// truncated file behind.
fn write_atomically(path: &Path, content: &str) -> Result<(), ConversionError> {
    let wrap = |source| ConversionError::Write { path: path.to_path_buf(), source };
    let mut staging = path.as_os_str().to_owned();
    staging.push(".part");
    let staging = PathBuf::from(staging);
    fs::write(&staging, content).map_err(wrap)?;
    fs::rename(&staging, path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        wrap(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::Run;
    use crate::testing::DocxBuilder;

    fn dama_boba() -> DocxBuilder {
        DocxBuilder::new()
            .styled("Normal", "Introducción")
            .styled("Normal", "Prólogo a la comedia")
            .styled("Normal", "Texto de la introducción.")
            .styled("Titulo_comedia", "LA DAMA BOBA")
            .styled("Epigr_Dramatis", "PERSONAS")
            .styled("Dramatis_lista", "Finea, dama boba")
            .styled("Acto", "ACTO PRIMERO")
            .styled("Personaje", "FINEA")
            .styled("Verso", "¿Qué es esto?")
            .styled("Verso", "Nada, señora.")
    }

    #[test]
    fn test_document_shape() {
        let doc = SourceDocument::from_reader(std::io::Cursor::new(dama_boba().build())).unwrap();
        let xml = document_to_tei(&doc, &NoteTable::new(), &NoteTable::new(), &placeholder_header("LA DAMA BOBA"))
            .unwrap();
        let lines: Vec<&str> = xml.lines().collect();
        assert_eq!(lines[0], XML_DECLARATION);
        assert_eq!(lines[2], r#"<TEI xmlns="http://www.tei-c.org/ns/1.0">"#);
        assert_eq!(lines[3], "  <teiHeader>");
        assert_eq!(lines.last(), Some(&"</TEI>"));
        assert!(xml.contains(r#"<head type="divTitle" subtype="MenuLevel_1">Prólogo a la comedia</head>"#));
        assert!(xml.contains(r#"        <head type="mainTitle">LA DAMA BOBA</head>"#));
        assert!(xml.contains(r##"<sp who="#Finea_dama_boba">"##));
        assert!(xml.contains(r#"<l n="2">Nada, señora.</l>"#));
        assert!(!xml.contains(">Introducción<"));

        let mut reader = quick_xml::Reader::from_str(&xml);
        loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("not well-formed: {}", e),
            }
        }
    }

    #[test]
    fn test_missing_title_is_fatal() {
        let doc = SourceDocument::from_paragraphs(vec![Paragraph::styled("Verso", "sin título")]);
        assert!(matches!(
            document_to_tei(&doc, &NoteTable::new(), &NoteTable::new(), ""),
            Err(ConversionError::MissingTitle)
        ));
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(default_output_name("LA DAMA BOBA"), "LA_DAMA_BOBA.xml");
        assert_eq!(default_output_name("El perro del hortelano, comedia"), "El_perro_del.xml");
        assert_eq!(default_output_name("Fuenteovejuna."), "Fuenteovejuna.xml");
        assert_eq!(default_output_name("  "), "output.xml");
    }

    #[test]
    fn test_open_main_checks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_main(&dir.path().join("nada.docx")),
            Err(ConversionError::MainNotFound(_))
        ));

        let txt = dir.path().join("comedia.txt");
        fs::write(&txt, "texto").unwrap();
        assert!(matches!(open_main(&txt), Err(ConversionError::NotDocx(_))));

        let corrupt = dir.path().join("rota.docx");
        fs::write(&corrupt, "no es un zip").unwrap();
        assert!(matches!(open_main(&corrupt), Err(ConversionError::Docx { .. })));
    }

    #[test]
    fn test_convert_with_degraded_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("comedia.docx");
        dama_boba().write_to(&main);

        let options = ConvertOptions {
            notes: Some(dir.path().join("notas.docx")),
            apparatus: Some(dir.path().join("aparato.docx")),
            metadata: Some(dir.path().join("metadatos.docx")),
            ..ConvertOptions::default()
        };
        let ConversionOutput::Xml(xml) = convert(&main, &options).unwrap() else {
            panic!("expected XML");
        };
        assert!(xml.contains("<title>LA DAMA BOBA</title>"));
        assert!(!xml.contains("<note"));
    }

    #[test]
    fn test_convert_applies_notes() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("comedia.docx");
        dama_boba().write_to(&main);
        let notes = dir.path().join("notas.docx");
        DocxBuilder::new().styled("Normal", "2: Respuesta de Otavio.").write_to(&notes);

        let options = ConvertOptions { notes: Some(notes), ..ConvertOptions::default() };
        let ConversionOutput::Xml(xml) = convert(&main, &options).unwrap() else {
            panic!("expected XML");
        };
        assert!(xml.contains("Respuesta de Otavio."));
        assert_eq!(xml.matches("<note").count(), 1);
    }

    #[test]
    fn test_convert_persists_with_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("comedia.docx");
        dama_boba().write_to(&main);

        let options = ConvertOptions { persist: true, ..ConvertOptions::default() };
        let written = convert(&main, &options).unwrap();
        let expected = dir.path().join("LA_DAMA_BOBA.xml");
        assert_eq!(written, ConversionOutput::Written(expected.clone()));
        let content = fs::read_to_string(&expected).unwrap();
        assert!(content.ends_with("</TEI>"));
        assert!(!dir.path().join("LA_DAMA_BOBA.xml.part").exists());
    }

    #[test]
    fn test_header_override_and_short_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("comedia.docx");
        dama_boba().write_to(&main);

        let options = ConvertOptions {
            header_override: Some("  <teiHeader><fileDesc/></teiHeader>".to_string()),
            ..ConvertOptions::default()
        };
        let ConversionOutput::Xml(xml) = convert(&main, &options).unwrap() else {
            panic!("expected XML");
        };
        assert!(xml.contains("<teiHeader><fileDesc/></teiHeader>"));

        let metadata = dir.path().join("metadatos.docx");
        DocxBuilder::new().table(&[&["Título", "LA DAMA BOBA"]]).write_to(&metadata);
        let options = ConvertOptions { metadata: Some(metadata), ..ConvertOptions::default() };
        assert!(matches!(
            convert(&main, &options),
            Err(ConversionError::Metadata { source: MetadataError::TooFewTables(1), .. })
        ));
    }

    #[test]
    fn test_conversion_is_idempotent() {
        let doc = SourceDocument::from_reader(std::io::Cursor::new(
            dama_boba()
                .paragraph(Some("Verso"), &[Run::plain("con "), Run::italic("cursiva")])
                .build(),
        ))
        .unwrap();
        let general = NoteTable::parse("1: Primera nota.");
        let first = document_to_tei(&doc, &general, &NoteTable::new(), "").unwrap();
        let second = document_to_tei(&doc, &general, &NoteTable::new(), "").unwrap();
        assert_eq!(first, second);
    }
}
