//! HTML preview of a generated TEI document.
//!
//! Every TEI element `x` becomes a custom element `tei-x` (lowercased, as HTML
//! wants), attributes are kept and `xml:id` becomes `id`. Styling comes from
//! the bundled stylesheet.

use std::fmt::Write;

use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::inline::escape_xml;

pub fn preview_css() -> &'static str {
    include_str!("preview_template/preview.css")
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("document has no <TEI> root element")]
    NotTei,
}

fn custom_tag(e: &[u8]) -> String {
    format!("tei-{}", String::from_utf8_lossy(e).to_lowercase())
}

fn write_open(out: &mut String, e: &BytesStart) -> Result<String, quick_xml::Error> {
    let tag = custom_tag(e.local_name().as_ref());
    out.push('<');
    out.push_str(&tag);
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let name = if key == b"xml:id" {
            "id".to_string()
        } else {
            String::from_utf8_lossy(key).replace(':', "-")
        };
        let value = attr.unescape_value()?;
        let _ = write!(out, r#" {}="{}""#, name, escape_xml(&value));
    }
    out.push('>');
    Ok(tag)
}

/// Renders TEI markup as a standalone HTML page.
pub fn render_preview(xml: &str) -> Result<String, PreviewError> {
    let mut reader = Reader::from_str(xml);
    let mut body = String::new();
    let mut saw_root = false;
    let mut title = String::new();
    // depth inside <head type="mainTitle">, 0 when outside
    let mut title_depth = 0usize;
    let mut title_done = false;

    loop {
        let event = reader.read_event().map_err(|source| PreviewError::Xml {
            position: reader.buffer_position(),
            source,
        })?;
        let wrap = |source| PreviewError::Xml { position: reader.buffer_position(), source };
        match event {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"TEI" {
                    saw_root = true;
                }
                if title_depth > 0 {
                    title_depth += 1;
                } else if !title_done
                    && e.local_name().as_ref() == b"head"
                    && e.try_get_attribute("type").ok().flatten().is_some_and(|a| a.value.as_ref() == b"mainTitle")
                {
                    title_depth = 1;
                }
                write_open(&mut body, &e).map_err(wrap)?;
            }
            Event::Empty(e) => {
                let tag = write_open(&mut body, &e).map_err(wrap)?;
                let _ = write!(body, "</{}>", tag);
            }
            Event::End(e) => {
                if title_depth > 0 {
                    title_depth -= 1;
                    if title_depth == 0 {
                        title_done = true;
                    }
                }
                let _ = write!(body, "</{}>", custom_tag(e.local_name().as_ref()));
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(wrap)?;
                if title_depth > 0 {
                    title.push_str(&text);
                }
                body.push_str(&escape_xml(&text));
            }
            Event::CData(t) => body.push_str(&escape_xml(&String::from_utf8_lossy(&t))),
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
    }

    if !saw_root {
        return Err(PreviewError::NotTei);
    }

    let title = title.split_whitespace().join(" ");
    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
{}
</style>
</head>
<body>
<main class="tei">
{}
</main>
</body>
</html>"#,
        escape_xml(&title),
        preview_css(),
        body.trim()
    ))
}
