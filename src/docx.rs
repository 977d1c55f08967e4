//! Word (.docx) export of extracted texts.
//!
//! Writes a minimal WordprocessingML package: a title, then one `Heading1` section
//! per image with a page break between sections.

use crate::error::{ExtractorError, Result};
use crate::schema::now_iso8601;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DOCX_FILENAME: &str = "extracted_text.docx";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOCUMENT_TITLE: &str = "Extracted Text from Images";

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const APP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>image-text-extractor</Application></Properties>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:eastAsia="Calibri" w:cs="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="200" w:line="276" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:pBdr><w:bottom w:val="single" w:sz="8" w:space="4" w:color="4F81BD"/></w:pBdr><w:spacing w:after="300" w:line="240" w:lineRule="auto"/></w:pPr><w:rPr><w:color w:val="17365D"/><w:spacing w:val="5"/><w:kern w:val="28"/><w:sz w:val="52"/><w:szCs w:val="52"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:keepLines/><w:spacing w:before="480" w:after="0"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:bCs/><w:color w:val="365F91"/><w:sz w:val="28"/><w:szCs w:val="28"/></w:rPr></w:style></w:styles>"#;

/// Build a .docx containing one section per text, in order.
pub fn build_docx(texts: &[String]) -> Result<Vec<u8>> {
    let document_xml = document_xml(texts)?;
    let core_xml = core_xml(DOCUMENT_TITLE, &now_iso8601());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &[u8]); 7] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
        ("docProps/core.xml", core_xml.as_bytes()),
        ("docProps/app.xml", APP_XML.as_bytes()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.as_bytes()),
        ("word/styles.xml", STYLES_XML.as_bytes()),
        ("word/document.xml", document_xml.as_slice()),
    ];

    for (name, data) in parts {
        zip.start_file(name, options)?;
        zip.write_all(data)?;
    }

    let cursor = zip.finish()?;
    let bytes = cursor.into_inner();
    tracing::debug!("Built docx: {} sections, {} bytes", texts.len(), bytes.len());
    Ok(bytes)
}

fn core_xml(title: &str, created: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>image-text-extractor</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{}</dcterms:modified></cp:coreProperties>"#,
        quick_xml::escape::escape(title),
        created,
        created
    )
}

fn document_xml(texts: &[String]) -> Result<Vec<u8>> {
    let mut w = Writer::new(Vec::new());

    emit(&mut w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    emit(
        &mut w,
        Event::Start(BytesStart::new("w:document").with_attributes([("xmlns:w", W_NS)])),
    )?;
    emit(&mut w, Event::Start(BytesStart::new("w:body")))?;

    styled_paragraph(&mut w, "Title", DOCUMENT_TITLE)?;

    for (idx, text) in texts.iter().enumerate() {
        styled_paragraph(&mut w, "Heading1", &format!("Image {}", idx + 1))?;
        body_paragraph(&mut w, text)?;
        if idx + 1 < texts.len() {
            page_break(&mut w)?;
        }
    }

    section_properties(&mut w)?;
    emit(&mut w, Event::End(BytesEnd::new("w:body")))?;
    emit(&mut w, Event::End(BytesEnd::new("w:document")))?;

    Ok(w.into_inner())
}

fn emit(w: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    w.write_event(event)
        .map_err(|e| ExtractorError::Document(e.to_string()))
}

fn styled_paragraph(w: &mut Writer<Vec<u8>>, style: &str, text: &str) -> Result<()> {
    emit(w, Event::Start(BytesStart::new("w:p")))?;
    emit(w, Event::Start(BytesStart::new("w:pPr")))?;
    emit(
        w,
        Event::Empty(BytesStart::new("w:pStyle").with_attributes([("w:val", style)])),
    )?;
    emit(w, Event::End(BytesEnd::new("w:pPr")))?;
    run(w, text)?;
    emit(w, Event::End(BytesEnd::new("w:p")))
}

fn body_paragraph(w: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    emit(w, Event::Start(BytesStart::new("w:p")))?;
    if !text.is_empty() {
        run(w, text)?;
    }
    emit(w, Event::End(BytesEnd::new("w:p")))
}

/// One run; `\n` becomes `<w:br/>` and `\t` becomes `<w:tab/>`.
fn run(w: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    let cleaned = sanitize_xml_text(text);

    emit(w, Event::Start(BytesStart::new("w:r")))?;
    for (line_idx, line) in cleaned.split('\n').enumerate() {
        if line_idx > 0 {
            emit(w, Event::Empty(BytesStart::new("w:br")))?;
        }
        for (seg_idx, segment) in line.split('\t').enumerate() {
            if seg_idx > 0 {
                emit(w, Event::Empty(BytesStart::new("w:tab")))?;
            }
            if segment.is_empty() {
                continue;
            }
            emit(
                w,
                Event::Start(BytesStart::new("w:t").with_attributes([("xml:space", "preserve")])),
            )?;
            emit(w, Event::Text(BytesText::new(segment)))?;
            emit(w, Event::End(BytesEnd::new("w:t")))?;
        }
    }
    emit(w, Event::End(BytesEnd::new("w:r")))
}

fn page_break(w: &mut Writer<Vec<u8>>) -> Result<()> {
    emit(w, Event::Start(BytesStart::new("w:p")))?;
    emit(w, Event::Start(BytesStart::new("w:r")))?;
    emit(
        w,
        Event::Empty(BytesStart::new("w:br").with_attributes([("w:type", "page")])),
    )?;
    emit(w, Event::End(BytesEnd::new("w:r")))?;
    emit(w, Event::End(BytesEnd::new("w:p")))
}

/// US Letter, 1" top/bottom and 1.25" side margins.
fn section_properties(w: &mut Writer<Vec<u8>>) -> Result<()> {
    emit(w, Event::Start(BytesStart::new("w:sectPr")))?;
    emit(
        w,
        Event::Empty(
            BytesStart::new("w:pgSz").with_attributes([("w:w", "12240"), ("w:h", "15840")]),
        ),
    )?;
    emit(
        w,
        Event::Empty(BytesStart::new("w:pgMar").with_attributes([
            ("w:top", "1440"),
            ("w:right", "1800"),
            ("w:bottom", "1440"),
            ("w:left", "1800"),
            ("w:header", "720"),
            ("w:footer", "720"),
            ("w:gutter", "0"),
        ])),
    )?;
    emit(w, Event::End(BytesEnd::new("w:sectPr")))
}

/// Normalize line endings and drop characters XML 1.0 cannot carry.
fn sanitize_xml_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|&c| c == '\t' || c == '\n' || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}'))
        .collect()
}
