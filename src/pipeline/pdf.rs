//! PDF text extraction via `lopdf`.
//!
//! ## Why spawn_blocking?
//!
//! Parsing the xref table and inflating content streams is CPU-bound and can
//! take hundreds of milliseconds on scanned reports with large embedded
//! streams. `tokio::task::spawn_blocking` keeps that work off the async
//! worker threads.
//!
//! ## Text runs
//!
//! Each text-showing operator (`Tj`, `TJ`, `'`, `"`) contributes one run.
//! Runs are joined with a single space and pages with a newline, so an
//! N-page document always yields N newline-separated segments, in the
//! document's declared page order.
//!
//! ## Fonts
//!
//! String operands are font codes, not text. The font selected by the last
//! `Tf` decides how they map to Unicode:
//!
//! | Font | Decoding |
//! |------|----------|
//! | has `/ToUnicode` | the CMap's `bfchar`/`bfrange` tables |
//! | simple (Type1, TrueType) | its `/Encoding` (WinAnsi, Standard, MacRoman) via lopdf |
//! | Type0 without `/ToUnicode` | none: glyph ids carry no text, the run is dropped |
//!
//! CMap streams share the content-stream token grammar, so lopdf's content
//! parser reads them too.

use crate::error::ExtractionError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Extract the text of every page, newline-joined.
pub async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || extract_pdf_text_blocking(&bytes))
        .await
        .map_err(|e| ExtractionError::Internal(format!("PDF task panicked: {}", e)))?
}

/// Blocking implementation of [`extract_pdf_text`].
pub fn extract_pdf_text_blocking(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut document = Document::load_mem(bytes).map_err(|e| {
        let detail = e.to_string();
        if detail.to_ascii_lowercase().contains("encrypt") {
            ExtractionError::Encrypted
        } else {
            ExtractionError::CorruptPdf { detail }
        }
    })?;

    if document.is_encrypted() {
        // Permission-only protection uses an empty user password.
        document.decrypt("").map_err(|e| {
            debug!("Empty user password rejected: {}", e);
            ExtractionError::Encrypted
        })?;
        info!("Opened encrypted PDF with the empty user password");
    }

    // BTreeMap keyed by 1-based page number: iteration is page order.
    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(ExtractionError::NoPages);
    }
    info!("PDF loaded: {} pages", pages.len());

    let mut page_texts = Vec::with_capacity(pages.len());
    for (page_num, page_id) in pages {
        let runs = page_text_runs(&document, page_id, page_num)?;
        debug!("Page {}: {} text runs", page_num, runs.len());
        page_texts.push(runs.join(" "));
    }

    Ok(page_texts.join("\n"))
}

/// Collect the text runs of one page in content-stream order.
fn page_text_runs(
    document: &Document,
    page_id: ObjectId,
    page_num: u32,
) -> Result<Vec<String>, ExtractionError> {
    let data = document
        .get_page_content(page_id)
        .map_err(|e| ExtractionError::CorruptPdf {
            detail: format!("page {}: {}", page_num, e),
        })?;

    if data.is_empty() {
        return Ok(Vec::new());
    }

    let content = match Content::decode(&data) {
        Ok(c) => c,
        Err(e) => {
            warn!("Page {}: undecodable content stream ({}); treating as empty", page_num, e);
            return Ok(Vec::new());
        }
    };

    let fonts: BTreeMap<Vec<u8>, FontDecoder> = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| {
            let decoder = FontDecoder::for_font(document, font);
            if let FontDecoder::GlyphIds = decoder {
                warn!(
                    "Page {}: font /{} has no /ToUnicode map; its text is skipped",
                    page_num,
                    String::from_utf8_lossy(&name)
                );
            }
            (name, decoder)
        })
        .collect();

    let mut font: Option<&FontDecoder> = None;
    let mut runs = Vec::new();
    for op in &content.operations {
        let run = match op.operator.as_str() {
            "Tf" => {
                font = op
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|name| fonts.get(name));
                None
            }
            "Tj" | "'" => op.operands.first().and_then(|o| string_operand(font, o)),
            "\"" => op.operands.get(2).and_then(|o| string_operand(font, o)),
            "TJ" => op.operands.first().and_then(|o| array_operand(font, o)),
            _ => None,
        };
        if let Some(run) = run {
            runs.push(run);
        }
    }
    Ok(runs)
}

fn string_operand(font: Option<&FontDecoder>, obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => decode_run(font, bytes),
        _ => None,
    }
}

/// A `TJ` array mixes strings and kerning numbers; only the strings count.
fn array_operand(font: Option<&FontDecoder>, obj: &Object) -> Option<String> {
    let items = obj.as_array().ok()?;
    let mut run = String::new();
    for item in items {
        if let Object::String(bytes, _) = item {
            run.push_str(&decode_run(font, bytes)?);
        }
    }
    Some(run)
}

fn decode_run(font: Option<&FontDecoder>, bytes: &[u8]) -> Option<String> {
    match font {
        Some(font) => font.decode(bytes),
        None => Some(decode_pdf_string(bytes)),
    }
}

/// Strings shown before any `Tf`: UTF-16BE when the BOM is present,
/// otherwise one char per byte.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        return String::from_utf16_lossy(&utf16_units(&bytes[2..]));
    }
    bytes.iter().map(|&b| b as char).collect()
}

// ── Fonts ────────────────────────────────────────────────────────────────

/// How one font's string bytes become text.
#[derive(Debug)]
enum FontDecoder {
    ToUnicode(ToUnicodeMap),
    /// Simple font; holds the base encoding name.
    Simple(String),
    /// Composite font without `/ToUnicode`.
    GlyphIds,
}

impl FontDecoder {
    fn for_font(document: &Document, font: &Dictionary) -> Self {
        if let Some(map) = to_unicode_map(document, font) {
            return FontDecoder::ToUnicode(map);
        }
        if font.get(b"Subtype").and_then(Object::as_name_str).ok() == Some("Type0") {
            return FontDecoder::GlyphIds;
        }
        FontDecoder::Simple(base_encoding(document, font))
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            FontDecoder::ToUnicode(map) => Some(map.decode(bytes)),
            FontDecoder::Simple(encoding) => {
                Some(Document::decode_text(Some(encoding.as_str()), bytes))
            }
            FontDecoder::GlyphIds => None,
        }
    }
}

fn to_unicode_map(document: &Document, font: &Dictionary) -> Option<ToUnicodeMap> {
    let (_, object) = document.dereference(font.get(b"ToUnicode").ok()?).ok()?;
    let stream = object.as_stream().ok()?;
    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    ToUnicodeMap::parse(&data)
}

/// `/Encoding` as a name, or a `/Differences` dictionary's `/BaseEncoding`.
fn base_encoding(document: &Document, font: &Dictionary) -> String {
    let encoding = font
        .get(b"Encoding")
        .and_then(|o| document.dereference(o))
        .map(|(_, o)| o);
    match encoding {
        Ok(Object::Name(name)) => String::from_utf8_lossy(name).into_owned(),
        Ok(Object::Dictionary(dict)) => dict
            .get(b"BaseEncoding")
            .and_then(Object::as_name_str)
            .unwrap_or("StandardEncoding")
            .to_string(),
        _ => "StandardEncoding".to_string(),
    }
}

/// Parsed `/ToUnicode` CMap with fixed-width source codes.
#[derive(Debug, Default)]
struct ToUnicodeMap {
    code_len: usize,
    map: HashMap<u32, String>,
}

impl ToUnicodeMap {
    /// Upper bound on codes one `bfrange` entry may span.
    const MAX_RANGE: u32 = 0xFFFF;

    fn parse(data: &[u8]) -> Option<Self> {
        let content = Content::decode(data).ok()?;
        let mut cmap = ToUnicodeMap::default();

        for op in &content.operations {
            match op.operator.as_str() {
                "endcodespacerange" => {
                    if let Some(Object::String(lo, _)) = op.operands.first() {
                        cmap.note_width(lo);
                    }
                }
                "endbfchar" => {
                    for pair in op.operands.chunks_exact(2) {
                        if let (Object::String(src, _), Object::String(dst, _)) = (&pair[0], &pair[1]) {
                            cmap.note_width(src);
                            cmap.map.insert(code_value(src), utf16_text(dst));
                        }
                    }
                }
                "endbfrange" => {
                    for range in op.operands.chunks_exact(3) {
                        let (Object::String(lo, _), Object::String(hi, _)) = (&range[0], &range[1])
                        else {
                            continue;
                        };
                        cmap.note_width(lo);
                        let (lo, hi) = (code_value(lo), code_value(hi));
                        if hi < lo || hi - lo > Self::MAX_RANGE {
                            continue;
                        }
                        match &range[2] {
                            // Consecutive codes bump the last UTF-16 unit.
                            Object::String(dst, _) => {
                                let base = utf16_units(dst);
                                for (offset, code) in (lo..=hi).enumerate() {
                                    let mut units = base.clone();
                                    if let Some(last) = units.last_mut() {
                                        *last = last.wrapping_add(offset as u16);
                                    }
                                    cmap.map.insert(code, String::from_utf16_lossy(&units));
                                }
                            }
                            Object::Array(dsts) => {
                                for (code, dst) in (lo..=hi).zip(dsts) {
                                    if let Object::String(dst, _) = dst {
                                        cmap.map.insert(code, utf16_text(dst));
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        if cmap.map.is_empty() {
            return None;
        }
        Some(cmap)
    }

    /// The first declared code width wins.
    fn note_width(&mut self, code: &[u8]) {
        if self.code_len == 0 && !code.is_empty() {
            self.code_len = code.len();
        }
    }

    /// Unmapped codes are dropped.
    fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .chunks(self.code_len.max(1))
            .filter_map(|code| self.map.get(&code_value(code)))
            .map(String::as_str)
            .collect()
    }
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    if bytes.len() % 2 == 1 {
        return bytes.iter().map(|&b| u16::from(b)).collect();
    }
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream, StringFormat};

    /// Build an in-memory PDF with one page per entry; each page shows the
    /// given runs with separate `Tj` operators. `None` = page without content.
    pub(crate) fn build_pdf(pages: &[Option<Vec<&str>>]) -> Vec<u8> {
        let pages: Vec<Option<Vec<Object>>> = pages
            .iter()
            .map(|runs| {
                runs.as_ref()
                    .map(|runs| runs.iter().map(|r| Object::string_literal(*r)).collect())
            })
            .collect();
        save(document_with_font(&pages, |doc| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            })
        }))
    }

    /// A document whose pages show raw string operands in font `/F1`.
    fn document_with_font(
        pages: &[Option<Vec<Object>>],
        font: impl FnOnce(&mut Document) -> ObjectId,
    ) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = font(&mut doc);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for runs in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            };
            if let Some(runs) = runs {
                let mut ops = vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                ];
                for run in runs {
                    ops.push(Operation::new("Tj", vec![run.clone()]));
                }
                ops.push(Operation::new("ET", vec![]));
                let content = Content { operations: ops };
                let content_id =
                    doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
                page.set("Contents", content_id);
            }
            let page_id = doc.add_object(page);
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn hex(bytes: &[u8]) -> Object {
        Object::String(bytes.to_vec(), StringFormat::Hexadecimal)
    }

    /// Type0 font over Identity-H, optionally with a `/ToUnicode` CMap.
    fn type0_font(doc: &mut Document, to_unicode: Option<&str>) -> ObjectId {
        let mut font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "ArialMT",
            "Encoding" => "Identity-H",
        };
        if let Some(cmap) = to_unicode {
            let cmap_id = doc.add_object(Stream::new(dictionary! {}, cmap.as_bytes().to_vec()));
            font.set("ToUnicode", cmap_id);
        }
        doc.add_object(font)
    }

    const IDENTITY_CMAP: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
4 beginbfchar
<0001> <0048>
<0002> <0062>
<0003> <00B5>
<0004> <002E>
endbfchar
2 beginbfrange
<0010> <0019> <0030>
<0020> <0021> [<0067> <002F>]
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

    /// Encrypt every stream and string with the RC4 standard handler (R2,
    /// 40-bit). With `user_check` absent lopdf accepts any password, so the
    /// empty one opens the file.
    fn encrypt(doc: &mut Document, user_check: Option<Vec<u8>>) {
        let file_id = Object::string_literal(b"bloodreport-0001".to_vec());
        doc.trailer.set("ID", vec![file_id.clone(), file_id]);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => hex(&[0x42; 32]),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);

        let key = lopdf::encryption::get_encryption_key(doc, "", false).unwrap();
        let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
        for id in ids.into_iter().filter(|id| *id != encrypt_id) {
            // RC4 is symmetric: the decrypt primitive also encrypts.
            let cipher = match lopdf::encryption::decrypt_object(&key, id, &doc.objects[&id]) {
                Ok(cipher) => cipher,
                Err(_) => continue,
            };
            match doc.objects.get_mut(&id) {
                Some(Object::Stream(stream)) => stream.set_content(cipher),
                Some(Object::String(content, _)) => *content = cipher,
                _ => {}
            }
        }

        if let Some(check) = user_check {
            doc.get_dictionary_mut(encrypt_id)
                .unwrap()
                .set("U", hex(&check));
        }
    }

    #[test]
    fn single_page_runs_joined_with_space() {
        let pdf = build_pdf(&[Some(vec!["Hemoglobin", "13.5", "g/dL"])]);
        let text = extract_pdf_text_blocking(&pdf).unwrap();
        assert_eq!(text, "Hemoglobin 13.5 g/dL");
    }

    #[test]
    fn pages_joined_with_newline_in_order() {
        let pdf = build_pdf(&[
            Some(vec!["Page one"]),
            Some(vec!["Page", "two"]),
            Some(vec!["Page three"]),
        ]);
        let text = extract_pdf_text_blocking(&pdf).unwrap();
        let segments: Vec<&str> = text.split('\n').collect();
        assert_eq!(segments, vec!["Page one", "Page two", "Page three"]);
    }

    #[test]
    fn empty_page_contributes_empty_segment() {
        let pdf = build_pdf(&[Some(vec!["A"]), None, Some(vec!["C"])]);
        let text = extract_pdf_text_blocking(&pdf).unwrap();
        assert_eq!(text, "A\n\nC");
    }

    #[test]
    fn extraction_is_stable() {
        let pdf = build_pdf(&[Some(vec!["Ferritin", "12 ng/mL"]), Some(vec!["TSH 2.1"])]);
        let a = extract_pdf_text_blocking(&pdf).unwrap();
        let b = extract_pdf_text_blocking(&pdf).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = extract_pdf_text_blocking(b"%PDF-1.4 this is not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::CorruptPdf { .. }), "got {err:?}");
    }

    #[test]
    fn tj_array_keeps_only_strings() {
        let arr = Object::Array(vec![
            Object::string_literal("Gluc"),
            Object::Integer(-120),
            Object::string_literal("ose"),
        ]);
        assert_eq!(array_operand(None, &arr).as_deref(), Some("Glucose"));
    }

    #[test]
    fn utf16_strings_decode() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "µmol/L".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes), "µmol/L");
    }

    #[test]
    fn async_wrapper_matches_blocking() {
        let pdf = build_pdf(&[Some(vec!["LDL 135"])]);
        let text = tokio_test::block_on(extract_pdf_text(pdf)).unwrap();
        assert_eq!(text, "LDL 135");
    }

    #[test]
    fn zero_pages_is_an_error() {
        let err = extract_pdf_text_blocking(&build_pdf(&[])).unwrap_err();
        assert!(matches!(err, ExtractionError::NoPages), "got {err:?}");
    }

    #[test]
    fn win_ansi_bytes_decode_through_font_encoding() {
        let run = Object::string_literal(b"Ferritin 12\x9630 ng/mL \x80 patient\x92s".to_vec());
        let pdf = save(document_with_font(&[Some(vec![run])], |doc| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })
        }));
        let text = extract_pdf_text_blocking(&pdf).unwrap();
        assert_eq!(text, "Ferritin 12\u{2013}30 ng/mL \u{20ac} patient\u{2019}s");
    }

    #[test]
    fn differences_dictionary_uses_its_base_encoding() {
        let run = Object::string_literal(b"TSH \x96 normal".to_vec());
        let pdf = save(document_with_font(&[Some(vec![run])], |doc| {
            let encoding = doc.add_object(dictionary! {
                "Type" => "Encoding",
                "BaseEncoding" => "WinAnsiEncoding",
            });
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "TrueType",
                "BaseFont" => "Arial",
                "Encoding" => encoding,
            })
        }));
        assert_eq!(extract_pdf_text_blocking(&pdf).unwrap(), "TSH \u{2013} normal");
    }

    #[test]
    fn identity_h_text_decodes_through_to_unicode() {
        let runs = vec![
            hex(&[0x00, 0x01, 0x00, 0x02]),
            hex(&[0x00, 0x11, 0x00, 0x13, 0x00, 0x04, 0x00, 0x15]),
            hex(&[0x00, 0x20, 0x00, 0x21, 0x00, 0x03, 0x00, 0x20]),
        ];
        let pdf = save(document_with_font(&[Some(runs)], |doc| {
            type0_font(doc, Some(IDENTITY_CMAP))
        }));
        let text = extract_pdf_text_blocking(&pdf).unwrap();
        assert_eq!(text, "Hb 13.5 g/\u{b5}g");
        assert!(!text.contains('\0'));
    }

    #[test]
    fn identity_h_without_to_unicode_contributes_nothing() {
        let runs = vec![hex(&[0x00, 0x01, 0x00, 0x02])];
        let pdf = save(document_with_font(&[Some(runs), Some(Vec::new())], |doc| {
            type0_font(doc, None)
        }));
        assert_eq!(extract_pdf_text_blocking(&pdf).unwrap(), "\n");
    }

    #[test]
    fn to_unicode_map_rejects_streams_without_mappings() {
        assert!(ToUnicodeMap::parse(b"begincmap endcmap").is_none());
    }

    #[test]
    fn owner_restricted_pdf_opens_with_empty_password() {
        let runs = vec![Object::string_literal("Vitamin D 22 ng/mL")];
        let mut doc = document_with_font(&[Some(runs)], |doc| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            })
        });
        encrypt(&mut doc, None);
        let pdf = save(doc);

        assert!(Document::load_mem(&pdf).unwrap().is_encrypted());
        assert_eq!(extract_pdf_text_blocking(&pdf).unwrap(), "Vitamin D 22 ng/mL");
    }

    #[test]
    fn password_protected_pdf_is_encrypted_error() {
        let runs = vec![Object::string_literal("Vitamin D 22 ng/mL")];
        let mut doc = document_with_font(&[Some(runs)], |doc| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            })
        });
        encrypt(&mut doc, Some(vec![0u8; 32]));
        let pdf = save(doc);

        let err = extract_pdf_text_blocking(&pdf).unwrap_err();
        assert!(matches!(err, ExtractionError::Encrypted), "got {err:?}");
    }
}
