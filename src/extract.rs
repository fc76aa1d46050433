//! Transcript text extraction.
//!
//! Graph hands back raw bytes. VTT and TXT are decoded as UTF-8 (lossy,
//! BOM stripped); DOCX is unzipped and the `<w:t>` runs of
//! `word/document.xml` are joined, one line per paragraph.
//! [`vtt_to_text`] flattens WebVTT cues into `Speaker: text` lines for
//! summarization prompts.

use std::io::Read;

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFileType(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFileType(name) => {
                write!(f, "unsupported transcript file type: {}", name)
            }
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Decode a downloaded transcript based on its file name.
pub fn extract_text(bytes: &[u8], file_name: &str) -> Result<String, ExtractError> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "vtt" | "txt" => Ok(decode_utf8(bytes)),
        "docx" => extract_docx(bytes),
        _ => Err(ExtractError::UnsupportedFileType(file_name.to_string())),
    }
}

fn decode_utf8(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    paragraphs_from_document_xml(&xml)
}

fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        paragraphs.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n"))
}

/// Flatten WebVTT into plain `Speaker: text` lines.
///
/// Drops the `WEBVTT` header, `NOTE`/`STYLE`/`REGION` blocks, cue
/// identifiers and timing lines. `<v Name>` voice tags become a
/// `Name: ` prefix; other inline tags are removed. Consecutive cues from
/// the same speaker are merged. Input that does not look like VTT is
/// returned trimmed.
pub fn vtt_to_text(vtt: &str) -> String {
    let vtt = vtt.trim_start_matches('\u{feff}');
    if !vtt.trim_start().starts_with("WEBVTT") {
        return vtt.trim().to_string();
    }

    let mut lines: Vec<(Option<String>, String)> = Vec::new();

    for block in vtt.replace("\r\n", "\n").split("\n\n") {
        let block = block.trim();
        if block.is_empty()
            || block.starts_with("WEBVTT")
            || block.starts_with("NOTE")
            || block.starts_with("STYLE")
            || block.starts_with("REGION")
        {
            continue;
        }

        let mut cue_lines = block.lines().skip_while(|l| !l.contains("-->"));
        if cue_lines.next().is_none() {
            continue;
        }

        for raw in cue_lines {
            let (speaker, text) = split_voice(raw);
            let text = strip_tags(&text);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match lines.last_mut() {
                Some((last_speaker, last_text)) if *last_speaker == speaker && speaker.is_some() => {
                    last_text.push(' ');
                    last_text.push_str(text);
                }
                _ => lines.push((speaker, text.to_string())),
            }
        }
    }

    lines
        .into_iter()
        .map(|(speaker, text)| match speaker {
            Some(s) => format!("{}: {}", s, text),
            None => text,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_voice(line: &str) -> (Option<String>, String) {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("<v") {
        if let Some(end) = rest.find('>') {
            let tag = &rest[..end];
            // `<v.loud Name>` carries classes before the first space.
            let name = if tag.starts_with('.') {
                tag.split_once(' ').map(|(_, n)| n).unwrap_or_default()
            } else {
                tag
            }
            .trim();
            let speaker = (!name.is_empty()).then(|| name.to_string());
            return (speaker, rest[end + 1..].to_string());
        }
    }
    (None, trimmed.to_string())
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}
