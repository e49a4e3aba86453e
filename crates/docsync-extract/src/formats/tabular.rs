use super::TableKind;
use super::office::{numbered_part, open_zip, zip_entry};
use super::text::read_text;
use crate::error::ExtractError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

/// Rows kept from a delimited file (a header plus 1000) before truncating.
const MAX_ROWS: usize = 1001;
const MAX_SHEETS: usize = 100;
const MAX_CELLS_PER_SHEET: usize = 100_000;

pub(super) fn read(kind: TableKind, path: &Path) -> Result<String, ExtractError> {
    match kind {
        TableKind::Csv => read_delimited(path, ','),
        TableKind::Tsv => read_delimited(path, '\t'),
        TableKind::Xlsx => read_xlsx(path),
    }
}

fn read_delimited(path: &Path, delimiter: char) -> Result<String, ExtractError> {
    let raw = read_text(path)?;
    Ok(render_delimited(&raw, delimiter))
}

fn render_delimited(raw: &str, delimiter: char) -> String {
    let mut rows = Vec::new();
    for (i, record) in Records::new(raw, delimiter).enumerate() {
        if i >= MAX_ROWS {
            rows.push("... (truncated)".to_string());
            break;
        }
        rows.push(record.join(" | "));
    }
    rows.join("\n")
}

/// Records of a delimited file, honouring double-quoted fields and `""`
/// escapes. A quoted field may span line breaks.
struct Records<'a> {
    chars: Peekable<Chars<'a>>,
    delimiter: char,
}

impl<'a> Records<'a> {
    fn new(raw: &'a str, delimiter: char) -> Self {
        Self {
            chars: raw.chars().peekable(),
            delimiter,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chars.peek()?;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        while let Some(c) = self.chars.next() {
            match c {
                '"' if quoted && self.chars.peek() == Some(&'"') => {
                    field.push('"');
                    self.chars.next();
                }
                '"' => quoted = !quoted,
                '\r' if !quoted && self.chars.peek() == Some(&'\n') => {}
                '\n' if !quoted => break,
                c if c == self.delimiter && !quoted => fields.push(std::mem::take(&mut field)),
                c => field.push(c),
            }
        }
        fields.push(field);
        Some(fields)
    }
}

fn read_xlsx(path: &Path) -> Result<String, ExtractError> {
    let mut archive = open_zip(path)?;

    // Workbooks without any string cells have no sharedStrings part
    let shared_strings = match zip_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(ExtractError::Parse(_)) => Vec::new(),
        Err(e) => return Err(e),
    };
    let sheet_titles = match zip_entry(&mut archive, "xl/workbook.xml") {
        Ok(xml) => sheet_titles(&xml)?,
        Err(_) => Vec::new(),
    };

    let mut sheet_parts: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheet_parts.sort_by_key(|name| numbered_part(name, "xl/worksheets/sheet"));

    let mut out = Vec::new();
    for (idx, part) in sheet_parts.iter().take(MAX_SHEETS).enumerate() {
        let title = sheet_titles
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        out.push(format!("Sheet: {}", title));

        let xml = zip_entry(&mut archive, part)?;
        out.extend(sheet_rows(&xml, &shared_strings)?);
    }

    Ok(out.join("\n"))
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().map_err(ExtractError::parse)?.as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_titles(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut titles = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                titles.extend(attr(&e, b"name"));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(titles)
}

/// Render each `<row>` as its cell values joined by ` | `.
fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type: Option<String> = None;
    let mut in_value = false;
    let mut cells = 0usize;
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        if cells >= MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => cell_type = attr(&e, b"t"),
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().map_err(ExtractError::parse)?;
                let value = match cell_type.as_deref() {
                    Some("s") => raw
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or_default(),
                    _ => raw.into_owned(),
                };
                row.push(value);
                cells += 1;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_type = None,
                b"row" => {
                    let line = std::mem::take(&mut row).join(" | ");
                    if !line.trim().is_empty() {
                        rows.push(line);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_quotes() {
        let records: Vec<_> = Records::new(r#"a,"b,c","say ""hi""""#, ',').collect();
        assert_eq!(records, vec![vec!["a", "b,c", r#"say "hi""#]]);
    }

    #[test]
    fn test_quoted_field_spans_lines() {
        let raw = "name,notes\r\nalice,\"line one\nline two\"\r\nbob,short\r\n";
        let records: Vec<_> = Records::new(raw, ',').collect();
        assert_eq!(
            records,
            vec![
                vec!["name", "notes"],
                vec!["alice", "line one\nline two"],
                vec!["bob", "short"],
            ]
        );
        assert_eq!(
            render_delimited(raw, ','),
            "name | notes\nalice | line one\nline two\nbob | short"
        );
    }

    #[test]
    fn test_render_tsv() {
        assert_eq!(render_delimited("a\tb\n1\t2", '\t'), "a | b\n1 | 2");
    }

    #[test]
    fn test_render_truncates() {
        let raw: String = (0..MAX_ROWS + 5).map(|i| format!("{}\n", i)).collect();
        let rendered = render_delimited(&raw, ',');
        assert!(rendered.ends_with("\n1000\n... (truncated)"));
        assert_eq!(rendered.lines().count(), MAX_ROWS + 1);
    }

    #[test]
    fn test_render_keeps_header_and_thousand_rows() {
        let raw: String = (0..=1000).map(|i| format!("{}\n", i)).collect();
        let rendered = render_delimited(&raw, ',');
        assert!(!rendered.contains("truncated"));
        assert!(rendered.ends_with("\n1000"));
    }

    #[test]
    fn test_sheet_rows_with_shared_strings() {
        let shared = vec!["name".to_string(), "alice".to_string()];
        let xml = br#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>42</v></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" t="inlineStr"><is><t>x</t></is></c></row>
        </sheetData></worksheet>"#;
        let rows = sheet_rows(xml, &shared).unwrap();
        assert_eq!(rows, vec!["name | 42", "alice | x"]);
    }

    #[test]
    fn test_sheet_titles() {
        let xml = br#"<workbook><sheets><sheet name="Budget" sheetId="1"/><sheet name="Notes" sheetId="2"/></sheets></workbook>"#;
        assert_eq!(sheet_titles(xml).unwrap(), vec!["Budget", "Notes"]);
    }
}
