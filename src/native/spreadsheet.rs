//! [`SpreadsheetCodec`] backed by calamine for reading and a native CSV
//! reader/writer.
//!
//! calamine only reads workbooks, so XLSX, XLS and ODS output is refused
//! with a collaborator error; CSV is written natively from the first sheet.

use super::blocking;
use crate::capabilities::{BookType, SpreadsheetCodec, Workbook, Worksheet};
use crate::error::ConvertError;
use crate::pipeline::html::escape_html;
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Reader};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineCodec;

/// Parse RFC 4180 CSV: quoted fields, doubled quotes, CRLF or LF rows.
pub(crate) fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match (ch, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => row.push(std::mem::take(&mut field)),
            ('\r', false) if chars.peek() == Some(&'\n') => {}
            ('\n', false) => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            (c, _) => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(crate) fn write_csv(sheet: &Worksheet) -> String {
    let mut out = String::new();
    for row in &sheet.rows {
        let line = row.iter().map(|v| csv_field(v)).collect::<Vec<_>>().join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn unwritable(book_type: BookType) -> ConvertError {
    ConvertError::Collaborator(format!(
        "Writing {} workbooks is not supported by the native spreadsheet codec",
        book_type.extension().to_uppercase()
    ))
}

fn read_blocking(bytes: &[u8], extension: &str) -> Result<Workbook, ConvertError> {
    if extension == "csv" {
        let text = String::from_utf8_lossy(bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(text.as_ref());
        return Ok(Workbook {
            sheets: vec![Worksheet {
                name: "Sheet1".into(),
                rows: parse_csv(text),
            }],
        });
    }

    let mut book = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ConvertError::Collaborator(format!("Failed to open {extension} workbook: {e}")))?;
    let names: Vec<String> = book.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = book
            .worksheet_range(&name)
            .map_err(|e| ConvertError::Collaborator(format!("Failed to read sheet '{name}': {e}")))?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>())
            .collect();
        sheets.push(Worksheet { name, rows });
    }
    debug!("Read {} sheet(s) from {extension}", sheets.len());
    Ok(Workbook { sheets })
}

#[async_trait]
impl SpreadsheetCodec for CalamineCodec {
    async fn read(&self, bytes: Arc<[u8]>, extension: &str) -> Result<Workbook, ConvertError> {
        let extension = extension.to_string();
        blocking("Spreadsheet read", move || read_blocking(&bytes, &extension)).await
    }

    async fn write(&self, workbook: &Workbook, book_type: BookType) -> Result<Vec<u8>, ConvertError> {
        match book_type {
            BookType::Csv => {
                let sheet = workbook.sheets.first().cloned().unwrap_or_default();
                Ok(write_csv(&sheet).into_bytes())
            }
            other => Err(unwritable(other)),
        }
    }

    fn can_write(&self, book_type: BookType) -> bool {
        book_type == BookType::Csv
    }

    fn sheet_to_html(&self, sheet: &Worksheet) -> String {
        let mut html = String::from("<table>\n");
        for row in &sheet.rows {
            html.push_str("<tr>");
            for cell in row {
                html.push_str("<td>");
                html.push_str(&escape_html(cell));
                html.push_str("</td>");
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</table>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quotes_and_crlf() {
        let rows = parse_csv("name,note\r\n\"Smith, J\",\"said \"\"hi\"\"\"\r\nx,\n");
        assert_eq!(
            rows,
            vec![
                vec!["name".to_string(), "note".to_string()],
                vec!["Smith, J".to_string(), "said \"hi\"".to_string()],
                vec!["x".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn csv_written_with_quoting() {
        let sheet = Worksheet {
            name: "S".into(),
            rows: vec![vec!["a,b".into(), "plain".into(), "q\"".into()]],
        };
        assert_eq!(write_csv(&sheet), "\"a,b\",plain,\"q\"\"\"\n");
    }

    #[tokio::test]
    async fn csv_workbook_reads_one_sheet() {
        let book = CalamineCodec
            .read(Arc::from(&b"\xEF\xBB\xBFa,b\n1,2"[..]), "csv")
            .await
            .unwrap();
        assert_eq!(book.sheets.len(), 1);
        assert_eq!(book.sheets[0].rows[0], ["a", "b"]);
        assert_eq!(book.sheets[0].rows[1], ["1", "2"]);
    }

    #[tokio::test]
    async fn binary_writes_are_refused() {
        let err = CalamineCodec.write(&Workbook::default(), BookType::Xlsx).await;
        assert!(err.is_err());
        assert!(!CalamineCodec.can_write(BookType::Xlsx));
        assert!(CalamineCodec.can_write(BookType::Csv));
    }

    #[test]
    fn html_table_escapes_cells() {
        let sheet = Worksheet {
            name: "S".into(),
            rows: vec![vec!["<b>".into(), "x".into()]],
        };
        let html = CalamineCodec.sheet_to_html(&sheet);
        assert!(html.contains("<tr><td>&lt;b&gt;</td><td>x</td></tr>"));
    }
}
