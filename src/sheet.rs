//! Spreadsheet reading — saved attachment file → header-stripped [`Table`].

use std::path::Path;

use calamine::{CellErrorType, Data, Reader, open_workbook_auto};

use crate::extractor::{Cell, ExtractionFailure, Table};

/// Text values treated as missing cells.
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Loads a table from a file on disk.
///
/// Unreadable or malformed files are reported as
/// [`ExtractionFailure::ParseError`], never as operational errors.
pub trait TableReader: Send + Sync {
    fn read_table(&self, path: &Path) -> Result<Table, ExtractionFailure>;
}

/// Reads the first worksheet of an `.xlsx` (or any calamine-supported) file.
///
/// The first non-blank row is the header and is dropped. Columns are
/// addressed from sheet column A even when the used range starts further
/// right, and fully blank rows are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxReader;

impl TableReader for XlsxReader {
    fn read_table(&self, path: &Path) -> Result<Table, ExtractionFailure> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ExtractionFailure::ParseError(format!("XLSX: {e}")))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ExtractionFailure::ParseError("workbook has no sheets".into()))?
            .map_err(|e| ExtractionFailure::ParseError(format!("XLSX sheet: {e}")))?;

        let Some((last_row, last_col)) = range.end() else {
            return Ok(Table::default());
        };

        let rows = (0..=last_row)
            .map(|r| {
                (0..=last_col)
                    .map(|c| range.get_value((r, c)).map_or(Cell::Empty, to_cell))
                    .collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|cell| *cell != Cell::Empty))
            .skip(1)
            .collect();

        Ok(Table::new(rows))
    }
}

/// Convert a calamine cell into the extractor's cell model.
pub fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) if is_missing_marker(s) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::Error(CellErrorType::NA) => Cell::Empty,
        Data::Error(e) => Cell::Text(format!("#ERR({e:?})")),
        Data::DateTime(dt) => Cell::Text(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

fn is_missing_marker(s: &str) -> bool {
    MISSING_MARKERS.contains(&s)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::extractor::extract;

    enum Value {
        Num(f64),
        Str(&'static str),
    }
    use Value::{Num, Str};

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

    const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

    fn sheet_xml(cells: &[(String, Value)]) -> String {
        let mut rows: Vec<(u32, String)> = Vec::new();
        for (reference, value) in cells {
            let row: u32 = reference
                .trim_start_matches(|c: char| c.is_ascii_alphabetic())
                .parse()
                .unwrap();
            let cell = match value {
                Num(n) => format!(r#"<c r="{reference}"><v>{n}</v></c>"#),
                Str(s) => format!(r#"<c r="{reference}" t="inlineStr"><is><t>{s}</t></is></c>"#),
            };
            match rows.last_mut() {
                Some((r, xml)) if *r == row => xml.push_str(&cell),
                _ => rows.push((row, cell)),
            }
        }

        let body: String = rows
            .iter()
            .map(|(r, xml)| format!(r#"<row r="{r}">{xml}</row>"#))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{body}</sheetData></worksheet>"#
        )
    }

    /// Write a one-sheet workbook. Cells must be listed in row order.
    fn write_xlsx(dir: &Path, cells: &[(String, Value)]) -> PathBuf {
        let path = dir.join("data.xlsx");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        let sheet = sheet_xml(cells);
        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/worksheets/sheet1.xml", sheet.as_str()),
        ];
        for (name, content) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn header(row: u32, first_col: char) -> Vec<(String, Value)> {
        ["h1", "h2", "h3", "h4", "h5"]
            .into_iter()
            .enumerate()
            .filter(|(i, _)| (b'A' + *i as u8) as char >= first_col)
            .map(|(i, name)| (format!("{}{row}", (b'A' + i as u8) as char), Str(name)))
            .collect()
    }

    fn read(cells: Vec<(String, Value)>) -> Table {
        let dir = tempfile::tempdir().unwrap();
        let path = write_xlsx(dir.path(), &cells);
        XlsxReader.read_table(&path).unwrap()
    }

    fn data(cells: &[(&str, f64)]) -> Vec<(String, Value)> {
        cells.iter().map(|(r, n)| (r.to_string(), Num(*n))).collect()
    }

    #[test]
    fn workbook_worked_example() {
        let mut cells = header(1, 'A');
        cells.extend(data(&[("B2", 10.0), ("D2", 2.0), ("B3", 20.0), ("D3", 4.0), ("E3", 0.0)]));

        let table = read(cells);
        assert_eq!(table.rows().len(), 2);
        let value = extract(&table).unwrap();
        assert_eq!(format!("{value:.4}"), "666.6667");
    }

    #[test]
    fn offset_sheet_keeps_column_letters() {
        let mut cells = header(3, 'B');
        cells.extend(data(&[("B4", 10.0), ("D4", 2.0), ("B5", 20.0), ("D5", 4.0), ("E5", 0.0)]));

        let table = read(cells);
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0][0], Cell::Empty);
        assert_eq!(table.rows()[0][1], Cell::Number(10.0));
        assert_eq!(format!("{:.4}", extract(&table).unwrap()), "666.6667");
    }

    #[test]
    fn blank_rows_are_skipped() {
        let mut cells = header(1, 'A');
        cells.extend(data(&[("B2", 10.0), ("D2", 2.0), ("B4", 20.0), ("D4", 4.0), ("E4", 0.0)]));

        let table = read(cells);
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[1][1], Cell::Number(20.0));
    }

    #[test]
    fn header_only_sheet_is_empty() {
        let table = read(header(1, 'A'));
        assert!(table.is_empty());
        assert_eq!(extract(&table), Err(ExtractionFailure::Empty));
    }

    #[test]
    fn numbers_convert() {
        assert_eq!(to_cell(&Data::Int(4)), Cell::Number(4.0));
        assert_eq!(to_cell(&Data::Float(0.25)), Cell::Number(0.25));
    }

    #[test]
    fn missing_markers_become_empty() {
        for marker in ["", "NA", "N/A", "#N/A", "NaN", "null", "None"] {
            assert_eq!(to_cell(&Data::String(marker.into())), Cell::Empty, "{marker}");
        }
        assert_eq!(to_cell(&Data::Error(CellErrorType::NA)), Cell::Empty);
    }

    #[test]
    fn other_values_are_text() {
        assert_eq!(to_cell(&Data::String("12".into())), Cell::Text("12".into()));
        assert_eq!(to_cell(&Data::Bool(true)), Cell::Text("true".into()));
        assert!(matches!(to_cell(&Data::Error(CellErrorType::Div0)), Cell::Text(_)));
    }

    #[test]
    fn unreadable_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let result = XlsxReader.read_table(&path);
        assert!(matches!(result, Err(ExtractionFailure::ParseError(_))));
    }

    #[test]
    fn missing_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = XlsxReader.read_table(&dir.path().join("absent.xlsx"));
        assert!(matches!(result, Err(ExtractionFailure::ParseError(_))));
    }
}
