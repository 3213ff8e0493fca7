//! Requirement sheets: reading RFP spreadsheets and writing answered copies.
//!
//! A sheet is read from CSV or from the first worksheet of an XLSX file.
//! The first row is the header; every following non-blank row is one
//! requirement. Cells keep their column positions so a row's text lines
//! up with the header even when cells are missing.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Column appended to the processed sheet.
pub const ANSWER_COLUMN: &str = "AI Response";

/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells read from a worksheet.
const MAX_CELLS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequirementSheet {
    pub headers: Vec<String>,
    /// Data rows, each padded to `headers.len()`.
    pub rows: Vec<Vec<String>>,
}

impl RequirementSheet {
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Result<Self> {
        if grid.is_empty() {
            bail!("sheet has no header row");
        }
        let headers = grid.remove(0);
        let width = headers.len();
        let rows = grid
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                row.resize(width.max(row.len()), String::new());
                row.truncate(width);
                row
            })
            .collect();
        Ok(Self { headers, rows })
    }

    /// Requirement text for data row `index`: `"{column}: \n{value}\n\n"`
    /// for every column, in header order.
    pub fn requirement_text(&self, index: usize) -> String {
        let Some(row) = self.rows.get(index) else {
            return String::new();
        };
        self.headers
            .iter()
            .zip(row.iter())
            .map(|(column, value)| format!("{}: \n{}\n\n", column, value))
            .collect()
    }

    pub fn requirement_texts(&self) -> Vec<String> {
        (0..self.rows.len())
            .map(|i| self.requirement_text(i))
            .collect()
    }

    /// Write the sheet as CSV with `answers` in an extra [`ANSWER_COLUMN`].
    pub fn write_processed_csv(&self, answers: &[String], path: &Path) -> Result<()> {
        if answers.len() != self.rows.len() {
            bail!(
                "answer count mismatch: {} rows, {} answers",
                self.rows.len(),
                answers.len()
            );
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut header = self.headers.clone();
        header.push(ANSWER_COLUMN.to_string());
        writer.write_record(&header)?;
        for (row, answer) in self.rows.iter().zip(answers) {
            let mut record = row.clone();
            record.push(answer.clone());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// `{stem with spaces replaced by _}_processed.csv`.
pub fn processed_file_name(rfp_name: &str) -> String {
    let stem = Path::new(rfp_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(rfp_name);
    format!("{}_processed.csv", stem.replace(' ', "_"))
}

/// Read a CSV or XLSX sheet, chosen by file extension.
pub fn read_sheet(path: &Path) -> Result<RequirementSheet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            read_xlsx(&bytes)
        }
        other => bail!(
            "Unsupported sheet type '{}' for {}. Use .csv or .xlsx",
            other,
            path.display()
        ),
    }
}

fn read_csv(path: &Path) -> Result<RequirementSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed CSV in {}", path.display()))?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    RequirementSheet::from_grid(grid)
}

/// Parse the first worksheet of an XLSX workbook.
pub fn read_xlsx(bytes: &[u8]) -> Result<RequirementSheet> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("Invalid XLSX archive")?;

    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let sheet = first_worksheet_name(&archive)
        .ok_or_else(|| anyhow::anyhow!("XLSX has no worksheets"))?;
    let xml = read_zip_entry_bounded(&mut archive, &sheet)?;
    let cells = read_sheet_cells(&xml, &shared_strings)?;

    let mut grid: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    for (row, col, value) in cells {
        grid.entry(row).or_default().insert(col, value);
    }

    let width = grid
        .values()
        .filter_map(|cols| cols.keys().next_back())
        .max()
        .map(|c| c + 1)
        .unwrap_or(0);
    let dense = grid
        .into_values()
        .map(|cols| {
            let mut row = vec![String::new(); width];
            for (col, value) in cols {
                row[col] = value;
            }
            row
        })
        .collect();
    RequirementSheet::from_grid(dense)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("Missing XLSX entry {}", name))?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        bail!("XLSX entry {} exceeds size limit", name);
    }
    Ok(out)
}

fn first_worksheet_name(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(str::to_string)
}

/// One string per `<si>`, concatenating rich-text runs.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    use quick_xml::events::Event;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Text(te) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Plain,
}

/// `(row, column, value)` for every non-empty cell, zero-based.
fn read_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<Vec<(usize, usize, String)>> {
    use quick_xml::events::Event;

    let mut cells = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row_idx = 0usize;
    let mut next_col = 0usize;
    let mut current: Option<(usize, usize, CellKind)> = None;
    let mut value = String::new();
    let mut capture = false;

    loop {
        if cells.len() >= MAX_CELLS {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    if let Some(r) = attr(&e, b"r").and_then(|r| r.parse::<usize>().ok()) {
                        row_idx = r.saturating_sub(1);
                    }
                    next_col = 0;
                }
                b"c" => {
                    let position = match attr(&e, b"r") {
                        Some(r) => parse_cell_ref(&r),
                        None => Some((row_idx, next_col)),
                    }
                    .filter(|&(_, col)| col < MAX_XLSX_COLUMNS);
                    let kind = match attr(&e, b"t").as_deref() {
                        Some("s") => CellKind::Shared,
                        Some("inlineStr") => CellKind::Inline,
                        _ => CellKind::Plain,
                    };
                    current = match position {
                        Some((row, col)) => {
                            next_col = col + 1;
                            Some((row, col, kind))
                        }
                        None => {
                            debug!(row = row_idx, "skipping cell with unusable reference");
                            next_col += 1;
                            None
                        }
                    };
                    value.clear();
                }
                b"v" | b"t" if current.is_some() => capture = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => next_col += 1,
            Event::Text(te) if capture => value.push_str(&te.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some((row, col, kind)) = current.take() {
                        let resolved = match kind {
                            CellKind::Shared => value
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|i| shared_strings.get(i).cloned())
                                .unwrap_or_default(),
                            CellKind::Inline | CellKind::Plain => value.clone(),
                        };
                        if !resolved.is_empty() {
                            cells.push((row, col, resolved));
                        }
                    }
                }
                b"row" => row_idx += 1,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Widest column Excel allows (`XFD`).
const MAX_XLSX_COLUMNS: usize = 16_384;

/// `"B3"` → `(2, 1)`. `None` for malformed refs and columns past `XFD`.
fn parse_cell_ref(r: &str) -> Option<(usize, usize)> {
    let split = r.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = r.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
        if col > MAX_XLSX_COLUMNS {
            return None;
        }
    }
    let row: usize = digits.parse().ok()?;
    Some((row.checked_sub(1)?, col - 1))
}
