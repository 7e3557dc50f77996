//! XLSX workbook assembly.
//!
//! An XLSX file is a zip container of OOXML parts. Each detected table
//! becomes one worksheet (inline strings, content-based column widths),
//! named `Page{page}-T{n}` in detection order.

use crate::error::{ExtractError, ExtractResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sheetpress_core::Table;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Column width bounds (Excel character units).
const MIN_COLUMN_WIDTH: usize = 8;
const MAX_COLUMN_WIDTH: usize = 60;

fn assembly_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Transient(format!("workbook assembly failed: {e}"))
}

/// Spreadsheet column letters for a 0-based index (A, B, ..., Z, AA, ...).
fn column_name(mut idx: usize) -> String {
    let mut name = String::new();
    loop {
        name.insert(0, (b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    name
}

/// Worksheet names, `Page{page}-T{n}` with `n` counting tables per page.
fn sheet_names(tables: &[Table]) -> Vec<String> {
    let mut names = Vec::with_capacity(tables.len());
    let mut current_page = 0u32;
    let mut ordinal = 0u32;
    for table in tables {
        if table.page != current_page {
            current_page = table.page;
            ordinal = 0;
        }
        ordinal += 1;
        names.push(format!("Page{}-T{ordinal}", table.page));
    }
    names
}

/// Best-effort content-based column widths, clamped.
fn column_widths(table: &Table) -> Vec<usize> {
    let columns = table.column_count();
    let mut widths = vec![0usize; columns];
    for row in &table.rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }
    widths
        .into_iter()
        .map(|w| (w + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH))
        .collect()
}

/// Serialize one worksheet part.
fn worksheet_xml(table: &Table) -> ExtractResult<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(assembly_err)?;

    let mut worksheet = BytesStart::new("worksheet");
    worksheet.push_attribute(("xmlns", MAIN_NS));
    writer
        .write_event(Event::Start(worksheet))
        .map_err(assembly_err)?;

    let widths = column_widths(table);
    if !widths.is_empty() {
        writer
            .write_event(Event::Start(BytesStart::new("cols")))
            .map_err(assembly_err)?;
        for (idx, width) in widths.iter().enumerate() {
            let col_num = (idx + 1).to_string();
            let mut col = BytesStart::new("col");
            col.push_attribute(("min", col_num.as_str()));
            col.push_attribute(("max", col_num.as_str()));
            col.push_attribute(("width", format!("{width}.0").as_str()));
            col.push_attribute(("customWidth", "1"));
            writer.write_event(Event::Empty(col)).map_err(assembly_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("cols")))
            .map_err(assembly_err)?;
    }

    writer
        .write_event(Event::Start(BytesStart::new("sheetData")))
        .map_err(assembly_err)?;
    for (row_idx, cells) in table.rows.iter().enumerate() {
        let row_num = (row_idx + 1).to_string();
        let mut row = BytesStart::new("row");
        row.push_attribute(("r", row_num.as_str()));
        writer.write_event(Event::Start(row)).map_err(assembly_err)?;

        for (col_idx, cell) in cells.iter().enumerate() {
            let cell_ref = format!("{}{row_num}", column_name(col_idx));
            let mut c = BytesStart::new("c");
            c.push_attribute(("r", cell_ref.as_str()));
            c.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(c)).map_err(assembly_err)?;
            writer
                .write_event(Event::Start(BytesStart::new("is")))
                .map_err(assembly_err)?;
            writer
                .write_event(Event::Start(BytesStart::new("t")))
                .map_err(assembly_err)?;
            writer
                .write_event(Event::Text(BytesText::new(cell)))
                .map_err(assembly_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("t")))
                .map_err(assembly_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("is")))
                .map_err(assembly_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("c")))
                .map_err(assembly_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("row")))
            .map_err(assembly_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("sheetData")))
        .map_err(assembly_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("worksheet")))
        .map_err(assembly_err)?;

    Ok(writer.into_inner().into_inner())
}

fn content_types_xml(sheet_count: usize) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
         <Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>",
    );
    for n in 1..=sheet_count {
        xml.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn root_rels_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"{PKG_REL_NS}\">\
         <Relationship Id=\"rId1\" Type=\"{REL_NS}/officeDocument\" Target=\"xl/workbook.xml\"/>\
         </Relationships>"
    )
}

fn workbook_xml(names: &[String]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <workbook xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\"><sheets>"
    );
    for (idx, name) in names.iter().enumerate() {
        let n = idx + 1;
        xml.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{n}\" r:id=\"rId{n}\"/>",
            quick_xml::escape::escape(name.as_str())
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"{PKG_REL_NS}\">"
    );
    for n in 1..=sheet_count {
        xml.push_str(&format!(
            "<Relationship Id=\"rId{n}\" Type=\"{REL_NS}/worksheet\" Target=\"worksheets/sheet{n}.xml\"/>"
        ));
    }
    xml.push_str(&format!(
        "<Relationship Id=\"rId{}\" Type=\"{REL_NS}/styles\" Target=\"styles.xml\"/>",
        sheet_count + 1
    ));
    xml.push_str("</Relationships>");
    xml
}

fn styles_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <styleSheet xmlns=\"{MAIN_NS}\">\
         <fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
         <fills count=\"1\"><fill><patternFill patternType=\"none\"/></fill></fills>\
         <borders count=\"1\"><border/></borders>\
         <cellStyleXfs count=\"1\"><xf/></cellStyleXfs>\
         <cellXfs count=\"1\"><xf/></cellXfs>\
         </styleSheet>"
    )
}

/// Assemble detected tables into an XLSX workbook.
///
/// Callers guarantee `tables` is non-empty; an empty slice would produce a
/// workbook no spreadsheet application accepts.
pub fn write_workbook(tables: &[Table]) -> ExtractResult<Vec<u8>> {
    debug_assert!(!tables.is_empty());

    let names = sheet_names(tables);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let add_part = |zip: &mut ZipWriter<Cursor<Vec<u8>>>,
                        name: &str,
                        data: &[u8]|
     -> ExtractResult<()> {
        zip.start_file(name, options).map_err(assembly_err)?;
        zip.write_all(data).map_err(assembly_err)?;
        Ok(())
    };

    add_part(
        &mut zip,
        "[Content_Types].xml",
        content_types_xml(tables.len()).as_bytes(),
    )?;
    add_part(&mut zip, "_rels/.rels", root_rels_xml().as_bytes())?;
    add_part(&mut zip, "xl/workbook.xml", workbook_xml(&names).as_bytes())?;
    add_part(
        &mut zip,
        "xl/_rels/workbook.xml.rels",
        workbook_rels_xml(tables.len()).as_bytes(),
    )?;
    add_part(&mut zip, "xl/styles.xml", styles_xml().as_bytes())?;

    for (idx, table) in tables.iter().enumerate() {
        let part = worksheet_xml(table)?;
        add_part(&mut zip, &format!("xl/worksheets/sheet{}.xml", idx + 1), &part)?;
    }

    let cursor = zip.finish().map_err(assembly_err)?;
    Ok(cursor.into_inner())
}
