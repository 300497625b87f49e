use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Image, Workbook};
use tracing::warn;

use super::{ReportError, ReportTable};

const PHOTO_ROW_HEIGHT: f64 = 60.0;

fn column_width(header: &str, cells: impl Iterator<Item = usize>) -> f64 {
    let widest = cells.max().unwrap_or(0).max(header.chars().count());
    (widest as f64 + 2.0).clamp(8.0, 50.0)
}

/// One worksheet: a bold header row, one row per record, photos in the first column.
pub fn render_xlsx(table: &ReportTable) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xDDEBF7))
        .set_border(FormatBorder::Thin);
    let body = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(table.title.as_str())?;

    let with_photos = table.has_photos();
    let offset: u16 = if with_photos { 1 } else { 0 };
    if with_photos {
        worksheet.write_string_with_format(0, 0, "Photo", &header)?;
        worksheet.set_column_width(0, 12)?;
    }

    for (i, column) in table.columns.iter().enumerate() {
        let col = offset + i as u16;
        worksheet.write_string_with_format(0, col, *column, &header)?;
        let width = column_width(
            column,
            table.rows.iter().map(|r| r.cells.get(i).map_or(0, |c| c.chars().count())),
        );
        worksheet.set_column_width(col, width)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let excel_row = r as u32 + 1;
        for (i, cell) in row.cells.iter().enumerate() {
            worksheet.write_string_with_format(excel_row, offset + i as u16, cell.as_str(), &body)?;
        }

        if let Some(photo) = &row.photo {
            match Image::new_from_buffer(&photo.data) {
                Ok(image) => {
                    worksheet.set_row_height(excel_row, PHOTO_ROW_HEIGHT)?;
                    worksheet.insert_image_fit_to_cell(excel_row, 0, &image, true)?;
                }
                Err(e) => warn!(row = excel_row, "Skipping unreadable photo: {}", e),
            }
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{build_table, testdata};

    #[test]
    fn test_produces_xlsx_archive() {
        let bytes = render_xlsx(&build_table(&testdata::progress())).unwrap();
        // XLSX is a zip container
        assert!(bytes.starts_with(b"PK\x03\x04"));
        assert!(bytes.len() > 1000);
    }

    #[test]
    fn test_empty_table_still_renders() {
        let mut table = build_table(&testdata::plans());
        table.rows.clear();
        assert!(render_xlsx(&table).is_ok());
    }

    #[test]
    fn test_column_width_bounds() {
        assert_eq!(column_width("Age", [1usize, 1].into_iter()), 8.0);
        assert_eq!(column_width("Notes", [200usize].into_iter()), 50.0);
        assert_eq!(column_width("Name", [10usize].into_iter()), 12.0);
    }
}
