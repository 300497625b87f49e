//! Minimal PDF 1.4 writer.
//!
//! Supports what the reports need: the two standard Helvetica faces with
//! WinAnsi encoding, wrapped text, thin rules, page breaks and JPEG images
//! (passed through with `DCTDecode`). PNG photos are skipped.

use std::fmt::Write as _;

use super::{ReportRow, ReportTable};
use crate::media::ImageFormat;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const BODY_SIZE: f32 = 10.0;
const LINE_HEIGHT: f32 = 14.0;
const PHOTO_SIZE: f32 = 64.0;
const ROW_GAP: f32 = 12.0;

/// Fixed object numbers; images and pages follow
const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const FONT_REGULAR_ID: usize = 3;
const FONT_BOLD_ID: usize = 4;

#[derive(Debug, Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

struct JpegImage<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    components: u8,
}

/// Read the frame header for the pixel size and number of colour components
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32, u8)> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let header = data.get(i + 5..i + 10)?;
            let height = u16::from_be_bytes([header[0], header[1]]) as u32;
            let width = u16::from_be_bytes([header[2], header[3]]) as u32;
            return Some((width, height, header[4]));
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        i += 2 + len;
    }
    None
}

/// Encode text as a PDF literal string in WinAnsi (Latin-1 subset)
fn pdf_string(text: &str, out: &mut Vec<u8>) {
    out.push(b'(');
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            '\n' | '\r' | '\t' => out.push(b' '),
            c if (' '..='~').contains(&c) => out.push(c as u8),
            c if ('\u{A0}'..='\u{FF}').contains(&c) => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out.push(b')');
}

/// Greedy word wrap using an average Helvetica glyph width
fn wrap(text: &str, size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * 0.5)) as usize).max(8);
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            lines.push(head);
        }
        let needed = line.chars().count() + word.chars().count() + usize::from(!line.is_empty());
        if needed > max_chars && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&word);
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

struct Page {
    content: Vec<u8>,
}

struct Layout<'a> {
    pages: Vec<Page>,
    images: Vec<JpegImage<'a>>,
    y: f32,
}

impl<'a> Layout<'a> {
    fn new() -> Self {
        Self {
            pages: vec![Page { content: Vec::new() }],
            images: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn current(&mut self) -> &mut Vec<u8> {
        let last = self.pages.len() - 1;
        &mut self.pages[last].content
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.pages.push(Page { content: Vec::new() });
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        let out = self.current();
        let mut ops = String::new();
        let _ = write!(ops, "BT /{} {} Tf {:.2} {:.2} Td ", font.resource(), size, x, y);
        out.extend_from_slice(ops.as_bytes());
        pdf_string(text, out);
        out.extend_from_slice(b" Tj ET\n");
    }

    fn rule(&mut self, y: f32) {
        let ops = format!(
            "0.75 G 0.5 w {:.2} {:.2} m {:.2} {:.2} l S 0 G\n",
            MARGIN,
            y,
            PAGE_WIDTH - MARGIN,
            y
        );
        self.current().extend_from_slice(ops.as_bytes());
    }

    /// Place a JPEG inside a `PHOTO_SIZE` box whose top-right corner is at (right, top)
    fn image(&mut self, data: &'a [u8], right: f32, top: f32) -> bool {
        let Some((width, height, components)) = jpeg_dimensions(data) else {
            return false;
        };
        if width == 0 || height == 0 {
            return false;
        }
        let scale = PHOTO_SIZE / width.max(height) as f32;
        let (w, h) = (width as f32 * scale, height as f32 * scale);

        let index = self.images.len();
        self.images.push(JpegImage {
            data,
            width,
            height,
            components,
        });
        let ops = format!(
            "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im{} Do Q\n",
            w,
            h,
            right - w,
            top - h,
            index
        );
        self.current().extend_from_slice(ops.as_bytes());
        true
    }

    fn row(&mut self, columns: &[&str], row: &'a ReportRow) {
        let photo = row
            .photo
            .as_ref()
            .filter(|p| p.format == ImageFormat::Jpeg)
            .map(|p| p.data.as_slice());
        let text_width = PAGE_WIDTH - 2.0 * MARGIN - if photo.is_some() { PHOTO_SIZE + 10.0 } else { 0.0 };

        let heading = row.cells.first().cloned().unwrap_or_default();
        let mut lines = Vec::new();
        for (column, cell) in columns.iter().zip(&row.cells).skip(1) {
            if cell.is_empty() {
                continue;
            }
            lines.extend(wrap(&format!("{}: {}", column, cell), BODY_SIZE, text_width - 10.0));
        }

        // Heading and photo stay together; body lines may continue on later pages
        self.ensure_space((2.0 * LINE_HEIGHT).max(if photo.is_some() { PHOTO_SIZE } else { 0.0 }));
        let first_page = self.pages.len();
        let top = self.y;
        self.text(Font::Bold, 12.0, MARGIN, top - 12.0, &heading);
        if let Some(data) = photo {
            self.image(data, PAGE_WIDTH - MARGIN, top);
        }

        self.y = top - LINE_HEIGHT;
        for line in &lines {
            self.ensure_space(LINE_HEIGHT);
            let baseline = self.y - 12.0;
            self.text(Font::Regular, BODY_SIZE, MARGIN + 10.0, baseline, line);
            self.y -= LINE_HEIGHT;
        }
        if photo.is_some() && self.pages.len() == first_page {
            self.y = self.y.min(top - PHOTO_SIZE);
        }

        self.y -= ROW_GAP;
        self.rule(self.y + ROW_GAP / 2.0);
    }
}

/// Lay out the table as one block per row and serialize the document.
///
/// Text is set in the standard Helvetica faces without embedded fonts, so
/// only Latin-1 characters print; anything else (Devanagari, emoji) comes
/// out as `?`. The XLSX report keeps the full text.
pub fn render_pdf(table: &ReportTable) -> Vec<u8> {
    let mut layout = Layout::new();

    let top = layout.y;
    layout.text(Font::Bold, 18.0, MARGIN, top - 18.0, &table.title);
    let generated = format!(
        "Generated {} - {} record(s)",
        chrono::Utc::now().format("%Y-%m-%d"),
        table.rows.len()
    );
    layout.text(Font::Regular, 9.0, MARGIN, top - 34.0, &generated);
    layout.y = top - 48.0;
    layout.rule(layout.y);
    layout.y -= ROW_GAP;

    if table.rows.is_empty() {
        layout.text(Font::Regular, BODY_SIZE, MARGIN, layout.y - BODY_SIZE, "No records.");
    }
    for row in &table.rows {
        layout.row(&table.columns, row);
    }

    write_document(&layout)
}

fn write_document(layout: &Layout<'_>) -> Vec<u8> {
    let first_image_id = FONT_BOLD_ID + 1;
    let first_page_id = first_image_id + layout.images.len();
    let page_ids: Vec<usize> = (0..layout.pages.len()).map(|i| first_page_id + 2 * i).collect();

    let mut objects: Vec<Vec<u8>> = Vec::new();

    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES_ID).into_bytes());
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_ids.len()).into_bytes());
    for face in ["Helvetica", "Helvetica-Bold"] {
        objects.push(
            format!("<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>", face)
                .into_bytes(),
        );
    }

    for image in &layout.images {
        let color_space = match image.components {
            1 => "/DeviceGray",
            4 => "/DeviceCMYK",
            _ => "/DeviceRGB",
        };
        let header = format!(
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>",
            image.width,
            image.height,
            color_space,
            image.data.len()
        );
        objects.push(stream(header, image.data));
    }

    let x_objects = (0..layout.images.len())
        .map(|i| format!("/Im{} {} 0 R", i, first_image_id + i))
        .collect::<Vec<_>>()
        .join(" ");
    for (page, id) in layout.pages.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 {} 0 R /F2 {} 0 R >> /XObject << {} >> >> /Contents {} 0 R >>",
                PAGES_ID,
                PAGE_WIDTH,
                PAGE_HEIGHT,
                FONT_REGULAR_ID,
                FONT_BOLD_ID,
                x_objects,
                id + 1
            )
            .into_bytes(),
        );
        objects.push(stream(format!("<< /Length {} >>", page.content.len()), &page.content));
    }

    let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(xref, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        CATALOG_ID,
        xref_offset
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

fn stream(header: String, data: &[u8]) -> Vec<u8> {
    let mut body = header.into_bytes();
    body.extend_from_slice(b"\nstream\n");
    body.extend_from_slice(data);
    body.extend_from_slice(b"\nendstream");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{build_table, testdata, ReportImage, ReportRecords};

    /// SOI, an APP0 segment, then a baseline frame header for 40x30 RGB
    fn tiny_jpeg() -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 30, 0x00, 40, 0x03]);
        data.extend_from_slice(&[0u8; 9]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_jpeg_dimensions() {
        assert_eq!(jpeg_dimensions(&tiny_jpeg()), Some((40, 30, 3)));
        assert_eq!(jpeg_dimensions(b"\x89PNG"), None);
    }

    #[test]
    fn test_escapes_and_encodes_text() {
        let mut out = Vec::new();
        pdf_string("a (b) \\ é ✓", &mut out);
        assert_eq!(out, b"(a \\(b\\) \\\\ \xE9 ?)".to_vec());
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("one two three four five six seven", 10.0, 60.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
        assert_eq!(wrap("", 10.0, 60.0), vec![String::new()]);
    }

    #[test]
    fn test_document_structure() {
        let pdf = render_pdf(&build_table(&testdata::plans()));
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert!(contains(&pdf, b"(Teaching Plans)"));
        assert!(contains(&pdf, b"/BaseFont /Helvetica-Bold"));
    }

    #[test]
    fn test_long_reports_span_pages() {
        let pdf = render_pdf(&build_table(&testdata::students(40)));
        let text = String::from_utf8_lossy(&pdf);
        let pages = text.matches("/Type /Page ").count();
        assert!(pages > 1, "expected several pages, got {}", pages);
        assert!(text.contains(&format!("/Count {}", pages)));
    }

    /// Every `x y Td` baseline in the document
    fn baselines(pdf: &[u8]) -> Vec<f32> {
        let text = String::from_utf8_lossy(pdf);
        text.split(" Td")
            .filter_map(|chunk| chunk.split_whitespace().last()?.parse().ok())
            .collect()
    }

    #[test]
    fn test_tall_row_continues_on_next_page() {
        let long = "counting songs and sorting beads ".repeat(70);
        let long = long[..2000].to_string();
        let mut records = testdata::plans();
        if let ReportRecords::Plans(plans) = &mut records {
            plans[0].description = long.clone();
            plans[0].activities = long.clone();
            plans[0].goals = long;
        }

        let pdf = render_pdf(&build_table(&records));
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.matches("/Type /Page ").count() > 1);

        let ys = baselines(&pdf);
        assert!(ys.len() > 60, "expected every wrapped line, got {}", ys.len());
        for y in ys {
            assert!(y >= MARGIN, "text drawn below the margin at y={}", y);
            assert!(y <= PAGE_HEIGHT - MARGIN);
        }
    }

    #[test]
    fn test_embeds_jpeg_but_skips_png() {
        let mut table = build_table(&testdata::students(2));
        table.rows[0].photo = Some(ReportImage {
            data: tiny_jpeg(),
            format: ImageFormat::Jpeg,
        });
        table.rows[1].photo = Some(ReportImage {
            data: crate::media::testdata::PNG.to_vec(),
            format: ImageFormat::Png,
        });

        let pdf = render_pdf(&table);
        let text = String::from_utf8_lossy(&pdf);
        assert_eq!(text.matches("/Subtype /Image").count(), 1);
        assert!(text.contains("/Width 40 /Height 30"));
        assert!(text.contains("/Im0 Do"));
    }
}
