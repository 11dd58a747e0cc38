use std::fmt::Write as _;

const TOP_MARGIN: i32 = 750;
const BOTTOM_MARGIN: i32 = 50;
const LINE_HEIGHT: i32 = 14;

/// Renders lines of text onto a single US-letter page in 12pt Helvetica.
///
/// Lines that do not fit above the bottom margin are dropped.
pub fn render_text_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::new();
    let mut y = TOP_MARGIN;
    for line in lines {
        if y < BOTTOM_MARGIN {
            break;
        }
        let _ = writeln!(
            content,
            "BT /F1 12 Tf 50 {y} Td ({}) Tj ET",
            escape_literal(line)
        );
        y -= LINE_HEIGHT;
    }

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let _ = write!(pdf, "{} 0 obj\n{body}\nendobj\n", index + 1);
    }

    let xref_offset = pdf.len();
    let _ = write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(pdf, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );

    pdf.into_bytes()
}

fn escape_literal(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\r' | '\n' => escaped.push(' '),
            other => escaped.push(other),
        }
    }
    escaped
}
