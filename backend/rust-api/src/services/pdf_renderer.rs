use printpdf::{
    BuiltinFont, Color, Greyscale, Line, LinePoint, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions,
    Point, Pt, TextItem,
};

use crate::models::paper::{ExamType, Paper, PaperSection};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const TOP: f32 = 282.0;
const BOTTOM: f32 = 18.0;

const PT_TO_MM: f32 = 0.3528;
// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_RATIO: f32 = 0.5;

const TABLE_COLUMNS: [f32; 6] = [16.0, 104.0, 15.0, 15.0, 18.0, 12.0];
const TABLE_HEADERS: [&str; 6] = ["Sr No.", "Questions", "CO", "RBT", "PI", "Marks"];
const TABLE_FONT: f32 = 9.0;
const TABLE_LINE: f32 = 4.2;
const CELL_PAD: f32 = 2.2;

const ISE_INSTRUCTIONS: [&str; 5] = [
    "All questions are compulsory.",
    "Assume suitable data wherever necessary and state the assumptions made.",
    "Diagrams / Sketches should be given wherever necessary.",
    "Use of logarithmic table, drawing instruments and non-programmable calculators is permitted.",
    "Figures to the right indicate full marks.",
];
const ESE_INSTRUCTIONS: [&str; 3] = [
    "All sections are compulsory.",
    "Figures to the right indicate full marks.",
    "Assume suitable data wherever necessary and state the assumptions clearly.",
];

pub fn pdf_filename(paper: &Paper) -> String {
    format!(
        "paper_{}_{}_{}.pdf",
        paper.id,
        paper.difficulty.as_str(),
        paper.exam_type.as_str()
    )
}

pub fn exam_title(exam_type: ExamType) -> &'static str {
    match exam_type {
        ExamType::InSemester => "IN SEMESTER EXAMINATION",
        ExamType::EndSemester => "END SEMESTER EXAMINATION",
    }
}

/// Renders a printable question paper on A4 pages.
pub fn render_paper_pdf(paper: &Paper, institution: &str) -> Vec<u8> {
    let mut writer = PageWriter::new();

    writer.centered(BuiltinFont::HelveticaBold, 14.0, institution);
    writer.advance(8.0);
    writer.centered(BuiltinFont::HelveticaBold, 13.0, exam_title(paper.exam_type));
    writer.advance(10.0);

    match paper.exam_type {
        ExamType::InSemester => write_ise_details(&mut writer, paper),
        ExamType::EndSemester => write_ese_details(&mut writer, paper),
    }

    let instructions: &[&str] = match paper.exam_type {
        ExamType::InSemester => &ISE_INSTRUCTIONS,
        ExamType::EndSemester => &ESE_INSTRUCTIONS,
    };
    write_instructions(&mut writer, instructions);

    let mut serial = 1;
    for section in paper.sections() {
        write_section(&mut writer, &section, &mut serial);
    }

    let pages = writer.finish();
    let mut document = PdfDocument::new(&paper.title);
    let mut warnings = Vec::new();
    document
        .with_pages(pages)
        .save(&PdfSaveOptions::default(), &mut warnings)
}

fn write_ise_details(writer: &mut PageWriter, paper: &Paper) {
    let right = MARGIN + 110.0;
    let rows = [
        ("YEAR: _____________".to_string(), "Date: _____________".to_string()),
        (
            format!("Subject: {}", paper.subject),
            "Timing: _____________".to_string(),
        ),
        (
            "Branch: _____________".to_string(),
            format!("Maximum Marks: {}", paper.total_marks),
        ),
        ("Div: _____________".to_string(), String::new()),
        ("Duration: _____________".to_string(), String::new()),
    ];
    for (left_text, right_text) in rows {
        writer.text(MARGIN, BuiltinFont::Helvetica, 11.0, left_text);
        if !right_text.is_empty() {
            writer.text(right, BuiltinFont::Helvetica, 11.0, right_text);
        }
        writer.advance(6.5);
    }
    writer.advance(4.0);
}

fn write_ese_details(writer: &mut PageWriter, paper: &Paper) {
    let width = PAGE_WIDTH - 2.0 * MARGIN;
    let columns = [width * 0.5, width * 0.25, width * 0.25];
    let row_height = 9.0;
    let top = writer.y;

    writer.border();
    draw_table_grid(&mut writer.ops, MARGIN, top, row_height, &columns, 3);

    let cells = [
        ["YEAR: _______".to_string(), String::new(), "Q.P. Code:".to_string()],
        [
            "Branch: _______".to_string(),
            "Duration:".to_string(),
            "Date:".to_string(),
        ],
        [
            format!("Subject: {}", shorten(&paper.subject, 40)),
            "Subject Code: _______".to_string(),
            format!("Max. Marks: {}", paper.total_marks),
        ],
    ];
    for (row_idx, row) in cells.into_iter().enumerate() {
        let baseline = top - row_height * row_idx as f32 - 6.0;
        let mut x = MARGIN;
        for (col_idx, cell) in row.into_iter().enumerate() {
            if !cell.is_empty() {
                writer.text_at(x + 2.0, baseline, BuiltinFont::HelveticaBold, 10.0, cell);
            }
            x += columns[col_idx];
        }
    }
    writer.y = top - row_height * 3.0 - 8.0;
}

fn write_instructions(writer: &mut PageWriter, instructions: &[&str]) {
    writer.text(MARGIN, BuiltinFont::HelveticaBold, 12.0, "Instructions:".into());
    writer.advance(6.0);
    let max_chars = chars_for_width(PAGE_WIDTH - 2.0 * MARGIN - 8.0, 10.0);
    for (idx, instruction) in instructions.iter().enumerate() {
        let numbered = format!("{}. {}", idx + 1, instruction);
        for line in wrap_text(&numbered, max_chars) {
            writer.ensure_space(5.0);
            writer.text(MARGIN + 6.0, BuiltinFont::Helvetica, 10.0, line);
            writer.advance(5.0);
        }
    }
    writer.advance(5.0);
}

fn write_section(writer: &mut PageWriter, section: &PaperSection, serial: &mut usize) {
    // Keep the section heading together with its header row and first question.
    writer.ensure_space(40.0);
    writer.text(
        MARGIN,
        BuiltinFont::HelveticaBold,
        12.0,
        format!("{} ({} marks each)", section.label, section.marks),
    );
    writer.advance(4.0);
    write_header_row(writer);

    let text_chars = chars_for_width(TABLE_COLUMNS[1] - 2.0 * CELL_PAD, TABLE_FONT);
    for question in &section.questions {
        let lines = wrap_text(&question.question_text, text_chars);
        let height = row_height(lines.len());
        if writer.ensure_space(height) {
            write_header_row(writer);
        }

        let cells: [Vec<String>; 6] = [
            vec![serial.to_string()],
            lines,
            vec![question.co.clone()],
            vec![question.rbt.map(|l| l.as_str().to_string()).unwrap_or_default()],
            vec![question.pi.clone()],
            vec![question.marks.to_string()],
        ];
        write_row(writer, &cells, height, BuiltinFont::Helvetica);
        *serial += 1;
    }
    writer.advance(6.0);
}

fn write_header_row(writer: &mut PageWriter) {
    let cells = TABLE_HEADERS.map(|h| vec![h.to_string()]);
    write_row(writer, &cells, row_height(1), BuiltinFont::HelveticaBold);
}

fn row_height(line_count: usize) -> f32 {
    line_count.max(1) as f32 * TABLE_LINE + 2.0 * CELL_PAD
}

fn write_row(writer: &mut PageWriter, cells: &[Vec<String>; 6], height: f32, font: BuiltinFont) {
    let top = writer.y;
    writer.border();
    draw_table_grid(&mut writer.ops, MARGIN, top, height, &TABLE_COLUMNS, 1);

    let mut x = MARGIN;
    for (idx, lines) in cells.iter().enumerate() {
        let mut baseline = top - CELL_PAD - TABLE_FONT * PT_TO_MM;
        for line in lines {
            writer.text_at(x + CELL_PAD, baseline, font, TABLE_FONT, line.clone());
            baseline -= TABLE_LINE;
        }
        x += TABLE_COLUMNS[idx];
    }
    writer.y = top - height;
}

/// Ops for the page being filled plus every finished page.
struct PageWriter {
    pages: Vec<PdfPage>,
    ops: Vec<Op>,
    y: f32,
    text_color: Color,
    border_color: Color,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: TOP,
            text_color: Color::Greyscale(Greyscale::new(0.08, None)),
            border_color: Color::Greyscale(Greyscale::new(0.35, None)),
        }
    }

    fn advance(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Starts a new page when `height` no longer fits. Returns true if it did.
    fn ensure_space(&mut self, height: f32) -> bool {
        if self.y - height >= BOTTOM {
            return false;
        }
        self.new_page();
        true
    }

    fn new_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages
            .push(PdfPage::new(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), ops));
        self.y = TOP;
    }

    fn border(&mut self) {
        self.ops.push(Op::SetOutlineColor {
            col: self.border_color.clone(),
        });
        self.ops.push(Op::SetOutlineThickness { pt: Pt(0.6) });
    }

    fn text(&mut self, x: f32, font: BuiltinFont, size: f32, text: String) {
        let y = self.y;
        self.text_at(x, y, font, size, text);
    }

    fn centered(&mut self, font: BuiltinFont, size: f32, text: &str) {
        let width = text.chars().count() as f32 * size * GLYPH_RATIO * PT_TO_MM;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        self.text(x, font, size, text.to_string());
    }

    fn text_at(&mut self, x: f32, y: f32, font: BuiltinFont, size: f32, text: String) {
        push_pdf_text(
            &mut self.ops,
            Point::new(Mm(x), Mm(y)),
            font,
            size,
            size + 2.0,
            text,
            &self.text_color,
        );
    }

    fn finish(mut self) -> Vec<PdfPage> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

fn chars_for_width(width_mm: f32, font_size: f32) -> usize {
    ((width_mm / (font_size * GLYPH_RATIO * PT_TO_MM)) as usize).max(1)
}

/// Greedy word wrap; words longer than a line are split.
pub(crate) fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }

        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn shorten(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    let mut collected: String = label.chars().take(max_chars.saturating_sub(3)).collect();
    collected.push_str("...");
    collected
}

fn push_pdf_text(
    ops: &mut Vec<Op>,
    pos: Point,
    font: BuiltinFont,
    font_size: f32,
    line_height: f32,
    text: String,
    color: &Color,
) {
    ops.extend([
        Op::StartTextSection,
        Op::SetTextCursor { pos },
        Op::SetFontSizeBuiltinFont {
            size: Pt(font_size),
            font,
        },
        Op::SetLineHeight {
            lh: Pt(line_height),
        },
        Op::SetFillColor { col: color.clone() },
        Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text)],
            font,
        },
        Op::EndTextSection,
    ]);
}

fn push_pdf_line(ops: &mut Vec<Op>, from: (f32, f32), to: (f32, f32)) {
    ops.push(Op::DrawLine {
        line: Line {
            points: vec![
                LinePoint {
                    p: Point::new(Mm(from.0), Mm(from.1)),
                    bezier: false,
                },
                LinePoint {
                    p: Point::new(Mm(to.0), Mm(to.1)),
                    bezier: false,
                },
            ],
            is_closed: false,
        },
    });
}

fn draw_table_grid(
    ops: &mut Vec<Op>,
    left: f32,
    top: f32,
    row_height: f32,
    columns: &[f32],
    row_count: usize,
) {
    if row_count == 0 {
        return;
    }
    let total_width: f32 = columns.iter().copied().sum();
    let table_height = row_height * row_count as f32;
    for idx in 0..=row_count {
        let y = top - row_height * idx as f32;
        push_pdf_line(ops, (left, y), (left + total_width, y));
    }
    let mut x = left;
    for width in columns {
        push_pdf_line(ops, (x, top), (x, top - table_height));
        x += *width;
    }
    push_pdf_line(ops, (x, top), (x, top - table_height));
}
