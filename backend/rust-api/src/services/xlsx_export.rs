use anyhow::Result;
use rust_xlsxwriter::{Format, Workbook};

use super::pdf_renderer::exam_title;
use crate::models::paper::Paper;

const QUESTION_HEADERS: [&str; 9] = [
    "Section", "Sr No.", "Question", "Module", "CO", "RBT", "PI", "Type", "Marks",
];

pub fn xlsx_filename(paper: &Paper) -> String {
    format!(
        "paper_{}_{}_{}.xlsx",
        paper.id,
        paper.difficulty.as_str(),
        paper.exam_type.as_str()
    )
}

/// Summary block followed by one row per question in rendering order.
pub fn render_paper_xlsx(paper: &Paper) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_column_width(0, 14.0)?;
    worksheet.set_column_width(1, 8.0)?;
    worksheet.set_column_width(2, 80.0)?;
    for col in 3..=8 {
        worksheet.set_column_width(col, 10.0)?;
    }

    let header_format = Format::new().set_bold();

    let mut row = 0;
    worksheet.write_string_with_format(row, 0, "Title", &header_format)?;
    worksheet.write_string(row, 2, &paper.title)?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Exam", &header_format)?;
    worksheet.write_string(row, 2, exam_title(paper.exam_type))?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Subject", &header_format)?;
    worksheet.write_string(row, 2, &paper.subject)?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Difficulty", &header_format)?;
    worksheet.write_string(row, 2, &paper.generation_metadata.difficulty_level)?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Exam type", &header_format)?;
    worksheet.write_string(row, 2, paper.exam_type.as_str())?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Total marks", &header_format)?;
    worksheet.write_number(row, 2, paper.total_marks as f64)?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "Questions", &header_format)?;
    worksheet.write_number(row, 2, paper.total_questions as f64)?;
    row += 1;
    worksheet.write_string_with_format(row, 0, "RBT match %", &header_format)?;
    worksheet.write_number(row, 2, paper.generation_metadata.rbt_match_percentage)?;
    row += 2;

    for (col, header) in QUESTION_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(row, col as u16, *header, &header_format)?;
    }
    row += 1;

    let mut serial = 1;
    for section in paper.sections() {
        for question in &section.questions {
            worksheet.write_string(row, 0, &section.label)?;
            worksheet.write_number(row, 1, serial as f64)?;
            worksheet.write_string(row, 2, &question.question_text)?;
            worksheet.write_number(row, 3, question.module as f64)?;
            worksheet.write_string(row, 4, &question.co)?;
            worksheet.write_string(row, 5, question.rbt.map(|l| l.as_str()).unwrap_or(""))?;
            worksheet.write_string(row, 6, &question.pi)?;
            worksheet.write_string(row, 7, &question.question_type)?;
            worksheet.write_number(row, 8, question.marks as f64)?;
            row += 1;
            serial += 1;
        }
    }

    let mut cursor = std::io::Cursor::new(Vec::new());
    workbook.save_to_writer(&mut cursor)?;
    Ok(cursor.into_inner())
}
