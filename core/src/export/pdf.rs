use crate::error::ExportError;
use crate::format::non_blank_lines;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

// US Letter with one-inch margins, in points.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const FRAME_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

// Average glyph advance as a fraction of the font size. Exact for Courier.
const COURIER_ADVANCE: f32 = 0.6;
const HELVETICA_BOLD_ADVANCE: f32 = 0.6;

const HEADER_FONT: &str = "F1";
const LINE_FONT: &str = "F2";

/// Paragraph styling: font resource, size, leading, space after and RGB fill.
struct Style {
    font: &'static str,
    size: f32,
    leading: f32,
    space_after: f32,
    advance: f32,
    color: [f32; 3],
}

impl Style {
    fn max_chars(&self) -> usize {
        ((FRAME_WIDTH / (self.size * self.advance)).floor() as usize).max(1)
    }
}

const HEADER_STYLE: Style = Style {
    font: HEADER_FONT,
    size: 10.0,
    leading: 12.0,
    space_after: 0.0,
    advance: HELVETICA_BOLD_ADVANCE,
    color: [17.0 / 255.0, 119.0 / 255.0, 67.0 / 255.0],
};

const LINE_STYLE: Style = Style {
    font: LINE_FONT,
    size: 12.0,
    leading: 14.0,
    space_after: 2.0,
    advance: COURIER_ADVANCE,
    color: [120.0 / 255.0, 153.0 / 255.0, 34.0 / 255.0],
};

const SPACER: f32 = 10.0;

/// A single positioned line of text on a page.
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    page: usize,
    y: f32,
    text: String,
    header: bool,
}

/// Flows paragraphs top to bottom, starting a new page when the frame is full.
struct Flow {
    placements: Vec<Placement>,
    page: usize,
    cursor: f32,
}

impl Flow {
    fn new() -> Self {
        Self {
            placements: Vec::new(),
            page: 0,
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn paragraph(&mut self, text: &str, style: &Style, header: bool) {
        for line in wrap(text, style.max_chars()) {
            if self.cursor - style.leading < MARGIN {
                self.page += 1;
                self.cursor = PAGE_HEIGHT - MARGIN;
            }
            self.cursor -= style.leading;
            self.placements.push(Placement {
                page: self.page,
                y: self.cursor + (style.leading - style.size),
                text: line,
                header,
            });
        }
        self.cursor -= style.space_after;
    }

    fn spacer(&mut self, height: f32) {
        self.cursor -= height;
    }

    fn page_count(&self) -> usize {
        self.page + 1
    }
}

fn layout(full_text: &str, post_info: &str) -> Flow {
    let mut flow = Flow::new();
    flow.paragraph(post_info, &HEADER_STYLE, true);
    flow.spacer(SPACER);
    for line in non_blank_lines(full_text) {
        flow.paragraph(line, &LINE_STYLE, false);
    }
    flow
}

/// Render the post as a letter-size PDF using the standard Helvetica-Bold and
/// Courier fonts, so no font data is embedded.
pub fn to_pdf(full_text: &str, post_info: &str) -> Result<Vec<u8>, ExportError> {
    let flow = layout(full_text, post_info);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let header_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let line_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            HEADER_FONT => header_font_id,
            LINE_FONT => line_font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(flow.page_count());
    for page in 0..flow.page_count() {
        let operations = page_operations(
            flow.placements
                .iter()
                .filter(|placement| placement.page == page),
        );
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

fn page_operations<'a>(placements: impl Iterator<Item = &'a Placement>) -> Vec<Operation> {
    let mut operations = Vec::new();
    for placement in placements {
        let style = if placement.header {
            &HEADER_STYLE
        } else {
            &LINE_STYLE
        };
        let [r, g, b] = style.color;
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(style.font.as_bytes().to_vec()), style.size.into()],
        ));
        operations.push(Operation::new("Td", vec![MARGIN.into(), placement.y.into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(&placement.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    operations
}

/// Greedy word wrap to at most `max_chars` characters per line. Words longer
/// than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split(' ') {
        let word_len = word.chars().count();
        let needed = if current_len == 0 { word_len } else { current_len + 1 + word_len };
        if needed <= max_chars {
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
            continue;
        }
        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > max_chars {
            let rest = chars.split_off(max_chars);
            lines.push(chars.into_iter().collect());
            chars = rest;
        }
        current = chars.into_iter().collect();
        current_len = current.chars().count();
    }
    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encode for the standard fonts' WinAnsi encoding. Common typographic
/// punctuation is mapped to ASCII; anything else unrepresentable becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\t' => bytes.push(b' '),
            '\u{20}'..='\u{7e}' => bytes.push(ch as u8),
            '\u{a0}'..='\u{ff}' => bytes.push(ch as u32 as u8),
            '\u{2018}' | '\u{2019}' => bytes.push(b'\''),
            '\u{201c}' | '\u{201d}' => bytes.push(b'"'),
            '\u{2013}' | '\u{2014}' => bytes.push(b'-'),
            '\u{2026}' => bytes.extend_from_slice(b"..."),
            _ => bytes.push(b'?'),
        }
    }
    bytes
}
