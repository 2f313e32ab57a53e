use super::fonts::ExportFonts;
use crate::error::ExportError;
use crate::format::non_blank_lines;
use ab_glyph::PxScale;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::io::Cursor;

const WIDTH: u32 = 600;
const MIN_HEIGHT: u32 = 500;
const BASE_HEIGHT: u32 = 100;
const LINE_STEP: u32 = 20;
const MARGIN_X: i32 = 10;
const HEADER_Y: i32 = 10;
const FIRST_LINE_Y: i32 = 40;
const HEADER_SIZE: f32 = 12.0;
const LINE_SIZE: f32 = 14.0;

const BACKGROUND: Rgb<u8> = Rgb([240, 224, 214]); // #f0e0d6
const HEADER_COLOR: Rgb<u8> = Rgb([17, 119, 67]); // #117743
const LINE_COLOR: Rgb<u8> = Rgb([120, 153, 34]); // #789922

/// Canvas height for a post with `lines` non-blank lines.
pub fn canvas_height(lines: usize) -> u32 {
    let lines = u32::try_from(lines).unwrap_or(u32::MAX);
    BASE_HEIGHT
        .saturating_add(LINE_STEP.saturating_mul(lines))
        .max(MIN_HEIGHT)
}

/// Render the post onto a beige card and encode it as PNG.
pub fn to_png(
    full_text: &str,
    post_info: &str,
    fonts: &ExportFonts,
) -> Result<Vec<u8>, ExportError> {
    let lines: Vec<&str> = non_blank_lines(full_text).collect();
    let mut canvas = RgbImage::from_pixel(WIDTH, canvas_height(lines.len()), BACKGROUND);

    draw_text_mut(
        &mut canvas,
        HEADER_COLOR,
        MARGIN_X,
        HEADER_Y,
        PxScale::from(HEADER_SIZE),
        &fonts.header,
        post_info,
    );

    let mut y = FIRST_LINE_Y;
    for line in lines {
        draw_text_mut(
            &mut canvas,
            LINE_COLOR,
            MARGIN_X,
            y,
            PxScale::from(LINE_SIZE),
            &fonts.mono,
            line,
        );
        y += LINE_STEP as i32;
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(canvas).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
