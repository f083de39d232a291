//! Level-1 page formatting and the character-cell renderer.
//!
//! A [`RawPage`] is first formatted into a grid of [`Cell`]s, resolving
//! spacing attributes, then drawn into a [`Canvas`] of palette indices.
//! Transparency is fixed up per cell afterwards and the canvas mapped to
//! packed pixels through [`palette`].

use std::ops::Range;

use crate::decoders::teletext::font;
use crate::decoders::teletext::vbi::{COLUMNS, PageLink, ROWS, RawPage};
use crate::utils::yuv::{push_argb, rgba};

pub const CELL_WIDTH: usize = 12;
pub const CELL_HEIGHT: usize = 10;

/// Page rows plus the navigation bar row.
pub const CANVAS_ROWS: usize = ROWS + 1;
pub const CANVAS_WIDTH: usize = COLUMNS * CELL_WIDTH;
pub const CANVAS_HEIGHT: usize = CANVAS_ROWS * CELL_HEIGHT;

pub const HEAD_HEIGHT: usize = CELL_HEIGHT;
pub const TEXT_HEIGHT: usize = 23 * CELL_HEIGHT;
pub const BAR_HEIGHT: usize = CANVAS_HEIGHT - HEAD_HEIGHT - TEXT_HEIGHT;

pub const NB_COLORS: usize = 40;
pub const TRANSPARENT_BLACK: u8 = 8;

const BLACK: u8 = 0;
const WHITE: u8 = 7;

/// Fastext key colours: red, green, yellow, cyan.
const LINK_COLORS: [u8; 4] = [1, 2, 3, 6];

#[rustfmt::skip]
const COLOR_MAP: [u32; NB_COLORS] = [
    rgba(0x00, 0x00, 0x00, 0xFF), rgba(0xFF, 0x00, 0x00, 0xFF),
    rgba(0x00, 0xFF, 0x00, 0xFF), rgba(0xFF, 0xFF, 0x00, 0xFF),
    rgba(0x00, 0x00, 0xFF, 0xFF), rgba(0xFF, 0x00, 0xFF, 0xFF),
    rgba(0x00, 0xFF, 0xFF, 0xFF), rgba(0xFF, 0xFF, 0xFF, 0xFF),
    rgba(0x00, 0x00, 0x00, 0x00), rgba(0x77, 0x00, 0x00, 0xFF),
    rgba(0x00, 0x77, 0x00, 0xFF), rgba(0x77, 0x77, 0x00, 0xFF),
    rgba(0x00, 0x00, 0x77, 0xFF), rgba(0x77, 0x00, 0x77, 0xFF),
    rgba(0x00, 0x77, 0x77, 0xFF), rgba(0x77, 0x77, 0x77, 0xFF),
    // CLUT 2
    rgba(0xFF, 0x00, 0x55, 0xFF), rgba(0xFF, 0x77, 0x00, 0xFF),
    rgba(0x00, 0xFF, 0x77, 0xFF), rgba(0xFF, 0xFF, 0xBB, 0xFF),
    rgba(0x00, 0xCC, 0xAA, 0xFF), rgba(0x55, 0x00, 0x00, 0xFF),
    rgba(0x66, 0x55, 0x22, 0xFF), rgba(0xCC, 0x77, 0x77, 0xFF),
    // CLUT 3
    rgba(0x33, 0x33, 0x33, 0xFF), rgba(0xFF, 0x77, 0x77, 0xFF),
    rgba(0x77, 0xFF, 0x77, 0xFF), rgba(0xFF, 0xFF, 0x77, 0xFF),
    rgba(0x77, 0x77, 0xFF, 0xFF), rgba(0xFF, 0x77, 0xFF, 0xFF),
    rgba(0x77, 0xFF, 0xFF, 0xFF), rgba(0xDD, 0xDD, 0xDD, 0xFF),
    rgba(0x00, 0x00, 0x00, 0xFF), rgba(0xFF, 0x00, 0x00, 0xFF),
    rgba(0x00, 0xFF, 0x00, 0xFF), rgba(0xFF, 0xFF, 0x00, 0xFF),
    rgba(0x00, 0x00, 0xFF, 0xFF), rgba(0xFF, 0x00, 0xFF, 0xFF),
    rgba(0x00, 0xFF, 0xFF, 0xFF), rgba(0xFF, 0xFF, 0xFF, 0xFF),
];

/// The 40 page colours followed by copies at `opacity`.
pub fn palette(opacity: u8) -> [u32; 2 * NB_COLORS] {
    let mut out = [0u32; 2 * NB_COLORS];
    for (i, &color) in COLOR_MAP.iter().enumerate() {
        out[i] = color;
        out[i + NB_COLORS] = (color & 0x00FF_FFFF) | (opacity as u32) << 24;
    }
    out[TRANSPARENT_BLACK as usize + NB_COLORS] = 0;
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opacity {
    Opaque,
    SemiTransparent,
    TransparentFull,
    TransparentSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSize {
    Normal,
    DoubleUpper,
    DoubleLower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub code: u8,
    pub mosaic: bool,
    pub separated: bool,
    pub foreground: u8,
    pub background: u8,
    pub opacity: Opacity,
    pub size: CellSize,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            code: b' ',
            mosaic: false,
            separated: false,
            foreground: WHITE,
            background: BLACK,
            opacity: Opacity::Opaque,
            size: CellSize::Normal,
        }
    }
}

impl Cell {
    fn is_blank(&self) -> bool {
        self.code == b' '
    }
}

pub type CellRow = [Cell; COLUMNS];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPage {
    pub page: u16,
    pub subpage: u16,
    pub subtitle: bool,
    pub rows: Vec<CellRow>,
}

/// Resolves the spacing attributes of one row. Returns whether any cell
/// is double height.
fn format_row(src: &[u8; COLUMNS], boxed_page: bool, header: bool, out: &mut CellRow) -> bool {
    let mut fg = WHITE;
    let mut bg = BLACK;
    let mut mosaic = false;
    let mut separated = false;
    let mut conceal = false;
    let mut boxed = false;
    let mut double = false;
    let mut hold = false;
    let mut held = (b' ', false);
    let mut any_double = false;

    for (col, &code) in src.iter().enumerate() {
        // set-at attributes
        match code {
            0x0C => {
                double = false;
                held = (b' ', false);
            }
            0x18 => conceal = true,
            0x19 => separated = false,
            0x1A => separated = true,
            0x1C => bg = BLACK,
            0x1D => bg = fg,
            0x1E => hold = true,
            _ => {}
        }

        let (shown, shown_mosaic, shown_separated) = if code < 0x20 {
            if hold && mosaic {
                (held.0, held.0 != b' ', held.1)
            } else {
                (b' ', false, false)
            }
        } else if conceal {
            (b' ', false, false)
        } else if mosaic && font::is_mosaic(code) {
            held = (code, separated);
            (code, true, separated)
        } else {
            (code, false, false)
        };

        let opacity = if !boxed_page {
            Opacity::Opaque
        } else if boxed && !header {
            Opacity::SemiTransparent
        } else {
            Opacity::TransparentSpace
        };

        out[col] = Cell {
            code: shown,
            mosaic: shown_mosaic,
            separated: shown_separated,
            foreground: fg,
            background: bg,
            opacity,
            size: if double {
                CellSize::DoubleUpper
            } else {
                CellSize::Normal
            },
        };
        any_double |= double;

        // set-after attributes
        match code {
            0x00..=0x07 => {
                fg = code;
                mosaic = false;
                conceal = false;
                held = (b' ', false);
            }
            0x0A => boxed = false,
            0x0B => boxed = true,
            0x0D => {
                double = true;
                held = (b' ', false);
            }
            0x10..=0x17 => {
                fg = code - 0x10;
                mosaic = true;
                conceal = false;
            }
            0x1F => hold = false,
            _ => {}
        }
    }
    any_double
}

fn is_valid_link(link: &PageLink) -> bool {
    (0x100..=0x8FF).contains(&link.page) && (link.page & 0xF) <= 9 && ((link.page >> 4) & 0xF) <= 9
}

fn format_links(links: Option<&[PageLink; 6]>, boxed_page: bool, out: &mut CellRow) {
    let opacity = if boxed_page {
        Opacity::TransparentSpace
    } else {
        Opacity::Opaque
    };
    for cell in out.iter_mut() {
        *cell = Cell {
            opacity,
            ..Cell::default()
        };
    }
    let Some(links) = links else {
        return;
    };

    for (i, link) in links.iter().take(LINK_COLORS.len()).enumerate() {
        if !is_valid_link(link) {
            continue;
        }
        let label = format!("{:03X}", link.page);
        for (j, c) in label.bytes().enumerate() {
            let cell = &mut out[i * 10 + 3 + j];
            cell.code = c;
            cell.foreground = LINK_COLORS[i];
        }
    }
}

/// Formats every row of `raw`, followed by the navigation bar.
///
/// Subtitle and newsflash pages are boxed: only boxed cells are drawn, on
/// a semi-transparent background, and the header is suppressed.
pub fn format_page(raw: &RawPage) -> FormattedPage {
    let boxed_page = raw.control.subtitle || raw.control.newsflash;
    let mut rows = vec![[Cell::default(); COLUMNS]; CANVAS_ROWS];

    let mut row = 0;
    while row < ROWS {
        let double = format_row(&raw.rows[row], boxed_page, row == 0, &mut rows[row]);
        if double && row > 0 && row + 1 < ROWS {
            let upper = rows[row];
            rows[row + 1] = upper.map(|cell| match cell.size {
                CellSize::DoubleUpper => Cell {
                    size: CellSize::DoubleLower,
                    ..cell
                },
                _ => Cell {
                    code: b' ',
                    mosaic: false,
                    ..cell
                },
            });
            row += 2;
        } else {
            row += 1;
        }
    }

    if !boxed_page {
        let label = format!("P{:03X}", raw.page);
        for (cell, c) in rows[0][1..].iter_mut().zip(label.bytes()) {
            cell.code = c;
        }
    }
    format_links(raw.links.as_ref(), boxed_page, &mut rows[ROWS]);

    FormattedPage {
        page: raw.page,
        subpage: raw.subpage,
        subtitle: raw.control.subtitle,
        rows,
    }
}

impl FormattedPage {
    pub fn row_is_blank(&self, row: usize) -> bool {
        self.rows[row].iter().all(Cell::is_blank)
    }

    /// First and last non-blank text rows.
    pub fn content_rows(&self) -> Option<(usize, usize)> {
        let mut rows = (1..ROWS).filter(|&r| !self.row_is_blank(r));
        let first = rows.next()?;
        let last = rows.last().unwrap_or(first);
        Some((first, last))
    }

    /// Plain text of `rows`, blank rows dropped and each line trimmed.
    pub fn text(&self, rows: Range<usize>) -> String {
        let mut lines = Vec::new();
        for row in rows {
            let line: String = self.rows[row]
                .iter()
                .map(|cell| {
                    if cell.mosaic || cell.size == CellSize::DoubleLower {
                        ' '
                    } else {
                        font::to_unicode(cell.code)
                    }
                })
                .collect();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_owned());
            }
        }
        lines.join("\n")
    }
}

/// Palette indices, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pub indices: Vec<u8>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Self {
            width,
            height,
            indices: vec![fill; width * height],
        }
    }

    /// Copies `lines` pixel lines of `src` starting at `src_y` to `dst_y`.
    pub fn copy_lines(&mut self, src: &Canvas, src_y: usize, dst_y: usize, lines: usize) {
        let w = self.width.min(src.width);
        for i in 0..lines {
            let (sy, dy) = (src_y + i, dst_y + i);
            if sy >= src.height || dy >= self.height {
                break;
            }
            self.indices[dy * self.width..dy * self.width + w]
                .copy_from_slice(&src.indices[sy * src.width..sy * src.width + w]);
        }
    }

    /// Stretches `lines` pixel lines from `first` to twice their height.
    pub fn zoom(&self, first: usize, lines: usize) -> Canvas {
        let mut out = Canvas::new(self.width, lines * 2, TRANSPARENT_BLACK);
        for y in 0..lines * 2 {
            out.copy_lines(self, first + y / 2, y, 1);
        }
        out
    }

    pub fn to_pixels(&self, palette: &[u32; 2 * NB_COLORS]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.indices.len() * 4);
        for &index in &self.indices {
            push_argb(&mut out, palette[index as usize % palette.len()]);
        }
        out
    }
}

fn cell_pixel(cell: &Cell, px: usize, py: usize) -> bool {
    let y = match cell.size {
        CellSize::Normal => py,
        CellSize::DoubleUpper => py / 2,
        CellSize::DoubleLower => (py + CELL_HEIGHT) / 2,
    };

    if cell.mosaic {
        if cell.separated && (px % 6 == 5 || matches!(y, 2 | 6 | 9)) {
            return false;
        }
        let row = match y {
            0..=2 => 0,
            3..=6 => 1,
            _ => 2,
        };
        return font::sextant(cell.code, px / 6, row);
    }

    (1..=10).contains(&px) && y >= 1 && font::glyph_pixel(cell.code, (px - 1) / 2, y - 1)
}

/// Draws `rows` of `page` into a new canvas, one cell per 12x10 block.
pub fn draw_rows(page: &FormattedPage, rows: Range<usize>) -> Canvas {
    let mut canvas = Canvas::new(CANVAS_WIDTH, rows.len() * CELL_HEIGHT, BLACK);
    for (line, row) in rows.enumerate() {
        for (col, cell) in page.rows[row].iter().enumerate() {
            for py in 0..CELL_HEIGHT {
                let y = line * CELL_HEIGHT + py;
                let base = y * canvas.width + col * CELL_WIDTH;
                for px in 0..CELL_WIDTH {
                    canvas.indices[base + px] = if cell_pixel(cell, px, py) {
                        cell.foreground
                    } else {
                        cell.background
                    };
                }
            }
        }
    }
    canvas
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transparency {
    /// Opacity of semi-transparent cells; 0 clears them, 255 keeps them.
    pub opacity: u8,
    /// Treat opaque cells as semi-transparent (mixed video).
    pub transparent_background: bool,
}

/// Rewrites cell backgrounds of a canvas drawn from `first_row` according
/// to each cell's opacity.
pub fn fix_transparency(canvas: &mut Canvas, page: &FormattedPage, first_row: usize, mode: Transparency) {
    for y in 0..canvas.height {
        let row = first_row + y / CELL_HEIGHT;
        let Some(cells) = page.rows.get(row) else {
            break;
        };
        let line = &mut canvas.indices[y * canvas.width..(y + 1) * canvas.width];

        for (cell, pixels) in cells.iter().zip(line.chunks_mut(CELL_WIDTH)) {
            let opacity = match cell.opacity {
                Opacity::Opaque if mode.transparent_background => Opacity::SemiTransparent,
                other => other,
            };
            let clear = match opacity {
                Opacity::Opaque => continue,
                Opacity::TransparentSpace => {
                    pixels.fill(TRANSPARENT_BLACK);
                    continue;
                }
                Opacity::SemiTransparent if mode.opacity == 255 => continue,
                Opacity::SemiTransparent if mode.opacity > 0 => false,
                Opacity::SemiTransparent | Opacity::TransparentFull => true,
            };

            // graphics pages keep the navigation bar background
            if clear && !page.subtitle && y + first_row * CELL_HEIGHT >= HEAD_HEIGHT + TEXT_HEIGHT {
                continue;
            }
            for pixel in pixels.iter_mut().filter(|p| **p == cell.background) {
                *pixel = if clear {
                    TRANSPARENT_BLACK
                } else {
                    cell.background + NB_COLORS as u8
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::teletext::vbi::PageControl;

    fn page(subtitle: bool, rows: &[(usize, &[u8])]) -> RawPage {
        let control = PageControl {
            subtitle,
            ..Default::default()
        };
        let mut raw = RawPage::new(0x888, 0, control);
        for (row, text) in rows {
            raw.rows[*row][..text.len()].copy_from_slice(text);
        }
        raw
    }

    #[test]
    fn spacing_attributes() {
        // red text, then a new cyan background from the second control on
        let raw = page(false, &[(1, b"\x01A\x06\x1dB")]);
        let formatted = format_page(&raw);
        let row = &formatted.rows[1];
        assert_eq!(row[0].code, b' ');
        assert_eq!(row[0].foreground, WHITE);
        assert_eq!((row[1].code, row[1].foreground), (b'A', 1));
        assert_eq!(row[3].background, 6);
        assert_eq!((row[4].code, row[4].foreground, row[4].background), (b'B', 6, 6));
        assert_eq!(&formatted.text(1..2), "A  B");
    }

    #[test]
    fn double_height_covers_next_row() {
        let raw = page(false, &[(3, b"\x0dHi"), (4, b"hidden")]);
        let formatted = format_page(&raw);
        assert_eq!(formatted.rows[3][1].size, CellSize::DoubleUpper);
        assert_eq!(formatted.rows[4][1].size, CellSize::DoubleLower);
        assert_eq!(formatted.rows[4][1].code, b'H');
        assert_eq!(formatted.text(0..ROWS).lines().last(), Some("Hi"));
    }

    #[test]
    fn mosaics_and_hold() {
        let raw = page(false, &[(2, b"\x17\x7f\x1e\x1a")]);
        let formatted = format_page(&raw);
        let row = &formatted.rows[2];
        assert!(row[1].mosaic);
        // held mosaic repeats over the hold control
        assert!(row[2].mosaic);
        assert_eq!(row[2].code, 0x7F);

        let canvas = draw_rows(&formatted, 2..3);
        assert_eq!(canvas.indices[CELL_WIDTH], WHITE);
    }

    #[test]
    fn boxed_subtitle_transparency() {
        let raw = page(true, &[(20, b"\x0b\x0bHello\x0a\x0a")]);
        let formatted = format_page(&raw);
        assert_eq!(formatted.content_rows(), Some((20, 20)));
        assert_eq!(formatted.rows[20][0].opacity, Opacity::TransparentSpace);
        assert_eq!(formatted.rows[20][2].opacity, Opacity::SemiTransparent);
        assert_eq!(formatted.rows[0][10].opacity, Opacity::TransparentSpace);

        let mut canvas = draw_rows(&formatted, 20..21);
        // top of the first 'H' stroke
        let stroke = CANVAS_WIDTH + CELL_WIDTH * 2 + 1;
        assert_eq!(canvas.indices[stroke], WHITE);

        fix_transparency(
            &mut canvas,
            &formatted,
            20,
            Transparency {
                opacity: 0x80,
                transparent_background: false,
            },
        );
        assert_eq!(canvas.indices[0], TRANSPARENT_BLACK);
        assert_eq!(canvas.indices[CELL_WIDTH * 2], BLACK + NB_COLORS as u8);
        assert_eq!(canvas.indices[stroke], WHITE);

        let pixels = canvas.to_pixels(&palette(0x80));
        assert_eq!(pixels[..4], [0, 0, 0, 0]);
        let semi = CELL_WIDTH * 2 * 4;
        assert_eq!(pixels[semi..semi + 4], [0, 0, 0, 0x80]);
    }

    #[test]
    fn zoom_doubles_lines() {
        let mut canvas = Canvas::new(2, 2, 0);
        canvas.indices = vec![1, 1, 2, 2];
        let zoomed = canvas.zoom(1, 1);
        assert_eq!(zoomed.height, 2);
        assert_eq!(zoomed.indices, vec![2, 2, 2, 2]);
    }

    #[test]
    fn navigation_bar_links() {
        let mut raw = page(false, &[]);
        let mut links = [PageLink::default(); 6];
        links[1].page = 0x123;
        raw.links = Some(links);
        let formatted = format_page(&raw);
        assert_eq!(formatted.text(ROWS..CANVAS_ROWS), "123");
        assert_eq!(formatted.rows[ROWS][13].foreground, 2);
        assert_eq!(formatted.text(0..1), "P888");
    }
}
