use super::tables::{CHAR_END_BOX, CHAR_START_BOX, ENTITIES, LAT_RUS, TTXT_COLOURS};
use crate::utils::levenshtein;

/// Rows of a Teletext page, header row included.
pub const PAGE_ROWS: usize = 25;
/// Columns of a Teletext page.
pub const PAGE_COLS: usize = 40;

/// Serial vs parallel page transmission (ETS 300 706 chapter 9.3.1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    /// Page terminated by the next header with any magazine
    #[default]
    Serial,
    /// Page terminated by the next header with the same magazine
    Parallel,
}

/// The in-flight page: a 25x40 grid of UCS-2 code units plus a parallel
/// flag grid marking characters that came from the G2 supplementary set
/// (those must not be mapped through G0 again at commit time).
#[derive(Debug, Clone)]
pub struct TeletextPage {
    /// When the page started being shown, FTS ms
    pub show_ms: i64,
    /// When the page was replaced, FTS ms
    pub hide_ms: i64,
    /// Character grid; 0 means "empty slot"
    pub text: [[u16; PAGE_COLS]; PAGE_ROWS],
    /// Set where `text` already holds a final UCS-2 value from G2/X26
    pub g2_present: [[bool; PAGE_COLS]; PAGE_ROWS],
    /// Whether any display row received data
    pub tainted: bool,
}

impl Default for TeletextPage {
    fn default() -> Self {
        Self {
            show_ms: 0,
            hide_ms: 0,
            text: [[0; PAGE_COLS]; PAGE_ROWS],
            g2_present: [[false; PAGE_COLS]; PAGE_ROWS],
            tainted: false,
        }
    }
}

impl TeletextPage {
    /// Clears the grid for a new page, keeping no character or flag state.
    pub fn clear(&mut self, show_ms: i64) {
        self.text = [[0; PAGE_COLS]; PAGE_ROWS];
        self.g2_present = [[false; PAGE_COLS]; PAGE_ROWS];
        self.tainted = false;
        self.show_ms = show_ms;
        self.hide_ms = 0;
    }
}

/// Rendering options derived from the pipeline configuration.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Emit `<font color="#RRGGBB">` tags for non-white text
    pub colour: bool,
    /// Escape `< > &` as HTML entities (only meaningful with colour)
    pub escape_entities: bool,
    /// Transliterate Latin letters to Cyrillic
    pub latin_russian: bool,
    /// Separator between rendered lines
    pub line_separator: &'static str,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            colour: true,
            escape_entities: true,
            latin_russian: false,
            line_separator: "\r\n",
        }
    }
}

fn push_ucs2_as_utf8(out: &mut String, v: u16) {
    if let Some(c) = char::from_u32(v as u32) {
        out.push(c);
    }
}

/// Renders a committed page to UTF-8 plus the parallel UCS-2 form used for
/// typo comparison. Returns None when no row carries a start-box marker
/// (nothing visible on the page).
///
/// Spacing attributes are rewritten to spaces per ETS 300 706 chapter
/// 12.2; a row's colour is taken from the last colour attribute before the
/// start box, white being the start-of-row default.
pub fn render_page(page: &TeletextPage, opts: &RenderOptions) -> Option<(String, Vec<u16>)> {
    // column-by-column scan finds a boxed area faster than row-by-row
    let mut page_is_empty = true;
    'scan: for col in 0..PAGE_COLS {
        for row in 1..PAGE_ROWS {
            if page.text[row][col] == CHAR_START_BOX {
                page_is_empty = false;
                break 'scan;
            }
        }
    }
    if page_is_empty {
        return None;
    }

    let mut text = String::new();
    let mut ucs2: Vec<u16> = Vec::new();
    let mut line_count = 0u32;

    for row in 1..PAGE_ROWS {
        let mut cells = page.text[row];

        let mut col_start = PAGE_COLS;
        let mut col_stop = PAGE_COLS;
        let mut box_open = false;

        for col in 0..PAGE_COLS {
            match cells[col] {
                CHAR_START_BOX => {
                    if col_start == PAGE_COLS {
                        col_start = col;
                        line_count += 1;
                    } else {
                        cells[col] = 0x20;
                    }
                    box_open = true;
                }
                CHAR_END_BOX => {
                    cells[col] = 0x20;
                    box_open = false;
                }
                v if !box_open && col_start < PAGE_COLS && v > 0x20 => {
                    // characters outside the box are not displayed
                    cells[col] = 0x20;
                }
                _ => {}
            }
        }
        if col_start > PAGE_COLS - 1 {
            continue; // line has no box at all
        }

        for col in col_start + 1..PAGE_COLS {
            if cells[col] > 0x20 {
                if col_stop > PAGE_COLS - 1 {
                    col_start = col;
                }
                col_stop = col;
            }
        }
        if col_stop > PAGE_COLS - 1 {
            continue; // box is empty
        }

        // ETS 300 706 chapter 12.2: white is the start-of-row default;
        // colour changes before the start box apply to the whole line
        let mut foreground: u16 = 0x7;
        let mut font_tag_open = false;

        if line_count > 1 {
            text.push_str(opts.line_separator);
        }

        for col in 0..=col_stop {
            let mut v = cells[col];

            if col < col_start && v <= 0x7 {
                foreground = v;
            }

            if col == col_start && foreground != 0x7 && opts.colour {
                text.push_str(&format!("<font color=\"{}\">", TTXT_COLOURS[foreground as usize]));
                font_tag_open = true;
            }

            if col < col_start {
                continue;
            }

            if v <= 0x7 {
                // spacing attribute: displayed as a space
                if opts.colour {
                    if font_tag_open {
                        text.push_str("</font>");
                        font_tag_open = false;
                    }
                    text.push(' ');
                    ucs2.push(b' ' as u16);
                    // black is rendered as white; only 1..6 reopen a tag
                    if v > 0x0 && v < 0x7 {
                        text.push_str(&format!("<font color=\"{}\">", TTXT_COLOURS[v as usize]));
                        font_tag_open = true;
                    }
                    continue;
                }
                v = 0x20;
            }

            if v >= 0x20 {
                ucs2.push(v);

                if !font_tag_open && opts.latin_russian {
                    if let Some(&(_, rus)) = LAT_RUS.iter().find(|&&(lat, _)| lat == v) {
                        text.push_str(rus);
                        continue;
                    }
                }

                if opts.colour && opts.escape_entities {
                    if let Some(&(_, entity)) = ENTITIES.iter().find(|&&(ch, _)| ch == v) {
                        text.push_str(entity);
                        continue;
                    }
                }

                push_ucs2_as_utf8(&mut text, v);
            }
        }

        if opts.colour && font_tag_open {
            text.push_str("</font>");
        }
    }

    if ucs2.is_empty() {
        return None;
    }
    Some((text, ucs2))
}

/// Capitalizes sentence starts and lowercases everything else, leaving
/// markup tags alone, then restores the listed proper nouns. Applying the
/// pass twice yields the same result as applying it once.
pub fn sentence_case(text: &str, cap_words: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut new_sentence = true;
    let mut in_tag = false;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if in_tag {
            out.push(c);
            if c == '>' {
                in_tag = false;
            }
            continue;
        }
        if c == '<' {
            in_tag = true;
            out.push(c);
            continue;
        }
        match c {
            ' ' | '-' => out.push(c),
            '.' | '?' | '!' | ':' => {
                new_sentence = true;
                out.push(c);
            }
            _ => {
                let at_line_start = prev.map_or(true, |p| p == '\n');
                if c.is_alphabetic() && !at_line_start {
                    if new_sentence {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                } else {
                    out.push(c);
                }
                new_sentence = false;
            }
        }
        prev = Some(c);
    }

    restore_cap_words(&out, cap_words)
}

fn restore_cap_words(text: &str, cap_words: &[String]) -> String {
    let mut result = text.to_string();
    for word in cap_words {
        if word.is_empty() || !word.is_ascii() {
            continue;
        }
        let lower = word.to_lowercase();
        let mut rebuilt = String::with_capacity(result.len());
        let mut rest = result.as_str();
        loop {
            let hay = rest.to_lowercase();
            if hay.len() != rest.len() {
                // lowercasing changed byte lengths; offsets no longer map
                rebuilt.push_str(rest);
                break;
            }
            match hay.find(&lower) {
                Some(idx) if is_word_boundary(rest, idx, word.len()) => {
                    rebuilt.push_str(&rest[..idx]);
                    rebuilt.push_str(word);
                    rest = &rest[idx + word.len()..];
                }
                Some(idx) => {
                    let end = idx + word.len();
                    rebuilt.push_str(&rest[..end]);
                    rest = &rest[end..];
                }
                None => {
                    rebuilt.push_str(rest);
                    break;
                }
            }
        }
        result = rebuilt;
    }
    result
}

fn is_word_boundary(text: &str, start: usize, len: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
    let after_ok = text[start + len..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    before_ok && after_ok
}

/// One committed page rendering with its timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPage {
    /// Rendered UTF-8, markup included
    pub text: String,
    /// Plain UCS-2 comparison form
    pub ucs2: Vec<u16>,
    /// Show time, FTS ms
    pub show_ms: i64,
    /// Hide time, FTS ms
    pub hide_ms: i64,
}

/// The two-buffer commit cell: holds the previous page rendering and
/// decides, per new commit, between "typo-corrected continuation of the
/// same subtitle" and "new subtitle, flush the old one".
#[derive(Debug)]
pub struct CommitCell {
    prev: Option<CommittedPage>,
    typo_merge: bool,
    lev_min_count: usize,
    lev_max_pct: usize,
}

impl CommitCell {
    /// Creates a cell with the given typo-merge thresholds.
    pub fn new(typo_merge: bool, lev_min_count: usize, lev_max_pct: usize) -> Self {
        Self {
            prev: None,
            typo_merge,
            lev_min_count,
            lev_max_pct,
        }
    }

    /// Whether the new rendering is close enough to the held one to count
    /// as a correction. Only the first `prev.len()` code units of the new
    /// rendering take part in the comparison.
    fn is_same_subtitle(&self, prev: &CommittedPage, cur_ucs2: &[u16]) -> bool {
        if !self.typo_merge {
            return false;
        }
        let short_len = prev.ucs2.len().min(cur_ucs2.len());
        let max_allowed = ((short_len * self.lev_max_pct) / 100).max(self.lev_min_count);
        let d = levenshtein(&prev.ucs2, &cur_ucs2[..short_len]);
        d <= max_allowed
    }

    /// Pushes a freshly committed page. Returns the previous page when it
    /// must be emitted now (the new one is a different subtitle).
    pub fn push(&mut self, mut page: CommittedPage) -> Option<CommittedPage> {
        match self.prev.take() {
            None => {
                self.prev = Some(page);
                None
            }
            Some(prev) => {
                if self.is_same_subtitle(&prev, &page.ucs2) {
                    // correction: keep the original show time, newest text
                    page.show_ms = prev.show_ms;
                    self.prev = Some(page);
                    None
                } else {
                    self.prev = Some(page);
                    Some(prev)
                }
            }
        }
    }

    /// Hands out the held page at end of stream or page switch.
    pub fn flush(&mut self) -> Option<CommittedPage> {
        self.prev.take()
    }

    /// Extends the hide time of the held page (page repeated unchanged).
    pub fn extend_hide(&mut self, hide_ms: i64) {
        if let Some(prev) = &mut self.prev {
            if hide_ms > prev.hide_ms {
                prev.hide_ms = hide_ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_line(row: usize, s: &str) -> TeletextPage {
        let mut page = TeletextPage::default();
        page.text[row][0] = CHAR_START_BOX;
        for (i, c) in s.chars().enumerate() {
            page.text[row][1 + i] = c as u16;
        }
        page.tainted = true;
        page.show_ms = 1000;
        page.hide_ms = 3000;
        page
    }

    fn plain_opts() -> RenderOptions {
        RenderOptions {
            colour: false,
            escape_entities: false,
            latin_russian: false,
            line_separator: "\r\n",
        }
    }

    #[test]
    fn renders_boxed_text() {
        let page = page_with_line(2, "Hello, world.");
        let (text, ucs2) = render_page(&page, &plain_opts()).unwrap();
        assert_eq!(text.trim(), "Hello, world.");
        assert_eq!(ucs2.len(), text.len());
    }

    #[test]
    fn empty_page_renders_none() {
        let page = TeletextPage::default();
        assert!(render_page(&page, &plain_opts()).is_none());
    }

    #[test]
    fn text_outside_box_is_blanked() {
        let mut page = page_with_line(2, "visible");
        // stray characters on a row without a start box
        for (i, c) in "hidden".chars().enumerate() {
            page.text[3][i] = c as u16;
        }
        let (text, _) = render_page(&page, &plain_opts()).unwrap();
        assert!(text.contains("visible"));
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn colour_attribute_before_box_opens_font_tag() {
        let mut page = TeletextPage::default();
        page.text[2][0] = 0x03; // yellow
        page.text[2][1] = CHAR_START_BOX;
        for (i, c) in "Hi".chars().enumerate() {
            page.text[2][2 + i] = c as u16;
        }
        let opts = RenderOptions::default();
        let (text, _) = render_page(&page, &opts).unwrap();
        assert!(text.starts_with("<font color=\"#ffff00\">"));
        assert!(text.ends_with("</font>"));
    }

    #[test]
    fn entities_escaped_in_colour_mode() {
        let page = page_with_line(1, "a<b");
        let (text, _) = render_page(&page, &RenderOptions::default()).unwrap();
        assert!(text.contains("a&lt;b"));
    }

    #[test]
    fn two_lines_join_with_separator() {
        let mut page = page_with_line(1, "one");
        page.text[2][0] = CHAR_START_BOX;
        for (i, c) in "two".chars().enumerate() {
            page.text[2][1 + i] = c as u16;
        }
        let (text, _) = render_page(&page, &plain_opts()).unwrap();
        assert_eq!(text, "one\r\ntwo");
    }

    #[test]
    fn sentence_case_basic_and_idempotent() {
        let input = "hello. THIS IS LOUD. ok";
        let once = sentence_case(input, &[]);
        assert_eq!(once, "hello. This is loud. Ok");
        assert_eq!(sentence_case(&once, &[]), once);
    }

    #[test]
    fn sentence_case_respects_word_list() {
        let words = vec!["London".to_string()];
        let out = sentence_case("we went to LONDON today", &words);
        assert_eq!(out, "we went to London today");
    }

    #[test]
    fn sentence_case_leaves_tags_alone() {
        let out = sentence_case("<font color=\"#ff0000\">HELLO. WORLD</font>", &[]);
        assert_eq!(out, "<font color=\"#ff0000\">Hello. World</font>");
    }

    fn committed(text: &str, show: i64, hide: i64) -> CommittedPage {
        CommittedPage {
            text: text.to_string(),
            ucs2: text.encode_utf16().collect(),
            show_ms: show,
            hide_ms: hide,
        }
    }

    #[test]
    fn typo_merge_keeps_one_subtitle() {
        let mut cell = CommitCell::new(true, 2, 10);
        assert!(cell.push(committed("Hello worl", 1000, 1960)).is_none());
        assert!(cell.push(committed("Hello world.", 2000, 3000)).is_none());
        let merged = cell.flush().unwrap();
        assert_eq!(merged.text, "Hello world.");
        assert_eq!(merged.show_ms, 1000);
        assert_eq!(merged.hide_ms, 3000);
        assert!(cell.flush().is_none());
    }

    #[test]
    fn different_text_flushes_previous() {
        let mut cell = CommitCell::new(true, 2, 10);
        assert!(cell.push(committed("First subtitle line", 0, 2000)).is_none());
        let flushed = cell.push(committed("Entirely different text", 2000, 4000)).unwrap();
        assert_eq!(flushed.text, "First subtitle line");
        assert_eq!(flushed.show_ms, 0);
        assert_eq!(flushed.hide_ms, 2000);
    }

    #[test]
    fn merge_disabled_always_flushes() {
        let mut cell = CommitCell::new(false, 2, 10);
        assert!(cell.push(committed("Hello worl", 0, 1000)).is_none());
        assert!(cell.push(committed("Hello world.", 1000, 2000)).is_some());
    }
}
