//! Interactive page selection: the command state machine behind
//! teletext key events.
//!
//! The [`Navigator`] holds no page data. Commands consult the raw page
//! cache and answer with a [`NavAction`] telling the decoder what to show.

use log::debug;

use crate::decoders::teletext::vbi::{ANY_SUBPAGE, PageCache, PageLink};
use crate::structs::params::{MixVideoState, TeletextEvent, TeletextParam};
use crate::structs::timestamp::{bcd2dec, dec2bcd, is_bcd};
use crate::utils::errors::TeletextError;

pub const HOME_PAGE: u16 = 0x100;
pub const MIN_PAGE: i32 = 100;
pub const MAX_PAGE: i32 = 899;

/// Attempts at finding a displayable neighbour page.
pub const PAGE_RETRIES: usize = 103;

/// Scroll positions of the double-height zoom, top to bottom.
pub const MAX_HEIGHT_INDEX: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Display,
    Search,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Normal,
    /// Header row only.
    Clear,
    /// Header clock only.
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightMode {
    Normal,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef {
    pub page: u16,
    pub subpage: u16,
}

impl PageRef {
    pub fn any(page: u16) -> Self {
        Self {
            page,
            subpage: ANY_SUBPAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    None,
    /// Show this page, waiting for it when it is not cached yet.
    Fetch(PageRef),
    /// Re-render the displayed page with the new settings.
    Redraw,
    /// Background mixing changed.
    Mix(MixVideoState),
}

/// Whether a hex page number has decimal digits within 100-899.
pub fn is_valid_page(page: u16) -> bool {
    is_bcd(page) && bcd2dec(page).is_ok_and(|dec| (MIN_PAGE..=MAX_PAGE).contains(&(dec as i32)))
}

/// Hex page number for a magazine and in-magazine page; magazine 0 means 8.
pub fn page_number(magazine: u8, page: u8) -> Result<u16, TeletextError> {
    let magazine = if magazine == 0 { 8 } else { magazine as u16 };
    let hex = magazine << 8 | page as u16;
    match bcd2dec(hex) {
        Ok(dec) if (MIN_PAGE..=MAX_PAGE).contains(&(dec as i32)) => Ok(hex),
        Ok(dec) => Err(TeletextError::PageOutOfRange(dec as i32)),
        Err(_) => Err(TeletextError::PageOutOfRange(hex as i32)),
    }
}

#[derive(Debug)]
pub struct Navigator {
    /// Page being displayed or waited for.
    pub current: PageRef,
    /// Page accepted by the page handler.
    pub goto_page: u16,
    pub state: PageState,
    pub display_mode: DisplayMode,
    pub height_mode: HeightMode,
    pub height_index: usize,
    pub mix: MixVideoState,
    pub transparent_background: bool,
    pub opacity: u8,
    /// Sub-page held; only that sub-page refreshes.
    pub locked: bool,
    /// Graphics pages refresh as new copies arrive.
    pub disp_update: bool,
    pub subtitle_mode: bool,
    pub links: Option<[PageLink; 6]>,
    history: Vec<PageRef>,
    forward: Vec<PageRef>,
    digits: u16,
    digit_count: u8,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            current: PageRef::any(HOME_PAGE),
            goto_page: HOME_PAGE,
            state: PageState::Search,
            display_mode: DisplayMode::Normal,
            height_mode: HeightMode::Normal,
            height_index: 0,
            mix: MixVideoState::Black,
            transparent_background: false,
            opacity: 255,
            locked: false,
            disp_update: false,
            subtitle_mode: true,
            links: None,
            history: vec![PageRef::any(HOME_PAGE)],
            forward: Vec::new(),
            digits: 0,
            digit_count: 0,
        }
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digits typed so far, as shown in the header while in `Input`.
    pub fn input_label(&self) -> String {
        let typed = self.digits.to_string();
        let typed = if self.digit_count == 0 { "" } else { typed.as_str() };
        format!("P{typed:-<3}")
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Records the sub-page actually shown.
    pub fn displayed(&mut self, page: PageRef, links: Option<[PageLink; 6]>) {
        if self.locked {
            self.current.subpage = page.subpage;
        }
        self.links = links;
    }

    /// Whether a newly completed sub-page of the current page should
    /// replace the displayed one.
    pub fn accepts(&self, page: PageRef) -> bool {
        page.page == self.current.page
            && (self.current.subpage == ANY_SUBPAGE || page.subpage == self.current.subpage)
    }

    fn go_to(&mut self, target: PageRef) -> NavAction {
        debug!("Go to page {:03X}/{:04X}", target.page, target.subpage);
        if self.history.last() != Some(&target) {
            self.history.push(target);
        }
        self.forward.clear();
        self.locked = false;
        self.subtitle_mode = false;
        self.disp_update = true;
        self.current = target;
        self.goto_page = target.page;
        NavAction::Fetch(target)
    }

    fn next_valid_page(&self, cache: &PageCache, dir: i32) -> Result<u16, TeletextError> {
        let mut page = self.current.page;
        for _ in 0..PAGE_RETRIES {
            let Some(next) = cache.next_page(page, dir) else {
                break;
            };
            if is_valid_page(next) {
                return Ok(next);
            }
            debug!("Skipping page {next:03X}");
            page = next;
        }
        Err(TeletextError::NoValidPage(dir))
    }

    fn step_page(&mut self, cache: &PageCache, dir: i32) -> Result<NavAction, TeletextError> {
        let page = self.next_valid_page(cache, dir)?;
        self.state = PageState::Display;
        Ok(self.go_to(PageRef::any(page)))
    }

    fn step_subpage(&mut self, cache: &PageCache, dir: i32) -> Result<NavAction, TeletextError> {
        if !self.locked {
            return Err(TeletextError::SubPageNotLocked);
        }
        let subs = cache.subpages(self.current.page);
        if subs.is_empty() {
            return Err(TeletextError::PageNotCached(self.current.page));
        }

        let index = subs.iter().position(|&s| s == self.current.subpage);
        let next = match (index, dir >= 0) {
            (Some(i), true) => subs[(i + 1) % subs.len()],
            (Some(i), false) => subs[(i + subs.len() - 1) % subs.len()],
            (None, true) => subs[0],
            (None, false) => subs[subs.len() - 1],
        };
        self.current.subpage = next;
        Ok(NavAction::Fetch(self.current))
    }

    fn digit(&mut self, d: u8) -> Result<NavAction, TeletextError> {
        if d > 9 {
            return Err(TeletextError::PageOutOfRange(d as i32));
        }
        if self.digit_count == 0 && (d == 0 || d == 9) {
            return Ok(NavAction::None);
        }

        self.digits = self.digits * 10 + d as u16;
        self.digit_count += 1;
        self.state = PageState::Input;

        if self.digit_count < 3 {
            return Ok(NavAction::Redraw);
        }

        let value = self.digits;
        self.digits = 0;
        self.digit_count = 0;
        let page = dec2bcd(value);
        if value as i32 > MAX_PAGE || page == self.current.page {
            self.state = PageState::Display;
            return Ok(NavAction::Redraw);
        }
        self.state = PageState::Search;
        Ok(self.go_to(PageRef::any(page)))
    }

    /// Applies one command. `param.event` of `None` selects the initial
    /// subtitle page.
    pub fn handle(&mut self, param: &TeletextParam, cache: &PageCache) -> Result<NavAction, TeletextError> {
        let Some(event) = param.event else {
            let page = page_number(param.magazine, param.page)?;
            self.subtitle_mode = true;
            self.disp_update = false;
            self.goto_page = page;
            self.current = PageRef::any(page);
            self.history = vec![self.current];
            self.forward.clear();
            self.state = PageState::Search;
            return Ok(NavAction::None);
        };

        if !matches!(event, TeletextEvent::Digit(_)) && self.digit_count > 0 {
            self.digits = 0;
            self.digit_count = 0;
        }

        match event {
            TeletextEvent::QuickNavigate(key) => {
                let link = self
                    .links
                    .and_then(|links| links.get(key.wrapping_sub(1) as usize).copied())
                    .filter(|link| is_valid_page(link.page));
                match link {
                    Some(link) => {
                        let subpage = if link.subpage >= ANY_SUBPAGE { ANY_SUBPAGE } else { link.subpage };
                        Ok(self.go_to(PageRef {
                            page: link.page,
                            subpage,
                        }))
                    }
                    None => self.step_page(cache, if key == 1 { -1 } else { 1 }),
                }
            }
            TeletextEvent::NextPage => self.step_page(cache, 1),
            TeletextEvent::PreviousPage => self.step_page(cache, -1),
            TeletextEvent::NextSubPage => self.step_subpage(cache, 1),
            TeletextEvent::PreviousSubPage => self.step_subpage(cache, -1),
            TeletextEvent::BackPage => {
                if self.history.len() <= 1 {
                    return Err(TeletextError::EmptyHistory);
                }
                if let Some(left) = self.history.pop() {
                    self.forward.push(left);
                }
                let target = *self.history.last().ok_or(TeletextError::EmptyHistory)?;
                self.locked = false;
                self.current = target;
                self.goto_page = target.page;
                Ok(NavAction::Fetch(target))
            }
            TeletextEvent::ForwardPage => {
                let target = self.forward.pop().ok_or(TeletextError::EmptyHistory)?;
                self.history.push(target);
                self.locked = false;
                self.current = target;
                self.goto_page = target.page;
                Ok(NavAction::Fetch(target))
            }
            TeletextEvent::MixVideo => {
                self.mix = match self.mix {
                    MixVideoState::Black => MixVideoState::Transparent,
                    MixVideoState::Transparent => MixVideoState::HalfScreen,
                    MixVideoState::HalfScreen => MixVideoState::Black,
                };
                self.transparent_background = self.mix == MixVideoState::Transparent;
                Ok(NavAction::Mix(self.mix))
            }
            TeletextEvent::Clear => {
                self.display_mode = match self.display_mode {
                    DisplayMode::Clear => DisplayMode::Normal,
                    _ => DisplayMode::Clear,
                };
                Ok(NavAction::Redraw)
            }
            TeletextEvent::Clock => {
                self.display_mode = match self.display_mode {
                    DisplayMode::Clock => DisplayMode::Normal,
                    _ => DisplayMode::Clock,
                };
                Ok(NavAction::Redraw)
            }
            TeletextEvent::Hold => {
                self.locked = !self.locked;
                self.disp_update = true;
                if self.locked {
                    Ok(NavAction::None)
                } else {
                    self.current.subpage = ANY_SUBPAGE;
                    Ok(NavAction::Fetch(self.current))
                }
            }
            TeletextEvent::DoubleHeight => {
                (self.height_mode, self.height_index) = match self.height_mode {
                    HeightMode::Normal => (HeightMode::Top, 0),
                    HeightMode::Top => (HeightMode::Bottom, MAX_HEIGHT_INDEX),
                    HeightMode::Bottom => (HeightMode::Normal, 0),
                };
                Ok(NavAction::Redraw)
            }
            TeletextEvent::DoubleScrollUp => {
                if self.height_mode == HeightMode::Normal {
                    return Err(TeletextError::NormalHeight);
                }
                self.height_index = self.height_index.saturating_sub(1);
                Ok(NavAction::Redraw)
            }
            TeletextEvent::DoubleScrollDown => {
                if self.height_mode == HeightMode::Normal {
                    return Err(TeletextError::NormalHeight);
                }
                self.height_index = (self.height_index + 1).min(MAX_HEIGHT_INDEX);
                Ok(NavAction::Redraw)
            }
            TeletextEvent::IndexPage => {
                self.state = PageState::Search;
                Ok(self.go_to(PageRef::any(HOME_PAGE)))
            }
            TeletextEvent::GoToPage => {
                let page = page_number(param.magazine, param.page)?;
                self.opacity = 255;
                self.state = PageState::Search;
                Ok(self.go_to(PageRef::any(page)))
            }
            TeletextEvent::GoToSubtitle => {
                let page = page_number(param.magazine, param.page)?;
                self.subtitle_mode = true;
                self.disp_update = false;
                self.locked = false;
                self.goto_page = page;
                self.current = PageRef::any(page);
                self.state = PageState::Search;
                Ok(NavAction::Fetch(self.current))
            }
            TeletextEvent::Digit(d) => self.digit(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::teletext::vbi::{PageControl, RawPage};

    fn cache(pages: &[(u16, u16)]) -> PageCache {
        let mut cache = PageCache::default();
        for &(page, subpage) in pages {
            cache.insert(RawPage::new(page, subpage, PageControl::default()));
        }
        cache
    }

    fn event(event: TeletextEvent) -> TeletextParam {
        TeletextParam {
            event: Some(event),
            ..Default::default()
        }
    }

    #[test]
    fn page_numbers() {
        assert_eq!(page_number(8, 0x88), Ok(0x888));
        assert_eq!(page_number(0, 0x01), Ok(0x801));
        assert_eq!(page_number(1, 0x00), Ok(0x100));
        assert_eq!(page_number(1, 0x1A), Err(TeletextError::PageOutOfRange(0x11A)));
        assert!(is_valid_page(0x899));
        assert!(!is_valid_page(0x1FF));
        assert!(!is_valid_page(0x099));
    }

    #[test]
    fn next_page_skips_invalid_numbers() -> anyhow::Result<()> {
        let cache = cache(&[(0x100, 0), (0x1AF, 0), (0x1FF, 0), (0x200, 0)]);
        let mut nav = Navigator::new();
        assert_eq!(nav.handle(&event(TeletextEvent::NextPage), &cache)?, NavAction::Fetch(PageRef::any(0x200)));
        // wraps around past the end
        assert_eq!(nav.handle(&event(TeletextEvent::NextPage), &cache)?, NavAction::Fetch(PageRef::any(0x100)));
        assert_eq!(nav.handle(&event(TeletextEvent::PreviousPage), &cache)?, NavAction::Fetch(PageRef::any(0x200)));

        let only_invalid = self::cache(&[(0x1AF, 0)]);
        assert_eq!(
            nav.handle(&event(TeletextEvent::NextPage), &only_invalid),
            Err(TeletextError::NoValidPage(1))
        );
        Ok(())
    }

    #[test]
    fn back_and_forward() -> anyhow::Result<()> {
        let cache = cache(&[(0x100, 0), (0x200, 0)]);
        let mut nav = Navigator::new();
        assert_eq!(nav.handle(&event(TeletextEvent::BackPage), &cache), Err(TeletextError::EmptyHistory));
        assert_eq!(nav.handle(&event(TeletextEvent::ForwardPage), &cache), Err(TeletextError::EmptyHistory));

        nav.handle(&event(TeletextEvent::NextPage), &cache)?;
        assert_eq!(nav.current.page, 0x200);
        assert_eq!(nav.history_len(), 2);

        assert_eq!(nav.handle(&event(TeletextEvent::BackPage), &cache)?, NavAction::Fetch(PageRef::any(0x100)));
        assert_eq!(nav.handle(&event(TeletextEvent::ForwardPage), &cache)?, NavAction::Fetch(PageRef::any(0x200)));
        assert_eq!(nav.current.page, 0x200);
        Ok(())
    }

    #[test]
    fn mix_cycle() -> anyhow::Result<()> {
        let cache = PageCache::default();
        let mut nav = Navigator::new();
        let mut seen = Vec::new();
        for _ in 0..3 {
            if let NavAction::Mix(state) = nav.handle(&event(TeletextEvent::MixVideo), &cache)? {
                seen.push((state, nav.transparent_background));
            }
        }
        assert_eq!(
            seen,
            vec![
                (MixVideoState::Transparent, true),
                (MixVideoState::HalfScreen, false),
                (MixVideoState::Black, false)
            ]
        );
        Ok(())
    }

    #[test]
    fn digits_select_page() -> anyhow::Result<()> {
        let cache = PageCache::default();
        let mut nav = Navigator::new();
        // a leading 0 or 9 is ignored
        assert_eq!(nav.handle(&event(TeletextEvent::Digit(0)), &cache)?, NavAction::None);
        assert_eq!(nav.handle(&event(TeletextEvent::Digit(2)), &cache)?, NavAction::Redraw);
        assert_eq!(nav.state, PageState::Input);
        assert_eq!(nav.input_label(), "P2--");
        nav.handle(&event(TeletextEvent::Digit(3)), &cache)?;
        assert_eq!(
            nav.handle(&event(TeletextEvent::Digit(4)), &cache)?,
            NavAction::Fetch(PageRef::any(0x234))
        );
        assert_eq!(nav.state, PageState::Search);
        assert!(!nav.subtitle_mode);
        Ok(())
    }

    #[test]
    fn hold_and_subpages() -> anyhow::Result<()> {
        let cache = cache(&[(0x100, 1), (0x100, 2), (0x100, 3)]);
        let mut nav = Navigator::new();
        assert_eq!(
            nav.handle(&event(TeletextEvent::NextSubPage), &cache),
            Err(TeletextError::SubPageNotLocked)
        );

        nav.handle(&event(TeletextEvent::Hold), &cache)?;
        nav.displayed(PageRef { page: 0x100, subpage: 3 }, None);
        assert_eq!(
            nav.handle(&event(TeletextEvent::NextSubPage), &cache)?,
            NavAction::Fetch(PageRef { page: 0x100, subpage: 1 })
        );
        assert_eq!(
            nav.handle(&event(TeletextEvent::PreviousSubPage), &cache)?,
            NavAction::Fetch(PageRef { page: 0x100, subpage: 3 })
        );
        assert!(!nav.accepts(PageRef { page: 0x100, subpage: 2 }));

        assert_eq!(nav.handle(&event(TeletextEvent::Hold), &cache)?, NavAction::Fetch(PageRef::any(0x100)));
        assert!(nav.accepts(PageRef { page: 0x100, subpage: 2 }));
        Ok(())
    }

    #[test]
    fn double_height_scrolling() -> anyhow::Result<()> {
        let cache = PageCache::default();
        let mut nav = Navigator::new();
        assert_eq!(
            nav.handle(&event(TeletextEvent::DoubleScrollUp), &cache),
            Err(TeletextError::NormalHeight)
        );
        nav.handle(&event(TeletextEvent::DoubleHeight), &cache)?;
        nav.handle(&event(TeletextEvent::DoubleScrollDown), &cache)?;
        assert_eq!((nav.height_mode, nav.height_index), (HeightMode::Top, 1));
        nav.handle(&event(TeletextEvent::DoubleHeight), &cache)?;
        nav.handle(&event(TeletextEvent::DoubleScrollDown), &cache)?;
        assert_eq!((nav.height_mode, nav.height_index), (HeightMode::Bottom, MAX_HEIGHT_INDEX));
        nav.handle(&event(TeletextEvent::DoubleHeight), &cache)?;
        assert_eq!(nav.height_mode, HeightMode::Normal);
        Ok(())
    }

    #[test]
    fn links_drive_quick_navigation() -> anyhow::Result<()> {
        let cache = PageCache::default();
        let mut nav = Navigator::new();
        let mut links = [PageLink::default(); 6];
        links[2] = PageLink {
            page: 0x345,
            subpage: ANY_SUBPAGE,
        };
        nav.displayed(PageRef::any(0x100), Some(links));
        assert_eq!(
            nav.handle(&event(TeletextEvent::QuickNavigate(3)), &cache)?,
            NavAction::Fetch(PageRef::any(0x345))
        );
        Ok(())
    }
}
