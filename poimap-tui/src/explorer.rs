use crossterm::event::KeyCode;
use poimap_core::{
    LoadReport, MapSession, MarkerId, Popup, RenderSurface, Result as CoreResult, Selection,
};
use poimap_source::Coordinates;

/// One line of the flattened legend list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendRow {
    /// Search result, indexing [`Explorer::matches`].
    Match(usize),
    Section(usize),
    Member { section: usize, member: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Browse,
    Search,
    Locate,
}

/// Work the explorer cannot do without I/O; the run loop carries it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Reload,
    Locate(String),
}

/// Legend explorer state: cursor, dropdown, input line and status.
pub struct Explorer<S: RenderSurface> {
    session: MapSession<S>,
    rows: Vec<LegendRow>,
    matches: Vec<MarkerId>,
    selected: usize,
    tag_options: Vec<String>,
    tag_cursor: Option<usize>,
    mode: InputMode,
    input: String,
    status: String,
    notice: Option<String>,
    should_quit: bool,
}

impl<S: RenderSurface> Explorer<S> {
    pub fn new(session: MapSession<S>) -> Self {
        let mut explorer = Self {
            session,
            rows: Vec::new(),
            matches: Vec::new(),
            selected: 0,
            tag_options: Vec::new(),
            tag_cursor: None,
            mode: InputMode::Browse,
            input: String::new(),
            status: String::new(),
            notice: None,
            should_quit: false,
        };
        explorer.refresh();
        explorer
    }

    pub fn session(&self) -> &MapSession<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MapSession<S> {
        &mut self.session
    }

    pub fn rows(&self) -> &[LegendRow] {
        &self.rows
    }

    /// Markers found by the last text search, shown above the legend.
    pub fn matches(&self) -> &[MarkerId] {
        &self.matches
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Message that blocks input until a key dismisses it.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = message.clone();
        self.notice = Some(message);
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Label of the tag dropdown, `None` when showing all tags.
    pub fn selected_tag(&self) -> Option<&str> {
        self.tag_cursor
            .and_then(|idx| self.tag_options.get(idx))
            .map(String::as_str)
    }

    /// Rebuild rows and dropdown options after a load cycle.
    pub fn refresh(&mut self) {
        self.matches.clear();
        self.rebuild_rows();
        self.tag_options = self.session.tag_options();
        self.tag_cursor = None;
    }

    fn rebuild_rows(&mut self) {
        let matches = (0..self.matches.len()).map(LegendRow::Match);
        let legend = self
            .session
            .legend()
            .sections()
            .iter()
            .enumerate()
            .flat_map(|(section, s)| {
                std::iter::once(LegendRow::Section(section)).chain(
                    (0..s.members.len()).map(move |member| LegendRow::Member { section, member }),
                )
            });
        self.rows = matches.chain(legend).collect();
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    fn clear_matches(&mut self) {
        if !self.matches.is_empty() {
            self.matches.clear();
            self.selected = 0;
            self.rebuild_rows();
        }
    }

    pub fn loaded(&mut self, report: &LoadReport) {
        self.refresh();
        self.status = format!(
            "Loaded {} markers ({} geocoded, {} dropped)",
            report.rendered,
            report.geocoded,
            report.dropped.len()
        );
    }

    /// Popup of the marker the view is focused on.
    pub fn focused_popup(&self) -> Option<Popup> {
        let id = self.session.index().focused()?;
        self.session
            .index()
            .get(id)
            .map(|entry| Popup::from_record(&entry.record))
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Option<Request> {
        if self.notice.take().is_some() {
            return None;
        }
        match self.mode {
            InputMode::Browse => self.handle_browse_key(code),
            InputMode::Search | InputMode::Locate => self.handle_input_key(code),
        }
    }

    fn handle_browse_key(&mut self, code: KeyCode) -> Option<Request> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.rows.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = self.rows.len().saturating_sub(1),
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Enter => self.focus_selected(),
            KeyCode::Char('r') => {
                self.session.reset();
                self.clear_matches();
                self.tag_cursor = None;
                self.status = "Legend reset".to_string();
            }
            KeyCode::Char('t') => self.cycle_tag(true),
            KeyCode::Char('T') => self.cycle_tag(false),
            KeyCode::Char('/') => self.start_input(InputMode::Search),
            KeyCode::Char('@') => self.start_input(InputMode::Locate),
            KeyCode::Char('R') | KeyCode::F(5) => {
                self.status = "Reloading...".to_string();
                return Some(Request::Reload);
            }
            _ => {}
        }
        None
    }

    fn handle_input_key(&mut self, code: KeyCode) -> Option<Request> {
        match code {
            KeyCode::Esc => {
                self.mode = InputMode::Browse;
                self.input.clear();
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Enter => {
                let query = std::mem::take(&mut self.input);
                let mode = std::mem::replace(&mut self.mode, InputMode::Browse);
                match mode {
                    InputMode::Search => self.search(&query),
                    InputMode::Locate => {
                        if !query.trim().is_empty() {
                            self.status = format!("Locating '{}'...", query.trim());
                            return Some(Request::Locate(query));
                        }
                    }
                    InputMode::Browse => {}
                }
            }
            _ => {}
        }
        None
    }

    fn start_input(&mut self, mode: InputMode) {
        self.mode = mode;
        self.input.clear();
    }

    fn section_key(&self, section: usize) -> Option<(String, bool)> {
        self.session
            .legend()
            .sections()
            .get(section)
            .map(|s| (s.key.clone(), s.checked))
    }

    fn toggle_selected(&mut self) {
        let section = match self.rows.get(self.selected) {
            Some(LegendRow::Section(section)) | Some(LegendRow::Member { section, .. }) => *section,
            Some(LegendRow::Match(_)) | None => return,
        };
        let Some((key, checked)) = self.section_key(section) else {
            return;
        };
        self.status = match self.session.toggle(&key, !checked) {
            Ok(count) if checked => format!("Hid {} markers in '{}'", count, key),
            Ok(count) => format!("Showing {} markers in '{}'", count, key),
            Err(e) => e.to_string(),
        };
    }

    fn focus_selected(&mut self) {
        let marker = match self.rows.get(self.selected) {
            Some(LegendRow::Match(idx)) => self.matches.get(*idx).copied(),
            Some(LegendRow::Member { section, member }) => self.member_marker(*section, *member),
            Some(LegendRow::Section(section)) => self.member_marker(*section, 0),
            None => None,
        };
        if let Some(marker) = marker {
            self.status = match self.focus(marker) {
                Ok(name) => format!("Focused {}", name),
                Err(e) => e.to_string(),
            };
        }
    }

    fn member_marker(&self, section: usize, member: usize) -> Option<MarkerId> {
        self.session
            .legend()
            .sections()
            .get(section)?
            .members
            .get(member)
            .map(|m| m.marker)
    }

    fn focus(&mut self, marker: MarkerId) -> CoreResult<String> {
        let entry = self.session.focus(marker)?;
        Ok(entry.record.org_name.clone())
    }

    fn cycle_tag(&mut self, forward: bool) {
        let count = self.tag_options.len();
        if count == 0 {
            return;
        }
        self.tag_cursor = match (self.tag_cursor, forward) {
            (None, true) => Some(0),
            (None, false) => Some(count - 1),
            (Some(idx), true) if idx + 1 < count => Some(idx + 1),
            (Some(idx), false) if idx > 0 => Some(idx - 1),
            _ => None,
        };
        self.clear_matches();
        let tag = self.selected_tag().unwrap_or_default().to_string();
        let outcome = self.session.select(Selection::Tag(tag.clone()));
        self.status = if tag.is_empty() {
            "All tags".to_string()
        } else {
            format!("Tag '{}': {} markers", tag, outcome.visible)
        };
    }

    fn search(&mut self, query: &str) {
        let outcome = self.session.search(query);
        self.tag_cursor = None;
        self.matches = if query.trim().is_empty() {
            Vec::new()
        } else {
            outcome.matches
        };
        self.selected = 0;
        self.rebuild_rows();

        self.status = if query.trim().is_empty() {
            "Search cleared".to_string()
        } else if self.matches.is_empty() {
            format!("No matches for '{}'", query.trim())
        } else {
            format!(
                "{} matches for '{}'; Enter focuses the selected one",
                self.matches.len(),
                query.trim()
            )
        };
    }

    /// Result of an address search: focus the closest visible marker.
    pub fn located(&mut self, query: &str, result: CoreResult<Coordinates>) {
        let at = match result {
            Ok(at) => at,
            Err(e) => {
                self.notify(e.to_string());
                return;
            }
        };
        match self.nearest_visible(at) {
            Some(marker) => {
                let name = self.focus(marker).unwrap_or_default();
                self.status = format!(
                    "'{}' is at {:.5}, {:.5}; nearest marker: {}",
                    query.trim(),
                    at.longitude,
                    at.latitude,
                    name
                );
            }
            None => {
                self.status = format!(
                    "'{}' is at {:.5}, {:.5}",
                    query.trim(),
                    at.longitude,
                    at.latitude
                );
            }
        }
    }

    fn nearest_visible(&self, at: Coordinates) -> Option<MarkerId> {
        self.session
            .index()
            .entries()
            .iter()
            .filter(|entry| entry.visible)
            .map(|entry| {
                let dx = entry.record.longitude - at.longitude;
                let dy = entry.record.latitude - at.latitude;
                (entry.id, dx * dx + dy * dy)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poimap_core::{
        LoadError, LoadOptions, MemorySurface, NormalizedRecord, RowOutcome,
    };

    fn record(id: &str, org: &str, tags: &[&str], lng: f64, lat: f64) -> RowOutcome {
        RowOutcome::Stored(NormalizedRecord {
            id: id.to_string(),
            org_name: org.to_string(),
            address: None,
            email: None,
            phone: None,
            website: None,
            social: None,
            image_url: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            latitude: lat,
            longitude: lng,
        })
    }

    fn explorer() -> Explorer<MemorySurface> {
        let mut session = MapSession::new(MemorySurface::new(), LoadOptions::default());
        let ticket = session.begin_cycle();
        session
            .commit(
                ticket,
                vec![
                    record("r1", "Queens Gallery", &["Art"], -73.8, 40.7),
                    record("r2", "Art Studio", &["Gallery", "Music"], -73.9, 40.6),
                    record("r3", "Jazz Club", &["Music"], -74.0, 40.8),
                ],
            )
            .unwrap();
        Explorer::new(session)
    }

    #[test]
    fn test_rows_flatten_sections_and_members() {
        let explorer = explorer();
        // Art(1), Gallery(1), Music(2)
        assert_eq!(explorer.rows().len(), 3 + 4);
        assert_eq!(explorer.rows()[0], LegendRow::Section(0));
        assert_eq!(explorer.rows()[1], LegendRow::Member { section: 0, member: 0 });
    }

    #[test]
    fn test_space_toggles_section_under_cursor() {
        let mut explorer = explorer();
        explorer.handle_key(KeyCode::Char(' '));
        assert_eq!(explorer.session().index().visible_count(), 2);
        assert!(!explorer.session().legend().sections()[0].checked);

        explorer.handle_key(KeyCode::Char(' '));
        assert_eq!(explorer.session().index().visible_count(), 3);
    }

    #[test]
    fn test_reset_key() {
        let mut explorer = explorer();
        explorer.handle_key(KeyCode::Char(' '));
        explorer.handle_key(KeyCode::Char('r'));
        assert_eq!(explorer.session().index().visible_count(), 3);
        assert_eq!(explorer.status(), "Legend reset");
    }

    #[test]
    fn test_enter_focuses_member() {
        let mut explorer = explorer();
        explorer.handle_key(KeyCode::Down);
        explorer.handle_key(KeyCode::Enter);

        let popup = explorer.focused_popup().unwrap();
        assert_eq!(popup.title, "Queens Gallery");
    }

    #[test]
    fn test_tag_dropdown_cycles_through_options() {
        let mut explorer = explorer();

        explorer.handle_key(KeyCode::Char('t'));
        assert_eq!(explorer.selected_tag(), Some("Art"));
        assert_eq!(explorer.session().index().visible_count(), 1);

        explorer.handle_key(KeyCode::Char('T'));
        assert_eq!(explorer.selected_tag(), None);
        assert_eq!(explorer.session().index().visible_count(), 3);
    }

    fn type_search(explorer: &mut Explorer<MemorySurface>, query: &str) {
        explorer.handle_key(KeyCode::Char('/'));
        for c in query.chars() {
            explorer.handle_key(KeyCode::Char(c));
        }
        assert_eq!(explorer.mode(), InputMode::Search);
        assert_eq!(explorer.handle_key(KeyCode::Enter), None);
    }

    #[test]
    fn test_search_mode() {
        let mut explorer = explorer();
        type_search(&mut explorer, "gallery");

        assert_eq!(explorer.mode(), InputMode::Browse);
        assert_eq!(
            explorer.status(),
            "2 matches for 'gallery'; Enter focuses the selected one"
        );
        assert_eq!(explorer.focused_popup().unwrap().title, "Queens Gallery");
    }

    #[test]
    fn test_search_matches_are_selectable_rows() {
        let mut explorer = explorer();
        type_search(&mut explorer, "gallery");

        assert_eq!(explorer.matches().len(), 2);
        assert_eq!(explorer.rows()[0], LegendRow::Match(0));
        assert_eq!(explorer.rows()[1], LegendRow::Match(1));
        assert_eq!(explorer.rows()[2], LegendRow::Section(0));
        assert_eq!(explorer.rows().len(), 2 + 3 + 4);
        assert_eq!(explorer.selected(), 0);

        explorer.handle_key(KeyCode::Down);
        explorer.handle_key(KeyCode::Enter);
        assert_eq!(explorer.focused_popup().unwrap().title, "Art Studio");
        assert_eq!(explorer.status(), "Focused Art Studio");

        // Space on a match row leaves the legend alone.
        explorer.handle_key(KeyCode::Char(' '));
        assert!(explorer.session().legend().sections().iter().all(|s| s.checked));
    }

    #[test]
    fn test_blank_search_and_reset_drop_match_rows() {
        let mut explorer = explorer();
        type_search(&mut explorer, "club");
        assert_eq!(explorer.rows()[0], LegendRow::Match(0));

        type_search(&mut explorer, "");
        assert!(explorer.matches().is_empty());
        assert_eq!(explorer.rows()[0], LegendRow::Section(0));

        type_search(&mut explorer, "club");
        explorer.handle_key(KeyCode::Char('r'));
        assert!(explorer.matches().is_empty());
        assert_eq!(explorer.rows().len(), 3 + 4);
    }

    #[test]
    fn test_locate_request_and_result() {
        let mut explorer = explorer();
        explorer.handle_key(KeyCode::Char('@'));
        for c in "Harlem".chars() {
            explorer.handle_key(KeyCode::Char(c));
        }

        let request = explorer.handle_key(KeyCode::Enter);
        assert_eq!(request, Some(Request::Locate("Harlem".to_string())));

        explorer.located("Harlem", Ok(Coordinates::new(-74.0, 40.81)));
        assert_eq!(explorer.focused_popup().unwrap().title, "Jazz Club");
    }

    #[test]
    fn test_locate_without_result() {
        let mut explorer = explorer();
        explorer.located("Atlantis", Err(LoadError::NoGeocodeResult("Atlantis".to_string())));
        assert_eq!(explorer.status(), "no geocoding result for 'Atlantis'");
        assert_eq!(explorer.notice(), Some("no geocoding result for 'Atlantis'"));
    }

    #[test]
    fn test_notice_swallows_next_key() {
        let mut explorer = explorer();
        explorer.located("Atlantis", Err(LoadError::NoGeocodeResult("Atlantis".to_string())));

        assert_eq!(explorer.handle_key(KeyCode::Char('q')), None);
        assert!(!explorer.should_quit());
        assert_eq!(explorer.notice(), None);

        explorer.handle_key(KeyCode::Char('q'));
        assert!(explorer.should_quit());
    }

    #[test]
    fn test_quit_and_reload_keys() {
        let mut explorer = explorer();
        assert_eq!(explorer.handle_key(KeyCode::Char('R')), Some(Request::Reload));
        explorer.handle_key(KeyCode::Char('q'));
        assert!(explorer.should_quit());
    }
}
