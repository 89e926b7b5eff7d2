use crate::index::build::{Catalogs, load_catalogs};
use crate::index::catalog::Catalog;
use crate::index::types::{Entity, EntityId, EntityKind};
use crate::query::QueryEngine;
use crate::server::{ConnectionState, RelayClient};
use crate::utils::{AppConfig, RelayConfig, tokenize};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// Application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Search,
    Help,
}

/// Catalog loading state for background loading
pub enum CatalogLoadState {
    /// Catalogs are being built in background
    Loading(Receiver<Result<Catalogs, String>>),
    Ready,
    /// Loading failed (error message stored in status_message)
    Failed,
}

/// Relay target and defaults for the browser
#[derive(Debug, Clone)]
pub struct BrowseOptions {
    pub session_id: Option<String>,
    pub host: String,
    pub port: u16,
    /// Instance argument of map commands
    pub map_instance: String,
    /// Connect to the relay on startup
    pub auto_connect: bool,
}

/// LRU cache size for query results
const QUERY_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(64).unwrap();

type QueryKey = (EntityKind, Vec<String>);

/// Application state
pub struct App {
    catalogs: Catalogs,
    pub tab: EntityKind,
    pub query: String,
    /// Positions of matching entities in the active catalog
    pub results: Arc<Vec<EntityId>>,
    pub selected: usize,
    pub mode: Mode,
    pub status_message: String,
    pub options: BrowseOptions,
    load_state: CatalogLoadState,
    client: RelayClient,
    /// Tokens the current results were computed for
    last_key: Option<QueryKey>,
    query_cache: LruCache<QueryKey, Arc<Vec<EntityId>>>,
}

impl App {
    /// Create the app and start building catalogs in the background
    pub fn new(config: AppConfig, options: BrowseOptions) -> Self {
        let (tx, rx) = mpsc::channel();
        let relay = config.relay.clone();

        thread::spawn(move || {
            let result = load_catalogs(&config, true).map_err(|e| format!("{:#}", e));
            let _ = tx.send(result);
        });

        let mut app = Self::with_state(
            Catalogs::default(),
            CatalogLoadState::Loading(rx),
            &relay,
            options,
        );
        app.status_message = "Loading catalogs...".to_string();
        app.connect_if_requested();
        app
    }

    /// Create the app over already built catalogs
    pub fn with_catalogs(catalogs: Catalogs, relay: &RelayConfig, options: BrowseOptions) -> Self {
        let mut app = Self::with_state(catalogs, CatalogLoadState::Ready, relay, options);
        app.status_message = app.catalog_summary();
        app.refresh_results();
        app
    }

    fn with_state(
        catalogs: Catalogs,
        load_state: CatalogLoadState,
        relay: &RelayConfig,
        options: BrowseOptions,
    ) -> Self {
        Self {
            catalogs,
            tab: EntityKind::Item,
            query: String::new(),
            results: Arc::new(Vec::new()),
            selected: 0,
            mode: Mode::Search,
            status_message: String::new(),
            options,
            load_state,
            client: RelayClient::new(relay),
            last_key: None,
            query_cache: LruCache::new(QUERY_CACHE_SIZE),
        }
    }

    fn connect_if_requested(&mut self) {
        if self.options.auto_connect {
            self.connect();
        }
    }

    /// Check for background catalog load completion (call this in event loop)
    pub fn poll_catalog_load(&mut self) {
        let current_state = std::mem::replace(&mut self.load_state, CatalogLoadState::Ready);

        match current_state {
            CatalogLoadState::Loading(rx) => match rx.try_recv() {
                Ok(Ok(catalogs)) => {
                    self.catalogs = catalogs;
                    self.load_state = CatalogLoadState::Ready;
                    self.status_message = self.catalog_summary();
                    self.refresh_results();
                }
                Ok(Err(e)) => {
                    self.status_message = format!("Catalog load failed: {}", e);
                    self.load_state = CatalogLoadState::Failed;
                }
                Err(TryRecvError::Empty) => {
                    self.load_state = CatalogLoadState::Loading(rx);
                }
                Err(TryRecvError::Disconnected) => {
                    self.status_message = "Catalog load thread terminated unexpectedly".to_string();
                    self.load_state = CatalogLoadState::Failed;
                }
            },
            other => {
                self.load_state = other;
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.load_state, CatalogLoadState::Loading(_))
    }

    fn catalog_summary(&self) -> String {
        let count = |kind: EntityKind| match self.catalogs.get(kind) {
            Some(catalog) => format!("{}: {}", kind.label(), catalog.len()),
            None => format!("{}: unavailable", kind.label()),
        };
        format!("{}, {}", count(EntityKind::Item), count(EntityKind::Map))
    }

    pub fn catalog(&self) -> Option<&Arc<Catalog>> {
        self.catalogs.get(self.tab)
    }

    /// Recompute results for the current query and tab.
    ///
    /// Nothing happens when the token list is unchanged; recent token lists
    /// are answered from the cache.
    pub fn refresh_results(&mut self) {
        let Some(catalog) = self.catalogs.get(self.tab).cloned() else {
            self.results = Arc::new(Vec::new());
            self.selected = 0;
            self.last_key = None;
            return;
        };

        let key = (self.tab, tokenize(&self.query));
        if self.last_key.as_ref() == Some(&key) {
            return;
        }

        let results = match self.query_cache.get(&key) {
            Some(cached) => Arc::clone(cached),
            None => {
                let computed = Arc::new(QueryEngine::new(&catalog).query_tokens(&key.1));
                self.query_cache.put(key.clone(), Arc::clone(&computed));
                computed
            }
        };

        self.results = results;
        self.selected = 0;
        self.last_key = Some(key);
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.refresh_results();
    }

    pub fn pop_char(&mut self) {
        self.query.pop();
        self.refresh_results();
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
        self.refresh_results();
    }

    /// Delete word backward from query
    pub fn delete_word(&mut self) {
        while self.query.ends_with(' ') {
            self.query.pop();
        }
        while !self.query.is_empty() && !self.query.ends_with(' ') {
            self.query.pop();
        }
        self.refresh_results();
    }

    /// Switch between the item and map catalogs
    pub fn toggle_tab(&mut self) {
        self.tab = match self.tab {
            EntityKind::Item => EntityKind::Map,
            EntityKind::Map => EntityKind::Item,
        };
        self.refresh_results();
    }

    pub fn select_next(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 1).min(self.results.len() - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_page_down(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 10).min(self.results.len() - 1);
        }
    }

    pub fn select_page_up(&mut self) {
        self.selected = self.selected.saturating_sub(10);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.results.len().saturating_sub(1);
    }

    pub fn show_help(&mut self) {
        self.mode = Mode::Help;
    }

    pub fn hide_help(&mut self) {
        self.mode = Mode::Search;
    }

    pub fn get_selected_entity(&self) -> Option<&Entity> {
        let position = *self.results.get(self.selected)?;
        self.catalog()?.get(position)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn connect(&mut self) {
        let state = self.client.connect(&self.options.host, self.options.port);
        self.status_message = match state {
            ConnectionState::Connected => {
                format!("Connected to {}:{}", self.options.host, self.options.port)
            }
            _ => format!(
                "Could not connect to {}:{}",
                self.options.host, self.options.port
            ),
        };
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
        self.status_message = "Disconnected".to_string();
    }

    /// Send the selected entity's command to the relay.
    ///
    /// When that is not possible the command text is shown instead so it can
    /// be copied by hand.
    pub fn relay_selected(&mut self) {
        let Some(command) = self
            .get_selected_entity()
            .map(|e| e.relay_command(&self.options.map_instance))
        else {
            return;
        };

        let Some(session_id) = self.options.session_id.clone() else {
            self.status_message = format!("No session set, copy: {}", command);
            return;
        };

        if !self.client.is_connected() {
            self.status_message = format!("Not connected (F2), copy: {}", command);
            return;
        }

        self.status_message = match self.client.send(&session_id, &command) {
            Ok(()) => format!("Sent {}", command),
            Err(e) => format!("{}, copy: {}", e, command),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::{items_from_xml, maps_from_xml};
    use crate::index::enrich::EnrichmentStore;

    fn options() -> BrowseOptions {
        BrowseOptions {
            session_id: Some("42".to_string()),
            host: "127.0.0.1".to_string(),
            port: 1,
            map_instance: "0".to_string(),
            auto_connect: false,
        }
    }

    fn app() -> App {
        let items = items_from_xml(
            br#"<ms2><key id="1" name="Red Potion" /><key id="2" name="Blue Potion" /><key id="3" name="Sword" /></ms2>"#,
            &EnrichmentStore::default(),
            8,
        )
        .unwrap();
        let maps = maps_from_xml(br#"<ms2><key id="2000001" name="Tria" /></ms2>"#, 8).unwrap();
        let catalogs = Catalogs {
            items: Some(Arc::new(items)),
            maps: Some(Arc::new(maps)),
        };
        App::with_catalogs(catalogs, &RelayConfig::default(), options())
    }

    #[test]
    fn test_initial_results_are_full_catalog() {
        let app = app();
        assert_eq!(app.results.len(), 3);
        assert_eq!(app.status_message, "Items: 3, Maps: 1");
    }

    #[test]
    fn test_typing_filters() {
        let mut app = app();
        for c in "potion".chars() {
            app.push_char(c);
        }
        assert_eq!(app.results.len(), 2);

        app.push_char(' ');
        app.push_char('b');
        assert_eq!(app.results.len(), 1);
        assert_eq!(app.get_selected_entity().unwrap().name, "Blue Potion");

        app.delete_word();
        assert_eq!(app.results.len(), 2);
    }

    #[test]
    fn test_unchanged_tokens_keep_selection() {
        let mut app = app();
        app.select_next();
        assert_eq!(app.selected, 1);

        // Trailing space does not change the token list
        app.push_char(' ');
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn test_toggle_tab() {
        let mut app = app();
        app.toggle_tab();
        assert_eq!(app.tab, EntityKind::Map);
        assert_eq!(app.results.len(), 1);
        assert_eq!(app.get_selected_entity().unwrap().name, "Tria");
    }

    #[test]
    fn test_selection_bounds() {
        let mut app = app();
        app.select_page_down();
        assert_eq!(app.selected, 2);
        app.select_prev();
        app.select_page_up();
        assert_eq!(app.selected, 0);
        app.select_last();
        assert_eq!(app.selected, 2);
    }

    #[test]
    fn test_relay_falls_back_to_status() {
        let mut app = app();
        app.relay_selected();
        assert_eq!(app.status_message, "Not connected (F2), copy: /item 00000001 1 1");

        app.options.session_id = None;
        app.toggle_tab();
        app.relay_selected();
        assert_eq!(app.status_message, "No session set, copy: /map 02000001 0");
    }

    #[test]
    fn test_missing_catalog() {
        let mut app = App::with_catalogs(Catalogs::default(), &RelayConfig::default(), options());
        assert!(app.results.is_empty());
        assert!(app.get_selected_entity().is_none());
        assert_eq!(app.status_message, "Items: unavailable, Maps: unavailable");
        app.relay_selected();
    }
}
