use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde_json::Value;
use tokio::sync::mpsc;
use wiki_shared::api::{
    CreateCategoryRequest, CreatePageRequest, UpdateCategoryRequest, UpdateSettingsRequest,
};
use wiki_shared::blocks::{render_document, RenderNode, RenderedBlock};
use wiki_shared::structure::{build_structure, plan_move, siblings_of, visible_nodes, Direction};
use wiki_shared::{
    is_truthy, BlockKind, BlockType, MaintenanceStatus, NodeKind, PageWithRelations,
    StructureNode, Tag, User, MAINTENANCE_MODE_KEY, MAINTENANCE_REASON_KEY,
};

use crate::api::{ApiClient, ApiError};
use crate::editor::{grid_to_tsv, launch_external_editor, trim_trailing_newline, tsv_to_grid};
use crate::lightbox::ActivationTracker;
use crate::page_editor::{EditMode, EditorState, PickTarget};
use crate::render::selectable_blocks;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    VerifyingAuth,
    Login,
    Maintenance,
    Structure,
    Page,
    Editor,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VimMode {
    Normal,
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Username,
    Password,
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    Startup,
    AuthSuccess,
    AuthFailed(String),
    Error(String),
}

/// What a one-line text prompt in the structure view does on Enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    NewPage { category_id: Option<i64> },
    NewCategory { parent_id: Option<i64> },
    RenameCategory { id: i64 },
}

impl PromptKind {
    pub fn title(&self) -> &'static str {
        match self {
            PromptKind::NewPage { .. } => " New Page ",
            PromptKind::NewCategory { .. } => " New Category ",
            PromptKind::RenameCategory { .. } => " Rename Category ",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PromptKind::NewPage { .. } => " Title ",
            _ => " Name ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub input: String,
}

/// Maintenance switch and reason as edited in the settings view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsForm {
    pub maintenance: bool,
    pub reason: String,
    pub editing_reason: bool,
    pub dirty: bool,
}

impl SettingsForm {
    pub fn from_settings(settings: &BTreeMap<String, Option<String>>) -> Self {
        let value = |key: &str| settings.get(key).cloned().flatten().unwrap_or_default();
        Self {
            maintenance: is_truthy(&value(MAINTENANCE_MODE_KEY)),
            reason: value(MAINTENANCE_REASON_KEY),
            ..Default::default()
        }
    }

    /// Both keys are always sent, the switch spelled `"true"`/`"false"`.
    pub fn request(&self) -> UpdateSettingsRequest {
        let mode = if self.maintenance { "true" } else { "false" };
        UpdateSettingsRequest {
            settings: BTreeMap::from([
                (MAINTENANCE_MODE_KEY.to_string(), Value::from(mode)),
                (MAINTENANCE_REASON_KEY.to_string(), Value::from(self.reason.clone())),
            ]),
        }
    }
}

/// Category that new pages and categories go into: the selected node if it
/// is a category, otherwise the top level.
pub fn target_category(selected: Option<&StructureNode>) -> Option<i64> {
    selected
        .filter(|node| node.kind == NodeKind::Category)
        .map(|node| node.id)
}

/// Screen a session lands on once maintenance and the user are known.
pub fn landing_view(maintenance: &MaintenanceStatus, user: Option<&User>) -> View {
    match user {
        None => View::Login,
        Some(_) if maintenance.blocks(user) => View::Maintenance,
        Some(_) => View::Structure,
    }
}

/// Owners edit their own pages; managers edit any page.
pub fn can_edit(user: Option<&User>, page: &PageWithRelations) -> bool {
    user.is_some_and(|u| u.role.can_manage() || u.id == page.page.user_id)
}

pub struct App {
    pub api: ApiClient,
    pub view: View,
    pub vim_mode: VimMode,

    pub loading: bool,
    pub loading_message: String,
    pub error_message: Option<String>,
    pub needs_terminal_clear: bool,

    pub user: Option<User>,
    pub maintenance: MaintenanceStatus,

    // Login form
    pub login_username: String,
    pub login_password: String,
    pub login_field: InputField,

    // Structure tree
    pub tree: Vec<StructureNode>,
    pub expanded: HashSet<(NodeKind, i64)>,
    pub selected_node: usize,
    pub prompt: Option<Prompt>,
    pub confirm_delete: Option<StructureNode>,

    // Page viewer
    pub page: Option<PageWithRelations>,
    pub page_blocks: Vec<RenderedBlock>,
    pub selected_block: usize,
    pub activations: ActivationTracker,
    pub lightbox: Option<String>,

    pub editor: Option<EditorState>,
    pub tags: Vec<Tag>,

    pub settings: SettingsForm,
}

impl App {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            view: View::VerifyingAuth,
            vim_mode: VimMode::Normal,
            loading: false,
            loading_message: String::new(),
            error_message: None,
            needs_terminal_clear: false,
            user: None,
            maintenance: MaintenanceStatus::default(),
            login_username: String::new(),
            login_password: String::new(),
            login_field: InputField::Username,
            tree: Vec::new(),
            expanded: HashSet::new(),
            selected_node: 0,
            prompt: None,
            confirm_delete: None,
            page: None,
            page_blocks: Vec::new(),
            selected_block: 0,
            activations: ActivationTracker::default(),
            lightbox: None,
            editor: None,
            tags: Vec::new(),
            settings: SettingsForm::default(),
        }
    }

    pub fn set_loading(&mut self, loading: bool, message: &str) {
        self.loading = loading;
        self.loading_message = message.to_string();
    }

    pub fn set_error(&mut self, message: String) {
        self.error_message = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Report a failed call. A rejected token sends the user back to login.
    fn api_failed(&mut self, context: &str, err: ApiError) {
        tracing::warn!("{}: {}", context, err);
        if matches!(err, ApiError::Unauthorized) {
            self.reset_session();
            self.set_error("Session expired, please log in again".to_string());
        } else {
            self.set_error(format!("{}: {}", context, err));
        }
    }

    fn reset_session(&mut self) {
        self.user = None;
        self.tree.clear();
        self.expanded.clear();
        self.prompt = None;
        self.confirm_delete = None;
        self.page = None;
        self.page_blocks.clear();
        self.editor = None;
        self.lightbox = None;
        self.view = View::Login;
    }

    pub fn is_manager(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.role.can_manage())
    }

    /// Handle key events, returns true if app should quit
    pub async fn handle_key(&mut self, key: KeyEvent, tx: mpsc::Sender<AppEvent>) -> Result<bool> {
        if self.error_message.is_some() {
            self.clear_error();
            if key.code == KeyCode::Esc {
                return Ok(false);
            }
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        match self.view {
            View::VerifyingAuth => Ok(false),
            View::Login => self.handle_login_key(key, tx).await,
            View::Maintenance => self.handle_maintenance_key(key).await,
            View::Structure => self.handle_structure_key(key).await,
            View::Page => self.handle_page_key(key).await,
            View::Editor => self.handle_editor_key(key).await,
            View::Settings => self.handle_settings_key(key).await,
        }
    }

    // ============ Start-up and auth ============

    async fn refresh_maintenance(&mut self) {
        match self.api.maintenance().await {
            Ok(status) => self.maintenance = status,
            Err(e) => tracing::warn!("Could not read maintenance status: {}", e),
        }
    }

    pub async fn verify_auth(&mut self) {
        self.set_loading(true, "Connecting...");
        self.refresh_maintenance().await;

        if self.api.is_authenticated() {
            match self.api.me().await {
                Ok(user) => self.user = Some(user),
                Err(e) => {
                    tracing::info!("Stored session rejected: {}", e);
                    let _ = self.api.logout().await;
                }
            }
        }

        self.set_loading(false, "");
        self.enter_landing().await;
    }

    async fn enter_landing(&mut self) {
        self.view = landing_view(&self.maintenance, self.user.as_ref());
        if self.view == View::Structure {
            self.load_structure().await;
        }
    }

    async fn handle_login_key(&mut self, key: KeyEvent, tx: mpsc::Sender<AppEvent>) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') if self.vim_mode == VimMode::Normal => return Ok(true),
            KeyCode::Esc => self.vim_mode = VimMode::Normal,
            KeyCode::Char('i') if self.vim_mode == VimMode::Normal => {
                self.vim_mode = VimMode::Insert;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.login_field = match self.login_field {
                    InputField::Username => InputField::Password,
                    InputField::Password => InputField::Username,
                };
            }
            KeyCode::Char('j') | KeyCode::Down if self.vim_mode == VimMode::Normal => {
                self.login_field = InputField::Password;
            }
            KeyCode::Char('k') | KeyCode::Up if self.vim_mode == VimMode::Normal => {
                self.login_field = InputField::Username;
            }
            KeyCode::Enter => {
                if !self.login_username.is_empty() && !self.login_password.is_empty() {
                    self.do_login(tx).await;
                }
            }
            KeyCode::Char(c) if self.vim_mode == VimMode::Insert => match self.login_field {
                InputField::Username => self.login_username.push(c),
                InputField::Password => self.login_password.push(c),
            },
            KeyCode::Backspace if self.vim_mode == VimMode::Insert => match self.login_field {
                InputField::Username => {
                    self.login_username.pop();
                }
                InputField::Password => {
                    self.login_password.pop();
                }
            },
            _ => {}
        }

        Ok(false)
    }

    async fn do_login(&mut self, tx: mpsc::Sender<AppEvent>) {
        self.set_loading(true, "Logging in...");

        let username = self.login_username.clone();
        let password = self.login_password.clone();

        match self.api.login(&username, &password).await {
            Ok(user) => {
                self.user = Some(user);
                let _ = tx.send(AppEvent::AuthSuccess).await;
            }
            Err(e) => {
                let _ = tx.send(AppEvent::AuthFailed(e.to_string())).await;
            }
        }

        self.set_loading(false, "");
    }

    pub async fn on_auth_success(&mut self) {
        self.login_password.clear();
        self.vim_mode = VimMode::Normal;
        self.refresh_maintenance().await;
        self.enter_landing().await;
    }

    pub fn on_auth_failed(&mut self, msg: String) {
        self.set_error(format!("Login failed: {}", msg));
        self.login_password.clear();
    }

    async fn do_logout(&mut self) {
        if let Err(e) = self.api.logout().await {
            tracing::warn!("Logout failed: {}", e);
        }
        self.reset_session();
    }

    async fn handle_maintenance_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('L') => self.do_logout().await,
            KeyCode::Char('r') => {
                self.refresh_maintenance().await;
                self.enter_landing().await;
            }
            _ => {}
        }
        Ok(false)
    }

    // ============ Structure ============

    pub fn visible(&self) -> Vec<(usize, &StructureNode)> {
        visible_nodes(&self.tree, &|node| self.expanded.contains(&node.key()))
    }

    fn selected(&self) -> Option<StructureNode> {
        self.visible()
            .get(self.selected_node)
            .map(|(_, node)| (*node).clone())
    }

    fn select_key(&mut self, key: (NodeKind, i64)) {
        if let Some(i) = self.visible().iter().position(|(_, n)| n.key() == key) {
            self.selected_node = i;
        }
    }

    async fn load_structure(&mut self) {
        self.set_loading(true, "Loading structure...");

        let categories = match self.api.categories().await {
            Ok(c) => c,
            Err(e) => {
                self.set_loading(false, "");
                self.api_failed("Failed to load categories", e);
                return;
            }
        };
        let pages = match self.api.pages().await {
            Ok(p) => p,
            Err(e) => {
                self.set_loading(false, "");
                self.api_failed("Failed to load pages", e);
                return;
            }
        };

        self.tree = build_structure(&categories, &pages);
        let len = self.visible().len();
        self.selected_node = self.selected_node.min(len.saturating_sub(1));
        self.set_loading(false, "");
    }

    async fn handle_structure_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }

        if self.prompt.is_some() {
            self.handle_prompt_key(key).await;
            return Ok(false);
        }

        if let Some(node) = self.confirm_delete.take() {
            if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                self.delete_node(&node).await;
            }
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('L') => self.do_logout().await,
            KeyCode::Char('r') => self.load_structure().await,
            KeyCode::Char('n') => {
                let category_id = target_category(self.selected().as_ref());
                self.open_prompt(PromptKind::NewPage { category_id }, String::new());
            }
            KeyCode::Char('c') if self.require_manager() => {
                let parent_id = target_category(self.selected().as_ref());
                self.open_prompt(PromptKind::NewCategory { parent_id }, String::new());
            }
            KeyCode::Char('R') if self.require_manager() => match self.selected() {
                Some(node) if node.kind == NodeKind::Category => {
                    self.open_prompt(PromptKind::RenameCategory { id: node.id }, node.title);
                }
                _ => self.set_error("Select a category to rename".to_string()),
            },
            KeyCode::Char('D') => {
                match self.selected() {
                    Some(node) if node.kind == NodeKind::Category && !self.is_manager() => {
                        self.set_error(
                            "Only administrators and documentalistes can delete categories".to_string(),
                        );
                    }
                    Some(node) => self.confirm_delete = Some(node),
                    None => {}
                }
            }
            KeyCode::Char('S') if self.require_manager() => self.open_settings().await,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_node + 1 < self.visible().len() {
                    self.selected_node += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_node = self.selected_node.saturating_sub(1);
            }
            KeyCode::Char('J') => self.move_selected(Direction::Down).await,
            KeyCode::Char('K') => self.move_selected(Direction::Up).await,
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter => {
                let Some(node) = self.selected() else {
                    return Ok(false);
                };
                let node_key = node.key();
                let expanded = self.expanded.contains(&node_key);
                match node.kind {
                    // Enter toggles a category, l only opens it
                    NodeKind::Category => {
                        if key.code == KeyCode::Enter && expanded {
                            self.expanded.remove(&node_key);
                        } else {
                            self.expanded.insert(node_key);
                        }
                    }
                    // l unfolds sub-pages first, Enter always opens
                    NodeKind::Page
                        if key.code != KeyCode::Enter && !node.children.is_empty() && !expanded =>
                    {
                        self.expanded.insert(node_key);
                    }
                    NodeKind::Page => self.open_page(&node.slug).await,
                }
            }
            KeyCode::Char('h') | KeyCode::Left => {
                if let Some(node) = self.selected() {
                    self.expanded.remove(&node.key());
                }
            }
            _ => {}
        }

        Ok(false)
    }

    /// True for managers; everyone else gets an error popup.
    fn require_manager(&mut self) -> bool {
        if !self.is_manager() {
            self.set_error("Only administrators and documentalistes can do this".to_string());
        }
        self.is_manager()
    }

    fn open_prompt(&mut self, kind: PromptKind, input: String) {
        self.prompt = Some(Prompt { kind, input });
    }

    async fn handle_prompt_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.prompt = None,
            KeyCode::Enter => {
                if !prompt.input.trim().is_empty() {
                    let prompt = prompt.clone();
                    self.submit_prompt(prompt).await;
                }
            }
            KeyCode::Char(c) => prompt.input.push(c),
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            _ => {}
        }
    }

    async fn submit_prompt(&mut self, prompt: Prompt) {
        let text = prompt.input.trim().to_string();
        match prompt.kind {
            PromptKind::NewPage { category_id } => self.do_create_page(text, category_id).await,
            PromptKind::NewCategory { parent_id } => {
                let req = CreateCategoryRequest {
                    name: text,
                    parent_id,
                    ..Default::default()
                };
                self.set_loading(true, "Creating category...");
                let result = self.api.create_category(&req).await;
                self.set_loading(false, "");

                match result {
                    Ok(category) => {
                        tracing::info!("Created category {}", category.slug);
                        self.prompt = None;
                        if let Some(id) = parent_id {
                            self.expanded.insert((NodeKind::Category, id));
                        }
                        self.load_structure().await;
                        self.select_key((NodeKind::Category, category.id));
                    }
                    Err(e) => self.api_failed("Failed to create category", e),
                }
            }
            PromptKind::RenameCategory { id } => {
                let req = UpdateCategoryRequest {
                    name: Some(text),
                    ..Default::default()
                };
                self.set_loading(true, "Renaming category...");
                let result = self.api.update_category(id, &req).await;
                self.set_loading(false, "");

                match result {
                    Ok(category) => {
                        tracing::info!("Renamed category {} to {}", id, category.name);
                        self.prompt = None;
                        self.load_structure().await;
                        self.select_key((NodeKind::Category, id));
                    }
                    Err(e) => self.api_failed("Failed to rename category", e),
                }
            }
        }
    }

    /// Deleting a category detaches its pages and sub-categories to the top
    /// level; deleting a page does the same for its sub-pages.
    async fn delete_node(&mut self, node: &StructureNode) {
        self.set_loading(true, "Deleting...");
        let result = match node.kind {
            NodeKind::Category => self.api.delete_category(node.id).await,
            NodeKind::Page => self.api.delete_page(node.id).await,
        };
        self.set_loading(false, "");

        match result {
            Ok(_) => {
                tracing::info!("Deleted {:?} {}", node.kind, node.id);
                self.expanded.remove(&node.key());
                self.load_structure().await;
            }
            Err(ApiError::Forbidden) => {
                self.set_error("You can only delete your own pages".to_string());
            }
            Err(e) => self.api_failed("Failed to delete", e),
        }
    }

    async fn move_selected(&mut self, direction: Direction) {
        if !self.is_manager() {
            self.set_error("Only administrators and documentalistes can reorder".to_string());
            return;
        }
        let Some(node) = self.selected() else {
            return;
        };

        let plan = siblings_of(&self.tree, node.kind, node.id)
            .and_then(|siblings| plan_move(siblings, node.kind, node.id, direction));
        let Some(items) = plan else {
            return;
        };

        self.set_loading(true, "Reordering...");
        let result = self.api.reorder_structure(items).await;
        self.set_loading(false, "");

        match result {
            Ok(_) => {
                self.load_structure().await;
                self.select_key(node.key());
            }
            Err(e) => self.api_failed("Failed to reorder", e),
        }
    }

    async fn do_create_page(&mut self, title: String, category_id: Option<i64>) {
        let req = CreatePageRequest {
            title,
            category_id,
            ..Default::default()
        };

        self.set_loading(true, "Creating page...");
        let result = self.api.create_page(&req).await;
        self.set_loading(false, "");

        match result {
            Ok(page) => {
                tracing::info!("Created page {}", page.slug);
                self.prompt = None;
                if let Some(id) = category_id {
                    self.expanded.insert((NodeKind::Category, id));
                }
                self.load_structure().await;
                self.select_key((NodeKind::Page, page.id));
            }
            Err(e) => self.api_failed("Failed to create page", e),
        }
    }

    // ============ Page viewer ============

    async fn open_page(&mut self, slug: &str) {
        self.set_loading(true, "Loading page...");
        let result = self.api.page(slug).await;
        self.set_loading(false, "");

        match result {
            Ok(page) => self.show_page(page),
            Err(e) => self.api_failed("Failed to load page", e),
        }
    }

    fn show_page(&mut self, page: PageWithRelations) {
        match page.page.blocks() {
            Ok(blocks) => {
                self.page_blocks = render_document(&blocks);
                self.page = Some(page);
                self.selected_block = 0;
                self.activations.reset();
                self.lightbox = None;
                self.view = View::Page;
            }
            Err(e) => self.set_error(format!("Page content is unreadable: {}", e)),
        }
    }

    async fn handle_page_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.lightbox.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                self.lightbox = None;
            }
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc | KeyCode::Backspace => {
                self.page = None;
                self.view = View::Structure;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_block + 1 < selectable_blocks(&self.page_blocks).len() {
                    self.selected_block += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_block = self.selected_block.saturating_sub(1);
            }
            KeyCode::Enter => self.activate_selected(Instant::now()),
            KeyCode::Char('e') => self.start_editing().await,
            _ => {}
        }

        Ok(false)
    }

    /// Activate the selected block, which may sit inside a columns block.
    /// A double activation of an image opens the lightbox.
    fn activate_selected(&mut self, now: Instant) {
        let blocks = selectable_blocks(&self.page_blocks);
        let Some(block) = blocks.get(self.selected_block) else {
            return;
        };
        if let RenderNode::Image { url } = &block.node {
            if self.activations.activate(&block.id, now) {
                self.lightbox = Some(url.clone());
            }
        }
    }

    // ============ Settings ============

    async fn open_settings(&mut self) {
        self.set_loading(true, "Loading settings...");
        let result = self.api.settings().await;
        self.set_loading(false, "");

        match result {
            Ok(settings) => {
                self.settings = SettingsForm::from_settings(&settings);
                self.view = View::Settings;
            }
            Err(e) => self.api_failed("Failed to load settings", e),
        }
    }

    async fn handle_settings_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }

        let form = &mut self.settings;
        if form.editing_reason {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => form.editing_reason = false,
                KeyCode::Char(c) => {
                    form.reason.push(c);
                    form.dirty = true;
                }
                KeyCode::Backspace => {
                    form.reason.pop();
                    form.dirty = true;
                }
                _ => {}
            }
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('m') | KeyCode::Char(' ') => {
                form.maintenance = !form.maintenance;
                form.dirty = true;
            }
            KeyCode::Char('i') | KeyCode::Char('e') => form.editing_reason = true,
            KeyCode::Char('s') => self.save_settings().await,
            KeyCode::Char('r') => self.open_settings().await,
            KeyCode::Esc => {
                if form.dirty {
                    self.set_error("Unsaved settings: s to save, r to reload".to_string());
                } else {
                    self.view = View::Structure;
                }
            }
            _ => {}
        }

        Ok(false)
    }

    async fn save_settings(&mut self) {
        let req = self.settings.request();
        self.set_loading(true, "Saving settings...");
        let result = self.api.update_settings(&req).await;
        self.set_loading(false, "");

        match result {
            Ok(_) => {
                tracing::info!("Maintenance mode set to {}", self.settings.maintenance);
                self.settings.dirty = false;
                self.refresh_maintenance().await;
            }
            Err(e) => self.api_failed("Failed to save settings", e),
        }
    }

    // ============ Editor ============

    async fn start_editing(&mut self) {
        let Some(page) = &self.page else {
            return;
        };
        if !can_edit(self.user.as_ref(), page) {
            self.set_error("You can only edit your own pages".to_string());
            return;
        }

        match EditorState::open(&page.page) {
            Ok(state) => {
                self.editor = Some(state);
                self.view = View::Editor;
            }
            Err(e) => {
                self.set_error(format!("Page content is unreadable: {}", e));
                return;
            }
        }

        match self.api.tags().await {
            Ok(tags) => self.tags = tags,
            Err(e) => tracing::warn!("Could not load tags: {}", e),
        }
    }

    async fn handle_editor_key(&mut self, key: KeyEvent) -> Result<bool> {
        let Some(mode) = self.editor.as_ref().map(|e| e.mode) else {
            self.view = View::Page;
            return Ok(false);
        };

        match mode {
            EditMode::Insert => self.handle_insert_key(key),
            EditMode::Picker(_) => self.handle_picker_key(key),
            EditMode::Normal => return self.handle_editor_normal_key(key).await,
        }
        Ok(false)
    }

    fn handle_insert_key(&mut self, key: KeyEvent) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let result = match key.code {
            KeyCode::Esc => {
                editor.mode = EditMode::Normal;
                Ok(())
            }
            KeyCode::Enter => editor.enter(),
            KeyCode::Backspace => editor.backspace(),
            KeyCode::Char(c) => editor.type_char(c),
            _ => Ok(()),
        };
        if let Err(e) = result {
            self.set_error(e.to_string());
        }
    }

    fn handle_picker_key(&mut self, key: KeyEvent) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let result = match key.code {
            KeyCode::Esc => {
                editor.mode = EditMode::Normal;
                Ok(())
            }
            KeyCode::Char('j') | KeyCode::Down => {
                editor.move_picker(true);
                Ok(())
            }
            KeyCode::Char('k') | KeyCode::Up => {
                editor.move_picker(false);
                Ok(())
            }
            KeyCode::Enter => editor.pick(),
            _ => Ok(()),
        };
        if let Err(e) = result {
            editor.mode = EditMode::Normal;
            self.set_error(e.to_string());
        }
    }

    async fn handle_editor_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        let Some(editor) = self.editor.as_mut() else {
            return Ok(false);
        };

        let result = match key.code {
            KeyCode::Char('s') => {
                self.save_page().await;
                return Ok(false);
            }
            KeyCode::Char('E') => {
                self.edit_externally();
                return Ok(false);
            }
            KeyCode::Esc => {
                if !editor.ascend() {
                    if editor.dirty {
                        self.set_error("Unsaved changes: s to save, Q to discard".to_string());
                    } else {
                        self.close_editor().await;
                    }
                }
                return Ok(false);
            }
            KeyCode::Char('Q') => {
                self.close_editor().await;
                return Ok(false);
            }
            KeyCode::Char('j') | KeyCode::Down => {
                editor.move_cursor(true);
                Ok(())
            }
            KeyCode::Char('k') | KeyCode::Up => {
                editor.move_cursor(false);
                Ok(())
            }
            KeyCode::Char('J') => editor.move_block(true),
            KeyCode::Char('K') => editor.move_block(false),
            KeyCode::Char('a') => {
                editor.open_picker(PickTarget::After);
                Ok(())
            }
            KeyCode::Char('A') => {
                editor.open_picker(PickTarget::End);
                Ok(())
            }
            KeyCode::Char('i') | KeyCode::Enter => {
                match editor.current().map(|b| b.block_type()) {
                    Some(BlockType::Table) => {
                        self.edit_externally();
                        return Ok(false);
                    }
                    Some(BlockType::Columns) => {
                        editor.descend();
                    }
                    Some(_) if editor.current().and_then(|b| b.content()).is_some() => {
                        editor.mode = EditMode::Insert;
                    }
                    _ => {}
                }
                Ok(())
            }
            KeyCode::Char('d') => editor.delete_current(),
            KeyCode::Char('x') => editor.toggle_todo(),
            KeyCode::Char('f') => editor.cycle_font_size(),
            KeyCode::Char('F') => editor.reset_font_size(),
            KeyCode::Char('c') => editor.add_column(),
            KeyCode::Char('C') => editor.remove_column(),
            KeyCode::Tab => {
                editor.next_column();
                Ok(())
            }
            KeyCode::Char('l') | KeyCode::Right => {
                editor.descend();
                Ok(())
            }
            KeyCode::Char('h') | KeyCode::Left => {
                editor.ascend();
                Ok(())
            }
            KeyCode::Char('r') => editor.add_table_row(),
            KeyCode::Char('R') => editor.add_table_column(),
            KeyCode::Char('t') => {
                editor.cycle_tag(&self.tags);
                Ok(())
            }
            KeyCode::Char('p') => {
                editor.preview = !editor.preview;
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            self.set_error(e.to_string());
        }
        Ok(false)
    }

    /// Hand long content to `$EDITOR`: tables as TSV, everything else as text.
    fn edit_externally(&mut self) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let Some((ty, text)) = editor.current().and_then(|block| match &block.kind {
            BlockKind::Table { table_data } => Some((BlockType::Table, grid_to_tsv(table_data))),
            kind => kind.content().map(|c| (block.block_type(), c.to_string())),
        }) else {
            return;
        };

        let ext = match ty {
            BlockType::Table => ".tsv",
            BlockType::Code => ".txt",
            _ => ".md",
        };
        let result = launch_external_editor(&text, ext).and_then(|edited| {
            let applied = if ty == BlockType::Table {
                editor.set_current_table(tsv_to_grid(&edited))
            } else {
                editor.set_current_content(trim_trailing_newline(&edited))
            };
            applied.map_err(anyhow::Error::from)
        });

        self.needs_terminal_clear = true;
        if let Err(e) = result {
            self.set_error(format!("External editor: {}", e));
        }
    }

    async fn save_page(&mut self) {
        let Some(editor) = &self.editor else {
            return;
        };
        let page_id = editor.page_id;
        let req = match editor.update_request() {
            Ok(req) => req,
            Err(e) => {
                self.set_error(format!("Could not encode page: {}", e));
                return;
            }
        };

        self.set_loading(true, "Saving...");
        let result = self.api.update_page(page_id, &req).await;
        self.set_loading(false, "");

        match result {
            Ok(page) => {
                tracing::info!("Saved page {}", page.slug);
                if let Some(editor) = self.editor.as_mut() {
                    editor.dirty = false;
                }
            }
            Err(e) => self.api_failed("Failed to save page", e),
        }
    }

    /// Leave the editor and show the stored version of the page.
    async fn close_editor(&mut self) {
        let Some(editor) = self.editor.take() else {
            return;
        };
        self.open_page(&editor.page_id.to_string()).await;
        if self.view == View::Editor {
            self.view = View::Page;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiki_shared::{Page, Role};

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn offline_app() -> (App, mpsc::Sender<AppEvent>) {
        let (tx, _rx) = mpsc::channel(8);
        (App::new(ApiClient::new("http://127.0.0.1:9")), tx)
    }

    fn with_content(content: Value) -> PageWithRelations {
        let mut page = page_by(1);
        page.page.content = Some(content);
        page
    }

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            username: format!("user{id}"),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn page_by(owner: i64) -> PageWithRelations {
        PageWithRelations {
            page: Page {
                id: 1,
                title: "Guide".into(),
                slug: "guide".into(),
                content: None,
                user_id: owner,
                parent_id: None,
                category_id: None,
                order: 0,
                icon: None,
                tag: None,
                tag_color: None,
                is_published: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            user: None,
            children: Vec::new(),
            category: None,
        }
    }

    fn maintenance(on: bool) -> MaintenanceStatus {
        MaintenanceStatus {
            maintenance: on,
            message: "Upgrading".into(),
        }
    }

    #[test]
    fn anonymous_sessions_land_on_login() {
        assert_eq!(landing_view(&maintenance(false), None), View::Login);
        assert_eq!(landing_view(&maintenance(true), None), View::Login);
    }

    #[test]
    fn maintenance_blocks_everyone_but_admins() {
        let on = maintenance(true);
        assert_eq!(landing_view(&on, Some(&user(1, Role::User))), View::Maintenance);
        assert_eq!(landing_view(&on, Some(&user(2, Role::Documentaliste))), View::Maintenance);
        assert_eq!(landing_view(&on, Some(&user(3, Role::Admin))), View::Structure);
        assert_eq!(
            landing_view(&maintenance(false), Some(&user(1, Role::User))),
            View::Structure
        );
    }

    #[test]
    fn only_owners_and_managers_edit() {
        let page = page_by(5);
        assert!(can_edit(Some(&user(5, Role::User)), &page));
        assert!(!can_edit(Some(&user(6, Role::User)), &page));
        assert!(can_edit(Some(&user(6, Role::Documentaliste)), &page));
        assert!(can_edit(Some(&user(7, Role::Admin)), &page));
        assert!(!can_edit(None, &page));
    }

    #[tokio::test]
    async fn images_inside_columns_open_the_lightbox() {
        let (mut app, tx) = offline_app();
        app.show_page(with_content(json!([
            {"id": "top", "type": "image", "content": "http://x/top.png"},
            {"id": "cols", "type": "columns", "columns": [
                {"id": "l", "blocks": [{"id": "inner", "type": "image", "content": "http://x/inner.png"}]},
                {"id": "r", "blocks": []},
            ]},
        ])));
        assert_eq!(app.view, View::Page);

        for _ in 0..2 {
            app.handle_key(press(KeyCode::Enter), tx.clone()).await.unwrap();
        }
        assert_eq!(app.lightbox.as_deref(), Some("http://x/top.png"));
        app.handle_key(press(KeyCode::Esc), tx.clone()).await.unwrap();
        assert!(app.lightbox.is_none());

        // top, cols, inner
        for _ in 0..5 {
            app.handle_key(press(KeyCode::Char('j')), tx.clone()).await.unwrap();
        }
        assert_eq!(app.selected_block, 2);

        app.handle_key(press(KeyCode::Enter), tx.clone()).await.unwrap();
        assert!(app.lightbox.is_none());
        app.handle_key(press(KeyCode::Enter), tx.clone()).await.unwrap();
        assert_eq!(app.lightbox.as_deref(), Some("http://x/inner.png"));
    }

    #[tokio::test]
    async fn sub_pages_unfold_below_their_parent() {
        let (mut app, tx) = offline_app();
        app.view = View::Structure;
        let mut parent = page_by(1);
        let mut child = parent.page.clone();
        child.id = 2;
        child.title = "Child".into();
        child.parent_id = Some(1);
        parent.children = vec![child];
        app.tree = build_structure(&[], &[parent]);
        assert_eq!(app.visible().len(), 1);

        app.handle_key(press(KeyCode::Char('l')), tx.clone()).await.unwrap();
        assert!(app.expanded.contains(&(NodeKind::Page, 1)));
        app.handle_key(press(KeyCode::Char('j')), tx.clone()).await.unwrap();
        let (depth, node) = app.visible()[app.selected_node];
        assert_eq!((depth, node.title.as_str()), (1, "Child"));

        app.handle_key(press(KeyCode::Char('k')), tx.clone()).await.unwrap();
        app.handle_key(press(KeyCode::Char('h')), tx.clone()).await.unwrap();
        assert_eq!(app.visible().len(), 1);
    }

    fn category_node(id: i64) -> StructureNode {
        StructureNode {
            id,
            kind: NodeKind::Category,
            title: "Docs".into(),
            slug: "docs".into(),
            order: 0,
            children: Vec::new(),
        }
    }

    #[tokio::test]
    async fn category_management_is_for_managers() {
        let (mut app, tx) = offline_app();
        app.view = View::Structure;
        app.tree = vec![category_node(4)];
        app.user = Some(user(1, Role::User));

        app.handle_key(press(KeyCode::Char('c')), tx.clone()).await.unwrap();
        assert!(app.prompt.is_none());
        assert!(app.error_message.is_some());
        app.handle_key(press(KeyCode::Char('D')), tx.clone()).await.unwrap();
        assert!(app.confirm_delete.is_none());

        app.user = Some(user(2, Role::Documentaliste));
        app.handle_key(press(KeyCode::Char('c')), tx.clone()).await.unwrap();
        assert_eq!(
            app.prompt.as_ref().map(|p| &p.kind),
            Some(&PromptKind::NewCategory { parent_id: Some(4) })
        );
        for c in "Guides".chars() {
            app.handle_key(press(KeyCode::Char(c)), tx.clone()).await.unwrap();
        }
        assert_eq!(app.prompt.as_ref().map(|p| p.input.as_str()), Some("Guides"));
        app.handle_key(press(KeyCode::Esc), tx.clone()).await.unwrap();
        assert!(app.prompt.is_none());

        app.handle_key(press(KeyCode::Char('R')), tx.clone()).await.unwrap();
        let prompt = app.prompt.take().unwrap();
        assert_eq!(prompt.kind, PromptKind::RenameCategory { id: 4 });
        assert_eq!(prompt.input, "Docs");

        // Anything but y cancels the deletion.
        app.handle_key(press(KeyCode::Char('D')), tx.clone()).await.unwrap();
        assert_eq!(app.confirm_delete.as_ref().map(|n| n.id), Some(4));
        app.handle_key(press(KeyCode::Char('n')), tx.clone()).await.unwrap();
        assert!(app.confirm_delete.is_none());
        assert!(app.prompt.is_none());
    }

    #[test]
    fn new_nodes_go_into_the_selected_category() {
        assert_eq!(target_category(Some(&category_node(3))), Some(3));
        let page = StructureNode {
            kind: NodeKind::Page,
            ..category_node(3)
        };
        assert_eq!(target_category(Some(&page)), None);
        assert_eq!(target_category(None), None);
    }

    #[test]
    fn settings_form_reads_and_writes_maintenance() {
        let stored = BTreeMap::from([
            (MAINTENANCE_MODE_KEY.to_string(), Some("true".to_string())),
            (MAINTENANCE_REASON_KEY.to_string(), Some("Upgrading".to_string())),
        ]);
        let mut form = SettingsForm::from_settings(&stored);
        assert!(form.maintenance);
        assert_eq!(form.reason, "Upgrading");

        form.maintenance = false;
        let req = form.request();
        assert_eq!(req.settings[MAINTENANCE_MODE_KEY], json!("false"));
        assert_eq!(req.settings[MAINTENANCE_REASON_KEY], json!("Upgrading"));

        let empty = SettingsForm::from_settings(&BTreeMap::new());
        assert!(!empty.maintenance);
        assert_eq!(empty.reason, "");
    }
}
