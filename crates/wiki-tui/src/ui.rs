use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use wiki_shared::{BlockKind, NodeKind, Role};

use crate::app::{App, InputField, Prompt, View, VimMode};
use crate::page_editor::{EditMode, EditorState};
use crate::render::document_lines;

pub fn draw(f: &mut Frame, app: &App) {
    match app.view {
        View::VerifyingAuth => draw_loading(f, "Connecting..."),
        View::Login => draw_login(f, app),
        View::Maintenance => draw_maintenance(f, app),
        View::Structure => draw_structure(f, app),
        View::Page => draw_page(f, app),
        View::Editor => draw_editor(f, app),
        View::Settings => draw_settings(f, app),
    }

    if let Some(ref error) = app.error_message {
        draw_error_popup(f, error);
    }

    if app.loading {
        draw_loading_overlay(f, &app.loading_message);
    }
}

fn role_color(role: Role) -> Color {
    match role {
        Role::Admin => Color::Red,
        Role::Documentaliste => Color::Magenta,
        Role::User => Color::Yellow,
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App, title: &str) {
    let mut spans = vec![
        Span::styled("WIKI", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::raw(title.to_string()),
    ];
    if let Some(user) = &app.user {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("{} ({})", user.username, user.role.as_str()),
            Style::default().fg(role_color(user.role)),
        ));
    }
    if app.maintenance.maintenance {
        spans.push(Span::styled(
            "  [maintenance]",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, area);
}

fn draw_status_bar(f: &mut Frame, area: Rect, mode: &str, mode_color: Color, hints: &str) {
    let status = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {} ", mode), Style::default().bg(mode_color).fg(Color::White)),
        Span::raw(" "),
        Span::styled(hints.to_string(), Style::default().fg(Color::DarkGray)),
    ]));
    f.render_widget(status, area);
}

fn main_layout(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(1), // Status bar
        ])
        .split(area)
}

fn draw_login(f: &mut Frame, app: &App) {
    let area = f.area();

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Length(12),
            Constraint::Percentage(25),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(50),
            Constraint::Percentage(25),
        ])
        .split(vertical[1]);

    let form_area = horizontal[1];
    let form_block = Block::default()
        .title(" Login ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = form_block.inner(form_area);
    f.render_widget(form_block, form_area);

    let form_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Username
            Constraint::Length(3), // Password
            Constraint::Length(2), // Submit hint
            Constraint::Min(0),
        ])
        .split(inner);

    let field_style = |field: InputField| {
        if app.login_field == field {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        }
    };

    let username = Paragraph::new(app.login_username.as_str()).block(
        Block::default()
            .title(" Username ")
            .borders(Borders::ALL)
            .border_style(field_style(InputField::Username)),
    );
    f.render_widget(username, form_chunks[0]);

    let masked = "*".repeat(app.login_password.chars().count());
    let password = Paragraph::new(masked.as_str()).block(
        Block::default()
            .title(" Password ")
            .borders(Borders::ALL)
            .border_style(field_style(InputField::Password)),
    );
    f.render_widget(password, form_chunks[1]);

    let mode_text = match app.vim_mode {
        VimMode::Normal => "'i' edit | Tab switch field | Enter submit | 'q' quit",
        VimMode::Insert => "Type to enter | Esc normal | Enter submit",
    };
    let hint = Paragraph::new(mode_text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, form_chunks[2]);

    if app.vim_mode == VimMode::Insert {
        let (chunk, len) = match app.login_field {
            InputField::Username => (form_chunks[0], app.login_username.chars().count()),
            InputField::Password => (form_chunks[1], app.login_password.chars().count()),
        };
        f.set_cursor_position((chunk.x + 1 + len as u16, chunk.y + 1));
    }
}

fn draw_maintenance(f: &mut Frame, app: &App) {
    let chunks = main_layout(f.area());
    draw_header(f, chunks[0], app, "Maintenance");

    let message = if app.maintenance.message.is_empty() {
        "The wiki is under maintenance."
    } else {
        app.maintenance.message.as_str()
    };
    let text = Paragraph::new(vec![
        Line::from(Span::styled(
            "Maintenance in progress",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(message.to_string()),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Red)));
    f.render_widget(text, centered_rect(60, 40, chunks[1]));

    draw_status_bar(f, chunks[2], "LOCKED", Color::Red, "r: retry | L: logout | q: quit");
}

fn draw_structure(f: &mut Frame, app: &App) {
    let chunks = main_layout(f.area());
    draw_header(f, chunks[0], app, "Structure");

    let items: Vec<ListItem> = app
        .visible()
        .into_iter()
        .enumerate()
        .map(|(i, (depth, node))| {
            let indent = "  ".repeat(depth);
            let expanded = app.expanded.contains(&node.key());
            let (icon, icon_color) = match node.kind {
                NodeKind::Category if node.children.is_empty() => ("▫ ", Color::Blue),
                NodeKind::Category if expanded => ("▾ ", Color::Blue),
                NodeKind::Category => ("▸ ", Color::Blue),
                NodeKind::Page if node.children.is_empty() => ("· ", Color::Gray),
                NodeKind::Page if expanded => ("▾ ", Color::Gray),
                NodeKind::Page => ("▸ ", Color::Gray),
            };
            let style = if i == app.selected_node {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else if node.kind == NodeKind::Category {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!(" {indent}")),
                Span::styled(icon, Style::default().fg(icon_color)),
                Span::styled(node.title.clone(), style),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Categories & pages ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, chunks[1]);

    let hints = if app.is_manager() {
        "j/k | l/Enter: open | h: collapse | J/K: move | n: page | c: category | R: rename | D: delete | S: settings | r: refresh | L: logout | q: quit"
    } else {
        "j/k: select | l/Enter: open | h: collapse | n: new page | D: delete | r: refresh | L: logout | q: quit"
    };
    draw_status_bar(f, chunks[2], "NORMAL", Color::Blue, hints);

    if let Some(prompt) = &app.prompt {
        draw_prompt_popup(f, prompt);
    }
    if let Some(node) = &app.confirm_delete {
        let what = match node.kind {
            NodeKind::Category => "category",
            NodeKind::Page => "page",
        };
        draw_confirm_popup(f, &format!("Delete {what} \"{}\"? Its contents move to the top level.", node.title));
    }
}

fn draw_prompt_popup(f: &mut Frame, prompt: &Prompt) {
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(prompt.kind.title())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(3), Constraint::Length(2), Constraint::Min(0)])
        .split(inner);

    let input = Paragraph::new(prompt.input.as_str()).block(
        Block::default()
            .title(prompt.kind.label())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(input, chunks[0]);

    let hint = Paragraph::new("Enter: confirm | Esc: cancel")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, chunks[1]);

    f.set_cursor_position((
        chunks[0].x + 1 + prompt.input.chars().count() as u16,
        chunks[0].y + 1,
    ));
}

fn draw_confirm_popup(f: &mut Frame, question: &str) {
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);

    let text = Paragraph::new(vec![
        Line::from(question.to_string()),
        Line::default(),
        Line::from(Span::styled("y: yes | any other key: no", Style::default().fg(Color::DarkGray))),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .title(" Confirm ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(text, area);
}

fn draw_settings(f: &mut Frame, app: &App) {
    let chunks = main_layout(f.area());
    draw_header(f, chunks[0], app, "Settings");
    let form = &app.settings;

    let body = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(3), Constraint::Length(5), Constraint::Min(0)])
        .split(chunks[1]);

    let (state, color) = if form.maintenance {
        ("ON  (only administrators can use the wiki)", Color::Red)
    } else {
        ("OFF", Color::Green)
    };
    let switch = Paragraph::new(Line::from(vec![
        Span::raw("Maintenance mode: "),
        Span::styled(state, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(switch, body[0]);

    let border = if form.editing_reason { Color::Yellow } else { Color::DarkGray };
    let reason = Paragraph::new(form.reason.as_str())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(" Maintenance message ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        );
    f.render_widget(reason, body[1]);

    if form.editing_reason {
        f.set_cursor_position((
            body[1].x + 1 + form.reason.chars().count() as u16,
            body[1].y + 1,
        ));
    }

    let (mode, mode_color, hints) = if form.editing_reason {
        ("INSERT", Color::Green, "Enter/Esc: done")
    } else {
        ("NORMAL", Color::Blue, "m: toggle maintenance | i: edit message | s: save | r: reload | Esc: back | q: quit")
    };
    let mode = if form.dirty && !form.editing_reason { "MODIFIED" } else { mode };
    draw_status_bar(f, chunks[2], mode, mode_color, hints);
}

fn tag_span(tag: &str, color: &str) -> Span<'static> {
    let bg = parse_hex_color(color).unwrap_or(Color::Indexed(62));
    Span::styled(format!(" {tag} "), Style::default().bg(bg).fg(Color::White))
}

/// `#rrggbb` into an RGB color.
fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

fn draw_page(f: &mut Frame, app: &App) {
    let chunks = main_layout(f.area());
    let Some(page) = &app.page else {
        return;
    };
    draw_header(f, chunks[0], app, &page.page.title);

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[1]);

    let mut meta = Vec::new();
    if let Some(tag) = &page.page.tag {
        meta.push(tag_span(tag, page.page.tag_color.as_deref().unwrap_or_default()));
        meta.push(Span::raw(" "));
    }
    if let Some(category) = &page.category {
        meta.push(Span::styled(format!("in {} ", category.name), Style::default().fg(Color::Blue)));
    }
    if let Some(author) = &page.user {
        meta.push(Span::styled(format!("by {} ", author.username), Style::default().fg(Color::DarkGray)));
    }
    meta.push(Span::styled(
        format!("updated {}", page.page.updated_at.format("%Y-%m-%d %H:%M")),
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(Paragraph::new(Line::from(meta)), body[0]);

    let rendered = document_lines(&app.page_blocks);
    let selected = rendered.ranges.get(app.selected_block).cloned().unwrap_or(0..0);
    let selected_start = selected.start;

    let lines: Vec<Line> = rendered
        .lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let gutter = if selected.contains(&i) && !line.spans.is_empty() {
                Span::styled("▌ ", Style::default().fg(Color::Yellow))
            } else {
                Span::raw("  ")
            };
            let mut spans = vec![gutter];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect();

    let height = body[1].height.saturating_sub(2);
    let scroll = selected_start.saturating_sub(usize::from(height / 3)) as u16;
    let content = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(content, body[1]);

    draw_status_bar(
        f,
        chunks[2],
        "VIEW",
        Color::Blue,
        "j/k: select block | Enter Enter: open image | e: edit | Esc: back | q: quit",
    );

    if let Some(url) = &app.lightbox {
        draw_lightbox(f, url);
    }
}

fn draw_lightbox(f: &mut Frame, url: &str) {
    let area = centered_rect(90, 80, f.area());
    f.render_widget(Clear, area);

    let text = Paragraph::new(vec![
        Line::default(),
        Line::from(Span::styled(url.to_string(), Style::default().add_modifier(Modifier::UNDERLINED))),
        Line::default(),
        Line::from(Span::styled("Esc to close", Style::default().fg(Color::DarkGray))),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .title(" Image ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    f.render_widget(text, area);
}

/// One-line summary of a block for the editor outline.
fn block_summary(editor: &EditorState, block: &wiki_shared::Block, selected: bool) -> Line<'static> {
    let ty = block.block_type();
    let label = format!("{:<8}", ty.as_str());
    let body = match &block.kind {
        BlockKind::Todo { content, checked } => {
            format!("[{}] {}", if *checked { "x" } else { " " }, content)
        }
        BlockKind::Columns { columns } => columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let marker = if selected && i == editor.column { "*" } else { "" };
                format!("{marker}col{} ({} blocks)", i + 1, c.blocks.len())
            })
            .collect::<Vec<_>>()
            .join(" | "),
        BlockKind::Table { table_data } => format!(
            "{}x{} table",
            table_data.len(),
            table_data.first().map(Vec::len).unwrap_or(0)
        ),
        BlockKind::Divider => "────".to_string(),
        kind => kind.content().unwrap_or_default().replace('\n', " ⏎ "),
    };

    let body_style = if selected {
        Style::default().bg(Color::DarkGray).fg(Color::White)
    } else {
        Style::default()
    };
    let mut spans = vec![
        Span::styled(if selected { "> " } else { "  " }, Style::default().fg(Color::Yellow)),
        Span::styled(label, Style::default().fg(Color::Cyan)),
        Span::styled(body, body_style),
    ];
    if let Some(size) = block.font_size {
        spans.push(Span::styled(format!("  [{}]", size.as_str()), Style::default().fg(Color::DarkGray)));
    }
    if selected && editor.mode == EditMode::Insert {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn draw_editor(f: &mut Frame, app: &App) {
    let chunks = main_layout(f.area());
    let Some(editor) = &app.editor else {
        return;
    };
    let dirty = if editor.dirty { " *" } else { "" };
    draw_header(f, chunks[0], app, &format!("Editing {} ({}){}", editor.title, editor.slug, dirty));

    let panes = if editor.preview {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1])
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(100)])
            .split(chunks[1])
    };

    let lines: Vec<Line> = editor
        .sequence()
        .iter()
        .enumerate()
        .map(|(i, block)| block_summary(editor, block, i == editor.cursor))
        .collect();

    let location = if editor.is_nested() {
        let steps = editor
            .path
            .steps()
            .iter()
            .map(|(b, c)| format!("block {} / column {}", b + 1, c + 1))
            .collect::<Vec<_>>()
            .join(" > ");
        format!(" {steps} ")
    } else {
        " Blocks ".to_string()
    };
    let mut title = vec![Span::raw(location)];
    if let Some((name, color)) = &editor.tag {
        title.push(tag_span(name, color));
    }

    let height = panes[0].height.saturating_sub(2) as usize;
    let scroll = editor.cursor.saturating_sub(height / 2) as u16;
    let outline = Paragraph::new(lines).scroll((scroll, 0)).block(
        Block::default()
            .title(Line::from(title))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(outline, panes[0]);

    if editor.preview {
        let rendered = document_lines(&editor.preview_blocks());
        let preview = Paragraph::new(rendered.lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .title(" Preview ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
        f.render_widget(preview, panes[1]);
    }

    let (mode, color, hints) = match editor.mode {
        EditMode::Normal => (
            "NORMAL",
            Color::Blue,
            "i: edit | a/A: add | d: delete | J/K: move | x: todo | f/F: size | c/C/Tab/l/h: columns | r/R: table | E: $EDITOR | t: tag | p: preview | s: save | Esc: close",
        ),
        EditMode::Insert => ("INSERT", Color::Green, "Type to edit | Enter: next block | Esc: normal"),
        EditMode::Picker(_) => ("PICK", Color::Magenta, "j/k: choose | Enter: insert | Esc: cancel"),
    };
    draw_status_bar(f, chunks[2], mode, color, hints);

    if matches!(editor.mode, EditMode::Picker(_)) {
        draw_block_picker(f, editor);
    }
}

fn draw_block_picker(f: &mut Frame, editor: &EditorState) {
    let area = centered_rect(30, 60, f.area());
    f.render_widget(Clear, area);

    let items: Vec<ListItem> = editor
        .picker_types()
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let style = if i == editor.picker_index {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(format!("  {}", ty.as_str()), style)))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Insert block ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    f.render_widget(list, area);
}

fn draw_loading(f: &mut Frame, message: &str) {
    let area = f.area();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(block, area);

    let text = Paragraph::new(message)
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);
    f.render_widget(text, centered_rect(50, 20, area));
}

fn draw_loading_overlay(f: &mut Frame, message: &str) {
    let area = centered_rect(40, 10, f.area());
    f.render_widget(Clear, area);

    let text = Paragraph::new(message)
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(" Loading ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
    f.render_widget(text, area);
}

fn draw_error_popup(f: &mut Frame, error: &str) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);

    let text = Paragraph::new(error)
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(" Error ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        );
    f.render_widget(text, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
