use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::fs::flatten::FlatRow;
use crate::fs::tree::{Tree, TreeNode};

const SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const SELECTED_FG: Color = Color::Rgb(205, 214, 244);
const DIR_FG: Color = Color::Rgb(137, 180, 250);
const FILE_FG: Color = Color::Rgb(205, 214, 244);
const MUTED_FG: Color = Color::Rgb(127, 132, 156);

/// Tree widget that renders flattened rows with box-drawing characters.
pub struct TreeWidget<'a> {
    tree: &'a Tree,
    rows: &'a [FlatRow],
    selected: Option<usize>,
    use_icons: bool,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(tree: &'a Tree, rows: &'a [FlatRow], use_icons: bool) -> Self {
        Self {
            tree,
            rows,
            selected: None,
            use_icons,
            block: None,
        }
    }

    pub fn selected(mut self, index: usize) -> Self {
        self.selected = Some(index);
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }

    /// Continuation lines for every ancestor, then this row's connector.
    fn build_prefix(row: &FlatRow) -> String {
        let mut prefix = String::new();
        for &ancestor_last in &row.ancestors_last {
            prefix.push_str(if ancestor_last { "   " } else { "│  " });
        }
        prefix.push_str(if row.is_last { "└── " } else { "├── " });
        prefix
    }

    /// Get the directory/file indicator.
    fn item_indicator(&self, node: &TreeNode) -> &'static str {
        match (self.use_icons, node.is_dir) {
            (true, true) if node.expanded => "\u{f115} ",
            (true, true) => "\u{f114} ",
            (true, false) => "\u{f15b} ",
            (false, true) if node.opaque => "[+] ",
            (false, true) => "[D] ",
            (false, false) => "[F] ",
        }
    }

    fn label(node: &TreeNode, row: &FlatRow) -> String {
        let mut label = node.name.clone();
        if node.loading {
            label.push_str(" (loading…)");
        } else if node.is_dir && row.file_count > 0 {
            label.push_str(&format!(" ({})", row.file_count));
        }
        label
    }

    fn style(node: &TreeNode, is_selected: bool) -> Style {
        if is_selected {
            Style::default()
                .bg(SELECTED_BG)
                .fg(SELECTED_FG)
                .add_modifier(Modifier::BOLD)
        } else if node.loading {
            Style::default().fg(MUTED_FG).add_modifier(Modifier::ITALIC)
        } else if node.is_dir {
            Style::default().fg(DIR_FG).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(FILE_FG)
        }
    }
}

/// First row to draw so that `selected` stays inside a window of `height`.
fn scroll_offset(selected: Option<usize>, height: usize) -> usize {
    match selected {
        Some(idx) if idx >= height => idx + 1 - height,
        _ => 0,
    }
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };

        let visible_height = inner_area.height as usize;
        if self.rows.is_empty() || visible_height == 0 {
            return;
        }

        let scroll = scroll_offset(self.selected, visible_height);
        let visible_rows = self.rows.iter().enumerate().skip(scroll).take(visible_height);

        for (i, (idx, row)) in visible_rows.enumerate() {
            let y = inner_area.y + i as u16;
            let node = self.tree.node(row.node);

            let line = Line::from(vec![
                Span::styled(Self::build_prefix(row), Style::default().fg(MUTED_FG)),
                Span::styled(
                    format!("{}{}", self.item_indicator(node), Self::label(node, row)),
                    Self::style(node, self.selected == Some(idx)),
                ),
            ]);
            buf.set_line(inner_area.x, y, &line, inner_area.width);
        }
    }
}
