//! 进度通知格式化 - 将差异渲染为 Discord markdown

use super::diff::DiffEntry;

/// 每个方块代表的百分比
const BLOCK_SIZE: f64 = 2.5;
/// 进度条总方块数
const BLOCK_COUNT: usize = 40;

const FULL_BLOCK: &str = "█";
const EMPTY_BLOCK: &str = "░";

/// 渲染整个差异，条目之间空一行，顺序与差异一致
pub fn render(diff: &[DiffEntry<i32>]) -> String {
    diff.iter().map(render_entry).collect::<Vec<_>>().join("\n\n")
}

/// 渲染单个进度条
///
/// ```text
/// **[Changed] [Title](link) (50% → 75%)**
/// `██████████████████████████████░░░░░░░░░░  75%`
/// ```
pub fn render_entry(entry: &DiffEntry<i32>) -> String {
    let mut title = match &entry.link {
        Some(link) => format!("[{}]({})", entry.title, link),
        None => entry.title.clone(),
    };

    if entry.is_new {
        title = format!("[New] {title}");
    } else if entry.new_value != entry.old_value {
        title = format!(
            "[Changed] {title} ({}% → {}%)",
            entry.old_value, entry.new_value
        );
    }

    format!("**{title}**\n`{} {:>3}%`", render_bar(entry.new_value), entry.new_value)
}

/// 固定宽度的进度条，超出 0..=100 的值按边界截断
pub fn render_bar(value: i32) -> String {
    let full = ((f64::from(value) / BLOCK_SIZE).floor().max(0.0) as usize).min(BLOCK_COUNT);
    format!("{}{}", FULL_BLOCK.repeat(full), EMPTY_BLOCK.repeat(BLOCK_COUNT - full))
}
