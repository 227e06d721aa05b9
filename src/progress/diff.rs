//! 快照比较 - 找出新增和变化的条目

use std::collections::HashMap;

use super::snapshot::{Progress, SnapshotItem};

/// 比较结果中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry<V> {
    pub title: String,
    pub link: Option<String>,
    pub old_value: V,
    pub new_value: V,
    pub is_new: bool,
}

impl<V: PartialEq> DiffEntry<V> {
    /// 新条目或值发生变化
    pub fn is_changed(&self) -> bool {
        self.is_new || self.old_value != self.new_value
    }
}

/// 进度条比较结果
pub type ProgressDiff = Vec<DiffEntry<i32>>;

/// 比较两个快照
///
/// 结果按 `new` 的顺序排列，未变化的条目也保留（渲染时作为上下文）。
/// 只在 `old` 中出现的条目不参与比较：条目消失不算变化。
/// 没有任何新增或变化时返回 `None`。
pub fn diff<T: SnapshotItem>(old: &[T], new: &[T]) -> Option<Vec<DiffEntry<T::Value>>> {
    // 重复 title 时后出现的覆盖先出现的
    let old_keyed: HashMap<&str, &T> = old.iter().map(|item| (item.key(), item)).collect();

    let entries: Vec<DiffEntry<T::Value>> = new
        .iter()
        .map(|item| {
            let previous = old_keyed.get(item.key());
            DiffEntry {
                title: item.key().to_string(),
                link: item.link().map(str::to_string),
                old_value: previous.map(|p| p.value()).unwrap_or_default(),
                new_value: item.value(),
                is_new: previous.is_none(),
            }
        })
        .collect();

    if entries.iter().any(DiffEntry::is_changed) {
        Some(entries)
    } else {
        None
    }
}

/// [`diff`] 针对进度条的便捷形式
pub fn diff_progress(old: &[Progress], new: &[Progress]) -> Option<ProgressDiff> {
    diff(old, new)
}
