//! 进度变化检测 - 快照比较、去抖状态机与通知渲染
//!
//! 纯逻辑，不做任何 I/O；抓取与发送由 `plugins::progress` 负责。

pub mod debounce;
pub mod diff;
pub mod formatter;
pub mod snapshot;

pub use debounce::{Action, ProgressOffset, Transition};
pub use diff::{diff, diff_progress, DiffEntry, ProgressDiff};
pub use formatter::{render, render_bar, render_entry};
pub use snapshot::{Progress, Snapshot, SnapshotItem};
