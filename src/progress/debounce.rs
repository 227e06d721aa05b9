//! 进度去抖状态机
//!
//! 状态保存在持久化的 [`ProgressOffset`] 中，每次运行最多执行一次状态转换：
//!
//! ```text
//! Idle ──变化──► Debouncing ──窗口到期──► 发布 ──► Idle
//!                   │  ▲
//!                   └──┘ 再次变化：重置窗口起点
//! ```
//!
//! 发布时与"上次已发布"的快照比较，中间的多次变化合并为一次通知。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use super::diff::{diff_progress, ProgressDiff};
use super::snapshot::Snapshot;

/// 进度连接器的持久化状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredOffset")]
pub struct ProgressOffset {
    /// 上次实际发布的快照
    #[serde(rename = "PublishedState")]
    pub published: Snapshot,
    /// 上次抓取到的快照
    #[serde(rename = "ObservedState")]
    pub observed: Snapshot,
    /// 去抖窗口起点；`None` 表示没有待发布的变化
    #[serde(rename = "DebounceStart")]
    pub debounce_start: Option<DateTime<Utc>>,
}

/// 磁盘上的两种格式：当前的包装对象，以及旧版的裸快照数组
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredOffset {
    Legacy(Option<Snapshot>),
    Current(CurrentOffset),
}

/// 当前格式；`PublishedState` 必须出现（可为 null），其他插件的 offset 不会被误读为空状态
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CurrentOffset {
    #[serde(rename = "PublishedState", deserialize_with = "nullable")]
    published: Option<Snapshot>,
    #[serde(rename = "ObservedState", default)]
    observed: Option<Snapshot>,
    #[serde(rename = "DebounceStart", default)]
    debounce_start: Option<DateTime<Utc>>,
}

fn nullable<'de, D>(deserializer: D) -> Result<Option<Snapshot>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Snapshot>::deserialize(deserializer)
}

impl From<StoredOffset> for ProgressOffset {
    fn from(stored: StoredOffset) -> Self {
        match stored {
            StoredOffset::Legacy(snapshot) => Self::from_published(snapshot.unwrap_or_default()),
            StoredOffset::Current(current) => Self {
                published: current.published.unwrap_or_default(),
                observed: current.observed.unwrap_or_default(),
                debounce_start: current.debounce_start,
            },
        }
    }
}

/// 一次轮询后的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// 与已发布内容一致，无需处理
    Idle,
    /// 检测到变化，开始去抖
    Started,
    /// 去抖期间内容再次变化，窗口重新计时
    Extended,
    /// 去抖窗口未到期，继续等待
    Waiting,
    /// 发布此差异
    Publish(ProgressDiff),
}

/// 状态转换结果：`offset` 为发布成功后应保存的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub offset: ProgressOffset,
    pub action: Action,
}

impl ProgressOffset {
    /// 以一个已发布快照构造（无待发布变化）
    pub fn from_published(snapshot: Snapshot) -> Self {
        Self {
            observed: snapshot.clone(),
            published: snapshot,
            debounce_start: None,
        }
    }

    pub fn is_debouncing(&self) -> bool {
        self.debounce_start.is_some()
    }

    /// 根据新抓取的快照推进状态机
    ///
    /// `delay` 为零时一旦有差异立即发布。返回值不包含副作用，
    /// 发布失败时调用方应保留 `self` 原样。
    pub fn advance(&self, current: Snapshot, delay: Duration, now: DateTime<Utc>) -> Transition {
        let Some(pending) = diff_progress(&self.published, &current) else {
            return Transition {
                offset: Self {
                    published: self.published.clone(),
                    observed: current,
                    debounce_start: None,
                },
                action: Action::Idle,
            };
        };

        let window_elapsed = self
            .debounce_start
            .is_some_and(|start| elapsed_since(start, now) >= delay);

        if delay.is_zero() || window_elapsed {
            return Transition {
                offset: Self::from_published(current),
                action: Action::Publish(pending),
            };
        }

        let (debounce_start, action) = match self.debounce_start {
            None => (now, Action::Started),
            Some(_) if diff_progress(&self.observed, &current).is_some() => (now, Action::Extended),
            Some(start) => (start, Action::Waiting),
        };

        Transition {
            offset: Self {
                published: self.published.clone(),
                observed: current,
                debounce_start: Some(debounce_start),
            },
            action,
        }
    }
}

/// 时钟回拨时按 0 处理
fn elapsed_since(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - start).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::snapshot::Progress;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    fn snap(values: &[(&str, i32)]) -> Snapshot {
        values.iter().map(|(t, v)| Progress::new(*t, *v)).collect()
    }

    #[test]
    fn test_no_difference_clears_debounce() {
        let offset = ProgressOffset {
            published: snap(&[("A", 50)]),
            observed: snap(&[("A", 70)]),
            debounce_start: Some(t0()),
        };

        let transition = offset.advance(snap(&[("A", 50)]), Duration::from_secs(60), t0() + ms(5));
        assert_eq!(transition.action, Action::Idle);
        assert_eq!(transition.offset, ProgressOffset::from_published(snap(&[("A", 50)])));
    }

    #[test]
    fn test_zero_delay_publishes_immediately() {
        let offset = ProgressOffset::from_published(snap(&[("A", 50)]));
        let transition = offset.advance(snap(&[("A", 75)]), Duration::ZERO, t0());

        match transition.action {
            Action::Publish(diff) => {
                assert_eq!(diff.len(), 1);
                assert_eq!(diff[0].old_value, 50);
                assert_eq!(diff[0].new_value, 75);
            }
            other => panic!("expected publish, got {other:?}"),
        }
        assert_eq!(transition.offset.published, snap(&[("A", 75)]));
        assert!(!transition.offset.is_debouncing());
    }

    #[test]
    fn test_first_change_starts_window() {
        let offset = ProgressOffset::from_published(snap(&[("A", 50)]));
        let transition = offset.advance(snap(&[("A", 75)]), Duration::from_millis(10), t0());

        assert_eq!(transition.action, Action::Started);
        assert_eq!(transition.offset.debounce_start, Some(t0()));
        assert_eq!(transition.offset.published, snap(&[("A", 50)]));
        assert_eq!(transition.offset.observed, snap(&[("A", 75)]));
    }

    #[test]
    fn test_change_during_window_resets_start() {
        let offset = ProgressOffset {
            published: snap(&[("A", 50)]),
            observed: snap(&[("A", 75)]),
            debounce_start: Some(t0()),
        };

        let now = t0() + ms(4);
        let transition = offset.advance(snap(&[("A", 85)]), Duration::from_millis(10), now);
        assert_eq!(transition.action, Action::Extended);
        assert_eq!(transition.offset.debounce_start, Some(now));
    }

    #[test]
    fn test_stable_content_keeps_start() {
        let offset = ProgressOffset {
            published: snap(&[("A", 50)]),
            observed: snap(&[("A", 75)]),
            debounce_start: Some(t0()),
        };

        let transition = offset.advance(snap(&[("A", 75)]), Duration::from_millis(10), t0() + ms(9));
        assert_eq!(transition.action, Action::Waiting);
        assert_eq!(transition.offset.debounce_start, Some(t0()));
    }

    #[test]
    fn test_window_elapsed_publishes_net_change() {
        let offset = ProgressOffset {
            published: snap(&[("A", 50)]),
            observed: snap(&[("A", 75)]),
            debounce_start: Some(t0()),
        };

        let transition = offset.advance(snap(&[("A", 75)]), Duration::from_millis(10), t0() + ms(10));
        match transition.action {
            Action::Publish(diff) => assert_eq!((diff[0].old_value, diff[0].new_value), (50, 75)),
            other => panic!("expected publish, got {other:?}"),
        }
        assert_eq!(transition.offset, ProgressOffset::from_published(snap(&[("A", 75)])));
    }

    #[test]
    fn test_clock_going_backwards_does_not_publish() {
        let offset = ProgressOffset {
            published: snap(&[("A", 50)]),
            observed: snap(&[("A", 75)]),
            debounce_start: Some(t0()),
        };

        let transition = offset.advance(snap(&[("A", 75)]), Duration::from_millis(10), t0() - ms(500));
        assert_eq!(transition.action, Action::Waiting);
    }

    #[test]
    fn test_removed_bar_stays_published() {
        let offset = ProgressOffset::from_published(snap(&[("A", 50), ("B", 30)]));
        let transition = offset.advance(snap(&[("A", 50)]), Duration::ZERO, t0());

        assert_eq!(transition.action, Action::Idle);
        assert_eq!(transition.offset.published, snap(&[("A", 50), ("B", 30)]));
        assert_eq!(transition.offset.observed, snap(&[("A", 50)]));
    }

    #[test]
    fn test_current_format_deserializes() {
        let json = r#"{
            "PublishedState": [{"Title": "Project A", "Link": "", "Value": 75}],
            "ObservedState": [{"Title": "Project A", "Link": "", "Value": 80}],
            "DebounceStart": "2023-10-15T14:30:00Z"
        }"#;

        let offset: ProgressOffset = serde_json::from_str(json).unwrap();
        assert_eq!(offset.published, snap(&[("Project A", 75)]));
        assert_eq!(offset.observed, snap(&[("Project A", 80)]));
        assert!(offset.is_debouncing());
        assert_eq!(
            offset.debounce_start,
            Some(Utc.with_ymd_and_hms(2023, 10, 15, 14, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_legacy_format_deserializes() {
        let json = r#"[
            {"Title": "Project A", "Link": "", "Value": 50},
            {"Title": "Project B", "Link": "https://example.com", "Value": 80}
        ]"#;

        let offset: ProgressOffset = serde_json::from_str(json).unwrap();
        assert_eq!(offset.published.len(), 2);
        assert_eq!(offset.published, offset.observed);
        assert_eq!(offset.published[1].link.as_deref(), Some("https://example.com"));
        assert!(!offset.is_debouncing());
    }

    #[test]
    fn test_null_states_read_as_empty() {
        let json = r#"{"PublishedState": null, "ObservedState": null, "DebounceStart": null}"#;
        let offset: ProgressOffset = serde_json::from_str(json).unwrap();
        assert_eq!(offset, ProgressOffset::default());

        let legacy_null: ProgressOffset = serde_json::from_str("null").unwrap();
        assert_eq!(legacy_null, ProgressOffset::default());
    }

    #[test]
    fn test_foreign_offset_is_rejected() {
        // 其他插件留下的已处理条目表
        let handled = serde_json::json!({"urn:post-1": true});
        assert!(serde_json::from_value::<ProgressOffset>(handled).is_err());

        let missing_published = serde_json::json!({"ObservedState": [], "DebounceStart": null});
        assert!(serde_json::from_value::<ProgressOffset>(missing_published).is_err());

        assert!(serde_json::from_value::<ProgressOffset>(serde_json::json!({})).is_err());
    }

    #[test]
    fn test_serialized_offset_behaves_identically() {
        let offset = ProgressOffset {
            published: snap(&[("A", 50)]),
            observed: snap(&[("A", 75)]),
            debounce_start: Some(t0()),
        };

        let restored: ProgressOffset =
            serde_json::from_value(serde_json::to_value(&offset).unwrap()).unwrap();
        assert_eq!(restored, offset);

        let now = t0() + ms(3);
        let delay = Duration::from_millis(10);
        assert_eq!(
            restored.advance(snap(&[("A", 90)]), delay, now),
            offset.advance(snap(&[("A", 90)]), delay, now)
        );
    }
}
