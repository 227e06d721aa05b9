//! 进度快照 - 一次抓取得到的进度条列表

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 可按 key 跨快照匹配的条目
pub trait SnapshotItem {
    /// 领域值（进度为百分比）；`Default` 即"新条目"的旧值
    type Value: Clone + PartialEq + Default;

    fn key(&self) -> &str;
    fn link(&self) -> Option<&str>;
    fn value(&self) -> Self::Value;
}

/// 单个进度条
///
/// 序列化字段名沿用已有 offset 文件（`Title` / `Link` / `Value`），
/// 缺失链接写为空字符串。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(
        rename = "Link",
        default,
        serialize_with = "link_as_string",
        deserialize_with = "empty_link_as_none"
    )]
    pub link: Option<String>,
    #[serde(rename = "Value")]
    pub value: i32,
}

impl Progress {
    pub fn new(title: impl Into<String>, value: i32) -> Self {
        Self {
            title: title.into(),
            link: None,
            value,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        let link = link.into();
        self.link = (!link.is_empty()).then_some(link);
        self
    }
}

impl SnapshotItem for Progress {
    type Value = i32;

    fn key(&self) -> &str {
        &self.title
    }

    fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    fn value(&self) -> i32 {
        self.value
    }
}

/// 一次读取的全部进度条，顺序即页面展示顺序
pub type Snapshot = Vec<Progress>;

fn link_as_string<S: Serializer>(link: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(link.as_deref().unwrap_or(""))
}

fn empty_link_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let link = Option::<String>::deserialize(deserializer)?;
    Ok(link.filter(|l| !l.is_empty()))
}
